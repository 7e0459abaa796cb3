/// PurpleAir directory lookup and ThingSpeak time-series client
use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use serde_json::Value;
use time::OffsetDateTime;
use tokio::time::Duration;
use url::Url;

use crate::config::AlertConfig;
use crate::error::SensorError;
use crate::sensors::sampler::window_aqi;
use crate::sensors::SensorSource;
use crate::utils::previous_day;

const REQUEST_TIMEOUT_SECS: u64 = 15;
// ThingSpeak channel field holding PM2.5 concentration
const PM25_FIELD: u8 = 8;

/// Where a sensor publishes its readings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: String,
    pub read_key: String,
}

#[derive(Debug, Deserialize)]
struct DirectoryResponse {
    #[serde(default)]
    results: Vec<DirectoryEntry>,
}

#[derive(Debug, Deserialize)]
struct DirectoryEntry {
    #[serde(rename = "THINGSPEAK_PRIMARY_ID")]
    channel_id: Value,
    #[serde(rename = "THINGSPEAK_PRIMARY_ID_READ_KEY")]
    read_key: Value,
}

#[derive(Debug, Deserialize)]
struct FeedResponse {
    #[serde(default)]
    feeds: Vec<Feed>,
}

#[derive(Debug, Deserialize)]
struct Feed {
    #[serde(default)]
    field8: Option<Value>,
}

/// The directory reports ids as either strings or numbers
fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// ThingSpeak sends readings as strings; anything unparsable is unmappable
fn value_to_reading(value: &Value) -> Option<f64> {
    match value {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct PurpleAirClient {
    client: reqwest::Client,
    purple_air_url: String,
    thingspeak_url: String,
}

impl PurpleAirClient {
    pub fn new(config: &AlertConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            purple_air_url: config.purple_air_url.trim_end_matches('/').to_string(),
            thingspeak_url: config.thingspeak_url.trim_end_matches('/').to_string(),
        })
    }

    /// Resolve a PurpleAir sensor id to its primary ThingSpeak channel
    pub async fn lookup_channel(&self, sensor_id: &str) -> Result<Channel, SensorError> {
        let url = Url::parse(&format!("{}/json", self.purple_air_url))?;

        let response: DirectoryResponse = self
            .client
            .get(url)
            .query(&[("show", sensor_id)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let entry = response
            .results
            .first()
            .ok_or_else(|| SensorError::UnknownSensor(sensor_id.to_string()))?;

        match (
            value_to_string(&entry.channel_id),
            value_to_string(&entry.read_key),
        ) {
            (Some(id), Some(read_key)) => Ok(Channel { id, read_key }),
            _ => Err(SensorError::UnknownSensor(sensor_id.to_string())),
        }
    }

    /// Fetch the PM2.5 series of a channel from `start` onwards, oldest first
    pub async fn fetch_readings(
        &self,
        channel: &Channel,
        start: &str,
    ) -> Result<Vec<Option<f64>>, SensorError> {
        let url = Url::parse(&format!(
            "{}/channels/{}/fields/{}.json",
            self.thingspeak_url, channel.id, PM25_FIELD
        ))?;

        let response: FeedResponse = self
            .client
            .get(url)
            .query(&[
                ("start", start),
                ("offset", "0"),
                ("round", "2"),
                ("average", "10"),
                ("api_key", channel.read_key.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response
            .feeds
            .iter()
            .map(|feed| feed.field8.as_ref().and_then(value_to_reading))
            .collect())
    }
}

#[async_trait]
impl SensorSource for PurpleAirClient {
    async fn sample(&self, sensor_id: &str) -> Result<f64, SensorError> {
        let channel = self.lookup_channel(sensor_id).await?;
        let start = previous_day(OffsetDateTime::now_utc());
        debug!(
            "Sensor {} reads from channel {} since {}",
            sensor_id, channel.id, start
        );

        let readings = self.fetch_readings(&channel, &start).await?;
        window_aqi(&readings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> PurpleAirClient {
        PurpleAirClient {
            client: reqwest::Client::new(),
            purple_air_url: server.uri(),
            thingspeak_url: server.uri(),
        }
    }

    async fn mount_directory(server: &MockServer, sensor_id: &str, body: Value) {
        Mock::given(method("GET"))
            .and(path("/json"))
            .and(query_param("show", sensor_id))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_sample_happy_path() {
        let server = MockServer::start().await;
        mount_directory(
            &server,
            "1234",
            json!({"results": [{
                "THINGSPEAK_PRIMARY_ID": 98765,
                "THINGSPEAK_PRIMARY_ID_READ_KEY": "READKEY"
            }]}),
        )
        .await;

        Mock::given(method("GET"))
            .and(path("/channels/98765/fields/8.json"))
            .and(query_param("api_key", "READKEY"))
            .and(query_param("average", "10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "channel": {"id": 98765},
                "feeds": [
                    {"created_at": "2024-07-03T10:00:00Z", "field8": "480.00"},
                    {"created_at": "2024-07-03T10:10:00Z", "field8": "6.00"},
                    {"created_at": "2024-07-03T10:20:00Z", "field8": null},
                    {"created_at": "2024-07-03T10:30:00Z", "field8": "12.00"}
                ]
            })))
            .mount(&server)
            .await;

        let aqi = client_for(&server).sample("1234").await.unwrap();
        assert_eq!(aqi, 37.5);
    }

    #[tokio::test]
    async fn test_lookup_accepts_string_ids() {
        let server = MockServer::start().await;
        mount_directory(
            &server,
            "42",
            json!({"results": [{
                "THINGSPEAK_PRIMARY_ID": "555",
                "THINGSPEAK_PRIMARY_ID_READ_KEY": "KEY"
            }]}),
        )
        .await;

        let channel = client_for(&server).lookup_channel("42").await.unwrap();
        assert_eq!(
            channel,
            Channel {
                id: "555".to_string(),
                read_key: "KEY".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_unknown_sensor() {
        let server = MockServer::start().await;
        mount_directory(&server, "1", json!({"results": []})).await;

        let err = client_for(&server).sample("1").await.unwrap_err();
        assert!(matches!(err, SensorError::UnknownSensor(id) if id == "1"));
    }

    #[tokio::test]
    async fn test_empty_series_is_not_enough_readings() {
        let server = MockServer::start().await;
        mount_directory(
            &server,
            "7",
            json!({"results": [{
                "THINGSPEAK_PRIMARY_ID": 1,
                "THINGSPEAK_PRIMARY_ID_READ_KEY": "K"
            }]}),
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/channels/1/fields/8.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"feeds": []})))
            .mount(&server)
            .await;

        let err = client_for(&server).sample("7").await.unwrap_err();
        assert!(matches!(
            err,
            SensorError::NotEnoughReadings { got: 0, .. }
        ));
    }

    #[tokio::test]
    async fn test_upstream_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/json"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client_for(&server).sample("9").await.unwrap_err();
        assert!(matches!(err, SensorError::Http(_)));
    }
}
