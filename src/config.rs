use std::env;
use std::str::FromStr;

use log::{debug, warn};

use crate::error::ConfigError;
use crate::fleet::Thresholds;

const DEFAULT_PURPLE_AIR_URL: &str = "https://www.purpleair.com";
const DEFAULT_THINGSPEAK_URL: &str = "https://api.thingspeak.com";
const DEFAULT_TWILIO_URL: &str = "https://api.twilio.com";
const DEFAULT_MIN_ALERT_DELTA: f64 = 20.0;

#[derive(Debug, Clone, PartialEq)]
pub struct TwilioCredentials {
    pub account_sid: String,
    pub auth_token: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlertConfig {
    pub sensor_ids: Vec<String>,
    pub to_numbers: Vec<String>,
    pub from_number: Option<String>,
    pub should_send_text: bool,
    pub thresholds: Thresholds,
    pub min_alert_delta: f64,
    pub database_url: String,
    pub twilio: Option<TwilioCredentials>,
    pub purple_air_url: String,
    pub thingspeak_url: String,
    pub twilio_url: String,
    pub sensor_concurrency: usize,
    pub host: String,
    pub port: u16,
}

/// Split a list option on whitespace or commas, dropping empty entries
fn split_list(value: &str) -> Vec<String> {
    value
        .split(|c: char| c.is_whitespace() || c == ',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse<T>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        name,
        reason: format!("'{}': {}", value, e),
    })
}

impl AlertConfig {
    pub fn new() -> Result<Self, ConfigError> {
        // Load environment variables
        dotenv::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key lookup, usually the process environment
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| lookup(name).ok_or(ConfigError::Missing(name));

        let sensor_ids = split_list(&required("PURPLE_AIR_IDS")?);
        if sensor_ids.is_empty() {
            return Err(ConfigError::Invalid {
                name: "PURPLE_AIR_IDS",
                reason: "no sensor ids configured".to_string(),
            });
        }
        debug!("Sensors configured: {:?}", sensor_ids);

        let to_numbers = lookup("TO_NUMBERS")
            .map(|value| split_list(&value))
            .unwrap_or_default();
        let from_number = lookup("FROM_NUMBER").filter(|n| !n.trim().is_empty());
        let should_send_text = match lookup("SHOULD_SEND_TEXT") {
            Some(value) => parse::<bool>("SHOULD_SEND_TEXT", &value.to_lowercase())?,
            None => false,
        };

        let thresholds = Thresholds {
            good_air: parse("GOOD_AIR_THRESHOLD", &required("GOOD_AIR_THRESHOLD")?)?,
            bad_air: parse("BAD_AIR_THRESHOLD", &required("BAD_AIR_THRESHOLD")?)?,
        };
        if thresholds.good_air >= thresholds.bad_air {
            warn!(
                "GOOD_AIR_THRESHOLD ({}) is not below BAD_AIR_THRESHOLD ({}); good takes precedence",
                thresholds.good_air, thresholds.bad_air
            );
        }

        let min_alert_delta = match lookup("MIN_ALERT_DELTA") {
            Some(value) => parse("MIN_ALERT_DELTA", &value)?,
            None => DEFAULT_MIN_ALERT_DELTA,
        };

        let database_url = required("DATABASE_URL")?;

        let twilio = match (lookup("TWILIO_ACCOUNT_SID"), lookup("TWILIO_AUTH_TOKEN")) {
            (Some(account_sid), Some(auth_token)) => Some(TwilioCredentials {
                account_sid,
                auth_token,
            }),
            _ => None,
        };

        if should_send_text {
            if from_number.is_none() {
                return Err(ConfigError::Missing("FROM_NUMBER"));
            }
            if twilio.is_none() {
                return Err(ConfigError::Missing("TWILIO_ACCOUNT_SID/TWILIO_AUTH_TOKEN"));
            }
            if to_numbers.is_empty() {
                warn!("SHOULD_SEND_TEXT is set but TO_NUMBERS is empty");
            }
        }

        let sensor_concurrency = match lookup("SENSOR_CONCURRENCY") {
            Some(value) => parse::<usize>("SENSOR_CONCURRENCY", &value)?.max(1),
            None => 1,
        };

        let port = match lookup("PORT") {
            Some(value) => parse("PORT", &value)?,
            None => 8080,
        };

        Ok(AlertConfig {
            sensor_ids,
            to_numbers,
            from_number,
            should_send_text,
            thresholds,
            min_alert_delta,
            database_url,
            twilio,
            purple_air_url: lookup("PURPLE_AIR_URL")
                .unwrap_or_else(|| DEFAULT_PURPLE_AIR_URL.to_string()),
            thingspeak_url: lookup("THINGSPEAK_URL")
                .unwrap_or_else(|| DEFAULT_THINGSPEAK_URL.to_string()),
            twilio_url: lookup("TWILIO_URL").unwrap_or_else(|| DEFAULT_TWILIO_URL.to_string()),
            sensor_concurrency,
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
        })
    }
}
