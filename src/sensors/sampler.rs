/// Reduce a sensor's reading series to a single AQI value
use futures_util::stream::{self, StreamExt};
use log::{debug, warn};

use crate::aqi::concentration_to_aqi;
use crate::error::SensorError;
use crate::sensors::SensorSource;
use crate::utils::mean_of_present;

/// Number of most recent readings averaged per sensor
pub const READING_WINDOW: usize = 3;

/// Average the AQI of the last `READING_WINDOW` readings
///
/// `readings` is ordered oldest first, as ThingSpeak returns it. `None`
/// entries are readings the upstream could not express as a number.
/// Unmappable readings are left out of the mean.
pub fn window_aqi(readings: &[Option<f64>]) -> Result<f64, SensorError> {
    if readings.len() < READING_WINDOW {
        return Err(SensorError::NotEnoughReadings {
            required: READING_WINDOW,
            got: readings.len(),
        });
    }

    let window = &readings[readings.len() - READING_WINDOW..];
    let aqis = window
        .iter()
        .rev()
        .map(|reading| reading.and_then(concentration_to_aqi).map(f64::from));

    mean_of_present(aqis).ok_or(SensorError::NoMappableReadings)
}

/// Sample one sensor, turning any failure into "no value"
pub async fn sample_sensor_aqi(source: &dyn SensorSource, sensor_id: &str) -> Option<f64> {
    match source.sample(sensor_id).await {
        Ok(aqi) => {
            debug!("Sensor {} AQI is {:.2}", sensor_id, aqi);
            Some(aqi)
        }
        Err(e) => {
            warn!("Excluding sensor {}: {}", sensor_id, e);
            None
        }
    }
}

/// Sample every sensor with at most `concurrency` requests in flight
///
/// Results keep the order of `sensor_ids`.
pub async fn sample_fleet(
    source: &dyn SensorSource,
    sensor_ids: &[String],
    concurrency: usize,
) -> Vec<Option<f64>> {
    stream::iter(sensor_ids.iter().cloned())
        .map(|sensor_id| async move { sample_sensor_aqi(source, &sensor_id).await })
        .buffered(concurrency.max(1))
        .collect()
        .await
}
