pub mod purpleair;
pub mod sampler;

use async_trait::async_trait;

use crate::error::SensorError;

pub use purpleair::PurpleAirClient;
pub use sampler::sample_fleet;

/// Anything that can produce the current AQI for one sensor
#[async_trait]
pub trait SensorSource: Send + Sync {
    async fn sample(&self, sensor_id: &str) -> Result<f64, SensorError>;
}
