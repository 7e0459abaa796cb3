/// Error types for configuration, sensors, the state store and messaging
use thiserror::Error;

/// Problems found while reading configuration from the environment
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Why a sensor produced no AQI for this run
#[derive(Debug, Error)]
pub enum SensorError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Sensor {0} not found in directory")]
    UnknownSensor(String),

    #[error("Not enough readings: required {required}, got {got}")]
    NotEnoughReadings { required: usize, got: usize },

    #[error("No mappable readings in window")]
    NoMappableReadings,
}

/// State store connection or query failure
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Messaging provider rejected or failed a single delivery
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider returned status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Messaging not configured: {0}")]
    NotConfigured(&'static str),
}

/// Terminal outcome of a run that did not complete
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("No sensor produced an AQI value")]
    FleetResultUnavailable,

    #[error("State store error: {0}")]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let error = ConfigError::Missing("PURPLE_AIR_IDS");
        assert_eq!(
            error.to_string(),
            "PURPLE_AIR_IDS environment variable not set"
        );

        let error = ConfigError::Invalid {
            name: "MIN_ALERT_DELTA",
            reason: "not a number".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid value for MIN_ALERT_DELTA: not a number"
        );
    }

    #[test]
    fn test_not_enough_readings_display() {
        let error = SensorError::NotEnoughReadings {
            required: 3,
            got: 1,
        };
        assert_eq!(error.to_string(), "Not enough readings: required 3, got 1");
    }

    #[test]
    fn test_store_error_converts_into_check_error() {
        let error: CheckError = StoreError::Connection("refused".to_string()).into();
        assert!(matches!(error, CheckError::Store(StoreError::Connection(_))));
        assert_eq!(error.to_string(), "State store error: Connection error: refused");
    }

    #[test]
    fn test_errors_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SensorError>();
        assert_send_sync::<StoreError>();
        assert_send_sync::<DeliveryError>();
        assert_send_sync::<CheckError>();
    }
}
