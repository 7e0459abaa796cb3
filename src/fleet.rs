/// Fleet-wide aggregation of per-sensor AQI values
use crate::models::{CurrentState, FleetStatus};
use crate::utils::mean_of_present;

/// Status band boundaries for the fleet average
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub good_air: f64,
    pub bad_air: f64,
}

impl Thresholds {
    /// Classify an AQI. `good` is checked first, so it wins when the
    /// thresholds overlap.
    pub fn classify(&self, aqi: u16) -> FleetStatus {
        let aqi = f64::from(aqi);
        if aqi <= self.good_air {
            FleetStatus::Good
        } else if aqi >= self.bad_air {
            FleetStatus::Bad
        } else {
            FleetStatus::Ok
        }
    }
}

/// Combine sensor AQIs into one fleet state.
///
/// Sensors without a value are skipped and do not count toward the average.
/// The mean is rounded up. Returns `None` when no sensor has a value.
pub fn aggregate(sensor_aqis: &[Option<f64>], thresholds: &Thresholds) -> Option<CurrentState> {
    let aqi = mean_of_present(sensor_aqis.iter().copied())?.ceil() as u16;

    Some(CurrentState {
        status: thresholds.classify(aqi),
        aqi,
    })
}
