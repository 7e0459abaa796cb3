/// One row of the breakpoint table.
///
/// A concentration belongs to the band when `conc_low <= c < conc_limit`.
/// Interpolation uses the inclusive `conc_high` the EPA publishes.
#[derive(Debug, Clone, Copy)]
struct Breakpoint {
    conc_low: f64,
    conc_high: f64,
    conc_limit: f64,
    aqi_low: u16,
    aqi_high: u16,
}

const fn band(
    conc_low: f64,
    conc_high: f64,
    conc_limit: f64,
    aqi_low: u16,
    aqi_high: u16,
) -> Breakpoint {
    Breakpoint {
        conc_low,
        conc_high,
        conc_limit,
        aqi_low,
        aqi_high,
    }
}

/// EPA breakpoint table for PM2.5 (µg/m³)
const PM25_BREAKPOINTS: [Breakpoint; 7] = [
    band(0.0, 12.0, 12.1, 0, 50),        // Good
    band(12.1, 35.4, 35.5, 51, 100),     // Moderate
    band(35.5, 55.4, 55.5, 101, 150),    // Unhealthy for Sensitive Groups
    band(55.5, 150.4, 150.5, 151, 200),  // Unhealthy
    band(150.5, 250.4, 250.5, 201, 300), // Very Unhealthy
    band(250.5, 350.4, 350.5, 301, 400), // Hazardous
    band(350.5, 500.4, 500.5, 401, 500), // Hazardous
];

/// Highest AQI the table can produce
pub const MAX_AQI: u16 = 500;

/// Truncate (not round) to one decimal place.
fn truncate_tenths(concentration: f64) -> f64 {
    (concentration * 10.0).floor() / 10.0
}

/// Calculate the AQI for a PM2.5 concentration.
///
/// The concentration is truncated to one decimal place and the AQI is
/// linearly interpolated inside the matching band, so 35.4 maps to 100.
/// Returns `None` when the concentration is negative, not finite, or at or
/// above 500.5 µg/m³. Such readings carry no AQI and must not be counted as
/// zero by callers.
pub fn concentration_to_aqi(concentration: f64) -> Option<u16> {
    if !concentration.is_finite() {
        return None;
    }

    let c = truncate_tenths(concentration);

    PM25_BREAKPOINTS
        .iter()
        .find(|bp| c >= bp.conc_low && c < bp.conc_limit)
        .map(|bp| {
            let aqi_span = f64::from(bp.aqi_high - bp.aqi_low);
            let aqi = (c - bp.conc_low) / (bp.conc_high - bp.conc_low) * aqi_span
                + f64::from(bp.aqi_low);
            // f64::round breaks ties away from zero; every value here is positive
            (aqi.round() as u16).min(MAX_AQI)
        })
}
