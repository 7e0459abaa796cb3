/// Utility functions for dates and averaging
use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime};

/// Format a timestamp for human-readable logging
///
/// Converts an OffsetDateTime to DD.MM.YYYY - HH:MM:SS format
/// Falls back to default string representation if formatting fails.
pub fn format_datetime(dt: &OffsetDateTime) -> String {
    let format = format_description!("[day].[month].[year] - [hour]:[minute]:[second]");
    dt.format(format).unwrap_or_else(|_| dt.to_string())
}

/// The UTC calendar day before `now`, as YYYY-MM-DD
///
/// ThingSpeak returns the series from this date onwards, which always
/// covers the most recent readings.
pub fn previous_day(now: OffsetDateTime) -> String {
    let day: Date = (now - Duration::days(1)).date();
    let format = format_description!("[year]-[month]-[day]");
    day.format(format).unwrap_or_else(|_| day.to_string())
}

/// Arithmetic mean of the values that are present
///
/// Returns None when nothing is present, so missing data is never averaged in as zero.
pub fn mean_of_present<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let (sum, count) = values
        .into_iter()
        .flatten()
        .fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));

    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}
