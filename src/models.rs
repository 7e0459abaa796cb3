use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Coarse air quality band for the whole fleet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FleetStatus {
    Good,
    Ok,
    Bad,
}

impl FleetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FleetStatus::Good => "good",
            FleetStatus::Ok => "ok",
            FleetStatus::Bad => "bad",
        }
    }
}

impl fmt::Display for FleetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted under `current_aqi`, overwritten on every completed run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentState {
    pub status: FleetStatus,
    pub aqi: u16,
}

/// Persisted under `previous_message`, written only when a notification went out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastMessage {
    pub message: String,
    pub aqi: u16,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Direction of a status band transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Better,
    Worse,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Better => f.write_str("better"),
            Direction::Worse => f.write_str("worse"),
        }
    }
}

/// Which rule produced a notification
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationKind {
    Initial,
    Transition {
        from: FleetStatus,
        to: FleetStatus,
        direction: Direction,
    },
    Drift {
        previous_aqi: u16,
        min_alert_delta: f64,
    },
}

/// A message the decision engine wants delivered
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    #[serde(flatten)]
    pub kind: NotificationKind,
    pub body: String,
}

/// Summary of one completed run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub state: CurrentState,
    pub sensors_sampled: usize,
    pub sensors_used: usize,
    pub notification: Option<Notification>,
    pub delivered: usize,
    pub failed: usize,
}

/// Everything persisted, as served by `GET /`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub current: Option<CurrentState>,
    pub last_message: Option<LastMessage>,
}
