/// Decide whether the current fleet state is worth a notification
///
/// Everything here is pure: the caller loads the previous records, applies
/// the decision and persists whatever it needs afterwards.
use crate::models::{
    CurrentState, Direction, FleetStatus, LastMessage, Notification, NotificationKind,
};

/// Direction of a status change. Only moves into `good`, or from `bad`
/// down to `ok`, count as improvements.
pub fn direction(from: FleetStatus, to: FleetStatus) -> Direction {
    match (from, to) {
        (_, FleetStatus::Good) | (FleetStatus::Bad, FleetStatus::Ok) => Direction::Better,
        _ => Direction::Worse,
    }
}

fn initial(current: &CurrentState) -> Notification {
    Notification {
        kind: NotificationKind::Initial,
        body: format!(
            "Air quality status is now {}, AQI is {}",
            current.status, current.aqi
        ),
    }
}

/// Pick the notification for this run, if any. The first matching rule wins:
///
/// 1. No previous state: announce the current status.
/// 2. Status band changed: report the transition and its direction.
/// 3. Status unchanged but nothing was ever sent: announce the current status.
/// 4. Status unchanged: report drift when the AQI moved at least
///    `min_alert_delta` away from the last sent value.
pub fn decide(
    current: &CurrentState,
    previous_state: Option<&CurrentState>,
    previous_message: Option<&LastMessage>,
    min_alert_delta: f64,
) -> Option<Notification> {
    let previous_state = match previous_state {
        Some(state) => state,
        None => return Some(initial(current)),
    };

    if previous_state.status != current.status {
        let direction = direction(previous_state.status, current.status);
        return Some(Notification {
            kind: NotificationKind::Transition {
                from: previous_state.status,
                to: current.status,
                direction,
            },
            body: format!(
                "Air quality got {}! Status was {} but is now {}. AQI is {}",
                direction, previous_state.status, current.status, current.aqi
            ),
        });
    }

    let previous_message = match previous_message {
        Some(message) => message,
        None => return Some(initial(current)),
    };

    let delta = previous_message.aqi.abs_diff(current.aqi);
    if f64::from(delta) >= min_alert_delta {
        Some(Notification {
            kind: NotificationKind::Drift {
                previous_aqi: previous_message.aqi,
                min_alert_delta,
            },
            body: format!(
                "AQI moved from {} to {}, at least {} since the last alert. Status is still {}",
                previous_message.aqi, current.aqi, min_alert_delta, current.status
            ),
        })
    } else {
        None
    }
}
