/// One end-to-end check: sample, aggregate, decide, persist, notify
use std::sync::Arc;

use log::{error, info};
use time::OffsetDateTime;

use crate::config::AlertConfig;
use crate::database::{
    load_current_state, load_last_message, save_current_state, save_last_message, StateStore,
};
use crate::error::{CheckError, StoreError};
use crate::fleet::aggregate;
use crate::models::{LastMessage, RunReport, Snapshot};
use crate::notify::{decide, deliver, DeliveryReport, Messenger};
use crate::sensors::{sample_fleet, SensorSource};
use crate::utils::format_datetime;

#[derive(Clone)]
pub struct Checker {
    config: Arc<AlertConfig>,
    sensors: Arc<dyn SensorSource>,
    store: Arc<dyn StateStore>,
    messenger: Arc<dyn Messenger>,
}

impl Checker {
    pub fn new(
        config: AlertConfig,
        sensors: Arc<dyn SensorSource>,
        store: Arc<dyn StateStore>,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            sensors,
            store,
            messenger,
        }
    }

    /// Current persisted records
    pub async fn snapshot(&self) -> Result<Snapshot, StoreError> {
        Ok(Snapshot {
            current: load_current_state(self.store.as_ref()).await?,
            last_message: load_last_message(self.store.as_ref()).await?,
        })
    }

    /// Run one check.
    ///
    /// When no sensor yields a value the run stops with
    /// `FleetResultUnavailable` before anything is persisted or sent.
    pub async fn run(&self) -> Result<RunReport, CheckError> {
        let config = self.config.as_ref();
        let started = OffsetDateTime::now_utc();
        info!(
            "Checking {} sensors at {}",
            config.sensor_ids.len(),
            format_datetime(&started)
        );

        let values = sample_fleet(
            self.sensors.as_ref(),
            &config.sensor_ids,
            config.sensor_concurrency,
        )
        .await;
        let sensors_used = values.iter().flatten().count();

        let current = match aggregate(&values, &config.thresholds) {
            Some(current) => current,
            None => {
                error!("No sensor produced an AQI value; skipping this run");
                return Err(CheckError::FleetResultUnavailable);
            }
        };
        info!(
            "Averaged result is {} from {} of {} sensors, status {}",
            current.aqi,
            sensors_used,
            values.len(),
            current.status
        );

        let store = self.store.as_ref();
        let previous_state = load_current_state(store).await?;
        let previous_message = load_last_message(store).await?;
        save_current_state(store, &current).await?;

        match previous_state {
            Some(previous) if previous.status != current.status => info!(
                "Status change. Previous was {}, current is {}",
                previous.status, current.status
            ),
            Some(_) => info!("Status is still {}", current.status),
            None => info!("No previous state recorded"),
        }

        let notification = decide(
            &current,
            previous_state.as_ref(),
            previous_message.as_ref(),
            config.min_alert_delta,
        );

        let mut delivery = DeliveryReport::default();
        match &notification {
            Some(notification) if config.should_send_text => {
                info!(
                    "Sending message \"{}\" to {} configured numbers",
                    notification.body,
                    config.to_numbers.len()
                );
                let from = config.from_number.as_deref().unwrap_or_default();
                delivery = deliver(
                    self.messenger.as_ref(),
                    from,
                    &config.to_numbers,
                    &notification.body,
                )
                .await;

                if delivery.delivered > 0 {
                    let record = LastMessage {
                        message: notification.body.clone(),
                        aqi: current.aqi,
                        timestamp: OffsetDateTime::now_utc(),
                    };
                    save_last_message(store, &record).await?;
                } else {
                    error!("Message reached no recipient; it will be retried next run");
                }
            }
            Some(notification) => {
                info!(
                    "Text sending disabled, not delivering \"{}\"",
                    notification.body
                );
            }
            None => info!("Air quality not interesting enough to send message!"),
        }

        Ok(RunReport {
            state: current,
            sensors_sampled: values.len(),
            sensors_used,
            notification,
            delivered: delivery.delivered,
            failed: delivery.failed,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::database::records::{CURRENT_STATE_KEY, LAST_MESSAGE_KEY};
    use crate::database::store::MemoryStore;
    use crate::error::{DeliveryError, SensorError};
    use crate::fleet::Thresholds;
    use crate::models::{CurrentState, FleetStatus, NotificationKind};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    pub(crate) struct FakeSensors(pub HashMap<String, f64>);

    impl FakeSensors {
        pub(crate) fn new(values: &[(&str, f64)]) -> Self {
            Self(
                values
                    .iter()
                    .map(|(id, aqi)| (id.to_string(), *aqi))
                    .collect(),
            )
        }
    }

    #[async_trait]
    impl SensorSource for FakeSensors {
        async fn sample(&self, sensor_id: &str) -> Result<f64, SensorError> {
            self.0
                .get(sensor_id)
                .copied()
                .ok_or_else(|| SensorError::UnknownSensor(sensor_id.to_string()))
        }
    }

    #[derive(Default)]
    pub(crate) struct RecordingMessenger {
        pub sent: Mutex<Vec<(String, String)>>,
        pub failing: Vec<String>,
    }

    #[async_trait]
    impl Messenger for RecordingMessenger {
        async fn send(&self, _from: &str, to: &str, body: &str) -> Result<String, DeliveryError> {
            if self.failing.iter().any(|n| n == to) {
                return Err(DeliveryError::Rejected {
                    status: 400,
                    body: "unreachable".to_string(),
                });
            }
            let mut sent = self.sent.lock().unwrap();
            sent.push((to.to_string(), body.to_string()));
            Ok(format!("SM{}", sent.len()))
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl StateStore for BrokenStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Connection("refused".to_string()))
        }

        async fn set(&self, _key: &str, _value: String) -> Result<(), StoreError> {
            Err(StoreError::Connection("refused".to_string()))
        }
    }

    pub(crate) fn test_config(should_send_text: bool) -> AlertConfig {
        AlertConfig {
            sensor_ids: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            to_numbers: vec!["+15550001".to_string(), "+15550002".to_string()],
            from_number: Some("+15559999".to_string()),
            should_send_text,
            thresholds: Thresholds {
                good_air: 50.0,
                bad_air: 150.0,
            },
            min_alert_delta: 20.0,
            database_url: "memory".to_string(),
            twilio: None,
            purple_air_url: String::new(),
            thingspeak_url: String::new(),
            twilio_url: String::new(),
            sensor_concurrency: 2,
            host: "127.0.0.1".to_string(),
            port: 0,
        }
    }

    fn checker(
        config: AlertConfig,
        sensors: FakeSensors,
        store: Arc<dyn StateStore>,
        messenger: Arc<RecordingMessenger>,
    ) -> Checker {
        Checker::new(config, Arc::new(sensors), store, messenger)
    }

    #[tokio::test]
    async fn test_first_run_announces_and_persists() {
        let store = MemoryStore::new();
        let messenger = Arc::new(RecordingMessenger::default());
        let checker = checker(
            test_config(true),
            FakeSensors::new(&[("a", 10.0), ("c", 300.0)]),
            Arc::new(store.clone()),
            messenger.clone(),
        );

        let report = checker.run().await.unwrap();
        assert_eq!(
            report.state,
            CurrentState {
                status: FleetStatus::Bad,
                aqi: 155
            }
        );
        assert_eq!(report.sensors_sampled, 3);
        assert_eq!(report.sensors_used, 2);
        assert_eq!(report.delivered, 2);
        assert_eq!(
            report.notification.as_ref().map(|n| n.kind),
            Some(NotificationKind::Initial)
        );

        let sent = messenger.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].1, "Air quality status is now bad, AQI is 155");

        let snapshot = checker.snapshot().await.unwrap();
        assert_eq!(snapshot.current, Some(report.state));
        let last = snapshot.last_message.unwrap();
        assert_eq!(last.aqi, 155);
        assert_eq!(last.message, sent[0].1);
    }

    #[tokio::test]
    async fn test_stable_second_run_is_quiet() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
        let messenger = Arc::new(RecordingMessenger::default());
        let sensors = || FakeSensors::new(&[("a", 80.0), ("b", 90.0)]);

        checker(test_config(true), sensors(), store.clone(), messenger.clone())
            .run()
            .await
            .unwrap();
        let report = checker(test_config(true), sensors(), store.clone(), messenger.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(report.notification, None);
        assert_eq!(messenger.sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_transition_after_previous_state() {
        let store = MemoryStore::new();
        save_current_state(
            &store,
            &CurrentState {
                status: FleetStatus::Bad,
                aqi: 170,
            },
        )
        .await
        .unwrap();
        let messenger = Arc::new(RecordingMessenger::default());

        let report = checker(
            test_config(true),
            FakeSensors::new(&[("a", 90.0)]),
            Arc::new(store.clone()),
            messenger.clone(),
        )
        .run()
        .await
        .unwrap();

        let body = report.notification.unwrap().body;
        assert_eq!(
            body,
            "Air quality got better! Status was bad but is now ok. AQI is 90"
        );
    }

    #[tokio::test]
    async fn test_no_sensor_data_aborts_without_writes() {
        let store = MemoryStore::new();
        let messenger = Arc::new(RecordingMessenger::default());
        let result = checker(
            test_config(true),
            FakeSensors::new(&[]),
            Arc::new(store.clone()),
            messenger.clone(),
        )
        .run()
        .await;

        assert!(matches!(result, Err(CheckError::FleetResultUnavailable)));
        assert_eq!(store.get(CURRENT_STATE_KEY).await.unwrap(), None);
        assert_eq!(store.get(LAST_MESSAGE_KEY).await.unwrap(), None);
        assert!(messenger.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sending_disabled_keeps_state_only() {
        let store = MemoryStore::new();
        let messenger = Arc::new(RecordingMessenger::default());
        let report = checker(
            test_config(false),
            FakeSensors::new(&[("b", 20.0)]),
            Arc::new(store.clone()),
            messenger.clone(),
        )
        .run()
        .await
        .unwrap();

        assert!(report.notification.is_some());
        assert_eq!(report.delivered, 0);
        assert!(messenger.sent.lock().unwrap().is_empty());
        assert!(store.get(CURRENT_STATE_KEY).await.unwrap().is_some());
        assert_eq!(store.get(LAST_MESSAGE_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_one_failed_recipient_does_not_stop_the_run() {
        let store = MemoryStore::new();
        let messenger = Arc::new(RecordingMessenger {
            failing: vec!["+15550001".to_string()],
            ..Default::default()
        });
        let report = checker(
            test_config(true),
            FakeSensors::new(&[("a", 40.0)]),
            Arc::new(store.clone()),
            messenger.clone(),
        )
        .run()
        .await
        .unwrap();

        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 1);
        let sent = messenger.sent.lock().unwrap().clone();
        assert_eq!(sent[0].0, "+15550002");
        assert!(store.get(LAST_MESSAGE_KEY).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unreachable_recipients_leave_no_last_message() {
        let store = MemoryStore::new();
        let messenger = Arc::new(RecordingMessenger {
            failing: vec!["+15550001".to_string(), "+15550002".to_string()],
            ..Default::default()
        });
        let report = checker(
            test_config(true),
            FakeSensors::new(&[("a", 40.0)]),
            Arc::new(store.clone()),
            messenger,
        )
        .run()
        .await
        .unwrap();

        assert_eq!(report.failed, 2);
        assert!(store.get(CURRENT_STATE_KEY).await.unwrap().is_some());
        assert_eq!(store.get(LAST_MESSAGE_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_store_failure_is_reported() {
        let messenger = Arc::new(RecordingMessenger::default());
        let result = checker(
            test_config(true),
            FakeSensors::new(&[("a", 40.0)]),
            Arc::new(BrokenStore),
            messenger.clone(),
        )
        .run()
        .await;

        assert!(matches!(result, Err(CheckError::Store(_))));
        assert!(messenger.sent.lock().unwrap().is_empty());
    }
}
