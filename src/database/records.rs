/// Typed access to the two persisted records
///
/// `current_aqi` holds the last computed fleet state and `previous_message`
/// the last notification that went out. Both are stored as JSON. The two
/// keys are written separately, so a crash between the writes can leave
/// them out of step; the next run decides from whatever was persisted.
use log::warn;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::database::store::StateStore;
use crate::error::StoreError;
use crate::models::{CurrentState, LastMessage};

pub const CURRENT_STATE_KEY: &str = "current_aqi";
pub const LAST_MESSAGE_KEY: &str = "previous_message";

/// Read and decode a record. Missing or malformed values read as absent.
async fn load_json<T: DeserializeOwned>(
    store: &dyn StateStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    let raw = match store.get(key).await? {
        Some(raw) => raw,
        None => return Ok(None),
    };

    match serde_json::from_str(&raw) {
        Ok(record) => Ok(Some(record)),
        Err(e) => {
            warn!("Ignoring malformed value under {}: {} ({:?})", key, e, raw);
            Ok(None)
        }
    }
}

async fn save_json<T: Serialize + Sync>(
    store: &dyn StateStore,
    key: &str,
    record: &T,
) -> Result<(), StoreError> {
    let raw = serde_json::to_string(record)?;
    store.set(key, raw).await
}

pub async fn load_current_state(store: &dyn StateStore) -> Result<Option<CurrentState>, StoreError> {
    load_json(store, CURRENT_STATE_KEY).await
}

pub async fn save_current_state(
    store: &dyn StateStore,
    state: &CurrentState,
) -> Result<(), StoreError> {
    save_json(store, CURRENT_STATE_KEY, state).await
}

pub async fn load_last_message(store: &dyn StateStore) -> Result<Option<LastMessage>, StoreError> {
    load_json(store, LAST_MESSAGE_KEY).await
}

pub async fn save_last_message(
    store: &dyn StateStore,
    message: &LastMessage,
) -> Result<(), StoreError> {
    save_json(store, LAST_MESSAGE_KEY, message).await
}
