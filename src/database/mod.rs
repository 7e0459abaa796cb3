pub mod connection;
pub mod records;
pub mod store;

pub use records::{load_current_state, load_last_message, save_current_state, save_last_message};
pub use store::{open_store, StateStore};
