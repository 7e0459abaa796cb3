pub mod decision;
pub mod sms;

pub use decision::decide;
pub use sms::{deliver, DeliveryReport, Messenger, TwilioMessenger};
