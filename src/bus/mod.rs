//! CAN-side message definitions.

pub mod messages;

pub use messages::{BusMessage, CanId, ChangeNotification};
