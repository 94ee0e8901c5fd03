mod notify;
pub mod writer;

pub use crate::config::EventsOutConfig;
pub use notify::{FanoutNotifier, Notification, Notifier, TracingNotifier};
pub use writer::{start_events_out, EventsOutTx};
