pub mod agents;
pub mod analytics;
pub mod dispatch;
pub mod lifecycle;
pub mod notify;
pub mod reminders;
pub mod tracking;
