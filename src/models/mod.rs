pub mod agent;
pub mod assignment;
pub mod collection;
pub mod event;
pub mod notification;
pub mod ping;
pub mod reminder;
