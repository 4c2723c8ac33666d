use std::sync::Arc;

use tokio::sync::broadcast;

use crate::config::Config;
use crate::models::event::DispatchEvent;
use crate::observability::metrics::Metrics;
use crate::push::{LoggingPushGateway, PushGateway};
use crate::store::Store;

pub struct AppState {
    pub store: Store,
    pub push: Arc<dyn PushGateway>,
    pub events_tx: broadcast::Sender<DispatchEvent>,
    pub metrics: Metrics,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config, push: Arc<dyn PushGateway>) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(config.event_buffer_size.max(1));

        Self {
            store: Store::new(),
            push,
            events_tx,
            metrics: Metrics::new(),
            config,
        }
    }

    /// State with default configuration and the log-only push gateway.
    pub fn with_defaults() -> Self {
        Self::new(Config::default(), Arc::new(LoggingPushGateway))
    }

    /// Fans an event out to live subscribers; having none is fine.
    pub fn publish(&self, event: DispatchEvent) {
        let _ = self.events_tx.send(event);
    }
}
