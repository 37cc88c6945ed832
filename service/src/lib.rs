use config::Config;
use events::EventPublisher;
use hub::domain_event_handler::HubDomainEventHandler;
use hub::presence::{InMemoryPresenceStore, PresenceStore};
use hub::{Hub, SessionHandler};
use log::info;
use std::sync::Arc;

pub mod config;
pub mod logging;

// Service-level state shared by every request handler.
// Needs to implement Clone to be able to be passed into Router as State
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub hub: Arc<Hub>,
    pub presence_store: Arc<dyn PresenceStore>,
    pub event_publisher: Arc<EventPublisher>,
}

impl AppState {
    /// Builds the hub from `config` and wires the default collaborators: the
    /// in-memory presence store and a publisher that forwards domain events to
    /// the hub.
    pub fn new(app_config: Config) -> Self {
        let presence_store: Arc<dyn PresenceStore> = Arc::new(InMemoryPresenceStore::new());
        Self::with_presence_store(app_config, presence_store)
    }

    pub fn with_presence_store(app_config: Config, presence_store: Arc<dyn PresenceStore>) -> Self {
        let hub_config = app_config.hub_config();
        info!(
            "Real-time hub config: max_connections={}, write_timeout={}s",
            hub_config.max_connections,
            hub_config.write_timeout.as_secs(),
        );

        let hub = Arc::new(Hub::new(hub_config));
        let event_publisher = EventPublisher::new()
            .with_handler(Arc::new(HubDomainEventHandler::new(Arc::clone(&hub))));

        Self {
            config: app_config,
            hub,
            presence_store,
            event_publisher: Arc::new(event_publisher),
        }
    }

    /// A protocol handler for one freshly upgraded connection.
    pub fn session_handler(&self) -> SessionHandler {
        SessionHandler::new(Arc::clone(&self.hub), Arc::clone(&self.presence_store))
    }
}
