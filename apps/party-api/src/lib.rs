pub mod config;
pub mod error;
pub mod rooms;
pub mod routes;
pub mod social;
pub mod store;

use std::sync::Arc;
use std::time::Duration;

use config::Config;
use rooms::registry::RoomRegistry;
use social::hub::SocialHub;
use store::SocialStore;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub rooms: Arc<RoomRegistry>,
    pub social: Arc<SocialHub>,
    pub store: Arc<dyn SocialStore>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn SocialStore>) -> Self {
        let host_grace = Duration::from_secs(config.host_grace_secs);
        Self {
            config: Arc::new(config),
            rooms: Arc::new(RoomRegistry::with_host_grace(host_grace)),
            social: Arc::new(SocialHub::new()),
            store,
        }
    }
}
