pub mod api;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod sessions;
pub mod validation;

pub use db::DbPool;

use config::Config;
use std::sync::Arc;

use crate::clock::Clock;
use crate::identity::IdentityStore;
use crate::sessions::SessionService;

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub identity: IdentityStore,
    pub sessions: SessionService,
}

impl AppState {
    pub fn new(config: Config, db: DbPool, clock: Arc<dyn Clock>) -> Self {
        let identity = IdentityStore::new(db.clone(), clock.clone(), config.auth.session_ttl_hours);
        let sessions = SessionService::new(db.clone(), clock, config.sessions.clone());
        Self {
            config,
            db,
            identity,
            sessions,
        }
    }
}
