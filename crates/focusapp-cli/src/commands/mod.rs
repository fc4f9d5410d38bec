pub mod config;
pub mod data;
pub mod session;
pub mod stats;

use std::sync::Arc;

use focusapp_core::storage::StorageBackend;
use focusapp_core::{
    Config, RemoteSessionStore, SessionStore, SqliteSessionStore, SystemClock,
};

pub type CmdResult = focusapp_core::Result<()>;

/// Everything a command needs, built from the on-disk config.
pub struct Context {
    pub config: Config,
    pub store: Arc<dyn SessionStore>,
    /// Local database, also used for CLI state when sessions live remotely.
    pub local: SqliteSessionStore,
    pub clock: Arc<SystemClock>,
}

impl Context {
    pub fn open() -> focusapp_core::Result<Self> {
        let config = Config::load()?;
        let local = SqliteSessionStore::open()?;
        let store: Arc<dyn SessionStore> = match config.storage.backend {
            StorageBackend::Sqlite => Arc::new(local.clone()),
            StorageBackend::Remote => {
                let remote = config
                    .remote()
                    .ok_or("storage.backend is \"remote\" but storage.remote.base_url is not set")?;
                tracing::debug!(base_url = %remote.base_url, "using remote session store");
                Arc::new(RemoteSessionStore::new(remote)?)
            }
        };
        let clock = Arc::new(SystemClock::new(config.calendar()));
        Ok(Self {
            config,
            store,
            local,
            clock,
        })
    }
}

pub fn print_json<T: serde::Serialize>(value: &T) -> CmdResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
