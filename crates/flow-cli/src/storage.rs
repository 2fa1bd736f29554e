use std::{path::PathBuf, sync::Arc};

use crate::config::Config;
use color_eyre::Result;
use dirs::data_dir;
use flow_backend::StoreBackend;
use flow_core::identity::{GuestIdentity, IdentityProvider, StaticIdentity};
use flow_state::TaskStore;
use flow_storage::file_store::FileStore;
use tracing::debug;

pub type AppStore = TaskStore<StoreBackend<FileStore>>;

/// Resolve the default data directory.
pub fn default_data_dir() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| color_eyre::eyre::eyre!("no data dir available"))?;
    Ok(base.join("whisperrflow"))
}

/// Build the file store, honouring the config override.
pub fn store_from_config(config: &Config) -> Result<FileStore> {
    let root = match &config.data_dir {
        Some(root) => root.clone(),
        None => default_data_dir()?,
    };
    debug!(?root, "initializing file store");
    Ok(FileStore::new(root))
}

pub fn identity_from_config(config: &Config) -> Arc<dyn IdentityProvider> {
    match &config.user_id {
        Some(user) => Arc::new(StaticIdentity::new(user.clone())),
        None => Arc::new(GuestIdentity),
    }
}

/// Open and load the task store with the configured view applied.
pub async fn open(config: &Config) -> Result<AppStore> {
    let backend = StoreBackend::new(store_from_config(config)?);
    let mut store = TaskStore::new(backend, identity_from_config(config));
    store.load().await?;
    store.set_filter(config.view.filter());
    store.set_sort(config.view.sort()?);
    Ok(store)
}

#[cfg(test)]
pub fn test_config(root: impl Into<PathBuf>) -> Config {
    Config {
        data_dir: Some(root.into()),
        user_id: Some("tester".into()),
        ..Config::default()
    }
}
