//! The election engine: voter and candidate registration, the ballot
//! lifecycle, fraud detection and aggregate reporting.
//!
//! An [`Election`] is constructed once with its store and secret provider and
//! then shared; clones are cheap and refer to the same state.

use std::sync::Arc;

use rocket::tokio::sync::OnceCell;

use crate::error::Result;
use crate::model::{
    identity::Keyring,
    redaction::Redactor,
    secrets::{MemorySecrets, SecretProvider},
    store::{MemoryRegistry, RegistryStore},
};

use self::locks::KeyLocks;

mod aggregate;
mod balloting;
mod locks;
mod registry;

#[derive(Clone)]
pub struct Election {
    store: Arc<dyn RegistryStore>,
    secrets: Arc<dyn SecretProvider>,
    keyring: Arc<OnceCell<Keyring>>,
    locks: Arc<KeyLocks>,
    redactor: Arc<Redactor>,
}

impl Election {
    pub fn new(store: Arc<dyn RegistryStore>, secrets: Arc<dyn SecretProvider>) -> Self {
        Self {
            store,
            secrets,
            keyring: Arc::new(OnceCell::new()),
            locks: Arc::new(KeyLocks::default()),
            redactor: Arc::new(Redactor::new()),
        }
    }

    /// An election whose registry and secrets live only in memory.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryRegistry::default()),
            Arc::new(MemorySecrets::default()),
        )
    }

    /// The registry this election reads and writes.
    pub fn store(&self) -> &dyn RegistryStore {
        self.store.as_ref()
    }

    /// The identity keys, loaded from the secret provider on first use.
    ///
    /// Concurrent first callers share a single load, so a named key is
    /// never generated twice.
    pub async fn keyring(&self) -> Result<&Keyring> {
        self.keyring
            .get_or_try_init(|| Keyring::load(self.secrets.as_ref()))
            .await
    }
}
