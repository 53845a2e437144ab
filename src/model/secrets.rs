use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::error::Result;

/// Length in bytes of every named symmetric key.
pub const KEY_LENGTH: usize = 32;

/// Key used to obfuscate national IDs and bind ballots to voters.
pub const NATIONAL_ID_KEY: &str = "national_id_key";
/// Key used to encrypt voter names.
pub const NAME_KEY: &str = "name_key";

/// Long-lived symmetric key material, addressed by name.
///
/// Losing the stored secrets makes every obfuscated ID and encrypted name in
/// the registry permanently unmatchable.
#[rocket::async_trait]
pub trait SecretProvider: Send + Sync {
    /// Get the bytes of the named secret, or `None` if it was never set.
    async fn get_secret(&self, name: &str) -> Result<Option<Vec<u8>>>;

    /// Set the named secret. An existing secret is never overwritten.
    async fn set_secret(&self, name: &str, bytes: &[u8]) -> Result<()>;
}

/// Secrets held in process memory only.
#[derive(Default)]
pub struct MemorySecrets {
    secrets: Mutex<HashMap<String, Vec<u8>>>,
}

#[rocket::async_trait]
impl SecretProvider for MemorySecrets {
    async fn get_secret(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let secrets = self.secrets.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(secrets.get(name).cloned())
    }

    async fn set_secret(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let mut secrets = self.secrets.lock().unwrap_or_else(PoisonError::into_inner);
        secrets
            .entry(name.to_string())
            .or_insert_with(|| bytes.to_vec());
        Ok(())
    }
}
