//! Protection of voter identity data.
//!
//! National IDs are never stored: only their keyed HMAC is, which serves as a
//! stable lookup key. Names are stored encrypted so that they can later be
//! recovered for redaction and reporting.

use std::fmt::Display;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use data_encoding::BASE64;
use hmac::{digest::Output, Hmac, Mac};
use log::info;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use crate::model::secrets::{SecretProvider, KEY_LENGTH, NAME_KEY, NATIONAL_ID_KEY};

pub type HmacSha256 = Hmac<Sha256>;

/// Length of an AES-GCM nonce in bytes.
const NONCE_LENGTH: usize = 12;
/// Length of an AES-GCM authentication tag in bytes.
const TAG_LENGTH: usize = 16;

/// Strip whitespace and `-` separators from a raw national ID.
pub fn sanitize_national_id(national_id: &str) -> String {
    national_id
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect()
}

/// The deterministic, non-reversible lookup key derived from a national ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObfuscatedId(String);

impl ObfuscatedId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ObfuscatedId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A serialized `{ciphertext, tag, nonce}` bundle holding an encrypted name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptedName(String);

impl EncryptedName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for EncryptedName {
    fn from(bundle: String) -> Self {
        Self(bundle)
    }
}

/// The on-disk layout of an [`EncryptedName`], each field base64-encoded.
#[derive(Debug, Serialize, Deserialize)]
struct NameBundle {
    ciphertext: String,
    tag: String,
    nonce: String,
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Integrity check failed: {0}")]
    Integrity(&'static str),
    #[error("Secret `{name}` has length {len}, expected {}", KEY_LENGTH)]
    KeyLength { name: &'static str, len: usize },
}

/// The process-wide key material used for identity protection.
///
/// Loaded once from a [`SecretProvider`]; each named key is generated on
/// first use and persisted so that every later load sees the same bytes.
#[derive(Clone)]
pub struct Keyring {
    national_id_key: [u8; KEY_LENGTH],
    name_key: [u8; KEY_LENGTH],
}

impl Keyring {
    /// Load both keys, creating any that do not exist yet.
    pub async fn load(secrets: &dyn SecretProvider) -> crate::error::Result<Self> {
        Ok(Self {
            national_id_key: load_or_create(secrets, NATIONAL_ID_KEY).await?,
            name_key: load_or_create(secrets, NAME_KEY).await?,
        })
    }

    /// Build a keyring from explicit key bytes.
    pub fn from_keys(national_id_key: [u8; KEY_LENGTH], name_key: [u8; KEY_LENGTH]) -> Self {
        Self {
            national_id_key,
            name_key,
        }
    }

    /// Keyed HMAC over the given parts, under the national ID key.
    pub(crate) fn national_id_mac(&self, parts: &[&[u8]]) -> Output<HmacSha256> {
        let mut hmac = <HmacSha256 as Mac>::new_from_slice(&self.national_id_key)
            .expect("HMAC can take key of any size");
        for part in parts {
            hmac.update(part);
        }
        hmac.finalize().into_bytes()
    }

    /// Deterministically obfuscate a national ID.
    ///
    /// The same sanitized input always produces the same token.
    pub fn obfuscate(&self, national_id: &str) -> ObfuscatedId {
        let sanitized = sanitize_national_id(national_id);
        ObfuscatedId(BASE64.encode(&self.national_id_mac(&[sanitized.as_bytes()])))
    }

    /// Encrypt a name under a fresh random nonce.
    pub fn encrypt_name(&self, name: &str) -> EncryptedName {
        let mut nonce = [0; NONCE_LENGTH];
        rand::thread_rng().fill_bytes(&mut nonce);
        let sealed = self
            .name_cipher()
            .encrypt(Nonce::from_slice(&nonce), name.trim().as_bytes())
            .expect("AES-GCM encryption of an in-memory buffer cannot fail");
        // AES-GCM appends the tag to the ciphertext.
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LENGTH);
        let bundle = NameBundle {
            ciphertext: BASE64.encode(ciphertext),
            tag: BASE64.encode(tag),
            nonce: BASE64.encode(&nonce),
        };
        EncryptedName(
            serde_json::to_string(&bundle).expect("Serializing a struct of strings cannot fail"),
        )
    }

    /// Recover a name encrypted with [`Keyring::encrypt_name`].
    ///
    /// Fails if the bundle is malformed, was tampered with, or was sealed
    /// under a different key.
    pub fn decrypt_name(&self, encrypted: &EncryptedName) -> Result<String, IdentityError> {
        let bundle: NameBundle = serde_json::from_str(encrypted.as_str())
            .map_err(|_| IdentityError::Integrity("malformed name bundle"))?;
        let decode = |field: &str| {
            BASE64
                .decode(field.as_bytes())
                .map_err(|_| IdentityError::Integrity("name bundle is not valid base64"))
        };
        let mut sealed = decode(&bundle.ciphertext)?;
        let tag = decode(&bundle.tag)?;
        let nonce = decode(&bundle.nonce)?;
        if tag.len() != TAG_LENGTH || nonce.len() != NONCE_LENGTH {
            return Err(IdentityError::Integrity("bad tag or nonce length"));
        }
        sealed.extend_from_slice(&tag);

        let plaintext = self
            .name_cipher()
            .decrypt(Nonce::from_slice(&nonce), sealed.as_slice())
            .map_err(|_| IdentityError::Integrity("authentication tag mismatch"))?;
        String::from_utf8(plaintext).map_err(|_| IdentityError::Integrity("name is not UTF-8"))
    }

    fn name_cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.name_key))
    }
}

async fn load_or_create(
    secrets: &dyn SecretProvider,
    name: &'static str,
) -> crate::error::Result<[u8; KEY_LENGTH]> {
    let bytes = match secrets.get_secret(name).await? {
        Some(bytes) => bytes,
        None => {
            info!("Generating secret `{name}`");
            let mut key = [0; KEY_LENGTH];
            rand::thread_rng().fill_bytes(&mut key);
            secrets.set_secret(name, &key).await?;
            // Another process may have won the race; adopt whatever was persisted.
            secrets
                .get_secret(name)
                .await?
                .ok_or_else(|| crate::error::Error::not_found(format!("Secret `{name}`")))?
        }
    };
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| IdentityError::KeyLength { name, len }.into())
}
