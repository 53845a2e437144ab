//! Self-verifying ballot numbers.
//!
//! A ballot number embeds a random salt and a keyed MAC over that salt and the
//! voter's sanitized national ID. Recomputing the ballot number from the
//! claimed national ID and the embedded salt reproduces it exactly only for
//! the voter it was issued to, so the registry never needs to record which
//! voter holds which ballot.

use std::fmt::Display;

use data_encoding::BASE64;
use log::debug;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::identity::{sanitize_national_id, Keyring};

/// Current version of the ballot number envelope.
pub const BINDING_VERSION: u8 = 1;
/// Length in bytes of the per-ballot salt.
pub const SALT_LENGTH: usize = 16;

/// Domain separator so binding MACs never collide with obfuscated IDs.
const BINDING_DOMAIN: &[u8] = b"ballot-binding";

/// The primary key of a ballot, and the proof of which voter it was issued to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BallotNumber(String);

impl BallotNumber {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for BallotNumber {
    fn from(number: String) -> Self {
        Self(number)
    }
}

impl From<&str> for BallotNumber {
    fn from(number: &str) -> Self {
        Self(number.to_string())
    }
}

impl Display for BallotNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The structured content of a ballot number, before base64 encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Envelope {
    #[serde(rename = "v")]
    version: u8,
    salt: String,
    binding: String,
}

#[derive(Debug, Error)]
pub enum BindingError {
    #[error("Ballot number is not valid base64")]
    Encoding,
    #[error("Ballot number does not contain a binding envelope")]
    Envelope,
    #[error("Unsupported binding version {0}")]
    Version(u8),
    #[error("Salt has length {0}, expected {}", SALT_LENGTH)]
    SaltLength(usize),
}

/// Mint a ballot number bound to the given national ID.
///
/// If no salt is supplied a fresh random one is drawn, so repeated issuance to
/// the same voter yields distinct, unlinkable ballot numbers.
pub fn generate_binding_token(
    keyring: &Keyring,
    national_id: &str,
    salt: Option<[u8; SALT_LENGTH]>,
) -> BallotNumber {
    let salt = salt.unwrap_or_else(|| {
        let mut salt = [0; SALT_LENGTH];
        rand::thread_rng().fill_bytes(&mut salt);
        salt
    });
    let sanitized = sanitize_national_id(national_id);
    let binding = keyring.national_id_mac(&[BINDING_DOMAIN, &salt[..], sanitized.as_bytes()]);
    let envelope = Envelope {
        version: BINDING_VERSION,
        salt: BASE64.encode(&salt),
        binding: BASE64.encode(&binding),
    };
    let json = serde_json::to_string(&envelope).expect("Serializing an envelope cannot fail");
    BallotNumber(BASE64.encode(json.as_bytes()))
}

/// Extract the salt embedded in a ballot number.
pub fn extract_salt(ballot_number: &BallotNumber) -> Result<[u8; SALT_LENGTH], BindingError> {
    let json = BASE64
        .decode(ballot_number.as_str().as_bytes())
        .map_err(|_| BindingError::Encoding)?;
    let envelope: Envelope =
        serde_json::from_slice(&json).map_err(|_| BindingError::Envelope)?;
    if envelope.version != BINDING_VERSION {
        return Err(BindingError::Version(envelope.version));
    }
    let salt = BASE64
        .decode(envelope.salt.as_bytes())
        .map_err(|_| BindingError::Encoding)?;
    let len = salt.len();
    salt.try_into().map_err(|_| BindingError::SaltLength(len))
}

/// Check that a ballot number was generated for exactly this national ID.
///
/// Malformed ballot numbers are reported as a mismatch, never as an error.
pub fn verify_binding(keyring: &Keyring, national_id: &str, ballot_number: &BallotNumber) -> bool {
    match extract_salt(ballot_number) {
        Ok(salt) => generate_binding_token(keyring, national_id, Some(salt)) == *ballot_number,
        Err(err) => {
            debug!("Rejecting ballot number: {err}");
            false
        }
    }
}
