use std::fmt::Display;

use mongodb::bson::Bson;
use serde::{Deserialize, Serialize};

use crate::model::identity::{EncryptedName, Keyring, ObfuscatedId};

/// A voter as presented at registration time, including sensitive data.
///
/// This only exists at the edge; it is immediately converted into a
/// [`MinimalVoter`] and dropped.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Voter {
    pub first_name: String,
    pub last_name: String,
    pub national_id: String,
}

impl Voter {
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        national_id: impl Into<String>,
    ) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            national_id: national_id.into(),
        }
    }

    /// Protect this voter's data for storage. New voters have not yet voted.
    pub fn into_minimal(self, keyring: &Keyring) -> MinimalVoter {
        MinimalVoter {
            // Do not directly store the national ID or names.
            obfuscated_national_id: keyring.obfuscate(&self.national_id),
            encrypted_first_name: keyring.encrypt_name(self.first_name.trim()),
            encrypted_last_name: keyring.encrypt_name(self.last_name.trim()),
            status: VoterStatus::RegisteredNotVoted,
        }
    }
}

/// A voter as stored in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinimalVoter {
    /// Unique lookup key: the obfuscated national ID.
    #[serde(rename = "_id")]
    pub obfuscated_national_id: ObfuscatedId,
    pub encrypted_first_name: EncryptedName,
    pub encrypted_last_name: EncryptedName,
    pub status: VoterStatus,
}

/// The lifecycle state of a voter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoterStatus {
    /// Absent from the registry. Never persisted.
    NotRegistered,
    RegisteredNotVoted,
    BallotCounted,
    /// Terminal: no operation ever moves a voter out of this state.
    FraudCommitted,
}

impl VoterStatus {
    /// The persisted name of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotRegistered => "not_registered",
            Self::RegisteredNotVoted => "registered_not_voted",
            Self::BallotCounted => "ballot_counted",
            Self::FraudCommitted => "fraud_committed",
        }
    }
}

impl Display for VoterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let description = match self {
            Self::NotRegistered => "not registered",
            Self::RegisteredNotVoted => "registered, but no ballot received",
            Self::BallotCounted => "ballot counted",
            Self::FraudCommitted => "fraud committed",
        };
        write!(f, "{description}")
    }
}

impl From<VoterStatus> for Bson {
    fn from(status: VoterStatus) -> Self {
        Bson::String(status.as_str().to_string())
    }
}

/// Example data for tests.
#[cfg(test)]
pub mod examples {
    use super::*;

    impl Voter {
        pub fn example1() -> Self {
            Self::new("Umang", "Aggarwal", "111-11-1111")
        }

        pub fn example2() -> Self {
            Self::new("Linda", "Navarro", "222-22-2222")
        }

        pub fn example3() -> Self {
            Self::new("John", "Smith", "333 33 3333")
        }
    }
}
