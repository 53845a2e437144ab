use std::fmt::Display;

use mongodb::bson::Bson;
use serde::{Deserialize, Serialize};

use crate::model::{binding::BallotNumber, candidate::CandidateId};

/// A ballot as submitted for counting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    pub ballot_number: BallotNumber,
    pub chosen_candidate_id: Option<CandidateId>,
    pub voter_comments: String,
}

impl Ballot {
    pub fn new(
        ballot_number: BallotNumber,
        chosen_candidate_id: CandidateId,
        voter_comments: impl Into<String>,
    ) -> Self {
        Self {
            ballot_number,
            chosen_candidate_id: Some(chosen_candidate_id),
            voter_comments: voter_comments.into(),
        }
    }
}

/// A ballot row as stored in the registry, together with its persisted status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredBallot {
    #[serde(rename = "_id")]
    pub ballot_number: BallotNumber,
    pub chosen_candidate_id: Option<CandidateId>,
    pub voter_comments: String,
    pub status: Option<BallotStatus>,
}

impl StoredBallot {
    /// A freshly issued ballot: no candidate, no comments, no status.
    pub fn issued(ballot_number: BallotNumber) -> Self {
        Self {
            ballot_number,
            chosen_candidate_id: None,
            voter_comments: String::new(),
            status: None,
        }
    }

    /// Whether this ballot is still in the issued-but-uncast state.
    /// Only such ballots may be invalidated.
    pub fn is_uncast(&self) -> bool {
        self.chosen_candidate_id.is_none() && self.voter_comments.is_empty() && self.status.is_none()
    }

    pub fn is_counted(&self) -> bool {
        self.status == Some(BallotStatus::BallotCounted)
    }
}

/// The outcome of counting a ballot.
///
/// Only [`BallotStatus::BallotCounted`] is ever persisted on a ballot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BallotStatus {
    BallotCounted,
    InvalidBallot,
    VoterBallotMismatch,
    FraudCommitted,
    VoterNotRegistered,
}

impl BallotStatus {
    /// The persisted name of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BallotCounted => "ballot_counted",
            Self::InvalidBallot => "invalid_ballot",
            Self::VoterBallotMismatch => "voter_ballot_mismatch",
            Self::FraudCommitted => "fraud_committed",
            Self::VoterNotRegistered => "voter_not_registered",
        }
    }
}

impl Display for BallotStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let description = match self {
            Self::BallotCounted => "ballot counted",
            Self::InvalidBallot => "the ballot given is invalid",
            Self::VoterBallotMismatch => "the ballot doesn't belong to the voter specified",
            Self::FraudCommitted => "fraud committed: the voter has already voted",
            Self::VoterNotRegistered => "voter not registered",
        };
        write!(f, "{description}")
    }
}

impl From<BallotStatus> for Bson {
    fn from(status: BallotStatus) -> Self {
        Bson::String(status.as_str().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_ballot_is_uncast() {
        let issued = StoredBallot::issued("abc".into());
        assert!(issued.is_uncast());
        assert!(!issued.is_counted());

        let mut commented = issued.clone();
        commented.voter_comments = "hello".to_string();
        assert!(!commented.is_uncast());

        let mut counted = issued;
        counted.chosen_candidate_id = Some(CandidateId(1));
        counted.status = Some(BallotStatus::BallotCounted);
        assert!(!counted.is_uncast());
        assert!(counted.is_counted());
    }
}
