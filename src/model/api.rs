//! Request and response bodies of the HTTP API.

use serde::{Deserialize, Serialize};

use crate::model::{ballot::BallotStatus, binding::BallotNumber, candidate::Candidate};

/// API-friendly representation of a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateDesc {
    pub candidate_id: String,
    pub name: String,
}

impl From<Candidate> for CandidateDesc {
    fn from(candidate: Candidate) -> Self {
        Self {
            candidate_id: candidate.candidate_id.to_string(),
            name: candidate.name,
        }
    }
}

/// A ballot submitted for counting, together with the voter's national ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountBallotRequest {
    pub ballot_number: BallotNumber,
    /// Parsed as a candidate ID by the handler so a bad value gets a clear error.
    pub chosen_candidate_id: String,
    #[serde(default)]
    pub voter_comments: String,
    pub voter_national_id: String,
}

/// The outcome of counting a ballot, as a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountBallotResponse {
    pub status: String,
}

impl From<BallotStatus> for CountBallotResponse {
    fn from(status: BallotStatus) -> Self {
        Self {
            status: status.to_string(),
        }
    }
}
