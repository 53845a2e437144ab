//! The durable registry of candidates, voters and ballots.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};

use crate::error::Result;
use crate::model::{
    ballot::{BallotStatus, StoredBallot},
    binding::BallotNumber,
    candidate::{Candidate, CandidateId},
    identity::ObfuscatedId,
    voter::{MinimalVoter, VoterStatus},
};

/// Storage operations needed by the election engine.
///
/// Implementations only need to make each individual operation atomic; the
/// engine serialises read-modify-write sequences per voter and per ballot.
#[rocket::async_trait]
pub trait RegistryStore: Send + Sync {
    /// Insert a candidate, returning its newly assigned ID.
    async fn add_candidate(&self, name: &str) -> Result<CandidateId>;
    async fn get_candidate(&self, candidate_id: CandidateId) -> Result<Option<Candidate>>;
    async fn get_all_candidates(&self) -> Result<Vec<Candidate>>;

    /// Insert a voter. Returns `false` if a voter with the same obfuscated ID exists.
    async fn add_voter(&self, voter: &MinimalVoter) -> Result<bool>;
    async fn get_voter(&self, id: &ObfuscatedId) -> Result<Option<MinimalVoter>>;
    async fn update_voter_status(&self, id: &ObfuscatedId, status: VoterStatus) -> Result<()>;
    /// Delete a voter, returning whether one was deleted.
    async fn delete_voter(&self, id: &ObfuscatedId) -> Result<bool>;
    /// Get all voters, optionally only those with the given status.
    async fn get_all_voters(&self, status: Option<VoterStatus>) -> Result<Vec<MinimalVoter>>;

    /// Insert a ballot in the issued-but-uncast state.
    async fn add_ballot(&self, ballot_number: &BallotNumber) -> Result<()>;
    async fn get_ballot(&self, ballot_number: &BallotNumber) -> Result<Option<StoredBallot>>;
    /// Overwrite the candidate, comments and status of an existing ballot.
    async fn update_ballot(&self, ballot: &StoredBallot) -> Result<()>;
    /// Delete a ballot, returning whether one was deleted.
    async fn delete_ballot(&self, ballot_number: &BallotNumber) -> Result<bool>;
    async fn get_all_ballots(&self) -> Result<Vec<StoredBallot>>;
}

#[derive(Default)]
struct Tables {
    candidates: BTreeMap<CandidateId, Candidate>,
    voters: HashMap<ObfuscatedId, MinimalVoter>,
    ballots: HashMap<BallotNumber, StoredBallot>,
}

/// A registry held entirely in process memory.
#[derive(Default)]
pub struct MemoryRegistry {
    tables: Mutex<Tables>,
}

impl MemoryRegistry {
    fn with_tables<T>(&self, f: impl FnOnce(&mut Tables) -> T) -> T {
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut tables)
    }
}

#[rocket::async_trait]
impl RegistryStore for MemoryRegistry {
    async fn add_candidate(&self, name: &str) -> Result<CandidateId> {
        Ok(self.with_tables(|tables| {
            let candidate_id = tables
                .candidates
                .keys()
                .next_back()
                .map_or(CandidateId(1), |last| CandidateId(last.0 + 1));
            tables.candidates.insert(
                candidate_id,
                Candidate {
                    candidate_id,
                    name: name.to_string(),
                },
            );
            candidate_id
        }))
    }

    async fn get_candidate(&self, candidate_id: CandidateId) -> Result<Option<Candidate>> {
        Ok(self.with_tables(|tables| tables.candidates.get(&candidate_id).cloned()))
    }

    async fn get_all_candidates(&self) -> Result<Vec<Candidate>> {
        Ok(self.with_tables(|tables| tables.candidates.values().cloned().collect()))
    }

    async fn add_voter(&self, voter: &MinimalVoter) -> Result<bool> {
        Ok(self.with_tables(|tables| {
            if tables.voters.contains_key(&voter.obfuscated_national_id) {
                return false;
            }
            tables
                .voters
                .insert(voter.obfuscated_national_id.clone(), voter.clone());
            true
        }))
    }

    async fn get_voter(&self, id: &ObfuscatedId) -> Result<Option<MinimalVoter>> {
        Ok(self.with_tables(|tables| tables.voters.get(id).cloned()))
    }

    async fn update_voter_status(&self, id: &ObfuscatedId, status: VoterStatus) -> Result<()> {
        self.with_tables(|tables| {
            if let Some(voter) = tables.voters.get_mut(id) {
                voter.status = status;
            }
        });
        Ok(())
    }

    async fn delete_voter(&self, id: &ObfuscatedId) -> Result<bool> {
        Ok(self.with_tables(|tables| tables.voters.remove(id).is_some()))
    }

    async fn get_all_voters(&self, status: Option<VoterStatus>) -> Result<Vec<MinimalVoter>> {
        Ok(self.with_tables(|tables| {
            tables
                .voters
                .values()
                .filter(|voter| status.map_or(true, |status| voter.status == status))
                .cloned()
                .collect()
        }))
    }

    async fn add_ballot(&self, ballot_number: &BallotNumber) -> Result<()> {
        self.with_tables(|tables| {
            tables
                .ballots
                .entry(ballot_number.clone())
                .or_insert_with(|| StoredBallot::issued(ballot_number.clone()));
        });
        Ok(())
    }

    async fn get_ballot(&self, ballot_number: &BallotNumber) -> Result<Option<StoredBallot>> {
        Ok(self.with_tables(|tables| tables.ballots.get(ballot_number).cloned()))
    }

    async fn update_ballot(&self, ballot: &StoredBallot) -> Result<()> {
        self.with_tables(|tables| {
            if let Some(stored) = tables.ballots.get_mut(&ballot.ballot_number) {
                *stored = ballot.clone();
            }
        });
        Ok(())
    }

    async fn delete_ballot(&self, ballot_number: &BallotNumber) -> Result<bool> {
        Ok(self.with_tables(|tables| tables.ballots.remove(ballot_number).is_some()))
    }

    async fn get_all_ballots(&self) -> Result<Vec<StoredBallot>> {
        Ok(self.with_tables(|tables| tables.ballots.values().cloned().collect()))
    }
}
