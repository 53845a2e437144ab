//! Internal registration of voters and candidates.
//!
//! None of this is exposed over HTTP.

use log::{debug, info, warn};

use crate::error::Result;
use crate::model::{
    candidate::{Candidate, CandidateId},
    voter::{Voter, VoterStatus},
};

use super::Election;

impl Election {
    /// Register a voter, returning `false` if they are already registered.
    ///
    /// No eligibility checks are made.
    pub async fn register_voter(&self, voter: Voter) -> Result<bool> {
        let keyring = self.keyring().await?;
        let voter = voter.into_minimal(keyring);
        let _guard = self.locks.lock(voter.obfuscated_national_id.as_str()).await;
        let added = self.store.add_voter(&voter).await?;
        if added {
            info!("Registered a new voter");
        } else {
            debug!("Voter is already registered");
        }
        Ok(added)
    }

    pub async fn get_voter_status(&self, national_id: &str) -> Result<VoterStatus> {
        let keyring = self.keyring().await?;
        let voter = self.store.get_voter(&keyring.obfuscate(national_id)).await?;
        Ok(voter.map_or(VoterStatus::NotRegistered, |voter| voter.status))
    }

    /// Remove a voter from the registry at their request.
    ///
    /// Fraudulent voters stay on record, so this returns `false` for them as
    /// well as for unknown voters.
    pub async fn de_register_voter(&self, national_id: &str) -> Result<bool> {
        let keyring = self.keyring().await?;
        let obfuscated_id = keyring.obfuscate(national_id);
        let _guard = self.locks.lock(obfuscated_id.as_str()).await;

        match self.store.get_voter(&obfuscated_id).await? {
            Some(voter) if voter.status == VoterStatus::FraudCommitted => {
                warn!("Refusing to de-register a fraudulent voter");
                Ok(false)
            }
            Some(_) => {
                let deleted = self.store.delete_voter(&obfuscated_id).await?;
                info!("De-registered a voter");
                Ok(deleted)
            }
            None => Ok(false),
        }
    }

    /// Register a candidate unless one with the same name already exists.
    pub async fn register_candidate(&self, name: &str) -> Result<CandidateId> {
        let _guard = self.locks.lock(&format!("candidate:{name}")).await;
        let existing = self
            .store
            .get_all_candidates()
            .await?
            .into_iter()
            .find(|candidate| candidate.name == name);
        if let Some(candidate) = existing {
            return Ok(candidate.candidate_id);
        }
        let candidate_id = self.store.add_candidate(name).await?;
        info!("Registered candidate {candidate_id}");
        Ok(candidate_id)
    }

    pub async fn candidate_is_registered(&self, candidate_id: CandidateId) -> Result<bool> {
        Ok(self.store.get_candidate(candidate_id).await?.is_some())
    }

    /// All registered candidates, in ID order.
    pub async fn get_all_candidates(&self) -> Result<Vec<Candidate>> {
        let mut candidates = self.store.get_all_candidates().await?;
        candidates.sort_by_key(|candidate| candidate.candidate_id);
        Ok(candidates)
    }
}
