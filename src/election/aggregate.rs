use std::collections::{BTreeMap, HashSet};

use log::debug;

use crate::error::{Error, Result};
use crate::model::{candidate::Candidate, voter::VoterStatus};

use super::Election;

impl Election {
    /// The distinct non-empty comments across all ballots.
    pub async fn get_all_ballot_comments(&self) -> Result<HashSet<String>> {
        let comments = self
            .store
            .get_all_ballots()
            .await?
            .into_iter()
            .map(|ballot| ballot.voter_comments)
            .filter(|comments| !comments.is_empty())
            .collect();
        Ok(comments)
    }

    /// The candidate with the most counted ballots, majority or not.
    ///
    /// Ties go to the lowest candidate ID. Returns `None` if nothing has been
    /// counted yet.
    pub async fn compute_election_winner(&self) -> Result<Option<Candidate>> {
        let mut tally = BTreeMap::new();
        for ballot in self.store.get_all_ballots().await? {
            if !ballot.is_counted() {
                continue;
            }
            if let Some(candidate_id) = ballot.chosen_candidate_id {
                *tally.entry(candidate_id).or_insert(0u64) += 1;
            }
        }
        debug!("Tallied votes for {} candidates", tally.len());

        // `max_by_key` keeps the last maximum, so iterate in reverse ID order.
        let Some((&winner, _)) = tally.iter().rev().max_by_key(|&(_, votes)| *votes) else {
            return Ok(None);
        };
        let candidate = self
            .store
            .get_candidate(winner)
            .await?
            .ok_or_else(|| Error::not_found(format!("Candidate with ID {winner}")))?;
        Ok(Some(candidate))
    }

    /// The full names, as "first last", of every voter who committed fraud.
    pub async fn get_all_fraudulent_voters(&self) -> Result<HashSet<String>> {
        let keyring = self.keyring().await?;
        let mut names = HashSet::new();
        for voter in self
            .store
            .get_all_voters(Some(VoterStatus::FraudCommitted))
            .await?
        {
            let first_name = keyring.decrypt_name(&voter.encrypted_first_name)?;
            let last_name = keyring.decrypt_name(&voter.encrypted_last_name)?;
            names.insert(format!("{first_name} {last_name}"));
        }
        Ok(names)
    }
}
