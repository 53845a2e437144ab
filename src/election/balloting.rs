use std::collections::HashSet;

use log::{debug, info, warn};

use crate::error::Result;
use crate::model::{
    ballot::{Ballot, BallotStatus, StoredBallot},
    binding::{generate_binding_token, verify_binding, BallotNumber},
    identity::sanitize_national_id,
    redaction::KnownPii,
    voter::VoterStatus,
};

use super::Election;

impl Election {
    /// Issue a new ballot to a registered voter.
    ///
    /// Returns `None` if the voter is not registered. Previously issued
    /// ballots stay valid, so a voter may hold several at once.
    pub async fn issue_ballot(&self, national_id: &str) -> Result<Option<BallotNumber>> {
        let keyring = self.keyring().await?;
        let obfuscated_id = keyring.obfuscate(national_id);
        let _guard = self.locks.lock(obfuscated_id.as_str()).await;

        if self.store.get_voter(&obfuscated_id).await?.is_none() {
            debug!("Refusing to issue a ballot to an unregistered voter");
            return Ok(None);
        }
        let ballot_number = generate_binding_token(keyring, national_id, None);
        self.store.add_ballot(&ballot_number).await?;
        info!("Issued a new ballot");
        Ok(Some(ballot_number))
    }

    /// Check that a ballot exists and was issued to the given voter.
    pub async fn verify_ballot(&self, national_id: &str, ballot_number: &BallotNumber) -> Result<bool> {
        if self.store.get_ballot(ballot_number).await?.is_none() {
            return Ok(false);
        }
        let keyring = self.keyring().await?;
        Ok(verify_binding(keyring, national_id, ballot_number))
    }

    /// Validate and count a ballot for the given voter.
    ///
    /// The checks run in a fixed order: registration, ballot existence,
    /// binding, then double voting. A voter who has already voted and presents
    /// another correctly bound ballot is marked fraudulent for good, and that
    /// ballot is invalidated rather than counted.
    pub async fn count_ballot(&self, ballot: Ballot, national_id: &str) -> Result<BallotStatus> {
        let keyring = self.keyring().await?;
        let obfuscated_id = keyring.obfuscate(national_id);
        let _guards = self
            .locks
            .lock_all(&[obfuscated_id.as_str(), ballot.ballot_number.as_str()])
            .await;

        let Some(voter) = self.store.get_voter(&obfuscated_id).await? else {
            return Ok(BallotStatus::VoterNotRegistered);
        };
        let Some(stored) = self.store.get_ballot(&ballot.ballot_number).await? else {
            return Ok(BallotStatus::InvalidBallot);
        };
        if !verify_binding(keyring, national_id, &ballot.ballot_number) {
            return Ok(BallotStatus::VoterBallotMismatch);
        }

        if voter.status != VoterStatus::RegisteredNotVoted {
            warn!("Double vote detected, marking voter as fraudulent");
            self.store
                .update_voter_status(&obfuscated_id, VoterStatus::FraudCommitted)
                .await?;
            // A ballot that was already cast stays recorded.
            self.invalidate_unlocked(&ballot.ballot_number).await?;
            return Ok(BallotStatus::FraudCommitted);
        }

        // Cast ballots are immutable, even for a voter who re-registered.
        if !stored.is_uncast() {
            warn!("Refusing to recount a cast ballot");
            return Ok(BallotStatus::InvalidBallot);
        }

        let voter_comments = self.redact_free_text(&ballot.voter_comments, national_id).await?;
        let counted = StoredBallot {
            ballot_number: ballot.ballot_number,
            chosen_candidate_id: ballot.chosen_candidate_id,
            voter_comments,
            status: Some(BallotStatus::BallotCounted),
        };
        self.store.update_ballot(&counted).await?;
        self.store
            .update_voter_status(&obfuscated_id, VoterStatus::BallotCounted)
            .await?;
        info!("Counted ballot");
        Ok(BallotStatus::BallotCounted)
    }

    /// Delete a ballot that has been issued but not yet cast.
    ///
    /// Returns `false` if the ballot does not exist or has already been cast;
    /// cast ballots are immutable.
    pub async fn invalidate_ballot(&self, ballot_number: &BallotNumber) -> Result<bool> {
        let _guard = self.locks.lock(ballot_number.as_str()).await;
        self.invalidate_unlocked(ballot_number).await
    }

    async fn invalidate_unlocked(&self, ballot_number: &BallotNumber) -> Result<bool> {
        match self.store.get_ballot(ballot_number).await? {
            Some(ballot) if ballot.is_uncast() => {
                let deleted = self.store.delete_ballot(ballot_number).await?;
                if deleted {
                    info!("Invalidated ballot");
                }
                Ok(deleted)
            }
            Some(_) => {
                debug!("Refusing to invalidate a cast ballot");
                Ok(false)
            }
            None => Ok(false),
        }
    }

    /// Remove PII from ballot comments.
    ///
    /// Every registered voter name and candidate name is redacted, as is the
    /// national ID of the voter submitting the comments. A stored name that
    /// fails to decrypt aborts the redaction.
    pub async fn redact_free_text(&self, free_text: &str, national_id: &str) -> Result<String> {
        if free_text.is_empty() {
            return Ok(String::new());
        }
        let keyring = self.keyring().await?;

        let mut known = KnownPii::default();
        for voter in self.store.get_all_voters(None).await? {
            known
                .first_names
                .insert(keyring.decrypt_name(&voter.encrypted_first_name)?);
            known
                .last_names
                .insert(keyring.decrypt_name(&voter.encrypted_last_name)?);
        }
        known.candidate_names = self
            .store
            .get_all_candidates()
            .await?
            .into_iter()
            .map(|candidate| candidate.name)
            .collect::<HashSet<_>>();
        known.national_ids = [national_id.trim().to_string(), sanitize_national_id(national_id)]
            .into_iter()
            .collect();

        Ok(self.redactor.redact(free_text, &known))
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Arc;

    use mongodb::error::Error as DbError;

    use crate::model::{
        binding::BallotNumber,
        candidate::{Candidate, CandidateId},
        identity::ObfuscatedId,
        redaction::{REDACTED_NAME, REDACTED_NATIONAL_ID},
        secrets::MemorySecrets,
        store::RegistryStore,
        voter::{MinimalVoter, Voter},
    };

    use super::*;

    /// A registry whose every operation fails as if the database were down.
    struct OfflineRegistry;

    fn offline<T>() -> Result<T> {
        let err = io::Error::new(io::ErrorKind::ConnectionRefused, "registry offline");
        Err(DbError::from(err).into())
    }

    #[rocket::async_trait]
    impl RegistryStore for OfflineRegistry {
        async fn add_candidate(&self, _: &str) -> Result<CandidateId> {
            offline()
        }
        async fn get_candidate(&self, _: CandidateId) -> Result<Option<Candidate>> {
            offline()
        }
        async fn get_all_candidates(&self) -> Result<Vec<Candidate>> {
            offline()
        }
        async fn add_voter(&self, _: &MinimalVoter) -> Result<bool> {
            offline()
        }
        async fn get_voter(&self, _: &ObfuscatedId) -> Result<Option<MinimalVoter>> {
            offline()
        }
        async fn update_voter_status(&self, _: &ObfuscatedId, _: VoterStatus) -> Result<()> {
            offline()
        }
        async fn delete_voter(&self, _: &ObfuscatedId) -> Result<bool> {
            offline()
        }
        async fn get_all_voters(&self, _: Option<VoterStatus>) -> Result<Vec<MinimalVoter>> {
            offline()
        }
        async fn add_ballot(&self, _: &BallotNumber) -> Result<()> {
            offline()
        }
        async fn get_ballot(&self, _: &BallotNumber) -> Result<Option<StoredBallot>> {
            offline()
        }
        async fn update_ballot(&self, _: &StoredBallot) -> Result<()> {
            offline()
        }
        async fn delete_ballot(&self, _: &BallotNumber) -> Result<bool> {
            offline()
        }
        async fn get_all_ballots(&self) -> Result<Vec<StoredBallot>> {
            offline()
        }
    }

    async fn status_of(election: &Election, national_id: &str) -> VoterStatus {
        election.get_voter_status(national_id).await.unwrap()
    }

    #[backend_test]
    async fn issue_requires_registration(election: Election) {
        assert_eq!(election.issue_ballot("999-99-9999").await.unwrap(), None);
        assert!(election.store().get_all_ballots().await.unwrap().is_empty());
    }

    #[backend_test]
    async fn issuing_twice_keeps_both_valid(election: Election) {
        election.register_voter(Voter::example1()).await.unwrap();
        let first = election.issue_ballot("111-11-1111").await.unwrap().unwrap();
        let second = election.issue_ballot("111-11-1111").await.unwrap().unwrap();
        assert_ne!(first, second);
        assert!(election.verify_ballot("111-11-1111", &first).await.unwrap());
        assert!(election.verify_ballot("111-11-1111", &second).await.unwrap());
        assert_eq!(status_of(&election, "111-11-1111").await, VoterStatus::RegisteredNotVoted);

        let stored = election.store().get_ballot(&first).await.unwrap().unwrap();
        assert!(stored.is_uncast());
    }

    #[backend_test(seeded)]
    async fn count_then_double_vote(election: Election) {
        let first = election.issue_ballot("111-11-1111").await.unwrap().unwrap();
        let result = election
            .count_ballot(Ballot::new(first.clone(), CandidateId(1), ""), "111-11-1111")
            .await
            .unwrap();
        assert_eq!(result, BallotStatus::BallotCounted);
        assert_eq!(status_of(&election, "111-11-1111").await, VoterStatus::BallotCounted);
        let stored = election.store().get_ballot(&first).await.unwrap().unwrap();
        assert!(stored.is_counted());
        assert_eq!(stored.chosen_candidate_id, Some(CandidateId(1)));

        // A second, correctly bound ballot is fraud and is destroyed.
        let second = election.issue_ballot("111-11-1111").await.unwrap().unwrap();
        let result = election
            .count_ballot(Ballot::new(second.clone(), CandidateId(2), ""), "111-11-1111")
            .await
            .unwrap();
        assert_eq!(result, BallotStatus::FraudCommitted);
        assert_eq!(status_of(&election, "111-11-1111").await, VoterStatus::FraudCommitted);
        assert_eq!(election.store().get_ballot(&second).await.unwrap(), None);

        // The first vote is still recorded.
        assert!(election.store().get_ballot(&first).await.unwrap().unwrap().is_counted());

        // Fraud is terminal.
        let third = election.issue_ballot("111-11-1111").await.unwrap().unwrap();
        let result = election
            .count_ballot(Ballot::new(third, CandidateId(2), ""), "111-11-1111")
            .await
            .unwrap();
        assert_eq!(result, BallotStatus::FraudCommitted);
        assert_eq!(status_of(&election, "111-11-1111").await, VoterStatus::FraudCommitted);
    }

    #[backend_test(seeded)]
    async fn recounting_the_same_ballot_is_fraud(election: Election) {
        let ballot = election.issue_ballot("222-22-2222").await.unwrap().unwrap();
        let submit = || Ballot::new(ballot.clone(), CandidateId(3), "");
        assert_eq!(
            election.count_ballot(submit(), "222-22-2222").await.unwrap(),
            BallotStatus::BallotCounted
        );
        assert_eq!(
            election.count_ballot(submit(), "222-22-2222").await.unwrap(),
            BallotStatus::FraudCommitted
        );
        assert_eq!(status_of(&election, "222-22-2222").await, VoterStatus::FraudCommitted);
        assert!(election.store().get_ballot(&ballot).await.unwrap().unwrap().is_counted());
    }

    #[backend_test(seeded)]
    async fn cast_ballot_survives_re_registration(election: Election) {
        let ballot = election.issue_ballot("111-11-1111").await.unwrap().unwrap();
        let result = election
            .count_ballot(Ballot::new(ballot.clone(), CandidateId(1), "first"), "111-11-1111")
            .await
            .unwrap();
        assert_eq!(result, BallotStatus::BallotCounted);

        assert!(election.de_register_voter("111-11-1111").await.unwrap());
        assert!(election.register_voter(Voter::example1()).await.unwrap());
        assert_eq!(status_of(&election, "111-11-1111").await, VoterStatus::RegisteredNotVoted);

        let result = election
            .count_ballot(Ballot::new(ballot.clone(), CandidateId(3), "changed"), "111-11-1111")
            .await
            .unwrap();
        assert_eq!(result, BallotStatus::InvalidBallot);

        let stored = election.store().get_ballot(&ballot).await.unwrap().unwrap();
        assert!(stored.is_counted());
        assert_eq!(stored.chosen_candidate_id, Some(CandidateId(1)));
        assert_eq!(stored.voter_comments, "first");
        assert_eq!(status_of(&election, "111-11-1111").await, VoterStatus::RegisteredNotVoted);
    }

    #[backend_test(seeded)]
    async fn unknown_ballot_is_invalid(election: Election) {
        let never_issued = generate_binding_token(
            election.keyring().await.unwrap(),
            "111-11-1111",
            None,
        );
        let result = election
            .count_ballot(Ballot::new(never_issued, CandidateId(1), ""), "111-11-1111")
            .await
            .unwrap();
        assert_eq!(result, BallotStatus::InvalidBallot);

        let garbage = BallotNumber::from("garbage");
        let result = election
            .count_ballot(Ballot::new(garbage, CandidateId(1), ""), "111-11-1111")
            .await
            .unwrap();
        assert_eq!(result, BallotStatus::InvalidBallot);
        assert_eq!(status_of(&election, "111-11-1111").await, VoterStatus::RegisteredNotVoted);
    }

    #[backend_test(seeded)]
    async fn another_voters_ballot_is_a_mismatch(election: Election) {
        let ballot = election.issue_ballot("111-11-1111").await.unwrap().unwrap();
        let result = election
            .count_ballot(Ballot::new(ballot.clone(), CandidateId(1), ""), "222-22-2222")
            .await
            .unwrap();
        assert_eq!(result, BallotStatus::VoterBallotMismatch);
        assert_eq!(status_of(&election, "222-22-2222").await, VoterStatus::RegisteredNotVoted);
        assert!(election.store().get_ballot(&ballot).await.unwrap().unwrap().is_uncast());
    }

    #[backend_test(seeded)]
    async fn unregistered_voter_is_checked_first(election: Election) {
        // Even a bogus ballot reports the registration failure first.
        let result = election
            .count_ballot(Ballot::new("garbage".into(), CandidateId(1), ""), "999-99-9999")
            .await
            .unwrap();
        assert_eq!(result, BallotStatus::VoterNotRegistered);
    }

    #[backend_test(seeded)]
    async fn invalidation_only_applies_to_uncast_ballots(election: Election) {
        let uncast = election.issue_ballot("333-33-3333").await.unwrap().unwrap();
        assert!(election.invalidate_ballot(&uncast).await.unwrap());
        assert!(!election.invalidate_ballot(&uncast).await.unwrap());
        let result = election
            .count_ballot(Ballot::new(uncast, CandidateId(1), ""), "333-33-3333")
            .await
            .unwrap();
        assert_eq!(result, BallotStatus::InvalidBallot);

        let cast = election.issue_ballot("333-33-3333").await.unwrap().unwrap();
        election
            .count_ballot(Ballot::new(cast.clone(), CandidateId(1), "Fine"), "333-33-3333")
            .await
            .unwrap();
        assert!(!election.invalidate_ballot(&cast).await.unwrap());
        assert!(election.store().get_ballot(&cast).await.unwrap().is_some());

        assert!(!election.invalidate_ballot(&"never issued".into()).await.unwrap());
    }

    #[backend_test(seeded)]
    async fn comments_are_redacted(election: Election) {
        let ballot = election.issue_ballot("111-11-1111").await.unwrap().unwrap();
        let comments = "Linda Navarro told me 111-11-1111 is my ID, vote Rose Hervey";
        election
            .count_ballot(Ballot::new(ballot.clone(), CandidateId(2), comments), "111-11-1111")
            .await
            .unwrap();
        let stored = election.store().get_ballot(&ballot).await.unwrap().unwrap();
        assert_eq!(
            stored.voter_comments,
            format!(
                "{REDACTED_NAME} {REDACTED_NAME} told me {REDACTED_NATIONAL_ID} is my ID, vote {REDACTED_NAME}"
            )
        );
    }

    #[backend_test(seeded)]
    async fn own_unformatted_id_is_redacted(election: Election) {
        let redacted = election
            .redact_free_text("call me AB-12 ok", "AB-12")
            .await
            .unwrap();
        assert_eq!(redacted, format!("call me {REDACTED_NATIONAL_ID} ok"));
    }

    #[backend_test(seeded)]
    async fn tampered_names_fail_redaction(election: Election) {
        let mut voter = Voter::new("Eve", "Mallory", "444-44-4444")
            .into_minimal(election.keyring().await.unwrap());
        voter.encrypted_first_name = "{}".to_string().into();
        election.store().add_voter(&voter).await.unwrap();
        assert!(election.redact_free_text("hello", "111-11-1111").await.is_err());
    }

    #[backend_test(seeded)]
    async fn concurrent_counts_admit_one_vote(election: Election) {
        let ballot = election.issue_ballot("222-22-2222").await.unwrap().unwrap();
        let tasks = (0..4)
            .map(|_| {
                let election = election.clone();
                let ballot = ballot.clone();
                rocket::tokio::spawn(async move {
                    election
                        .count_ballot(Ballot::new(ballot, CandidateId(1), ""), "222-22-2222")
                        .await
                        .unwrap()
                })
            })
            .collect::<Vec<_>>();
        let mut counted = 0;
        for task in tasks {
            if task.await.unwrap() == BallotStatus::BallotCounted {
                counted += 1;
            }
        }
        assert_eq!(counted, 1);
        assert_eq!(status_of(&election, "222-22-2222").await, VoterStatus::FraudCommitted);
    }

    #[rocket::async_test]
    async fn store_failures_are_not_outcomes() {
        let election = Election::new(Arc::new(OfflineRegistry), Arc::new(MemorySecrets::default()));
        let ballot = BallotNumber::from("ballot");

        // Neither "not registered" nor "invalid ballot": the failure surfaces.
        assert!(election.issue_ballot("111-11-1111").await.is_err());
        assert!(election.verify_ballot("111-11-1111", &ballot).await.is_err());
        assert!(election
            .count_ballot(Ballot::new(ballot, CandidateId(1), ""), "111-11-1111")
            .await
            .is_err());
        assert!(election.get_voter_status("111-11-1111").await.is_err());
    }
}
