use data_encoding::BASE64;
use log::{debug, warn};
use mongodb::{
    bson::{doc, to_bson, Document},
    error::{Error as DbError, ErrorKind, WriteFailure},
    options::UpdateOptions,
    Database,
};
use rocket::futures::TryStreamExt;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{
    ballot::StoredBallot,
    binding::BallotNumber,
    candidate::{Candidate, CandidateId},
    identity::{IdentityError, ObfuscatedId},
    mongodb::{Coll, Counter, CANDIDATE_ID_COUNTER_ID},
    secrets::SecretProvider,
    store::RegistryStore,
    voter::{MinimalVoter, VoterStatus},
};

/// MongoDB's code for a unique index violation. The driver has no constant for it.
const DUPLICATE_KEY: i32 = 11000;

fn is_duplicate_key_error(err: &DbError) -> bool {
    matches!(
        *err.kind,
        ErrorKind::Write(WriteFailure::WriteError(ref e)) if e.code == DUPLICATE_KEY
    )
}

fn id_filter(id: &str) -> Document {
    doc! { "_id": id }
}

/// A registry backed by MongoDB collections.
#[derive(Clone)]
pub struct MongoRegistry {
    voters: Coll<MinimalVoter>,
    ballots: Coll<StoredBallot>,
    candidates: Coll<Candidate>,
    counters: Coll<Counter>,
}

impl MongoRegistry {
    pub fn from_db(db: &Database) -> Self {
        Self {
            voters: Coll::from_db(db),
            ballots: Coll::from_db(db),
            candidates: Coll::from_db(db),
            counters: Coll::from_db(db),
        }
    }
}

#[rocket::async_trait]
impl RegistryStore for MongoRegistry {
    async fn add_candidate(&self, name: &str) -> Result<CandidateId> {
        let candidate_id = CandidateId(Counter::next(&self.counters, CANDIDATE_ID_COUNTER_ID).await?);
        let candidate = Candidate {
            candidate_id,
            name: name.to_string(),
        };
        self.candidates.insert_one(&candidate, None).await?;
        debug!("Inserted candidate {candidate_id}");
        Ok(candidate_id)
    }

    async fn get_candidate(&self, candidate_id: CandidateId) -> Result<Option<Candidate>> {
        let candidate = self
            .candidates
            .find_one(doc! { "_id": candidate_id.0 }, None)
            .await?;
        Ok(candidate)
    }

    async fn get_all_candidates(&self) -> Result<Vec<Candidate>> {
        let mut candidates = self
            .candidates
            .find(None, None)
            .await?
            .try_collect::<Vec<_>>()
            .await?;
        candidates.sort_by_key(|candidate| candidate.candidate_id);
        Ok(candidates)
    }

    async fn add_voter(&self, voter: &MinimalVoter) -> Result<bool> {
        match self.voters.insert_one(voter, None).await {
            Ok(_) => Ok(true),
            Err(err) if is_duplicate_key_error(&err) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn get_voter(&self, id: &ObfuscatedId) -> Result<Option<MinimalVoter>> {
        Ok(self.voters.find_one(id_filter(id.as_str()), None).await?)
    }

    async fn update_voter_status(&self, id: &ObfuscatedId, status: VoterStatus) -> Result<()> {
        let update = doc! { "$set": { "status": status } };
        self.voters
            .update_one(id_filter(id.as_str()), update, None)
            .await?;
        Ok(())
    }

    async fn delete_voter(&self, id: &ObfuscatedId) -> Result<bool> {
        let result = self
            .voters
            .delete_one(id_filter(id.as_str()), None)
            .await?;
        Ok(result.deleted_count == 1)
    }

    async fn get_all_voters(&self, status: Option<VoterStatus>) -> Result<Vec<MinimalVoter>> {
        let filter = status.map(|status| doc! { "status": status });
        let voters = self
            .voters
            .find(filter, None)
            .await?
            .try_collect::<Vec<_>>()
            .await?;
        Ok(voters)
    }

    async fn add_ballot(&self, ballot_number: &BallotNumber) -> Result<()> {
        let ballot = StoredBallot::issued(ballot_number.clone());
        self.ballots.insert_one(&ballot, None).await?;
        Ok(())
    }

    async fn get_ballot(&self, ballot_number: &BallotNumber) -> Result<Option<StoredBallot>> {
        Ok(self
            .ballots
            .find_one(id_filter(ballot_number.as_str()), None)
            .await?)
    }

    async fn update_ballot(&self, ballot: &StoredBallot) -> Result<()> {
        let update = doc! {
            "$set": {
                "chosen_candidate_id": to_bson(&ballot.chosen_candidate_id)?,
                "voter_comments": ballot.voter_comments.as_str(),
                "status": to_bson(&ballot.status)?,
            }
        };
        self.ballots
            .update_one(id_filter(ballot.ballot_number.as_str()), update, None)
            .await?;
        Ok(())
    }

    async fn delete_ballot(&self, ballot_number: &BallotNumber) -> Result<bool> {
        let result = self
            .ballots
            .delete_one(id_filter(ballot_number.as_str()), None)
            .await?;
        Ok(result.deleted_count == 1)
    }

    async fn get_all_ballots(&self) -> Result<Vec<StoredBallot>> {
        let ballots = self
            .ballots
            .find(None, None)
            .await?
            .try_collect::<Vec<_>>()
            .await?;
        Ok(ballots)
    }
}

/// A named secret as stored in the database, base64-encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretDoc {
    #[serde(rename = "_id")]
    pub name: String,
    pub bytes: String,
}

/// Secret material persisted in the `secrets` collection.
#[derive(Clone)]
pub struct MongoSecrets {
    secrets: Coll<SecretDoc>,
}

impl MongoSecrets {
    pub fn from_db(db: &Database) -> Self {
        Self {
            secrets: Coll::from_db(db),
        }
    }
}

#[rocket::async_trait]
impl SecretProvider for MongoSecrets {
    async fn get_secret(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let Some(secret) = self.secrets.find_one(id_filter(name), None).await? else {
            return Ok(None);
        };
        match BASE64.decode(secret.bytes.as_bytes()) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) => {
                warn!("Secret `{name}` is corrupt: {err}");
                Err(IdentityError::Integrity("stored secret is not valid base64").into())
            }
        }
    }

    async fn set_secret(&self, name: &str, bytes: &[u8]) -> Result<()> {
        // Only ever insert: an existing secret must survive.
        let options = UpdateOptions::builder().upsert(true).build();
        self.secrets
            .update_one(
                id_filter(name),
                doc! { "$setOnInsert": { "bytes": BASE64.encode(bytes) } },
                options,
            )
            .await?;
        Ok(())
    }
}
