use std::ops::Deref;

use log::debug;
use mongodb::{
    bson::doc, error::Error as DbError, options::IndexOptions, Collection, Database, IndexModel,
};

use crate::model::{
    ballot::StoredBallot, candidate::Candidate, voter::MinimalVoter,
};

use super::{counter::Counter, registry::SecretDoc};

/// A type that can be directly inserted/read to/from the database.
pub trait MongoCollection {
    /// The name of the collection.
    const NAME: &'static str;
}

/// A database collection of the given type.
pub struct Coll<T>(Collection<T>);

impl<T> Coll<T>
where
    T: MongoCollection,
{
    /// Get a handle on this collection in the given database.
    pub fn from_db(db: &Database) -> Self {
        Self(db.collection(T::NAME))
    }
}

// `Derive(Clone)` would only derive if `T: Clone`, but we don't need that bound.
impl<T> Clone for Coll<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Coll<T> {
    type Target = Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl MongoCollection for MinimalVoter {
    const NAME: &'static str = "voters";
}

impl MongoCollection for StoredBallot {
    const NAME: &'static str = "ballots";
}

impl MongoCollection for Candidate {
    const NAME: &'static str = "candidates";
}

impl MongoCollection for Counter {
    const NAME: &'static str = "counters";
}

impl MongoCollection for SecretDoc {
    const NAME: &'static str = "secrets";
}

/// Ensure that all the required indexes exist on the given database.
///
/// Voters, ballots and secrets are keyed by `_id`, which is always unique.
/// This operation is idempotent.
pub async fn ensure_indexes_exist(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring collection indexes exist");

    let unique = IndexOptions::builder().unique(true).build();

    // Candidate collection.
    let candidate_index = IndexModel::builder()
        .keys(doc! {"name": 1})
        .options(unique)
        .build();
    Coll::<Candidate>::from_db(db)
        .create_index(candidate_index, None)
        .await?;

    // Voter collection, for status queries.
    let status_index = IndexModel::builder().keys(doc! {"status": 1}).build();
    Coll::<MinimalVoter>::from_db(db)
        .create_index(status_index, None)
        .await?;

    Ok(())
}
