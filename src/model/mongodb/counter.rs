use mongodb::{
    bson::doc,
    options::{FindOneAndUpdateOptions, ReturnDocument, UpdateOptions},
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::mongodb::Coll;

/// The ID of the counter that assigns candidate IDs.
pub const CANDIDATE_ID_COUNTER_ID: &str = "candidate_id";

/// A counter object used to implement auto-increment fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Counter {
    #[serde(rename = "_id")]
    pub id: String,
    pub next: u32,
}

impl Counter {
    /// Create a new `Counter` starting at the given value.
    pub fn new(id: impl Into<String>, start: u32) -> Self {
        Self {
            id: id.into(),
            next: start,
        }
    }

    /// Atomically retrieve the next value of the counter with the given ID.
    pub async fn next(counters: &Coll<Counter>, id: &str) -> Result<u32> {
        let update = doc! {
            "$inc": { "next": 1 }
        };
        let options: FindOneAndUpdateOptions = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::Before)
            .build();
        let counter = counters
            .find_one_and_update(doc! { "_id": id }, update, options)
            .await?
            .ok_or_else(|| Error::not_found(format!("Counter with ID '{}'", id)))?;
        Ok(counter.next)
    }
}

/// Ensure the candidate ID counter exists, starting from 1.
///
/// This operation is idempotent: an existing counter is left untouched.
pub async fn ensure_candidate_id_counter_exists(counters: &Coll<Counter>) -> Result<()> {
    let counter = Counter::new(CANDIDATE_ID_COUNTER_ID, 1);
    let options = UpdateOptions::builder().upsert(true).build();
    counters
        .update_one(
            doc! { "_id": counter.id.as_str() },
            doc! { "$setOnInsert": { "next": counter.next } },
            options,
        )
        .await?;
    Ok(())
}
