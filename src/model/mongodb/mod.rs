mod collection;
mod counter;
mod registry;

pub use collection::{ensure_indexes_exist, Coll, MongoCollection};
pub use counter::{ensure_candidate_id_counter_exists, Counter, CANDIDATE_ID_COUNTER_ID};
pub use registry::{MongoRegistry, MongoSecrets};
