//! Domain types, identity protection, and the registry they are stored in.

pub mod api;
pub mod ballot;
pub mod binding;
pub mod candidate;
pub mod identity;
pub mod mongodb;
pub mod redaction;
pub mod secrets;
pub mod store;
pub mod voter;
