//! Document-store module: entity views and SQL repositories.
//!
//! The store is deliberately opaque to the rest of the pipeline: a
//! collection-with-indexes that supports truncate-and-insert for event
//! snapshots and keyed upserts for restaurants. Callers import from
//! `goodrec_ingest::db`, which re-exports the repository API.

pub mod model;
pub mod repo;

pub use model::StoredRestaurant;
pub use repo::*;
