//! DB-compatible (e.g. de/serialisable) types.
//!
//! The types in this module are serialised in an DB-friendly way, e.g.:
//!
//! - IDs and datetimes are serialised in MongoDB's own format.
//! - Maps keyed by IDs are serialised with string keys.

pub mod ballot;
pub mod candidate;
pub mod election;
pub mod session;
