//! The voting protocol: sessions, ballot drafts and submission.
//!
//! Everything here takes the current time as an argument and reaches storage only through
//! [`VotingStore`].

mod catalog;
mod draft;
mod session;
mod store;
mod submission;

#[cfg(test)]
pub mod memory;

pub use catalog::{CatalogPosition, PositionCatalog};
pub use draft::{BallotDraft, PositionChoice, PositionMutation, SelectionValidator};
pub use session::SessionManager;
pub use store::{DynStore, VotingStore};
pub use submission::SubmissionCoordinator;
