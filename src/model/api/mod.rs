//! Types exchanged with voters over the HTTP API.

pub mod draft;
pub mod identity;
pub mod receipt;
pub mod session;
