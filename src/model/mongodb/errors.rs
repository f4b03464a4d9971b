//! For some reason, the mongodb crate doesn't provide error code constants.
//! This module fills in the gaps.

use mongodb::error::{Error as DbError, ErrorKind, WriteFailure};

pub const DUPLICATE_KEY: i32 = 11000;
pub const WRITE_CONFLICT: i32 = 112;

/// If the given error is a duplicate key write error, return the server's message,
/// which names the violated index.
pub fn duplicate_key_message(err: &DbError) -> Option<&str> {
    match *err.kind {
        ErrorKind::Write(WriteFailure::WriteError(ref e)) if e.code == DUPLICATE_KEY => {
            Some(&e.message)
        }
        ErrorKind::Command(ref e) if e.code == DUPLICATE_KEY => Some(&e.message),
        _ => None,
    }
}

/// Return true if the given error is a duplicate key write error.
pub fn is_duplicate_key_error(err: &DbError) -> bool {
    duplicate_key_message(err).is_some()
}

/// Return true if the given error means a concurrent transaction touched the same documents.
///
/// Only the server's WriteConflict code counts. The driver also labels network errors and
/// elections inside a transaction as transient, but those never committed anything.
pub fn is_write_conflict(err: &DbError) -> bool {
    match *err.kind {
        ErrorKind::Command(ref e) => e.code == WRITE_CONFLICT,
        ErrorKind::Write(WriteFailure::WriteError(ref e)) => e.code == WRITE_CONFLICT,
        _ => false,
    }
}
