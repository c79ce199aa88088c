//! Translation of driver errors into [`DocumentStoreError`].

use mongodb::error::{Error, ErrorKind, WriteFailure};
use std::io;

use itemlayer_core::error::DocumentStoreError;

/// Duplicate key on a unique index.
const DUPLICATE_KEY: i32 = 11000;
/// Operation exceeded its time limit on the server.
const MAX_TIME_EXPIRED: i32 = 50;

/// Classifies a server error code.
pub(crate) fn from_code(code: i32, message: String) -> DocumentStoreError {
    match code {
        DUPLICATE_KEY => DocumentStoreError::ConstraintViolation(message),
        MAX_TIME_EXPIRED => DocumentStoreError::Timeout(message),
        _ => DocumentStoreError::Backend(message),
    }
}

/// Maps a driver error onto the store error taxonomy.
pub(crate) fn map_error(err: Error) -> DocumentStoreError {
    let message = err.to_string();

    match *err.kind {
        ErrorKind::Io(ref io_err) if io_err.kind() == io::ErrorKind::TimedOut => {
            DocumentStoreError::Timeout(message)
        }
        ErrorKind::Io(_) | ErrorKind::ServerSelection { .. } | ErrorKind::ConnectionPoolCleared { .. } => {
            DocumentStoreError::Unavailable(message)
        }
        ErrorKind::Command(ref command) => from_code(command.code, message),
        ErrorKind::Write(WriteFailure::WriteError(ref write)) => from_code(write.code, message),
        _ => DocumentStoreError::Backend(message),
    }
}
