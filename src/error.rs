//! Session and shape errors.
//!
//! Arithmetic domain errors are not represented here: they propagate through
//! a replay as NaN/Inf like ordinary floating-point arithmetic. Misuse of an
//! active handle while nothing is recording is a contract violation and
//! panics instead.

use thiserror::Error;

use crate::tape::TapeId;

/// Errors reported by the recorder and the evaluators.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Error {
    /// `begin_trace` was called for the tape that is currently recording.
    #[error("tape {0} is already open for recording")]
    TapeAlreadyOpen(TapeId),

    /// `begin_trace` was called while a different tape is recording.
    #[error("cannot open tape {requested}: tape {active} is still recording")]
    RecordingInProgress {
        /// Tape that holds the recording slot.
        active: TapeId,
        /// Tape that was asked for.
        requested: TapeId,
    },

    /// No sealed tape with this id exists in the store.
    #[error("tape {0} does not exist")]
    TapeNotFound(TapeId),

    /// The tape is still being recorded and cannot be evaluated yet.
    #[error("tape {0} has not been sealed")]
    TapeNotSealed(TapeId),

    /// An argument does not have the shape recorded on the tape.
    #[error("shape mismatch for {what}: expected {expected}, found {found}")]
    ShapeMismatch {
        /// Which argument or dimension disagrees.
        what: &'static str,
        expected: usize,
        found: usize,
    },
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Fail with [`Error::ShapeMismatch`] unless `found == expected`.
#[inline]
pub(crate) fn check_len(what: &'static str, expected: usize, found: usize) -> Result<()> {
    if expected == found {
        Ok(())
    } else {
        Err(Error::ShapeMismatch {
            what,
            expected,
            found,
        })
    }
}
