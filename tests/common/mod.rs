use std::sync::{Mutex, MutexGuard, PoisonError};

static RECORDING: Mutex<()> = Mutex::new(());

/// Serialise tests that open a recording session: only one session may be
/// recording in the process at a time.
pub fn recording_lock() -> MutexGuard<'static, ()> {
    RECORDING.lock().unwrap_or_else(PoisonError::into_inner)
}
