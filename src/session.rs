//! Tracing sessions and the store of sealed tapes.
//!
//! A [`TapeStore`] owns every sealed tape, addressed by [`TapeId`].
//! [`TapeStore::begin_trace`] opens a [`Session`], which installs a fresh
//! tape in the current thread's recording slot; [`Active`] operations append
//! to it until [`Session::end_trace`] seals the tape and moves it into the
//! store.
//!
//! At most one session records at a time in the whole process, across all
//! stores, threads and float types. Opening a second one fails immediately.
//!
//! Sealed tapes are immutable and shared as `Arc<Tape<F>>`, so evaluations
//! may run concurrently from any number of threads.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::active::Active;
use crate::error::{check_len, Error, Result};
use crate::float::Float;
use crate::nonsmooth::ForwardReport;
use crate::tape::forward::ForwardOptions;
use crate::tape::{self, Tape, TapeId, TapeStats, TraceThreadLocal};

/// Tape id of the session currently recording anywhere in the process.
static RECORDING: Mutex<Option<TapeId>> = Mutex::new(None);

/// Source of session serials; `0` is reserved for constants.
static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

fn lock_process_recording() -> MutexGuard<'static, Option<TapeId>> {
    RECORDING.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Store of sealed tapes.
#[derive(Debug)]
pub struct TapeStore<F: Float> {
    tapes: RwLock<HashMap<TapeId, Arc<Tape<F>>>>,
    recording: Mutex<Option<TapeId>>,
}

impl<F: Float> Default for TapeStore<F> {
    fn default() -> Self {
        Self::new()
    }
}

// Lock poisoning is ignored: every critical section leaves the guarded data
// consistent.
impl<F: Float> TapeStore<F> {
    /// Create an empty store.
    pub fn new() -> Self {
        TapeStore {
            tapes: RwLock::new(HashMap::new()),
            recording: Mutex::new(None),
        }
    }

    fn read_tapes(&self) -> RwLockReadGuard<'_, HashMap<TapeId, Arc<Tape<F>>>> {
        self.tapes.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_tapes(&self) -> RwLockWriteGuard<'_, HashMap<TapeId, Arc<Tape<F>>>> {
        self.tapes.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_recording(&self) -> MutexGuard<'_, Option<TapeId>> {
        self.recording.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Id of the tape this store is currently recording, if any.
    pub fn recording(&self) -> Option<TapeId> {
        *self.lock_recording()
    }

    /// Sealed tape `id`.
    pub fn tape(&self, id: TapeId) -> Result<Arc<Tape<F>>> {
        if self.recording() == Some(id) {
            return Err(Error::TapeNotSealed(id));
        }
        self.read_tapes()
            .get(&id)
            .cloned()
            .ok_or(Error::TapeNotFound(id))
    }

    /// True if a sealed tape `id` exists.
    pub fn contains(&self, id: TapeId) -> bool {
        self.read_tapes().contains_key(&id)
    }

    /// Ids of all sealed tapes, ascending.
    pub fn ids(&self) -> Vec<TapeId> {
        let mut ids: Vec<TapeId> = self.read_tapes().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Remove a sealed tape. Evaluations already holding it are unaffected.
    pub fn remove(&self, id: TapeId) -> Option<Arc<Tape<F>>> {
        self.write_tapes().remove(&id)
    }

    /// Summary counts of sealed tape `id`.
    pub fn stats(&self, id: TapeId) -> Result<TapeStats> {
        Ok(self.tape(id)?.stats())
    }

    /// Forward vector evaluation of tape `id` with default options.
    ///
    /// `m`, `n` must equal the tape's dependent and independent counts;
    /// `x` is `n`, `xd` is `n × p`, `y` is `m`, `yd` is `m × p`. On error
    /// nothing is evaluated and the output buffers are untouched.
    #[allow(clippy::too_many_arguments)]
    pub fn fov_forward(
        &self,
        id: TapeId,
        m: usize,
        n: usize,
        p: usize,
        x: &[F],
        xd: &[Vec<F>],
        y: &mut [F],
        yd: &mut [Vec<F>],
    ) -> Result<ForwardReport<F>> {
        self.fov_forward_with(&ForwardOptions::default(), id, m, n, p, x, xd, y, yd)
    }

    /// [`fov_forward`](Self::fov_forward) with explicit options.
    #[allow(clippy::too_many_arguments)]
    pub fn fov_forward_with(
        &self,
        options: &ForwardOptions,
        id: TapeId,
        m: usize,
        n: usize,
        p: usize,
        x: &[F],
        xd: &[Vec<F>],
        y: &mut [F],
        yd: &mut [Vec<F>],
    ) -> Result<ForwardReport<F>> {
        let tape = self.tape(id)?;
        check_dims(&tape, m, n)?;
        tape.fov_forward_into(options, p, x, xd, y, yd)
    }

    /// Zero-order scalar forward of tape `id`: values only.
    pub fn zos_forward(
        &self,
        id: TapeId,
        m: usize,
        n: usize,
        x: &[F],
        y: &mut [F],
    ) -> Result<ForwardReport<F>> {
        let tape = self.tape(id)?;
        check_dims(&tape, m, n)?;
        tape.zos_forward(x, y)
    }

    /// First-order scalar forward of tape `id`: one direction.
    #[allow(clippy::too_many_arguments)]
    pub fn fos_forward(
        &self,
        id: TapeId,
        m: usize,
        n: usize,
        x: &[F],
        xd: &[F],
        y: &mut [F],
        yd: &mut [F],
    ) -> Result<ForwardReport<F>> {
        let tape = self.tape(id)?;
        check_dims(&tape, m, n)?;
        tape.fos_forward(&ForwardOptions::default(), x, xd, y, yd)
    }

    /// Full Jacobian of tape `id` at `x` (forward vector mode, identity seed).
    pub fn jacobian(&self, id: TapeId, x: &[F]) -> Result<(Vec<F>, Vec<Vec<F>>)> {
        self.tape(id)?.jacobian(&ForwardOptions::default(), x)
    }
}

fn check_dims<F: Float>(tape: &Tape<F>, m: usize, n: usize) -> Result<()> {
    check_len("independents", tape.num_independents(), n)?;
    check_len("dependents", tape.num_dependents(), m)
}

impl<F: TraceThreadLocal> TapeStore<F> {
    /// Open a recording session for tape `id`.
    ///
    /// Fails if any session is recording in the process. Sealing a session
    /// for an id that already names a sealed tape replaces that tape.
    pub fn begin_trace(&self, id: TapeId) -> Result<Session<'_, F>> {
        self.begin_trace_with_capacity(id, 0)
    }

    /// [`begin_trace`](Self::begin_trace) with room for about `est_ops`
    /// entries.
    pub fn begin_trace_with_capacity(&self, id: TapeId, est_ops: usize) -> Result<Session<'_, F>> {
        let mut process = lock_process_recording();
        let mut recording = self.lock_recording();
        if let Some(active) = *process {
            return Err(if *recording == Some(id) {
                Error::TapeAlreadyOpen(id)
            } else {
                Error::RecordingInProgress {
                    active,
                    requested: id,
                }
            });
        }

        let serial = NEXT_SESSION.fetch_add(1, Ordering::Relaxed);
        let mut tape = Tape::<F>::with_capacity(id, est_ops);
        tape.session = serial;
        tape::install_active_tape(tape).map_err(|active| Error::RecordingInProgress {
            active,
            requested: id,
        })?;
        *process = Some(id);
        *recording = Some(id);
        log::debug!("tape {}: tracing started", id);

        Ok(Session {
            store: self,
            id,
            serial,
            finished: false,
            _not_send: PhantomData,
        })
    }

    /// Record `f` as tape `id`: binds `x` as the independents, marks the
    /// returned handles as dependents in order and seals the tape.
    ///
    /// Returns the dependent values observed while tracing.
    pub fn record(
        &self,
        id: TapeId,
        x: &[F],
        f: impl FnOnce(&[Active<F>]) -> Vec<Active<F>>,
    ) -> Result<Vec<F>> {
        let mut session = self.begin_trace_with_capacity(id, x.len() * 10)?;
        let inputs = session.independents(x);
        let outputs = f(&inputs);
        let values: Vec<F> = outputs.into_iter().map(|y| session.dependent(y)).collect();
        session.end_trace()?;
        Ok(values)
    }

    fn release(&self, id: TapeId) {
        let mut recording = self.lock_recording();
        if *recording == Some(id) {
            *recording = None;
        }
        drop(recording);
        *lock_process_recording() = None;
    }
}

/// An open recording session.
///
/// Not `Send`: the tape being recorded lives in the opening thread's
/// recording slot. Dropping a session without [`end_trace`](Self::end_trace)
/// discards the recording.
#[derive(Debug)]
pub struct Session<'s, F: TraceThreadLocal> {
    store: &'s TapeStore<F>,
    id: TapeId,
    serial: u64,
    finished: bool,
    _not_send: PhantomData<*const ()>,
}

impl<F: TraceThreadLocal> Session<'_, F> {
    /// Id of the tape being recorded.
    #[inline]
    pub fn id(&self) -> TapeId {
        self.id
    }

    /// Bind a new independent with recording-time value `value`.
    pub fn independent(&mut self, value: F) -> Active<F> {
        let loc = tape::with_active_tape(self.id, self.serial, |t| t.new_independent(value));
        Active::from_tape(value, loc, self.id, self.serial)
    }

    /// Bind one independent per value, in order.
    pub fn independents(&mut self, values: &[F]) -> Vec<Active<F>> {
        values.iter().map(|&v| self.independent(v)).collect()
    }

    /// Mark `x` as the next dependent and return its recording-time value.
    ///
    /// A constant handle is first materialised at a fresh location.
    pub fn dependent(&mut self, x: Active<F>) -> F {
        let id = self.id;
        tape::with_active_tape(id, self.serial, |t| {
            let loc = match x.tape_id() {
                None => t.push_const(x.value),
                Some(owner) => {
                    assert_eq!(owner, id, "handle of tape {} marked dependent on tape {}", owner, id);
                    assert_eq!(
                        x.session, t.session,
                        "handle of tape {} from an earlier session marked dependent",
                        owner
                    );
                    x.index
                }
            };
            t.mark_dependent(loc);
        });
        x.value
    }

    /// Counts of the tape recorded so far.
    pub fn stats(&self) -> TapeStats {
        tape::with_active_tape(self.id, self.serial, |t: &mut Tape<F>| t.stats())
    }

    /// Seal the tape and move it into the store.
    pub fn end_trace(mut self) -> Result<TapeStats> {
        self.finished = true;
        let Some(tape) = tape::take_active_tape::<F>(self.id) else {
            self.store.release(self.id);
            return Err(Error::TapeNotFound(self.id));
        };
        debug_assert!(tape.is_well_formed(), "tape {} violates the append-order invariant", self.id);
        let stats = tape.stats();
        self.store.write_tapes().insert(self.id, Arc::new(tape));
        self.store.release(self.id);
        log::debug!(
            "tape {}: sealed with {} entries, {} independents, {} dependents",
            stats.id,
            stats.num_entries,
            stats.num_independents,
            stats.num_dependents
        );
        Ok(stats)
    }
}

impl<F: TraceThreadLocal> Drop for Session<'_, F> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        tape::take_active_tape::<F>(self.id);
        self.store.release(self.id);
        log::warn!("tape {}: session dropped before end_trace, recording discarded", self.id);
    }
}
