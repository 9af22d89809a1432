//! Append-only operation tape.
//!
//! A [`Tape`] records one execution path of the traced code as a list of
//! [`TapeEntry`] values in operator-execution order, together with the
//! locations designated as independents (inputs) and dependents (outputs).
//! Once sealed by [`Session::end_trace`](crate::Session::end_trace) a tape is
//! immutable and can be replayed at different inputs by the forward
//! evaluators in [`forward`].
//!
//! # Locations
//!
//! Independents and entry results draw locations from one counter, so
//! locations are never reused and every operand location of an entry is
//! strictly smaller than the entry's result location. The evaluator relies on
//! this to replay the tape in a single pass.
//!
//! # Limitations
//!
//! The tape records one execution path. Host-language branches taken during
//! tracing are baked in; only `abs`/`signum` keep enough information for the
//! evaluator to notice a different branch (see [`crate::nonsmooth`]).

use crate::float::Float;
use crate::opcode::{self, Aux, OpCode};

// Submodules add impl blocks to Tape<F>.
pub(crate) mod forward;
mod jacobian;
#[cfg(feature = "parallel")]
mod parallel;

mod thread_local;
pub use self::thread_local::TraceThreadLocal;
pub(crate) use self::thread_local::{install_active_tape, take_active_tape, with_active_tape};

/// Identifier of a tracing session and of the tape it produces.
pub type TapeId = u32;

/// One operand slot of a tape entry.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Operand<F> {
    /// Value produced at an earlier location.
    Location(u32),
    /// Literal recorded inline; it has no location and no derivative.
    Literal(F),
    /// Slot not read by the opcode.
    Unused,
}

impl<F: Float> Operand<F> {
    /// The referenced location, if any.
    #[inline]
    pub fn location(self) -> Option<u32> {
        match self {
            Operand::Location(loc) => Some(loc),
            _ => None,
        }
    }
}

/// A single recorded operation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TapeEntry<F> {
    /// Elementary operation.
    pub op: OpCode,
    /// Location written by this entry.
    pub result: u32,
    /// `[a, b]`; unary ops leave `b` as [`Operand::Unused`].
    pub operands: [Operand<F>; 2],
    /// Recorded branch or integer exponent.
    pub aux: Aux,
}

/// Summary counts of a tape.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TapeStats {
    pub id: TapeId,
    pub num_independents: usize,
    pub num_dependents: usize,
    pub num_locations: usize,
    pub num_entries: usize,
    /// Entries carrying a recorded branch (`abs`, `signum`).
    pub num_nonsmooth: usize,
}

/// A recorded operation sequence that can be replayed at different inputs.
///
/// Created through [`TapeStore::begin_trace`](crate::TapeStore::begin_trace)
/// or [`TapeStore::record`](crate::TapeStore::record).
#[derive(Clone, Debug)]
pub struct Tape<F: Float> {
    pub(crate) id: TapeId,
    /// Serial of the recording session, stamped on every handle it creates.
    pub(crate) session: u64,
    pub(crate) entries: Vec<TapeEntry<F>>,
    /// Recording-time value of every location.
    pub(crate) values: Vec<F>,
    pub(crate) independents: Vec<u32>,
    pub(crate) dependents: Vec<u32>,
}

impl<F: Float> Tape<F> {
    /// Create an empty tape.
    pub fn new(id: TapeId) -> Self {
        Tape {
            id,
            session: 0,
            entries: Vec::new(),
            values: Vec::new(),
            independents: Vec::new(),
            dependents: Vec::new(),
        }
    }

    /// Create an empty tape with room for about `est_ops` entries.
    pub fn with_capacity(id: TapeId, est_ops: usize) -> Self {
        Tape {
            id,
            session: 0,
            entries: Vec::with_capacity(est_ops),
            values: Vec::with_capacity(est_ops),
            independents: Vec::new(),
            dependents: Vec::new(),
        }
    }

    #[inline]
    fn next_location(&mut self, value: F) -> u32 {
        let loc = self.values.len() as u32;
        self.values.push(value);
        loc
    }

    /// Register a new independent. Returns its location.
    #[inline]
    pub(crate) fn new_independent(&mut self, value: F) -> u32 {
        let loc = self.next_location(value);
        self.independents.push(loc);
        loc
    }

    /// Record an operation whose value was computed by the caller. Returns
    /// the result location.
    #[inline]
    pub(crate) fn push_op(
        &mut self,
        op: OpCode,
        operands: [Operand<F>; 2],
        aux: Aux,
        value: F,
    ) -> u32 {
        let next = self.values.len() as u32;
        for loc in operands.iter().filter_map(|o| o.location()) {
            assert!(
                loc < next,
                "operand location {} is not on tape {} (stale handle from an earlier session?)",
                loc,
                self.id
            );
        }
        let result = self.next_location(value);
        self.entries.push(TapeEntry {
            op,
            result,
            operands,
            aux,
        });
        result
    }

    /// Materialise a literal at a fresh location.
    #[inline]
    pub(crate) fn push_const(&mut self, value: F) -> u32 {
        self.push_op(
            OpCode::Const,
            [Operand::Literal(value), Operand::Unused],
            Aux::None,
            value,
        )
    }

    /// Append `loc` to the dependents.
    #[inline]
    pub(crate) fn mark_dependent(&mut self, loc: u32) {
        assert!(
            (loc as usize) < self.values.len(),
            "dependent location {} is not on tape {}",
            loc,
            self.id
        );
        self.dependents.push(loc);
    }

    /// Session identifier this tape was recorded under.
    #[inline]
    pub fn id(&self) -> TapeId {
        self.id
    }

    /// Number of independents (`n`).
    #[inline]
    pub fn num_independents(&self) -> usize {
        self.independents.len()
    }

    /// Number of dependents (`m`).
    #[inline]
    pub fn num_dependents(&self) -> usize {
        self.dependents.len()
    }

    /// Number of locations used by the tape (size of the evaluation buffers).
    #[inline]
    pub fn num_locations(&self) -> usize {
        self.values.len()
    }

    /// Number of recorded entries.
    #[inline]
    pub fn num_entries(&self) -> usize {
        self.entries.len()
    }

    /// Recorded entries in append order.
    #[inline]
    pub fn entries(&self) -> &[TapeEntry<F>] {
        &self.entries
    }

    /// Independent locations in declaration order.
    #[inline]
    pub fn independents(&self) -> &[u32] {
        &self.independents
    }

    /// Dependent locations in declaration order.
    #[inline]
    pub fn dependents(&self) -> &[u32] {
        &self.dependents
    }

    /// Recording-time value of a location.
    #[inline]
    pub fn recorded_value(&self, loc: u32) -> Option<F> {
        self.values.get(loc as usize).copied()
    }

    /// Values the independents were bound to while tracing.
    pub fn recorded_inputs(&self) -> Vec<F> {
        self.independents
            .iter()
            .map(|&loc| self.values[loc as usize])
            .collect()
    }

    /// Dependent values observed while tracing.
    pub fn recorded_outputs(&self) -> Vec<F> {
        self.dependents
            .iter()
            .map(|&loc| self.values[loc as usize])
            .collect()
    }

    /// Summary counts.
    pub fn stats(&self) -> TapeStats {
        TapeStats {
            id: self.id,
            num_independents: self.num_independents(),
            num_dependents: self.num_dependents(),
            num_locations: self.num_locations(),
            num_entries: self.num_entries(),
            num_nonsmooth: self
                .entries
                .iter()
                .filter(|e| opcode::is_nonsmooth(e.op))
                .count(),
        }
    }

    /// Check the data-dependency invariant: results are fresh, increasing
    /// locations, every operand refers to an earlier location, and the
    /// operand slots match the opcode's arity.
    pub fn is_well_formed(&self) -> bool {
        let n = self.values.len() as u32;
        let mut last: Option<u32> = None;
        for entry in &self.entries {
            if entry.result >= n || last.is_some_and(|l| entry.result <= l) {
                return false;
            }
            if self.independents.contains(&entry.result) {
                return false;
            }
            for (slot, operand) in entry.operands.iter().enumerate() {
                let used = slot < entry.op.arity();
                match (*operand, used) {
                    (Operand::Location(loc), true) if loc >= entry.result => return false,
                    (Operand::Unused, true) => return false,
                    (Operand::Location(_) | Operand::Literal(_), false) if slot > 0 => {
                        return false
                    }
                    _ => {}
                }
            }
            last = Some(entry.result);
        }
        self.independents
            .iter()
            .chain(self.dependents.iter())
            .all(|&loc| loc < n)
    }
}
