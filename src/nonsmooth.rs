//! Nonsmooth replay: branch policy and branch-switch reporting.
//!
//! `abs` and `signum` record which side of their kink the operand was on
//! while tracing. A replay at different inputs may land on the other side;
//! the [`BranchPolicy`] decides which sign the `abs` derivative uses there,
//! and every such entry is listed in the [`ForwardReport`] returned by the
//! evaluator.
//!
//! Independently of the policy, a replay-time operand of exactly zero makes
//! `abs` propagate `|ẋ|` componentwise: the derivative at the kink is the
//! one-sided derivative in the direction of travel, which is non-negative.

use crate::float::Float;
use crate::opcode::{Branch, OpCode};

/// How `abs` picks its derivative sign away from the kink.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BranchPolicy {
    /// Differentiate along the branch recorded while tracing. An entry
    /// recorded exactly at the kink falls back to the replay-time sign.
    #[default]
    Recorded,
    /// Differentiate along the branch of the replay-time operand.
    Replay,
}

impl BranchPolicy {
    /// Sign used for the `abs` derivative of an operand `a != 0`.
    #[inline]
    pub(crate) fn abs_sign<F: Float>(self, recorded: Option<Branch>, a: F) -> F {
        match (self, recorded) {
            (BranchPolicy::Recorded, Some(b @ (Branch::Positive | Branch::Negative))) => b.sign(),
            _ => Branch::of(a).sign(),
        }
    }
}

/// A nonsmooth entry whose replay-time branch differs from the recorded one.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BranchSwitch<F> {
    /// Result location of the entry.
    pub location: u32,
    /// `Abs` or `Signum`.
    pub opcode: OpCode,
    /// Branch taken while tracing.
    pub recorded: Branch,
    /// Branch taken by this replay.
    pub replayed: Branch,
    /// Replay-time operand (distance from the kink).
    pub switching_value: F,
}

/// Outcome of a forward evaluation beyond the numbers written to the
/// caller's buffers.
#[derive(Clone, Debug, PartialEq)]
pub struct ForwardReport<F> {
    /// Branch switches in tape order.
    pub branch_switches: Vec<BranchSwitch<F>>,
}

impl<F: Float> ForwardReport<F> {
    pub(crate) fn new() -> Self {
        ForwardReport {
            branch_switches: Vec::new(),
        }
    }

    /// True if every nonsmooth entry took its recorded branch, i.e. the
    /// replay followed the traced execution path.
    pub fn is_consistent(&self) -> bool {
        self.branch_switches.is_empty()
    }

    /// Branch switches whose operand landed exactly on the kink. A NaN
    /// operand is on neither side and is not a kink.
    pub fn kinks(&self) -> impl Iterator<Item = &BranchSwitch<F>> {
        self.branch_switches
            .iter()
            .filter(|s| s.replayed == Branch::Zero && s.switching_value == F::zero())
    }
}

impl<F: Float> Default for ForwardReport<F> {
    fn default() -> Self {
        Self::new()
    }
}
