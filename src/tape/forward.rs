//! Forward vector evaluator.
//!
//! Replays a sealed tape at a base point `x` while propagating a batch of `p`
//! seed directions, producing the dependents' values and one directional
//! derivative per (dependent, direction) pair. Propagating the whole batch
//! in one replay shares the per-entry dispatch and value recomputation
//! across all directions.

use crate::error::{check_len, Result};
use crate::float::Float;
use crate::nonsmooth::{BranchPolicy, BranchSwitch, ForwardReport};
use crate::opcode::{self, Branch, OpCode};

use super::{Operand, Tape};

/// Evaluator configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ForwardOptions {
    /// Derivative sign of `abs` away from its kink.
    pub branch_policy: BranchPolicy,
}

impl ForwardOptions {
    /// Options with the given branch policy.
    pub fn with_branch_policy(mut self, branch_policy: BranchPolicy) -> Self {
        self.branch_policy = branch_policy;
        self
    }
}

/// Per-evaluation buffers: one value per location and a
/// `locations × p` derivative matrix (row-major).
///
/// Fully reinitialised by every evaluation, so a scratch can be reused
/// across calls, tapes and direction counts without carrying state.
#[derive(Clone, Debug, Default)]
pub struct ForwardScratch<F> {
    values: Vec<F>,
    tangents: Vec<F>,
    p: usize,
}

impl<F: Float> ForwardScratch<F> {
    pub fn new() -> Self {
        ForwardScratch {
            values: Vec::new(),
            tangents: Vec::new(),
            p: 0,
        }
    }

    fn reset(&mut self, num_locations: usize, p: usize) {
        self.p = p;
        self.values.clear();
        self.values.resize(num_locations, F::zero());
        self.tangents.clear();
        self.tangents.resize(num_locations * p, F::zero());
    }

    /// Value computed for `loc` by the last evaluation.
    pub fn value(&self, loc: u32) -> Option<F> {
        self.values.get(loc as usize).copied()
    }

    /// Derivative row (`p` components) computed for `loc` by the last
    /// evaluation.
    pub fn direction_row(&self, loc: u32) -> Option<&[F]> {
        let start = loc as usize * self.p;
        self.tangents.get(start..start + self.p)
    }
}

/// Owned output of [`Tape::fov_forward`].
#[derive(Clone, Debug, PartialEq)]
pub struct ForwardResult<F> {
    /// Dependent values (`m`).
    pub values: Vec<F>,
    /// Directional derivatives, `m` rows of `p`.
    pub directions: Vec<Vec<F>>,
    pub report: ForwardReport<F>,
}

#[inline]
fn operand_value<F: Float>(values: &[F], operand: Operand<F>) -> F {
    match operand {
        Operand::Location(loc) => values[loc as usize],
        Operand::Literal(c) => c,
        Operand::Unused => F::zero(),
    }
}

/// Derivative row of an operand. Literals and unused slots have none.
#[inline]
fn operand_row<F: Float>(done: &[F], operand: Operand<F>, p: usize) -> Option<&[F]> {
    match operand {
        Operand::Location(loc) => {
            let start = loc as usize * p;
            Some(&done[start..start + p])
        }
        _ => None,
    }
}

/// `out = da·row(a) + db·row(b)`, skipping operands without a row so that a
/// non-finite partial of a literal cannot leak into the result.
#[inline]
fn propagate<F: Float>(out: &mut [F], a: Option<(F, &[F])>, b: Option<(F, &[F])>) {
    match (a, b) {
        (Some((da, ra)), Some((db, rb))) => {
            for ((o, &xa), &xb) in out.iter_mut().zip(ra).zip(rb) {
                *o = da * xa + db * xb;
            }
        }
        (Some((d, r)), None) | (None, Some((d, r))) => {
            for (o, &x) in out.iter_mut().zip(r) {
                *o = d * x;
            }
        }
        (None, None) => out.fill(F::zero()),
    }
}

impl<F: Float> Tape<F> {
    /// Forward vector evaluation returning owned buffers.
    ///
    /// `xd` holds one row of `p` direction components per independent; `p`
    /// is the length of the first row (`0` for a tape without independents,
    /// see [`fov_forward_into`](Self::fov_forward_into) to set it there).
    pub fn fov_forward(
        &self,
        options: &ForwardOptions,
        x: &[F],
        xd: &[Vec<F>],
    ) -> Result<ForwardResult<F>> {
        let p = xd.first().map_or(0, Vec::len);
        let m = self.num_dependents();
        let mut values = vec![F::zero(); m];
        let mut directions = vec![vec![F::zero(); p]; m];
        let report = self.fov_forward_into(options, p, x, xd, &mut values, &mut directions)?;
        Ok(ForwardResult {
            values,
            directions,
            report,
        })
    }

    /// Forward vector evaluation into caller-owned buffers.
    ///
    /// Shapes: `x` is `n`, `xd` is `n × p`, `y` is `m`, `yd` is `m × p`.
    /// Nothing is written unless all shapes match.
    pub fn fov_forward_into(
        &self,
        options: &ForwardOptions,
        p: usize,
        x: &[F],
        xd: &[Vec<F>],
        y: &mut [F],
        yd: &mut [Vec<F>],
    ) -> Result<ForwardReport<F>> {
        let mut scratch = ForwardScratch::new();
        self.fov_forward_with_scratch(options, p, x, xd, y, yd, &mut scratch)
    }

    /// Like [`fov_forward_into`](Self::fov_forward_into) but reuses
    /// caller-provided scratch buffers to avoid allocation on repeated calls.
    #[allow(clippy::too_many_arguments)]
    pub fn fov_forward_with_scratch(
        &self,
        options: &ForwardOptions,
        p: usize,
        x: &[F],
        xd: &[Vec<F>],
        y: &mut [F],
        yd: &mut [Vec<F>],
        scratch: &mut ForwardScratch<F>,
    ) -> Result<ForwardReport<F>> {
        self.check_shapes(x, y)?;
        check_len("direction rows", self.num_independents(), xd.len())?;
        check_len("output direction rows", self.num_dependents(), yd.len())?;
        for row in xd {
            check_len("directions per independent", p, row.len())?;
        }
        for row in yd.iter() {
            check_len("directions per dependent", p, row.len())?;
        }

        let report = self.sweep(options, x, p, scratch, |i, row| row.copy_from_slice(&xd[i]));
        self.gather(scratch, y, |i, row| yd[i].copy_from_slice(row));
        Ok(report)
    }

    /// Zero-order scalar forward: dependent values only.
    pub fn zos_forward(&self, x: &[F], y: &mut [F]) -> Result<ForwardReport<F>> {
        self.check_shapes(x, y)?;
        let mut scratch = ForwardScratch::new();
        let report = self.sweep(&ForwardOptions::default(), x, 0, &mut scratch, |_, _| {});
        self.gather(&scratch, y, |_, _| {});
        Ok(report)
    }

    /// First-order scalar forward: a single direction `xd` (length `n`),
    /// derivative `yd` (length `m`).
    pub fn fos_forward(
        &self,
        options: &ForwardOptions,
        x: &[F],
        xd: &[F],
        y: &mut [F],
        yd: &mut [F],
    ) -> Result<ForwardReport<F>> {
        self.check_shapes(x, y)?;
        check_len("direction", self.num_independents(), xd.len())?;
        check_len("output direction", self.num_dependents(), yd.len())?;
        let mut scratch = ForwardScratch::new();
        let report = self.sweep(options, x, 1, &mut scratch, |i, row| row[0] = xd[i]);
        self.gather(&scratch, y, |i, row| yd[i] = row[0]);
        Ok(report)
    }

    pub(crate) fn check_shapes(&self, x: &[F], y: &[F]) -> Result<()> {
        check_len("independents", self.num_independents(), x.len())?;
        check_len("dependents", self.num_dependents(), y.len())
    }

    /// Replay all entries in recording order. `seed(i, row)` fills the `p`
    /// direction components of independent `i`. Shapes must be checked by
    /// the caller.
    pub(crate) fn sweep(
        &self,
        options: &ForwardOptions,
        x: &[F],
        p: usize,
        scratch: &mut ForwardScratch<F>,
        mut seed: impl FnMut(usize, &mut [F]),
    ) -> ForwardReport<F> {
        log::trace!(
            "forward sweep on tape {}: n={} m={} p={} entries={}",
            self.id,
            self.num_independents(),
            self.num_dependents(),
            p,
            self.entries.len()
        );
        scratch.reset(self.num_locations(), p);

        for (i, &loc) in self.independents.iter().enumerate() {
            let loc = loc as usize;
            scratch.values[loc] = x[i];
            seed(i, &mut scratch.tangents[loc * p..(loc + 1) * p]);
        }

        let mut report = ForwardReport::new();
        for entry in &self.entries {
            let r = entry.result as usize;
            let [lhs, rhs] = entry.operands;
            let a = operand_value(&scratch.values, lhs);
            let b = operand_value(&scratch.values, rhs);
            let value = opcode::eval_value(entry.op, a, b, entry.aux);
            scratch.values[r] = value;

            if let Some(recorded) = entry.aux.branch() {
                let replayed = Branch::of(a);
                if replayed != recorded {
                    report.branch_switches.push(BranchSwitch {
                        location: entry.result,
                        opcode: entry.op,
                        recorded,
                        replayed,
                        switching_value: a,
                    });
                }
            }

            // Operand locations are always below the result location.
            let (done, rest) = scratch.tangents.split_at_mut(r * p);
            let out = &mut rest[..p];
            match entry.op {
                OpCode::Abs => match operand_row(done, lhs, p) {
                    Some(row) if a == F::zero() => {
                        for (o, &d) in out.iter_mut().zip(row) {
                            *o = d.abs();
                        }
                    }
                    Some(row) => {
                        let s = options.branch_policy.abs_sign(entry.aux.branch(), a);
                        propagate(out, Some((s, row)), None);
                    }
                    None => out.fill(F::zero()),
                },
                op => {
                    let (da, db) = opcode::partials(op, a, b, value, entry.aux);
                    propagate(
                        out,
                        operand_row(done, lhs, p).map(|row| (da, row)),
                        operand_row(done, rhs, p).map(|row| (db, row)),
                    );
                }
            }
        }

        if !report.is_consistent() {
            log::debug!(
                "tape {}: {} nonsmooth entries left their recorded branch",
                self.id,
                report.branch_switches.len()
            );
        }
        report
    }

    /// Copy dependent values into `y` and hand each dependent's derivative
    /// row to `row_out`, in dependent-declaration order.
    pub(crate) fn gather(
        &self,
        scratch: &ForwardScratch<F>,
        y: &mut [F],
        mut row_out: impl FnMut(usize, &[F]),
    ) {
        let p = scratch.p;
        for (i, &loc) in self.dependents.iter().enumerate() {
            let loc = loc as usize;
            y[i] = scratch.values[loc];
            row_out(i, &scratch.tangents[loc * p..(loc + 1) * p]);
        }
    }
}
