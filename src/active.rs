//! Active value handle.
//!
//! [`Active<F>`] is the numeric type substituted for `F` inside traced code.
//! Every operation on a handle appends one entry to the tape of the session
//! open on the current thread and returns a handle bound to the entry's
//! fresh result location. Handles also carry their recording-time value, so
//! traced code can branch on it and dependents can be reported back.

use std::fmt::{self, Display};

use crate::float::Float;
use crate::opcode::{self, Aux, Branch, OpCode};
use crate::tape::{self, Operand, TapeId, TraceThreadLocal};

/// Sentinel location for constant handles (not on any tape).
pub const CONSTANT: u32 = u32::MAX;

/// Tagged handle: recording-time value, location and owning session.
///
/// `Copy`; a handle never changes after creation, operations produce new
/// handles.
#[derive(Clone, Copy, Debug)]
pub struct Active<F: Float> {
    pub(crate) value: F,
    pub(crate) index: u32,
    pub(crate) tape: TapeId,
    /// Serial of the session that created the handle; `0` for constants.
    pub(crate) session: u64,
}

impl<F: Float> Active<F> {
    /// Create a constant (not tracked on any tape). Used as an operand it is
    /// recorded inline as a literal.
    #[inline]
    pub fn constant(value: F) -> Self {
        Active {
            value,
            index: CONSTANT,
            tape: 0,
            session: 0,
        }
    }

    /// Bind a handle to a tape location (internal use).
    #[inline]
    pub(crate) fn from_tape(value: F, index: u32, tape: TapeId, session: u64) -> Self {
        Active {
            value,
            index,
            tape,
            session,
        }
    }

    /// Recording-time value.
    #[inline]
    pub fn value(&self) -> F {
        self.value
    }

    /// Location on the tape, `None` for constants.
    #[inline]
    pub fn location(&self) -> Option<u32> {
        if self.is_constant() {
            None
        } else {
            Some(self.index)
        }
    }

    /// Tape the handle belongs to, `None` for constants.
    #[inline]
    pub fn tape_id(&self) -> Option<TapeId> {
        if self.is_constant() {
            None
        } else {
            Some(self.tape)
        }
    }

    #[inline]
    pub fn is_constant(&self) -> bool {
        self.index == CONSTANT
    }

    #[inline]
    pub(crate) fn operand(&self) -> Operand<F> {
        if self.is_constant() {
            Operand::Literal(self.value)
        } else {
            Operand::Location(self.index)
        }
    }
}

/// Record a unary op. Constants fold without touching the tape.
#[inline]
pub(crate) fn record_unary<F: TraceThreadLocal>(x: Active<F>, op: OpCode, aux: Aux) -> Active<F> {
    let value = opcode::eval_value(op, x.value, F::zero(), aux);
    if x.is_constant() {
        return Active::constant(value);
    }
    let index = tape::with_active_tape(x.tape, x.session, |t| {
        t.push_op(op, [x.operand(), Operand::Unused], aux, value)
    });
    Active::from_tape(value, index, x.tape, x.session)
}

/// Record a binary op. Constant operands are stored inline as literals; if
/// both operands are constant the result is a constant.
#[inline]
pub(crate) fn record_binary<F: TraceThreadLocal>(
    lhs: Active<F>,
    rhs: Active<F>,
    op: OpCode,
) -> Active<F> {
    let value = opcode::eval_value(op, lhs.value, rhs.value, Aux::None);
    let owner = match (lhs.is_constant(), rhs.is_constant()) {
        (true, true) => return Active::constant(value),
        (false, false) => {
            assert_eq!(
                lhs.tape, rhs.tape,
                "cannot combine handles of tapes {} and {}",
                lhs.tape, rhs.tape
            );
            assert_eq!(
                lhs.session, rhs.session,
                "cannot combine handles of tape {} from different sessions",
                lhs.tape
            );
            lhs
        }
        (false, true) => lhs,
        (true, false) => rhs,
    };
    let index = tape::with_active_tape(owner.tape, owner.session, |t| {
        t.push_op(op, [lhs.operand(), rhs.operand()], Aux::None, value)
    });
    Active::from_tape(value, index, owner.tape, owner.session)
}

macro_rules! unary_methods {
    ($($(#[$doc:meta])* $name:ident => $op:ident;)*) => {
        $(
            $(#[$doc])*
            #[inline]
            pub fn $name(self) -> Self {
                record_unary(self, OpCode::$op, Aux::None)
            }
        )*
    };
}

impl<F: TraceThreadLocal> Active<F> {
    unary_methods! {
        exp => Exp;
        /// Natural logarithm.
        ln => Ln;
        log10 => Log10;
        sqrt => Sqrt;
        sin => Sin;
        cos => Cos;
        tan => Tan;
        asin => Asin;
        acos => Acos;
        atan => Atan;
        sinh => Sinh;
        cosh => Cosh;
        tanh => Tanh;
        asinh => Asinh;
        acosh => Acosh;
        atanh => Atanh;
        /// `self + 1` (prefix/postfix increment).
        inc => Incr;
        /// `self - 1`.
        dec => Decr;
        /// Unary plus: records a copy at a fresh location.
        pos => Pos;
    }

    /// Absolute value. Records the branch taken at the recording-time value.
    #[inline]
    pub fn abs(self) -> Self {
        record_unary(self, OpCode::Abs, Aux::Branch(Branch::of(self.value)))
    }

    /// `+1`, `-1` or `0`. Records the branch taken at the recording-time value.
    #[inline]
    pub fn signum(self) -> Self {
        record_unary(self, OpCode::Signum, Aux::Branch(Branch::of(self.value)))
    }

    /// Integer power with the exponent recorded on the tape.
    #[inline]
    pub fn powi(self, n: i32) -> Self {
        record_unary(self, OpCode::Powi, Aux::Exponent(n))
    }

    /// `self · 2^e`.
    #[inline]
    pub fn ldexp(self, e: i32) -> Self {
        record_unary(self, OpCode::Ldexp, Aux::Exponent(e))
    }

    /// Split into mantissa and binary exponent: `self = m · 2^e` with
    /// `|m|` in `[0.5, 1)`.
    ///
    /// The exponent is fixed at recording time; replaying at another input
    /// scales by the same power of two.
    #[inline]
    pub fn frexp(self) -> (Self, i32) {
        let e = opcode::frexp_exponent(self.value);
        (record_unary(self, OpCode::Frexp, Aux::Exponent(e)), e)
    }

    /// `self^exponent` with both operands active.
    #[inline]
    pub fn pow(self, exponent: Self) -> Self {
        record_binary(self, exponent, OpCode::Pow)
    }

    /// `self^e` with a literal exponent.
    #[inline]
    pub fn powf(self, e: F) -> Self {
        record_binary(self, Active::constant(e), OpCode::Pow)
    }

    /// `base^exponent` with a literal base.
    #[inline]
    pub fn const_pow(base: F, exponent: Self) -> Self {
        record_binary(Active::constant(base), exponent, OpCode::Pow)
    }

    /// Four-quadrant arctangent of `self / other`.
    #[inline]
    pub fn atan2(self, other: Self) -> Self {
        record_binary(self, other, OpCode::Atan2)
    }
}

impl<F: Float> Display for Active<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl<F: Float> Default for Active<F> {
    fn default() -> Self {
        Active::constant(F::zero())
    }
}

impl<F: Float> From<F> for Active<F> {
    #[inline]
    fn from(value: F) -> Self {
        Active::constant(value)
    }
}
