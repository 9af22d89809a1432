//! Elementary operation catalog.
//!
//! Each opcode has a value formula ([`eval_value`]) and a local-derivative
//! formula ([`partials`]). The recorder computes recording-time values with
//! [`eval_value`] and the forward evaluator replays entries through the same
//! two functions, so a replay at the recording point reproduces the recorded
//! values exactly.

use crate::float::Float;

/// Elementary operation codes stored in tape entries.
///
/// Binary ops read both operand slots; unary ops read slot 0 only. Integer
/// exponents (`Powi`, `Ldexp`, `Frexp`) and recorded branches (`Abs`,
/// `Signum`) live in the entry's [`Aux`] data, not in an operand.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpCode {
    // ── Structural ──
    /// Materialises a literal at a location (only emitted when a constant
    /// handle is marked dependent).
    Const,

    // ── Binary arithmetic ──
    Add,
    Sub,
    Mul,
    Div,
    Atan2,
    /// `a^b`. With a literal `b` this is the constant-exponent power, with a
    /// literal `a` it is the constant-base power.
    Pow,

    // ── Unary arithmetic ──
    /// Unary plus (copy).
    Pos,
    Neg,
    Incr,
    Decr,
    /// Integer power. Exponent stored as [`Aux::Exponent`].
    Powi,
    /// `a · 2^e`. Exponent stored as [`Aux::Exponent`].
    Ldexp,
    /// Mantissa of `a`: `a · 2^-e`, where `e` is the binary exponent found at
    /// recording time and stored as [`Aux::Exponent`].
    Frexp,

    // ── Exp / Log ──
    Exp,
    Ln,
    Log10,
    Sqrt,

    // ── Trig ──
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,

    // ── Hyperbolic ──
    Sinh,
    Cosh,
    Tanh,
    Asinh,
    Acosh,
    Atanh,

    // ── Nonsmooth ──
    Abs,
    /// Zero derivative; value is `+1`, `-1` or `0`.
    Signum,
}

impl OpCode {
    /// Number of operand slots the opcode reads.
    #[inline]
    pub fn arity(self) -> usize {
        match self {
            OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div | OpCode::Atan2 | OpCode::Pow => 2,
            _ => 1,
        }
    }
}

/// Returns true if the opcode records a [`Branch`] as auxiliary data.
#[inline]
pub fn is_nonsmooth(op: OpCode) -> bool {
    matches!(op, OpCode::Abs | OpCode::Signum)
}

/// Which side of the kink a nonsmooth operand was on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Branch {
    Positive,
    Negative,
    Zero,
}

impl Branch {
    /// Classify `x`. NaN is classified as [`Branch::Zero`]: it is on neither
    /// side.
    #[inline]
    pub fn of<F: Float>(x: F) -> Self {
        if x > F::zero() {
            Branch::Positive
        } else if x < F::zero() {
            Branch::Negative
        } else {
            Branch::Zero
        }
    }

    /// `+1`, `-1` or `0`.
    #[inline]
    pub fn sign<F: Float>(self) -> F {
        match self {
            Branch::Positive => F::one(),
            Branch::Negative => -F::one(),
            Branch::Zero => F::zero(),
        }
    }
}

/// Auxiliary data attached to a tape entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Aux {
    #[default]
    None,
    /// Branch taken by a nonsmooth op at recording time.
    Branch(Branch),
    /// Integer exponent of `Powi`, `Ldexp` or `Frexp`.
    Exponent(i32),
}

impl Aux {
    /// The recorded exponent, or `0` if the entry carries none.
    #[inline]
    pub fn exponent(self) -> i32 {
        match self {
            Aux::Exponent(e) => e,
            _ => 0,
        }
    }

    /// The recorded branch, if any.
    #[inline]
    pub fn branch(self) -> Option<Branch> {
        match self {
            Aux::Branch(b) => Some(b),
            _ => None,
        }
    }
}

/// Evaluate a single opcode.
///
/// For binary ops `a` and `b` are the operand values; unary ops ignore `b`.
/// `Const` returns `a`, the literal itself.
#[inline]
pub fn eval_value<F: Float>(op: OpCode, a: F, b: F, aux: Aux) -> F {
    match op {
        OpCode::Const => a,

        OpCode::Add => a + b,
        OpCode::Sub => a - b,
        OpCode::Mul => a * b,
        OpCode::Div => a / b,
        OpCode::Atan2 => a.atan2(b),
        OpCode::Pow => a.powf(b),

        OpCode::Pos => a,
        OpCode::Neg => -a,
        OpCode::Incr => a + F::one(),
        OpCode::Decr => a - F::one(),
        OpCode::Powi => a.powi(aux.exponent()),
        OpCode::Ldexp => scale_pow2(a, aux.exponent()),
        OpCode::Frexp => scale_pow2(a, aux.exponent().saturating_neg()),

        OpCode::Exp => a.exp(),
        OpCode::Ln => a.ln(),
        OpCode::Log10 => a.log10(),
        OpCode::Sqrt => a.sqrt(),

        OpCode::Sin => a.sin(),
        OpCode::Cos => a.cos(),
        OpCode::Tan => a.tan(),
        OpCode::Asin => a.asin(),
        OpCode::Acos => a.acos(),
        OpCode::Atan => a.atan(),

        OpCode::Sinh => a.sinh(),
        OpCode::Cosh => a.cosh(),
        OpCode::Tanh => a.tanh(),
        OpCode::Asinh => a.asinh(),
        OpCode::Acosh => a.acosh(),
        OpCode::Atanh => a.atanh(),

        OpCode::Abs => a.abs(),
        // `F::signum` maps ±0 to ±1; the catalog wants 0 at the kink.
        OpCode::Signum => {
            if a.is_nan() {
                a
            } else {
                Branch::of(a).sign()
            }
        }
    }
}

/// Local partial derivatives `(∂r/∂a, ∂r/∂b)` of a single opcode.
///
/// `a`, `b` are the replay-time operand values and `r` the value returned by
/// [`eval_value`]. Unary ops return zero for the second partial.
///
/// `Abs` returns the replay-time sign; the evaluator overrides it at the
/// kink and under [`BranchPolicy::Recorded`](crate::BranchPolicy::Recorded).
#[inline]
pub fn partials<F: Float>(op: OpCode, a: F, b: F, r: F, aux: Aux) -> (F, F) {
    let zero = F::zero();
    let one = F::one();
    match op {
        OpCode::Const => (zero, zero),

        OpCode::Add => (one, one),
        OpCode::Sub => (one, -one),
        OpCode::Mul => (b, a),
        OpCode::Div => {
            let inv = one / b;
            (inv, -r * inv)
        }
        OpCode::Atan2 => {
            let denom = a * a + b * b;
            (b / denom, -a / denom)
        }
        OpCode::Pow => (b * a.powf(b - one), a.ln() * r),

        OpCode::Pos | OpCode::Incr | OpCode::Decr => (one, zero),
        OpCode::Neg => (-one, zero),
        OpCode::Powi => {
            let n = aux.exponent();
            let nf = int_to_float::<F>(n);
            if n == 0 {
                (zero, zero)
            } else if let Some(k) = n.checked_sub(1) {
                (nf * a.powi(k), zero)
            } else {
                (nf * a.powf(nf - one), zero)
            }
        }
        OpCode::Ldexp => (scale_pow2(one, aux.exponent()), zero),
        OpCode::Frexp => (scale_pow2(one, aux.exponent().saturating_neg()), zero),

        OpCode::Exp => (r, zero),
        OpCode::Ln => (one / a, zero),
        OpCode::Log10 => (one / (a * F::LN_10()), zero),
        OpCode::Sqrt => (one / (F::two() * r), zero),

        OpCode::Sin => (a.cos(), zero),
        OpCode::Cos => (-a.sin(), zero),
        OpCode::Tan => (one + r * r, zero),
        OpCode::Asin => (one / (one - a * a).sqrt(), zero),
        OpCode::Acos => (-one / (one - a * a).sqrt(), zero),
        OpCode::Atan => (one / (one + a * a), zero),

        OpCode::Sinh => (a.cosh(), zero),
        OpCode::Cosh => (a.sinh(), zero),
        OpCode::Tanh => (one - r * r, zero),
        OpCode::Asinh => (one / (a * a + one).sqrt(), zero),
        OpCode::Acosh => (one / (a * a - one).sqrt(), zero),
        OpCode::Atanh => (one / (one - a * a), zero),

        OpCode::Abs => (Branch::of(a).sign(), zero),
        OpCode::Signum => (zero, zero),
    }
}

/// `x · 2^e` without forming `2^e` itself, so the result is finite
/// whenever it is representable.
pub fn scale_pow2<F: Float>(x: F, e: i32) -> F {
    // 2^±64 is a normal number in every supported type.
    const STEP: i32 = 64;
    let up = F::two().powi(STEP);
    let down = F::one() / up;
    let (mut x, mut e) = (x, e);
    while e > STEP && x != F::zero() && x.is_finite() {
        x = x * up;
        e -= STEP;
    }
    while e < -STEP && x != F::zero() && x.is_finite() {
        x = x * down;
        e += STEP;
    }
    if e.unsigned_abs() > STEP.unsigned_abs() {
        // Zero, infinite or NaN: further scaling cannot change it.
        return x;
    }
    x * F::two().powi(e)
}

/// Binary exponent `e` such that `x · 2^-e` lies in `[0.5, 1)` in magnitude.
///
/// Zero, infinities and NaN have exponent `0`, so `frexp` leaves them
/// unchanged. Subnormal inputs are handled exactly.
pub fn frexp_exponent<F: Float>(x: F) -> i32 {
    if x == F::zero() || !x.is_finite() {
        return 0;
    }
    let mag = x.abs();
    let mut e = mag.log2().floor().to_i32().unwrap_or(0) + 1;
    // log2 can be off by one ulp near powers of two.
    let m = scale_pow2(mag, -e);
    if m >= F::one() {
        e += 1;
    } else if m < F::one() / F::two() {
        e -= 1;
    }
    e
}

#[inline]
fn int_to_float<F: Float>(n: i32) -> F {
    F::from_i32(n).unwrap_or_else(F::nan)
}
