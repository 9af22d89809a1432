//! `std::ops` implementations for [`Active<F>`].
//!
//! Each operator records one entry on the active tape through the same
//! opcode-keyed path as the named methods on [`Active`].

use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

use crate::active::{record_binary, record_unary, Active};
use crate::opcode::{Aux, OpCode};
use crate::tape::TraceThreadLocal;

// ──────────────────────────────────────────────
//  Active<F> ↔ Active<F> operators
// ──────────────────────────────────────────────

impl<F: TraceThreadLocal> Add for Active<F> {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        record_binary(self, rhs, OpCode::Add)
    }
}

impl<F: TraceThreadLocal> Sub for Active<F> {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        record_binary(self, rhs, OpCode::Sub)
    }
}

impl<F: TraceThreadLocal> Mul for Active<F> {
    type Output = Self;
    #[inline]
    fn mul(self, rhs: Self) -> Self {
        record_binary(self, rhs, OpCode::Mul)
    }
}

impl<F: TraceThreadLocal> Div for Active<F> {
    type Output = Self;
    #[inline]
    fn div(self, rhs: Self) -> Self {
        record_binary(self, rhs, OpCode::Div)
    }
}

impl<F: TraceThreadLocal> Neg for Active<F> {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        record_unary(self, OpCode::Neg, Aux::None)
    }
}

// Assign variants delegate to the binary ops.
impl<F: TraceThreadLocal> AddAssign for Active<F> {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl<F: TraceThreadLocal> SubAssign for Active<F> {
    #[inline]
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl<F: TraceThreadLocal> MulAssign for Active<F> {
    #[inline]
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}

impl<F: TraceThreadLocal> DivAssign for Active<F> {
    #[inline]
    fn div_assign(&mut self, rhs: Self) {
        *self = *self / rhs;
    }
}

// ──────────────────────────────────────────────
//  Mixed ops: Active<F> with primitive floats
// ──────────────────────────────────────────────

// The primitive is recorded inline as a literal operand.
macro_rules! impl_active_scalar_ops {
    ($f:ty, $($trait:ident :: $method:ident => $op:ident, $assign:ident :: $assign_method:ident;)*) => {
        $(
            impl $trait<$f> for Active<$f> {
                type Output = Active<$f>;
                #[inline]
                fn $method(self, rhs: $f) -> Active<$f> {
                    record_binary(self, Active::constant(rhs), OpCode::$op)
                }
            }

            impl $trait<Active<$f>> for $f {
                type Output = Active<$f>;
                #[inline]
                fn $method(self, rhs: Active<$f>) -> Active<$f> {
                    record_binary(Active::constant(self), rhs, OpCode::$op)
                }
            }

            impl $assign<$f> for Active<$f> {
                #[inline]
                fn $assign_method(&mut self, rhs: $f) {
                    *self = record_binary(*self, Active::constant(rhs), OpCode::$op);
                }
            }
        )*
    };
}

macro_rules! impl_active_scalar_ops_for {
    ($($f:ty),*) => {
        $(
            impl_active_scalar_ops! {
                $f,
                Add::add => Add, AddAssign::add_assign;
                Sub::sub => Sub, SubAssign::sub_assign;
                Mul::mul => Mul, MulAssign::mul_assign;
                Div::div => Div, DivAssign::div_assign;
            }
        )*
    };
}

impl_active_scalar_ops_for!(f32, f64);

// ── Comparison (recording-time values, nothing is recorded) ──

impl<F: TraceThreadLocal> PartialEq for Active<F> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<F: TraceThreadLocal> PartialOrd for Active<F> {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.value.partial_cmp(&other.value)
    }
}
