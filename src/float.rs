use std::fmt::{Debug, Display};

use num_traits::{Float as NumFloat, FloatConst, FromPrimitive};

/// Marker trait for the base floating-point types a tape can be recorded over.
///
/// Bundles the numeric and utility traits needed by the catalog, the
/// recorder and the evaluator. Only `f32` and `f64` implement it; active
/// handles do not.
pub trait Float:
    NumFloat + FloatConst + FromPrimitive + Copy + Send + Sync + Default + Debug + Display + 'static
{
    /// `2` in this type, used by the `ldexp`/`frexp` scale factors.
    #[inline]
    fn two() -> Self {
        Self::one() + Self::one()
    }
}

impl Float for f32 {}
impl Float for f64 {}
