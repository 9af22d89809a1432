//! Operator-tracing automatic differentiation.
//!
//! Traced code runs once on [`Active`] handles inside a [`Session`]; every
//! elementary operation is appended to a [`Tape`]. The sealed tape is then
//! replayed by the forward vector evaluator, which computes the dependents'
//! values together with directional derivatives for a whole batch of seed
//! directions in one pass.
//!
//! ```
//! use adtrace::TapeStore;
//!
//! let store = TapeStore::<f64>::new();
//! let mut session = store.begin_trace(1).unwrap();
//! let a = session.independent(2.0);
//! let b = session.independent(3.5);
//! let y = a * b;
//! session.dependent(y);
//! session.end_trace().unwrap();
//!
//! let x = [2.0, 3.5];
//! let xd = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
//! let mut y = [0.0];
//! let mut yd = vec![vec![0.0; 2]];
//! store.fov_forward(1, 1, 2, 2, &x, &xd, &mut y, &mut yd).unwrap();
//! assert_eq!(y[0], 7.0);
//! assert_eq!(yd[0], vec![3.5, 2.0]);
//! ```

pub mod active;
pub mod error;
pub mod float;
pub mod nonsmooth;
pub mod opcode;
pub mod session;
pub mod tape;
mod traits;

pub use active::Active;
pub use error::{Error, Result};
pub use float::Float;
pub use nonsmooth::{BranchPolicy, BranchSwitch, ForwardReport};
pub use opcode::{Aux, Branch, OpCode};
pub use session::{Session, TapeStore};
pub use tape::forward::{ForwardOptions, ForwardResult, ForwardScratch};
pub use tape::{Operand, Tape, TapeEntry, TapeId, TapeStats};

/// Type alias for active handles over `f64`.
pub type Active64 = Active<f64>;
/// Type alias for active handles over `f32`.
pub type Active32 = Active<f32>;
