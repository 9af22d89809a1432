use rayon::prelude::*;

use crate::error::Result;
use crate::float::Float;

use super::forward::{ForwardOptions, ForwardResult};

impl<F: Float> super::Tape<F> {
    /// Evaluate many `(x, xd)` points of this tape in parallel.
    ///
    /// Takes `&self`: every evaluation owns its scratch buffers, so a sealed
    /// tape is shared across threads without synchronisation. Fails with the
    /// first shape error encountered.
    pub fn fov_forward_par(
        &self,
        options: &ForwardOptions,
        points: &[(Vec<F>, Vec<Vec<F>>)],
    ) -> Result<Vec<ForwardResult<F>>> {
        points
            .par_iter()
            .map(|(x, xd)| self.fov_forward(options, x, xd))
            .collect()
    }

    /// Parallel Jacobians at many base points.
    pub fn jacobian_par(
        &self,
        options: &ForwardOptions,
        points: &[Vec<F>],
    ) -> Result<Vec<(Vec<F>, Vec<Vec<F>>)>> {
        points
            .par_iter()
            .map(|x| self.jacobian(options, x))
            .collect()
    }
}
