use crate::error::{check_len, Result};
use crate::float::Float;

use super::forward::{ForwardOptions, ForwardScratch};

impl<F: Float> super::Tape<F> {
    /// Compute the full Jacobian with one forward vector sweep seeded with the
    /// `n × n` identity.
    ///
    /// Returns `(f(x), J)` where `J[i][j] = ∂f_i/∂x_j`.
    pub fn jacobian(&self, options: &ForwardOptions, x: &[F]) -> Result<(Vec<F>, Vec<Vec<F>>)> {
        let n = self.num_independents();
        let m = self.num_dependents();
        check_len("independents", n, x.len())?;

        let mut scratch = ForwardScratch::new();
        self.sweep(options, x, n, &mut scratch, |i, row| {
            row.fill(F::zero());
            row[i] = F::one();
        });

        let mut values = vec![F::zero(); m];
        let mut jac = Vec::with_capacity(m);
        self.gather(&scratch, &mut values, |_, row| jac.push(row.to_vec()));
        Ok((values, jac))
    }
}
