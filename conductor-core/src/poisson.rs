//! Contract for the external Poisson field solver (spec §6).
//!
//! The production solver (multigrid or spectral, per spec §1) is explicitly
//! out of scope for this crate. [`PoissonSolver`] names the contract the core
//! depends on: `solve(rho, phi)` is re-entrant, and successive calls with an
//! identical `rho` produce an identical `phi` (spec §6: "No assumption is
//! made about solver linearity beyond that"). [`JacobiPoissonSolver`] is a
//! small reference/test double, not a production solver.

use crate::collective::Collective;
use crate::error::CoreResult;
use crate::grid::GridTopology;

/// External collaborator: solves `nabla^2 phi = rho` subject to
/// solver-owned boundary conditions.
pub trait PoissonSolver<G: GridTopology> {
    /// Reads `rho`, writes the resulting potential into `phi`. Both slices
    /// are laid out in the grid's flat local-index order (spec §3: "a flat
    /// value array").
    fn solve(
        &self,
        grid: &G,
        rho: &[f64],
        phi: &mut [f64],
        collective: &dyn Collective,
    ) -> CoreResult<()>;

    /// The solver's residual tolerance, used by property tests to bound
    /// `|K^-1_a . C_a - I|` (spec §8, invariant 4).
    fn tolerance(&self) -> f64;
}

/// Reference single-rank Poisson solver used by tests and the CLI harness.
///
/// Implements a fixed-iteration-count Jacobi relaxation with a homogeneous
/// Dirichlet boundary condition (`phi = 0`) on the true (non-ghost) domain
/// boundary. This is a test double standing in for the production
/// multigrid/spectral solver named in spec §1; it does not perform a halo
/// exchange across ranks, since this crate does not own the grid.
#[derive(Clone, Debug)]
pub struct JacobiPoissonSolver {
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl JacobiPoissonSolver {
    pub fn new(max_iterations: usize, tolerance: f64) -> Self {
        Self {
            max_iterations,
            tolerance,
        }
    }
}

impl Default for JacobiPoissonSolver {
    fn default() -> Self {
        Self::new(2000, 1e-10)
    }
}

impl<G: GridTopology> PoissonSolver<G> for JacobiPoissonSolver {
    fn solve(
        &self,
        grid: &G,
        rho: &[f64],
        phi: &mut [f64],
        _collective: &dyn Collective,
    ) -> CoreResult<()> {
        let n = grid.local_len();
        debug_assert_eq!(rho.len(), n);
        debug_assert_eq!(phi.len(), n);

        let sx = grid.size_prod(1);
        let sy = grid.size_prod(2);
        let sz = grid.size_prod(3);
        let h2 = 1.0f64;

        let mut cur = vec![0.0f64; n];
        let mut next = vec![0.0f64; n];

        for _iter in 0..self.max_iterations {
            let mut max_delta = 0.0f64;
            for x in 1..grid.size(1).saturating_sub(1) {
                for y in 1..grid.size(2).saturating_sub(1) {
                    for z in 1..grid.size(3).saturating_sub(1) {
                        let idx = x * sx + y * sy + z * sz;
                        if grid.is_ghost(idx) {
                            next[idx] = 0.0;
                            continue;
                        }
                        let neighbor_sum = cur[idx - sx]
                            + cur[idx + sx]
                            + cur[idx - sy]
                            + cur[idx + sy]
                            + cur[idx - sz]
                            + cur[idx + sz];
                        let updated = (neighbor_sum - h2 * rho[idx]) / 6.0;
                        max_delta = max_delta.max((updated - cur[idx]).abs());
                        next[idx] = updated;
                    }
                }
            }
            std::mem::swap(&mut cur, &mut next);
            if max_delta < self.tolerance {
                break;
            }
        }

        phi.copy_from_slice(&cur);
        Ok(())
    }

    fn tolerance(&self) -> f64 {
        self.tolerance
    }
}
