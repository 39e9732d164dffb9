//! C5: Charge Corrector — per-step Hockney-Miyake equipotential correction
//! (spec §4.5).
//!
//! Run once per time step after the base Poisson solve has produced a
//! tentative `phi` that generally does not satisfy the equipotential
//! constraint on each conductor. For every object, computes the
//! self-consistent floating potential `phi_c_a`, the potential correction
//! needed at every surface node, and the charge-density correction that
//! would produce it — without re-invoking the Poisson solver itself; the
//! caller re-solves once all objects have been corrected (spec §4.5).
//!
//! Reference: Miyake & Usui, *Physics of Plasmas* 16, 062904 (2009),
//! eqs. 5 and 7.

use crate::capacitance::CapacitanceStore;
use crate::classifier::IndexTable;
use crate::collective::{require_equal_len, Collective};
use crate::error::CoreResult;
use crate::surface_gather::GlobalSurfaceMap;

/// Reusable scratch buffers sized for the largest `T_a` across all objects
/// (spec §3's Per-Step Scratch), so the corrector avoids reallocating every
/// time step.
#[derive(Clone, Debug, Default)]
pub struct CorrectorScratch {
    delta_phi: Vec<f64>,
    rho_corr: Vec<f64>,
}

impl CorrectorScratch {
    pub fn with_capacity(max_t_a: usize) -> Self {
        Self {
            delta_phi: vec![0.0; max_t_a],
            rho_corr: vec![0.0; max_t_a],
        }
    }
}

/// Applies the equipotential correction for every object to `rho`, reading
/// the tentative potential `phi` from the base Poisson solve. `rho` and
/// `phi` are laid out in the grid's flat local-index order, matching the
/// capacitance builder's convention.
pub fn correct_charge(
    surface: &IndexTable,
    gmap: &GlobalSurfaceMap,
    store: &CapacitanceStore,
    phi: &[f64],
    rho: &mut [f64],
    scratch: &mut CorrectorScratch,
    collective: &dyn Collective,
) -> CoreResult<()> {
    let my_rank = collective.rank();

    for a in 1..=store.num_objects() {
        let t_a = gmap.total(a);
        if t_a == 0 {
            continue;
        }
        let my_block = surface.block(a);
        let offsets = gmap.offsets(a);
        let my_start = offsets[my_rank as usize] as usize;

        let k_inv = store.k_inv(a);
        let s_a = store.s(a);

        // Step 1: phi_c_a = S_a * sum_{i,j in this rank's rows} K^-1_a[j, i] * phi[surf(j)]
        let mut local_sum = 0.0f64;
        for (local_j, &idx) in my_block.iter().enumerate() {
            let j = my_start + local_j;
            let row = k_inv.row(j);
            let phi_j = phi[idx];
            for col in row.iter() {
                local_sum += col * phi_j;
            }
        }
        let global_sum = collective.all_reduce_sum_f64_scalar(local_sum)?;
        let phi_c_a = s_a * global_sum;

        // Step 2: delta_phi[j] = phi_c_a - phi[surf(j)] for locally-owned j,
        // then all-reduce so every rank has the full T_a-length vector.
        let delta_phi = &mut scratch.delta_phi[..t_a];
        delta_phi.iter_mut().for_each(|v| *v = 0.0);
        for (local_j, &idx) in my_block.iter().enumerate() {
            let j = my_start + local_j;
            delta_phi[j] = phi_c_a - phi[idx];
        }
        require_equal_len("all_reduce delta_phi", t_a, delta_phi.len())?;
        let reduced_delta = collective.all_reduce_sum_f64(delta_phi)?;
        delta_phi.copy_from_slice(&reduced_delta);

        // Step 3: rho_corr[i] = sum_j K^-1_a[j, i] * delta_phi[j], j
        // restricted to this rank's local rows; all-reduce SUM.
        let rho_corr = &mut scratch.rho_corr[..t_a];
        rho_corr.iter_mut().for_each(|v| *v = 0.0);
        for (local_j, _) in my_block.iter().enumerate() {
            let j = my_start + local_j;
            let row = k_inv.row(j);
            let dphi_j = delta_phi[j];
            for (i, col) in row.iter().enumerate() {
                rho_corr[i] += col * dphi_j;
            }
        }
        let reduced_rho_corr = collective.all_reduce_sum_f64(rho_corr)?;
        rho_corr.copy_from_slice(&reduced_rho_corr);

        // Step 4: add rho_corr[j] to rho at every locally-owned surface node.
        for (local_j, &idx) in my_block.iter().enumerate() {
            let j = my_start + local_j;
            rho[idx] += rho_corr[j];
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capacitance::build_capacitance_store;
    use crate::classifier::NodeClassifier;
    use crate::collective::SingleRank;
    use crate::grid::DenseGrid;
    use crate::object_map::ObjectMap;
    use crate::poisson::JacobiPoissonSolver;

    #[test]
    fn uniform_phi_produces_zero_correction() {
        // S6 in spec §8: with no perturbation, a uniform phi should already
        // be at the floating potential, so delta_phi/rho_corr are ~0.
        let grid = DenseGrid::<f64>::new([4, 4, 4], 1);
        let mut values = vec![0.0; grid.local_len()];
        let idx = 3 * grid.size_prod(1) + 3 * grid.size_prod(2) + 3 * grid.size_prod(3);
        values[idx] = 1.0;
        let map = ObjectMap::load(&grid, values, true, &SingleRank).unwrap();
        let classifier = NodeClassifier::build(&map, &grid).unwrap();
        let gmap = GlobalSurfaceMap::build(classifier.surface(), map.num_objects(), &SingleRank).unwrap();
        let solver = JacobiPoissonSolver::new(500, 1e-9);
        let store =
            build_capacitance_store(&grid, classifier.surface(), &gmap, &solver, &SingleRank).unwrap();

        let phi = vec![2.5f64; grid.local_len()];
        let mut rho = vec![0.0f64; grid.local_len()];
        let mut scratch = CorrectorScratch::with_capacity(gmap.total(1));

        correct_charge(
            classifier.surface(),
            &gmap,
            &store,
            &phi,
            &mut rho,
            &mut scratch,
            &SingleRank,
        )
        .unwrap();

        assert!(rho.iter().all(|v| v.abs() < 1e-9));
    }

    #[test]
    fn single_node_correction_matches_closed_form() {
        // S1 in spec §8: a single-node object, T_1 = 1. With phi uniformly 1,
        // phi_c_1 = S_1 * K^-1[0,0] * phi[surf] = phi[surf] algebraically
        // (S_1 is defined as 1 / K^-1[0,0] for a 1x1 matrix), so delta_phi
        // and rho_corr both collapse to exactly zero.
        let grid = DenseGrid::<f64>::new([4, 4, 4], 1);
        let mut values = vec![0.0; grid.local_len()];
        let idx = 2 * grid.size_prod(1) + 2 * grid.size_prod(2) + 2 * grid.size_prod(3);
        values[idx] = 1.0;
        let map = ObjectMap::load(&grid, values, true, &SingleRank).unwrap();
        let classifier = NodeClassifier::build(&map, &grid).unwrap();
        let gmap = GlobalSurfaceMap::build(classifier.surface(), map.num_objects(), &SingleRank).unwrap();
        let solver = JacobiPoissonSolver::new(500, 1e-9);
        let store =
            build_capacitance_store(&grid, classifier.surface(), &gmap, &solver, &SingleRank).unwrap();

        let phi = vec![1.0f64; grid.local_len()];
        let mut rho = vec![0.0f64; grid.local_len()];
        let mut scratch = CorrectorScratch::with_capacity(gmap.total(1));

        correct_charge(
            classifier.surface(),
            &gmap,
            &store,
            &phi,
            &mut rho,
            &mut scratch,
            &SingleRank,
        )
        .unwrap();

        assert!(rho[idx].abs() < 1e-6);
    }
}
