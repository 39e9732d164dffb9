//! C6: Impact Collector — particle absorption and surface recharging
//! (spec §4.6).
//!
//! Each step, every particle's cell-integer position is checked against
//! every object's interior lookup. A match removes the particle (via the
//! population's O(1) `cut`), accumulates its charge per object, and —after
//! summing collected charge across ranks— redistributes that charge
//! uniformly across the object's surface nodes into a separate,
//! step-to-step accumulator grid (`rho_obj`), which the caller adds to the
//! plasma `rho` before the next Poisson solve.

use nalgebra::Vector3;

use crate::classifier::IndexTable;
use crate::collective::Collective;
use crate::error::CoreResult;
use crate::grid::GridTopology;
use crate::population::Population;
use crate::surface_gather::GlobalSurfaceMap;

/// Capability interface for particle/object interactions beyond simple
/// absorption. Spec §9 leaves `oFindParticleCollisions` and
/// `oObjectParticleInteraction` as stubs in the source this crate is based
/// on; rather than inferring elastic-collision physics that were never
/// specified, this trait names the extension point and ships only the
/// default the spec says C6 itself implements: unconditional absorption.
pub trait CollisionPolicy {
    /// Returns `true` if a particle of `species` hitting `object` should be
    /// absorbed (removed and its charge collected). Implementations that
    /// return `false` cause the particle to be left in place untouched for
    /// this step; this crate does not model elastic rebound, since the
    /// original behavior for that case is unspecified (spec §9).
    fn absorb(&self, species: usize, object: usize) -> bool;
}

/// The default, and only implemented, [`CollisionPolicy`]: every particle
/// that enters an object's interior is absorbed, matching C6 exactly.
#[derive(Copy, Clone, Debug, Default)]
pub struct AbsorbOnImpact;

impl CollisionPolicy for AbsorbOnImpact {
    fn absorb(&self, _species: usize, _object: usize) -> bool {
        true
    }
}

/// Maps a particle position (expressed in grid-node units, the convention
/// the surrounding mover/migration code uses) to the linear index of its
/// cell's lower corner, per spec §4.6. Returns `None` if the position falls
/// outside the local subdomain.
fn cell_linear_index<G: GridTopology>(grid: &G, position: Vector3<f64>) -> Option<usize> {
    let (x, y, z) = (position.x.floor(), position.y.floor(), position.z.floor());
    if x < 0.0 || y < 0.0 || z < 0.0 {
        return None;
    }
    let (x, y, z) = (x as usize, y as usize, z as usize);
    if x >= grid.size(1) || y >= grid.size(2) || z >= grid.size(3) {
        return None;
    }
    Some(x * grid.size_prod(1) + y * grid.size_prod(2) + z * grid.size_prod(3))
}

/// Runs one step of impact collection and surface recharging.
///
/// `rho_obj` is the caller-owned, step-to-step charge accumulator grid
/// (spec §4.6: "a separate grid accumulated across steps"); this function
/// only ever adds to it. Returns the globally-summed charge collected per
/// object this step (1-based index `a - 1`), mostly useful for diagnostics
/// and the conservation property test (spec §8, invariant 6).
pub fn collect_impacts<G, P>(
    grid: &G,
    interior: &IndexTable,
    surface: &IndexTable,
    gmap: &GlobalSurfaceMap,
    population: &mut P,
    rho_obj: &mut [f64],
    collision_policy: &dyn CollisionPolicy,
    collective: &dyn Collective,
) -> CoreResult<Vec<f64>>
where
    G: GridTopology,
    P: Population,
{
    let num_objects = gmap.num_objects();
    let mut collected = vec![0.0f64; num_objects];

    for species in 0..population.num_species() {
        let charge = population.charge(species);
        // Iterate back-to-front: `cut` swaps the species' last particle into
        // the removed slot, which would otherwise skip the particle now
        // occupying a not-yet-visited lower index.
        let mut index = population.species_range(species).end;
        while index > population.species_range(species).start {
            index -= 1;
            let position = population.position(index);
            let Some(cell_idx) = cell_linear_index(grid, position) else {
                continue;
            };
            // Spec §4.6 edge case: a particle landing on a ghost cell is
            // never attributed, since particle migration is assumed to have
            // already brought particles into their owning rank's true region.
            if grid.is_ghost(cell_idx) {
                continue;
            }

            for a in 1..=num_objects {
                if interior.block(a).binary_search(&cell_idx).is_ok() {
                    if collision_policy.absorb(species, a) {
                        collected[a - 1] += charge;
                        population.cut(species, index);
                    }
                    break;
                }
            }
        }
    }

    let collected = collective.all_reduce_sum_f64(&collected)?;

    for a in 1..=num_objects {
        let t_a = gmap.total(a);
        if t_a == 0 {
            continue;
        }
        let share = collected[a - 1] / t_a as f64;
        for &idx in surface.block(a) {
            rho_obj[idx] += share;
        }
    }

    Ok(collected)
}
