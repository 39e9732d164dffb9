//! Contract for the external regular-grid abstraction (spec §3, §6).
//!
//! The grid itself is out of scope for this crate (it belongs to the
//! surrounding PIC code's field-solver machinery). What the conductor core
//! needs is narrow: strided linear indexing with ghost-layer awareness. This
//! module names that contract as [`GridTopology`] and ships [`DenseGrid`], a
//! reference implementation used by tests and the CLI harness.
//!
//! Axis indices follow the convention used throughout spec §4.2's stencil
//! description: axis `0` is a reserved/component axis (always size 1 with no
//! ghosts for a pure scalar field) and axes `1..=3` are the spatial `x, y, z`
//! axes, with `size_prod[1] == 1` (x is the fastest-varying axis). This keeps
//! every offset in this crate numerically identical to the `sizeProd[1]`,
//! `sizeProd[2]`, `sizeProd[3]` terms named in the specification.

use crate::collective::Collective;
use crate::error::CoreResult;

/// Read-only contract for a per-process regular grid subdomain.
pub trait GridTopology {
    /// Extent of axis `d` (0..=3) including ghost layers.
    fn size(&self, d: usize) -> usize;

    /// Extent of axis `d` (0..=3) excluding ghost layers.
    fn true_size(&self, d: usize) -> usize;

    /// Stride: linear index advances by `size_prod(d)` when coordinate `d`
    /// increments by one.
    fn size_prod(&self, d: usize) -> usize;

    /// Number of ghost layers on the lower (`side == 0`) or upper
    /// (`side == 1`) boundary of axis `d`.
    fn n_ghost_layers(&self, d: usize, side: usize) -> usize;

    /// Total number of nodes in the flat local array (with ghosts).
    fn local_len(&self) -> usize {
        (1..=3).map(|d| self.size(d)).product()
    }

    /// Decodes a linear index back into per-axis coordinates for axes 1..=3.
    fn coords(&self, index: usize) -> [usize; 3] {
        let mut rem = index;
        let mut out = [0usize; 3];
        // Decode from the slowest-varying axis (3) down to the fastest (1),
        // consistent with size_prod(1) == 1.
        for d in (1..=3).rev() {
            let stride = self.size_prod(d);
            out[d - 1] = rem / stride;
            rem %= stride;
        }
        out
    }

    /// True iff `index` lies in the ghost band on either side of any axis.
    fn is_ghost(&self, index: usize) -> bool {
        let c = self.coords(index);
        for d in 1..=3 {
            let lo = self.n_ghost_layers(d, 0);
            let hi = self.n_ghost_layers(d, 1);
            let extent = self.size(d);
            let x = c[d - 1];
            if x < lo || x >= extent.saturating_sub(hi) {
                return true;
            }
        }
        false
    }
}

/// Ghost-layer synchronization, the other half of the "Grid abstraction
/// (consumed)" contract in spec §6 (`halo exchange with set and add modes`).
///
/// `exchange_set` overwrites ghost nodes with the owning neighbour
/// subdomain's true values (used by C1 after loading the object map).
/// `exchange_add` accumulates ghost-node contributions into the owning
/// neighbour's true nodes (used when depositing charge near a subdomain
/// boundary). Both are collective: every rank must call with a field of the
/// same shape.
pub trait HaloExchange: GridTopology {
    fn halo_exchange_set(&self, field: &mut [f64], collective: &dyn Collective) -> CoreResult<()>;
    fn halo_exchange_add(&self, field: &mut [f64], collective: &dyn Collective) -> CoreResult<()>;
}

/// Simple owned dense grid: a flat buffer plus the strides/ghost counts
/// needed to satisfy [`GridTopology`]. Used by tests, the CLI harness, and as
/// the concrete type backing [`crate::object_map::ObjectMap`].
#[derive(Clone, Debug)]
pub struct DenseGrid<T> {
    /// `size[0]` is always 1 (reserved axis); `size[1..=3]` are x, y, z with ghosts.
    size: [usize; 4],
    /// `true_size[1..=3]` are x, y, z without ghosts.
    true_size: [usize; 4],
    /// `size_prod[1..=3]` are the corresponding strides; `size_prod[0] == 1`.
    size_prod: [usize; 4],
    /// `n_ghost[2*d]`/`n_ghost[2*d+1]` are the lower/upper ghost counts of axis `d`.
    n_ghost: [usize; 8],
    values: Vec<T>,
}

impl<T: Clone + Default> DenseGrid<T> {
    /// Builds a grid from per-axis true sizes and a uniform ghost-layer count.
    pub fn new(true_size: [usize; 3], ghost_layers: usize) -> Self {
        let size = [
            1,
            true_size[0] + 2 * ghost_layers,
            true_size[1] + 2 * ghost_layers,
            true_size[2] + 2 * ghost_layers,
        ];
        let size_prod = [1, 1, size[1], size[1] * size[2]];
        let n_ghost = [
            0,
            0,
            ghost_layers,
            ghost_layers,
            ghost_layers,
            ghost_layers,
            ghost_layers,
            ghost_layers,
        ];
        let local_len = size[1] * size[2] * size[3];
        Self {
            size,
            true_size: [1, true_size[0], true_size[1], true_size[2]],
            size_prod,
            n_ghost,
            values: vec![T::default(); local_len],
        }
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [T] {
        &mut self.values
    }

    pub fn set_values(&mut self, values: Vec<T>) -> Result<(), String> {
        if values.len() != self.values.len() {
            return Err(format!(
                "expected {} values, got {}",
                self.values.len(),
                values.len()
            ));
        }
        self.values = values;
        Ok(())
    }
}

impl<T> GridTopology for DenseGrid<T> {
    fn size(&self, d: usize) -> usize {
        self.size[d]
    }

    fn true_size(&self, d: usize) -> usize {
        self.true_size[d]
    }

    fn size_prod(&self, d: usize) -> usize {
        self.size_prod[d]
    }

    fn n_ghost_layers(&self, d: usize, side: usize) -> usize {
        self.n_ghost[2 * d + side]
    }
}

impl<T> HaloExchange for DenseGrid<T> {
    /// No-op: [`DenseGrid`] represents a single, un-partitioned subdomain
    /// with no neighbour rank to copy ghost values from.
    fn halo_exchange_set(&self, _field: &mut [f64], _collective: &dyn Collective) -> CoreResult<()> {
        Ok(())
    }

    /// No-op for the same reason as `halo_exchange_set`.
    fn halo_exchange_add(&self, _field: &mut [f64], _collective: &dyn Collective) -> CoreResult<()> {
        Ok(())
    }
}
