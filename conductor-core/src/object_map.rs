//! C1: Object Map — the per-node integer tag field (spec §4.1).
//!
//! Loaded once at init from the external state file and immutable
//! thereafter. A node's tag is `round(value)`; tag `0` means plasma, tag
//! `a in 1..=N` means "belongs to object a". `N` is the maximum tag across
//! every rank, found once via a global max-reduce.

use crate::collective::Collective;
use crate::error::{CoreError, CoreResult};
use crate::grid::{GridTopology, HaloExchange};

/// The per-node tag field plus the derived object count `N`.
#[derive(Clone, Debug)]
pub struct ObjectMap {
    /// One real value per local grid node (including ghosts), as loaded from
    /// the state file. Tags are recovered on demand via `round`.
    values: Vec<f64>,
    /// Number of objects, `N = max over all ranks of round(max(values))`.
    num_objects: usize,
}

impl ObjectMap {
    /// Loads the object map from an in-memory flat field already matching
    /// the simulation grid's shape, exchanges ghost layers in *set* mode, and
    /// determines `N` via a global max-reduce.
    ///
    /// Fails with [`CoreError::Config`] if the field's length disagrees with
    /// the grid, or if `N == 0` (no objects present) while the caller expects
    /// the object subsystem to be enabled.
    pub fn load<G: GridTopology + HaloExchange>(
        grid: &G,
        mut values: Vec<f64>,
        objects_enabled: bool,
        collective: &dyn Collective,
    ) -> CoreResult<Self> {
        if values.len() != grid.local_len() {
            return Err(CoreError::config(format!(
                "object map field has {} entries but the simulation grid has {}",
                values.len(),
                grid.local_len()
            )));
        }

        grid.halo_exchange_set(&mut values, collective)?;

        let local_max_tag = values
            .iter()
            .map(|v| v.round() as i64)
            .max()
            .unwrap_or(0);
        let num_objects = collective.all_reduce_max_i64(local_max_tag)?;

        if num_objects == 0 && objects_enabled {
            return Err(CoreError::config(
                "object subsystem is enabled but the object map contains no objects (N = 0)",
            ));
        }
        if num_objects < 0 {
            return Err(CoreError::internal(
                "object map produced a negative tag maximum",
            ));
        }

        Ok(Self {
            values,
            num_objects: num_objects as usize,
        })
    }

    /// Number of objects `N`.
    pub fn num_objects(&self) -> usize {
        self.num_objects
    }

    /// Rounded integer tag of local node `index`. `0` means plasma.
    pub fn tag(&self, index: usize) -> i64 {
        self.values[index].round() as i64
    }

    /// Raw (unrounded) field value, mostly useful for round-trip tests.
    pub fn raw_value(&self, index: usize) -> f64 {
        self.values[index]
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collective::SingleRank;
    use crate::grid::DenseGrid;

    #[test]
    fn rejects_shape_mismatch() {
        let grid = DenseGrid::<f64>::new([2, 2, 2], 0);
        let values = vec![0.0; grid.local_len() - 1];
        let err = ObjectMap::load(&grid, values, true, &SingleRank).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
    }

    #[test]
    fn rejects_zero_objects_when_enabled() {
        let grid = DenseGrid::<f64>::new([2, 2, 2], 0);
        let values = vec![0.0; grid.local_len()];
        let err = ObjectMap::load(&grid, values, true, &SingleRank).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
    }

    #[test]
    fn rounds_values_to_tags() {
        let grid = DenseGrid::<f64>::new([2, 2, 2], 0);
        let mut values = vec![0.0; grid.local_len()];
        values[0] = 1.4;
        values[1] = 0.6;
        let map = ObjectMap::load(&grid, values, true, &SingleRank).unwrap();
        assert_eq!(map.num_objects(), 1);
        assert_eq!(map.tag(0), 1);
        assert_eq!(map.tag(1), 1);
    }
}
