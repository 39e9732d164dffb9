//! HDF5-backed reader for the `Object` dataset (spec §6), behind the
//! `hdf5-io` cargo feature so the crate builds without a system HDF5
//! library by default (mirrors the teacher's `vtk_extras`/`io` optional
//! IO features).

use crate::collective::Collective;
use crate::error::{CoreError, CoreResult};
use crate::grid::{GridTopology, HaloExchange};
use crate::object_map::ObjectMap;

/// Reads the `Object` dataset from `path` and builds an [`ObjectMap`] for it.
///
/// The dataset is read as a flat `f64` array in the same linear order as the
/// simulation grid's local node array (spec §6: "a scalar field over the
/// full grid, real-valued; integer tags are recovered by rounding").
pub fn read_object_map_hdf5<G: GridTopology + HaloExchange>(
    path: impl AsRef<std::path::Path>,
    grid: &G,
    objects_enabled: bool,
    collective: &dyn Collective,
) -> CoreResult<ObjectMap> {
    let path = path.as_ref();
    let file = hdf5::File::open(path).map_err(|e| {
        CoreError::config(format!(
            "failed to open state file '{}': {e}",
            path.display()
        ))
    })?;

    let dataset = file.dataset("Object").map_err(|e| {
        CoreError::config(format!(
            "state file '{}' has no 'Object' dataset: {e}",
            path.display()
        ))
    })?;

    let values: Vec<f64> = dataset
        .read_raw()
        .map_err(|e| CoreError::config(format!("failed to read 'Object' dataset: {e}")))?;

    ObjectMap::load(grid, values, objects_enabled, collective)
}
