//! C3: Surface Gatherer — global surface-node index map (spec §4.3).
//!
//! For each object, all-gathers every rank's local surface count and
//! prefix-sums the result into a per-rank global offset table `G[a]`. This
//! produces the canonical ordering (rank-major, then local scan order within
//! rank) used by every downstream component that indexes the capacitance
//! matrix by global surface index.

use crate::classifier::IndexTable;
use crate::collective::Collective;
use crate::error::{CoreError, CoreResult};

/// Per-rank cumulative surface-node counts for a single object: `offsets[r]`
/// is the first global surface index owned by rank `r`, `offsets[P]` is the
/// object's global surface total `T_a`.
#[derive(Clone, Debug)]
pub struct GlobalSurfaceMap {
    /// `offsets[a][r]` for `r` in `0..=P`; one row per object.
    offsets: Vec<Vec<i64>>,
}

impl GlobalSurfaceMap {
    /// Builds the global surface map for every object `1..=N` from this
    /// rank's local [`IndexTable`] (spec's Surface Lookup).
    pub fn build(
        surface: &IndexTable,
        num_objects: usize,
        collective: &dyn Collective,
    ) -> CoreResult<Self> {
        let mut offsets = Vec::with_capacity(num_objects);
        for a in 1..=num_objects {
            let local_count = surface.block(a).len() as i64;
            let per_rank = collective.all_gather_i64(local_count)?;
            let mut prefix = vec![0i64; per_rank.len() + 1];
            for (r, count) in per_rank.iter().enumerate() {
                if *count < 0 {
                    return Err(CoreError::comm(format!(
                        "object {a}: rank {r} reported a negative surface count"
                    )));
                }
                prefix[r + 1] = prefix[r] + count;
            }
            offsets.push(prefix);
        }
        Ok(Self { offsets })
    }

    /// `G[a][0..=P]`, the per-rank global index range table for object `a`
    /// (1-based). Range `[offsets(a)[r], offsets(a)[r+1])` is rank `r`'s
    /// slice of the object's global surface list.
    pub fn offsets(&self, a: usize) -> &[i64] {
        &self.offsets[a - 1]
    }

    /// Total global surface count `T_a` for object `a`.
    pub fn total(&self, a: usize) -> usize {
        *self.offsets(a).last().unwrap_or(&0) as usize
    }

    /// The rank owning global surface index `j` of object `a`.
    pub fn owning_rank(&self, a: usize, global_index: i64) -> Option<i32> {
        let table = self.offsets(a);
        table
            .windows(2)
            .position(|w| global_index >= w[0] && global_index < w[1])
            .map(|r| r as i32)
    }

    pub fn num_objects(&self) -> usize {
        self.offsets.len()
    }
}
