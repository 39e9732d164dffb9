//! C2: Node Classifier — interior/surface/exposed node lookup tables
//! (spec §4.2).
//!
//! Builds, once at init, three concatenated index tables per object: the
//! interior lookup (every node tagged with that object), the surface lookup
//! (interior nodes that touch the outside, per the asymmetric eight-cell
//! stencil below), and the optional exposed-node lookup used only by the
//! photoemission subcomponent.
//!
//! The surface stencil samples only the eight cells *below-and-including*
//! each candidate node. This asymmetry is a deliberate, load-bearing choice
//! (spec §4.2, §9): the capacitance matrix is conditioned on this exact
//! stencil, and a symmetric variant would silently produce a different,
//! incompatible `C_a`. Do not "fix" the asymmetry.

use crate::error::{CoreError, CoreResult};
use crate::grid::GridTopology;
use crate::object_map::ObjectMap;

/// A concatenated per-object index table: object `a`'s entries occupy
/// `indices[offsets[a] .. offsets[a + 1]]`.
#[derive(Clone, Debug, Default)]
pub struct IndexTable {
    offsets: Vec<usize>,
    indices: Vec<usize>,
}

impl IndexTable {
    /// Local indices belonging to object `a` (`a` is 1-based; `a == 0` is
    /// plasma and always empty).
    pub fn block(&self, a: usize) -> &[usize] {
        if a == 0 || a >= self.offsets.len() {
            return &[];
        }
        &self.indices[self.offsets[a - 1]..self.offsets[a]]
    }

    /// `offsets[0..=N]`, spec's `IO`/`SO`/`EO` table.
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// Total number of entries across every object, spec's `IO[N]`/`SO[N]`.
    pub fn total_len(&self) -> usize {
        *self.offsets.last().unwrap_or(&0)
    }

    /// Builds a table directly from already-partitioned offsets/indices.
    /// Used by tests that model one rank's slice of a multi-rank partition,
    /// since this crate's reference `DenseGrid` does not itself model true
    /// subdomain decomposition (the grid is an external collaborator, spec
    /// §6) and so cannot produce such a partition via [`NodeClassifier::build`].
    #[cfg(test)]
    pub(crate) fn from_parts(offsets: Vec<usize>, indices: Vec<usize>) -> Self {
        Self { offsets, indices }
    }
}

/// Per-object interior, surface, and (optional) exposed-node lookup tables.
#[derive(Clone, Debug, Default)]
pub struct NodeClassifier {
    interior: IndexTable,
    surface: IndexTable,
    exposed: Option<IndexTable>,
}

impl NodeClassifier {
    pub fn interior(&self) -> &IndexTable {
        &self.interior
    }

    pub fn surface(&self) -> &IndexTable {
        &self.surface
    }

    pub fn exposed(&self) -> Option<&IndexTable> {
        self.exposed.as_ref()
    }

    /// Builds interior and surface lookups for every object `1..=N` by
    /// traversing the local subdomain (including ghosts) twice: once to
    /// count each object's entries (sizing the offset table), once to fill
    /// the index blocks in ascending natural traversal order.
    pub fn build<G: GridTopology>(object_map: &ObjectMap, grid: &G) -> CoreResult<Self> {
        let n = object_map.num_objects();
        let local_len = object_map.len();

        // --- Interior: two-pass count then fill ---
        let mut interior_counts = vec![0usize; n];
        for i in 0..local_len {
            let tag = object_map.tag(i);
            if tag >= 1 {
                interior_counts[(tag - 1) as usize] += 1;
            }
        }
        let interior = fill_table(local_len, n, interior_counts, |i| {
            let tag = object_map.tag(i);
            (tag >= 1).then_some((tag - 1) as usize)
        });

        // --- Surface: two-pass count then fill, same scan order ---
        let mut surface_counts = vec![0usize; n];
        for i in 0..local_len {
            let tag = object_map.tag(i);
            if tag >= 1 && !grid.is_ghost(i) && is_surface_node(grid, object_map, i, tag) {
                surface_counts[(tag - 1) as usize] += 1;
            }
        }
        let surface = fill_table(local_len, n, surface_counts, |i| {
            let tag = object_map.tag(i);
            (tag >= 1 && !grid.is_ghost(i) && is_surface_node(grid, object_map, i, tag))
                .then_some((tag - 1) as usize)
        });

        for a in 1..=n {
            for &idx in surface.block(a) {
                if grid.is_ghost(idx) {
                    return Err(CoreError::internal(
                        "surface lookup contains a ghost index",
                    ));
                }
            }
        }

        Ok(Self {
            interior,
            surface,
            exposed: None,
        })
    }

    /// Builds the sun-facing exposed-node lookup used by the photoemission
    /// subcomponent (spec §4.2). For each `(y, z)` column, the first surface
    /// node encountered while scanning in the `+x` direction is recorded as
    /// having an unobstructed line of sight to the sun; the inner loop then
    /// breaks, so at most one exposed node is recorded per column per object.
    pub fn with_exposed_nodes<G: GridTopology>(mut self, object_map: &ObjectMap, grid: &G) -> Self {
        let n = object_map.num_objects();
        let mut counts = vec![0usize; n];
        let mut found: Vec<Option<usize>> = Vec::new();

        let sx = grid.size_prod(1);
        let sy = grid.size_prod(2);
        let sz = grid.size_prod(3);

        for (y, z) in itertools::iproduct!(0..grid.size(2), 0..grid.size(3)) {
            let mut column_hit: Option<(usize, i64)> = None;
            for x in 0..grid.size(1) {
                let idx = x * sx + y * sy + z * sz;
                let tag = object_map.tag(idx);
                if tag >= 1 && !grid.is_ghost(idx) && is_surface_node(grid, object_map, idx, tag) {
                    column_hit = Some((idx, tag));
                    break;
                }
            }
            if let Some((idx, tag)) = column_hit {
                counts[(tag - 1) as usize] += 1;
                found.push(Some(idx));
            } else {
                found.push(None);
            }
        }

        let mut offsets = vec![0usize; n + 1];
        for a in 0..n {
            offsets[a + 1] = offsets[a] + counts[a];
        }
        let mut cursors = offsets.clone();
        let mut indices = vec![0usize; offsets[n]];
        for hit in found.into_iter().flatten() {
            let tag = object_map.tag(hit);
            let a = (tag - 1) as usize;
            indices[cursors[a]] = hit;
            cursors[a] += 1;
        }

        self.exposed = Some(IndexTable { offsets, indices });
        self
    }
}

fn fill_table(
    local_len: usize,
    n: usize,
    counts: Vec<usize>,
    membership: impl Fn(usize) -> Option<usize>,
) -> IndexTable {
    let mut offsets = vec![0usize; n + 1];
    for a in 0..n {
        offsets[a + 1] = offsets[a] + counts[a];
    }
    let mut cursors = offsets.clone();
    let mut indices = vec![0usize; offsets[n]];
    for i in 0..local_len {
        if let Some(a) = membership(i) {
            indices[cursors[a]] = i;
            cursors[a] += 1;
        }
    }
    IndexTable { offsets, indices }
}

/// Evaluates the asymmetric eight-cell surface criterion at non-ghost node
/// `i` for object `a` (1-based tag). Samples the eight grid cells whose
/// *upper* corner is `i` (the node itself plus the three lower-axis
/// neighbours and their pairwise/triple combinations) and returns true iff
/// between one and seven of those eight sampled nodes carry tag `a`.
fn is_surface_node<G: GridTopology>(grid: &G, object_map: &ObjectMap, i: usize, a: i64) -> bool {
    let sx = grid.size_prod(1) as isize;
    let sy = grid.size_prod(2) as isize;
    let sz = grid.size_prod(3) as isize;
    let i = i as isize;

    let offsets = [
        0,
        -sz,
        -sx,
        -sx - sz,
        -sy,
        -sy - sz,
        -sy - sx,
        -sy - sx - sz,
    ];

    let mut d = 0usize;
    for off in offsets {
        let sample = i + off;
        if sample < 0 {
            continue;
        }
        if object_map.tag(sample as usize) == a {
            d += 1;
        }
    }

    d > 0 && d < 8
}
