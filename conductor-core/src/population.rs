//! Contract for the external particle population (spec §6).
//!
//! The mover and migration machinery live outside this crate; C6 (impact
//! collection) only needs enough of the population to find a particle's
//! position, read its species' charge, and remove it in amortized O(1) by
//! swapping in the last particle of that species (spec §6).

use nalgebra::Vector3;

/// External collaborator exposing particle storage to the impact collector.
pub trait Population {
    /// Number of distinct species.
    fn num_species(&self) -> usize;

    /// The `[start, stop)` index range owned by `species` within the flat
    /// particle arrays.
    fn species_range(&self, species: usize) -> std::ops::Range<usize>;

    /// Per-particle charge, in simulation units, for the species that
    /// particle `index` belongs to.
    fn charge(&self, species: usize) -> f64;

    /// Position of the particle at `index`.
    fn position(&self, index: usize) -> Vector3<f64>;

    /// Removes the particle at `index` by swapping the last particle of
    /// `species` into its place, then shrinking that species' range by one.
    /// Invalidates any previously returned index at the new end of the range.
    fn cut(&mut self, species: usize, index: usize);
}

/// Reference [`Population`] used by tests and the CLI harness: one flat
/// position vector plus contiguous per-species ranges, mirroring the
/// "swap last particle into the gap" contract directly.
#[derive(Clone, Debug, Default)]
pub struct VecPopulation {
    positions: Vec<Vector3<f64>>,
    /// `[start, stop)` ranges, one per species, kept contiguous as particles
    /// are cut.
    ranges: Vec<std::ops::Range<usize>>,
    charges: Vec<f64>,
}

impl VecPopulation {
    pub fn new(species_charges: Vec<f64>) -> Self {
        Self {
            positions: Vec::new(),
            ranges: vec![0..0; species_charges.len()],
            charges: species_charges,
        }
    }

    /// Appends a particle to the end of `species`'s range. Only valid if the
    /// species' range is already the last (or only) range in the flat array,
    /// which holds as long as particles are added species-by-species before
    /// any `cut` calls, matching how the reference harness seeds a scenario.
    pub fn push(&mut self, species: usize, position: Vector3<f64>) {
        self.positions.push(position);
        self.ranges[species].end += 1;
        for later in (species + 1)..self.ranges.len() {
            self.ranges[later].start += 1;
            self.ranges[later].end += 1;
        }
    }

    pub fn positions(&self) -> &[Vector3<f64>] {
        &self.positions
    }
}

impl Population for VecPopulation {
    fn num_species(&self) -> usize {
        self.ranges.len()
    }

    fn species_range(&self, species: usize) -> std::ops::Range<usize> {
        self.ranges[species].clone()
    }

    fn charge(&self, species: usize) -> f64 {
        self.charges[species]
    }

    fn position(&self, index: usize) -> Vector3<f64> {
        self.positions[index]
    }

    fn cut(&mut self, species: usize, index: usize) {
        let last = self.ranges[species].end - 1;
        self.positions.swap(index, last);
        self.positions.pop();
        self.ranges[species].end -= 1;
        for later in (species + 1)..self.ranges.len() {
            self.ranges[later].start -= 1;
            self.ranges[later].end -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cut_swaps_last_particle_into_gap() {
        let mut pop = VecPopulation::new(vec![-1.0]);
        pop.push(0, Vector3::new(0.0, 0.0, 0.0));
        pop.push(0, Vector3::new(1.0, 0.0, 0.0));
        pop.push(0, Vector3::new(2.0, 0.0, 0.0));

        pop.cut(0, 0);
        assert_eq!(pop.species_range(0), 0..2);
        assert_eq!(pop.position(0), Vector3::new(2.0, 0.0, 0.0));
        assert_eq!(pop.position(1), Vector3::new(1.0, 0.0, 0.0));
    }
}
