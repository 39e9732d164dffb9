//! Photoemission extension point (spec §9).
//!
//! The core only owns the piece of the photoemission subcomponent that
//! touches the grid: the sun-facing exposed-node lookup built by
//! [`crate::classifier::NodeClassifier::with_exposed_nodes`]. The flux model
//! itself — integrating a black-body spectrum against each object's work
//! function to get an emitted current — is out of scope (spec's explicit
//! Non-goals) and was never specified precisely enough to invent here. This
//! trait exists so a future implementation can be plugged in without
//! reshaping C1–C6.

use crate::classifier::IndexTable;
use crate::config::{ObjectsConfig, SpectrumConfig};
use crate::error::CoreResult;

/// Computes per-node photoemission current given the exposed-node lookup and
/// the illumination/material configuration. No implementation ships with
/// this crate; see the module doc comment.
pub trait PhotoemissionModel {
    /// Returns emitted charge per exposed node, in the same order as
    /// `exposed.block(a)` for each object `a`, to be deposited the same way
    /// [`crate::impact::collect_impacts`] deposits collected particle charge.
    fn emitted_charge(
        &self,
        exposed: &IndexTable,
        objects: &ObjectsConfig,
        spectrum: &SpectrumConfig,
    ) -> CoreResult<Vec<f64>>;
}
