//! Configuration consumed by the object subsystem (spec §6).
//!
//! Mirrors the colon-delimited key families named in the specification
//! (`methods:poisson`, `objects:workFunction[a]`, ...) as nested YAML
//! sections, deserialized with `serde`/`serde_yaml`. Only the keys the
//! capacitance-matrix core and its loosely-coupled photoemission
//! subcomponent actually read are modelled; everything else in the
//! surrounding program's configuration is opaque to this crate.

use serde::Deserialize;

use crate::error::{CoreError, CoreResult};

/// Root configuration document.
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub methods: MethodsConfig,
    #[serde(default)]
    pub objects: ObjectsConfig,
    #[serde(default)]
    pub spectrum: SpectrumConfig,
}

/// `methods:*` section.
#[derive(Clone, Debug, Deserialize)]
pub struct MethodsConfig {
    /// Selector for the Poisson solver backend. The object core never
    /// interprets this itself; it is threaded through so the surrounding
    /// program can pick the right [`crate::poisson::PoissonSolver`].
    pub poisson: String,
}

/// `objects:*` section. Per-object arrays are indexed by object id minus one
/// (object ids are 1-based per spec §3; index 0 of these vectors is object 1).
#[derive(Clone, Debug, Deserialize, Default)]
pub struct ObjectsConfig {
    /// Work function per object, used only by the photoemission subcomponent.
    #[serde(default)]
    pub work_function: Vec<f64>,
    /// Whether each object's surface conducts for the purposes of the
    /// photoemission model.
    #[serde(default)]
    pub conducting_surface: Vec<bool>,
    /// Distance from the illuminating source, used only by the
    /// photoemission subcomponent.
    #[serde(default)]
    pub distance_from_sun: Option<f64>,
}

/// `spectrum:*` section, used only by the photoemission subcomponent.
#[derive(Clone, Debug, Deserialize, Default)]
pub struct SpectrumConfig {
    pub black_body_temp: Option<f64>,
}

impl Config {
    /// Parses a YAML configuration document.
    pub fn from_yaml_str(yaml: &str) -> CoreResult<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| CoreError::config(format!("failed to parse configuration: {e}")))
    }

    /// Loads and parses a YAML configuration file.
    pub fn from_yaml_file(path: impl AsRef<std::path::Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            CoreError::config(format!(
                "failed to read configuration file '{}': {e}",
                path.display()
            ))
        })?;
        Self::from_yaml_str(&contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let yaml = r#"
methods:
  poisson: multigrid
"#;
        let config = Config::from_yaml_str(yaml).unwrap();
        assert_eq!(config.methods.poisson, "multigrid");
        assert!(config.objects.work_function.is_empty());
    }

    #[test]
    fn parses_photoemission_section() {
        let yaml = r#"
methods:
  poisson: spectral
objects:
  work_function: [4.5, 4.2]
  conducting_surface: [true, false]
  distance_from_sun: 1.0
spectrum:
  black_body_temp: 5778.0
"#;
        let config = Config::from_yaml_str(yaml).unwrap();
        assert_eq!(config.objects.work_function, vec![4.5, 4.2]);
        assert_eq!(config.spectrum.black_body_temp, Some(5778.0));
    }
}
