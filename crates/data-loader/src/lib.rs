#![deny(warnings)]

//! Data loader: reads the static JSON catalogs and the YAML trainer config.
//!
//! Loading fails fast: the first missing or malformed required document stops
//! the load, and the error names the file. Nothing is retried.

use facility::{Equipment, FacilityCatalog, FacilityError, FacilityMap, HazardZone};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;
use trainer_core::{
    validate_scenario_catalog, validate_tag_catalog, ScenarioCatalog, TagCatalog, TagPolicy,
    ValidationError,
};

pub const TAGS_FILE: &str = "tags.json";
pub const SCENARIOS_FILE: &str = "scenarios.json";
pub const FACILITY_FILE: &str = "facility.json";
pub const EQUIPMENT_FILE: &str = "equipment.json";
pub const HAZARD_ZONES_FILE: &str = "hazard_zones.json";

/// Hint shown to the operator under any load failure.
pub const LOAD_HINT: &str =
    "Check that the data directory exists and file names match exactly (case-sensitive).";

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to load {path}: {message}")]
    Io { path: PathBuf, message: String },
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("invalid catalog {path}: {source}")]
    Invalid {
        path: PathBuf,
        source: ValidationError,
    },
    #[error("invalid facility map: {0}")]
    Facility(#[from] FacilityError),
    #[error("invalid config {path}: {message}")]
    Config { path: PathBuf, message: String },
}

impl LoadError {
    /// Error text plus the operator hint, for the error panel.
    pub fn operator_message(&self) -> String {
        format!("{self}\n{LOAD_HINT}")
    }
}

/// Optional catalogs. A disabled flag skips reading that document and leaves
/// its map layer empty.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Features {
    pub equipment: bool,
    pub hazard_zones: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            equipment: true,
            hazard_zones: true,
        }
    }
}

/// Map geometry settings.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// Side length of the 3D ground plane, in world units.
    pub world_size: f64,
    /// Pin hit radius in normalized map units.
    pub pin_radius: f64,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            world_size: 100.0,
            pin_radius: FacilityMap::DEFAULT_PIN_RADIUS,
        }
    }
}

/// Trainer configuration. Every field has a default.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    pub data_dir: PathBuf,
    pub default_scenario: String,
    pub tag_policy: TagPolicy,
    pub features: Features,
    pub map: MapConfig,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("assets/data"),
            default_scenario: "SCN_C101_LSHH_TRIP".to_string(),
            tag_policy: TagPolicy::default(),
            features: Features::default(),
            map: MapConfig::default(),
        }
    }
}

/// Parse a YAML config document.
pub fn parse_config(text: &str) -> Result<TrainerConfig, serde_yaml::Error> {
    if text.trim().is_empty() {
        return Ok(TrainerConfig::default());
    }
    serde_yaml::from_str(text)
}

/// Load the config at `path`; a missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<TrainerConfig, LoadError> {
    if !path.exists() {
        info!(path = %path.display(), "no config file, using defaults");
        return Ok(TrainerConfig::default());
    }
    let text = fs::read_to_string(path).map_err(|e| LoadError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    parse_config(&text).map_err(|e| LoadError::Config {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Every document the trainer reads at start-up.
#[derive(Clone, Debug, Default)]
pub struct Catalogs {
    pub tags: TagCatalog,
    pub scenarios: ScenarioCatalog,
    pub facility: FacilityCatalog,
    pub equipment: Vec<Equipment>,
    pub zones: Vec<HazardZone>,
}

impl Catalogs {
    /// Build the facility map from the loaded documents.
    pub fn facility_map(&self, map: &MapConfig) -> Result<FacilityMap, LoadError> {
        let m = FacilityMap::new(
            self.facility.clone(),
            self.equipment.clone(),
            self.zones.clone(),
        )?;
        Ok(m.with_pin_radius(map.pin_radius))
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, LoadError> {
    let text = fs::read_to_string(path).map_err(|e| LoadError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    serde_json::from_str(&text).map_err(|e| LoadError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Load all catalogs from `dir`. Optional documents are read only when their
/// feature flag is on.
pub fn load_catalogs(dir: &Path, features: &Features) -> Result<Catalogs, LoadError> {
    let tags_path = dir.join(TAGS_FILE);
    let tags: TagCatalog = read_json(&tags_path)?;
    validate_tag_catalog(&tags).map_err(|source| LoadError::Invalid {
        path: tags_path,
        source,
    })?;

    let scenarios_path = dir.join(SCENARIOS_FILE);
    let scenarios: ScenarioCatalog = read_json(&scenarios_path)?;
    validate_scenario_catalog(&scenarios).map_err(|source| LoadError::Invalid {
        path: scenarios_path,
        source,
    })?;

    let facility: FacilityCatalog = read_json(&dir.join(FACILITY_FILE))?;
    let equipment: Vec<Equipment> = if features.equipment {
        read_json(&dir.join(EQUIPMENT_FILE))?
    } else {
        Vec::new()
    };
    let zones: Vec<HazardZone> = if features.hazard_zones {
        read_json(&dir.join(HAZARD_ZONES_FILE))?
    } else {
        Vec::new()
    };

    info!(
        dir = %dir.display(),
        tags = tags.tags.len(),
        scenarios = scenarios.scenarios.len(),
        areas = facility.areas.len(),
        equipment = equipment.len(),
        zones = zones.len(),
        "catalogs loaded"
    );
    Ok(Catalogs {
        tags,
        scenarios,
        facility,
        equipment,
        zones,
    })
}
