//! Stage registry.
//!
//! A static table mapping each stage name to its ordered units and to the
//! strategy that resolves the collaborators those units are built from.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::config::{CleaningSettings, ResolvedConfig};
use crate::store::{MemoryTableStore, SharedStore, SqliteTableStore, StoreError, Zone};
use crate::units::{
    analytical_sandbox, exploitation, feature_engineering, formatted, landing, trusted,
    ProcessingUnit,
};

/// Errors raised while registering stages or building units
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Stage '{0}' is already registered")]
    DuplicateStage(String),

    #[error("Unit '{unit}' is registered twice (stage '{stage}')")]
    DuplicateUnit { stage: String, unit: String },

    #[error("No store configured for zone '{0}'")]
    MissingStore(Zone),

    #[error("Unit '{unit}' cannot be built from {given} collaborators")]
    WrongArguments { unit: String, given: &'static str },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Collaborators handed to a unit constructor
#[derive(Clone)]
pub enum UnitArgs {
    /// Raw drop folder and persistent archive
    Folders {
        temporal: PathBuf,
        persistent: PathBuf,
    },
    /// A source folder feeding a zone store
    FolderToZone { folder: PathBuf, target: SharedStore },
    /// One zone store feeding the next
    ZoneToZone {
        source: SharedStore,
        target: SharedStore,
        settings: CleaningSettings,
    },
}

impl UnitArgs {
    fn kind(&self) -> &'static str {
        match self {
            UnitArgs::Folders { .. } => "folder",
            UnitArgs::FolderToZone { .. } => "folder-to-zone",
            UnitArgs::ZoneToZone { .. } => "zone-to-zone",
        }
    }

    /// Unpack folder arguments
    pub fn into_folders(self, unit: &str) -> Result<(PathBuf, PathBuf), RegistryError> {
        match self {
            UnitArgs::Folders {
                temporal,
                persistent,
            } => Ok((temporal, persistent)),
            other => Err(other.mismatch(unit)),
        }
    }

    /// Unpack folder-to-zone arguments
    pub fn into_folder_to_zone(self, unit: &str) -> Result<(PathBuf, SharedStore), RegistryError> {
        match self {
            UnitArgs::FolderToZone { folder, target } => Ok((folder, target)),
            other => Err(other.mismatch(unit)),
        }
    }

    /// Unpack zone-to-zone arguments
    pub fn into_zone_to_zone(
        self,
        unit: &str,
    ) -> Result<(SharedStore, SharedStore, CleaningSettings), RegistryError> {
        match self {
            UnitArgs::ZoneToZone {
                source,
                target,
                settings,
            } => Ok((source, target, settings)),
            other => Err(other.mismatch(unit)),
        }
    }

    fn mismatch(&self, unit: &str) -> RegistryError {
        RegistryError::WrongArguments {
            unit: unit.to_string(),
            given: self.kind(),
        }
    }
}

/// Builds a unit from its resolved collaborators
pub type UnitConstructor = fn(UnitArgs) -> Result<Box<dyn ProcessingUnit>, RegistryError>;

/// A registered unit
#[derive(Clone)]
pub struct UnitSpec {
    pub name: &'static str,
    pub construct: UnitConstructor,
}

impl UnitSpec {
    pub fn new(name: &'static str, construct: UnitConstructor) -> Self {
        Self { name, construct }
    }
}

/// How a stage resolves the collaborators of its units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgStrategy {
    /// Temporal and persistent folders
    Landing,
    /// Persistent folder into a zone store
    FolderInto(Zone),
    /// One zone store into another
    Between { source: Zone, target: Zone },
}

impl ArgStrategy {
    /// Resolve collaborators against the run's resources
    pub fn resolve(&self, resources: &Resources) -> Result<UnitArgs, RegistryError> {
        Ok(match *self {
            ArgStrategy::Landing => UnitArgs::Folders {
                temporal: resources.temporal_folder.clone(),
                persistent: resources.persistent_folder.clone(),
            },
            ArgStrategy::FolderInto(zone) => UnitArgs::FolderToZone {
                folder: resources.persistent_folder.clone(),
                target: resources.store(zone)?,
            },
            ArgStrategy::Between { source, target } => UnitArgs::ZoneToZone {
                source: resources.store(source)?,
                target: resources.store(target)?,
                settings: resources.settings,
            },
        })
    }
}

/// A named stage: ordered units plus their collaborator strategy
#[derive(Clone)]
pub struct Stage {
    pub name: String,
    pub strategy: ArgStrategy,
    pub units: Vec<UnitSpec>,
}

impl Stage {
    pub fn new(name: impl Into<String>, strategy: ArgStrategy, units: Vec<UnitSpec>) -> Self {
        Self {
            name: name.into(),
            strategy,
            units,
        }
    }

    /// Unit names in registration order
    pub fn unit_names(&self) -> Vec<&'static str> {
        self.units.iter().map(|u| u.name).collect()
    }
}

/// Stages in declared execution order
#[derive(Clone, Default)]
pub struct StageRegistry {
    stages: Vec<Stage>,
}

impl StageRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The medallion pipeline: landing through feature engineering
    pub fn standard() -> Self {
        let stages = vec![
            Stage::new(
                "landing",
                ArgStrategy::Landing,
                vec![UnitSpec::new(landing::UNIT_NAME, landing::build)],
            ),
            Stage::new(
                "formatted",
                ArgStrategy::FolderInto(Zone::Formatted),
                vec![
                    UnitSpec::new(formatted::CSV_UNIT_NAME, formatted::build_csv),
                    UnitSpec::new(formatted::JSON_UNIT_NAME, formatted::build_json),
                ],
            ),
            Stage::new(
                "trusted",
                ArgStrategy::Between {
                    source: Zone::Formatted,
                    target: Zone::Trusted,
                },
                vec![
                    UnitSpec::new(trusted::person::UNIT_NAME, trusted::person::build),
                    UnitSpec::new(trusted::vehicles::UNIT_NAME, trusted::vehicles::build),
                    UnitSpec::new(trusted::crash::UNIT_NAME, trusted::crash::build),
                    UnitSpec::new(
                        trusted::safety_rating::UNIT_NAME,
                        trusted::safety_rating::build,
                    ),
                ],
            ),
            Stage::new(
                "exploitation",
                ArgStrategy::Between {
                    source: Zone::Trusted,
                    target: Zone::Exploitation,
                },
                vec![
                    UnitSpec::new(exploitation::BRAND_UNIT_NAME, exploitation::build_brand),
                    UnitSpec::new(exploitation::ACCIDENT_UNIT_NAME, exploitation::build_accident),
                ],
            ),
            Stage::new(
                "analytical_sandbox",
                ArgStrategy::Between {
                    source: Zone::Exploitation,
                    target: Zone::AnalyticalSandbox,
                },
                vec![
                    UnitSpec::new(
                        analytical_sandbox::BRANDS_UNIT_NAME,
                        analytical_sandbox::build_brands,
                    ),
                    UnitSpec::new(
                        analytical_sandbox::ACCIDENT_UNIT_NAME,
                        analytical_sandbox::build_accident,
                    ),
                ],
            ),
            Stage::new(
                "feature_engineering",
                ArgStrategy::Between {
                    source: Zone::AnalyticalSandbox,
                    target: Zone::FeatureEngineering,
                },
                vec![
                    UnitSpec::new(
                        feature_engineering::BRANDS_UNIT_NAME,
                        feature_engineering::build_brands,
                    ),
                    UnitSpec::new(
                        feature_engineering::ACCIDENT_UNIT_NAME,
                        feature_engineering::build_accident,
                    ),
                ],
            ),
        ];

        let mut registry = Self::new();
        for stage in stages {
            // Names above are distinct constants; a clash is a programming error
            if let Err(e) = registry.register(stage) {
                tracing::error!(error = %e, "Invalid built-in stage table");
            }
        }
        registry
    }

    /// Append a stage after the existing ones.
    ///
    /// Unit names key the ledger, so they must be unique across all stages.
    pub fn register(&mut self, stage: Stage) -> Result<(), RegistryError> {
        if self.get(&stage.name).is_some() {
            return Err(RegistryError::DuplicateStage(stage.name));
        }

        let mut seen: HashSet<&str> = self
            .stages
            .iter()
            .flat_map(|s| s.units.iter().map(|u| u.name))
            .collect();
        for unit in &stage.units {
            if !seen.insert(unit.name) {
                return Err(RegistryError::DuplicateUnit {
                    stage: stage.name.clone(),
                    unit: unit.name.to_string(),
                });
            }
        }

        self.stages.push(stage);
        Ok(())
    }

    /// Look up a stage by name
    pub fn get(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// All stages in declared order
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Stage names in declared order
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }
}

/// Folders, zone stores and settings shared by every unit of a run
pub struct Resources {
    pub temporal_folder: PathBuf,
    pub persistent_folder: PathBuf,
    pub settings: CleaningSettings,
    stores: HashMap<Zone, SharedStore>,
}

impl Resources {
    /// Open one SQLite store per zone as laid out by the configuration
    pub fn open(config: &ResolvedConfig) -> Result<Self, StoreError> {
        let mut stores: HashMap<Zone, SharedStore> = HashMap::new();
        for zone in Zone::ALL {
            let store = SqliteTableStore::open(zone.as_str(), &config.store_path(zone))?;
            stores.insert(zone, Arc::new(store));
        }
        Ok(Self {
            temporal_folder: config.temporal_folder.clone(),
            persistent_folder: config.persistent_folder.clone(),
            settings: config.cleaning,
            stores,
        })
    }

    /// In-memory stores for every zone
    pub fn in_memory(temporal_folder: PathBuf, persistent_folder: PathBuf) -> Self {
        let stores = Zone::ALL
            .into_iter()
            .map(|zone| {
                let store: SharedStore = Arc::new(MemoryTableStore::new(zone.as_str()));
                (zone, store)
            })
            .collect();
        Self {
            temporal_folder,
            persistent_folder,
            settings: CleaningSettings::default(),
            stores,
        }
    }

    /// Swap in a specific store for one zone
    pub fn with_store(mut self, zone: Zone, store: SharedStore) -> Self {
        self.stores.insert(zone, store);
        self
    }

    /// Override cleaning settings
    pub fn with_settings(mut self, settings: CleaningSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Store handle for a zone
    pub fn store(&self, zone: Zone) -> Result<SharedStore, RegistryError> {
        self.stores
            .get(&zone)
            .cloned()
            .ok_or(RegistryError::MissingStore(zone))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_stage_order() {
        let registry = StageRegistry::standard();
        assert_eq!(
            registry.stage_names(),
            vec![
                "landing",
                "formatted",
                "trusted",
                "exploitation",
                "analytical_sandbox",
                "feature_engineering"
            ]
        );
    }

    #[test]
    fn test_trusted_unit_order() {
        let registry = StageRegistry::standard();
        let trusted = registry.get("trusted").unwrap();
        assert_eq!(
            trusted.unit_names(),
            vec![
                "mvc_person_trusted",
                "mvc_vehicles_trusted",
                "mvc_crash_trusted",
                "nhtsa_safety_rating_trusted"
            ]
        );
    }

    #[test]
    fn test_duplicate_stage_rejected() {
        let mut registry = StageRegistry::standard();
        let err = registry
            .register(Stage::new("landing", ArgStrategy::Landing, Vec::new()))
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateStage(_)));
    }

    #[test]
    fn test_duplicate_unit_rejected() {
        let mut registry = StageRegistry::standard();
        let err = registry
            .register(Stage::new(
                "training",
                ArgStrategy::Landing,
                vec![UnitSpec::new(landing::UNIT_NAME, landing::build)],
            ))
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateUnit { .. }));
    }

    #[test]
    fn test_strategy_resolves_zone_stores() {
        let resources = Resources::in_memory("/tmp/in".into(), "/tmp/archive".into());
        let args = ArgStrategy::Between {
            source: Zone::Formatted,
            target: Zone::Trusted,
        }
        .resolve(&resources)
        .unwrap();

        let (source, target, settings) = args.into_zone_to_zone("unit").unwrap();
        assert_eq!(source.label(), "formatted");
        assert_eq!(target.label(), "trusted");
        assert_eq!(settings, CleaningSettings::default());
    }

    #[test]
    fn test_wrong_arguments_are_reported() {
        let args = UnitArgs::Folders {
            temporal: "/a".into(),
            persistent: "/b".into(),
        };
        let err = args.into_zone_to_zone("mvc_crash_trusted").err().unwrap();
        assert!(matches!(err, RegistryError::WrongArguments { .. }));
    }
}
