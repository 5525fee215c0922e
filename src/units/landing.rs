//! Landing: file raw downloads into the persistent folder.
//!
//! Files dropped into the temporal folder are recognised by name and moved to
//! `<persistent>/<source>/<dataset>/<YYYYMMDD>.<ext>`. Anything unrecognised
//! stays where it is.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::core::stage::{RegistryError, UnitArgs};

use super::ProcessingUnit;

pub const UNIT_NAME: &str = "landing";

/// Filename rule: pattern plus destination subfolder
struct LandingRule {
    pattern: &'static str,
    destination: &'static str,
}

const RULES: &[LandingRule] = &[
    LandingRule {
        pattern: r"^Motor_Vehicle_Collisions_-_Crashes_(\d{8})\.csv$",
        destination: "motor_vehicle_collisions/crashes",
    },
    LandingRule {
        pattern: r"^Motor_Vehicle_Collisions_-_Person_(\d{8})\.csv$",
        destination: "motor_vehicle_collisions/person",
    },
    LandingRule {
        pattern: r"^Motor_Vehicle_Collisions_-_Vehicles_(\d{8})\.csv$",
        destination: "motor_vehicle_collisions/vehicles",
    },
    LandingRule {
        pattern: r"^NHTSA_-_Safety_Rating_(\d{8})\.json$",
        destination: "nhtsa/safety_rating",
    },
];

fn compiled_rules() -> &'static [(Regex, &'static str)] {
    static COMPILED: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        RULES
            .iter()
            .filter_map(|rule| match Regex::new(rule.pattern) {
                Ok(re) => Some((re, rule.destination)),
                Err(e) => {
                    warn!(pattern = rule.pattern, error = %e, "Invalid landing pattern");
                    None
                }
            })
            .collect()
    })
}

/// Relative destination for a raw filename, if it matches a known source
pub fn classify(file_name: &str) -> Option<PathBuf> {
    let extension = Path::new(file_name).extension()?.to_str()?;
    compiled_rules().iter().find_map(|(re, destination)| {
        let caps = re.captures(file_name)?;
        let date = caps.get(1)?.as_str();
        Some(Path::new(destination).join(format!("{}.{}", date, extension)))
    })
}

/// Moves recognised files from the temporal to the persistent folder
pub struct LandingUnit {
    temporal: PathBuf,
    persistent: PathBuf,
}

impl LandingUnit {
    pub fn new(temporal: PathBuf, persistent: PathBuf) -> Self {
        Self {
            temporal,
            persistent,
        }
    }
}

/// Registry constructor
pub fn build(args: UnitArgs) -> Result<Box<dyn ProcessingUnit>, RegistryError> {
    let (temporal, persistent) = args.into_folders(UNIT_NAME)?;
    Ok(Box::new(LandingUnit::new(temporal, persistent)))
}

#[async_trait]
impl ProcessingUnit for LandingUnit {
    fn name(&self) -> &str {
        UNIT_NAME
    }

    async fn execute(&self) -> Result<()> {
        if !tokio::fs::try_exists(&self.temporal).await.unwrap_or(false) {
            warn!(folder = %self.temporal.display(), "Temporal folder does not exist");
            return Ok(());
        }

        let mut entries = tokio::fs::read_dir(&self.temporal)
            .await
            .with_context(|| format!("Failed to read {}", self.temporal.display()))?;

        let mut moved = 0usize;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let Some(relative) = classify(&file_name) else {
                debug!(file = %file_name, "No landing rule matches, leaving in place");
                continue;
            };

            let destination = self.persistent.join(relative);
            if let Some(parent) = destination.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            move_file(&entry.path(), &destination).await?;
            info!(from = %file_name, to = %destination.display(), "Landed file");
            moved += 1;
        }

        info!(moved, "Landing complete");
        Ok(())
    }
}

/// Rename, falling back to copy + remove across filesystems
async fn move_file(from: &Path, to: &Path) -> Result<()> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(from, to)
        .await
        .with_context(|| format!("Failed to copy {} to {}", from.display(), to.display()))?;
    tokio::fs::remove_file(from)
        .await
        .with_context(|| format!("Failed to remove {}", from.display()))?;
    Ok(())
}
