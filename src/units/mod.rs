//! Processing units executed by the stages.
//!
//! This module contains:
//! - landing: files raw downloads into the persistent folder
//! - formatted: CSV/JSON readers materializing tables
//! - trusted: the cleaning pipeline per source dataset
//! - exploitation: joins producing rating-by-brand/accident tables
//! - analytical_sandbox: projections for analysis
//! - feature_engineering: model-ready features and train/test splits

pub mod analytical_sandbox;
pub mod exploitation;
pub mod feature_engineering;
pub mod formatted;
pub mod landing;
pub mod trusted;

use anyhow::Result;
use async_trait::async_trait;

/// One dataset-specific transform run inside a stage.
///
/// Units are constructed fresh for every run from the collaborators their
/// stage resolves, so they never carry state from one run to the next.
#[async_trait]
pub trait ProcessingUnit: Send + Sync {
    /// Registration name, also the ledger key
    fn name(&self) -> &str;

    /// Run the transform end to end
    async fn execute(&self) -> Result<()>;
}
