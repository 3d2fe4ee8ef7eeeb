//! Benchmark profiles for the Strata flow-path engine.
//!
//! - [`reference_basin`]: 48x48 columns, four formations, seeded relief
//! - [`stress_basin`]: 128x128 columns of the same structure

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use strata_migration::{BasinModel, MigrationConfig, MigrationStep};
use strata_test_utils::random_basin;

/// Reference profile: 48x48 columns (2304 per formation).
pub fn reference_basin(seed: u64) -> BasinModel {
    random_basin(48, seed)
}

/// Stress profile: 128x128 columns (16384 per formation).
pub fn stress_basin(seed: u64) -> BasinModel {
    random_basin(128, seed)
}

/// The step every profile runs: default settings, oil phase.
pub fn reference_step() -> MigrationStep {
    MigrationStep::new(MigrationConfig::default()).expect("default config is valid")
}
