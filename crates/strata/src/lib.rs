//! Strata: distributed hydrocarbon flow-path resolution.
//!
//! This is the top-level facade crate that re-exports the public API of
//! the Strata sub-crates. For most users, adding `strata` as a single
//! dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use strata::prelude::*;
//!
//! // A one-layer designated reservoir over a two-layer source rock.
//! let mut volume = PropertyVolume::builder(4, 4)
//!     .formation(1, 2.0)
//!     .formation(2, 2.0)
//!     .build()?;
//! volume.fill(FormationId(0), PropertyId::Depth, |_, _, l| 1010.0 - 10.0 * f64::from(l));
//! volume.fill(FormationId(1), PropertyId::Depth, |_, _, l| 1030.0 - 10.0 * f64::from(l));
//! for f in [FormationId(0), FormationId(1)] {
//!     volume.fill(f, PropertyId::VerticalPermeability, |_, _, _| 1.0);
//!     volume.fill(f, PropertyId::HorizontalPermeability, |_, _, _| 1.0);
//!     volume.fill(f, PropertyId::Porosity, |_, _, _| 0.2);
//! }
//!
//! let mut charge = Composition::new();
//! charge.add(Species::C1, 5.0);
//! let mut charges = ChargeMap::new();
//! charges.insert(FormationId(1), 1, 1, &charge);
//!
//! let model = BasinModel {
//!     properties: Arc::new(volume),
//!     grid: (4, 4),
//!     spacing: (100.0, 100.0),
//!     formations: vec![
//!         FormationSpec::new("reservoir", 1).reservoir(),
//!         FormationSpec::new("source", 2).source_rock(),
//!     ],
//!     charges,
//! };
//! let step = MigrationStep::new(MigrationConfig::default())?;
//! let outcome = Cluster::new(2).run(&model, &step)?;
//!
//! let t = outcome.transport();
//! let accounted = t.delivered + t.blocked + t.stuck + t.eliminated;
//! assert!((accounted - 5.0).abs() < 1e-9);
//! assert!(outcome.ledger(FormationId(0)).is_some());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Modules
//!
//! Each module corresponds to a sub-crate. Use them for types not in the
//! prelude.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Identifiers, compositions, property ids and vectors (`strata-core`).
pub use strata_core as types;

/// Rank-to-rank requests, sessions and reductions (`strata-comm`).
///
/// [`comm::mesh`] connects in-process [`comm::Endpoint`]s; reads of
/// remote nodes happen inside a [`comm::Session`].
pub use strata_comm as comm;

/// Partitioned formation node grids (`strata-grid`).
///
/// Build a [`grid::PropertyVolume`], split the columns with a
/// [`grid::PartitionLayout`], and assemble each rank's
/// [`grid::FormationStack`].
pub use strata_grid as grid;

/// Flow paths, reservoirs and transport (`strata-migration`).
///
/// [`migration::MigrationStep`] runs one step on one rank;
/// [`migration::Cluster`] runs it on every rank of an in-process mesh.
pub use strata_migration as migration;

/// Common imports for typical Strata usage.
///
/// ```rust
/// use strata::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use strata_core::{
        Composition, FaultStatus, FormationId, NodeKey, Phase, PropertyId, Rank, Species, Vec3,
        UNDEFINED,
    };

    // Transport
    pub use strata_comm::{mesh, CommConfig, CommError, Endpoint};

    // Grids
    pub use strata_grid::{
        BlockingThresholds, FormationSpec, FormationStack, GridError, PartitionLayout,
        PropertySource, PropertyVolume,
    };

    // Migration
    pub use strata_migration::{
        BasinModel, ChargeMap, Cluster, ClusterOutcome, ConfigError, Expulsion, MigrationConfig,
        MigrationError, MigrationStep, ReservoirLedger, StepMetrics, StepOutcome, StuckPolicy,
        TransportReport,
    };
}
