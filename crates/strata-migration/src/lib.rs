//! Flow-path resolution, reservoir detection and charge transport.
//!
//! A [`MigrationStep`] takes each rank's [`FormationStack`](strata_grid::FormationStack)
//! from raw node properties to resolved flow paths: every valid node
//! learns the node where hydrocarbons starting at it come to rest.
//! Reservoirs are flagged below capillary seals, crests decide which
//! formations host one, and expelled or leaked charge is moved along the
//! paths into per-column [`ReservoirLedger`]s.
//!
//! Ranks read each other's nodes through a [`NodeAccess`] inside a
//! communication session. [`Cluster`] runs a whole step over an
//! in-process mesh, one thread per rank, and merges the results.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod access;
pub mod config;
pub mod driver;
pub mod error;
pub mod flow;
pub mod metrics;
pub mod ranking;
pub mod reservoir;
pub mod resolver;
pub mod runner;
pub mod step;
pub mod transport;

pub use access::NodeAccess;
pub use config::{ConfigError, Expulsion, MigrationConfig, StuckPolicy};
pub use driver::PathSpan;
pub use error::MigrationError;
pub use metrics::StepMetrics;
pub use runner::{BasinModel, Cluster, ClusterOutcome};
pub use step::{MigrationStep, StepOutcome};
pub use transport::{ChargeMap, ReservoirLedger, TransportReport};
