//! Running a migration step across a mesh of in-process ranks.
//!
//! [`Cluster::run`] partitions the grid, connects one [`Endpoint`] per
//! rank, and runs [`MigrationStep::run`] on a scoped thread per rank.
//! A rank that fails aborts its endpoint so its peers stop waiting; the
//! error reported is the one that caused the abort, not the aborts it
//! triggered.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;

use strata_comm::{mesh, CommConfig, CommError, Endpoint};
use strata_core::{FormationId, NodeKey, Rank};
use strata_grid::{
    BlockingThresholds, FormationSpec, FormationStack, GridError, PartitionLayout, PropertySource,
};

use crate::error::MigrationError;
use crate::metrics::StepMetrics;
use crate::step::{MigrationStep, StepOutcome};
use crate::transport::{ChargeMap, ReservoirLedger, TransportReport};

// ── BasinModel ─────────────────────────────────────────────────────

/// Everything a rank needs to build its share of the basin.
#[derive(Clone)]
pub struct BasinModel {
    /// Property maps, shared read-only by every rank.
    pub properties: Arc<dyn PropertySource>,
    /// Node columns `(ni, nj)`, matching the property maps. The last
    /// row and column of nodes have no far corners and stay invalid.
    pub grid: (i32, i32),
    /// Lateral node spacing.
    pub spacing: (f64, f64),
    /// Formations, shallowest first.
    pub formations: Vec<FormationSpec>,
    /// Charge waiting at the top of each formation.
    pub charges: ChargeMap,
}

impl BasinModel {
    /// Build the formation stack of `rank`.
    pub fn stack(
        &self,
        layout: &PartitionLayout,
        rank: Rank,
        blocking: BlockingThresholds,
    ) -> Result<FormationStack, GridError> {
        let mut builder = FormationStack::builder(layout.clone(), rank, Arc::clone(&self.properties))
            .spacing(self.spacing.0, self.spacing.1)
            .blocking(blocking);
        for spec in &self.formations {
            builder = builder.formation(spec.clone());
        }
        builder.build()
    }
}

impl std::fmt::Debug for BasinModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasinModel")
            .field("grid", &self.grid)
            .field("spacing", &self.spacing)
            .field("formations", &self.formations)
            .field("charges", &self.charges)
            .finish_non_exhaustive()
    }
}

// ── Cluster ────────────────────────────────────────────────────────

/// A mesh of ranks that run one migration step together.
#[derive(Clone, Debug)]
pub struct Cluster {
    ranks: u32,
    comm: CommConfig,
}

impl Cluster {
    /// A cluster of `ranks` ranks with the default transport settings.
    pub fn new(ranks: u32) -> Self {
        Self {
            ranks,
            comm: CommConfig::default(),
        }
    }

    /// Replace the transport settings.
    pub fn with_comm(mut self, comm: CommConfig) -> Self {
        self.comm = comm;
        self
    }

    /// Number of ranks.
    pub fn ranks(&self) -> u32 {
        self.ranks
    }

    /// Run `step` over `model` on every rank.
    ///
    /// A single rank runs on the calling thread.
    pub fn run(
        &self,
        model: &BasinModel,
        step: &MigrationStep,
    ) -> Result<ClusterOutcome, MigrationError> {
        let layout = PartitionLayout::new(model.grid.0, model.grid.1, self.ranks)?;
        let endpoints = mesh(self.ranks, self.comm.clone())?;
        tracing::info!(ranks = self.ranks, ni = model.grid.0, nj = model.grid.1, "migration started");

        let results: Vec<Result<StepOutcome, MigrationError>> = if self.ranks == 1 {
            endpoints
                .into_iter()
                .map(|endpoint| run_rank(model, &layout, step, endpoint))
                .collect()
        } else {
            thread::scope(|scope| {
                let handles: Vec<_> = endpoints
                    .into_iter()
                    .map(|endpoint| {
                        let rank = endpoint.rank();
                        let layout = &layout;
                        let handle = thread::Builder::new()
                            .name(format!("strata-rank-{}", rank.0))
                            .spawn_scoped(scope, move || run_rank(model, layout, step, endpoint));
                        (rank, handle)
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|(rank, handle)| match handle {
                        Ok(h) => h
                            .join()
                            .unwrap_or(Err(MigrationError::RankPanicked { rank })),
                        Err(e) => Err(MigrationError::ThreadSpawn {
                            rank,
                            reason: e.to_string(),
                        }),
                    })
                    .collect()
            })
        };

        let mut outcomes = Vec::with_capacity(results.len());
        let mut errors = Vec::new();
        for result in results {
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => errors.push(e),
            }
        }
        if let Some(e) = root_cause(errors) {
            tracing::error!(error = %e, "migration failed");
            return Err(e);
        }
        Ok(ClusterOutcome::merge(outcomes))
    }
}

fn run_rank(
    model: &BasinModel,
    layout: &PartitionLayout,
    step: &MigrationStep,
    mut endpoint: Endpoint,
) -> Result<StepOutcome, MigrationError> {
    let rank = endpoint.rank();
    let span = tracing::info_span!("rank", rank = rank.0);
    let _entered = span.enter();
    let result = model
        .stack(layout, rank, step.config().blocking)
        .map_err(MigrationError::from)
        .and_then(|mut stack| step.run(&mut stack, &mut endpoint, &model.charges));
    if let Err(e) = &result {
        tracing::debug!(error = %e, "rank aborting");
        endpoint.abort();
    }
    result
}

/// First error that was not caused by another rank going away.
fn root_cause(errors: Vec<MigrationError>) -> Option<MigrationError> {
    let secondary = |e: &MigrationError| {
        matches!(
            e,
            MigrationError::Comm(CommError::PeerAborted { .. } | CommError::Disconnected { .. })
        )
    };
    let first = errors.iter().position(|e| !secondary(e)).unwrap_or(0);
    errors.into_iter().nth(first)
}

// ── ClusterOutcome ─────────────────────────────────────────────────

/// Results of every rank, merged.
#[derive(Clone, Debug, PartialEq)]
pub struct ClusterOutcome {
    targets: BTreeMap<NodeKey, NodeKey>,
    ledgers: Vec<ReservoirLedger>,
    transport: TransportReport,
    ranks: Vec<StepOutcome>,
}

impl ClusterOutcome {
    fn merge(mut ranks: Vec<StepOutcome>) -> Self {
        ranks.sort_by_key(|o| o.rank);
        let mut targets = BTreeMap::new();
        let mut ledgers: Vec<ReservoirLedger> = Vec::new();
        let mut transport = TransportReport::default();
        for outcome in &ranks {
            targets.extend(outcome.targets.iter().map(|(&k, &t)| (k, t)));
            for ledger in &outcome.ledgers {
                match ledgers.iter_mut().find(|l| l.formation() == ledger.formation()) {
                    Some(merged) => merged.merge(ledger),
                    None => {
                        let mut merged = ReservoirLedger::new(ledger.formation());
                        merged.merge(ledger);
                        ledgers.push(merged);
                    }
                }
            }
            transport.delivered += outcome.transport.delivered;
            transport.blocked += outcome.transport.blocked;
        }
        // Stuck and eliminated masses are already global on every rank.
        if let Some(first) = ranks.first() {
            transport.stuck = first.transport.stuck;
            transport.eliminated = first.transport.eliminated;
        }
        Self {
            targets,
            ledgers,
            transport,
            ranks,
        }
    }

    /// Resolved target of every valid node the paths cross.
    pub fn targets(&self) -> &BTreeMap<NodeKey, NodeKey> {
        &self.targets
    }

    /// Resolved target of `key`.
    pub fn target(&self, key: NodeKey) -> Option<NodeKey> {
        self.targets.get(&key).copied()
    }

    /// Formations hosting a reservoir, deepest first.
    pub fn reservoirs(&self) -> &[FormationId] {
        self.ranks
            .first()
            .map(|o| o.reservoirs.as_slice())
            .unwrap_or_default()
    }

    /// Merged ledgers, deepest reservoir first.
    pub fn ledgers(&self) -> &[ReservoirLedger] {
        &self.ledgers
    }

    /// Merged ledger of `formation`.
    pub fn ledger(&self, formation: FormationId) -> Option<&ReservoirLedger> {
        self.ledgers.iter().find(|l| l.formation() == formation)
    }

    /// Masses moved by every rank.
    pub fn transport(&self) -> &TransportReport {
        &self.transport
    }

    /// Per-rank outcomes in rank order.
    pub fn ranks(&self) -> &[StepOutcome] {
        &self.ranks
    }

    /// Metrics of `rank`.
    pub fn metrics(&self, rank: Rank) -> Option<&StepMetrics> {
        self.ranks.iter().find(|o| o.rank == rank).map(|o| &o.metrics)
    }
}
