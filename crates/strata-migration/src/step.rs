//! One migration step on one rank.
//!
//! [`MigrationStep::run`] takes a freshly built [`FormationStack`]
//! through every phase: properties, reservoir flagging and
//! classification, flow directions, ranking, target resolution, and
//! transport. All ranks run it together; every phase that talks to
//! peers is collective.

use std::collections::BTreeMap;
use std::time::Instant;

use strata_comm::{Endpoint, ReduceOp};
use strata_core::{FormationId, NodeKey, Rank};
use strata_grid::{FormationStack, GridError};

use crate::config::{ConfigError, MigrationConfig};
use crate::driver::{self, PathSpan};
use crate::error::MigrationError;
use crate::metrics::StepMetrics;
use crate::transport::{load_charges, ChargeMap, ReservoirLedger, TransportReport};

/// What one rank learned in a migration step.
#[derive(Clone, Debug, PartialEq)]
pub struct StepOutcome {
    /// The reporting rank.
    pub rank: Rank,
    /// Resolved target of every owned valid node.
    pub targets: BTreeMap<NodeKey, NodeKey>,
    /// Candidate index each owned ranked node settled on.
    pub attempts: BTreeMap<NodeKey, usize>,
    /// Formations hosting a reservoir, deepest first.
    pub reservoirs: Vec<FormationId>,
    /// Charge this rank delivered, one ledger per hosting formation.
    pub ledgers: Vec<ReservoirLedger>,
    /// Delivered and blocked masses of this rank; stuck and eliminated
    /// masses summed over all ranks.
    pub transport: TransportReport,
    /// Timings and counters.
    pub metrics: StepMetrics,
}

/// A validated migration configuration, ready to run.
#[derive(Clone, Debug)]
pub struct MigrationStep {
    config: MigrationConfig,
}

struct PhaseTimer {
    lap: Instant,
}

impl PhaseTimer {
    fn new() -> Self {
        Self { lap: Instant::now() }
    }

    fn finish(&mut self, metrics: &mut StepMetrics, phase: &'static str) {
        let us = self.lap.elapsed().as_micros() as u64;
        metrics.phase_us.push((phase, us));
        tracing::info!(phase, us, "phase finished");
        self.lap = Instant::now();
    }
}

impl MigrationStep {
    /// Validate `config`.
    pub fn new(config: MigrationConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The configuration.
    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Run the step on this rank's `stack`, moving the charges in
    /// `charges`.
    ///
    /// Collective: every rank of `endpoint`'s mesh must call it with a
    /// stack built from the same layout and formations.
    pub fn run(
        &self,
        stack: &mut FormationStack,
        endpoint: &mut Endpoint,
        charges: &ChargeMap,
    ) -> Result<StepOutcome, MigrationError> {
        let started = Instant::now();
        let sent = endpoint.stats().requests_sent;
        let served = endpoint.stats().requests_served;
        let mut metrics = StepMetrics::default();
        let mut timer = PhaseTimer::new();

        stack.clear_properties();
        stack.compute_properties();
        timer.finish(&mut metrics, "properties");

        let span = PathSpan::of(stack).ok_or(GridError::NoFormations)?;
        let flagged = driver::flag_reservoirs(stack, &span, &self.config);
        let reservoirs =
            driver::classify_reservoirs(stack, endpoint, &span, &self.config, &mut metrics)?;
        if let Some(target) = stack.formation_mut(span.target) {
            let top = target.top_layer();
            target.set_end_of_path(top);
        }
        tracing::debug!(flagged, reservoirs = reservoirs.len(), "reservoirs classified");
        timer.finish(&mut metrics, "reservoirs");

        driver::compute_flow_directions(stack, &span, &self.config);
        timer.finish(&mut metrics, "flow");

        driver::compute_adjacent_nodes(stack, endpoint, &span, &mut metrics)?;
        timer.finish(&mut metrics, "ranking");

        driver::compute_target_formation_nodes(
            stack,
            endpoint,
            &span,
            &self.config,
            &mut metrics,
        )?;
        timer.finish(&mut metrics, "resolve");

        load_charges(stack, charges);
        let (ledgers, mut transport) = driver::charge_reservoirs(
            stack,
            endpoint,
            &reservoirs,
            self.config.expulsion.fraction(),
            &mut metrics,
        )?;
        transport.stuck = endpoint.all_reduce(ReduceOp::Sum, transport.stuck, &*stack)?;
        transport.eliminated =
            endpoint.all_reduce(ReduceOp::Sum, transport.eliminated, &*stack)?;
        if endpoint.rank() == Rank(0) && (transport.stuck > 0.0 || transport.eliminated > 0.0) {
            tracing::warn!(
                target: "strata::transport",
                stuck = transport.stuck,
                eliminated = transport.eliminated,
                "hydrocarbons did not reach a reservoir"
            );
        }
        timer.finish(&mut metrics, "transport");

        metrics.blocked_mass = transport.blocked;
        metrics.stuck_mass = transport.stuck;
        metrics.eliminated_mass = transport.eliminated;
        metrics.requests_sent = endpoint.stats().requests_sent - sent;
        metrics.requests_served = endpoint.stats().requests_served - served;
        metrics.total_us = started.elapsed().as_micros() as u64;

        let (targets, attempts) = collect_paths(stack);
        Ok(StepOutcome {
            rank: endpoint.rank(),
            targets,
            attempts,
            reservoirs,
            ledgers,
            transport,
            metrics,
        })
    }
}

type Paths = (BTreeMap<NodeKey, NodeKey>, BTreeMap<NodeKey, usize>);

fn collect_paths(stack: &FormationStack) -> Paths {
    let mut targets = BTreeMap::new();
    let mut attempts = BTreeMap::new();
    for formation in stack.formations() {
        for node in formation.array().locals() {
            if !node.is_valid() {
                continue;
            }
            let key = node.key();
            if let Some(target) = stack.target_of(key) {
                targets.insert(key, target);
            }
            if !node.path.ranking.is_empty() {
                attempts.insert(key, node.path.attempt);
            }
        }
    }
    (targets, attempts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use strata_comm::{mesh, CommConfig};
    use strata_core::{Composition, PropertyId, Species};
    use strata_grid::{FormationSpec, PartitionLayout, PropertyVolume};

    const SEAL: FormationId = FormationId(0);
    const RES: FormationId = FormationId(1);
    const SRC: FormationId = FormationId(2);

    /// Flat seal over a designated reservoir over a source rock.
    fn stack() -> FormationStack {
        let mut v = PropertyVolume::builder(4, 4)
            .formation(1, 1.0)
            .formation(2, 1.0)
            .formation(1, 1.0)
            .build()
            .unwrap();
        v.fill(SEAL, PropertyId::Depth, |_, _, l| 1000.0 - 10.0 * f64::from(l));
        v.fill(RES, PropertyId::Depth, |_, _, l| 1020.0 - 10.0 * f64::from(l));
        v.fill(SRC, PropertyId::Depth, |_, _, l| 1030.0 - 10.0 * f64::from(l));
        for f in [SEAL, RES, SRC] {
            v.fill(f, PropertyId::VerticalPermeability, |_, _, _| 1.0);
            v.fill(f, PropertyId::HorizontalPermeability, |_, _, _| 1.0);
            v.fill(f, PropertyId::Porosity, |_, _, _| 0.2);
        }
        let layout = PartitionLayout::single(4, 4).unwrap();
        FormationStack::builder(layout, Rank(0), Arc::new(v))
            .spacing(100.0, 100.0)
            .formation(FormationSpec::new("seal", 1))
            .formation(FormationSpec::new("reservoir", 2).reservoir())
            .formation(FormationSpec::new("source", 1).source_rock())
            .build()
            .unwrap()
    }

    #[test]
    fn rejects_invalid_config() {
        let config = MigrationConfig {
            max_rounds: 0,
            ..MigrationConfig::default()
        };
        assert_eq!(MigrationStep::new(config).unwrap_err(), ConfigError::ZeroRounds);
    }

    #[test]
    fn flat_stack_delivers_straight_up() {
        let mut s = stack();
        let mut endpoints = mesh(1, CommConfig::default()).unwrap();
        let mut charges = ChargeMap::new();
        let mut c = Composition::new();
        c.add(Species::C1, 10.0);
        charges.insert(SRC, 1, 2, &c);
        let step = MigrationStep::new(MigrationConfig::default()).unwrap();
        let outcome = step.run(&mut s, &mut endpoints[0], &charges).unwrap();

        assert_eq!(outcome.reservoirs, vec![RES]);
        let source = NodeKey::new(SRC, 1, 2, 0);
        assert_eq!(outcome.targets[&source], NodeKey::new(RES, 1, 2, 1));
        assert_eq!(outcome.ledgers.len(), 1);
        assert_eq!(outcome.ledgers[0].column(1, 2).unwrap().total(), 10.0);
        assert_eq!(outcome.transport.stuck, 0.0);
        assert_eq!(outcome.metrics.requests_sent, 0);
        assert!(outcome.metrics.rounds >= 2);
        for phase in ["properties", "reservoirs", "flow", "ranking", "resolve", "transport"] {
            assert!(outcome.metrics.phase_us.iter().any(|(p, _)| *p == phase));
        }
    }
}
