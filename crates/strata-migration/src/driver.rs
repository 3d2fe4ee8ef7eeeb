//! Bulk phases over the formation stack.
//!
//! Each function here runs one phase of a migration step on this rank.
//! Phases that read remote nodes open their own sessions and are
//! collective: every rank must call them in the same order.

use strata_comm::{Endpoint, ReduceOp};
use strata_core::FormationId;
use strata_grid::{Formation, FormationStack};

use crate::access::NodeAccess;
use crate::config::MigrationConfig;
use crate::error::MigrationError;
use crate::flow;
use crate::metrics::StepMetrics;
use crate::ranking::rank_node;
use crate::reservoir::{
    detect_reservoir, detect_reservoir_crests, identify_as_reservoir, mark_hosting,
};
use crate::resolver::resolve_layer;
use crate::transport::{
    migrate_expelled_charges, migrate_leaked_charges, ReservoirLedger, TransportReport,
};

// ── PathSpan ───────────────────────────────────────────────────────

/// The formations flow paths cross: from the top layer of the source
/// formation up to the top layer of the target formation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PathSpan {
    /// Top formation; its top layer ends every path.
    pub target: FormationId,
    /// Deepest source rock, or the bottom formation without one.
    pub source: FormationId,
}

impl PathSpan {
    /// The span of `stack`, `None` for an empty stack.
    pub fn of(stack: &FormationStack) -> Option<Self> {
        let formations = stack.formations();
        let bottom = formations.last()?.id();
        let source = formations
            .iter()
            .rev()
            .find(|f| f.is_source_rock())
            .map_or(bottom, Formation::id);
        Some(Self {
            target: FormationId(0),
            source,
        })
    }

    /// Layers resolved by the convergence loop, top down: the target
    /// formation below its top layer, every intermediate formation, and
    /// the top layer of the source formation.
    pub fn layers(&self, stack: &FormationStack) -> Vec<(FormationId, i32)> {
        let mut layers = Vec::new();
        if self.source == self.target {
            return layers;
        }
        for f in self.target.0..=self.source.0 {
            let id = FormationId(f);
            let Some(depth) = stack.formation(id).map(Formation::depth) else {
                continue;
            };
            let (lowest, highest) = if id == self.target {
                (0, depth - 2)
            } else if id == self.source {
                (depth - 1, depth - 1)
            } else {
                (0, depth - 1)
            };
            layers.extend((lowest..=highest).rev().map(|k| (id, k)));
        }
        layers
    }

    /// Layers that need a flow direction: the resolved layers plus the
    /// top layer of the target formation.
    pub fn flow_layers(&self, stack: &FormationStack) -> Vec<(FormationId, i32)> {
        let mut layers = Vec::new();
        if let Some(f) = stack.formation(self.target) {
            layers.push((self.target, f.top_layer()));
        }
        layers.extend(self.layers(stack));
        layers
    }
}

// ── Reservoirs ─────────────────────────────────────────────────────

/// Flag reservoir rock in every formation from the source up to just
/// below the target. Returns the nodes flagged on this rank.
pub fn flag_reservoirs(
    stack: &mut FormationStack,
    span: &PathSpan,
    config: &MigrationConfig,
) -> usize {
    stack.clear_reservoir_properties();
    (span.target.0 + 1..=span.source.0)
        .rev()
        .map(|f| detect_reservoir(stack, FormationId(f), span.target, config))
        .sum()
}

/// Decide which formations host reservoirs, deepest first.
///
/// Designated reservoirs are identified directly. Other formations
/// between the source and the target, source rocks excepted, host one
/// when crest detection finds a crest on any rank.
pub fn classify_reservoirs(
    stack: &mut FormationStack,
    endpoint: &mut Endpoint,
    span: &PathSpan,
    config: &MigrationConfig,
    metrics: &mut StepMetrics,
) -> Result<Vec<FormationId>, MigrationError> {
    let mut hosting = Vec::new();
    for f in (span.target.0..=span.source.0).rev() {
        let id = FormationId(f);
        let Some((designated, source_rock)) = stack
            .formation(id)
            .map(|f| (f.is_reservoir(), f.is_source_rock()))
        else {
            continue;
        };
        if designated {
            identify_as_reservoir(stack, id);
            hosting.push(id);
            continue;
        }
        if id == span.target || source_rock || !config.detect_reservoirs {
            continue;
        }

        let columns: Vec<(i32, i32)> = stack.rect().columns().collect();
        let mut session = endpoint.begin("detect_crests")?;
        let mut access = NodeAccess::new(stack, &mut session);
        let found = detect_reservoir_crests(&mut access, id, columns)?;
        metrics.cache_hits += access.cache_hits();
        metrics.cache_misses += access.cache_misses();
        drop(access);
        session.finish(&*stack)?;

        let found = endpoint.all_reduce(ReduceOp::Max, f64::from(u8::from(found)), &*stack)?;
        if found > 0.0 {
            mark_hosting(stack, id);
            hosting.push(id);
            tracing::debug!(formation = %stack.formation_name(id), "reservoir detected");
        }
    }
    Ok(hosting)
}

// ── Paths ──────────────────────────────────────────────────────────

/// Compute the flow direction of every owned node the paths cross.
pub fn compute_flow_directions(
    stack: &mut FormationStack,
    span: &PathSpan,
    config: &MigrationConfig,
) {
    for (formation, k) in span.flow_layers(stack) {
        flow::compute_layer(stack, formation, k, config);
    }
}

/// Rank the neighbours of every owned node the paths cross.
///
/// Reservoir nodes are ranked first, in their own session, because the
/// ranking of ordinary nodes looks at where reservoir neighbours point.
pub fn compute_adjacent_nodes(
    stack: &mut FormationStack,
    endpoint: &mut Endpoint,
    span: &PathSpan,
    metrics: &mut StepMetrics,
) -> Result<(), MigrationError> {
    let layers = span.layers(stack);
    for (tag, reservoir_pass) in [("rank_reservoir_nodes", true), ("rank_nodes", false)] {
        stack.invalidate_proxies();
        let keys: Vec<_> = layers
            .iter()
            .filter_map(|&(f, k)| stack.formation(f).map(|f| f.array().layer_keys(k)))
            .flatten()
            .filter(|&key| {
                stack
                    .local(key)
                    .is_some_and(|n| {
                        n.is_valid() && !n.path.end_of_path && n.reservoir.any() == reservoir_pass
                    })
            })
            .collect();
        let mut session = endpoint.begin(tag)?;
        let mut access = NodeAccess::new(stack, &mut session);
        for key in keys {
            rank_node(&mut access, key)?;
        }
        metrics.cache_hits += access.cache_hits();
        metrics.cache_misses += access.cache_misses();
        drop(access);
        session.finish(&*stack)?;
    }
    Ok(())
}

/// Resolve the target of every owned node the paths cross, layer by
/// layer from the top down.
pub fn compute_target_formation_nodes(
    stack: &mut FormationStack,
    endpoint: &mut Endpoint,
    span: &PathSpan,
    config: &MigrationConfig,
    metrics: &mut StepMetrics,
) -> Result<(), MigrationError> {
    stack.invalidate_proxies();
    for (formation, k) in span.layers(stack) {
        resolve_layer(stack, endpoint, formation, k, config, metrics)?;
    }
    Ok(())
}

// ── Transport ──────────────────────────────────────────────────────

/// Move expelled and leaked charge into every hosting reservoir,
/// deepest first.
///
/// Every source rock below a reservoir expels into it; the reservoir
/// below leaks into it. Stuck and eliminated masses are counted once,
/// against the first reservoir above the charge.
pub fn charge_reservoirs(
    stack: &mut FormationStack,
    endpoint: &mut Endpoint,
    reservoirs: &[FormationId],
    fraction: f64,
    metrics: &mut StepMetrics,
) -> Result<(Vec<ReservoirLedger>, TransportReport), MigrationError> {
    let mut reservoirs = reservoirs.to_vec();
    reservoirs.sort_by(|a, b| b.cmp(a));
    let sources: Vec<FormationId> = stack
        .formations()
        .iter()
        .filter(|f| f.is_source_rock())
        .map(Formation::id)
        .collect();
    let first_above = |f: FormationId| reservoirs.iter().copied().filter(|&r| r < f).max();

    stack.invalidate_proxies();
    let mut session = endpoint.begin("transport")?;
    let mut access = NodeAccess::new(stack, &mut session);
    let mut ledgers = Vec::with_capacity(reservoirs.len());
    let mut total = TransportReport::default();
    let mut below: Option<FormationId> = None;
    for &reservoir in &reservoirs {
        let mut ledger = ReservoirLedger::new(reservoir);
        for &source in sources.iter().filter(|&&s| s > reservoir) {
            let report =
                migrate_expelled_charges(&mut access, source, reservoir, fraction, &mut ledger)?;
            total.delivered += report.delivered;
            total.blocked += report.blocked;
            if first_above(source) == Some(reservoir) {
                total.stuck += report.stuck;
                total.eliminated += report.eliminated;
            }
        }
        if let Some(leaking) = below {
            let report = migrate_leaked_charges(&mut access, leaking, reservoir, &mut ledger)?;
            total.add(&report);
        }
        below = Some(reservoir);
        ledgers.push(ledger);
    }
    metrics.cache_hits += access.cache_hits();
    metrics.cache_misses += access.cache_misses();
    drop(access);
    session.finish(&*stack)?;
    Ok((ledgers, total))
}
