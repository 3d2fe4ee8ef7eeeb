//! Target resolution.
//!
//! Each thick node follows its chosen neighbours until it reaches a node
//! whose target is known, then every node on the way takes that target.
//! A chain that leaves the partition waits for the owner to resolve its
//! part; a chain that closes on itself is a cycle and is broken by
//! advancing its smallest node to the next candidate.
//!
//! [`resolve_layer`] repeats the sweep over one layer until every rank
//! reports no unresolved node. A round without progress means the
//! remaining chains form cycles spanning partitions; every rank then
//! walks its unresolved chains through [`AdjacentNode`] queries and
//! repairs the cycles whose smallest key it owns.
//!
//! [`AdjacentNode`]: strata_comm::ValueSpec::AdjacentNode

use indexmap::IndexSet;
use strata_comm::{CommError, Endpoint, ReduceOp};
use strata_core::{FormationId, NodeKey};
use strata_grid::{Formation, FormationStack, Next};

use crate::access::NodeAccess;
use crate::config::{MigrationConfig, StuckPolicy};
use crate::error::MigrationError;
use crate::metrics::StepMetrics;
use crate::ranking::{is_undetected_crest, lateral_ascent};

/// Outcome of following the chain from one node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// Every node on the chain now targets this node.
    Resolved(NodeKey),
    /// The chain waits on another rank or was just repaired.
    Pending,
}

enum Outcome {
    Target(NodeKey),
    Dead,
    Pending,
}

// ── Next node ──────────────────────────────────────────────────────

/// Decide where charge entering the owned thick node at `key` goes.
///
/// Candidates are tried in rank order; invalid neighbours are skipped
/// and a missing one marks the node as leaving the grid. A node left
/// with no candidate is a dead end.
pub fn compute_next(
    access: &mut NodeAccess<'_, '_>,
    key: NodeKey,
    config: &MigrationConfig,
) -> Result<Next, CommError> {
    if !access.stack().is_impermeable(key) {
        loop {
            let Some(direction) = access
                .stack()
                .local(key)
                .and_then(|n| n.path.selected_direction())
            else {
                break;
            };
            let Some(neighbour) = access.stack().neighbour(key, direction) else {
                if let Some(node) = access.stack_mut().local_mut(key) {
                    node.path.out_of_bounds = true;
                }
                break;
            };
            if access.is_valid(neighbour)? {
                return Ok(Next::Via {
                    node: neighbour,
                    fallback: false,
                });
            }
            if let Some(node) = access.stack_mut().local_mut(key) {
                node.path.attempt += 1;
            }
        }
    }
    dead_end(access, key, config)
}

fn dead_end(
    access: &mut NodeAccess<'_, '_>,
    key: NodeKey,
    config: &MigrationConfig,
) -> Result<Next, CommError> {
    let flagged = access.stack().local(key).is_some_and(|n| n.reservoir.any());
    let hosts = access
        .stack()
        .formation(key.formation)
        .is_some_and(Formation::hosts_reservoir);
    if !flagged || hosts {
        return Ok(Next::Terminal { eliminated: false });
    }

    if is_undetected_crest(access, key)? {
        let above = match (config.stuck_policy, access.stack().above(key)) {
            (StuckPolicy::FunnelUp, Some(above))
                if access.is_valid(above)? && !access.is_impermeable(above)? =>
            {
                Some(above)
            }
            _ => None,
        };
        return Ok(match above {
            Some(node) => Next::Via {
                node,
                fallback: true,
            },
            None => Next::Terminal { eliminated: true },
        });
    }

    let ascent = lateral_ascent(access, key)?;
    let next = ascent
        .first()
        .and_then(|c| access.stack().neighbour(key, usize::from(c.direction)));
    Ok(match next {
        Some(node) => Next::Via {
            node,
            fallback: true,
        },
        None => Next::Terminal { eliminated: false },
    })
}

// ── Chains ─────────────────────────────────────────────────────────

/// Follow the chain from the owned node at `start`.
///
/// `repairs` counts cycles closed and repaired on the way.
pub fn resolve(
    access: &mut NodeAccess<'_, '_>,
    start: NodeKey,
    config: &MigrationConfig,
    repairs: &mut u64,
) -> Result<Resolution, CommError> {
    let mut path: IndexSet<NodeKey> = IndexSet::new();
    let mut key = start;
    let outcome = loop {
        if !access.stack().is_local(key) {
            if !access.is_valid(key)? {
                break Outcome::Dead;
            }
            break match access.target(key)? {
                Some(target) => Outcome::Target(target),
                None => Outcome::Pending,
            };
        }
        let Some((valid, thick, target, decided)) = access
            .stack()
            .local(key)
            .map(|n| (n.is_valid(), n.has_thickness(), n.path.target, n.path.next))
        else {
            break Outcome::Dead;
        };
        if !valid {
            break Outcome::Dead;
        }
        if let Some(target) = target {
            break Outcome::Target(target);
        }
        if !thick {
            match access.stack().above(key) {
                Some(above) => {
                    key = above;
                    continue;
                }
                None => break Outcome::Dead,
            }
        }
        if let Some(pos) = path.get_index_of(&key) {
            if let Some(&smallest) = path.iter().skip(pos).min() {
                repair(access.stack_mut(), smallest);
                *repairs += 1;
            }
            break Outcome::Pending;
        }
        let next = match decided {
            Some(next) => next,
            None => {
                let next = compute_next(access, key, config)?;
                if let Some(node) = access.stack_mut().local_mut(key) {
                    node.path.next = Some(next);
                }
                next
            }
        };
        match next {
            Next::Terminal { eliminated } => {
                if let Some(node) = access.stack_mut().local_mut(key) {
                    node.path.eliminated = eliminated;
                    node.path.target = Some(key);
                }
                break Outcome::Target(key);
            }
            Next::Via { node, .. } => {
                path.insert(key);
                key = node;
            }
        }
    };

    let target = match outcome {
        Outcome::Target(target) => target,
        Outcome::Pending => return Ok(Resolution::Pending),
        // The last node on the chain points at nothing usable and keeps
        // its charge.
        Outcome::Dead => match path.last().copied() {
            Some(last) => {
                if let Some(node) = access.stack_mut().local_mut(last) {
                    node.path.next = Some(Next::Terminal { eliminated: false });
                }
                last
            }
            None => return Ok(Resolution::Pending),
        },
    };
    for k in path {
        if let Some(node) = access.stack_mut().local_mut(k) {
            node.path.target = Some(target);
        }
    }
    Ok(Resolution::Resolved(target))
}

/// Break a cycle at the owned node `key`: a fallback step becomes a
/// terminal, otherwise the node moves on to its next-ranked candidate.
pub fn repair(stack: &mut FormationStack, key: NodeKey) {
    let name = stack.formation_name(key.formation).to_owned();
    let Some(node) = stack.local_mut(key) else {
        return;
    };
    match node.path.next {
        Some(Next::Via { fallback: true, .. }) => {
            node.path.next = Some(Next::Terminal { eliminated: false });
        }
        _ => {
            node.path.attempt += 1;
            node.path.next = None;
        }
    }
    node.path.repairs += 1;
    tracing::warn!(
        target: "strata::cycle",
        formation = %name,
        i = key.i,
        j = key.j,
        k = key.k,
        rank = node.path.attempt,
        "flow path cycle, advancing to next candidate"
    );
}

// ── Layers ─────────────────────────────────────────────────────────

fn unresolved(stack: &FormationStack, formation: FormationId, k: i32) -> Vec<NodeKey> {
    let Some(f) = stack.formation(formation) else {
        return Vec::new();
    };
    f.array()
        .layer_keys(k)
        .filter(|&key| {
            stack
                .local(key)
                .is_some_and(|n| n.is_valid() && n.has_thickness() && n.path.target.is_none())
        })
        .collect()
}

/// Resolve every node of layer `k` of `formation` on all ranks.
///
/// Collective: every rank calls it for the same layers in the same
/// order.
pub fn resolve_layer(
    stack: &mut FormationStack,
    endpoint: &mut Endpoint,
    formation: FormationId,
    k: i32,
    config: &MigrationConfig,
    metrics: &mut StepMetrics,
) -> Result<(), MigrationError> {
    let mut previous = f64::INFINITY;
    for round in 1..=config.max_rounds {
        metrics.rounds += 1;
        let mut repairs = 0;
        {
            let mut session = endpoint.begin("resolve_layer")?;
            let mut access = NodeAccess::new(stack, &mut session);
            for key in unresolved(access.stack(), formation, k) {
                resolve(&mut access, key, config, &mut repairs)?;
            }
            metrics.cache_hits += access.cache_hits();
            metrics.cache_misses += access.cache_misses();
            drop(access);
            session.finish(&*stack)?;
        }

        let remaining = unresolved(stack, formation, k).len() as f64;
        let remaining = endpoint.all_reduce(ReduceOp::Sum, remaining, &*stack)?;
        let repaired = endpoint.all_reduce(ReduceOp::Sum, repairs as f64, &*stack)?;
        metrics.cycles_repaired += repaired as u64;
        tracing::debug!(
            formation = %stack.formation_name(formation),
            k,
            round,
            remaining,
            repaired,
            "resolve round"
        );
        if remaining == 0.0 {
            return Ok(());
        }

        if remaining >= previous && repaired == 0.0 {
            metrics.stalled_rounds += 1;
            let cycles = walk_cycles(stack, endpoint, formation, k, metrics)?;
            for &key in &cycles {
                repair(stack, key);
            }
            let found = endpoint.all_reduce(ReduceOp::Sum, cycles.len() as f64, &*stack)?;
            metrics.cycles_repaired += found as u64;
            if found == 0.0 {
                return Err(MigrationError::NoConvergence {
                    formation,
                    k,
                    rounds: round,
                    unresolved: remaining as u64,
                });
            }
        }
        previous = remaining;
    }
    let remaining = unresolved(stack, formation, k).len() as f64;
    let remaining = endpoint.all_reduce(ReduceOp::Sum, remaining, &*stack)?;
    Err(MigrationError::NoConvergence {
        formation,
        k,
        rounds: config.max_rounds,
        unresolved: remaining as u64,
    })
}

/// Owned unresolved nodes of the layer that are the smallest key of the
/// cycle their chain closes.
fn walk_cycles(
    stack: &mut FormationStack,
    endpoint: &mut Endpoint,
    formation: FormationId,
    k: i32,
    metrics: &mut StepMetrics,
) -> Result<Vec<NodeKey>, MigrationError> {
    let (ni, nj) = stack.layout().grid_size();
    let limit = (ni.max(1) as usize) * (nj.max(1) as usize) + 1;
    let mut pending = unresolved(stack, formation, k);
    pending.sort();

    let mut session = endpoint.begin("cycle_walk")?;
    let mut access = NodeAccess::new(stack, &mut session);
    let mut cycles = Vec::new();
    for start in pending {
        let mut seen: IndexSet<NodeKey> = IndexSet::new();
        seen.insert(start);
        let mut key = start;
        for _ in 0..limit {
            let Some(next) = access.adjacent(key)? else {
                break;
            };
            let Some(next) = thick(&mut access, next)? else {
                break;
            };
            if access.target(next)?.is_some() {
                break;
            }
            if next == start {
                if seen.iter().min() == Some(&start) {
                    cycles.push(start);
                }
                break;
            }
            if !seen.insert(next) {
                break;
            }
            key = next;
        }
    }
    metrics.cache_hits += access.cache_hits();
    metrics.cache_misses += access.cache_misses();
    drop(access);
    session.finish(&*stack)?;
    Ok(cycles)
}

/// The first node with thickness at or above `key`.
fn thick(access: &mut NodeAccess<'_, '_>, key: NodeKey) -> Result<Option<NodeKey>, CommError> {
    let mut key = key;
    loop {
        if !access.is_valid(key)? {
            return Ok(None);
        }
        if !access.has_no_thickness(key)? {
            return Ok(Some(key));
        }
        match access.stack().above(key) {
            Some(above) => key = above,
            None => return Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use strata_comm::{mesh, CommConfig};
    use strata_core::{PropertyId, Rank};
    use strata_grid::{Candidate, FormationSpec, PartitionLayout, PropertyVolume};

    const F: FormationId = FormationId(0);

    /// Flat 4x4 corner grid, two layers, top layer end of path.
    fn stack() -> FormationStack {
        let mut v = PropertyVolume::builder(4, 4).formation(2, 1.0).build().unwrap();
        v.fill(F, PropertyId::Depth, |_, _, l| 1000.0 + 10.0 * f64::from(2 - l));
        v.fill(F, PropertyId::VerticalPermeability, |_, _, _| 1.0);
        v.fill(F, PropertyId::Porosity, |_, _, _| 0.2);
        let layout = PartitionLayout::single(4, 4).unwrap();
        let mut s = FormationStack::builder(layout, Rank(0), Arc::new(v))
            .formation(FormationSpec::new("carrier", 2))
            .build()
            .unwrap();
        s.compute_properties();
        s.formation_mut(F).unwrap().set_end_of_path(1);
        s
    }

    fn rank(s: &mut FormationStack, key: NodeKey, directions: &[u8]) {
        let node = s.local_mut(key).unwrap();
        node.path.ranking = directions
            .iter()
            .map(|&direction| Candidate {
                direction,
                score: 1.0,
            })
            .collect();
    }

    #[test]
    fn chain_reaches_the_top_layer() {
        let mut s = stack();
        let key = NodeKey::new(F, 1, 1, 0);
        rank(&mut s, key, &[0]);
        let mut endpoints = mesh(1, CommConfig::default()).unwrap();
        let mut session = endpoints[0].begin("t").unwrap();
        let mut access = NodeAccess::new(&mut s, &mut session);
        let mut repairs = 0;
        let r = resolve(&mut access, key, &MigrationConfig::default(), &mut repairs).unwrap();
        drop(access);
        session.finish(&s).unwrap();
        assert_eq!(r, Resolution::Resolved(NodeKey::new(F, 1, 1, 1)));
        assert_eq!(repairs, 0);
        assert_eq!(s.target_of(key), Some(NodeKey::new(F, 1, 1, 1)));
    }

    #[test]
    fn missing_neighbour_is_a_terminal_out_of_bounds() {
        let mut s = stack();
        let key = NodeKey::new(F, 0, 0, 0);
        // West of column 0 is off the grid.
        rank(&mut s, key, &[9]);
        let mut endpoints = mesh(1, CommConfig::default()).unwrap();
        let mut session = endpoints[0].begin("t").unwrap();
        let mut access = NodeAccess::new(&mut s, &mut session);
        let mut repairs = 0;
        let r = resolve(&mut access, key, &MigrationConfig::default(), &mut repairs).unwrap();
        drop(access);
        session.finish(&s).unwrap();
        assert_eq!(r, Resolution::Resolved(key));
        assert!(s.goes_out_of_bounds(key));
        assert!(!s.is_eliminated(key));
    }

    #[test]
    fn invalid_candidates_are_skipped() {
        let mut s = stack();
        let key = NodeKey::new(F, 2, 1, 0);
        // East column 3 has no corners beyond the grid; then go up.
        rank(&mut s, key, &[10, 0]);
        let mut endpoints = mesh(1, CommConfig::default()).unwrap();
        let mut session = endpoints[0].begin("t").unwrap();
        let mut access = NodeAccess::new(&mut s, &mut session);
        let next = compute_next(&mut access, key, &MigrationConfig::default()).unwrap();
        drop(access);
        session.finish(&s).unwrap();
        assert_eq!(
            next,
            Next::Via {
                node: NodeKey::new(F, 2, 1, 1),
                fallback: false
            }
        );
        assert_eq!(s.local(key).unwrap().path.attempt, 1);
    }

    #[test]
    fn two_node_cycle_repairs_the_smaller_key() {
        let mut s = stack();
        let a = NodeKey::new(F, 1, 1, 0);
        let b = NodeKey::new(F, 2, 1, 0);
        rank(&mut s, a, &[10, 0]);
        rank(&mut s, b, &[9, 0]);
        let mut endpoints = mesh(1, CommConfig::default()).unwrap();
        let mut session = endpoints[0].begin("t").unwrap();
        let mut access = NodeAccess::new(&mut s, &mut session);
        let mut repairs = 0;
        let config = MigrationConfig::default();
        let first = resolve(&mut access, b, &config, &mut repairs).unwrap();
        assert_eq!(first, Resolution::Pending);
        assert_eq!(repairs, 1);
        let second = resolve(&mut access, b, &config, &mut repairs).unwrap();
        drop(access);
        session.finish(&s).unwrap();
        let top_a = NodeKey::new(F, 1, 1, 1);
        assert_eq!(second, Resolution::Resolved(top_a));
        assert_eq!(s.local(a).unwrap().path.repairs, 1);
        assert_eq!(s.local(b).unwrap().path.repairs, 0);
        assert_eq!(s.target_of(a), Some(top_a));
    }

    #[test]
    fn resolve_layer_converges_with_a_cycle() {
        let mut s = stack();
        let mut endpoints = mesh(1, CommConfig::default()).unwrap();
        for i in 0..3 {
            for j in 0..3 {
                rank(&mut s, NodeKey::new(F, i, j, 0), &[0]);
            }
        }
        rank(&mut s, NodeKey::new(F, 1, 1, 0), &[10, 0]);
        rank(&mut s, NodeKey::new(F, 2, 1, 0), &[9, 0]);
        let mut metrics = StepMetrics::default();
        resolve_layer(
            &mut s,
            &mut endpoints[0],
            F,
            0,
            &MigrationConfig::default(),
            &mut metrics,
        )
        .unwrap();
        assert_eq!(metrics.cycles_repaired, 1);
        // The repaired node goes up; its lateral partner still drains into it.
        assert_eq!(
            s.target_of(NodeKey::new(F, 2, 1, 0)),
            Some(NodeKey::new(F, 1, 1, 1))
        );
        for i in 0..3 {
            for j in 0..3 {
                if (i, j) == (2, 1) {
                    continue;
                }
                let key = NodeKey::new(F, i, j, 0);
                assert_eq!(s.target_of(key), Some(NodeKey::new(F, i, j, 1)));
            }
        }
    }

    #[test]
    fn fallback_cycles_end_in_a_terminal() {
        let mut s = stack();
        let key = NodeKey::new(F, 1, 1, 0);
        s.local_mut(key).unwrap().path.next = Some(Next::Via {
            node: NodeKey::new(F, 2, 1, 0),
            fallback: true,
        });
        repair(&mut s, key);
        assert_eq!(
            s.local(key).unwrap().path.next,
            Some(Next::Terminal { eliminated: false })
        );
        assert_eq!(s.local(key).unwrap().path.attempt, 0);
    }

    #[test]
    fn undetected_crest_follows_the_stuck_policy() {
        let key = NodeKey::new(F, 1, 1, 0);
        // Flagged, not hosting, no ranked candidate and level with every
        // lateral neighbour.
        let run = |policy: StuckPolicy| {
            let mut s = stack();
            s.local_mut(key).unwrap().reservoir.oil = true;
            let config = MigrationConfig {
                stuck_policy: policy,
                ..MigrationConfig::default()
            };
            let mut endpoints = mesh(1, CommConfig::default()).unwrap();
            let mut session = endpoints[0].begin("t").unwrap();
            let mut access = NodeAccess::new(&mut s, &mut session);
            let mut repairs = 0;
            let r = resolve(&mut access, key, &config, &mut repairs).unwrap();
            drop(access);
            session.finish(&s).unwrap();
            (r, s.local(key).unwrap().path.next, s.is_eliminated(key))
        };

        let (r, next, eliminated) = run(StuckPolicy::Eliminate);
        assert_eq!(r, Resolution::Resolved(key));
        assert_eq!(next, Some(Next::Terminal { eliminated: true }));
        assert!(eliminated);

        let above = NodeKey::new(F, 1, 1, 1);
        let (r, next, eliminated) = run(StuckPolicy::FunnelUp);
        assert_eq!(r, Resolution::Resolved(above));
        assert_eq!(
            next,
            Some(Next::Via {
                node: above,
                fallback: true
            })
        );
        assert!(!eliminated);
    }
}
