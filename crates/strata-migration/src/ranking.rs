//! Neighbour ranking.
//!
//! Every thick node orders its 17 upward and lateral neighbours by
//! preference. Ordinary nodes score each neighbour by the cosine between
//! a compound flow direction and the step toward it. Nodes flagged as
//! reservoir rock instead climb laterally, steepest ascent first, so
//! charge in an undetected trap walks toward its crest.
//!
//! Both orderings drop neighbours deeper than the node itself: a path
//! can only stay level or rise, which keeps cycles to level ground.

use smallvec::SmallVec;
use strata_comm::CommError;
use strata_core::{is_undefined, FaultStatus, NodeKey, Phase, PropertyId, Vec3};
use strata_grid::element::offset_point;
use strata_grid::offsets::{
    lateral_distance, lateral_to_neighbour, LATERAL_OFFSETS, NEIGHBOUR_OFFSETS,
};
use strata_grid::Candidate;

use crate::access::NodeAccess;

/// Neighbours in preference order.
pub type Ranking = SmallVec<[Candidate; 17]>;

const PHASES: [Phase; 2] = [Phase::Gas, Phase::Oil];

/// Lateral neighbours strictly shallower than the owned node at `key`,
/// steepest first.
///
/// Neighbours that are invalid, impermeable, without thickness or behind
/// a fault sealing one of the node's reservoir phases are skipped. Equal
/// slopes prefer the neighbour whose own next neighbour in the same
/// direction is deepest, then the lower direction index.
pub fn lateral_ascent(access: &mut NodeAccess<'_, '_>, key: NodeKey) -> Result<Ranking, CommError> {
    let Some(node) = access.stack().local(key) else {
        return Ok(Ranking::new());
    };
    let own = node.props.depth;
    let reservoir = node.reservoir.clone();
    let (dx, dy) = access.stack().spacing();

    let mut scored: SmallVec<[(Candidate, f64); 8]> = SmallVec::new();
    for (lateral, &(di, dj)) in LATERAL_OFFSETS.iter().enumerate() {
        let direction = lateral_to_neighbour(lateral);
        let Some(neighbour) = access.stack().neighbour(key, direction) else {
            continue;
        };
        if !access.is_valid(neighbour)?
            || access.is_impermeable(neighbour)?
            || access.has_no_thickness(neighbour)?
        {
            continue;
        }
        let fault = access.fault(neighbour)?;
        if PHASES
            .iter()
            .any(|&p| reservoir.is_reservoir(p) && fault.is_sealing(p))
        {
            continue;
        }
        let depth = access.depth(neighbour)?;
        if is_undefined(depth) || depth >= own {
            continue;
        }
        let further = match access.stack().neighbour(neighbour, direction) {
            Some(next) => access.depth(next)?,
            None => f64::NEG_INFINITY,
        };
        let further = if is_undefined(further) {
            f64::NEG_INFINITY
        } else {
            further
        };
        let slope = (own - depth) / lateral_distance(di, dj, dx, dy);
        scored.push((
            Candidate {
                direction: direction as u8,
                score: slope,
            },
            further,
        ));
    }
    scored.sort_by(|a, b| {
        b.0.score
            .total_cmp(&a.0.score)
            .then_with(|| b.1.total_cmp(&a.1))
    });
    Ok(scored.into_iter().map(|(c, _)| c).collect())
}

/// All 17 neighbours of the owned node at `key`, best aligned with the
/// flow first.
///
/// A valid neighbour contributes the average of both nodes' flow
/// directions weighted by the diagonal each covers; an invalid or
/// missing neighbour is scored against the node's own flow direction
/// with the step shortened to the shared face.
pub fn cosine_ranking(access: &mut NodeAccess<'_, '_>, key: NodeKey) -> Result<Ranking, CommError> {
    let Some(node) = access.stack().local(key) else {
        return Ok(Ranking::new());
    };
    let own_depth = node.props.depth;
    let own_flow = node.path.flow_direction;
    let (dx, dy) = access.stack().spacing();

    let mut ranking = Ranking::new();
    for (direction, &(di, dj, dk)) in NEIGHBOUR_OFFSETS.iter().enumerate() {
        let neighbour = access.stack().neighbour(key, direction);
        if let Some(n) = neighbour {
            if access.is_impermeable(n)? {
                continue;
            }
        }
        let valid = match neighbour {
            Some(n) => access.is_valid(n)?,
            None => false,
        };
        let face = offset_point(di, dj, -dk);
        let mut step = Vec3::new(f64::from(di) * dx, f64::from(dj) * dy, 0.0);
        let neighbour_depth = match neighbour {
            Some(n) if valid => access.depth(n)?,
            _ => {
                step = Vec3::new(step[0] / 2.0, step[1] / 2.0, 0.0);
                access.stack().fe_value(key, PropertyId::Depth, face)
            }
        };
        if is_undefined(neighbour_depth) || neighbour_depth > own_depth {
            continue;
        }

        let compound = match neighbour {
            Some(n) if valid => {
                let reservoir =
                    access.is_reservoir(n, Phase::Gas)? || access.is_reservoir(n, Phase::Oil)?;
                if reservoir && access.adjacent(n)? == Some(key) {
                    continue;
                }
                let entry = access
                    .stack()
                    .fe_value(key, PropertyId::Depth, offset_point(-di, -dj, dk));
                let exit = access.stack().fe_value(key, PropertyId::Depth, face);
                let beyond = access.fe_value(n, PropertyId::Depth, (di, dj, -dk))?;
                if is_undefined(beyond) {
                    continue;
                }
                let lateral = f64::from(di.abs()) * dx * dx + f64::from(dj.abs()) * dy * dy;
                let diagonal = (lateral + (exit - entry).powi(2)).sqrt();
                let neighbour_diagonal = (lateral + (beyond - exit).powi(2)).sqrt();
                let neighbour_flow = access.flow_direction(n)?;
                let neighbour_flow = if neighbour_flow.is_undefined() {
                    own_flow
                } else {
                    neighbour_flow
                };
                (own_flow * diagonal + neighbour_flow * neighbour_diagonal).normalized()
            }
            _ => own_flow,
        };

        step = Vec3::new(step[0], step[1], neighbour_depth - own_depth);
        ranking.push(Candidate {
            direction: direction as u8,
            score: compound.dot(step.normalized()),
        });
    }
    ranking.sort_by(|a, b| b.score.total_cmp(&a.score));
    Ok(ranking)
}

/// Rank the owned node at `key` and reset its attempt to the first
/// candidate.
///
/// Zero-thickness nodes and wasting faults always point straight up.
pub fn rank_node(access: &mut NodeAccess<'_, '_>, key: NodeKey) -> Result<(), CommError> {
    let Some(node) = access.stack().local(key) else {
        return Ok(());
    };
    if !node.is_valid() {
        return Ok(());
    }
    let straight_up = !node.has_thickness() || node.props.fault == FaultStatus::Waste;
    let reservoir = node.reservoir.any();
    let ranking = if straight_up {
        let mut up = Ranking::new();
        up.push(Candidate {
            direction: 0,
            score: 1.0,
        });
        up
    } else if reservoir {
        lateral_ascent(access, key)?
    } else {
        cosine_ranking(access, key)?
    };
    if let Some(node) = access.stack_mut().local_mut(key) {
        node.path.ranking = ranking;
        node.path.attempt = 0;
    }
    Ok(())
}

/// `true` if no valid, permeable lateral neighbour of the owned node at
/// `key` is strictly shallower: charge flagged as reservoir has reached
/// the top of a trap nobody detected. The node above is left to the
/// stuck policy.
pub fn is_undetected_crest(access: &mut NodeAccess<'_, '_>, key: NodeKey) -> Result<bool, CommError> {
    let Some(node) = access.stack().local(key) else {
        return Ok(false);
    };
    let own = node.props.depth;
    for lateral in 0..LATERAL_OFFSETS.len() {
        let Some(neighbour) = access.stack().neighbour(key, lateral_to_neighbour(lateral)) else {
            continue;
        };
        if !access.is_valid(neighbour)? || access.is_impermeable(neighbour)? {
            continue;
        }
        let depth = access.depth(neighbour)?;
        if !is_undefined(depth) && depth < own {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use strata_comm::{mesh, CommConfig};
    use strata_core::{FormationId, Rank};
    use strata_grid::{FormationSpec, FormationStack, PartitionLayout, PropertyVolume};

    const F: FormationId = FormationId(0);

    /// 4x4 corner grid, three layers of 10 m, surface from `surface`.
    fn stack(surface: impl Fn(i32, i32) -> f64) -> FormationStack {
        let mut v = PropertyVolume::builder(4, 4).formation(3, 1.0).build().unwrap();
        v.fill(F, PropertyId::Depth, |i, j, l| surface(i, j) + 10.0 * f64::from(3 - l));
        v.fill(F, PropertyId::VerticalPermeability, |_, _, _| 1.0);
        v.fill(F, PropertyId::HorizontalPermeability, |_, _, _| 1.0);
        v.fill(F, PropertyId::Porosity, |_, _, _| 0.2);
        let layout = PartitionLayout::single(4, 4).unwrap();
        let mut s = FormationStack::builder(layout, Rank(0), Arc::new(v))
            .spacing(100.0, 100.0)
            .formation(FormationSpec::new("carrier", 3))
            .build()
            .unwrap();
        s.compute_properties();
        for k in 0..3 {
            crate::flow::compute_layer(&mut s, F, k, &crate::MigrationConfig::default());
        }
        s
    }

    fn with_access<R>(s: &mut FormationStack, f: impl FnOnce(&mut NodeAccess<'_, '_>) -> R) -> R {
        let mut endpoints = mesh(1, CommConfig::default()).unwrap();
        let mut session = endpoints[0].begin("test").unwrap();
        let mut access = NodeAccess::new(s, &mut session);
        let r = f(&mut access);
        drop(access);
        session.finish(&*s).unwrap();
        r
    }

    #[test]
    fn flat_grid_prefers_straight_up() {
        let mut s = stack(|_, _| 1000.0);
        let key = NodeKey::new(F, 1, 1, 0);
        let ranking = with_access(&mut s, |a| cosine_ranking(a, key).unwrap());
        assert_eq!(ranking[0].direction, 0);
        assert!((ranking[0].score - 1.0).abs() < 1e-9);
        assert!(ranking.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn tilted_grid_prefers_up_dip() {
        // Shallower toward -i.
        let mut s = stack(|i, _| 1000.0 + 20.0 * f64::from(i));
        let key = NodeKey::new(F, 1, 1, 0);
        let ranking = with_access(&mut s, |a| cosine_ranking(a, key).unwrap());
        let (di, _, dk) = NEIGHBOUR_OFFSETS[usize::from(ranking[0].direction)];
        assert_eq!(dk, 1);
        assert!(di <= 0);
        // Down-dip lateral neighbour is deeper and dropped.
        assert!(ranking.iter().all(|c| c.direction != 10));
    }

    #[test]
    fn impermeable_neighbours_are_never_ranked() {
        let mut s = stack(|_, _| 1000.0);
        s.local_mut(NodeKey::new(F, 1, 1, 1))
            .unwrap()
            .props
            .vertical_permeability = 0.0;
        let key = NodeKey::new(F, 1, 1, 0);
        let ranking = with_access(&mut s, |a| cosine_ranking(a, key).unwrap());
        assert!(ranking.iter().all(|c| c.direction != 0));
        assert!(!ranking.is_empty());
    }

    #[test]
    fn wasting_fault_points_up() {
        let mut s = stack(|_, _| 1000.0);
        let key = NodeKey::new(F, 1, 1, 0);
        s.local_mut(key).unwrap().props.fault = FaultStatus::Waste;
        with_access(&mut s, |a| rank_node(a, key).unwrap());
        let path = &s.local(key).unwrap().path;
        assert_eq!(path.ranking.len(), 1);
        assert_eq!(path.selected_direction(), Some(0));
    }

    #[test]
    fn reservoir_nodes_climb_steepest_first() {
        // Dome centred on column (1, 1) of the node grid.
        let mut s = stack(|i, j| 1000.0 + 5.0 * f64::from((i - 1).pow(2) + (j - 1).pow(2)));
        let key = NodeKey::new(F, 2, 1, 2);
        s.local_mut(key).unwrap().reservoir.oil = true;
        let ranking = with_access(&mut s, |a| lateral_ascent(a, key).unwrap());
        assert!(!ranking.is_empty());
        assert_eq!(ranking[0].direction as usize, lateral_to_neighbour(0));
        assert!(ranking.iter().all(|c| c.score > 0.0));
    }

    #[test]
    fn sealing_faults_stop_the_ascent() {
        let mut s = stack(|i, _| 1000.0 + 20.0 * f64::from(i));
        let key = NodeKey::new(F, 1, 1, 2);
        s.local_mut(key).unwrap().reservoir.oil = true;
        s.local_mut(NodeKey::new(F, 0, 1, 2)).unwrap().props.fault = FaultStatus::SealOil;
        let ranking = with_access(&mut s, |a| lateral_ascent(a, key).unwrap());
        assert!(ranking.iter().all(|c| c.direction != 9));
    }

    #[test]
    fn crest_has_no_shallower_neighbour() {
        let mut s = stack(|i, j| 1000.0 + 5.0 * f64::from((i - 1).pow(2) + (j - 1).pow(2)));
        let top = NodeKey::new(F, 0, 0, 2);
        let buried = NodeKey::new(F, 1, 1, 1);
        let flank = NodeKey::new(F, 2, 2, 2);
        let (crest, under, side) = with_access(&mut s, |a| {
            (
                is_undetected_crest(a, top).unwrap(),
                is_undetected_crest(a, buried).unwrap(),
                is_undetected_crest(a, flank).unwrap(),
            )
        });
        assert!(crest);
        // Shallower only straight up: still a crest, the node above is the
        // stuck policy's business.
        assert!(under);
        assert!(!side);
    }
}
