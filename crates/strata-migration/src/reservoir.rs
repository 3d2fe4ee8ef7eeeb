//! Reservoir flagging, crest detection and designated reservoirs.
//!
//! A node is reservoir rock for a phase when the seal above it holds a
//! column of that phase at least as tall as the configured minimum.
//! Flagging reads only the node's own column, so it needs no traffic.
//! Crest detection compares each flagged node with its lateral
//! neighbours and needs a session.

use strata_comm::CommError;
use strata_core::{
    is_undefined, FormationId, NodeKey, Phase, PropertyId, GRAVITY, PA_TO_MPA, UNDEFINED,
};
use strata_grid::offsets::LATERAL_OFFSETS;
use strata_grid::FormationStack;

use crate::access::NodeAccess;
use crate::config::MigrationConfig;

/// Water saturation at which the reservoir's capillary pressure is
/// evaluated.
pub const RESERVOIR_WATER_SATURATION: f64 = 0.3;

const IRREDUCIBLE_WATER_SATURATION: f64 = 0.1;

/// Brooks-Corey scaling of the 100 % capillary entry pressure at water
/// saturation `sw` for pore-size exponent `lambda`.
pub fn brooks_corey_correction(sw: f64, lambda: f64) -> f64 {
    let residual = IRREDUCIBLE_WATER_SATURATION;
    let effective = if sw <= residual + 1.0e-4 {
        1.0e-4 / (1.0 - residual)
    } else if sw == 1.0 {
        1.0
    } else {
        (sw - residual) / (1.0 - residual)
    };
    effective.powf(-lambda)
}

/// Top-most owned node with thickness of `formation` in column `(i, j)`.
pub fn valid_reservoir_node(
    stack: &FormationStack,
    formation: FormationId,
    i: i32,
    j: i32,
) -> Option<NodeKey> {
    let depth = stack.formation(formation)?.depth();
    (0..depth)
        .rev()
        .map(|k| NodeKey::new(formation, i, j, k))
        .find(|&key| stack.local(key).is_some_and(|n| n.has_thickness()))
}

/// Lowest owned node with thickness above `formation` in column
/// `(i, j)`, searching no higher than `top_seal`.
pub fn valid_seal_node(
    stack: &FormationStack,
    formation: FormationId,
    i: i32,
    j: i32,
    top_seal: FormationId,
) -> Option<NodeKey> {
    (top_seal.0..formation.0).rev().find_map(|f| {
        let f = FormationId(f);
        let depth = stack.formation(f)?.depth();
        (0..depth)
            .map(|k| NodeKey::new(f, i, j, k))
            .find(|&key| stack.local(key).is_some_and(|n| n.has_thickness()))
    })
}

/// Flag reservoir rock in every owned column of `formation` against the
/// seals above it. Returns the number of flagged nodes.
pub fn detect_reservoir(
    stack: &mut FormationStack,
    formation: FormationId,
    top_seal: FormationId,
    config: &MigrationConfig,
) -> usize {
    let columns: Vec<(i32, i32)> = stack.rect().columns().collect();
    let mut flagged = 0;
    for (i, j) in columns {
        let Some(reservoir) = valid_reservoir_node(stack, formation, i, j) else {
            continue;
        };
        let Some(seal) = valid_seal_node(stack, formation, i, j, top_seal) else {
            continue;
        };
        if detect_node(stack, reservoir, seal, config) {
            flagged += 1;
        }
    }
    flagged
}

fn detect_node(
    stack: &mut FormationStack,
    reservoir: NodeKey,
    seal: NodeKey,
    config: &MigrationConfig,
) -> bool {
    if stack.is_impermeable(reservoir) {
        return false;
    }
    let (Some(res), Some(cap)) = (stack.local(reservoir), stack.local(seal)) else {
        return false;
    };
    if !res.is_valid() || !res.has_thickness() {
        return false;
    }
    let res_props = res.props.clone();
    let seal_props = cap.props.clone();

    let mut state = res.reservoir.clone();
    if stack.is_impermeable(seal) {
        state.set(Phase::Gas, true, 0.0);
        state.set(Phase::Oil, true, 0.0);
    } else {
        let lambda = stack.properties().lambda_pc(reservoir.formation);
        let correction = brooks_corey_correction(RESERVOIR_WATER_SATURATION, lambda);
        let overpressure = if config.pressure_run
            && !is_undefined(seal_props.overpressure)
            && !is_undefined(res_props.overpressure)
        {
            (seal_props.overpressure - res_props.overpressure) / PA_TO_MPA
        } else {
            0.0
        };
        for phase in [Phase::Gas, Phase::Oil] {
            let seal_pc = seal_props.capillary_pressure(phase);
            let res_pc = res_props.capillary_pressure(phase);
            let density = res_props.density(phase);
            if [seal_pc, res_pc, density, res_props.water_density]
                .iter()
                .any(|&v| is_undefined(v))
            {
                state.set(phase, false, UNDEFINED);
                continue;
            }
            let contrast = seal_pc - res_pc * correction + overpressure;
            let buoyancy = res_props.water_density - density;
            if buoyancy <= 0.0 {
                state.set(phase, contrast > 0.0, UNDEFINED);
            } else {
                let height = contrast / (buoyancy * GRAVITY);
                state.set(phase, height > config.min_column_height(phase), height);
            }
        }
    }
    let any = state.any();
    if let Some(node) = stack.local_mut(reservoir) {
        node.reservoir = state;
    }
    any
}

/// `true` if `(depth, i, j)` lies above `other`. Equal depths go to the
/// larger `i + j`, then the larger `i`, then the larger `j`.
pub fn is_shallower(own: (f64, i32, i32), other: (f64, i32, i32)) -> bool {
    if own.0 != other.0 {
        return own.0 < other.0;
    }
    let sum = (own.1 + own.2).cmp(&(other.1 + other.2));
    sum.then(own.1.cmp(&other.1))
        .then(own.2.cmp(&other.2))
        .is_gt()
}

/// Mark crests of the owned flagged nodes of `formation` visited in
/// `columns` order. Returns `true` if any crest was found here.
///
/// A flagged node is a crest for a phase when no valid lateral
/// neighbour with thickness that does not seal the phase lies above
/// it. Gas is swept before oil.
pub fn detect_reservoir_crests(
    access: &mut NodeAccess<'_, '_>,
    formation: FormationId,
    columns: impl IntoIterator<Item = (i32, i32)>,
) -> Result<bool, CommError> {
    let Some(top) = access.stack().formation(formation).map(|f| f.top_layer()) else {
        return Ok(false);
    };
    let columns: Vec<(i32, i32)> = columns.into_iter().collect();
    let mut found = false;
    for phase in [Phase::Gas, Phase::Oil] {
        for &(i, j) in &columns {
            let Some(key) = valid_reservoir_node(access.stack(), formation, i, j) else {
                continue;
            };
            if !access.stack().is_reservoir(key, phase) {
                continue;
            }
            let crest = is_crest(access, key, top, phase)?;
            if let Some(node) = access.stack_mut().local_mut(key) {
                node.reservoir.set_crest(phase, crest);
            }
            found |= crest;
        }
    }
    Ok(found)
}

fn is_crest(
    access: &mut NodeAccess<'_, '_>,
    key: NodeKey,
    top: i32,
    phase: Phase,
) -> Result<bool, CommError> {
    let depth = access.fe_value(key, PropertyId::Depth, (0, 0, -1))?;
    let own = (depth, key.i, key.j);
    for &(di, dj) in &LATERAL_OFFSETS {
        let Some(neighbour) = access
            .stack()
            .normalize(NodeKey::new(key.formation, key.i + di, key.j + dj, top))
        else {
            return Ok(false);
        };
        if !access.is_valid(neighbour)? {
            return Ok(false);
        }
        if access.has_no_thickness(neighbour)? || access.fault(neighbour)?.is_sealing(phase) {
            continue;
        }
        let depth = access.fe_value(neighbour, PropertyId::Depth, (0, 0, -1))?;
        if !is_shallower(own, (depth, neighbour.i, neighbour.j)) {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Treat `formation` as a designated reservoir: flag both phases on the
/// top node with thickness of every owned column, end paths at its top
/// layer and mark it as hosting a reservoir.
pub fn identify_as_reservoir(stack: &mut FormationStack, formation: FormationId) {
    let columns: Vec<(i32, i32)> = stack.rect().columns().collect();
    for (i, j) in columns {
        let Some(key) = valid_reservoir_node(stack, formation, i, j) else {
            continue;
        };
        if let Some(node) = stack.local_mut(key) {
            node.reservoir.gas = true;
            node.reservoir.oil = true;
        }
    }
    mark_hosting(stack, formation);
}

/// End paths at the top layer of `formation` and mark it as hosting a
/// reservoir.
pub fn mark_hosting(stack: &mut FormationStack, formation: FormationId) {
    if let Some(f) = stack.formation_mut(formation) {
        let top = f.top_layer();
        f.set_end_of_path(top);
        f.set_hosts_reservoir(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use proptest::prelude::*;
    use strata_comm::{mesh, CommConfig};
    use strata_core::{FaultStatus, Rank};
    use strata_grid::{FormationSpec, PartitionLayout, PropertyVolume};

    const SEAL: FormationId = FormationId(0);
    const RES: FormationId = FormationId(1);

    /// Seal over a two-layer reservoir on a 4x4 corner grid; the
    /// reservoir top follows `surface`.
    fn stack(seal_pc: f64, surface: impl Fn(i32, i32) -> f64) -> FormationStack {
        let mut v = PropertyVolume::builder(4, 4)
            .formation(1, 1.0)
            .formation(2, 2.0)
            .build()
            .unwrap();
        v.fill(SEAL, PropertyId::Depth, |i, j, l| surface(i, j) - 20.0 * f64::from(l));
        v.fill(RES, PropertyId::Depth, |i, j, l| surface(i, j) + 10.0 * f64::from(2 - l));
        for f in [SEAL, RES] {
            v.fill(f, PropertyId::VerticalPermeability, |_, _, _| 1.0);
            v.fill(f, PropertyId::Porosity, |_, _, _| 0.2);
            v.fill(f, PropertyId::WaterDensity, |_, _, _| 1000.0);
            v.fill(f, PropertyId::OilDensity, |_, _, _| 800.0);
            v.fill(f, PropertyId::GasDensity, |_, _, _| 200.0);
        }
        v.fill(SEAL, PropertyId::CapillaryPressureOil100, |_, _, _| seal_pc);
        v.fill(SEAL, PropertyId::CapillaryPressureGas100, |_, _, _| seal_pc);
        v.fill(RES, PropertyId::CapillaryPressureOil100, |_, _, _| 1000.0);
        v.fill(RES, PropertyId::CapillaryPressureGas100, |_, _, _| 1000.0);
        let layout = PartitionLayout::single(4, 4).unwrap();
        let mut s = FormationStack::builder(layout, Rank(0), Arc::new(v))
            .spacing(100.0, 100.0)
            .formation(FormationSpec::new("seal", 1))
            .formation(FormationSpec::new("reservoir", 2))
            .build()
            .unwrap();
        s.compute_properties();
        s
    }

    fn dome(i: i32, j: i32) -> f64 {
        2000.0 + 5.0 * f64::from((i - 1).pow(2) + (j - 1).pow(2))
    }

    #[test]
    fn brooks_corey_branches() {
        assert_eq!(brooks_corey_correction(1.0, 2.0), 1.0);
        let low = brooks_corey_correction(0.05, 1.0);
        assert!((low - 0.9 / 1.0e-4).abs() < 1e-6);
        let mid = brooks_corey_correction(0.3, 1.0);
        assert!((mid - 4.5).abs() < 1e-12);
    }

    #[test]
    fn reservoir_and_seal_nodes_face_each_other() {
        let s = stack(1.0e6, |_, _| 2000.0);
        assert_eq!(valid_reservoir_node(&s, RES, 1, 1), Some(NodeKey::new(RES, 1, 1, 1)));
        assert_eq!(valid_seal_node(&s, RES, 1, 1, SEAL), Some(NodeKey::new(SEAL, 1, 1, 0)));
        assert_eq!(valid_reservoir_node(&s, RES, 3, 1), None);
    }

    #[test]
    fn strong_seal_flags_the_top_node() {
        // Contrast 1e6 - 1000 * 4.5^2 Pa over 200 kg/m3 of buoyancy.
        let mut s = stack(1.0e6, |_, _| 2000.0);
        let flagged = detect_reservoir(&mut s, RES, SEAL, &MigrationConfig::default());
        assert_eq!(flagged, 9);
        let top = s.local(NodeKey::new(RES, 1, 1, 1)).unwrap();
        assert!(top.reservoir.oil && top.reservoir.gas);
        let expected = (1.0e6 - 1000.0 * 4.5f64.powi(2)) / (200.0 * GRAVITY);
        assert!((top.reservoir.height_oil - expected).abs() < 1e-6);
        assert!(!s.local(NodeKey::new(RES, 1, 1, 0)).unwrap().reservoir.any());
    }

    #[test]
    fn weak_seal_flags_nothing() {
        let mut s = stack(0.0, |_, _| 2000.0);
        assert_eq!(detect_reservoir(&mut s, RES, SEAL, &MigrationConfig::default()), 0);
    }

    #[test]
    fn impermeable_seal_flags_with_zero_height() {
        let mut s = stack(0.0, |_, _| 2000.0);
        for i in 0..3 {
            for j in 0..3 {
                s.local_mut(NodeKey::new(SEAL, i, j, 0))
                    .unwrap()
                    .props
                    .vertical_permeability = 0.0;
            }
        }
        assert_eq!(detect_reservoir(&mut s, RES, SEAL, &MigrationConfig::default()), 9);
        assert_eq!(s.height_of(NodeKey::new(RES, 0, 0, 1), Phase::Gas), 0.0);
    }

    fn crests(s: &mut FormationStack, reverse: bool) -> bool {
        let mut endpoints = mesh(1, CommConfig::default()).unwrap();
        let mut session = endpoints[0].begin("crest").unwrap();
        let mut access = NodeAccess::new(s, &mut session);
        let mut columns: Vec<(i32, i32)> = access.stack().rect().columns().collect();
        if reverse {
            columns.reverse();
        }
        let found = detect_reservoir_crests(&mut access, RES, columns).unwrap();
        drop(access);
        session.finish(&*s).unwrap();
        found
    }

    fn crest_flags(s: &FormationStack) -> Vec<bool> {
        (0..3)
            .flat_map(|i| (0..3).map(move |j| (i, j)))
            .map(|(i, j)| {
                s.local(NodeKey::new(RES, i, j, 1))
                    .is_some_and(|n| n.reservoir.is_crest(Phase::Oil))
            })
            .collect()
    }

    #[test]
    fn dome_has_one_crest_in_any_sweep_order() {
        let mut s = stack(1.0e6, dome);
        detect_reservoir(&mut s, RES, SEAL, &MigrationConfig::default());
        assert!(crests(&mut s, false));
        let forward = crest_flags(&s);
        assert!(crests(&mut s, true));
        assert_eq!(forward, crest_flags(&s));
        assert_eq!(forward.iter().filter(|&&c| c).count(), 1);
    }

    #[test]
    fn sealing_faults_hide_shallower_neighbours() {
        // Dips toward -i, ridge along j = 1.
        let ridge = |i: i32, j: i32| {
            2000.0 + 10.0 * f64::from(i) + 1.25 * f64::from((2 * j - 3).pow(2))
        };
        let mut s = stack(1.0e6, ridge);
        detect_reservoir(&mut s, RES, SEAL, &MigrationConfig::default());
        let key = NodeKey::new(RES, 1, 1, 1);
        crests(&mut s, false);
        assert!(!s.local(key).unwrap().reservoir.is_crest(Phase::Gas));
        for j in 0..3 {
            s.local_mut(NodeKey::new(RES, 0, j, 1)).unwrap().props.fault = FaultStatus::Seal;
        }
        crests(&mut s, false);
        assert!(s.local(key).unwrap().reservoir.is_crest(Phase::Gas));
    }

    #[test]
    fn designated_reservoir_ends_paths() {
        let mut s = stack(0.0, |_, _| 2000.0);
        identify_as_reservoir(&mut s, RES);
        let top = NodeKey::new(RES, 2, 2, 1);
        assert!(s.is_reservoir(top, Phase::Oil));
        assert!(s.is_end_of_path(top));
        assert_eq!(s.target_of(top), Some(top));
        assert!(s.formation(RES).unwrap().hosts_reservoir());
    }

    proptest! {
        #[test]
        fn shallower_is_a_strict_order(
            a in (0.0f64..10.0, 0i32..5, 0i32..5),
            b in (0.0f64..10.0, 0i32..5, 0i32..5),
        ) {
            let a = (a.0.round(), a.1, a.2);
            let b = (b.0.round(), b.1, b.2);
            if a == b {
                prop_assert!(!is_shallower(a, b));
            } else {
                prop_assert!(is_shallower(a, b) != is_shallower(b, a));
            }
        }
    }
}
