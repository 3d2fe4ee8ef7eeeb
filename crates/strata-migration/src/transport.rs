//! Moving charge along resolved paths into reservoirs.
//!
//! Charge waits at the top layer of its formation. Expelled charge of a
//! source rock and leaked charge of a deeper reservoir each start
//! at the node they enter, follow that node's target, and land in a
//! column of the destination reservoir. Charge whose target lies deeper
//! than the destination is stuck; charge reaching an elimination
//! terminal is discarded. Both are reported, never silently dropped.

use indexmap::IndexMap;
use strata_comm::CommError;
use strata_core::{Composition, FormationId, NodeKey, PropertyId};
use strata_grid::FormationStack;

use crate::access::NodeAccess;

// ── ChargeMap ──────────────────────────────────────────────────────

/// Charge per column at the top layer of each formation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChargeMap {
    formations: IndexMap<FormationId, IndexMap<(i32, i32), Composition>>,
}

impl ChargeMap {
    /// An empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `composition` to column `(i, j)` of `formation`.
    pub fn insert(&mut self, formation: FormationId, i: i32, j: i32, composition: &Composition) {
        self.formations
            .entry(formation)
            .or_default()
            .entry((i, j))
            .or_default()
            .merge(composition);
    }

    /// Charge of column `(i, j)` of `formation`.
    pub fn get(&self, formation: FormationId, i: i32, j: i32) -> Option<&Composition> {
        self.formations.get(&formation)?.get(&(i, j))
    }

    /// Formations holding charge.
    pub fn formations(&self) -> impl Iterator<Item = FormationId> + '_ {
        self.formations.keys().copied()
    }

    /// Mass of every charge in `formation`.
    pub fn formation_total(&self, formation: FormationId) -> f64 {
        self.formations
            .get(&formation)
            .map_or(0.0, |columns| columns.values().map(Composition::total).sum())
    }

    /// Mass of every charge.
    pub fn total(&self) -> f64 {
        self.formations().map(|f| self.formation_total(f)).sum()
    }

    /// `true` if no charge was inserted.
    pub fn is_empty(&self) -> bool {
        self.formations.is_empty()
    }
}

impl FromIterator<(FormationId, i32, i32, Composition)> for ChargeMap {
    fn from_iter<T: IntoIterator<Item = (FormationId, i32, i32, Composition)>>(iter: T) -> Self {
        let mut map = Self::new();
        for (formation, i, j, composition) in iter {
            map.insert(formation, i, j, &composition);
        }
        map
    }
}

/// Place the charges of `charges` on the owned top-layer nodes of every
/// formation, clearing any previous charge there.
pub fn load_charges(stack: &mut FormationStack, charges: &ChargeMap) {
    let layers: Vec<(FormationId, i32)> = stack
        .formations()
        .iter()
        .map(|f| (f.id(), f.top_layer()))
        .collect();
    for (formation, top) in layers {
        let keys: Vec<NodeKey> = match stack.formation(formation) {
            Some(f) => f.array().layer_keys(top).collect(),
            None => continue,
        };
        for key in keys {
            let charge = charges
                .get(formation, key.i, key.j)
                .cloned()
                .unwrap_or_default();
            if let Some(node) = stack.local_mut(key) {
                node.composition = charge;
            }
        }
    }
}

// ── ReservoirLedger ────────────────────────────────────────────────

/// Charge delivered to one reservoir formation, per column.
#[derive(Clone, Debug, PartialEq)]
pub struct ReservoirLedger {
    formation: FormationId,
    columns: IndexMap<(i32, i32), Composition>,
    blocked: Composition,
}

impl ReservoirLedger {
    /// An empty ledger for `formation`.
    pub fn new(formation: FormationId) -> Self {
        Self {
            formation,
            columns: IndexMap::new(),
            blocked: Composition::new(),
        }
    }

    /// The reservoir formation.
    pub fn formation(&self) -> FormationId {
        self.formation
    }

    /// Delivered charge per column.
    pub fn columns(&self) -> impl Iterator<Item = ((i32, i32), &Composition)> + '_ {
        self.columns.iter().map(|(&c, comp)| (c, comp))
    }

    /// Charge delivered to column `(i, j)`.
    pub fn column(&self, i: i32, j: i32) -> Option<&Composition> {
        self.columns.get(&(i, j))
    }

    /// Charge that reached the reservoir but found no open column.
    pub fn blocked(&self) -> &Composition {
        &self.blocked
    }

    /// Mass delivered to columns.
    pub fn delivered(&self) -> f64 {
        self.columns.values().map(Composition::total).sum()
    }

    /// Add charge to column `(i, j)`.
    pub fn add_column(&mut self, i: i32, j: i32, composition: &Composition) {
        self.columns.entry((i, j)).or_default().merge(composition);
    }

    /// Add blocked charge.
    pub fn add_blocked(&mut self, composition: &Composition) {
        self.blocked.merge(composition);
    }

    /// Fold another rank's ledger of the same formation into this one.
    /// Columns end up in `(i, j)` order.
    pub fn merge(&mut self, other: &ReservoirLedger) {
        for (&(i, j), composition) in &other.columns {
            self.add_column(i, j, composition);
        }
        self.blocked.merge(&other.blocked);
        self.columns.sort_keys();
    }
}

// ── TransportReport ────────────────────────────────────────────────

/// Masses moved by one transport call.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TransportReport {
    /// Delivered to reservoir columns.
    pub delivered: f64,
    /// Reached the reservoir with no open column.
    pub blocked: f64,
    /// Ended below the reservoir.
    pub stuck: f64,
    /// Discarded at elimination terminals.
    pub eliminated: f64,
}

impl TransportReport {
    /// Add another report's masses.
    pub fn add(&mut self, other: &TransportReport) {
        self.delivered += other.delivered;
        self.blocked += other.blocked;
        self.stuck += other.stuck;
        self.eliminated += other.eliminated;
    }
}

// ── Migration ──────────────────────────────────────────────────────

/// Move `fraction` of the charge at the top layer of `source` into the
/// reservoir `destination`.
///
/// Each charge enters at the node above when that node is valid and
/// permeable, else at its own node.
pub fn migrate_expelled_charges(
    access: &mut NodeAccess<'_, '_>,
    source: FormationId,
    destination: FormationId,
    fraction: f64,
    ledger: &mut ReservoirLedger,
) -> Result<TransportReport, CommError> {
    let mut report = TransportReport::default();
    for key in top_layer_keys(access.stack(), source) {
        let Some(node) = access.stack().local(key) else {
            continue;
        };
        if !node.is_valid() || node.composition.is_empty() {
            continue;
        }
        let composition = node.composition.scaled(fraction);
        let entry = match access.stack().above(key) {
            Some(above)
                if access.stack().is_valid(above) && !access.stack().is_impermeable(above) =>
            {
                above
            }
            _ => key,
        };
        deliver(access, entry, &composition, destination, ledger, &mut report)?;
    }
    Ok(report)
}

/// Move the charge at the top layer of the reservoir `leaking` into the
/// reservoir `destination`, entering at the node above each leaking
/// node. Columns on the grid boundary do not leak.
pub fn migrate_leaked_charges(
    access: &mut NodeAccess<'_, '_>,
    leaking: FormationId,
    destination: FormationId,
    ledger: &mut ReservoirLedger,
) -> Result<TransportReport, CommError> {
    let (ni, nj) = access.stack().layout().grid_size();
    let mut report = TransportReport::default();
    for key in top_layer_keys(access.stack(), leaking) {
        if key.i == 0 || key.j == 0 || key.i >= ni - 2 || key.j >= nj - 2 {
            continue;
        }
        let Some(node) = access.stack().local(key) else {
            continue;
        };
        if !node.is_valid() || node.composition.is_empty() {
            continue;
        }
        let composition = node.composition.clone();
        let Some(entry) = access.stack().above(key).filter(|&a| access.stack().is_valid(a))
        else {
            continue;
        };
        deliver(access, entry, &composition, destination, ledger, &mut report)?;
    }
    Ok(report)
}

fn top_layer_keys(stack: &FormationStack, formation: FormationId) -> Vec<NodeKey> {
    match stack.formation(formation) {
        Some(f) => f.array().layer_keys(f.top_layer()).collect(),
        None => Vec::new(),
    }
}

fn deliver(
    access: &mut NodeAccess<'_, '_>,
    entry: NodeKey,
    composition: &Composition,
    destination: FormationId,
    ledger: &mut ReservoirLedger,
    report: &mut TransportReport,
) -> Result<(), CommError> {
    let Some(target) = access.stack().target_of(entry) else {
        return Ok(());
    };
    let mass = composition.total();
    if target.formation == destination
        && access.is_end_of_path(target)?
        && !access.goes_out_of_bounds(target)?
    {
        match open_column(access, destination, target)? {
            Some((i, j)) => {
                ledger.add_column(i, j, composition);
                report.delivered += mass;
            }
            None => {
                ledger.add_blocked(composition);
                report.blocked += mass;
            }
        }
    } else if access.is_eliminated(target)? {
        report.eliminated += mass;
    } else if target.formation > destination && access.is_valid(target)? {
        report.stuck += mass;
    }
    Ok(())
}

struct ColumnState {
    sealing: bool,
    top_depth: f64,
}

fn column_state(
    access: &mut NodeAccess<'_, '_>,
    formation: FormationId,
    i: i32,
    j: i32,
) -> Result<Option<ColumnState>, CommError> {
    let Some(top) = access.stack().formation(formation).map(|f| f.top_layer()) else {
        return Ok(None);
    };
    let Some(key) = access.stack().normalize(NodeKey::new(formation, i, j, top)) else {
        return Ok(None);
    };
    if !access.is_valid(key)? {
        return Ok(None);
    }
    Ok(Some(ColumnState {
        sealing: access.fault(key)?.blocks_flow(),
        top_depth: access.fe_value(key, PropertyId::Depth, (0, 0, -1))?,
    }))
}

/// The target's own column when it is open, else the shallowest open
/// column among its `+i`, `+j` and diagonal neighbours.
fn open_column(
    access: &mut NodeAccess<'_, '_>,
    formation: FormationId,
    target: NodeKey,
) -> Result<Option<(i32, i32)>, CommError> {
    let (i, j) = target.column();
    match column_state(access, formation, i, j)? {
        Some(state) if !state.sealing => return Ok(Some((i, j))),
        Some(_) => {}
        None => return Ok(None),
    }
    let mut best: Option<((i32, i32), f64)> = None;
    for (di, dj) in [(0, 1), (1, 0), (1, 1)] {
        let column = (i + di, j + dj);
        let Some(state) = column_state(access, formation, column.0, column.1)? else {
            continue;
        };
        if state.sealing {
            continue;
        }
        if best.map_or(true, |(_, depth)| state.top_depth < depth) {
            best = Some((column, state.top_depth));
        }
    }
    Ok(best.map(|(column, _)| column))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use strata_comm::{mesh, CommConfig};
    use strata_core::{FaultStatus, Rank, Species};
    use strata_grid::{FormationSpec, PartitionLayout, PropertyVolume};

    const SEAL: FormationId = FormationId(0);
    const RES: FormationId = FormationId(1);
    const SRC: FormationId = FormationId(2);

    /// Flat seal, reservoir and source rock, one layer each, on a 5x5
    /// corner grid.
    fn stack() -> FormationStack {
        let mut v = PropertyVolume::builder(5, 5)
            .formation(1, 1.0)
            .formation(1, 1.0)
            .formation(1, 1.0)
            .build()
            .unwrap();
        for (f, top) in [(SEAL, 1000.0), (RES, 1010.0), (SRC, 1020.0)] {
            v.fill(f, PropertyId::Depth, |_, _, l| top + 10.0 * f64::from(1 - l));
            v.fill(f, PropertyId::VerticalPermeability, |_, _, _| 1.0);
            v.fill(f, PropertyId::Porosity, |_, _, _| 0.2);
        }
        let layout = PartitionLayout::single(5, 5).unwrap();
        let mut s = FormationStack::builder(layout, Rank(0), Arc::new(v))
            .formation(FormationSpec::new("seal", 1))
            .formation(FormationSpec::new("reservoir", 1).reservoir())
            .formation(FormationSpec::new("source", 1).source_rock())
            .build()
            .unwrap();
        s.compute_properties();
        crate::reservoir::mark_hosting(&mut s, RES);
        s
    }

    fn charge(mass: f64) -> Composition {
        let mut c = Composition::new();
        c.add(Species::C1, mass);
        c
    }

    fn point_at(s: &mut FormationStack, key: NodeKey, target: NodeKey) {
        s.local_mut(key).unwrap().path.target = Some(target);
    }

    fn expel(s: &mut FormationStack, fraction: f64) -> (TransportReport, ReservoirLedger) {
        let mut endpoints = mesh(1, CommConfig::default()).unwrap();
        let mut session = endpoints[0].begin("transport").unwrap();
        let mut access = NodeAccess::new(s, &mut session);
        let mut ledger = ReservoirLedger::new(RES);
        let report =
            migrate_expelled_charges(&mut access, SRC, RES, fraction, &mut ledger).unwrap();
        drop(access);
        session.finish(&*s).unwrap();
        (report, ledger)
    }

    #[test]
    fn charge_map_merges_columns() {
        let mut m = ChargeMap::new();
        m.insert(SRC, 1, 1, &charge(2.0));
        m.insert(SRC, 1, 1, &charge(3.0));
        m.insert(RES, 0, 0, &charge(1.0));
        assert_eq!(m.get(SRC, 1, 1).unwrap().total(), 5.0);
        assert_eq!(m.formation_total(SRC), 5.0);
        assert_eq!(m.total(), 6.0);
    }

    #[test]
    fn expelled_charge_lands_in_the_target_column() {
        let mut s = stack();
        let mut m = ChargeMap::new();
        m.insert(SRC, 1, 1, &charge(10.0));
        load_charges(&mut s, &m);
        // The charge enters at the reservoir node above the source.
        point_at(&mut s, NodeKey::new(RES, 1, 1, 0), NodeKey::new(RES, 2, 1, 0));
        let (report, ledger) = expel(&mut s, 0.5);
        assert_eq!(report.delivered, 5.0);
        assert_eq!(ledger.column(2, 1).unwrap().total(), 5.0);
        assert_eq!(ledger.delivered(), 5.0);
    }

    #[test]
    fn sealed_target_column_moves_to_the_shallowest_open_one() {
        let mut s = stack();
        let mut m = ChargeMap::new();
        m.insert(SRC, 1, 1, &charge(4.0));
        load_charges(&mut s, &m);
        s.local_mut(NodeKey::new(RES, 1, 1, 0)).unwrap().props.fault = FaultStatus::Seal;
        // The sealed node is impermeable, so the charge enters at the source node.
        point_at(&mut s, NodeKey::new(SRC, 1, 1, 0), NodeKey::new(RES, 1, 1, 0));
        let (report, ledger) = expel(&mut s, 1.0);
        assert_eq!(report.delivered, 4.0);
        // Flat: every candidate ties and the first wins.
        assert_eq!(ledger.column(1, 2).unwrap().total(), 4.0);
    }

    #[test]
    fn fully_sealed_target_blocks_the_charge() {
        let mut s = stack();
        let mut m = ChargeMap::new();
        m.insert(SRC, 1, 1, &charge(4.0));
        load_charges(&mut s, &m);
        for (i, j) in [(1, 1), (1, 2), (2, 1), (2, 2)] {
            s.local_mut(NodeKey::new(RES, i, j, 0)).unwrap().props.fault = FaultStatus::Seal;
        }
        point_at(&mut s, NodeKey::new(SRC, 1, 1, 0), NodeKey::new(RES, 1, 1, 0));
        let (report, ledger) = expel(&mut s, 1.0);
        assert_eq!(report.blocked, 4.0);
        assert_eq!(ledger.blocked().total(), 4.0);
        assert_eq!(ledger.delivered(), 0.0);
    }

    #[test]
    fn charge_below_the_reservoir_is_stuck_or_eliminated() {
        let mut s = stack();
        let mut m = ChargeMap::new();
        m.insert(SRC, 1, 1, &charge(3.0));
        m.insert(SRC, 2, 2, &charge(7.0));
        load_charges(&mut s, &m);
        let stuck = NodeKey::new(SRC, 1, 1, 0);
        point_at(&mut s, NodeKey::new(RES, 1, 1, 0), stuck);
        let trap = NodeKey::new(SRC, 2, 2, 0);
        point_at(&mut s, NodeKey::new(RES, 2, 2, 0), trap);
        s.local_mut(trap).unwrap().path.eliminated = true;
        let (report, ledger) = expel(&mut s, 1.0);
        assert_eq!(report.stuck, 3.0);
        assert_eq!(report.eliminated, 7.0);
        assert_eq!(ledger.delivered() + ledger.blocked().total(), 0.0);
    }

    #[test]
    fn boundary_columns_do_not_leak() {
        let mut s = stack();
        let mut m = ChargeMap::new();
        m.insert(RES, 0, 1, &charge(1.0));
        m.insert(RES, 1, 1, &charge(2.0));
        load_charges(&mut s, &m);
        crate::reservoir::mark_hosting(&mut s, SEAL);
        let mut endpoints = mesh(1, CommConfig::default()).unwrap();
        let mut session = endpoints[0].begin("leak").unwrap();
        let mut access = NodeAccess::new(&mut s, &mut session);
        let mut ledger = ReservoirLedger::new(SEAL);
        let report = migrate_leaked_charges(&mut access, RES, SEAL, &mut ledger).unwrap();
        drop(access);
        session.finish(&s).unwrap();
        assert_eq!(report.delivered, 2.0);
        assert_eq!(ledger.column(1, 1).unwrap().total(), 2.0);
        assert!(ledger.column(0, 1).is_none());
    }

    #[test]
    fn merged_ledgers_sort_their_columns() {
        let mut a = ReservoirLedger::new(RES);
        a.add_column(2, 0, &charge(1.0));
        let mut b = ReservoirLedger::new(RES);
        b.add_column(0, 1, &charge(2.0));
        b.add_column(2, 0, &charge(1.0));
        b.add_blocked(&charge(0.5));
        a.merge(&b);
        let columns: Vec<(i32, i32)> = a.columns().map(|(c, _)| c).collect();
        assert_eq!(columns, vec![(0, 1), (2, 0)]);
        assert_eq!(a.column(2, 0).unwrap().total(), 2.0);
        assert_eq!(a.blocked().total(), 0.5);
    }
}
