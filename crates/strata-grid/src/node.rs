//! Local and proxy formation nodes.
//!
//! A [`LocalNode`] holds the authoritative state of one cell on the rank
//! that owns it. A [`ProxyNode`] stands in for a cell owned by another
//! rank: it remembers which fields were already fetched and their last
//! values, and never holds authoritative state.

use smallvec::SmallVec;
use strata_comm::{Value, ValueSpec};
use strata_core::{Composition, FaultStatus, NodeKey, Phase, Vec3, UNDEFINED};

// ── Local node ─────────────────────────────────────────────────────

/// Physical properties of a node, recomputed every snapshot.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeProperties {
    /// All eight corner depths are defined.
    pub valid: bool,
    /// Top and base differ at some corner column.
    pub has_thickness: bool,
    /// Centre depth.
    pub depth: f64,
    /// Corner depths in [`NODE_CORNERS`](crate::offsets::NODE_CORNERS) order.
    pub corner_depths: [f64; 8],
    /// Horizontal permeability.
    pub horizontal_permeability: f64,
    /// Vertical permeability.
    pub vertical_permeability: f64,
    /// Porosity.
    pub porosity: f64,
    /// Temperature.
    pub temperature: f64,
    /// Pore pressure.
    pub pressure: f64,
    /// Overpressure.
    pub overpressure: f64,
    /// Water density.
    pub water_density: f64,
    /// Vapour density.
    pub gas_density: f64,
    /// Liquid density.
    pub oil_density: f64,
    /// Gas capillary entry pressure.
    pub capillary_gas: f64,
    /// Oil capillary entry pressure.
    pub capillary_oil: f64,
    /// Fault classification of the column.
    pub fault: FaultStatus,
}

impl Default for NodeProperties {
    fn default() -> Self {
        Self {
            valid: false,
            has_thickness: false,
            depth: UNDEFINED,
            corner_depths: [UNDEFINED; 8],
            horizontal_permeability: UNDEFINED,
            vertical_permeability: UNDEFINED,
            porosity: UNDEFINED,
            temperature: UNDEFINED,
            pressure: UNDEFINED,
            overpressure: UNDEFINED,
            water_density: UNDEFINED,
            gas_density: UNDEFINED,
            oil_density: UNDEFINED,
            capillary_gas: UNDEFINED,
            capillary_oil: UNDEFINED,
            fault: FaultStatus::NoFault,
        }
    }
}

impl NodeProperties {
    /// Density of a hydrocarbon phase.
    pub fn density(&self, phase: Phase) -> f64 {
        match phase {
            Phase::Gas => self.gas_density,
            Phase::Oil => self.oil_density,
        }
    }

    /// Capillary entry pressure of a hydrocarbon phase.
    pub fn capillary_pressure(&self, phase: Phase) -> f64 {
        match phase {
            Phase::Gas => self.capillary_gas,
            Phase::Oil => self.capillary_oil,
        }
    }
}

/// Reservoir and crest classification.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReservoirState {
    /// Gas reservoir flag.
    pub gas: bool,
    /// Oil reservoir flag.
    pub oil: bool,
    /// Gas crest flag.
    pub crest_gas: bool,
    /// Oil crest flag.
    pub crest_oil: bool,
    /// Gas column height the seal supports.
    pub height_gas: f64,
    /// Oil column height the seal supports.
    pub height_oil: f64,
}

impl ReservoirState {
    /// Flag for one phase.
    pub fn is_reservoir(&self, phase: Phase) -> bool {
        match phase {
            Phase::Gas => self.gas,
            Phase::Oil => self.oil,
        }
    }

    /// Flagged for either phase.
    pub fn any(&self) -> bool {
        self.gas || self.oil
    }

    /// Set the flag and height for one phase.
    pub fn set(&mut self, phase: Phase, flag: bool, height: f64) {
        match phase {
            Phase::Gas => {
                self.gas = flag;
                self.height_gas = height;
            }
            Phase::Oil => {
                self.oil = flag;
                self.height_oil = height;
            }
        }
    }

    /// Crest flag for one phase.
    pub fn is_crest(&self, phase: Phase) -> bool {
        match phase {
            Phase::Gas => self.crest_gas,
            Phase::Oil => self.crest_oil,
        }
    }

    /// Set the crest flag for one phase.
    pub fn set_crest(&mut self, phase: Phase, flag: bool) {
        match phase {
            Phase::Gas => self.crest_gas = flag,
            Phase::Oil => self.crest_oil = flag,
        }
    }
}

/// One ranked neighbour.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate {
    /// Index into [`NEIGHBOUR_OFFSETS`](crate::offsets::NEIGHBOUR_OFFSETS).
    pub direction: u8,
    /// Preference: the cosine between the compound flow direction and
    /// the step, or the ascent slope for reservoir nodes.
    pub score: f64,
}

/// Where charge entering a node goes next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Next {
    /// Charge stays here.
    Terminal {
        /// The charge is discarded.
        eliminated: bool,
    },
    /// Charge moves on to `node`.
    Via {
        /// The next node.
        node: NodeKey,
        /// Chosen by a dead-end policy rather than the ranking.
        fallback: bool,
    },
}

/// Path-resolution state, reset every snapshot.
#[derive(Clone, Debug, PartialEq)]
pub struct PathState {
    /// Migration terminus.
    pub end_of_path: bool,
    /// Charge reaching this node is discarded.
    pub eliminated: bool,
    /// Preferred migration direction; [`Vec3::UNDEFINED`] until computed.
    pub flow_direction: Vec3,
    /// Neighbours in preference order.
    pub ranking: SmallVec<[Candidate; 17]>,
    /// Position of the attempted neighbour in `ranking`.
    pub attempt: usize,
    /// The selected neighbour lies outside the grid.
    pub out_of_bounds: bool,
    /// Where charge goes next, once decided.
    pub next: Option<Next>,
    /// Resolved target.
    pub target: Option<NodeKey>,
    /// Times a cycle repair advanced this node.
    pub repairs: u32,
}

impl Default for PathState {
    fn default() -> Self {
        Self {
            end_of_path: false,
            eliminated: false,
            flow_direction: Vec3::UNDEFINED,
            ranking: SmallVec::new(),
            attempt: 0,
            out_of_bounds: false,
            next: None,
            target: None,
            repairs: 0,
        }
    }
}

impl PathState {
    /// Offset index of the attempted neighbour, `None` once exhausted.
    pub fn selected_direction(&self) -> Option<usize> {
        self.ranking.get(self.attempt).map(|c| usize::from(c.direction))
    }

    /// Forget everything but the flow direction and ranking.
    pub fn reset_resolution(&mut self) {
        self.attempt = 0;
        self.out_of_bounds = false;
        self.next = None;
        self.target = None;
        self.eliminated = false;
        self.repairs = 0;
    }
}

/// Authoritative state of one cell.
#[derive(Clone, Debug, PartialEq)]
pub struct LocalNode {
    key: NodeKey,
    /// Physical properties.
    pub props: NodeProperties,
    /// Reservoir classification.
    pub reservoir: ReservoirState,
    /// Path resolution.
    pub path: PathState,
    /// Charge waiting to migrate from this node.
    pub composition: Composition,
}

impl LocalNode {
    /// A node with undefined properties.
    pub fn new(key: NodeKey) -> Self {
        Self {
            key,
            props: NodeProperties::default(),
            reservoir: ReservoirState::default(),
            path: PathState::default(),
            composition: Composition::new(),
        }
    }

    /// Global address.
    pub fn key(&self) -> NodeKey {
        self.key
    }

    /// Shorthand for `props.valid`.
    pub fn is_valid(&self) -> bool {
        self.props.valid
    }

    /// Shorthand for `props.has_thickness`.
    pub fn has_thickness(&self) -> bool {
        self.props.has_thickness
    }

    /// Reset everything computed from properties.
    pub fn clear(&mut self) {
        self.props = NodeProperties::default();
        self.reservoir = ReservoirState::default();
        self.path = PathState::default();
        self.composition = Composition::new();
    }
}

// ── Proxy cache ────────────────────────────────────────────────────

/// Proxy fields that are cached between fetches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CacheSlot {
    /// [`ValueSpec::Depth`].
    Depth,
    /// [`ValueSpec::IsValid`].
    IsValid,
    /// [`ValueSpec::IsImpermeable`].
    IsImpermeable,
    /// [`ValueSpec::HasNoThickness`].
    HasNoThickness,
    /// [`ValueSpec::IsEndOfPath`].
    IsEndOfPath,
    /// [`ValueSpec::IsReservoirGas`].
    IsReservoirGas,
    /// [`ValueSpec::IsReservoirOil`].
    IsReservoirOil,
    /// [`ValueSpec::IsEliminated`].
    IsEliminated,
    /// [`ValueSpec::HeightGas`].
    HeightGas,
    /// [`ValueSpec::HeightOil`].
    HeightOil,
    /// [`ValueSpec::FaultStatus`].
    FaultStatus,
    /// [`ValueSpec::AnalogFlowDirection`].
    AnalogFlowDirection,
    /// [`ValueSpec::TargetFormationNode`], stored only once resolved.
    TargetFormationNode,
}

impl CacheSlot {
    /// Number of slots.
    pub const COUNT: usize = 13;

    /// The slot caching `spec`, or `None` for fields that are always
    /// fetched.
    pub fn for_spec(spec: &ValueSpec) -> Option<CacheSlot> {
        Some(match spec {
            ValueSpec::Depth => Self::Depth,
            ValueSpec::IsValid => Self::IsValid,
            ValueSpec::IsImpermeable => Self::IsImpermeable,
            ValueSpec::HasNoThickness => Self::HasNoThickness,
            ValueSpec::IsEndOfPath => Self::IsEndOfPath,
            ValueSpec::IsReservoirGas => Self::IsReservoirGas,
            ValueSpec::IsReservoirOil => Self::IsReservoirOil,
            ValueSpec::IsEliminated => Self::IsEliminated,
            ValueSpec::HeightGas => Self::HeightGas,
            ValueSpec::HeightOil => Self::HeightOil,
            ValueSpec::FaultStatus => Self::FaultStatus,
            ValueSpec::AnalogFlowDirection => Self::AnalogFlowDirection,
            ValueSpec::TargetFormationNode => Self::TargetFormationNode,
            ValueSpec::AdjacentNode
            | ValueSpec::HasNowhereToGo
            | ValueSpec::GoesOutOfBounds
            | ValueSpec::FiniteElementMinimumValue(_)
            | ValueSpec::FiniteElementGrad(_)
            | ValueSpec::FiniteElementValue { .. }
            | ValueSpec::Composition => return None,
        })
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Bitset of fetched [`CacheSlot`]s.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheSet {
    bits: u16,
}

impl CacheSet {
    /// Mark a slot fetched.
    pub fn insert(&mut self, slot: CacheSlot) {
        self.bits |= 1 << slot.index();
    }

    /// `true` if the slot was fetched.
    pub fn contains(&self, slot: CacheSlot) -> bool {
        self.bits & (1 << slot.index()) != 0
    }

    /// Number of fetched slots.
    pub fn len(&self) -> usize {
        self.bits.count_ones() as usize
    }

    /// `true` if nothing was fetched.
    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// Forget every slot.
    pub fn clear(&mut self) {
        self.bits = 0;
    }
}

/// Read-through cache of a node owned by another rank.
#[derive(Clone, Debug)]
pub struct ProxyNode {
    key: NodeKey,
    cached: CacheSet,
    values: [Value; CacheSlot::COUNT],
}

impl ProxyNode {
    /// An empty proxy for `key`.
    pub fn new(key: NodeKey) -> Self {
        Self {
            key,
            cached: CacheSet::default(),
            values: std::array::from_fn(|_| Value::Invalid),
        }
    }

    /// Global address.
    pub fn key(&self) -> NodeKey {
        self.key
    }

    /// Fetched slots.
    pub fn cached_slots(&self) -> CacheSet {
        self.cached
    }

    /// The cached answer to `spec`, if any.
    pub fn cached(&self, spec: &ValueSpec) -> Option<&Value> {
        let slot = CacheSlot::for_spec(spec)?;
        self.cached
            .contains(slot)
            .then(|| &self.values[slot.index()])
    }

    /// Remember a fetched answer. Volatile fields and unresolved targets
    /// are not kept.
    pub fn store(&mut self, spec: &ValueSpec, value: &Value) {
        let Some(slot) = CacheSlot::for_spec(spec) else {
            return;
        };
        if slot == CacheSlot::TargetFormationNode && !matches!(value, Value::Node(Some(_))) {
            return;
        }
        self.values[slot.index()] = value.clone();
        self.cached.insert(slot);
    }

    /// Drop every cached value.
    pub fn invalidate(&mut self) {
        self.cached.clear();
    }
}

/// A node as seen from one rank.
#[derive(Clone, Copy, Debug)]
pub enum FormationNode<'a> {
    /// Owned here.
    Local(&'a LocalNode),
    /// Owned elsewhere.
    Proxy(&'a ProxyNode),
}

impl FormationNode<'_> {
    /// Global address.
    pub fn key(&self) -> NodeKey {
        match self {
            Self::Local(n) => n.key(),
            Self::Proxy(p) => p.key(),
        }
    }

    /// `true` for a locally owned node.
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }
}
