//! The formation stack and its local node semantics.
//!
//! Formations are stacked shallowest first. A key whose `k` runs past the
//! top of its formation continues in the formation above at `k - depth`;
//! one below zero continues in the formation below. Zero-thickness nodes
//! hold no migration state of their own: their answers come from the
//! first node with thickness above them, across formation boundaries.

use std::sync::Arc;

use strata_core::{
    Composition, FaultStatus, FormationId, NodeKey, Phase, PropertyId, Rank, Vec3, UNDEFINED,
};

use crate::array::FormationNodeArray;
use crate::element::{HexElement, RefPoint, CENTRE};
use crate::error::GridError;
use crate::formation::{BlockingThresholds, Formation, FormationSpec};
use crate::layout::{PartitionLayout, Rect};
use crate::node::{FormationNode, LocalNode, Next, ProxyNode};
use crate::offsets::NEIGHBOUR_OFFSETS;
use crate::properties::PropertySource;

/// Builder for [`FormationStack`].
pub struct FormationStackBuilder {
    layout: PartitionLayout,
    rank: Rank,
    properties: Arc<dyn PropertySource>,
    spacing: (f64, f64),
    blocking: BlockingThresholds,
    formations: Vec<FormationSpec>,
}

impl FormationStackBuilder {
    /// Lateral node spacing. Default: `(1.0, 1.0)`.
    pub fn spacing(mut self, dx: f64, dy: f64) -> Self {
        self.spacing = (dx, dy);
        self
    }

    /// Blocking thresholds of formations without their own.
    pub fn blocking(mut self, blocking: BlockingThresholds) -> Self {
        self.blocking = blocking;
        self
    }

    /// Append a formation below the ones already added.
    pub fn formation(mut self, spec: FormationSpec) -> Self {
        self.formations.push(spec);
        self
    }

    /// Allocate this rank's node arrays.
    pub fn build(self) -> Result<FormationStack, GridError> {
        let (dx, dy) = self.spacing;
        if !(dx.is_finite() && dy.is_finite() && dx > 0.0 && dy > 0.0) {
            return Err(GridError::InvalidSpacing { dx, dy });
        }
        if self.formations.is_empty() {
            return Err(GridError::NoFormations);
        }
        let rect = self.layout.rect(self.rank)?;
        let grid = self.layout.grid_size();
        let mut formations = Vec::with_capacity(self.formations.len());
        for (n, spec) in self.formations.into_iter().enumerate() {
            let id = FormationId(n as u32);
            if spec.depth <= 0 {
                return Err(GridError::ZeroDepth { name: spec.name });
            }
            match self.properties.depth(id) {
                None => return Err(GridError::MissingFormation { formation: id }),
                Some(available) if available != spec.depth => {
                    return Err(GridError::DepthMismatch {
                        formation: id,
                        declared: spec.depth,
                        available,
                    })
                }
                Some(_) => {}
            }
            let array = FormationNodeArray::new(id, grid, rect, spec.depth);
            formations.push(Formation::new(spec, array, self.blocking));
        }
        Ok(FormationStack {
            formations,
            layout: self.layout,
            rank: self.rank,
            rect,
            properties: self.properties,
            spacing: self.spacing,
        })
    }
}

/// This rank's view of every formation.
pub struct FormationStack {
    formations: Vec<Formation>,
    layout: PartitionLayout,
    rank: Rank,
    rect: Rect,
    properties: Arc<dyn PropertySource>,
    spacing: (f64, f64),
}

impl FormationStack {
    /// Start building the stack of `rank` within `layout`.
    pub fn builder(
        layout: PartitionLayout,
        rank: Rank,
        properties: Arc<dyn PropertySource>,
    ) -> FormationStackBuilder {
        FormationStackBuilder {
            layout,
            rank,
            properties,
            spacing: (1.0, 1.0),
            blocking: BlockingThresholds::default(),
            formations: Vec::new(),
        }
    }

    // ── Structure ──────────────────────────────────────────────────

    /// This rank.
    pub fn rank(&self) -> Rank {
        self.rank
    }

    /// The partition layout.
    pub fn layout(&self) -> &PartitionLayout {
        &self.layout
    }

    /// Columns owned here.
    pub fn rect(&self) -> Rect {
        self.rect
    }

    /// Lateral spacing `(dx, dy)`.
    pub fn spacing(&self) -> (f64, f64) {
        self.spacing
    }

    /// The property maps.
    pub fn properties(&self) -> &dyn PropertySource {
        self.properties.as_ref()
    }

    /// Formations, shallowest first.
    pub fn formations(&self) -> &[Formation] {
        &self.formations
    }

    /// One formation.
    pub fn formation(&self, id: FormationId) -> Option<&Formation> {
        self.formations.get(id.index())
    }

    /// One formation, mutably.
    pub fn formation_mut(&mut self, id: FormationId) -> Option<&mut Formation> {
        self.formations.get_mut(id.index())
    }

    /// Display name of a formation, empty for an unknown id.
    pub fn formation_name(&self, id: FormationId) -> &str {
        self.formation(id).map_or("", Formation::name)
    }

    /// Resolve a key whose `k` may run past its formation into the
    /// formation that holds it. `None` outside the stack or the grid.
    pub fn normalize(&self, key: NodeKey) -> Option<NodeKey> {
        if !self.layout.in_global_range(key.i, key.j) {
            return None;
        }
        let mut key = key;
        loop {
            let depth = self.formation(key.formation)?.depth();
            if key.k >= depth {
                let above = key.formation.0.checked_sub(1)?;
                key = NodeKey::new(FormationId(above), key.i, key.j, key.k - depth);
            } else if key.k < 0 {
                let below = FormationId(key.formation.0 + 1);
                let below_depth = self.formation(below)?.depth();
                key = NodeKey::new(below, key.i, key.j, key.k + below_depth);
            } else {
                return Some(key);
            }
        }
    }

    /// The node directly above `key`, across formations.
    pub fn above(&self, key: NodeKey) -> Option<NodeKey> {
        self.normalize(key.offset(0, 0, 1))
    }

    /// The node directly below `key`, across formations.
    pub fn below(&self, key: NodeKey) -> Option<NodeKey> {
        self.normalize(key.offset(0, 0, -1))
    }

    /// The neighbour of `key` along [`NEIGHBOUR_OFFSETS`]`[direction]`.
    pub fn neighbour(&self, key: NodeKey, direction: usize) -> Option<NodeKey> {
        let (di, dj, dk) = *NEIGHBOUR_OFFSETS.get(direction)?;
        self.normalize(key.offset(di, dj, dk))
    }

    /// Rank owning the column of `key`.
    pub fn owner(&self, key: NodeKey) -> Option<Rank> {
        self.layout.owner(key.i, key.j)
    }

    /// `true` if the column of `key` is owned here.
    pub fn is_local(&self, key: NodeKey) -> bool {
        self.rect.contains(key.i, key.j)
    }

    /// The owned node at `key`.
    pub fn local(&self, key: NodeKey) -> Option<&LocalNode> {
        self.formation(key.formation)?
            .array()
            .get_local_node(key.i, key.j, key.k)
    }

    /// The owned node at `key`, mutably.
    pub fn local_mut(&mut self, key: NodeKey) -> Option<&mut LocalNode> {
        self.formation_mut(key.formation)?
            .array_mut()
            .get_local_node_mut(key.i, key.j, key.k)
    }

    /// The node at `key`: the owned node, or its proxy, created on first
    /// use. `None` outside the global range.
    pub fn get_node(&mut self, key: NodeKey) -> Option<FormationNode<'_>> {
        self.formation_mut(key.formation)?
            .array_mut()
            .get_node(key.i, key.j, key.k)
    }

    /// The proxy for a remote `key`, created on first use.
    pub fn proxy_mut(&mut self, key: NodeKey) -> Option<&mut ProxyNode> {
        self.formation_mut(key.formation)?
            .array_mut()
            .proxy_mut(key.i, key.j, key.k)
    }

    /// Live proxies across all formations.
    pub fn proxy_count(&self) -> usize {
        self.formations.iter().map(|f| f.array().proxy_count()).sum()
    }

    // ── Bulk state ─────────────────────────────────────────────────

    /// Reset every owned node and invalidate every proxy.
    pub fn clear_properties(&mut self) {
        for f in &mut self.formations {
            f.array_mut().clear_properties();
            f.set_hosts_reservoir(false);
        }
    }

    /// Populate every owned node from the property maps.
    pub fn compute_properties(&mut self) {
        let spacing = self.spacing;
        let properties = Arc::clone(&self.properties);
        for f in &mut self.formations {
            f.compute_properties(properties.as_ref(), spacing);
        }
    }

    /// Reset reservoir flags everywhere.
    pub fn clear_reservoir_properties(&mut self) {
        for f in &mut self.formations {
            f.array_mut().clear_reservoir_properties();
        }
    }

    /// Drop every proxy's cached values.
    pub fn invalidate_proxies(&mut self) {
        for f in &mut self.formations {
            f.array_mut().invalidate_proxies();
        }
    }

    /// Geometry of the node at `key`.
    pub fn element(&self, key: NodeKey) -> Option<HexElement> {
        let f = self.formation(key.formation)?;
        Some(f.element(self.properties(), self.spacing, key.i, key.j, key.k))
    }

    /// Corner values of a property for the node at `key`.
    pub fn corner_values(&self, key: NodeKey, property: PropertyId) -> Option<[f64; 8]> {
        let f = self.formation(key.formation)?;
        Some(f.corner_values(self.properties(), property, key.i, key.j, key.k))
    }

    // ── Local semantics ────────────────────────────────────────────
    //
    // These read owned nodes only. Zero-thickness nodes defer to the
    // first node with thickness above them.

    /// The first owned node with thickness at or above `key`.
    pub fn thick_node(&self, key: NodeKey) -> Option<&LocalNode> {
        let mut key = key;
        loop {
            let node = self.local(key)?;
            if node.has_thickness() {
                return Some(node);
            }
            key = self.above(key)?;
        }
    }

    /// Centre depth, [`UNDEFINED`] without a node with thickness.
    pub fn depth_of(&self, key: NodeKey) -> f64 {
        self.thick_node(key).map_or(UNDEFINED, |n| n.props.depth)
    }

    /// All corner depths of the node itself are defined.
    pub fn is_valid(&self, key: NodeKey) -> bool {
        self.local(key).is_some_and(LocalNode::is_valid)
    }

    /// Zero thickness at the node itself.
    pub fn has_no_thickness(&self, key: NodeKey) -> bool {
        self.local(key).is_some_and(|n| !n.has_thickness())
    }

    /// Permeability, porosity or fault block flow.
    pub fn is_impermeable(&self, key: NodeKey) -> bool {
        let Some(node) = self.thick_node(key) else {
            return false;
        };
        self.formation(node.key().formation)
            .is_some_and(|f| f.blocks(node))
    }

    /// Resolved target; unresolved zero-thickness nodes defer upward.
    pub fn target_of(&self, key: NodeKey) -> Option<NodeKey> {
        let mut key = key;
        loop {
            let node = self.local(key)?;
            if node.path.target.is_some() || node.has_thickness() {
                return node.path.target;
            }
            key = self.above(key)?;
        }
    }

    /// The neighbour the ranking currently selects, if it exists.
    pub fn attempted_neighbour(&self, node: &LocalNode) -> Option<NodeKey> {
        node.path
            .selected_direction()
            .and_then(|d| self.neighbour(node.key(), d))
    }

    /// Where charge goes next: the decided next node, else the attempted
    /// neighbour. `None` for terminals.
    pub fn adjacent_of(&self, key: NodeKey) -> Option<NodeKey> {
        let node = self.thick_node(key)?;
        match node.path.next {
            Some(Next::Via { node, .. }) => Some(node),
            Some(Next::Terminal { .. }) => None,
            None => self.attempted_neighbour(node),
        }
    }

    /// Impermeable, or the attempted neighbour does not exist.
    pub fn has_nowhere_to_go(&self, key: NodeKey) -> bool {
        match self.thick_node(key) {
            Some(node) => self.is_impermeable(key) || self.attempted_neighbour(node).is_none(),
            None => true,
        }
    }

    /// The attempted direction leads off the grid or the stack.
    pub fn goes_out_of_bounds(&self, key: NodeKey) -> bool {
        self.thick_node(key).is_some_and(|node| {
            node.path.out_of_bounds
                || node
                    .path
                    .selected_direction()
                    .is_some_and(|d| self.neighbour(node.key(), d).is_none())
        })
    }

    /// Reservoir flag for a phase.
    pub fn is_reservoir(&self, key: NodeKey, phase: Phase) -> bool {
        self.thick_node(key)
            .is_some_and(|n| n.reservoir.is_reservoir(phase))
    }

    /// Terminus flag of the node itself.
    pub fn is_end_of_path(&self, key: NodeKey) -> bool {
        self.local(key).is_some_and(|n| n.path.end_of_path)
    }

    /// Charge reaching the node is discarded.
    pub fn is_eliminated(&self, key: NodeKey) -> bool {
        self.thick_node(key).is_some_and(|n| n.path.eliminated)
    }

    /// Supported column height for a phase, [`UNDEFINED`] without thickness.
    pub fn height_of(&self, key: NodeKey, phase: Phase) -> f64 {
        match self.thick_node(key) {
            Some(n) => match phase {
                Phase::Gas => n.reservoir.height_gas,
                Phase::Oil => n.reservoir.height_oil,
            },
            None => UNDEFINED,
        }
    }

    /// Fault classification of the node's column.
    pub fn fault_of(&self, key: NodeKey) -> FaultStatus {
        self.local(key).map_or(FaultStatus::NoFault, |n| n.props.fault)
    }

    /// Analog flow direction of the node itself.
    pub fn flow_direction_of(&self, key: NodeKey) -> Vec3 {
        self.local(key).map_or(Vec3::UNDEFINED, |n| n.path.flow_direction)
    }

    /// Charge waiting at the node with thickness at or above `key`.
    pub fn composition_of(&self, key: NodeKey) -> Composition {
        self.thick_node(key)
            .map(|n| n.composition.clone())
            .unwrap_or_default()
    }

    /// A property interpolated at a reference point of the node's element.
    pub fn fe_value(&self, key: NodeKey, property: PropertyId, at: RefPoint) -> f64 {
        match self.corner_values(key, property) {
            Some(values) if self.local(key).is_some() => HexElement::interpolate(&values, at),
            _ => UNDEFINED,
        }
    }

    /// Smallest corner value of a property.
    pub fn fe_minimum(&self, key: NodeKey, property: PropertyId) -> f64 {
        match self.corner_values(key, property) {
            Some(values) if self.local(key).is_some() => HexElement::minimum(&values),
            _ => UNDEFINED,
        }
    }

    /// Gradient of a property at the element centre.
    pub fn fe_gradient(&self, key: NodeKey, property: PropertyId) -> Vec3 {
        if self.local(key).is_none() {
            return Vec3::UNDEFINED;
        }
        let (Some(element), Some(values)) = (self.element(key), self.corner_values(key, property))
        else {
            return Vec3::UNDEFINED;
        };
        element.gradient(&values, CENTRE).unwrap_or(Vec3::UNDEFINED)
    }
}

impl std::fmt::Debug for FormationStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormationStack")
            .field("rank", &self.rank)
            .field("rect", &self.rect)
            .field("formations", &self.formations.len())
            .finish_non_exhaustive()
    }
}
