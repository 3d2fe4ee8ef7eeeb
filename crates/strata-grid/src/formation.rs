//! One formation of the stack.

use strata_core::{FormationId, NodeKey, PropertyId};

use crate::array::FormationNodeArray;
use crate::element::{HexElement, CENTRE};
use crate::node::{LocalNode, Next};
use crate::offsets::NODE_CORNERS;
use crate::properties::PropertySource;

/// Permeability and porosity at or below which a node blocks flow.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlockingThresholds {
    /// Vertical permeability threshold.
    pub permeability: f64,
    /// Porosity threshold.
    pub porosity: f64,
}

impl Default for BlockingThresholds {
    fn default() -> Self {
        Self {
            permeability: 1.0e-9,
            porosity: 1.0e-9,
        }
    }
}

/// Declaration of one formation for [`FormationStackBuilder`](crate::FormationStackBuilder).
#[derive(Clone, Debug, PartialEq)]
pub struct FormationSpec {
    pub(crate) name: String,
    pub(crate) depth: i32,
    pub(crate) source_rock: bool,
    pub(crate) reservoir: bool,
    pub(crate) blocking: Option<BlockingThresholds>,
}

impl FormationSpec {
    /// A formation of `depth` element layers.
    pub fn new(name: impl Into<String>, depth: i32) -> Self {
        Self {
            name: name.into(),
            depth,
            source_rock: false,
            reservoir: false,
            blocking: None,
        }
    }

    /// Declared name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared layer count.
    pub fn depth(&self) -> i32 {
        self.depth
    }

    /// Declared as a source rock.
    pub fn is_source_rock(&self) -> bool {
        self.source_rock
    }

    /// Declared as a reservoir.
    pub fn is_reservoir(&self) -> bool {
        self.reservoir
    }

    /// Mark the formation as expelling charge.
    pub fn source_rock(mut self) -> Self {
        self.source_rock = true;
        self
    }

    /// Mark the formation as a user-designated reservoir.
    pub fn reservoir(mut self) -> Self {
        self.reservoir = true;
        self
    }

    /// Override the stack-wide blocking thresholds.
    pub fn blocking(mut self, blocking: BlockingThresholds) -> Self {
        self.blocking = Some(blocking);
        self
    }
}

/// A formation: its node array, role flags and thresholds.
#[derive(Clone, Debug)]
pub struct Formation {
    name: String,
    array: FormationNodeArray,
    source_rock: bool,
    reservoir: bool,
    hosts_reservoir: bool,
    blocking: BlockingThresholds,
}

impl Formation {
    pub(crate) fn new(spec: FormationSpec, array: FormationNodeArray, blocking: BlockingThresholds) -> Self {
        Self {
            name: spec.name,
            array,
            source_rock: spec.source_rock,
            reservoir: spec.reservoir,
            hosts_reservoir: false,
            blocking: spec.blocking.unwrap_or(blocking),
        }
    }

    /// Position in the stack, `0` at the top.
    pub fn id(&self) -> FormationId {
        self.array.formation()
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Element layer count.
    pub fn depth(&self) -> i32 {
        self.array.depth()
    }

    /// Index of the top layer.
    pub fn top_layer(&self) -> i32 {
        self.array.depth() - 1
    }

    /// The node array.
    pub fn array(&self) -> &FormationNodeArray {
        &self.array
    }

    /// Mutable node array.
    pub fn array_mut(&mut self) -> &mut FormationNodeArray {
        &mut self.array
    }

    /// Expels charge.
    pub fn is_source_rock(&self) -> bool {
        self.source_rock
    }

    /// User-designated reservoir formation.
    pub fn is_reservoir(&self) -> bool {
        self.reservoir
    }

    /// A reservoir was identified or detected in this formation.
    pub fn hosts_reservoir(&self) -> bool {
        self.hosts_reservoir
    }

    /// Record whether the formation hosts a reservoir.
    pub fn set_hosts_reservoir(&mut self, hosts: bool) {
        self.hosts_reservoir = hosts;
    }

    /// Blocking thresholds.
    pub fn blocking(&self) -> BlockingThresholds {
        self.blocking
    }

    /// Corner values of `property` for node `(i, j, k)`.
    pub fn corner_values(
        &self,
        properties: &dyn PropertySource,
        property: PropertyId,
        i: i32,
        j: i32,
        k: i32,
    ) -> [f64; 8] {
        let id = self.id();
        NODE_CORNERS.map(|(ci, cj, ck)| properties.value(id, property, i + ci, j + cj, k + ck))
    }

    /// Geometry of node `(i, j, k)`.
    pub fn element(
        &self,
        properties: &dyn PropertySource,
        spacing: (f64, f64),
        i: i32,
        j: i32,
        k: i32,
    ) -> HexElement {
        let depths = self.corner_values(properties, PropertyId::Depth, i, j, k);
        HexElement::new(spacing.0, spacing.1, depths)
    }

    /// Populate every owned node from the property maps.
    pub fn compute_properties(&mut self, properties: &dyn PropertySource, spacing: (f64, f64)) {
        let id = self.id();
        let mut computed = Vec::with_capacity(self.array.locals().count());
        for node in self.array.locals() {
            let NodeKey { i, j, k, .. } = node.key();
            let depths = self.corner_values(properties, PropertyId::Depth, i, j, k);
            let element = HexElement::new(spacing.0, spacing.1, depths);
            let at = |p: PropertyId| properties.value(id, p, i, j, k);
            let mut props = node.props.clone();
            props.corner_depths = depths;
            props.valid = element.is_defined();
            props.has_thickness = props.valid && (0..4).any(|c| depths[c] != depths[c + 4]);
            props.depth = HexElement::interpolate(&depths, CENTRE);
            props.horizontal_permeability = at(PropertyId::HorizontalPermeability);
            props.vertical_permeability = at(PropertyId::VerticalPermeability);
            props.porosity = at(PropertyId::Porosity);
            props.temperature = at(PropertyId::Temperature);
            props.pressure = at(PropertyId::Pressure);
            props.overpressure = at(PropertyId::Overpressure);
            props.water_density = at(PropertyId::WaterDensity);
            props.gas_density = at(PropertyId::GasDensity);
            props.oil_density = at(PropertyId::OilDensity);
            props.capillary_gas = at(PropertyId::CapillaryPressureGas100);
            props.capillary_oil = at(PropertyId::CapillaryPressureOil100);
            props.fault = properties.fault_status(id, i, j);
            computed.push(props);
        }
        for (node, props) in self.array.locals_mut().zip(computed) {
            node.props = props;
        }
    }

    /// `true` when the node's own properties block flow.
    pub fn blocks(&self, node: &LocalNode) -> bool {
        let p = &node.props;
        p.vertical_permeability <= self.blocking.permeability
            || p.porosity <= self.blocking.porosity
            || p.fault.blocks_flow()
    }

    /// Make every owned node of layer `k` a migration terminus.
    pub fn set_end_of_path(&mut self, k: i32) {
        let keys: Vec<NodeKey> = self.array.layer_keys(k).collect();
        for key in keys {
            if let Some(node) = self.array.get_local_node_mut(key.i, key.j, key.k) {
                node.path.end_of_path = true;
                node.path.target = Some(key);
                node.path.next = Some(Next::Terminal { eliminated: false });
            }
        }
    }
}
