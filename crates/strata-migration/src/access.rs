//! Reading nodes of any rank.
//!
//! [`NodeAccess`] pairs this rank's [`FormationStack`] with an open
//! [`Session`]. Owned nodes are answered directly from the stack. Remote
//! nodes go through their proxy: a cached value is returned as is, a
//! miss sends one request to the owner and caches the answer where the
//! field allows it.

use strata_comm::{CommError, Request, RequestHandler, Session, Value, ValueSpec};
use strata_core::{Composition, FaultStatus, NodeKey, Phase, PropertyId, Vec3, UNDEFINED};
use strata_grid::{FormationNode, FormationStack};

/// Typed node reads inside one session.
pub struct NodeAccess<'a, 's> {
    stack: &'a mut FormationStack,
    session: &'a mut Session<'s>,
    hits: u64,
    misses: u64,
}

impl<'a, 's> NodeAccess<'a, 's> {
    /// Read through `session`, serving peers from `stack`.
    pub fn new(stack: &'a mut FormationStack, session: &'a mut Session<'s>) -> Self {
        Self {
            stack,
            session,
            hits: 0,
            misses: 0,
        }
    }

    /// This rank's stack.
    pub fn stack(&self) -> &FormationStack {
        self.stack
    }

    /// This rank's stack, mutably.
    pub fn stack_mut(&mut self) -> &mut FormationStack {
        self.stack
    }

    /// Proxy reads answered from the cache.
    pub fn cache_hits(&self) -> u64 {
        self.hits
    }

    /// Proxy reads that needed a round trip.
    pub fn cache_misses(&self) -> u64 {
        self.misses
    }

    /// One field of the node at `key`. Keys outside the grid or the
    /// stack answer [`Value::Invalid`].
    pub fn fetch(&mut self, key: NodeKey, spec: ValueSpec) -> Result<Value, CommError> {
        let request = Request::new(key, spec);
        let cached = match self.stack.get_node(key) {
            None => return Ok(Value::Invalid),
            Some(FormationNode::Local(_)) => return Ok(self.stack.handle(&request)),
            Some(FormationNode::Proxy(proxy)) => proxy.cached(&spec).cloned(),
        };
        if let Some(value) = cached {
            self.hits += 1;
            return Ok(value);
        }
        let Some(owner) = self.stack.owner(key) else {
            return Ok(Value::Invalid);
        };
        self.misses += 1;
        let value = self.session.request(owner, request, &*self.stack)?;
        if let Some(proxy) = self.stack.proxy_mut(key) {
            proxy.store(&spec, &value);
        }
        Ok(value)
    }

    fn scalar(&mut self, key: NodeKey, spec: ValueSpec) -> Result<f64, CommError> {
        match self.fetch(key, spec)? {
            Value::Invalid => Ok(UNDEFINED),
            v => v.scalar(),
        }
    }

    fn flag(&mut self, key: NodeKey, spec: ValueSpec) -> Result<bool, CommError> {
        match self.fetch(key, spec)? {
            Value::Invalid => Ok(false),
            v => v.flag(),
        }
    }

    fn vector(&mut self, key: NodeKey, spec: ValueSpec) -> Result<Vec3, CommError> {
        match self.fetch(key, spec)? {
            Value::Invalid => Ok(Vec3::UNDEFINED),
            v => v.vector(),
        }
    }

    fn node(&mut self, key: NodeKey, spec: ValueSpec) -> Result<Option<NodeKey>, CommError> {
        match self.fetch(key, spec)? {
            Value::Invalid => Ok(None),
            v => v.node(),
        }
    }

    /// Resolved target, `None` while unresolved.
    pub fn target(&mut self, key: NodeKey) -> Result<Option<NodeKey>, CommError> {
        self.node(key, ValueSpec::TargetFormationNode)
    }

    /// Where charge entering the node goes next, `None` for terminals.
    pub fn adjacent(&mut self, key: NodeKey) -> Result<Option<NodeKey>, CommError> {
        self.node(key, ValueSpec::AdjacentNode)
    }

    /// Centre depth of the node or the first node with thickness above.
    pub fn depth(&mut self, key: NodeKey) -> Result<f64, CommError> {
        self.scalar(key, ValueSpec::Depth)
    }

    /// All corner depths are defined.
    pub fn is_valid(&mut self, key: NodeKey) -> Result<bool, CommError> {
        self.flag(key, ValueSpec::IsValid)
    }

    /// The node blocks flow.
    pub fn is_impermeable(&mut self, key: NodeKey) -> Result<bool, CommError> {
        self.flag(key, ValueSpec::IsImpermeable)
    }

    /// The node has zero thickness.
    pub fn has_no_thickness(&mut self, key: NodeKey) -> Result<bool, CommError> {
        self.flag(key, ValueSpec::HasNoThickness)
    }

    /// The node is impermeable or its attempted neighbour does not exist.
    pub fn has_nowhere_to_go(&mut self, key: NodeKey) -> Result<bool, CommError> {
        self.flag(key, ValueSpec::HasNowhereToGo)
    }

    /// The attempted neighbour lies off the grid or the stack.
    pub fn goes_out_of_bounds(&mut self, key: NodeKey) -> Result<bool, CommError> {
        self.flag(key, ValueSpec::GoesOutOfBounds)
    }

    /// Migration terminus.
    pub fn is_end_of_path(&mut self, key: NodeKey) -> Result<bool, CommError> {
        self.flag(key, ValueSpec::IsEndOfPath)
    }

    /// Charge reaching the node is discarded.
    pub fn is_eliminated(&mut self, key: NodeKey) -> Result<bool, CommError> {
        self.flag(key, ValueSpec::IsEliminated)
    }

    /// Reservoir flag for one phase.
    pub fn is_reservoir(&mut self, key: NodeKey, phase: Phase) -> Result<bool, CommError> {
        let spec = match phase {
            Phase::Gas => ValueSpec::IsReservoirGas,
            Phase::Oil => ValueSpec::IsReservoirOil,
        };
        self.flag(key, spec)
    }

    /// Column height the seal supports for one phase.
    pub fn height(&mut self, key: NodeKey, phase: Phase) -> Result<f64, CommError> {
        let spec = match phase {
            Phase::Gas => ValueSpec::HeightGas,
            Phase::Oil => ValueSpec::HeightOil,
        };
        self.scalar(key, spec)
    }

    /// Fault classification of the node's column.
    pub fn fault(&mut self, key: NodeKey) -> Result<FaultStatus, CommError> {
        match self.fetch(key, ValueSpec::FaultStatus)? {
            Value::Invalid => Ok(FaultStatus::NoFault),
            v => v.fault(),
        }
    }

    /// Analog flow direction.
    pub fn flow_direction(&mut self, key: NodeKey) -> Result<Vec3, CommError> {
        self.vector(key, ValueSpec::AnalogFlowDirection)
    }

    /// A property interpolated at the face, edge or corner of the node's
    /// element named by a neighbour offset. `dk = -1` is the top.
    pub fn fe_value(
        &mut self,
        key: NodeKey,
        property: PropertyId,
        offset: (i32, i32, i32),
    ) -> Result<f64, CommError> {
        let clamp = |d: i32| d.clamp(-1, 1) as i8;
        let spec = ValueSpec::FiniteElementValue {
            property,
            offset: [clamp(offset.0), clamp(offset.1), clamp(offset.2)],
        };
        self.scalar(key, spec)
    }

    /// Smallest corner value of a property.
    pub fn fe_minimum(&mut self, key: NodeKey, property: PropertyId) -> Result<f64, CommError> {
        self.scalar(key, ValueSpec::FiniteElementMinimumValue(property))
    }

    /// Gradient of a property at the element centre.
    pub fn fe_gradient(&mut self, key: NodeKey, property: PropertyId) -> Result<Vec3, CommError> {
        self.vector(key, ValueSpec::FiniteElementGrad(property))
    }

    /// Charge waiting at the node.
    pub fn composition(&mut self, key: NodeKey) -> Result<Composition, CommError> {
        match self.fetch(key, ValueSpec::Composition)? {
            Value::Invalid => Ok(Composition::new()),
            v => v.into_composition(),
        }
    }
}

impl std::fmt::Debug for NodeAccess<'_, '_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeAccess")
            .field("rank", &self.stack.rank())
            .field("session", &self.session.tag())
            .field("hits", &self.hits)
            .field("misses", &self.misses)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use strata_comm::{mesh, CommConfig};
    use strata_core::{FormationId, Rank};
    use strata_grid::{FormationSpec, PartitionLayout, PropertyVolume};

    fn stack(ranks: u32, rank: u32) -> FormationStack {
        let mut v = PropertyVolume::builder(4, 3).formation(1, 1.0).build().unwrap();
        v.fill(FormationId(0), PropertyId::Depth, |i, _, l| {
            100.0 + 10.0 * f64::from(1 - l) + f64::from(i)
        });
        v.fill(FormationId(0), PropertyId::VerticalPermeability, |_, _, _| 1.0);
        v.fill(FormationId(0), PropertyId::Porosity, |_, _, _| 0.2);
        let layout = PartitionLayout::new(4, 3, ranks).unwrap();
        let mut s = FormationStack::builder(layout, Rank(rank), Arc::new(v))
            .formation(FormationSpec::new("carrier", 1))
            .build()
            .unwrap();
        s.compute_properties();
        s
    }

    #[test]
    fn local_reads_skip_the_cache() {
        let mut endpoints = mesh(1, CommConfig::default()).unwrap();
        let mut s = stack(1, 0);
        let mut session = endpoints[0].begin("local").unwrap();
        let mut access = NodeAccess::new(&mut s, &mut session);
        let key = NodeKey::new(FormationId(0), 1, 1, 0);
        assert!(access.is_valid(key).unwrap());
        assert_eq!(access.depth(key).unwrap(), 106.5);
        assert_eq!(access.cache_hits() + access.cache_misses(), 0);
        assert_eq!(access.stack().proxy_count(), 0);
        drop(access);
        session.finish(&s).unwrap();
    }

    #[test]
    fn out_of_range_reads_are_invalid() {
        let mut endpoints = mesh(1, CommConfig::default()).unwrap();
        let mut s = stack(1, 0);
        let mut session = endpoints[0].begin("range").unwrap();
        let mut access = NodeAccess::new(&mut s, &mut session);
        let key = NodeKey::new(FormationId(0), 9, 0, 0);
        assert!(!access.is_valid(key).unwrap());
        assert_eq!(access.depth(key).unwrap(), UNDEFINED);
        assert_eq!(access.target(key).unwrap(), None);
        drop(access);
        session.finish(&s).unwrap();
    }
}
