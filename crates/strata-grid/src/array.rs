//! The partitioned node array of one formation.

use indexmap::IndexMap;
use strata_core::{FormationId, NodeKey};

use crate::layout::Rect;
use crate::node::{FormationNode, LocalNode, ProxyNode};

/// Local nodes of one formation plus a lazily filled proxy table.
///
/// Local nodes cover the owned rectangle across the full depth. Proxies
/// are created on first access, keyed by `(i, j)` per depth level, and
/// live as long as the array; clearing properties only invalidates
/// their cached values.
#[derive(Clone, Debug)]
pub struct FormationNodeArray {
    formation: FormationId,
    ni: i32,
    nj: i32,
    depth: i32,
    rect: Rect,
    locals: Vec<LocalNode>,
    proxies: Vec<IndexMap<(i32, i32), ProxyNode>>,
}

impl FormationNodeArray {
    /// Allocate local nodes for `rect` over `depth` layers of a global
    /// `ni x nj` grid.
    pub fn new(formation: FormationId, grid: (i32, i32), rect: Rect, depth: i32) -> Self {
        let (ni, nj) = grid;
        let mut locals = Vec::with_capacity(rect.len() * depth.max(0) as usize);
        for k in 0..depth {
            for (i, j) in rect.columns() {
                locals.push(LocalNode::new(NodeKey::new(formation, i, j, k)));
            }
        }
        Self {
            formation,
            ni,
            nj,
            depth,
            rect,
            locals,
            proxies: (0..depth).map(|_| IndexMap::new()).collect(),
        }
    }

    /// Owning formation.
    pub fn formation(&self) -> FormationId {
        self.formation
    }

    /// Element layer count.
    pub fn depth(&self) -> i32 {
        self.depth
    }

    /// Owned rectangle.
    pub fn rect(&self) -> Rect {
        self.rect
    }

    /// Global grid size `(ni, nj)`.
    pub fn grid_size(&self) -> (i32, i32) {
        (self.ni, self.nj)
    }

    /// `true` if `(i, j, k)` is inside the formation's global range.
    pub fn in_global_range(&self, i: i32, j: i32, k: i32) -> bool {
        (0..self.ni).contains(&i) && (0..self.nj).contains(&j) && (0..self.depth).contains(&k)
    }

    /// `true` if column `(i, j)` is owned here.
    pub fn is_local(&self, i: i32, j: i32) -> bool {
        self.rect.contains(i, j)
    }

    fn local_index(&self, i: i32, j: i32, k: i32) -> Option<usize> {
        if !self.rect.contains(i, j) || !(0..self.depth).contains(&k) {
            return None;
        }
        let row = (i - self.rect.first_i) * self.rect.width_j() + (j - self.rect.first_j);
        Some(k as usize * self.rect.len() + row as usize)
    }

    /// The owned node at `(i, j, k)`; never allocates a proxy.
    pub fn get_local_node(&self, i: i32, j: i32, k: i32) -> Option<&LocalNode> {
        self.local_index(i, j, k).map(|idx| &self.locals[idx])
    }

    /// Mutable access to an owned node.
    pub fn get_local_node_mut(&mut self, i: i32, j: i32, k: i32) -> Option<&mut LocalNode> {
        self.local_index(i, j, k).map(move |idx| &mut self.locals[idx])
    }

    /// The node at `(i, j, k)`, creating a proxy for a remote coordinate.
    /// `None` outside the global range.
    pub fn get_node(&mut self, i: i32, j: i32, k: i32) -> Option<FormationNode<'_>> {
        if let Some(idx) = self.local_index(i, j, k) {
            return Some(FormationNode::Local(&self.locals[idx]));
        }
        self.proxy_mut(i, j, k).map(|p| FormationNode::Proxy(p))
    }

    /// The proxy for a remote `(i, j, k)`, created on first use. `None`
    /// for owned or out-of-range coordinates.
    pub fn proxy_mut(&mut self, i: i32, j: i32, k: i32) -> Option<&mut ProxyNode> {
        if !self.in_global_range(i, j, k) || self.is_local(i, j) {
            return None;
        }
        let formation = self.formation;
        Some(
            self.proxies[k as usize]
                .entry((i, j))
                .or_insert_with(|| ProxyNode::new(NodeKey::new(formation, i, j, k))),
        )
    }

    /// The proxy for `(i, j, k)` if one was created.
    pub fn proxy(&self, i: i32, j: i32, k: i32) -> Option<&ProxyNode> {
        let table = self.proxies.get(usize::try_from(k).ok()?)?;
        table.get(&(i, j))
    }

    /// Number of live proxies.
    pub fn proxy_count(&self) -> usize {
        self.proxies.iter().map(IndexMap::len).sum()
    }

    /// Drop every proxy's cached values, keeping the proxies.
    pub fn invalidate_proxies(&mut self) {
        for table in &mut self.proxies {
            for proxy in table.values_mut() {
                proxy.invalidate();
            }
        }
    }

    /// Reset every owned node and invalidate every proxy.
    pub fn clear_properties(&mut self) {
        for node in &mut self.locals {
            node.clear();
        }
        self.invalidate_proxies();
    }

    /// Reset reservoir and crest flags of every owned node.
    pub fn clear_reservoir_properties(&mut self) {
        for node in &mut self.locals {
            node.reservoir = Default::default();
        }
        self.invalidate_proxies();
    }

    /// Owned nodes, layer by layer.
    pub fn locals(&self) -> impl Iterator<Item = &LocalNode> {
        self.locals.iter()
    }

    /// Mutable owned nodes, layer by layer.
    pub fn locals_mut(&mut self) -> impl Iterator<Item = &mut LocalNode> {
        self.locals.iter_mut()
    }

    /// Keys of the owned nodes of layer `k` in sweep order.
    pub fn layer_keys(&self, k: i32) -> impl Iterator<Item = NodeKey> + '_ {
        let formation = self.formation;
        let rows = if (0..self.depth).contains(&k) {
            self.rect.len()
        } else {
            0
        };
        self.rect
            .columns()
            .take(rows)
            .map(move |(i, j)| NodeKey::new(formation, i, j, k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn half_grid() -> FormationNodeArray {
        let rect = Rect {
            first_i: 0,
            last_i: 1,
            first_j: 0,
            last_j: 2,
        };
        FormationNodeArray::new(FormationId(2), (4, 3), rect, 2)
    }

    #[test]
    fn local_nodes_carry_their_keys() {
        let a = half_grid();
        let n = a.get_local_node(1, 2, 1).unwrap();
        assert_eq!(n.key(), NodeKey::new(FormationId(2), 1, 2, 1));
        assert_eq!(a.locals().count(), 12);
    }

    #[test]
    fn remote_coordinates_become_proxies() {
        let mut a = half_grid();
        assert!(a.get_local_node(2, 0, 0).is_none());
        match a.get_node(2, 0, 0) {
            Some(FormationNode::Proxy(p)) => {
                assert_eq!(p.key(), NodeKey::new(FormationId(2), 2, 0, 0))
            }
            other => panic!("expected proxy, got {other:?}"),
        }
        assert!(a.get_node(0, 0, 0).unwrap().is_local());
        assert_eq!(a.proxy_count(), 1);
    }

    #[test]
    fn proxy_creation_is_idempotent() {
        let mut a = half_grid();
        for _ in 0..3 {
            a.get_node(3, 1, 1);
        }
        a.get_node(3, 1, 0);
        assert_eq!(a.proxy_count(), 2);
        assert!(a.proxy(3, 1, 1).is_some());
        assert!(a.proxy(3, 2, 1).is_none());
    }

    #[test]
    fn out_of_range_is_not_found() {
        let mut a = half_grid();
        assert!(a.get_node(4, 0, 0).is_none());
        assert!(a.get_node(0, 0, 2).is_none());
        assert!(a.get_node(-1, 0, 0).is_none());
        assert!(a.proxy_mut(0, 0, 0).is_none());
        assert_eq!(a.proxy_count(), 0);
    }

    #[test]
    fn clearing_keeps_proxies_but_drops_their_values() {
        use strata_comm::{Value, ValueSpec};
        let mut a = half_grid();
        a.proxy_mut(2, 2, 0)
            .unwrap()
            .store(&ValueSpec::Depth, &Value::Scalar(10.0));
        a.get_local_node_mut(0, 0, 0).unwrap().path.end_of_path = true;
        a.clear_properties();
        assert_eq!(a.proxy_count(), 1);
        assert!(a.proxy(2, 2, 0).unwrap().cached_slots().is_empty());
        assert!(!a.get_local_node(0, 0, 0).unwrap().path.end_of_path);
    }

    #[test]
    fn layer_keys_sweep_owned_columns() {
        let a = half_grid();
        let keys: Vec<_> = a.layer_keys(1).map(|k| (k.i, k.j, k.k)).collect();
        assert_eq!(keys.len(), 6);
        assert_eq!(keys[0], (0, 0, 1));
        assert_eq!(keys[1], (0, 1, 1));
        assert_eq!(keys[5], (1, 2, 1));
        assert_eq!(a.layer_keys(2).count(), 0);
    }
}
