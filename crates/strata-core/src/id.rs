//! Strongly-typed identifiers and the global [`NodeKey`] address.

use std::fmt;

/// Identifies a formation within the stratigraphic stack.
///
/// `FormationId(0)` is the shallowest formation; ids increase with
/// depth. The id doubles as the formation index carried by protocol
/// requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FormationId(pub u32);

impl FormationId {
    /// Position of this formation in stack-ordered storage.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FormationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for FormationId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Rank of one grid partition within a cluster.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Rank(pub u32);

impl Rank {
    /// Position of this rank in rank-ordered storage.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for Rank {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Global address of one formation node.
///
/// Keys are ordered by formation, then `i`, `j`, `k`. That order is
/// partition independent, which makes it usable for canonical choices
/// such as picking the node that repairs a cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey {
    /// Owning formation.
    pub formation: FormationId,
    /// Global `i` index.
    pub i: i32,
    /// Global `j` index.
    pub j: i32,
    /// Depth index within the formation, `0` at the base.
    pub k: i32,
}

impl NodeKey {
    /// Create a key from its parts.
    pub const fn new(formation: FormationId, i: i32, j: i32, k: i32) -> Self {
        Self { formation, i, j, k }
    }

    /// The key displaced by a grid offset within the same formation.
    ///
    /// The result may lie outside the formation; callers resolve it
    /// through the formation stack.
    pub fn offset(self, di: i32, dj: i32, dk: i32) -> Self {
        Self {
            formation: self.formation,
            i: self.i + di,
            j: self.j + dj,
            k: self.k + dk,
        }
    }

    /// The `(i, j)` column this key belongs to.
    pub fn column(self) -> (i32, i32) {
        (self.i, self.j)
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "formation {} ({}, {}, {})",
            self.formation, self.i, self.j, self.k
        )
    }
}
