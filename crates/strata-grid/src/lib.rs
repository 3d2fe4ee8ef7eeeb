//! Partitioned formation node grids for the Strata flow-path engine.
//!
//! The `(i, j)` column grid is split into rectangles by a
//! [`PartitionLayout`]; each rank builds a [`FormationStack`] holding the
//! [`LocalNode`]s of its rectangle for every formation, plus
//! [`ProxyNode`]s for remote cells it has looked at. Node properties come
//! from a shared read-only [`PropertySource`] and a trilinear
//! [`HexElement`] per node.
//!
//! The stack answers peer requests for its owned nodes by implementing
//! [`strata_comm::RequestHandler`].

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod array;
pub mod element;
pub mod error;
pub mod formation;
pub mod layout;
pub mod node;
pub mod offsets;
pub mod properties;
mod serve;
pub mod stack;

pub use array::FormationNodeArray;
pub use element::HexElement;
pub use error::GridError;
pub use formation::{BlockingThresholds, Formation, FormationSpec};
pub use layout::{PartitionLayout, Rect};
pub use node::{
    CacheSet, CacheSlot, Candidate, FormationNode, LocalNode, Next, NodeProperties, PathState,
    ProxyNode, ReservoirState,
};
pub use properties::{PropertySource, PropertyVolume, PropertyVolumeBuilder};
pub use stack::{FormationStack, FormationStackBuilder};
