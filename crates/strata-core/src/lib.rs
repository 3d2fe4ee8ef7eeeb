//! Core types for the Strata hydrocarbon flow-path engine.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the vocabulary shared by the grid, transport and migration crates:
//! identifiers and node keys, species compositions, property and fault
//! identifiers, small fixed-size vector algebra, and the numeric
//! sentinels used for undefined map values.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod composition;
pub mod constants;
pub mod id;
pub mod property;
pub mod vector;

pub use composition::{Composition, Species};
pub use constants::{is_undefined, GRAVITY, NUMERICAL_TOLERANCE, PA_TO_MPA, UNDEFINED};
pub use id::{FormationId, NodeKey, Rank};
pub use property::{FaultStatus, Phase, PropertyId};
pub use vector::{Tensor3, Vec3};
