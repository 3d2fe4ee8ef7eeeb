//! Error types for grid construction and partitioning.

use std::fmt;

use strata_core::FormationId;

/// Errors arising while building a partition layout, property volume
/// or formation stack.
#[derive(Clone, Debug, PartialEq)]
pub enum GridError {
    /// A layout was requested for zero ranks.
    ZeroRanks,
    /// The grid has a zero-length axis.
    EmptyGrid {
        /// Node count along `i`.
        ni: i32,
        /// Node count along `j`.
        nj: i32,
    },
    /// More ranks than columns along an axis, leaving a partition empty.
    TooManyRanks {
        /// Requested rank count.
        ranks: u32,
        /// Node count along `i`.
        ni: i32,
        /// Node count along `j`.
        nj: i32,
    },
    /// A rank outside the layout was referenced.
    UnknownRank {
        /// The offending rank index.
        rank: u32,
        /// Ranks in the layout.
        ranks: u32,
    },
    /// A formation was declared with no element layers.
    ZeroDepth {
        /// Formation name.
        name: String,
    },
    /// The stack was built with no formations.
    NoFormations,
    /// A formation referenced by the stack is missing from the property source.
    MissingFormation {
        /// The formation id.
        formation: FormationId,
    },
    /// The property source and the stack disagree on a formation's depth.
    DepthMismatch {
        /// The formation id.
        formation: FormationId,
        /// Element layers declared in the stack.
        declared: i32,
        /// Element layers present in the property source.
        available: i32,
    },
    /// A grid spacing was zero, negative or not finite.
    InvalidSpacing {
        /// Spacing along `i`.
        dx: f64,
        /// Spacing along `j`.
        dy: f64,
    },
}

impl fmt::Display for GridError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroRanks => write!(f, "a partition layout needs at least one rank"),
            Self::EmptyGrid { ni, nj } => write!(f, "grid {ni}x{nj} has no nodes"),
            Self::TooManyRanks { ranks, ni, nj } => {
                write!(f, "{ranks} ranks leave an empty partition on a {ni}x{nj} grid")
            }
            Self::UnknownRank { rank, ranks } => {
                write!(f, "rank {rank} is outside a layout of {ranks} ranks")
            }
            Self::ZeroDepth { name } => write!(f, "formation '{name}' has no element layers"),
            Self::NoFormations => write!(f, "a formation stack needs at least one formation"),
            Self::MissingFormation { formation } => {
                write!(f, "formation {formation} has no property volume")
            }
            Self::DepthMismatch {
                formation,
                declared,
                available,
            } => write!(
                f,
                "formation {formation} declares {declared} layers but properties cover {available}"
            ),
            Self::InvalidSpacing { dx, dy } => {
                write!(f, "invalid grid spacing ({dx}, {dy})")
            }
        }
    }
}

impl std::error::Error for GridError {}
