//! Errors of a migration step.

use std::error::Error;
use std::fmt;

use strata_comm::CommError;
use strata_core::{FormationId, Rank};
use strata_grid::GridError;

use crate::config::ConfigError;

/// Errors that abort a migration step.
#[derive(Clone, Debug, PartialEq)]
pub enum MigrationError {
    /// Rank-to-rank traffic failed or the protocol was misused.
    Comm(CommError),
    /// The grid or formation stack could not be built.
    Grid(GridError),
    /// The configuration is invalid.
    Config(ConfigError),
    /// A layer was still unresolved after the round limit.
    NoConvergence {
        /// Formation of the layer.
        formation: FormationId,
        /// Layer index.
        k: i32,
        /// Rounds run.
        rounds: u32,
        /// Nodes still unresolved across all ranks.
        unresolved: u64,
    },
    /// A rank thread panicked.
    RankPanicked {
        /// The rank.
        rank: Rank,
    },
    /// A rank thread could not be spawned.
    ThreadSpawn {
        /// The rank.
        rank: Rank,
        /// OS error text.
        reason: String,
    },
}

impl fmt::Display for MigrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Comm(e) => write!(f, "comm: {e}"),
            Self::Grid(e) => write!(f, "grid: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
            Self::NoConvergence {
                formation,
                k,
                rounds,
                unresolved,
            } => write!(
                f,
                "layer {k} of formation {formation} still has {unresolved} unresolved nodes after {rounds} rounds"
            ),
            Self::RankPanicked { rank } => write!(f, "rank {rank} panicked"),
            Self::ThreadSpawn { rank, reason } => {
                write!(f, "thread of rank {rank} could not be spawned: {reason}")
            }
        }
    }
}

impl Error for MigrationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Comm(e) => Some(e),
            Self::Grid(e) => Some(e),
            Self::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CommError> for MigrationError {
    fn from(e: CommError) -> Self {
        Self::Comm(e)
    }
}

impl From<GridError> for MigrationError {
    fn from(e: GridError) -> Self {
        Self::Grid(e)
    }
}

impl From<ConfigError> for MigrationError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_chains_to_comm() {
        let e = MigrationError::from(CommError::MeshClosed);
        assert!(e.source().is_some());
        assert!(e.to_string().starts_with("comm: "));
    }

    #[test]
    fn no_convergence_names_the_layer() {
        let e = MigrationError::NoConvergence {
            formation: FormationId(2),
            k: 3,
            rounds: 10,
            unresolved: 4,
        };
        let text = e.to_string();
        assert!(text.contains("layer 3"));
        assert!(text.contains("4 unresolved"));
        assert!(e.source().is_none());
    }
}
