//! Error types for the rank transport.

use std::fmt;
use std::time::Duration;

use strata_core::{NodeKey, Rank};

/// Errors arising from sessions, reductions and message exchange.
///
/// Every variant is a protocol failure that aborts the current
/// migration step on this rank.
#[derive(Clone, Debug, PartialEq)]
pub enum CommError {
    /// A mesh was requested with zero ranks.
    EmptyMesh,
    /// A session was opened while another one was still open.
    SessionReentry {
        /// Tag of the open session.
        open: &'static str,
        /// Tag of the rejected session.
        requested: &'static str,
    },
    /// A collective reduction was attempted inside a session.
    ReduceInSession {
        /// Tag of the open session.
        open: &'static str,
    },
    /// A rank outside the mesh was addressed.
    UnknownRank {
        /// The addressed rank.
        rank: Rank,
        /// Ranks in the mesh.
        size: u32,
    },
    /// A peer's inbox is gone.
    Disconnected {
        /// The unreachable peer.
        peer: Rank,
    },
    /// Every peer has dropped its endpoint.
    MeshClosed,
    /// A peer gave up on the current step.
    PeerAborted {
        /// The aborting peer.
        peer: Rank,
    },
    /// No message arrived within the configured stall timeout.
    Stalled {
        /// What this rank was waiting in.
        tag: &'static str,
        /// How long it waited.
        waited: Duration,
    },
    /// A response named a different node than its request.
    MismatchedResponse {
        /// The requested node.
        requested: NodeKey,
        /// The node the response echoed.
        answered: NodeKey,
    },
    /// A response payload had the wrong variant for its request.
    UnexpectedValue {
        /// The expected variant.
        expected: &'static str,
        /// The variant received.
        found: &'static str,
    },
    /// A message arrived that no wait state accepts.
    UnexpectedMessage {
        /// What this rank was waiting in.
        tag: &'static str,
        /// Message kind.
        kind: &'static str,
    },
    /// Transport configuration failed validation.
    InvalidConfig {
        /// What went wrong.
        reason: String,
    },
}

impl fmt::Display for CommError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyMesh => write!(f, "a mesh needs at least one rank"),
            Self::SessionReentry { open, requested } => {
                write!(f, "cannot begin session '{requested}' while '{open}' is open")
            }
            Self::ReduceInSession { open } => {
                write!(f, "collective reduction inside open session '{open}'")
            }
            Self::UnknownRank { rank, size } => {
                write!(f, "rank {rank} is outside a mesh of {size}")
            }
            Self::Disconnected { peer } => write!(f, "rank {peer} is disconnected"),
            Self::MeshClosed => write!(f, "every peer has left the mesh"),
            Self::PeerAborted { peer } => write!(f, "rank {peer} aborted"),
            Self::Stalled { tag, waited } => {
                write!(f, "no message for {waited:?} while waiting in '{tag}'")
            }
            Self::MismatchedResponse {
                requested,
                answered,
            } => write!(f, "response for {answered} answered a request for {requested}"),
            Self::UnexpectedValue { expected, found } => {
                write!(f, "expected a {expected} value, got {found}")
            }
            Self::UnexpectedMessage { tag, kind } => {
                write!(f, "unexpected {kind} message while waiting in '{tag}'")
            }
            Self::InvalidConfig { reason } => write!(f, "invalid transport config: {reason}"),
        }
    }
}

impl std::error::Error for CommError {}
