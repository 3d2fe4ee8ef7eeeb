//! Rank-to-rank request/response transport for Strata node graphs.
//!
//! Each rank owns one partition of the grid. A rank reads a node owned
//! by another rank by sending a [`Request`] inside a [`Session`] and
//! blocking until the owner answers with a [`Response`]. While it
//! waits, the rank answers inbound requests through its
//! [`RequestHandler`], so two ranks querying each other make progress.
//! Collective [`Endpoint::all_reduce`] calls synchronise the convergence
//! loops.
//!
//! A request is not cancellable. With the default [`CommConfig`] a peer
//! that never answers blocks the step forever; setting
//! [`CommConfig::stall_timeout`] turns that into [`CommError::Stalled`].

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod message;
pub mod session;
pub mod transport;

pub use config::CommConfig;
pub use error::CommError;
pub use message::{Request, RequestHandler, Response, Value, ValueSpec};
pub use session::Session;
pub use transport::{mesh, CommStats, Endpoint, ReduceOp};
