//! Full-mesh rank transport over `crossbeam-channel`.
//!
//! ```text
//!   rank 0 ──Request──────────▶ rank 1
//!          ◀──────────Response──
//!          ──Finished(epoch)──▶  (every peer, at session end)
//!          ──Reduce(epoch, v)─▶  (every peer, per reduction)
//! ```
//!
//! Every rank owns one unbounded inbox, so sends never block and two
//! ranks requesting from each other cannot deadlock. Whenever a rank
//! waits (for a response, for session end or for a reduction) it keeps
//! serving inbound requests through its [`RequestHandler`]. Messages
//! that belong to a later wait (a `Finished` or `Reduce` from a faster
//! peer) are buffered by epoch.

use std::collections::HashMap;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use strata_core::Rank;

use crate::config::CommConfig;
use crate::error::CommError;
use crate::message::{Request, RequestHandler, Response, Value};
use crate::session::Session;

// ── Envelope ───────────────────────────────────────────────────────

#[derive(Debug)]
enum Envelope {
    Request {
        from: Rank,
        id: u64,
        request: Request,
    },
    Response {
        id: u64,
        response: Response,
    },
    Finished {
        epoch: u64,
    },
    Reduce {
        from: Rank,
        epoch: u64,
        value: f64,
    },
    Abort {
        from: Rank,
    },
}

// ── ReduceOp ───────────────────────────────────────────────────────

/// Combining operation of [`Endpoint::all_reduce`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReduceOp {
    /// Sum, accumulated in rank order on every rank.
    Sum,
    /// Maximum.
    Max,
    /// Minimum.
    Min,
}

impl ReduceOp {
    fn fold(self, values: impl Iterator<Item = f64>) -> f64 {
        match self {
            Self::Sum => values.sum(),
            Self::Max => values.fold(f64::NEG_INFINITY, f64::max),
            Self::Min => values.fold(f64::INFINITY, f64::min),
        }
    }
}

// ── CommStats ──────────────────────────────────────────────────────

/// Traffic counters of one endpoint.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommStats {
    /// Sessions opened.
    pub sessions: u64,
    /// Requests sent to peers.
    pub requests_sent: u64,
    /// Peer requests answered.
    pub requests_served: u64,
    /// Requests for nodes owned by this rank, answered in place.
    pub local_requests: u64,
    /// Collective reductions completed.
    pub reductions: u64,
}

// ── Endpoint ───────────────────────────────────────────────────────

/// One rank's connection to every other rank.
#[derive(Debug)]
pub struct Endpoint {
    rank: Rank,
    outboxes: Vec<Option<Sender<Envelope>>>,
    inbox: Receiver<Envelope>,
    config: CommConfig,
    next_request: u64,
    next_reduction: u64,
    pub(crate) sessions_opened: u64,
    pub(crate) open: Option<&'static str>,
    finished: HashMap<u64, u32>,
    reductions: HashMap<u64, Vec<Option<f64>>>,
    pub(crate) stats: CommStats,
}

/// Build a fully connected mesh of `size` endpoints; element `r` is rank `r`.
pub fn mesh(size: u32, config: CommConfig) -> Result<Vec<Endpoint>, CommError> {
    if size == 0 {
        return Err(CommError::EmptyMesh);
    }
    config.validate()?;
    let (senders, receivers): (Vec<_>, Vec<_>) =
        (0..size).map(|_| crossbeam_channel::unbounded()).unzip();
    let endpoints = receivers
        .into_iter()
        .enumerate()
        .map(|(r, inbox)| Endpoint {
            rank: Rank(r as u32),
            outboxes: senders
                .iter()
                .enumerate()
                .map(|(p, s)| (p != r).then(|| s.clone()))
                .collect(),
            inbox,
            config: config.clone(),
            next_request: 0,
            next_reduction: 0,
            sessions_opened: 0,
            open: None,
            finished: HashMap::new(),
            reductions: HashMap::new(),
            stats: CommStats::default(),
        })
        .collect();
    Ok(endpoints)
}

impl Endpoint {
    /// This endpoint's rank.
    pub fn rank(&self) -> Rank {
        self.rank
    }

    /// Ranks in the mesh.
    pub fn size(&self) -> u32 {
        self.outboxes.len() as u32
    }

    /// Traffic counters.
    pub fn stats(&self) -> &CommStats {
        &self.stats
    }

    /// Open a handling session.
    ///
    /// Every rank must open the same sequence of sessions. Fails with
    /// [`CommError::SessionReentry`] if a previous session was leaked
    /// without finishing.
    pub fn begin(&mut self, tag: &'static str) -> Result<Session<'_>, CommError> {
        if let Some(open) = self.open {
            return Err(CommError::SessionReentry {
                open,
                requested: tag,
            });
        }
        Ok(Session::new(self, tag))
    }

    /// Combine one value per rank; every rank receives the same result.
    ///
    /// Collective: every rank must call it in the same order. Inbound
    /// requests are served while waiting.
    pub fn all_reduce<H>(&mut self, op: ReduceOp, value: f64, handler: &H) -> Result<f64, CommError>
    where
        H: RequestHandler + ?Sized,
    {
        if let Some(open) = self.open {
            return Err(CommError::ReduceInSession { open });
        }
        let epoch = self.next_reduction;
        self.next_reduction += 1;
        let from = self.rank;
        self.broadcast(|| Envelope::Reduce { from, epoch, value })?;
        let size = self.size() as usize;
        self.reductions
            .entry(epoch)
            .or_insert_with(|| vec![None; size])[from.index()] = Some(value);
        while !self
            .reductions
            .get(&epoch)
            .is_some_and(|values| values.iter().all(Option::is_some))
        {
            if self.pump("all_reduce", handler)?.is_some() {
                return Err(CommError::UnexpectedMessage {
                    tag: "all_reduce",
                    kind: "Response",
                });
            }
        }
        let values = self.reductions.remove(&epoch).unwrap_or_default();
        self.stats.reductions += 1;
        Ok(op.fold(values.into_iter().flatten()))
    }

    /// `true` on every rank iff `done` is `true` on every rank.
    pub fn all_true<H>(&mut self, done: bool, handler: &H) -> Result<bool, CommError>
    where
        H: RequestHandler + ?Sized,
    {
        let min = self.all_reduce(ReduceOp::Min, if done { 1.0 } else { 0.0 }, handler)?;
        Ok(min > 0.0)
    }

    /// Tell every peer this rank is giving up. Send failures are ignored.
    pub fn abort(&self) {
        let from = self.rank;
        for outbox in self.outboxes.iter().flatten() {
            let _ = outbox.send(Envelope::Abort { from });
        }
    }

    // ── Session internals ──────────────────────────────────────────

    pub(crate) fn exchange<H>(
        &mut self,
        tag: &'static str,
        owner: Rank,
        request: Request,
        handler: &H,
    ) -> Result<Value, CommError>
    where
        H: RequestHandler + ?Sized,
    {
        if owner.0 >= self.size() {
            return Err(CommError::UnknownRank {
                rank: owner,
                size: self.size(),
            });
        }
        if owner == self.rank {
            self.stats.local_requests += 1;
            return Ok(handler.handle(&request));
        }
        let id = self.next_request;
        self.next_request += 1;
        let from = self.rank;
        self.send(owner, Envelope::Request { from, id, request })?;
        self.stats.requests_sent += 1;
        loop {
            let Some((answered, response)) = self.pump(tag, handler)? else {
                continue;
            };
            if answered != id {
                return Err(CommError::UnexpectedMessage {
                    tag,
                    kind: "Response",
                });
            }
            if response.address != request.address {
                return Err(CommError::MismatchedResponse {
                    requested: request.address,
                    answered: response.address,
                });
            }
            return Ok(response.value);
        }
    }

    pub(crate) fn finish_session<H>(
        &mut self,
        tag: &'static str,
        epoch: u64,
        handler: &H,
    ) -> Result<(), CommError>
    where
        H: RequestHandler + ?Sized,
    {
        self.broadcast(|| Envelope::Finished { epoch })?;
        let peers = self.size() - 1;
        while self.finished.get(&epoch).copied().unwrap_or(0) < peers {
            if self.pump(tag, handler)?.is_some() {
                return Err(CommError::UnexpectedMessage {
                    tag,
                    kind: "Response",
                });
            }
        }
        self.finished.remove(&epoch);
        Ok(())
    }

    // ── Plumbing ───────────────────────────────────────────────────

    /// Receive one message, serving or buffering anything that is not a
    /// response.
    fn pump<H>(&mut self, tag: &'static str, handler: &H) -> Result<Option<(u64, Response)>, CommError>
    where
        H: RequestHandler + ?Sized,
    {
        match self.recv(tag)? {
            Envelope::Request { from, id, request } => {
                let value = handler.handle(&request);
                tracing::trace!(rank = %self.rank, %from, spec = %request.spec, "served request");
                let response = Response {
                    address: request.address,
                    value,
                };
                self.send(from, Envelope::Response { id, response })?;
                self.stats.requests_served += 1;
                Ok(None)
            }
            Envelope::Response { id, response } => Ok(Some((id, response))),
            Envelope::Finished { epoch } => {
                *self.finished.entry(epoch).or_insert(0) += 1;
                Ok(None)
            }
            Envelope::Reduce { from, epoch, value } => {
                let size = self.size() as usize;
                self.reductions
                    .entry(epoch)
                    .or_insert_with(|| vec![None; size])[from.index()] = Some(value);
                Ok(None)
            }
            Envelope::Abort { from } => {
                tracing::error!(rank = %self.rank, peer = %from, tag, "peer aborted");
                Err(CommError::PeerAborted { peer: from })
            }
        }
    }

    fn recv(&self, tag: &'static str) -> Result<Envelope, CommError> {
        match self.config.stall_timeout {
            None => self.inbox.recv().map_err(|_| CommError::MeshClosed),
            Some(waited) => self.inbox.recv_timeout(waited).map_err(|e| match e {
                RecvTimeoutError::Timeout => {
                    tracing::error!(rank = %self.rank, tag, ?waited, "no message from any peer");
                    CommError::Stalled { tag, waited }
                }
                RecvTimeoutError::Disconnected => CommError::MeshClosed,
            }),
        }
    }

    fn send(&self, to: Rank, envelope: Envelope) -> Result<(), CommError> {
        let outbox = self
            .outboxes
            .get(to.index())
            .and_then(Option::as_ref)
            .ok_or(CommError::UnknownRank {
                rank: to,
                size: self.size(),
            })?;
        outbox
            .send(envelope)
            .map_err(|_| CommError::Disconnected { peer: to })
    }

    fn broadcast(&self, make: impl Fn() -> Envelope) -> Result<(), CommError> {
        for (peer, outbox) in self.outboxes.iter().enumerate() {
            if let Some(outbox) = outbox {
                outbox.send(make()).map_err(|_| CommError::Disconnected {
                    peer: Rank(peer as u32),
                })?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;
    use strata_core::{FormationId, NodeKey};

    use crate::message::ValueSpec;

    /// Answers every depth request with the rank that owns it.
    struct RankDepth(u32);

    impl RequestHandler for RankDepth {
        fn handle(&self, request: &Request) -> Value {
            match request.spec {
                ValueSpec::Depth => Value::Scalar(f64::from(self.0)),
                _ => Value::Invalid,
            }
        }
    }

    #[test]
    fn empty_mesh_is_rejected() {
        assert!(matches!(
            mesh(0, CommConfig::default()),
            Err(CommError::EmptyMesh)
        ));
    }

    #[test]
    fn single_rank_reduces_to_its_own_value() {
        let mut endpoints = mesh(1, CommConfig::default()).unwrap();
        let ep = &mut endpoints[0];
        assert_eq!(ep.all_reduce(ReduceOp::Sum, 4.5, &RankDepth(0)).unwrap(), 4.5);
        assert!(ep.all_true(true, &RankDepth(0)).unwrap());
    }

    #[test]
    fn reductions_agree_across_ranks() {
        let endpoints = mesh(4, CommConfig::default()).unwrap();
        let handles: Vec<_> = endpoints
            .into_iter()
            .map(|mut ep| {
                thread::spawn(move || {
                    let me = ep.rank().0;
                    let handler = RankDepth(me);
                    let sum = ep.all_reduce(ReduceOp::Sum, f64::from(me), &handler).unwrap();
                    let max = ep.all_reduce(ReduceOp::Max, f64::from(me), &handler).unwrap();
                    let all = ep.all_true(me != 2, &handler).unwrap();
                    (sum, max, all)
                })
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), (6.0, 3.0, false));
        }
    }

    #[test]
    fn crossing_requests_do_not_deadlock() {
        let endpoints = mesh(2, CommConfig::default()).unwrap();
        let handles: Vec<_> = endpoints
            .into_iter()
            .map(|mut ep| {
                thread::spawn(move || {
                    let me = ep.rank().0;
                    let handler = RankDepth(me);
                    let peer = Rank(1 - me);
                    let key = NodeKey::new(FormationId(0), 0, me as i32, 0);
                    let mut session = ep.begin("crossing").unwrap();
                    let mut seen = Vec::new();
                    for _ in 0..50 {
                        let v = session
                            .request(peer, Request::new(key, ValueSpec::Depth), &handler)
                            .unwrap();
                        seen.push(v.scalar().unwrap());
                    }
                    session.finish(&handler).unwrap();
                    (seen, ep.stats().clone())
                })
            })
            .collect();
        for (rank, h) in handles.into_iter().enumerate() {
            let (seen, stats) = h.join().unwrap();
            let peer = 1.0 - rank as f64;
            assert!(seen.iter().all(|&v| v == peer));
            assert_eq!(stats.requests_sent, 50);
            assert_eq!(stats.requests_served, 50);
            assert_eq!(stats.sessions, 1);
        }
    }

    #[test]
    fn local_requests_skip_the_channel() {
        let mut endpoints = mesh(1, CommConfig::default()).unwrap();
        let ep = &mut endpoints[0];
        let handler = RankDepth(7);
        let key = NodeKey::new(FormationId(0), 1, 1, 0);
        let mut session = ep.begin("local").unwrap();
        let v = session
            .request(Rank(0), Request::new(key, ValueSpec::Depth), &handler)
            .unwrap();
        assert_eq!(v, Value::Scalar(7.0));
        session.finish(&handler).unwrap();
        assert_eq!(ep.stats().local_requests, 1);
        assert_eq!(ep.stats().requests_sent, 0);
    }

    #[test]
    fn unknown_owner_is_an_error() {
        let mut endpoints = mesh(1, CommConfig::default()).unwrap();
        let ep = &mut endpoints[0];
        let handler = RankDepth(0);
        let key = NodeKey::new(FormationId(0), 0, 0, 0);
        let mut session = ep.begin("unknown").unwrap();
        let err = session
            .request(Rank(3), Request::new(key, ValueSpec::Depth), &handler)
            .unwrap_err();
        assert_eq!(err, CommError::UnknownRank { rank: Rank(3), size: 1 });
        session.finish(&handler).unwrap();
    }

    #[test]
    fn silent_peer_stalls_with_timeout() {
        let config = CommConfig {
            stall_timeout: Some(Duration::from_millis(20)),
        };
        let mut endpoints = mesh(2, config).unwrap();
        let _silent = endpoints.pop().unwrap();
        let ep = &mut endpoints[0];
        let err = ep.all_reduce(ReduceOp::Sum, 1.0, &RankDepth(0)).unwrap_err();
        assert!(matches!(err, CommError::Stalled { tag: "all_reduce", .. }));
    }

    #[test]
    fn abort_reaches_waiting_peer() {
        let mut endpoints = mesh(2, CommConfig::default()).unwrap();
        let quitter = endpoints.pop().unwrap();
        quitter.abort();
        let ep = &mut endpoints[0];
        let err = ep.all_reduce(ReduceOp::Max, 0.0, &RankDepth(0)).unwrap_err();
        assert_eq!(err, CommError::PeerAborted { peer: Rank(1) });
    }
}
