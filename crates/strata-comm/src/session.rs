//! Scoped handling sessions.

use strata_core::Rank;

use crate::error::CommError;
use crate::message::{Request, RequestHandler, Value};
use crate::transport::{CommStats, Endpoint};

/// A demarcated batch of requests.
///
/// The session mutably borrows its [`Endpoint`], so a second session
/// cannot be opened while this one lives. [`finish`](Session::finish)
/// is collective: it returns once every rank has finished the same
/// session, serving peer requests in the meantime. A session dropped
/// without finishing logs an error and leaves the peers waiting.
#[derive(Debug)]
pub struct Session<'a> {
    endpoint: &'a mut Endpoint,
    tag: &'static str,
    epoch: u64,
    finished: bool,
}

impl<'a> Session<'a> {
    pub(crate) fn new(endpoint: &'a mut Endpoint, tag: &'static str) -> Self {
        let epoch = endpoint.sessions_opened;
        endpoint.sessions_opened += 1;
        endpoint.open = Some(tag);
        endpoint.stats.sessions += 1;
        tracing::debug!(rank = %endpoint.rank(), tag, epoch, "session opened");
        Self {
            endpoint,
            tag,
            epoch,
            finished: false,
        }
    }

    /// The purpose tag given to [`Endpoint::begin`].
    pub fn tag(&self) -> &'static str {
        self.tag
    }

    /// This rank.
    pub fn rank(&self) -> Rank {
        self.endpoint.rank()
    }

    /// Ranks in the mesh.
    pub fn size(&self) -> u32 {
        self.endpoint.size()
    }

    /// Traffic counters of the underlying endpoint.
    pub fn stats(&self) -> &CommStats {
        self.endpoint.stats()
    }

    /// Ask `owner` for one value and block until it answers.
    ///
    /// Requests owned by this rank go straight to `handler`. Peer
    /// requests arriving meanwhile are served through `handler`.
    pub fn request<H>(&mut self, owner: Rank, request: Request, handler: &H) -> Result<Value, CommError>
    where
        H: RequestHandler + ?Sized,
    {
        self.endpoint.exchange(self.tag, owner, request, handler)
    }

    /// Close the session once every rank has closed it.
    pub fn finish<H>(mut self, handler: &H) -> Result<(), CommError>
    where
        H: RequestHandler + ?Sized,
    {
        self.finished = true;
        let result = self.endpoint.finish_session(self.tag, self.epoch, handler);
        self.endpoint.open = None;
        if result.is_ok() {
            tracing::debug!(rank = %self.endpoint.rank(), tag = self.tag, "session finished");
        }
        result
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.endpoint.open = None;
            tracing::error!(
                rank = %self.endpoint.rank(),
                tag = self.tag,
                "session dropped without finish"
            );
        }
    }
}
