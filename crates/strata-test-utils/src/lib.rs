//! Test utilities for Strata development.
//!
//! Provides synthetic basins ([`fixtures`]) and a [`WarnCounter`]
//! tracing layer for asserting on emitted warnings.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

pub use fixtures::{
    capped_dome_basin, dome_basin, flat_basin, methane, random_basin, tilted_basin, valid_columns,
    BasinBuilder, Rock,
};

/// Counts `WARN` events emitted under one target.
///
/// Clones share the count, so one clone can be installed in a
/// subscriber while the test keeps another.
#[derive(Clone, Debug)]
pub struct WarnCounter {
    target: &'static str,
    count: Arc<AtomicUsize>,
}

impl WarnCounter {
    pub fn new(target: &'static str) -> Self {
        Self {
            target,
            count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Warnings seen so far.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl<S: Subscriber> Layer<S> for WarnCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if *meta.level() == Level::WARN && meta.target() == self.target {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Run `f` with `counter` installed on the current thread.
pub fn with_warn_counter<T>(counter: &WarnCounter, f: impl FnOnce() -> T) -> T {
    use tracing_subscriber::layer::SubscriberExt;
    let subscriber = tracing_subscriber::registry().with(counter.clone());
    tracing::subscriber::with_default(subscriber, f)
}
