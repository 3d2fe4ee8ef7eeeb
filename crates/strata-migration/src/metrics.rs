//! Per-step metrics of a migration run.
//!
//! [`StepMetrics`] captures, for one rank, the wall time of each phase
//! and the work done by the convergence loops and the proxy caches.

/// Timing and work counters collected during one migration step.
///
/// All durations are in microseconds. Round and repair counters are
/// global totals and agree on every rank; request and cache counters are
/// local to the rank that reports them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StepMetrics {
    /// Wall-clock time for the entire step.
    pub total_us: u64,
    /// Per-phase wall-clock times: `(phase, microseconds)`.
    pub phase_us: Vec<(&'static str, u64)>,
    /// Convergence rounds summed over all layers.
    pub rounds: u64,
    /// Cycle repairs across all ranks.
    pub cycles_repaired: u64,
    /// Rounds that made no progress and triggered a cycle walk.
    pub stalled_rounds: u64,
    /// Requests sent to other ranks.
    pub requests_sent: u64,
    /// Requests answered for other ranks.
    pub requests_served: u64,
    /// Proxy reads answered from the cache.
    pub cache_hits: u64,
    /// Proxy reads that needed a round trip.
    pub cache_misses: u64,
    /// Charge mass that found no open column at its target.
    pub blocked_mass: f64,
    /// Charge mass trapped below its destination, summed over all ranks.
    pub stuck_mass: f64,
    /// Charge mass discarded at elimination terminals, summed over all
    /// ranks.
    pub eliminated_mass: f64,
}

impl StepMetrics {
    /// Time spent in one phase, summed over repeated entries.
    pub fn phase(&self, name: &str) -> u64 {
        self.phase_us
            .iter()
            .filter(|(n, _)| *n == name)
            .map(|(_, us)| us)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_metrics_are_zero() {
        let m = StepMetrics::default();
        assert_eq!(m.total_us, 0);
        assert!(m.phase_us.is_empty());
        assert_eq!(m.rounds, 0);
        assert_eq!(m.cycles_repaired, 0);
        assert_eq!(m.cache_hits + m.cache_misses, 0);
        assert_eq!(m.stuck_mass, 0.0);
    }

    #[test]
    fn phase_sums_repeated_entries() {
        let m = StepMetrics {
            phase_us: vec![("transport", 5), ("resolve", 7), ("transport", 3)],
            ..StepMetrics::default()
        };
        assert_eq!(m.phase("transport"), 8);
        assert_eq!(m.phase("resolve"), 7);
        assert_eq!(m.phase("ranking"), 0);
    }
}
