//! Scheduler counters.
//!
//! [`CacheMetrics`] is updated under the scheduler lock and cloned out
//! by [`TiledCache::metrics`](crate::cache::TiledCache::metrics). The
//! queue-depth gauges are filled in at the moment of the copy.

/// Cumulative counters since the cache was created, plus queue gauges.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheMetrics {
    /// Fetcher calls made by the dispatcher.
    pub fetches_dispatched: u64,
    /// Tile completions reported as updated.
    pub tiles_updated: u64,
    /// Tile completions discarded because the generation moved on.
    pub tiles_invalidated: u64,
    /// Tile completions that failed (transport or malformed response).
    pub tiles_failed: u64,
    /// Queued requests dropped at dispatch because they were stale.
    pub stale_skipped: u64,
    /// New tile requests.
    pub requests_created: u64,
    /// Load calls that attached to an already pending request.
    pub requests_coalesced: u64,
    /// Low-priority requests moved to the high queue.
    pub promotions: u64,
    /// High-priority requests moved to the low queue by a new view.
    pub demotions: u64,
    /// Dispatches postponed by retry back-off.
    pub deferrals: u64,
    /// Generation bumps.
    pub invalidations: u64,
    /// Gauge: requests waiting in the high queue.
    pub queued_high: u64,
    /// Gauge: requests waiting in the low queue.
    pub queued_low: u64,
    /// Gauge: requests parked until their retry back-off elapses.
    pub deferred: u64,
}
