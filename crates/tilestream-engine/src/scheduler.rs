//! Tile scheduling state machine.
//!
//! [`SchedulerState`] owns everything the dispatcher and the public
//! cache API share: the per-tile load state table, the request table,
//! both priority queues, the retry deferral list, per-tile failure
//! records, the generation counter and the metrics. It has no locks or
//! threads of its own; [`TiledCache`](crate::cache::TiledCache) keeps it
//! behind one mutex and drives it from the caller and dispatcher
//! threads.
//!
//! # Tile lifecycle
//!
//! ```text
//!             load_tile              complete(Ok, current gen)
//! NotLoaded ────────────▶ Pending ───────────────────────────▶ Loaded
//!     ▲                      │
//!     └──────────────────────┘ complete(Err, current gen)
//!
//! invalidate(): every tile → NotLoaded, generation + 1
//! ```
//!
//! A request queued under an old generation is never fetched: it is
//! dropped when popped and its watchers hear `Invalidated`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tilestream_core::{FetchError, Generation, TileIndex, TileLayout, TilePriority};
use tilestream_store::{DatumGrid, DatumStore, TextureChange};

use crate::config::RetryBackoff;
use crate::fetch::{check_response, FetchRequest};
use crate::metrics::CacheMetrics;
use crate::queue::TileQueues;
use crate::request::{RequestId, TileLoadRequest};
use crate::watcher::{TileLoadOutcome, TileLoadWatcher};

/// Internal per-tile state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TileLoadState {
    NotLoaded,
    Loaded,
    Pending(RequestId),
}

/// Externally visible state of one tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TileStatus {
    /// No data for the current generation and no request outstanding.
    NotLoaded,
    /// A request is queued, deferred or in flight at this priority.
    Pending(TilePriority),
    /// Data for the current generation is in the store.
    Loaded,
}

#[derive(Clone, Copy, Debug)]
struct FailureRecord {
    failures: u32,
    retry_after: Instant,
}

/// A request handed to the dispatcher for fetching.
#[derive(Debug)]
pub(crate) struct FetchJob {
    pub request: RequestId,
    pub tile: TileIndex,
    pub generation: Generation,
    pub fetch: FetchRequest,
}

/// What the dispatcher should do next.
#[derive(Debug)]
pub(crate) enum NextStep {
    /// Fetch this job with no lock held.
    Fetch(FetchJob),
    /// Nothing runnable. Sleep until woken or until the deadline, if any.
    Wait(Option<Instant>),
    /// The cache is shutting down.
    ShutDown,
}

/// All scheduling state, guarded by the cache's state mutex.
pub(crate) struct SchedulerState {
    layout: TileLayout,
    retry: RetryBackoff,
    tiles: Vec<TileLoadState>,
    requests: HashMap<RequestId, TileLoadRequest>,
    queues: TileQueues,
    deferred: Vec<(Instant, RequestId)>,
    failures: HashMap<TileIndex, FailureRecord>,
    generation: Generation,
    next_request: u64,
    shutdown: bool,
    metrics: CacheMetrics,
}

impl SchedulerState {
    pub fn new(layout: TileLayout, retry: RetryBackoff) -> Self {
        Self {
            layout,
            retry,
            tiles: vec![TileLoadState::NotLoaded; layout.tile_count()],
            requests: HashMap::new(),
            queues: TileQueues::new(),
            deferred: Vec::new(),
            failures: HashMap::new(),
            generation: Generation::default(),
            next_request: 0,
            shutdown: false,
            metrics: CacheMetrics::default(),
        }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Counters plus the current queue depths.
    pub fn metrics(&self) -> CacheMetrics {
        CacheMetrics {
            queued_high: self.queues.high_len() as u64,
            queued_low: self.queues.low_len() as u64,
            deferred: self.deferred.len() as u64,
            ..self.metrics.clone()
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown
    }

    pub fn is_loaded(&self, tile: TileIndex) -> bool {
        self.tiles.get(tile.as_usize()) == Some(&TileLoadState::Loaded)
    }

    pub fn status(&self, tile: TileIndex) -> Option<TileStatus> {
        let status = match *self.tiles.get(tile.as_usize())? {
            TileLoadState::NotLoaded => TileStatus::NotLoaded,
            TileLoadState::Loaded => TileStatus::Loaded,
            TileLoadState::Pending(id) => TileStatus::Pending(
                self.requests
                    .get(&id)
                    .map_or(TilePriority::Low, TileLoadRequest::priority),
            ),
        };
        Some(status)
    }

    /// Ask for `tile` at `priority` and attach `watcher` to its request.
    ///
    /// Returns `true` when the dispatcher has new work (a request was
    /// queued or promoted).
    pub fn load_tile(
        &mut self,
        tile: TileIndex,
        priority: TilePriority,
        watcher: &Arc<TileLoadWatcher>,
    ) -> bool {
        let Some(&state) = self.tiles.get(tile.as_usize()) else {
            tracing::error!(%tile, tiles = self.tiles.len(), "load requested for tile outside layout");
            watcher.notify_completed(tile, TileLoadOutcome::Failed);
            return false;
        };
        match state {
            TileLoadState::Loaded => {
                tracing::debug!(%tile, "tile already loaded");
                watcher.notify_completed(tile, TileLoadOutcome::Updated);
                false
            }
            TileLoadState::NotLoaded => {
                let id = RequestId(self.next_request);
                self.next_request += 1;
                let request =
                    TileLoadRequest::new(id, tile, priority, self.generation, Arc::clone(watcher));
                self.requests.insert(id, request);
                self.tiles[tile.as_usize()] = TileLoadState::Pending(id);
                self.queues.push(id, priority);
                self.metrics.requests_created += 1;
                tracing::debug!(%tile, request = %id, %priority, generation = %self.generation, "tile request queued");
                true
            }
            TileLoadState::Pending(id) => {
                let Some(request) = self.requests.get_mut(&id) else {
                    tracing::error!(%tile, request = %id, "pending tile has no request, requeueing");
                    self.tiles[tile.as_usize()] = TileLoadState::NotLoaded;
                    return self.load_tile(tile, priority, watcher);
                };
                request.attach(Arc::clone(watcher));
                self.metrics.requests_coalesced += 1;
                if priority == TilePriority::High && request.priority() == TilePriority::Low {
                    request.set_priority(TilePriority::High);
                    // Not in the low queue means deferred or in flight;
                    // the raised priority applies when it is requeued.
                    self.queues.promote(id);
                    self.metrics.promotions += 1;
                    tracing::debug!(%tile, request = %id, "tile request promoted");
                    return true;
                }
                false
            }
        }
    }

    /// Move every high-priority request, queued or deferred, to low.
    pub fn demote_all(&mut self) {
        let mut moved = self.queues.demote_all();
        moved.extend(self.deferred.iter().map(|&(_, id)| id));
        let mut demoted = 0;
        for id in moved {
            if let Some(request) = self.requests.get_mut(&id) {
                if request.priority() == TilePriority::High {
                    request.set_priority(TilePriority::Low);
                    demoted += 1;
                }
            }
        }
        if demoted > 0 {
            self.metrics.demotions += demoted;
            tracing::debug!(demoted, "high-priority requests demoted");
        }
    }

    /// Forget all loaded data and start a new generation.
    ///
    /// Requests parked for back-off go back on the queues, so the next
    /// [`next_step`](Self::next_step) reports them stale at once.
    pub fn invalidate(&mut self) {
        self.generation = self.generation.next();
        self.tiles.fill(TileLoadState::NotLoaded);
        self.failures.clear();
        for (_, id) in self.deferred.drain(..) {
            if let Some(request) = self.requests.get(&id) {
                self.queues.push(id, request.priority());
            }
        }
        self.metrics.invalidations += 1;
        tracing::debug!(generation = %self.generation, queued = self.requests.len(), "cache invalidated");
    }

    /// Pick the next job for the dispatcher.
    ///
    /// Stale requests are dropped here and tiles still backing off are
    /// parked on the deferral list. `store` supplies the observed datums
    /// for the fetch.
    pub fn next_step(&mut self, now: Instant, store: &DatumStore) -> NextStep {
        if self.shutdown {
            return NextStep::ShutDown;
        }
        self.release_deferred(now);

        while let Some((id, _)) = self.queues.pop() {
            let Some(request) = self.requests.get(&id) else {
                tracing::error!(request = %id, "queued request missing from table");
                continue;
            };
            let tile = request.tile();
            let generation = request.generation();

            if generation != self.generation {
                if let Some(request) = self.requests.remove(&id) {
                    self.metrics.stale_skipped += 1;
                    self.metrics.tiles_invalidated += 1;
                    tracing::debug!(%tile, request = %id, %generation, current = %self.generation, "stale request skipped");
                    request.complete(TileLoadOutcome::Invalidated);
                }
                continue;
            }

            if let Some(record) = self.failures.get(&tile) {
                if record.retry_after > now {
                    self.deferred.push((record.retry_after, id));
                    self.metrics.deferrals += 1;
                    tracing::debug!(%tile, request = %id, failures = record.failures, "tile fetch deferred");
                    continue;
                }
            }

            let (top_left, dims) = self.layout.tile_rect(tile);
            let datum_ids = store.observed_datum_ids();
            if !datum_ids.is_empty() {
                self.metrics.fetches_dispatched += 1;
            }
            return NextStep::Fetch(FetchJob {
                request: id,
                tile,
                generation,
                fetch: FetchRequest {
                    top_left,
                    dims,
                    datum_ids,
                },
            });
        }

        NextStep::Wait(self.deferred.iter().map(|&(due, _)| due).min())
    }

    /// Apply the result of a fetch and notify the request's watchers.
    ///
    /// Writes into `store` only if the job's generation is still
    /// current. Returns whether a visualised channel changed, so the
    /// caller can publish it once the locks are released.
    pub fn complete(
        &mut self,
        job: FetchJob,
        result: Result<Vec<DatumGrid>, FetchError>,
        store: &mut DatumStore,
        now: Instant,
    ) -> TextureChange {
        let Some(request) = self.requests.remove(&job.request) else {
            tracing::error!(tile = %job.tile, request = %job.request, "completed request missing from table");
            return TextureChange::Unchanged;
        };
        let tile = job.tile;
        let current = job.generation == self.generation;
        let mut texture = TextureChange::Unchanged;

        let outcome = match result {
            Err(err) => {
                tracing::warn!(%tile, error = %err, "tile fetch failed");
                self.fail_tile(&job, current, now);
                TileLoadOutcome::Failed
            }
            Ok(_) if !current => {
                tracing::debug!(%tile, generation = %job.generation, current = %self.generation, "stale tile result discarded");
                TileLoadOutcome::Invalidated
            }
            Ok(grids) => match write_tile(&job.fetch, &grids, store) {
                Ok(change) => {
                    texture = change;
                    self.load_succeeded(&job);
                    TileLoadOutcome::Updated
                }
                Err(err) => {
                    tracing::warn!(%tile, error = %err, "tile response rejected");
                    self.fail_tile(&job, current, now);
                    TileLoadOutcome::Failed
                }
            },
        };

        match outcome {
            TileLoadOutcome::Updated => self.metrics.tiles_updated += 1,
            TileLoadOutcome::Invalidated => self.metrics.tiles_invalidated += 1,
            TileLoadOutcome::Failed => self.metrics.tiles_failed += 1,
        }
        request.complete(outcome);
        texture
    }

    /// Stop scheduling and drop every outstanding request.
    ///
    /// Dropping a request drops its watcher references, so any handle
    /// still waiting on them reports shutdown.
    pub fn shut_down(&mut self) {
        self.shutdown = true;
        for state in &mut self.tiles {
            if matches!(state, TileLoadState::Pending(_)) {
                *state = TileLoadState::NotLoaded;
            }
        }
        self.queues.clear();
        self.deferred.clear();
        self.requests.clear();
    }

    fn release_deferred(&mut self, now: Instant) {
        if self.deferred.is_empty() {
            return;
        }
        let (due, later): (Vec<_>, Vec<_>) =
            self.deferred.drain(..).partition(|&(at, _)| at <= now);
        self.deferred = later;
        for (_, id) in due {
            if let Some(request) = self.requests.get(&id) {
                self.queues.push(id, request.priority());
            }
        }
    }

    fn is_pending_on(&self, job: &FetchJob) -> bool {
        self.tiles.get(job.tile.as_usize()) == Some(&TileLoadState::Pending(job.request))
    }

    fn load_succeeded(&mut self, job: &FetchJob) {
        if !self.is_pending_on(job) {
            tracing::error!(tile = %job.tile, request = %job.request, "loaded tile was not pending on its request");
        }
        self.tiles[job.tile.as_usize()] = TileLoadState::Loaded;
        self.failures.remove(&job.tile);
    }

    fn fail_tile(&mut self, job: &FetchJob, current: bool, now: Instant) {
        if !current {
            return;
        }
        if !self.is_pending_on(job) {
            tracing::error!(tile = %job.tile, request = %job.request, "failed tile was not pending on its request");
            return;
        }
        self.tiles[job.tile.as_usize()] = TileLoadState::NotLoaded;
        let failures = self.failures.get(&job.tile).map_or(0, |r| r.failures) + 1;
        let retry_after = now + self.retry.delay(failures);
        self.failures.insert(
            job.tile,
            FailureRecord {
                failures,
                retry_after,
            },
        );
    }
}

fn write_tile(
    fetch: &FetchRequest,
    grids: &[DatumGrid],
    store: &mut DatumStore,
) -> Result<TextureChange, FetchError> {
    check_response(fetch, grids)?;
    let mut texture = TextureChange::Unchanged;
    for (datum, grid) in fetch.datum_ids.iter().zip(grids) {
        let change = store
            .update_datum(datum, fetch.top_left, grid)
            .map_err(|err| FetchError::malformed(format!("store rejected {datum}: {err}")))?;
        if change.is_injected() {
            texture = TextureChange::Injected;
        }
    }
    Ok(texture)
}
