//! One-shot completion tracking for a batch of tile loads.
//!
//! A [`TileLoadWatcher`] is created for each logical load (one per
//! viewport, one per prefetch ring) with the set of tiles it waits on.
//! Requests hold the watcher in an `Arc` and report each tile exactly
//! once through [`notify_completed`](TileLoadWatcher::notify_completed).
//! When the last tile reports, the aggregated [`LoadCounts`] are sent to
//! the paired [`LoadHandle`].
//!
//! If every `Arc` to an unresolved watcher is dropped (cache shutdown),
//! the channel disconnects and the handle reports
//! [`CacheError::ShutDown`].

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use tilestream_core::TileIndex;

use crate::cache::CacheError;

/// How a single tile request finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TileLoadOutcome {
    /// Data was written (or the tile was already loaded).
    Updated,
    /// The observed set changed before the result could be written.
    Invalidated,
    /// The fetch failed or returned a malformed response.
    Failed,
}

/// Per-outcome tile counts for a resolved watcher.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoadCounts {
    /// Tiles loaded.
    pub updated: usize,
    /// Tiles whose results were discarded as stale.
    pub invalidated: usize,
    /// Tiles whose fetch failed.
    pub failed: usize,
}

impl LoadCounts {
    /// Sum of all outcomes.
    pub fn total(&self) -> usize {
        self.updated + self.invalidated + self.failed
    }

    fn record(&mut self, outcome: TileLoadOutcome) {
        match outcome {
            TileLoadOutcome::Updated => self.updated += 1,
            TileLoadOutcome::Invalidated => self.invalidated += 1,
            TileLoadOutcome::Failed => self.failed += 1,
        }
    }
}

struct WatcherState {
    remaining: HashSet<TileIndex>,
    counts: LoadCounts,
}

/// Tracks completion of a fixed set of tiles.
pub struct TileLoadWatcher {
    state: Mutex<WatcherState>,
    done: Sender<LoadCounts>,
}

impl TileLoadWatcher {
    /// Create a watcher over `tiles` and the handle that observes it.
    ///
    /// A watcher over no tiles is resolved on construction.
    pub fn new(tiles: impl IntoIterator<Item = TileIndex>) -> (Arc<Self>, LoadHandle) {
        let (done, rx) = crossbeam_channel::bounded(1);
        let remaining: HashSet<TileIndex> = tiles.into_iter().collect();
        let resolved = remaining.is_empty();
        let watcher = Arc::new(Self {
            state: Mutex::new(WatcherState {
                remaining,
                counts: LoadCounts::default(),
            }),
            done,
        });
        if resolved {
            let _ = watcher.done.try_send(LoadCounts::default());
        }
        (watcher, LoadHandle { rx, counts: None })
    }

    /// Record the outcome for one tile.
    ///
    /// Tiles not in the watched set, and repeat reports for a tile, are
    /// ignored.
    pub fn notify_completed(&self, tile: TileIndex, outcome: TileLoadOutcome) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.remaining.remove(&tile) {
            return;
        }
        state.counts.record(outcome);
        if state.remaining.is_empty() {
            // The receiver may already be gone; nobody is waiting then.
            let _ = self.done.try_send(state.counts);
        }
    }

    /// Tiles still outstanding.
    pub fn remaining(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remaining
            .len()
    }

    /// Whether every watched tile has reported.
    pub fn is_resolved(&self) -> bool {
        self.remaining() == 0
    }
}

impl fmt::Debug for TileLoadWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("TileLoadWatcher")
            .field("remaining", &state.remaining.len())
            .field("counts", &state.counts)
            .finish()
    }
}

/// Receiving end of a [`TileLoadWatcher`].
#[derive(Debug)]
pub struct LoadHandle {
    rx: Receiver<LoadCounts>,
    counts: Option<LoadCounts>,
}

impl LoadHandle {
    /// Block until the watcher resolves.
    pub fn wait(mut self) -> Result<LoadCounts, CacheError> {
        if let Some(counts) = self.counts.take() {
            return Ok(counts);
        }
        self.rx.recv().map_err(|_| CacheError::ShutDown)
    }

    /// Block for at most `timeout`. `Ok(None)` means still pending.
    pub fn wait_timeout(&mut self, timeout: Duration) -> Result<Option<LoadCounts>, CacheError> {
        if self.counts.is_some() {
            return Ok(self.counts);
        }
        match self.rx.recv_timeout(timeout) {
            Ok(counts) => {
                self.counts = Some(counts);
                Ok(Some(counts))
            }
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(CacheError::ShutDown),
        }
    }

    /// Non-blocking poll. `Ok(None)` means still pending.
    pub fn try_counts(&mut self) -> Result<Option<LoadCounts>, CacheError> {
        if self.counts.is_some() {
            return Ok(self.counts);
        }
        match self.rx.try_recv() {
            Ok(counts) => {
                self.counts = Some(counts);
                Ok(Some(counts))
            }
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(CacheError::ShutDown),
        }
    }
}
