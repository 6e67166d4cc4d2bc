//! Pending tile requests.

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;
use tilestream_core::{Generation, TileIndex, TilePriority};

use crate::watcher::{TileLoadOutcome, TileLoadWatcher};

/// Identifies a request in the scheduler's request table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One in-progress load of one tile.
///
/// Created when a `NotLoaded` tile is first requested. Later loads of
/// the same tile attach their watchers here instead of creating a new
/// request. Consumed by [`complete`](Self::complete), so each watcher
/// hears about the tile at most once.
#[derive(Debug)]
pub struct TileLoadRequest {
    id: RequestId,
    tile: TileIndex,
    priority: TilePriority,
    generation: Generation,
    watchers: SmallVec<[Arc<TileLoadWatcher>; 2]>,
}

impl TileLoadRequest {
    /// A new request with a single watcher.
    pub fn new(
        id: RequestId,
        tile: TileIndex,
        priority: TilePriority,
        generation: Generation,
        watcher: Arc<TileLoadWatcher>,
    ) -> Self {
        let mut watchers = SmallVec::new();
        watchers.push(watcher);
        Self {
            id,
            tile,
            priority,
            generation,
            watchers,
        }
    }

    /// Request id.
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Tile being loaded.
    pub fn tile(&self) -> TileIndex {
        self.tile
    }

    /// Current scheduling class.
    pub fn priority(&self) -> TilePriority {
        self.priority
    }

    /// Generation the request was created under.
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Number of attached watchers.
    pub fn watcher_count(&self) -> usize {
        self.watchers.len()
    }

    pub(crate) fn set_priority(&mut self, priority: TilePriority) {
        self.priority = priority;
    }

    pub(crate) fn attach(&mut self, watcher: Arc<TileLoadWatcher>) {
        self.watchers.push(watcher);
    }

    /// Report `outcome` to every attached watcher.
    pub(crate) fn complete(self, outcome: TileLoadOutcome) {
        for watcher in &self.watchers {
            watcher.notify_completed(self.tile, outcome);
        }
    }
}
