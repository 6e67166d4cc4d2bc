//! Mock fetchers.
//!
//! - [`PatternFetcher`]: each cell's value is a function of its world
//!   coordinates, so tests can check where data landed.
//! - [`RandGenFetcher`]: seeded pseudo-random 16-bit values per tile.
//! - [`RecordingFetcher`]: logs every request before delegating.
//! - [`GatedFetcher`]: blocks each fetch until the test releases it.
//! - [`FailingFetcher`]: fails the first N fetches.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use rand_chacha::rand_core::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tilestream_core::{CellCoord, DatumId, FetchError, WorldDims};
use tilestream_engine::{FetchRequest, MinimapFetcher, TileFetcher};
use tilestream_store::DatumGrid;

/// The value [`PatternFetcher`] reports for a cell.
pub fn pattern_value(cell: CellCoord) -> u32 {
    cell.row * 1000 + cell.col
}

fn grid_from_fn(top_left: CellCoord, dims: WorldDims, f: impl Fn(CellCoord) -> u32) -> DatumGrid {
    let mut data = Vec::with_capacity(dims.cell_count());
    for j in 0..dims.rows {
        for i in 0..dims.columns {
            data.push(f(CellCoord::new(top_left.col + i, top_left.row + j)));
        }
    }
    DatumGrid::from_vec(dims, 1, data).expect("length matches dims")
}

// ── PatternFetcher ────────────────────────────────────────────────

/// Fills every datum with [`pattern_value`] of each cell.
#[derive(Clone, Copy, Debug, Default)]
pub struct PatternFetcher;

impl TileFetcher for PatternFetcher {
    fn fetch(&self, request: &FetchRequest) -> Result<Vec<DatumGrid>, FetchError> {
        Ok(request
            .datum_ids
            .iter()
            .map(|_| grid_from_fn(request.top_left, request.dims, pattern_value))
            .collect())
    }
}

// ── RandGenFetcher ────────────────────────────────────────────────

/// Seeded pseudo-random 16-bit data.
///
/// The same seed and tile always produce the same values.
#[derive(Clone, Copy, Debug)]
pub struct RandGenFetcher {
    seed: u64,
}

impl RandGenFetcher {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// The grid this fetcher returns for one datum of `request`.
    pub fn tile(&self, request: &FetchRequest, datum_index: usize) -> DatumGrid {
        let tile_seed = self.seed
            ^ (u64::from(request.top_left.col) << 32)
            ^ u64::from(request.top_left.row)
            ^ ((datum_index as u64) << 48);
        let mut rng = ChaCha8Rng::seed_from_u64(tile_seed);
        let data = (0..request.dims.cell_count())
            .map(|_| rng.next_u32() & 0xffff)
            .collect();
        DatumGrid::from_vec(request.dims, 1, data).expect("length matches dims")
    }
}

impl TileFetcher for RandGenFetcher {
    fn fetch(&self, request: &FetchRequest) -> Result<Vec<DatumGrid>, FetchError> {
        Ok((0..request.datum_ids.len())
            .map(|i| self.tile(request, i))
            .collect())
    }
}

// ── RecordingFetcher ──────────────────────────────────────────────

/// Records every request, then delegates.
///
/// Clones share the log, so keep one clone in the test and hand the
/// other to the cache.
#[derive(Clone)]
pub struct RecordingFetcher {
    inner: Arc<dyn TileFetcher>,
    log: Arc<Mutex<Vec<FetchRequest>>>,
}

impl RecordingFetcher {
    pub fn new(inner: impl TileFetcher) -> Self {
        Self {
            inner: Arc::new(inner),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every request seen so far, in call order.
    pub fn requests(&self) -> Vec<FetchRequest> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of fetches made.
    pub fn count(&self) -> usize {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Top-left corners of every request, in call order.
    pub fn origins(&self) -> Vec<CellCoord> {
        self.requests().iter().map(|r| r.top_left).collect()
    }
}

impl TileFetcher for RecordingFetcher {
    fn fetch(&self, request: &FetchRequest) -> Result<Vec<DatumGrid>, FetchError> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        self.inner.fetch(request)
    }
}

// ── GatedFetcher ──────────────────────────────────────────────────

/// Blocks every fetch until its [`FetchGate`] releases it.
///
/// Each fetch first announces its request on the gate, then waits for
/// one permit. Dropping the gate opens it for good.
pub struct GatedFetcher {
    inner: Box<dyn TileFetcher>,
    started: Sender<FetchRequest>,
    permits: Receiver<()>,
}

/// Test-side control for a [`GatedFetcher`].
pub struct FetchGate {
    started: Receiver<FetchRequest>,
    permits: Sender<()>,
}

/// Wrap `inner` so each fetch waits for the returned gate.
pub fn gated(inner: impl TileFetcher) -> (GatedFetcher, FetchGate) {
    let (started_tx, started_rx) = crossbeam_channel::unbounded();
    let (permit_tx, permit_rx) = crossbeam_channel::unbounded();
    (
        GatedFetcher {
            inner: Box::new(inner),
            started: started_tx,
            permits: permit_rx,
        },
        FetchGate {
            started: started_rx,
            permits: permit_tx,
        },
    )
}

impl TileFetcher for GatedFetcher {
    fn fetch(&self, request: &FetchRequest) -> Result<Vec<DatumGrid>, FetchError> {
        let _ = self.started.send(request.clone());
        // A disconnected gate means the test has let go; run freely.
        let _ = self.permits.recv();
        self.inner.fetch(request)
    }
}

impl FetchGate {
    /// Wait up to `timeout` for the next fetch to start.
    pub fn next_started(&self, timeout: Duration) -> Option<FetchRequest> {
        self.started.recv_timeout(timeout).ok()
    }

    /// Wait up to five seconds for the next fetch to start.
    ///
    /// # Panics
    ///
    /// Panics if no fetch starts in time.
    pub fn expect_started(&self) -> FetchRequest {
        self.next_started(Duration::from_secs(5))
            .expect("a fetch should have started")
    }

    /// Let one waiting (or future) fetch proceed.
    pub fn release(&self) {
        let _ = self.permits.send(());
    }

    /// Let `n` fetches proceed.
    pub fn release_n(&self, n: usize) {
        for _ in 0..n {
            self.release();
        }
    }
}

// ── FailingFetcher ────────────────────────────────────────────────

/// Fails the first `failures` fetches with a transport error, then
/// delegates.
pub struct FailingFetcher {
    inner: Box<dyn TileFetcher>,
    remaining: AtomicUsize,
    calls: Arc<AtomicUsize>,
}

impl FailingFetcher {
    pub fn new(failures: usize, inner: impl TileFetcher) -> Self {
        Self {
            inner: Box::new(inner),
            remaining: AtomicUsize::new(failures),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared counter of every fetch attempt, failed or not.
    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl TileFetcher for FailingFetcher {
    fn fetch(&self, request: &FetchRequest) -> Result<Vec<DatumGrid>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(FetchError::transport("injected failure"));
        }
        self.inner.fetch(request)
    }
}

// ── Minimap ───────────────────────────────────────────────────────

/// Minimap fetcher that fills every datum with one value.
#[derive(Clone, Copy, Debug)]
pub struct ConstMinimapFetcher(pub u32);

impl MinimapFetcher for ConstMinimapFetcher {
    fn fetch_minimap(&self, dims: WorldDims, _datum: &DatumId) -> Result<DatumGrid, FetchError> {
        Ok(DatumGrid::filled(dims, 1, self.0))
    }
}
