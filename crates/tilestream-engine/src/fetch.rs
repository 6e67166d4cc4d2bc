//! The transport seam between the dispatcher and the data source.

use tilestream_core::{CellCoord, DatumId, FetchError, WorldDims};
use tilestream_store::DatumGrid;

/// One tile's worth of data to fetch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchRequest {
    /// Top-left cell of the tile.
    pub top_left: CellCoord,
    /// Tile size in cells, clamped at the world's far edges.
    pub dims: WorldDims,
    /// Datums to fetch, in observation order.
    pub datum_ids: Vec<DatumId>,
}

/// Source of tile data.
///
/// Called from the dispatcher thread with no cache lock held, one call
/// at a time. A successful response holds one single-channel grid per
/// entry of [`FetchRequest::datum_ids`], in the same order, each sized
/// exactly [`FetchRequest::dims`]. Anything else is treated as a
/// malformed response.
///
/// Implemented for closures of the same shape.
pub trait TileFetcher: Send + Sync + 'static {
    /// Fetch one tile.
    fn fetch(&self, request: &FetchRequest) -> Result<Vec<DatumGrid>, FetchError>;
}

impl<F> TileFetcher for F
where
    F: Fn(&FetchRequest) -> Result<Vec<DatumGrid>, FetchError> + Send + Sync + 'static,
{
    fn fetch(&self, request: &FetchRequest) -> Result<Vec<DatumGrid>, FetchError> {
        self(request)
    }
}

/// Check a fetch response against its request.
pub(crate) fn check_response(
    request: &FetchRequest,
    grids: &[DatumGrid],
) -> Result<(), FetchError> {
    if grids.len() != request.datum_ids.len() {
        return Err(FetchError::malformed(format!(
            "expected {} grids, got {}",
            request.datum_ids.len(),
            grids.len()
        )));
    }
    for (datum, grid) in request.datum_ids.iter().zip(grids) {
        if grid.dims() != request.dims || grid.channels() != 1 {
            return Err(FetchError::malformed(format!(
                "grid for {datum} is {} with {} channels, expected {} with 1",
                grid.dims(),
                grid.channels(),
                request.dims
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(datums: usize) -> FetchRequest {
        FetchRequest {
            top_left: CellCoord::ORIGIN,
            dims: WorldDims::new(4, 2),
            datum_ids: vec![DatumId::RandGen {}; datums],
        }
    }

    #[test]
    fn closures_are_fetchers() {
        let fetcher = |req: &FetchRequest| -> Result<Vec<DatumGrid>, FetchError> {
            Ok(req
                .datum_ids
                .iter()
                .map(|_| DatumGrid::filled(req.dims, 1, 9))
                .collect())
        };
        let grids = fetcher.fetch(&request(2)).unwrap();
        assert_eq!(grids.len(), 2);
        assert_eq!(grids[1].as_slice()[0], 9);
    }

    #[test]
    fn response_must_match_datum_count() {
        let req = request(2);
        let grids = vec![DatumGrid::new(req.dims, 1)];
        assert!(matches!(
            check_response(&req, &grids),
            Err(FetchError::Malformed { .. })
        ));
    }

    #[test]
    fn response_grids_must_match_dims() {
        let req = request(1);
        let grids = vec![DatumGrid::new(WorldDims::new(2, 2), 1)];
        assert!(matches!(
            check_response(&req, &grids),
            Err(FetchError::Malformed { .. })
        ));
        let ok = vec![DatumGrid::new(req.dims, 1)];
        assert_eq!(check_response(&req, &ok), Ok(()));
    }

    #[test]
    fn empty_request_accepts_empty_response() {
        assert_eq!(check_response(&request(0), &[]), Ok(()));
    }
}
