//! Tile grids: decomposing a region rectangle into overlapping tiles.
//!
//! A [`TileGrid`] enumerates the tiles of a region for a given tile size `T`
//! and overlap `O` (with `O < T`). Tile origins step by `T - O` along each
//! axis; the last row/column is clipped to the region rectangle. The grid is
//! a pure function of `(region, T, O)` and can be re-enumerated at any time,
//! on any worker, without hidden state.

use super::{PixelRect, TileCompression, TileFormat};
use anyhow::{Result, ensure};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tilesense_derive::context;

/// Largest accepted tile edge length in pixels.
pub const MAX_TILE_SIZE: u32 = 16384;

/// One tile of a region, as sent to the model endpoint.
///
/// The rectangle is expressed in full-image pixel coordinates, so the origin
/// doubles as the translation applied when lifting detections back into the
/// full-image frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileDescriptor {
	/// Tile bounds in full-image pixel coordinates.
	pub rect: PixelRect,
	/// Payload container format.
	pub format: TileFormat,
	/// In-payload compression.
	pub compression: TileCompression,
}

/// The lazily-enumerated tile decomposition of a region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileGrid {
	region: PixelRect,
	tile_size: u32,
	overlap: u32,
	cols: u32,
	rows: u32,
}

impl TileGrid {
	/// Builds the grid for `region` with the given tile size and overlap.
	///
	/// # Errors
	/// Returns an error unless `1 <= tile_size <= 16384` and `overlap < tile_size`.
	#[context("Failed to create tile grid for region {region} (tile size {tile_size}, overlap {overlap})")]
	pub fn new(region: PixelRect, tile_size: u32, overlap: u32) -> Result<TileGrid> {
		ensure!(
			tile_size >= 1 && tile_size <= MAX_TILE_SIZE,
			"tile size ({tile_size}) must be within 1..={MAX_TILE_SIZE}"
		);
		ensure!(
			overlap < tile_size,
			"tile overlap ({overlap}) must be smaller than tile size ({tile_size})"
		);

		Ok(TileGrid {
			region,
			tile_size,
			overlap,
			cols: Self::steps(region.width, tile_size, overlap),
			rows: Self::steps(region.height, tile_size, overlap),
		})
	}

	/// Number of tiles along one axis of extent `extent`.
	///
	/// `ceil((extent - overlap) / (tile_size - overlap))` when the extent
	/// exceeds the overlap; a degenerate extent yields a single clipped tile.
	fn steps(extent: u32, tile_size: u32, overlap: u32) -> u32 {
		if extent <= overlap {
			return 1;
		}
		let step = tile_size - overlap;
		(extent - overlap).div_ceil(step)
	}

	/// Number of tile columns.
	#[must_use]
	pub fn cols(&self) -> u32 {
		self.cols
	}

	/// Number of tile rows.
	#[must_use]
	pub fn rows(&self) -> u32 {
		self.rows
	}

	/// Exact number of tiles the grid produces.
	#[must_use]
	pub fn count(&self) -> u64 {
		u64::from(self.cols) * u64::from(self.rows)
	}

	/// The rectangle being tiled.
	#[must_use]
	pub fn region(&self) -> &PixelRect {
		&self.region
	}

	/// The tile at grid position `(col, row)`, clipped to the region.
	fn tile_at(&self, col: u32, row: u32) -> PixelRect {
		let step = self.tile_size - self.overlap;
		let x = self.region.x + col * step;
		let y = self.region.y + row * step;
		PixelRect {
			x,
			y,
			width: self.tile_size.min(self.region.right() - x),
			height: self.tile_size.min(self.region.bottom() - y),
		}
	}

	/// Returns an iterator over all tiles in row-major order.
	pub fn iter_tiles(&self) -> impl Iterator<Item = PixelRect> + '_ {
		let grid = *self;
		(0..self.rows)
			.cartesian_product(0..self.cols)
			.map(move |(row, col)| grid.tile_at(col, row))
	}

	/// Returns an iterator over [`TileDescriptor`]s in row-major order.
	pub fn iter_descriptors(
		&self,
		format: TileFormat,
		compression: TileCompression,
	) -> impl Iterator<Item = TileDescriptor> + '_ {
		self.iter_tiles().map(move |rect| TileDescriptor {
			rect,
			format,
			compression,
		})
	}
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	fn grid(w: u32, h: u32, tile: u32, overlap: u32) -> TileGrid {
		TileGrid::new(PixelRect::new_full(w, h).unwrap(), tile, overlap).unwrap()
	}

	#[test]
	fn rejects_invalid_parameters() {
		let region = PixelRect::new_full(100, 100).unwrap();
		assert!(TileGrid::new(region, 0, 0).is_err());
		assert!(TileGrid::new(region, MAX_TILE_SIZE + 1, 0).is_err());
		assert!(TileGrid::new(region, 256, 256).is_err());
		assert!(TileGrid::new(region, 256, 300).is_err());
	}

	#[rstest]
	#[case::region_smaller_than_tile((1000, 800), 2048, 0, (1, 1))]
	#[case::tile_equals_region((2048, 2048), 2048, 0, (1, 1))]
	#[case::tile_equals_region_with_overlap((2048, 2048), 2048, 50, (1, 1))]
	#[case::no_overlap_partition((8192, 8192), 2048, 0, (4, 4))]
	#[case::overlap((8192, 8192), 2048, 50, (5, 5))]
	#[case::clipped_remainder((3616, 8192), 2048, 50, (2, 5))]
	#[case::extent_below_overlap((30, 8192), 2048, 50, (1, 5))]
	fn tile_counts(#[case] size: (u32, u32), #[case] tile: u32, #[case] overlap: u32, #[case] expected: (u32, u32)) {
		let grid = grid(size.0, size.1, tile, overlap);
		assert_eq!((grid.cols(), grid.rows()), expected);
		assert_eq!(grid.count(), u64::from(expected.0) * u64::from(expected.1));
		assert_eq!(grid.iter_tiles().count() as u64, grid.count());
	}

	#[test]
	fn single_tile_is_clipped_to_region() {
		let grid = grid(1000, 800, 2048, 0);
		let tiles: Vec<PixelRect> = grid.iter_tiles().collect();
		assert_eq!(tiles, vec![PixelRect::new(0, 0, 1000, 800).unwrap()]);
	}

	#[rstest]
	#[case(2048, 0)]
	#[case(2048, 50)]
	#[case(512, 128)]
	#[case(1024, 768)]
	fn tiles_stay_inside_region_and_overlap_exactly(#[case] tile: u32, #[case] overlap: u32) {
		let region = PixelRect::new(100, 200, 5000, 3000).unwrap();
		let grid = TileGrid::new(region, tile, overlap).unwrap();
		let step = tile - overlap;

		let mut previous_in_row: Option<PixelRect> = None;
		for t in grid.iter_tiles() {
			assert!(region.contains(&t), "tile {t} escapes region {region}");
			if let Some(prev) = previous_in_row {
				if prev.y == t.y {
					// Adjacent tiles in a row share exactly `overlap` pixels.
					assert_eq!(t.x, prev.x + step);
					assert_eq!(prev.right() - t.x, overlap.min(prev.width));
				}
			}
			previous_in_row = Some(t);
		}

		// The last column/row reaches the region edge.
		let last = grid.iter_tiles().last().unwrap();
		assert_eq!(last.right(), region.right());
		assert_eq!(last.bottom(), region.bottom());
	}

	#[test]
	fn no_overlap_partitions_region() {
		let grid = grid(4096, 2048, 1024, 0);
		let total: u64 = grid.iter_tiles().map(|t| t.area()).sum();
		assert_eq!(total, 4096 * 2048);
	}

	#[test]
	fn descriptors_carry_format_and_origin() {
		let grid = grid(3000, 3000, 2048, 0);
		let descriptors: Vec<TileDescriptor> = grid
			.iter_descriptors(TileFormat::PNG, TileCompression::None)
			.collect();
		assert_eq!(descriptors.len(), 4);
		assert_eq!(descriptors[3].rect, PixelRect::new(2048, 2048, 952, 952).unwrap());
		assert!(descriptors.iter().all(|d| d.format == TileFormat::PNG));
	}

	#[test]
	fn grid_is_restartable() {
		let grid = grid(9000, 7000, 2048, 50);
		let first: Vec<PixelRect> = grid.iter_tiles().collect();
		let second: Vec<PixelRect> = grid.iter_tiles().collect();
		assert_eq!(first, second);
	}
}
