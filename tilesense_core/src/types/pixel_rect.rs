//! Axis-aligned pixel rectangles in full-image coordinate space.
//!
//! A [`PixelRect`] describes a rectangular sub-area of a raster image. The
//! origin `(x, y)` is the upper-left corner; `y` increases downwards. Regions
//! and tiles are both expressed as `PixelRect`s, always in **full-image**
//! pixel coordinates so that a rectangle is meaningful on any worker.

use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};
use std::fmt;
use tilesense_derive::context;

/// A non-empty rectangle of pixels, origin at the upper-left corner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelRect {
	/// X-coordinate of the upper-left corner.
	pub x: u32,
	/// Y-coordinate of the upper-left corner.
	pub y: u32,
	/// Width in pixels.
	pub width: u32,
	/// Height in pixels.
	pub height: u32,
}

impl PixelRect {
	/// Create a rectangle from origin and size.
	///
	/// # Errors
	/// Returns an error if `width` or `height` is zero, or if the far edge
	/// would overflow `u32`.
	#[context("Failed to create PixelRect at ({x}, {y}) with size ({width}, {height})")]
	pub fn new(x: u32, y: u32, width: u32, height: u32) -> Result<PixelRect> {
		ensure!(width > 0, "width must be > 0");
		ensure!(height > 0, "height must be > 0");
		ensure!(x.checked_add(width).is_some(), "x ({x}) + width ({width}) overflows");
		ensure!(y.checked_add(height).is_some(), "y ({y}) + height ({height}) overflows");
		Ok(PixelRect { x, y, width, height })
	}

	/// Create a rectangle covering a full image of the given dimensions.
	#[context("Failed to create full PixelRect for a {width}x{height} image")]
	pub fn new_full(width: u32, height: u32) -> Result<PixelRect> {
		Self::new(0, 0, width, height)
	}

	/// X-coordinate one past the right edge.
	#[must_use]
	#[inline]
	pub fn right(&self) -> u32 {
		self.x + self.width
	}

	/// Y-coordinate one past the bottom edge.
	#[must_use]
	#[inline]
	pub fn bottom(&self) -> u32 {
		self.y + self.height
	}

	/// Number of pixels covered by the rectangle.
	#[must_use]
	pub fn area(&self) -> u64 {
		u64::from(self.width) * u64::from(self.height)
	}

	/// Returns `true` if `other` lies entirely within `self`.
	#[must_use]
	pub fn contains(&self, other: &PixelRect) -> bool {
		other.x >= self.x && other.y >= self.y && other.right() <= self.right() && other.bottom() <= self.bottom()
	}

	/// Returns `true` if the given pixel lies within the rectangle.
	#[must_use]
	pub fn contains_pixel(&self, x: u32, y: u32) -> bool {
		x >= self.x && y >= self.y && x < self.right() && y < self.bottom()
	}

	/// Splits the rectangle into a grid of sub-rectangles of side at most `size`.
	///
	/// Cells are produced in row-major order. The last column/row may be
	/// smaller if the dimensions are not exact multiples of `size`.
	///
	/// # Panics
	/// Panics if `size` is zero.
	#[must_use]
	pub fn split_grid(&self, size: u32) -> Vec<PixelRect> {
		assert!(size != 0, "size must be greater than 0");

		let mut cells = Vec::new();
		let mut y = self.y;
		while y < self.bottom() {
			let height = size.min(self.bottom() - y);
			let mut x = self.x;
			while x < self.right() {
				let width = size.min(self.right() - x);
				cells.push(PixelRect { x, y, width, height });
				x += size;
			}
			y += size;
		}
		cells
	}
}

impl fmt::Display for PixelRect {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
	}
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[test]
	fn new_validates_dimensions() {
		assert!(PixelRect::new(0, 0, 0, 5).is_err());
		assert!(PixelRect::new(0, 0, 5, 0).is_err());
		assert!(PixelRect::new(u32::MAX, 0, 2, 2).is_err());

		let rect = PixelRect::new(10, 20, 30, 40).unwrap();
		assert_eq!(rect.right(), 40);
		assert_eq!(rect.bottom(), 60);
		assert_eq!(rect.area(), 1200);
		assert_eq!(rect.to_string(), "30x40+10+20");
	}

	#[test]
	fn containment() {
		let outer = PixelRect::new(0, 0, 100, 100).unwrap();
		let inner = PixelRect::new(10, 10, 50, 50).unwrap();
		assert!(outer.contains(&inner));
		assert!(!inner.contains(&outer));
		assert!(outer.contains_pixel(0, 0));
		assert!(outer.contains_pixel(99, 99));
		assert!(!outer.contains_pixel(100, 0));
	}

	#[rstest]
	#[case::exact((0, 0, 16384, 16384), 8192, 4)]
	#[case::remainder((0, 0, 20000, 20000), 8192, 9)]
	#[case::single((0, 0, 1000, 800), 2048, 1)]
	#[case::row((0, 0, 10000, 100), 4096, 3)]
	fn split_grid_counts(#[case] args: (u32, u32, u32, u32), #[case] size: u32, #[case] expected: usize) {
		let (x, y, w, h) = args;
		let rect = PixelRect::new(x, y, w, h).unwrap();
		let cells = rect.split_grid(size);
		assert_eq!(cells.len(), expected);

		// Cells cover the rectangle exactly once
		let total: u64 = cells.iter().map(PixelRect::area).sum();
		assert_eq!(total, rect.area());
		for cell in &cells {
			assert!(rect.contains(cell));
			assert!(cell.width <= size && cell.height <= size);
		}
	}

	#[test]
	fn split_grid_row_major_and_clipping() {
		let rect = PixelRect::new_full(20000, 20000).unwrap();
		let cells = rect.split_grid(8192);
		assert_eq!(cells[0], PixelRect::new(0, 0, 8192, 8192).unwrap());
		assert_eq!(cells[1], PixelRect::new(8192, 0, 8192, 8192).unwrap());
		assert_eq!(cells[2], PixelRect::new(16384, 0, 3616, 8192).unwrap());
		assert_eq!(cells[8], PixelRect::new(16384, 16384, 3616, 3616).unwrap());
	}

	#[test]
	#[should_panic(expected = "size must be greater than 0")]
	fn split_grid_panics_on_zero_size() {
		let _ = PixelRect::new_full(10, 10).unwrap().split_grid(0);
	}
}
