//! Axis-aligned bounding boxes serialized as GeoJSON `[min_x, min_y, max_x, max_y]`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An axis-aligned bounding box in either pixel or world coordinates.
///
/// Serialized as a four-element array, matching the GeoJSON `bbox` member and
/// the `imageBBox` property of detected features.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct Bounds {
	pub min_x: f64,
	pub min_y: f64,
	pub max_x: f64,
	pub max_y: f64,
}

impl Bounds {
	/// Creates bounds from min/max corners, swapping them if reversed.
	#[must_use]
	pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
		Self {
			min_x: min_x.min(max_x),
			min_y: min_y.min(max_y),
			max_x: min_x.max(max_x),
			max_y: min_y.max(max_y),
		}
	}

	/// Degenerate bounds covering a single point.
	#[must_use]
	pub fn new_point(x: f64, y: f64) -> Self {
		Self {
			min_x: x,
			min_y: y,
			max_x: x,
			max_y: y,
		}
	}

	/// Returns bounds grown to include the given point.
	#[must_use]
	pub fn include(&self, x: f64, y: f64) -> Self {
		Self {
			min_x: self.min_x.min(x),
			min_y: self.min_y.min(y),
			max_x: self.max_x.max(x),
			max_y: self.max_y.max(y),
		}
	}

	/// Returns bounds shifted by `(dx, dy)`.
	#[must_use]
	pub fn translate(&self, dx: f64, dy: f64) -> Self {
		Self {
			min_x: self.min_x + dx,
			min_y: self.min_y + dy,
			max_x: self.max_x + dx,
			max_y: self.max_y + dy,
		}
	}

	#[must_use]
	pub fn width(&self) -> f64 {
		self.max_x - self.min_x
	}

	#[must_use]
	pub fn height(&self) -> f64 {
		self.max_y - self.min_y
	}

	#[must_use]
	pub fn area(&self) -> f64 {
		self.width() * self.height()
	}

	/// The four corners, for grounding a pixel box into world coordinates.
	#[must_use]
	pub fn corners(&self) -> [(f64, f64); 4] {
		[
			(self.min_x, self.min_y),
			(self.max_x, self.min_y),
			(self.max_x, self.max_y),
			(self.min_x, self.max_y),
		]
	}

	/// Intersection-over-union of two boxes.
	///
	/// Degenerate (zero-area) boxes that intersect are treated as coincident,
	/// so two identical point detections compare as IoU 1.
	#[must_use]
	pub fn iou(&self, other: &Bounds) -> f64 {
		let ix = self.max_x.min(other.max_x) - self.min_x.max(other.min_x);
		let iy = self.max_y.min(other.max_y) - self.min_y.max(other.min_y);
		if ix < 0.0 || iy < 0.0 {
			return 0.0;
		}
		let intersection = ix * iy;
		let union = self.area() + other.area() - intersection;
		if union <= 0.0 { 1.0 } else { intersection / union }
	}
}

impl From<[f64; 4]> for Bounds {
	fn from(value: [f64; 4]) -> Self {
		Bounds::new(value[0], value[1], value[2], value[3])
	}
}

impl From<Bounds> for [f64; 4] {
	fn from(value: Bounds) -> Self {
		[value.min_x, value.min_y, value.max_x, value.max_y]
	}
}

impl fmt::Display for Bounds {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "[{}, {}, {}, {}]", self.min_x, self.min_y, self.max_x, self.max_y)
	}
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
	use super::*;
	use approx::assert_relative_eq;
	use rstest::rstest;

	#[test]
	fn new_normalizes_corners() {
		let bounds = Bounds::new(10.0, 20.0, 2.0, 4.0);
		assert_eq!(bounds, Bounds::new(2.0, 4.0, 10.0, 20.0));
		assert_eq!(bounds.width(), 8.0);
		assert_eq!(bounds.height(), 16.0);
	}

	#[test]
	fn translate_and_include() {
		let bounds = Bounds::new(0.0, 0.0, 2.0, 2.0).translate(10.0, 5.0);
		assert_eq!(bounds, Bounds::new(10.0, 5.0, 12.0, 7.0));
		assert_eq!(bounds.include(0.0, 20.0), Bounds::new(0.0, 5.0, 12.0, 20.0));
	}

	#[rstest]
	#[case::identical((0.0, 0.0, 4.0, 4.0), (0.0, 0.0, 4.0, 4.0), 1.0)]
	#[case::disjoint((0.0, 0.0, 1.0, 1.0), (5.0, 5.0, 6.0, 6.0), 0.0)]
	#[case::half((0.0, 0.0, 2.0, 2.0), (1.0, 0.0, 3.0, 2.0), 1.0 / 3.0)]
	#[case::contained((0.0, 0.0, 4.0, 4.0), (1.0, 1.0, 3.0, 3.0), 0.25)]
	#[case::touching_edge((0.0, 0.0, 1.0, 1.0), (1.0, 0.0, 2.0, 1.0), 0.0)]
	fn iou_cases(#[case] a: (f64, f64, f64, f64), #[case] b: (f64, f64, f64, f64), #[case] expected: f64) {
		let a = Bounds::new(a.0, a.1, a.2, a.3);
		let b = Bounds::new(b.0, b.1, b.2, b.3);
		assert_relative_eq!(a.iou(&b), expected);
		assert_relative_eq!(b.iou(&a), expected);
	}

	#[test]
	fn iou_of_identical_points_is_one() {
		let a = Bounds::new_point(5000.0, 5000.0);
		let b = Bounds::new_point(5000.0, 5000.0);
		assert_eq!(a.iou(&b), 1.0);

		let c = Bounds::new_point(5000.0, 5001.0);
		assert_eq!(a.iou(&c), 0.0);
	}

	#[test]
	fn serde_as_array() {
		let bounds = Bounds::new(1.0, 2.0, 3.0, 4.0);
		assert_eq!(serde_json::to_string(&bounds).unwrap(), "[1.0,2.0,3.0,4.0]");
		assert_eq!(serde_json::from_str::<Bounds>("[1,2,3,4]").unwrap(), bounds);
	}
}
