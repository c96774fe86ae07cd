//! GeoJSON geometry as a tagged variant with a fixed schema.
//!
//! Model responses and output documents both use GeoJSON geometries. Instead
//! of passing dynamic JSON blobs around, every geometry is one of six
//! variants over [`Position`]s, and coordinate transformations (tile→image
//! translation, pixel→world grounding) are total functions over the variant.

use anyhow::Result;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use std::fmt;

use crate::Bounds;

/// A single coordinate: `[x, y]` or `[x, y, z]` on the wire.
///
/// In pixel space `x`/`y` are column/row; in world space they are
/// longitude/latitude with an optional elevation in meters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Position {
	pub x: f64,
	pub y: f64,
	pub z: Option<f64>,
}

impl Position {
	#[must_use]
	pub fn new(x: f64, y: f64) -> Self {
		Self { x, y, z: None }
	}

	#[must_use]
	pub fn new_3d(x: f64, y: f64, z: f64) -> Self {
		Self { x, y, z: Some(z) }
	}
}

impl From<[f64; 2]> for Position {
	fn from(value: [f64; 2]) -> Self {
		Self::new(value[0], value[1])
	}
}

impl Serialize for Position {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		match self.z {
			Some(z) => [self.x, self.y, z].serialize(serializer),
			None => [self.x, self.y].serialize(serializer),
		}
	}
}

impl<'de> Deserialize<'de> for Position {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let values = Vec::<f64>::deserialize(deserializer)?;
		match values.as_slice() {
			[x, y] => Ok(Position::new(*x, *y)),
			[x, y, z] => Ok(Position::new_3d(*x, *y, *z)),
			_ => Err(de::Error::invalid_length(values.len(), &"a position of 2 or 3 numbers")),
		}
	}
}

/// A GeoJSON geometry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
	Point { coordinates: Position },
	LineString { coordinates: Vec<Position> },
	Polygon { coordinates: Vec<Vec<Position>> },
	MultiPoint { coordinates: Vec<Position> },
	MultiLineString { coordinates: Vec<Vec<Position>> },
	MultiPolygon { coordinates: Vec<Vec<Vec<Position>>> },
}

impl Geometry {
	pub fn new_point<T: Into<Position>>(value: T) -> Self {
		Self::Point {
			coordinates: value.into(),
		}
	}
	pub fn new_line_string<T: Into<Position>>(value: Vec<T>) -> Self {
		Self::LineString {
			coordinates: value.into_iter().map(Into::into).collect(),
		}
	}
	pub fn new_polygon<T: Into<Position>>(value: Vec<Vec<T>>) -> Self {
		Self::Polygon {
			coordinates: value
				.into_iter()
				.map(|ring| ring.into_iter().map(Into::into).collect())
				.collect(),
		}
	}
	pub fn new_multi_point<T: Into<Position>>(value: Vec<T>) -> Self {
		Self::MultiPoint {
			coordinates: value.into_iter().map(Into::into).collect(),
		}
	}

	/// Name of the geometry type as it appears on the wire.
	#[must_use]
	pub fn type_name(&self) -> &str {
		match self {
			Geometry::Point { .. } => "Point",
			Geometry::LineString { .. } => "LineString",
			Geometry::Polygon { .. } => "Polygon",
			Geometry::MultiPoint { .. } => "MultiPoint",
			Geometry::MultiLineString { .. } => "MultiLineString",
			Geometry::MultiPolygon { .. } => "MultiPolygon",
		}
	}

	/// Visits every position of the geometry.
	pub fn for_each_position<F: FnMut(&Position)>(&self, mut callback: F) {
		match self {
			Geometry::Point { coordinates } => callback(coordinates),
			Geometry::LineString { coordinates } | Geometry::MultiPoint { coordinates } => {
				coordinates.iter().for_each(&mut callback);
			}
			Geometry::Polygon { coordinates } | Geometry::MultiLineString { coordinates } => {
				coordinates.iter().flatten().for_each(&mut callback);
			}
			Geometry::MultiPolygon { coordinates } => {
				coordinates.iter().flatten().flatten().for_each(&mut callback);
			}
		}
	}

	/// Applies a fallible transformation to every position, preserving the
	/// geometric type. Used for tile→image translation and pixel→world
	/// grounding.
	pub fn map_positions<F>(&self, callback: F) -> Result<Geometry>
	where
		F: Fn(&Position) -> Result<Position>,
	{
		let map_vec = |positions: &Vec<Position>| -> Result<Vec<Position>> { positions.iter().map(&callback).collect() };

		Ok(match self {
			Geometry::Point { coordinates } => Geometry::Point {
				coordinates: callback(coordinates)?,
			},
			Geometry::LineString { coordinates } => Geometry::LineString {
				coordinates: map_vec(coordinates)?,
			},
			Geometry::MultiPoint { coordinates } => Geometry::MultiPoint {
				coordinates: map_vec(coordinates)?,
			},
			Geometry::Polygon { coordinates } => Geometry::Polygon {
				coordinates: coordinates.iter().map(map_vec).collect::<Result<_>>()?,
			},
			Geometry::MultiLineString { coordinates } => Geometry::MultiLineString {
				coordinates: coordinates.iter().map(map_vec).collect::<Result<_>>()?,
			},
			Geometry::MultiPolygon { coordinates } => Geometry::MultiPolygon {
				coordinates: coordinates
					.iter()
					.map(|polygon| polygon.iter().map(map_vec).collect::<Result<_>>())
					.collect::<Result<_>>()?,
			},
		})
	}

	/// Axis-aligned bounds over all positions, or `None` for an empty geometry.
	#[must_use]
	pub fn bounds(&self) -> Option<Bounds> {
		let mut bounds: Option<Bounds> = None;
		self.for_each_position(|position| {
			bounds = Some(match bounds {
				Some(b) => b.include(position.x, position.y),
				None => Bounds::new_point(position.x, position.y),
			});
		});
		bounds
	}
}

impl fmt::Display for Geometry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.type_name())
	}
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
