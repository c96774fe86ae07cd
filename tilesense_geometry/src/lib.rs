//! GeoJSON-compatible feature model for the tilesense workspace.
//!
//! This crate defines the fixed-schema variants used for detected features —
//! [`Geometry`], [`Feature`], [`FeatureCollection`] — together with pixel
//! bounding-box math ([`Bounds`]) and the feature distillation engine
//! ([`distill`]) that deduplicates detections straddling tile boundaries.

mod bounds;
pub use bounds::*;

mod collection;
pub use collection::*;

mod distill;
pub use distill::*;

mod feature;
pub use feature::*;

mod geometry;
pub use geometry::*;
