//! Format dispatch for tile payload encoding and decoding.

pub mod gtiff;
pub mod jpeg;
pub mod png;

use anyhow::Result;
use image::DynamicImage;
use std::fmt::Display;
use tilesense_core::{Blob, TileCompression, TileFormat};
use tilesense_derive::context;

/// Error returned when the built-in codecs cannot produce the requested
/// format/compression pair (NITF containers, J2K, JPEG-in-TIFF).
///
/// Encoding is deterministic, so this is a permanent failure for the tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnsupportedEncoding {
	pub format: TileFormat,
	pub compression: TileCompression,
}

impl Display for UnsupportedEncoding {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(
			f,
			"no built-in encoder for tile format {} with compression {}",
			self.format, self.compression
		)
	}
}

impl std::error::Error for UnsupportedEncoding {}

/// Encodes a tile pixel buffer into the requested payload format.
///
/// Supported: PNG (NONE), JPEG (NONE), GTIFF (NONE, LZW). Other valid wire
/// combinations exist (NITF, J2K, JPEG-in-TIFF) but require an external
/// codec; for those this returns an [`UnsupportedEncoding`] error.
#[context("encoding {}x{} tile as {format} ({compression})", image.width(), image.height())]
pub fn encode_tile(image: &DynamicImage, format: TileFormat, compression: TileCompression) -> Result<Blob> {
	match (format, compression) {
		(TileFormat::PNG, TileCompression::None) => png::encode(image),
		(TileFormat::JPEG, TileCompression::None) => jpeg::encode(image, None),
		(TileFormat::GTIFF, TileCompression::None | TileCompression::Lzw) => gtiff::encode(image, compression),
		_ => Err(UnsupportedEncoding { format, compression }.into()),
	}
}

/// Decodes a tile payload back into pixels. Used by round-trip tests and by
/// the in-process stub endpoints.
#[context("decoding {} tile ({} bytes)", format, blob.len())]
pub fn decode_tile(blob: &Blob, format: TileFormat) -> Result<DynamicImage> {
	match format {
		TileFormat::PNG => png::decode(blob),
		TileFormat::JPEG => jpeg::decode(blob),
		TileFormat::GTIFF => gtiff::decode(blob),
		TileFormat::NITF => Err(UnsupportedEncoding {
			format,
			compression: TileCompression::None,
		}
		.into()),
	}
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
	use super::*;
	use crate::helper::{max_channel_difference, new_test_rgb};
	use rstest::rstest;

	/* ---------- Round-trip laws ---------- */

	#[rstest]
	#[case::png(TileFormat::PNG, TileCompression::None)]
	#[case::gtiff(TileFormat::GTIFF, TileCompression::None)]
	#[case::gtiff_lzw(TileFormat::GTIFF, TileCompression::Lzw)]
	fn lossless_roundtrip(#[case] format: TileFormat, #[case] compression: TileCompression) {
		let image = new_test_rgb(64, 48);
		let blob = encode_tile(&image, format, compression).unwrap();
		let decoded = decode_tile(&blob, format).unwrap();
		assert_eq!(max_channel_difference(&image, &decoded), 0);
	}

	#[test]
	fn jpeg_roundtrip_within_lossy_tolerance() {
		let image = new_test_rgb(64, 48);
		let blob = encode_tile(&image, TileFormat::JPEG, TileCompression::None).unwrap();
		let decoded = decode_tile(&blob, TileFormat::JPEG).unwrap();
		assert!(
			max_channel_difference(&image, &decoded) <= 24,
			"JPEG error exceeds lossy tolerance"
		);
	}

	/* ---------- Unsupported combinations ---------- */

	#[rstest]
	#[case(TileFormat::NITF, TileCompression::None)]
	#[case(TileFormat::NITF, TileCompression::J2k)]
	#[case(TileFormat::GTIFF, TileCompression::Jpeg)]
	fn unsupported_combinations_are_reported(#[case] format: TileFormat, #[case] compression: TileCompression) {
		let image = new_test_rgb(8, 8);
		let err = encode_tile(&image, format, compression).unwrap_err();
		let unsupported = err
			.downcast_ref::<UnsupportedEncoding>()
			.expect("expected UnsupportedEncoding");
		assert_eq!(unsupported.format, format);
		assert_eq!(unsupported.compression, compression);
	}
}
