//! This module defines the [`TileFormat`] enum, the container format used to
//! encode tile payloads for the model endpoint, and the table of valid
//! format/compression combinations.

use super::TileCompression;
use anyhow::{Result, bail, ensure};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use tilesense_derive::context;

/// Container format of an encoded tile payload.
#[allow(clippy::upper_case_acronyms)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TileFormat {
	NITF,
	JPEG,
	PNG,
	GTIFF,
}

impl TileFormat {
	/// Parses a format name as it appears in requests.
	pub fn parse_str(value: &str) -> Result<Self> {
		Ok(match value.to_uppercase().trim() {
			"NITF" => TileFormat::NITF,
			"JPEG" | "JPG" => TileFormat::JPEG,
			"PNG" => TileFormat::PNG,
			"GTIFF" | "TIFF" => TileFormat::GTIFF,
			_ => bail!("Unknown tile format '{value}'. Expected: NITF, JPEG, PNG or GTIFF"),
		})
	}

	/// File extension including the leading dot.
	#[must_use]
	pub fn extension(&self) -> &str {
		match self {
			TileFormat::NITF => ".ntf",
			TileFormat::JPEG => ".jpg",
			TileFormat::PNG => ".png",
			TileFormat::GTIFF => ".tif",
		}
	}

	/// MIME type sent as `Content-Type` when posting a payload of this format.
	#[must_use]
	pub fn content_type(&self) -> &str {
		match self {
			TileFormat::NITF => "image/nitf",
			TileFormat::JPEG => "image/jpeg",
			TileFormat::PNG => "image/png",
			TileFormat::GTIFF => "image/tiff",
		}
	}

	/// Returns `true` if `compression` is a valid in-payload compression for
	/// this format.
	///
	/// Valid combinations: NITF x {NONE, JPEG, J2K}; GTIFF x {NONE, JPEG, LZW};
	/// PNG x {NONE}; JPEG x {NONE}.
	#[must_use]
	pub fn supports_compression(&self, compression: TileCompression) -> bool {
		use TileCompression::*;
		match self {
			TileFormat::NITF => matches!(compression, None | Jpeg | J2k),
			TileFormat::GTIFF => matches!(compression, None | Jpeg | Lzw),
			TileFormat::PNG | TileFormat::JPEG => matches!(compression, None),
		}
	}

	/// Validates a format/compression pair, for request validation.
	#[context("validating tile compression {compression} for format {self}")]
	pub fn ensure_compression(&self, compression: TileCompression) -> Result<()> {
		ensure!(
			self.supports_compression(compression),
			"tile compression {compression} is not valid for format {self}"
		);
		Ok(())
	}
}

impl Display for TileFormat {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(match self {
			TileFormat::NITF => "NITF",
			TileFormat::JPEG => "JPEG",
			TileFormat::PNG => "PNG",
			TileFormat::GTIFF => "GTIFF",
		})
	}
}
