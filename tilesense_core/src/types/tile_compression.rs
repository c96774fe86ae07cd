//! This module defines the [`TileCompression`] enum, the in-payload
//! compression scheme applied when a tile is encoded for the model endpoint.

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Compression applied inside an encoded tile payload.
///
/// Which compressions are meaningful depends on the payload format, see
/// [`TileFormat::supports_compression`](super::TileFormat::supports_compression).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TileCompression {
	/// No additional compression (lossless).
	#[default]
	#[serde(rename = "NONE")]
	None,
	/// JPEG (lossy) compression.
	#[serde(rename = "JPEG")]
	Jpeg,
	/// JPEG 2000 (lossy) compression.
	#[serde(rename = "J2K")]
	J2k,
	/// Lempel-Ziv-Welch (lossless) compression.
	#[serde(rename = "LZW")]
	Lzw,
}

impl TileCompression {
	/// Parses a compression name as it appears in requests.
	pub fn parse_str(value: &str) -> Result<Self> {
		Ok(match value.to_uppercase().trim() {
			"NONE" => TileCompression::None,
			"JPEG" => TileCompression::Jpeg,
			"J2K" => TileCompression::J2k,
			"LZW" => TileCompression::Lzw,
			_ => bail!("Unknown tile compression '{value}'. Expected: NONE, JPEG, J2K or LZW"),
		})
	}

	/// Returns `true` if decoding the compressed payload reproduces the input
	/// pixels exactly.
	#[must_use]
	pub fn is_lossless(&self) -> bool {
		matches!(self, TileCompression::None | TileCompression::Lzw)
	}
}

impl Display for TileCompression {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(match self {
			TileCompression::None => "NONE",
			TileCompression::Jpeg => "JPEG",
			TileCompression::J2k => "J2K",
			TileCompression::Lzw => "LZW",
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parse_and_display_roundtrip() {
		for value in ["NONE", "JPEG", "J2K", "LZW"] {
			assert_eq!(TileCompression::parse_str(value).unwrap().to_string(), value);
		}
		assert_eq!(TileCompression::parse_str("lzw").unwrap(), TileCompression::Lzw);
		assert!(TileCompression::parse_str("BROTLI").is_err());
	}

	#[test]
	fn losslessness() {
		assert!(TileCompression::None.is_lossless());
		assert!(TileCompression::Lzw.is_lossless());
		assert!(!TileCompression::Jpeg.is_lossless());
		assert!(!TileCompression::J2k.is_lossless());
	}

	#[test]
	fn serde_wire_names() {
		assert_eq!(serde_json::to_string(&TileCompression::J2k).unwrap(), "\"J2K\"");
		assert_eq!(
			serde_json::from_str::<TileCompression>("\"NONE\"").unwrap(),
			TileCompression::None
		);
	}
}
