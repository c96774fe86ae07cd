//! JPEG encoder/decoder bridge for tile payloads.
//!
//! JPEG is lossy; round-trips are only exact within the codec tolerance.
//! Supports 8-bit Grey and RGB buffers, no alpha channel.

use anyhow::{Result, anyhow, bail};
use image::{
	ColorType, DynamicImage, ImageEncoder, ImageFormat, codecs::jpeg::JpegEncoder, load_from_memory_with_format,
};
use tilesense_core::Blob;
use tilesense_derive::context;

/// Encode a `DynamicImage` into a JPEG [`Blob`].
///
/// * `quality` — 1..=99; defaults to **95**.
#[context("encoding {}x{} {:?} as JPEG (q={:?})", image.width(), image.height(), image.color(), quality)]
pub fn encode(image: &DynamicImage, quality: Option<u8>) -> Result<Blob> {
	match image.color() {
		ColorType::L8 | ColorType::Rgb8 => (),
		color => bail!("JPEG tile encoding only supports 8-bit Grey or RGB without alpha, got {color:?}"),
	}

	let quality = quality.unwrap_or(95);
	if quality >= 100 {
		bail!("JPEG does not support lossless compression, use a quality < 100");
	}

	let mut buffer: Vec<u8> = Vec::new();
	JpegEncoder::new_with_quality(&mut buffer, quality).write_image(
		image.as_bytes(),
		image.width(),
		image.height(),
		image.color().into(),
	)?;

	Ok(Blob::from(buffer))
}

/// Decode a JPEG [`Blob`] back into a `DynamicImage`.
#[context("decoding JPEG image ({} bytes)", blob.len())]
pub fn decode(blob: &Blob) -> Result<DynamicImage> {
	load_from_memory_with_format(blob.as_slice(), ImageFormat::Jpeg)
		.map_err(|e| anyhow!("Failed to decode JPEG image: {e}"))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::helper::{max_channel_difference, new_test_rgb};

	#[test]
	fn roundtrip_within_tolerance() -> Result<()> {
		let image = new_test_rgb(32, 24);
		let decoded = decode(&encode(&image, Some(95))?)?;
		assert!(max_channel_difference(&image, &decoded) <= 24);
		Ok(())
	}

	#[test]
	fn rejects_alpha_and_lossless_quality() {
		let rgba = DynamicImage::new_rgba8(4, 4);
		assert!(encode(&rgba, None).is_err());
		assert!(encode(&new_test_rgb(4, 4), Some(100)).is_err());
	}
}
