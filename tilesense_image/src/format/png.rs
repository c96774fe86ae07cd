//! PNG encoder/decoder bridge for tile payloads.
//!
//! PNG is treated as a **lossless** format. Supports 8-bit L8, LA8, RGB8 and
//! RGBA8 buffers; other layouts are rejected.

use anyhow::{Result, anyhow, bail};
use image::{
	ColorType, DynamicImage, ImageEncoder, ImageFormat, codecs::png::PngEncoder, load_from_memory_with_format,
};
use tilesense_core::Blob;
use tilesense_derive::context;

/// Encode a `DynamicImage` into a PNG [`Blob`].
#[context("encoding {}x{} {:?} as PNG", image.width(), image.height(), image.color())]
pub fn encode(image: &DynamicImage) -> Result<Blob> {
	match image.color() {
		ColorType::L8 | ColorType::La8 | ColorType::Rgb8 | ColorType::Rgba8 => (),
		color => bail!("PNG tile encoding only supports 8-bit Grey, GreyA, RGB or RGBA, got {color:?}"),
	}

	let mut buffer: Vec<u8> = Vec::new();
	PngEncoder::new(&mut buffer).write_image(
		image.as_bytes(),
		image.width(),
		image.height(),
		image.color().into(),
	)?;

	Ok(Blob::from(buffer))
}

/// Decode a PNG [`Blob`] back into a `DynamicImage`.
#[context("decoding PNG image ({} bytes)", blob.len())]
pub fn decode(blob: &Blob) -> Result<DynamicImage> {
	load_from_memory_with_format(blob.as_slice(), ImageFormat::Png)
		.map_err(|e| anyhow!("Failed to decode PNG image: {e}"))
}
