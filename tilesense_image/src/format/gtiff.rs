//! GeoTIFF (baseline TIFF) encoder/decoder bridge for tile payloads.
//!
//! Supports 8-bit Grey and RGB buffers with NONE or LZW compression, both
//! lossless. JPEG-in-TIFF is not producible by the built-in codec and is
//! rejected upstream by the format dispatch.

use anyhow::{Result, bail};
use image::{ColorType, DynamicImage, GrayImage, RgbImage};
use std::io::Cursor;
use tiff::{
	decoder::{Decoder, DecodingResult},
	encoder::{TiffEncoder, colortype, compression},
};
use tilesense_core::{Blob, TileCompression};
use tilesense_derive::context;

/// Encode a `DynamicImage` into a TIFF [`Blob`] with the given compression.
#[context("encoding {}x{} {:?} as GTIFF ({compression})", image.width(), image.height(), image.color())]
pub fn encode(image: &DynamicImage, compression: TileCompression) -> Result<Blob> {
	let mut cursor = Cursor::new(Vec::new());
	let mut encoder = TiffEncoder::new(&mut cursor)?;

	let width = image.width();
	let height = image.height();

	encode_into(&mut encoder, image, compression, width, height)?;
	drop(encoder);

	Ok(Blob::from(cursor.into_inner()))
}

fn encode_into<W: std::io::Write + std::io::Seek>(
	encoder: &mut TiffEncoder<W>,
	image: &DynamicImage,
	compression: TileCompression,
	width: u32,
	height: u32,
) -> Result<()> {
	match (image.color(), compression) {
		(ColorType::Rgb8, TileCompression::None) => {
			encoder.write_image::<colortype::RGB8>(width, height, image.as_bytes())?;
		}
		(ColorType::Rgb8, TileCompression::Lzw) => {
			encoder.write_image_with_compression::<colortype::RGB8, _>(
				width,
				height,
				compression::Lzw::default(),
				image.as_bytes(),
			)?;
		}
		(ColorType::L8, TileCompression::None) => {
			encoder.write_image::<colortype::Gray8>(width, height, image.as_bytes())?;
		}
		(ColorType::L8, TileCompression::Lzw) => {
			encoder.write_image_with_compression::<colortype::Gray8, _>(
				width,
				height,
				compression::Lzw::default(),
				image.as_bytes(),
			)?;
		}
		(color, TileCompression::None | TileCompression::Lzw) => {
			bail!("GTIFF tile encoding only supports 8-bit Grey or RGB, got {color:?}")
		}
		(_, other) => bail!("GTIFF tile encoding does not support {other} compression"),
	}
	Ok(())
}

/// Decode a TIFF [`Blob`] back into a `DynamicImage`.
#[context("decoding GTIFF image ({} bytes)", blob.len())]
pub fn decode(blob: &Blob) -> Result<DynamicImage> {
	let mut decoder = Decoder::new(Cursor::new(blob.as_slice()))?;
	let (width, height) = decoder.dimensions()?;
	let color = decoder.colortype()?;

	let DecodingResult::U8(data) = decoder.read_image()? else {
		bail!("GTIFF tile decoding only supports 8-bit samples");
	};

	Ok(match color {
		tiff::ColorType::RGB(8) => {
			DynamicImage::ImageRgb8(RgbImage::from_raw(width, height, data).ok_or_else(|| {
				anyhow::anyhow!("RGB sample buffer does not match {width}x{height}")
			})?)
		}
		tiff::ColorType::Gray(8) => {
			DynamicImage::ImageLuma8(GrayImage::from_raw(width, height, data).ok_or_else(|| {
				anyhow::anyhow!("Grey sample buffer does not match {width}x{height}")
			})?)
		}
		other => bail!("unsupported TIFF color type {other:?}"),
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::helper::{max_channel_difference, new_test_grey, new_test_rgb};
	use rstest::rstest;

	#[rstest]
	#[case::uncompressed(TileCompression::None)]
	#[case::lzw(TileCompression::Lzw)]
	fn roundtrip_is_lossless(#[case] compression: TileCompression) -> Result<()> {
		for image in [new_test_rgb(32, 24), new_test_grey(32, 24)] {
			let decoded = decode(&encode(&image, compression)?)?;
			assert_eq!(max_channel_difference(&image, &decoded), 0);
		}
		Ok(())
	}

	#[test]
	fn lzw_compresses_uniform_data() -> Result<()> {
		let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 64, image::Rgb([42, 42, 42])));
		let plain = encode(&image, TileCompression::None)?;
		let lzw = encode(&image, TileCompression::Lzw)?;
		assert!(lzw.len() < plain.len());
		Ok(())
	}

	#[test]
	fn rejects_unsupported_inputs() {
		assert!(encode(&DynamicImage::new_rgba8(4, 4), TileCompression::None).is_err());
		assert!(encode(&new_test_rgb(4, 4), TileCompression::Jpeg).is_err());
		assert!(decode(&Blob::from("not a tiff")).is_err());
	}
}
