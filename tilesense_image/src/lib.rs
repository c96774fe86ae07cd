//! Tile payload codecs for the tilesense workspace.
//!
//! The region workflow cuts pixel buffers out of the source image; before a
//! tile can be posted to a model endpoint it has to be serialized in the
//! format/compression the request asked for. This crate bridges the
//! [`image`] and [`tiff`] codecs to the internal [`Blob`](tilesense_core::Blob)
//! type and exposes a single dispatch per direction:
//! [`encode_tile`] and [`decode_tile`].

pub mod format;
pub use format::{UnsupportedEncoding, decode_tile, encode_tile};

pub mod helper;
