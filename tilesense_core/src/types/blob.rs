//! This module provides the [`Blob`] struct, a thin wrapper around [`Vec<u8>`]
//! used for encoded tile payloads and serialized feature documents.

use std::fmt::Debug;

/// A simple wrapper around [`Vec<u8>`] that provides additional methods for working with byte data.
///
/// # Examples
///
/// ```rust
/// use tilesense_core::Blob;
///
/// let blob = Blob::from("Hello, world!");
/// assert_eq!(blob.len(), 13);
/// assert_eq!(blob.as_str(), "Hello, world!");
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Blob(Vec<u8>);

impl Blob {
	/// Creates an empty `Blob`.
	#[must_use]
	pub fn new_empty() -> Blob {
		Blob(Vec::new())
	}

	/// Returns the underlying bytes as a slice.
	#[must_use]
	pub fn as_slice(&self) -> &[u8] {
		&self.0
	}

	/// Interprets the underlying bytes as UTF-8.
	///
	/// # Panics
	/// Panics if the bytes are not valid UTF-8.
	#[must_use]
	pub fn as_str(&self) -> &str {
		std::str::from_utf8(&self.0).expect("blob is not valid UTF-8")
	}

	/// Consumes the `Blob` and returns the underlying vector.
	#[must_use]
	pub fn into_vec(self) -> Vec<u8> {
		self.0
	}

	/// Number of bytes in the `Blob`.
	#[must_use]
	pub fn len(&self) -> u64 {
		self.0.len() as u64
	}

	/// Returns `true` if the `Blob` contains no bytes.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl From<Vec<u8>> for Blob {
	fn from(value: Vec<u8>) -> Self {
		Blob(value)
	}
}

impl From<&[u8]> for Blob {
	fn from(value: &[u8]) -> Self {
		Blob(value.to_vec())
	}
}

impl From<&str> for Blob {
	fn from(value: &str) -> Self {
		Blob(value.as_bytes().to_vec())
	}
}

impl From<String> for Blob {
	fn from(value: String) -> Self {
		Blob(value.into_bytes())
	}
}

impl Debug for Blob {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "Blob({} bytes)", self.0.len())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn basic_accessors() {
		let blob = Blob::from(vec![1u8, 2, 3]);
		assert_eq!(blob.len(), 3);
		assert!(!blob.is_empty());
		assert_eq!(blob.as_slice(), &[1, 2, 3]);
		assert_eq!(blob.into_vec(), vec![1, 2, 3]);
	}

	#[test]
	fn empty_and_strings() {
		assert!(Blob::new_empty().is_empty());
		let blob = Blob::from("Xylofön");
		assert_eq!(blob.as_str(), "Xylofön");
		assert_eq!(format!("{blob:?}"), "Blob(8 bytes)");
	}
}
