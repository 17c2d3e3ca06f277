//! This module provides the [`Blob`] struct, a wrapper around [`Vec<u8>`] used for
//! marker segments, tile bodies, data-bin payloads and cache entries.
//!
//! # Examples
//!
//! ```rust
//! use joxel_core::Blob;
//!
//! let blob = Blob::from(vec![0xFF, 0x4F, 0xFF, 0x51]);
//! assert_eq!(blob.len(), 4);
//! assert_eq!(blob.read_range(0..2), &[0xFF, 0x4F]);
//! ```

use anyhow::{Result, bail};
use std::fmt::Debug;
use std::ops::Range;

/// A simple wrapper around [`Vec<u8>`] with helpers for slicing and appending
/// byte data.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Blob(Vec<u8>);

impl Blob {
	/// Creates an empty `Blob`.
	#[must_use]
	pub fn new_empty() -> Blob {
		Blob(Vec::new())
	}

	/// Creates a `Blob` of the given size, filled with zeros.
	#[must_use]
	pub fn new_sized(length: usize) -> Blob {
		Blob(vec![0u8; length])
	}

	/// Returns the bytes in `range`.
	///
	/// # Panics
	///
	/// Panics if the range is out of bounds.
	#[must_use]
	pub fn read_range(&self, range: Range<usize>) -> &[u8] {
		&self.0[range]
	}

	/// Returns the bytes in `range`, or an error when the range exceeds the
	/// blob length.
	pub fn checked_range(&self, range: Range<usize>) -> Result<&[u8]> {
		if range.end > self.0.len() {
			bail!("range {}..{} exceeds blob length {}", range.start, range.end, self.0.len());
		}
		Ok(&self.0[range])
	}

	/// Returns the underlying bytes as a slice.
	#[must_use]
	pub fn as_slice(&self) -> &[u8] {
		&self.0
	}

	/// Returns the underlying bytes as a mutable slice.
	pub fn as_mut_slice(&mut self) -> &mut [u8] {
		&mut self.0
	}

	/// Consumes the blob and returns the underlying vector.
	#[must_use]
	pub fn into_vec(self) -> Vec<u8> {
		self.0
	}

	/// Interprets the bytes as UTF-8, replacing invalid sequences.
	#[must_use]
	pub fn as_str(&self) -> std::borrow::Cow<'_, str> {
		String::from_utf8_lossy(&self.0)
	}

	/// Appends the given bytes to the end of the blob.
	pub fn append(&mut self, bytes: &[u8]) {
		self.0.extend_from_slice(bytes);
	}

	/// Returns the number of bytes.
	#[must_use]
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns `true` when the blob contains no bytes.
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

impl<const N: usize> From<&[u8; N]> for Blob {
	fn from(value: &[u8; N]) -> Self {
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
		f.debug_struct("Blob").field("length", &self.0.len()).finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn basic_accessors() {
		let blob = Blob::from(vec![1u8, 2, 3, 4, 5]);
		assert_eq!(blob.len(), 5);
		assert!(!blob.is_empty());
		assert_eq!(blob.read_range(1..4), &[2, 3, 4]);
		assert_eq!(blob.as_slice(), &[1, 2, 3, 4, 5]);
		assert_eq!(blob.clone().into_vec(), vec![1, 2, 3, 4, 5]);
	}

	#[test]
	fn checked_range_rejects_overflow() {
		let blob = Blob::from(vec![0u8; 4]);
		assert!(blob.checked_range(0..4).is_ok());
		assert!(blob.checked_range(2..5).is_err());
	}

	#[test]
	fn append_extends() {
		let mut blob = Blob::new_empty();
		blob.append(&[1, 2]);
		blob.append(&[3]);
		assert_eq!(blob.as_slice(), &[1, 2, 3]);
	}

	#[test]
	fn from_str_roundtrip() {
		let blob = Blob::from("jpip");
		assert_eq!(blob.as_str(), "jpip");
	}

	#[test]
	fn debug_shows_length() {
		let blob = Blob::new_sized(7);
		assert_eq!(format!("{blob:?}"), "Blob { length: 7 }");
	}
}
