//! Registry of served images.
//!
//! Registration parses the codestream once and keeps the parsed model next to
//! the raw bytes; dispatch only ever reads. The registry is append-only at
//! runtime — registration and unregistration go through the same lock-free
//! map the request path reads from.

use anyhow::{Context, Result, bail};
use dashmap::DashMap;
use joxel_codec::{Codestream, CodestreamParser, DataBin, ParserOptions, conformance, generate_bins};
use joxel_core::Blob;
use joxel_derive::context;
use std::path::Path;
use std::sync::Arc;

/// Container format detected at registration.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ImageFormat {
	/// Raw codestream.
	J2k,
	/// Boxed file format (JP2/JPX/MJ2 family).
	Jp2,
	/// Volumetric codestream.
	Jp3d,
}

/// One served image.
pub struct ImageEntry {
	pub name: String,
	pub format: ImageFormat,
	pub htj2k: bool,
	pub bytes: Blob,
	pub codestream: Codestream,
	/// Data bins cut at registration; the first is always the main header.
	pub bins: Vec<DataBin>,
}

/// Name → image map shared across sessions.
#[derive(Default)]
pub struct ImageRegistry {
	images: DashMap<String, Arc<ImageEntry>>,
}

impl ImageRegistry {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers codestream bytes under `name`.
	#[context("registering image {name:?}")]
	pub fn register_bytes(&self, name: &str, bytes: Blob) -> Result<Arc<ImageEntry>> {
		let (format, codestream_bytes) = detect_format(&bytes)?;
		let codestream = CodestreamParser::new(ParserOptions::default())
			.parse(codestream_bytes)
			.context("parsing codestream")?;
		let bins = generate_bins(&codestream, codestream_bytes).context("segmenting codestream")?;

		let format = if codestream.siz.is_volumetric() { ImageFormat::Jp3d } else { format };
		let entry = Arc::new(ImageEntry {
			name: name.to_string(),
			format,
			htj2k: codestream.is_htj2k,
			bytes,
			codestream,
			bins,
		});
		log::info!(
			"registered image {name:?}: {:?}, {} tiles, htj2k={}",
			entry.format,
			entry.codestream.tiles.len(),
			entry.htj2k
		);
		self.images.insert(name.to_string(), Arc::clone(&entry));
		Ok(entry)
	}

	/// Reads and registers a file.
	#[context("registering image {name:?} from {path:?}")]
	pub fn register_file(&self, name: &str, path: &Path) -> Result<Arc<ImageEntry>> {
		let bytes = std::fs::read(path).context("reading image file")?;
		self.register_bytes(name, Blob::from(bytes))
	}

	#[must_use]
	pub fn get(&self, name: &str) -> Option<Arc<ImageEntry>> {
		self.images.get(name).map(|entry| Arc::clone(entry.value()))
	}

	pub fn unregister(&self, name: &str) -> bool {
		self.images.remove(name).is_some()
	}

	#[must_use]
	pub fn names(&self) -> Vec<String> {
		self.images.iter().map(|entry| entry.key().clone()).collect()
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.images.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.images.is_empty()
	}
}

/// Detects the container and returns the embedded codestream slice.
///
/// Detection inspects the bytes, never the file name: a boxed file starts
/// with the signature box, a raw codestream with SOC.
fn detect_format(bytes: &Blob) -> Result<(ImageFormat, &[u8])> {
	let slice = bytes.as_slice();
	if slice.len() >= 2 && slice[0] == 0xFF && slice[1] == 0x4F {
		return Ok((ImageFormat::J2k, slice));
	}
	if slice.starts_with(&conformance::JP2_SIGNATURE) {
		let report = conformance::validate_signature(slice);
		if !report.is_valid {
			bail!("damaged boxed file: {}", report.errors.join("; "));
		}
		// locate the contiguous codestream box payload
		let Some(offset) = find_codestream_box(slice) else {
			bail!("boxed file carries no codestream box");
		};
		return Ok((ImageFormat::Jp2, &slice[offset..]));
	}
	bail!("neither a codestream nor a boxed file");
}

/// Scans top-level boxes for `jp2c` and returns its payload offset.
fn find_codestream_box(bytes: &[u8]) -> Option<usize> {
	let mut offset = 0usize;
	while offset + 8 <= bytes.len() {
		let length = u32::from_be_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]]) as usize;
		let box_type = &bytes[offset + 4..offset + 8];
		if box_type == b"jp2c" {
			return Some(offset + 8);
		}
		if length < 8 {
			return None; // extended-length boxes are not produced by this stack
		}
		offset += length;
	}
	None
}
