//! Pluggable persistence for client-cache entries.
//!
//! A store is a flat key → record map; keys are `image:class:id` strings.
//! Records are encoded little-endian with length-prefixed strings, one record
//! per key (one file per key in the file-backed store).

use anyhow::{Context, Result, bail, ensure};
use joxel_core::Blob;
use joxel_core::io::{ValueReader, ValueReaderSlice, ValueWriter, ValueWriterBlob};
use joxel_derive::context;
use std::collections::HashMap;
use std::path::PathBuf;

const RECORD_VERSION: u8 = 1;

/// One persisted cache entry.
#[derive(Clone, Debug, PartialEq)]
pub struct PersistentRecord {
	pub image_id: String,
	pub resolution_level: u8,
	pub bin_class: u8,
	pub bin_id: u32,
	pub is_complete: bool,
	pub quality_layer: u8,
	pub tile_index: u32,
	pub content_hash: u64,
	/// RFC 3339 creation stamp.
	pub created_at: String,
	pub payload: Blob,
}

impl PersistentRecord {
	pub fn encode(&self) -> Result<Blob> {
		let mut writer = ValueWriterBlob::new_le();
		writer.write_u8(RECORD_VERSION)?;
		writer.write_prefixed_string(&self.image_id)?;
		writer.write_u8(self.resolution_level)?;
		writer.write_u8(self.bin_class)?;
		writer.write_u32(self.bin_id)?;
		writer.write_u8(u8::from(self.is_complete))?;
		writer.write_u8(self.quality_layer)?;
		writer.write_u32(self.tile_index)?;
		writer.write_u64(self.content_hash)?;
		writer.write_prefixed_string(&self.created_at)?;
		writer.write_u32(self.payload.len() as u32)?;
		writer.write_blob(&self.payload)?;
		Ok(writer.into_blob())
	}

	pub fn decode(blob: &Blob) -> Result<Self> {
		let mut reader = ValueReaderSlice::new_le(blob.as_slice());
		let version = reader.read_u8()?;
		ensure!(version == RECORD_VERSION, "unsupported record version {version}");
		let image_id_len = reader.read_u32()?;
		let image_id = reader.read_string(u64::from(image_id_len))?;
		let resolution_level = reader.read_u8()?;
		let bin_class = reader.read_u8()?;
		let bin_id = reader.read_u32()?;
		let is_complete = reader.read_u8()? == 1;
		let quality_layer = reader.read_u8()?;
		let tile_index = reader.read_u32()?;
		let content_hash = reader.read_u64()?;
		let created_at_len = reader.read_u32()?;
		let created_at = reader.read_string(u64::from(created_at_len))?;
		let payload_len = reader.read_u32()?;
		let payload = reader.read_blob(u64::from(payload_len))?;
		Ok(Self {
			image_id,
			resolution_level,
			bin_class,
			bin_id,
			is_complete,
			quality_layer,
			tile_index,
			content_hash,
			created_at,
			payload,
		})
	}
}

/// Narrow persistence capability the client cache writes through to.
pub trait CacheStore: Send {
	fn save(&mut self, key: &str, record: &PersistentRecord) -> Result<()>;
	fn load(&self, key: &str) -> Result<Option<PersistentRecord>>;
	fn remove(&mut self, key: &str) -> Result<()>;
	fn list(&self) -> Result<Vec<String>>;
	fn total_size(&self) -> Result<u64>;
}

/// Volatile in-memory store, mainly for tests and warm process restarts.
#[derive(Debug, Default)]
pub struct MemoryStore {
	records: HashMap<String, Blob>,
}

impl MemoryStore {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}
}

impl CacheStore for MemoryStore {
	fn save(&mut self, key: &str, record: &PersistentRecord) -> Result<()> {
		self.records.insert(key.to_string(), record.encode()?);
		Ok(())
	}

	fn load(&self, key: &str) -> Result<Option<PersistentRecord>> {
		self.records.get(key).map(PersistentRecord::decode).transpose()
	}

	fn remove(&mut self, key: &str) -> Result<()> {
		self.records.remove(key);
		Ok(())
	}

	fn list(&self) -> Result<Vec<String>> {
		Ok(self.records.keys().cloned().collect())
	}

	fn total_size(&self) -> Result<u64> {
		Ok(self.records.values().map(|blob| blob.len() as u64).sum())
	}
}

/// File-backed store: one record file per key under a directory.
#[derive(Debug)]
pub struct FileStore {
	directory: PathBuf,
}

impl FileStore {
	pub fn new(directory: PathBuf) -> Result<Self> {
		std::fs::create_dir_all(&directory)
			.with_context(|| format!("creating cache store directory {directory:?}"))?;
		Ok(Self { directory })
	}

	/// Keys contain `:` separators; filenames replace them to stay portable.
	fn path_for(&self, key: &str) -> Result<PathBuf> {
		if key.is_empty() || key.contains(['/', '\\']) {
			bail!("invalid store key {key:?}");
		}
		Ok(self.directory.join(format!("{}.bin", key.replace(':', "_"))))
	}

	fn key_for(file_name: &str) -> Option<String> {
		file_name.strip_suffix(".bin").map(|stem| stem.replace('_', ":"))
	}
}

impl CacheStore for FileStore {
	#[context("saving cache record {key}")]
	fn save(&mut self, key: &str, record: &PersistentRecord) -> Result<()> {
		let path = self.path_for(key)?;
		std::fs::write(path, record.encode()?.as_slice())?;
		Ok(())
	}

	#[context("loading cache record {key}")]
	fn load(&self, key: &str) -> Result<Option<PersistentRecord>> {
		let path = self.path_for(key)?;
		match std::fs::read(&path) {
			Ok(bytes) => Ok(Some(PersistentRecord::decode(&Blob::from(bytes))?)),
			Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
			Err(error) => Err(error.into()),
		}
	}

	#[context("removing cache record {key}")]
	fn remove(&mut self, key: &str) -> Result<()> {
		let path = self.path_for(key)?;
		match std::fs::remove_file(path) {
			Ok(()) => Ok(()),
			Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(error) => Err(error.into()),
		}
	}

	fn list(&self) -> Result<Vec<String>> {
		let mut keys = Vec::new();
		for entry in std::fs::read_dir(&self.directory)? {
			let entry = entry?;
			if let Some(key) = entry.file_name().to_str().and_then(Self::key_for) {
				keys.push(key);
			}
		}
		Ok(keys)
	}

	fn total_size(&self) -> Result<u64> {
		let mut total = 0;
		for entry in std::fs::read_dir(&self.directory)? {
			total += entry?.metadata()?.len();
		}
		Ok(total)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample_record() -> PersistentRecord {
		PersistentRecord {
			image_id: "brain.jp3d".to_string(),
			resolution_level: 2,
			bin_class: 3,
			bin_id: 17,
			is_complete: true,
			quality_layer: 4,
			tile_index: 17,
			content_hash: 0xDEAD_BEEF_CAFE,
			created_at: "2025-11-03T10:15:30Z".to_string(),
			payload: Blob::from(vec![1, 2, 3, 4, 5]),
		}
	}

	#[test]
	fn record_encoding_roundtrip() {
		let record = sample_record();
		let encoded = record.encode().unwrap();
		assert_eq!(PersistentRecord::decode(&encoded).unwrap(), record);
	}

	#[test]
	fn memory_store_crud() {
		let mut store = MemoryStore::new();
		let record = sample_record();
		store.save("brain.jp3d:3:17", &record).unwrap();
		assert_eq!(store.load("brain.jp3d:3:17").unwrap(), Some(record));
		assert_eq!(store.list().unwrap().len(), 1);
		assert!(store.total_size().unwrap() > 0);
		store.remove("brain.jp3d:3:17").unwrap();
		assert_eq!(store.load("brain.jp3d:3:17").unwrap(), None);
	}

	#[test]
	fn file_store_roundtrip() {
		let dir = tempfile::tempdir().unwrap();
		let mut store = FileStore::new(dir.path().to_path_buf()).unwrap();
		let record = sample_record();
		store.save("brain.jp3d:0:0", &record).unwrap();
		store.save("brain.jp3d:3:17", &record).unwrap();

		let mut keys = store.list().unwrap();
		keys.sort();
		assert_eq!(keys, vec!["brain.jp3d:0:0", "brain.jp3d:3:17"]);
		assert_eq!(store.load("brain.jp3d:3:17").unwrap(), Some(record));
		assert!(store.total_size().unwrap() > 0);

		store.remove("brain.jp3d:0:0").unwrap();
		assert_eq!(store.load("brain.jp3d:0:0").unwrap(), None);
		// removing twice is fine
		store.remove("brain.jp3d:0:0").unwrap();
	}

	#[test]
	fn file_store_rejects_path_traversal() {
		let dir = tempfile::tempdir().unwrap();
		let store = FileStore::new(dir.path().to_path_buf()).unwrap();
		assert!(store.load("../evil").is_err());
		assert!(store.load("").is_err());
	}
}
