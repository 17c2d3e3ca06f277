//! Resolution-aware client cache with deduplication, idle compression and
//! optional persistence.
//!
//! Eviction uses a resolution-weighted LRU score: each entry scores
//! `last_access_tick * weight(resolution_level)` with the default weight
//! `1 / (level + 1)`, and the smallest score is evicted first. Coarse levels
//! weigh more, so a freshly received thumbnail outlives an equally fresh
//! full-resolution refinement. Pinned entries are never evicted.

use super::store::{CacheStore, PersistentRecord};
use anyhow::Result;
use joxel_codec::DataBinClass;
use joxel_core::{Blob, decompress_gzip, compress_gzip};
use serde::Deserialize;
use siphasher::sip::SipHasher13;
use std::collections::HashMap;
use std::hash::Hasher;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Addresses one cached data bin.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct CacheKey {
	pub image_id: String,
	pub bin_class: DataBinClass,
	pub bin_id: u32,
}

impl CacheKey {
	#[must_use]
	pub fn new(image_id: impl Into<String>, bin_class: DataBinClass, bin_id: u32) -> Self {
		Self {
			image_id: image_id.into(),
			bin_class,
			bin_id,
		}
	}

	/// The store key, `image:class:id`.
	#[must_use]
	pub fn store_key(&self) -> String {
		format!("{}:{}:{}", self.image_id, self.bin_class.as_u8(), self.bin_id)
	}
}

/// Descriptive attributes carried alongside the payload.
#[derive(Clone, Copy, Debug, Default)]
pub struct BinAttributes {
	pub resolution_level: u8,
	pub is_complete: bool,
	pub quality_layer: u8,
	pub tile_index: u32,
}

#[derive(Clone, Debug)]
struct CacheEntry {
	payload: Arc<Blob>,
	attributes: BinAttributes,
	content_hash: u64,
	created_at: SystemTime,
	last_access_tick: u64,
	last_access_at: Instant,
	access_count: u64,
	pinned: bool,
	compressed: bool,
	/// Payload length before compression; equals `payload.len()` otherwise.
	logical_size: usize,
}

/// Limits and feature switches of the client cache.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
	pub max_entries: usize,
	pub max_memory: usize,
	pub enable_dedup: bool,
	pub enable_compression: bool,
	/// Seconds an entry must sit unaccessed before the compression sweep
	/// picks it up.
	pub compression_inactivity_threshold: u64,
}

impl Default for CacheConfig {
	fn default() -> Self {
		Self {
			max_entries: 10_000,
			max_memory: 256 * 1024 * 1024,
			enable_dedup: true,
			enable_compression: false,
			compression_inactivity_threshold: 300,
		}
	}
}

/// Hit/miss and size counters.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CacheStats {
	pub entry_count: usize,
	pub total_size: usize,
	pub hits: u64,
	pub misses: u64,
	pub evictions: u64,
}

impl CacheStats {
	/// `hits / (hits + misses)`; zero before the first access.
	#[must_use]
	pub fn hit_rate(&self) -> f64 {
		let accesses = self.hits + self.misses;
		if accesses == 0 {
			0.0
		} else {
			self.hits as f64 / accesses as f64
		}
	}
}

/// Byte savings from deduplication and idle compression.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CacheEfficiency {
	pub compression_bytes_saved: usize,
	pub dedup_bytes_saved: usize,
}

/// The per-session data-bin cache.
pub struct ClientCache {
	config: CacheConfig,
	entries: HashMap<CacheKey, CacheEntry>,
	/// Content hash → shared backing bytes, for deduplication.
	by_hash: HashMap<u64, std::sync::Weak<Blob>>,
	stats: CacheStats,
	efficiency: CacheEfficiency,
	tick: u64,
	store: Option<Box<dyn CacheStore>>,
}

fn content_hash(bytes: &[u8]) -> u64 {
	let mut hasher = SipHasher13::new();
	hasher.write(bytes);
	hasher.finish()
}

fn resolution_weight(level: u8) -> f64 {
	1.0 / (f64::from(level) + 1.0)
}

impl ClientCache {
	#[must_use]
	pub fn new(config: CacheConfig) -> Self {
		Self {
			config,
			entries: HashMap::new(),
			by_hash: HashMap::new(),
			stats: CacheStats::default(),
			efficiency: CacheEfficiency::default(),
			tick: 0,
			store: None,
		}
	}

	/// Attaches a write-through persistence backend.
	#[must_use]
	pub fn with_store(mut self, store: Box<dyn CacheStore>) -> Self {
		self.store = Some(store);
		self
	}

	fn next_tick(&mut self) -> u64 {
		self.tick += 1;
		self.tick
	}

	/// Inserts or updates an entry. Never rejects: when limits are exceeded,
	/// unpinned entries are evicted until both limits hold again.
	pub fn add(&mut self, key: CacheKey, payload: Blob, attributes: BinAttributes) {
		let hash = content_hash(payload.as_slice());
		let size = payload.len();
		let tick = self.next_tick();

		if let Some(entry) = self.entries.get_mut(&key) {
			// Key hit: replace bytes in place, entry count stays flat.
			self.stats.total_size = self.stats.total_size - entry.logical_size + size;
			if entry.compressed {
				self.efficiency.compression_bytes_saved =
					self.efficiency.compression_bytes_saved.saturating_sub(entry.logical_size - entry.payload.len());
			}
			entry.payload = Arc::new(payload);
			entry.attributes = attributes;
			entry.content_hash = hash;
			entry.last_access_tick = tick;
			entry.last_access_at = Instant::now();
			entry.compressed = false;
			entry.logical_size = size;
		} else {
			let shared = if self.config.enable_dedup {
				self.by_hash.get(&hash).and_then(std::sync::Weak::upgrade)
			} else {
				None
			};
			let payload = match shared {
				Some(shared) if shared.len() == size => {
					self.efficiency.dedup_bytes_saved += size;
					shared
				}
				_ => {
					let fresh = Arc::new(payload);
					if self.config.enable_dedup {
						self.by_hash.insert(hash, Arc::downgrade(&fresh));
					}
					fresh
				}
			};
			self.stats.total_size += size;
			self.entries.insert(
				key.clone(),
				CacheEntry {
					payload,
					attributes,
					content_hash: hash,
					created_at: SystemTime::now(),
					last_access_tick: tick,
					last_access_at: Instant::now(),
					access_count: 0,
					pinned: false,
					compressed: false,
					logical_size: size,
				},
			);
		}

		self.enforce_limits();
		self.write_through(&key);
	}

	/// Looks an entry up, transparently decompressing it.
	pub fn get(&mut self, key: &CacheKey) -> Option<Arc<Blob>> {
		let tick = self.next_tick();
		let mut corrupt = false;
		let mut found = None;
		if let Some(entry) = self.entries.get_mut(key) {
			if entry.compressed {
				match decompress_gzip(&entry.payload) {
					Ok(original) => {
						self.efficiency.compression_bytes_saved = self
							.efficiency
							.compression_bytes_saved
							.saturating_sub(entry.logical_size - entry.payload.len());
						entry.payload = Arc::new(original);
						entry.compressed = false;
					}
					Err(error) => {
						log::warn!("dropping undecompressable cache entry {key:?}: {error}");
						corrupt = true;
					}
				}
			}
			if !corrupt {
				entry.last_access_tick = tick;
				entry.last_access_at = Instant::now();
				entry.access_count += 1;
				found = Some(Arc::clone(&entry.payload));
			}
		}
		if corrupt {
			self.remove_entry_key(key);
		}
		match found {
			Some(payload) => {
				self.stats.hits += 1;
				Some(payload)
			}
			None => {
				self.stats.misses += 1;
				None
			}
		}
	}

	#[must_use]
	pub fn contains(&self, key: &CacheKey) -> bool {
		self.entries.contains_key(key)
	}

	/// Marks an entry as immune to eviction.
	pub fn pin(&mut self, key: &CacheKey) -> bool {
		match self.entries.get_mut(key) {
			Some(entry) => {
				entry.pinned = true;
				true
			}
			None => false,
		}
	}

	pub fn unpin(&mut self, key: &CacheKey) -> bool {
		match self.entries.get_mut(key) {
			Some(entry) => {
				entry.pinned = false;
				true
			}
			None => false,
		}
	}

	fn remove_entry_key(&mut self, key: &CacheKey) {
		if let Some(entry) = self.entries.remove(key) {
			self.stats.total_size -= entry.logical_size;
			if entry.compressed {
				self.efficiency.compression_bytes_saved = self
					.efficiency
					.compression_bytes_saved
					.saturating_sub(entry.logical_size - entry.payload.len());
			}
		}
	}

	/// Evicts the lowest-scoring unpinned entries until both the entry and
	/// memory limits hold.
	fn enforce_limits(&mut self) {
		while self.entries.len() > self.config.max_entries || self.stats.total_size > self.config.max_memory {
			let victim = self
				.entries
				.iter()
				.filter(|(_, entry)| !entry.pinned)
				.min_by(|(_, a), (_, b)| {
					let score_a = a.last_access_tick as f64 * resolution_weight(a.attributes.resolution_level);
					let score_b = b.last_access_tick as f64 * resolution_weight(b.attributes.resolution_level);
					score_a.total_cmp(&score_b)
				})
				.map(|(key, _)| key.clone());
			match victim {
				Some(key) => {
					log::debug!("evicting cache entry {key:?}");
					self.remove_entry_key(&key);
					self.stats.evictions += 1;
				}
				None => break, // everything pinned
			}
		}
	}

	fn write_through(&mut self, key: &CacheKey) {
		let Some(store) = &mut self.store else { return };
		let Some(entry) = self.entries.get(key) else { return };
		let record = record_from_entry(key, entry);
		if let Err(error) = store.save(&key.store_key(), &record) {
			log::warn!("cache write-through failed for {key:?}: {error}");
		}
	}

	/// Removes all entries of one image. Returns the number removed.
	pub fn evict_image(&mut self, image_id: &str) -> usize {
		let keys: Vec<CacheKey> = self
			.entries
			.keys()
			.filter(|key| key.image_id == image_id)
			.cloned()
			.collect();
		for key in &keys {
			self.remove_entry_key(key);
		}
		keys.len()
	}

	/// Removes all entries at one resolution level. Returns the number removed.
	pub fn evict_resolution(&mut self, level: u8) -> usize {
		let keys: Vec<CacheKey> = self
			.entries
			.iter()
			.filter(|(_, entry)| entry.attributes.resolution_level == level)
			.map(|(key, _)| key.clone())
			.collect();
		for key in &keys {
			self.remove_entry_key(key);
		}
		keys.len()
	}

	/// Removes entries created before `cutoff`. Returns the number removed.
	pub fn evict_older_than(&mut self, cutoff: SystemTime) -> usize {
		let keys: Vec<CacheKey> = self
			.entries
			.iter()
			.filter(|(_, entry)| entry.created_at < cutoff)
			.map(|(key, _)| key.clone())
			.collect();
		for key in &keys {
			self.remove_entry_key(key);
		}
		keys.len()
	}

	pub fn clear(&mut self) {
		self.entries.clear();
		self.by_hash.clear();
		self.stats.total_size = 0;
	}

	/// Compresses entries idle past the configured threshold. Entries sharing
	/// deduplicated bytes are skipped. Returns the number compressed.
	pub fn compress_idle(&mut self) -> usize {
		if !self.config.enable_compression {
			return 0;
		}
		let threshold = Duration::from_secs(self.config.compression_inactivity_threshold);
		let mut compressed = 0;
		let mut saved = 0;
		for entry in self.entries.values_mut() {
			if entry.compressed || entry.pinned || Arc::strong_count(&entry.payload) > 1 {
				continue;
			}
			if entry.last_access_at.elapsed() < threshold {
				continue;
			}
			match compress_gzip(&entry.payload) {
				Ok(smaller) if smaller.len() < entry.logical_size => {
					saved += entry.logical_size - smaller.len();
					entry.payload = Arc::new(smaller);
					entry.compressed = true;
					compressed += 1;
				}
				Ok(_) => {}
				Err(error) => log::warn!("idle compression failed: {error}"),
			}
		}
		self.efficiency.compression_bytes_saved += saved;
		compressed
	}

	#[must_use]
	pub fn stats(&self) -> CacheStats {
		CacheStats {
			entry_count: self.entries.len(),
			..self.stats
		}
	}

	#[must_use]
	pub fn efficiency(&self) -> CacheEfficiency {
		self.efficiency
	}

	/// Loads all records from the attached store into memory.
	pub fn warm_up(&mut self) -> Result<usize> {
		let Some(store) = &mut self.store else { return Ok(0) };
		let mut loaded = 0;
		for key in store.list()? {
			let Some(record) = store.load(&key)? else { continue };
			let cache_key = CacheKey::new(
				record.image_id.clone(),
				DataBinClass::from_u8(record.bin_class)?,
				record.bin_id,
			);
			if self.entries.contains_key(&cache_key) {
				continue;
			}
			self.tick += 1;
			let tick = self.tick;
			let size = record.payload.len();
			let created_at = OffsetDateTime::parse(&record.created_at, &Rfc3339)
				.map(SystemTime::from)
				.unwrap_or_else(|_| SystemTime::now());
			self.stats.total_size += size;
			self.entries.insert(
				cache_key,
				CacheEntry {
					payload: Arc::new(record.payload),
					attributes: BinAttributes {
						resolution_level: record.resolution_level,
						is_complete: record.is_complete,
						quality_layer: record.quality_layer,
						tile_index: record.tile_index,
					},
					content_hash: record.content_hash,
					created_at,
					last_access_tick: tick,
					last_access_at: Instant::now(),
					access_count: 0,
					pinned: false,
					compressed: false,
					logical_size: size,
				},
			);
			loaded += 1;
		}
		self.enforce_limits();
		Ok(loaded)
	}

	/// Writes every in-memory entry to the attached store.
	pub fn save_to_persistent_storage(&mut self) -> Result<usize> {
		let Some(store) = &mut self.store else { return Ok(0) };
		let mut saved = 0;
		for (key, entry) in &self.entries {
			store.save(&key.store_key(), &record_from_entry(key, entry))?;
			saved += 1;
		}
		Ok(saved)
	}
}

fn record_from_entry(key: &CacheKey, entry: &CacheEntry) -> PersistentRecord {
	let created_at = OffsetDateTime::from(entry.created_at)
		.format(&Rfc3339)
		.unwrap_or_default();
	PersistentRecord {
		image_id: key.image_id.clone(),
		resolution_level: entry.attributes.resolution_level,
		bin_class: key.bin_class.as_u8(),
		bin_id: key.bin_id,
		is_complete: entry.attributes.is_complete,
		quality_layer: entry.attributes.quality_layer,
		tile_index: entry.attributes.tile_index,
		content_hash: entry.content_hash,
		created_at,
		payload: (*entry.payload).clone(),
	}
}

#[cfg(test)]
mod tests {
	use super::super::store::MemoryStore;
	use super::*;

	fn key(id: u32) -> CacheKey {
		CacheKey::new("image", DataBinClass::Tile, id)
	}

	fn attrs(level: u8) -> BinAttributes {
		BinAttributes {
			resolution_level: level,
			is_complete: true,
			..BinAttributes::default()
		}
	}

	fn small_cache(max_entries: usize, max_memory: usize) -> ClientCache {
		ClientCache::new(CacheConfig {
			max_entries,
			max_memory,
			enable_dedup: false,
			..CacheConfig::default()
		})
	}

	#[test]
	fn add_and_get() {
		let mut cache = small_cache(10, 1000);
		cache.add(key(1), Blob::from(vec![1, 2, 3]), attrs(0));
		assert_eq!(cache.get(&key(1)).unwrap().as_slice(), &[1, 2, 3]);
		assert!(cache.get(&key(2)).is_none());

		let stats = cache.stats();
		assert_eq!(stats.entry_count, 1);
		assert_eq!(stats.total_size, 3);
		assert_eq!(stats.hits, 1);
		assert_eq!(stats.misses, 1);
		assert_eq!(stats.hit_rate(), 0.5);
	}

	#[test]
	fn hit_rate_zero_without_accesses() {
		let cache = small_cache(10, 1000);
		assert_eq!(cache.stats().hit_rate(), 0.0);
	}

	#[test]
	fn updating_a_key_does_not_grow_entry_count() {
		let mut cache = small_cache(10, 1000);
		cache.add(key(1), Blob::from(vec![1, 2, 3]), attrs(0));
		cache.add(key(1), Blob::from(vec![9; 10]), attrs(0));
		let stats = cache.stats();
		assert_eq!(stats.entry_count, 1);
		assert_eq!(stats.total_size, 10);
	}

	#[test]
	fn resolution_weighted_eviction_prefers_fine_levels() {
		// Entry limit 2: the third 20-byte insert forces one eviction.
		let mut cache = small_cache(2, 100);
		cache.add(key(0), Blob::from(vec![0; 20]), attrs(0));
		cache.add(key(5), Blob::from(vec![1; 20]), attrs(5));
		cache.add(key(9), Blob::from(vec![2; 20]), attrs(1));

		// level 0 survives although it is the oldest; level 5 was evicted
		assert!(cache.contains(&key(0)));
		assert!(!cache.contains(&key(5)));
		assert!(cache.contains(&key(9)));
	}

	#[test]
	fn pinned_entries_survive_eviction() {
		let mut cache = small_cache(2, 1000);
		cache.add(key(5), Blob::from(vec![1; 10]), attrs(5));
		cache.pin(&key(5));
		cache.add(key(0), Blob::from(vec![0; 10]), attrs(0));
		cache.add(key(1), Blob::from(vec![2; 10]), attrs(1));

		assert!(cache.contains(&key(5)));
		assert_eq!(cache.stats().entry_count, 2);
	}

	#[test]
	fn memory_limit_enforced() {
		let mut cache = small_cache(100, 50);
		for id in 0..10 {
			cache.add(key(id), Blob::from(vec![0; 10]), attrs(0));
		}
		assert!(cache.stats().total_size <= 50);
		assert_eq!(cache.stats().entry_count, 5);
	}

	#[test]
	fn dedup_shares_backing_bytes() {
		let mut cache = ClientCache::new(CacheConfig {
			max_entries: 10,
			max_memory: 10_000,
			enable_dedup: true,
			..CacheConfig::default()
		});
		cache.add(key(1), Blob::from(vec![7; 100]), attrs(0));
		cache.add(key(2), Blob::from(vec![7; 100]), attrs(0));

		assert_eq!(cache.efficiency().dedup_bytes_saved, 100);
		let a = cache.get(&key(1)).unwrap();
		let b = cache.get(&key(2)).unwrap();
		assert!(Arc::ptr_eq(&a, &b));
		// logical size still counts both entries
		assert_eq!(cache.stats().total_size, 200);
	}

	#[test]
	fn targeted_eviction_apis() {
		let mut cache = small_cache(100, 10_000);
		cache.add(CacheKey::new("a", DataBinClass::Tile, 1), Blob::from(vec![1]), attrs(0));
		cache.add(CacheKey::new("a", DataBinClass::Tile, 2), Blob::from(vec![2]), attrs(3));
		cache.add(CacheKey::new("b", DataBinClass::Tile, 1), Blob::from(vec![3]), attrs(3));

		assert_eq!(cache.evict_resolution(3), 2);
		assert_eq!(cache.stats().entry_count, 1);
		assert_eq!(cache.evict_image("a"), 1);
		assert_eq!(cache.stats().entry_count, 0);
		assert_eq!(cache.stats().total_size, 0);
	}

	#[test]
	fn evict_older_than_cutoff() {
		let mut cache = small_cache(100, 10_000);
		cache.add(key(1), Blob::from(vec![1]), attrs(0));
		let cutoff = SystemTime::now() + Duration::from_secs(1);
		assert_eq!(cache.evict_older_than(cutoff), 1);
		assert_eq!(cache.evict_older_than(SystemTime::UNIX_EPOCH), 0);
	}

	#[test]
	fn clear_resets_size() {
		let mut cache = small_cache(100, 10_000);
		cache.add(key(1), Blob::from(vec![1, 2, 3]), attrs(0));
		cache.clear();
		assert_eq!(cache.stats().entry_count, 0);
		assert_eq!(cache.stats().total_size, 0);
	}

	#[test]
	fn idle_compression_roundtrips_on_access() {
		let mut cache = ClientCache::new(CacheConfig {
			max_entries: 10,
			max_memory: 1_000_000,
			enable_dedup: false,
			enable_compression: true,
			compression_inactivity_threshold: 0,
		});
		let payload: Vec<u8> = std::iter::repeat_n([0u8, 1, 2, 3], 1000).flatten().collect();
		cache.add(key(1), Blob::from(payload.clone()), attrs(0));

		assert_eq!(cache.compress_idle(), 1);
		assert!(cache.efficiency().compression_bytes_saved > 0);
		// transparently decompressed on access
		assert_eq!(cache.get(&key(1)).unwrap().as_slice(), payload.as_slice());
		assert_eq!(cache.efficiency().compression_bytes_saved, 0);
	}

	#[test]
	fn persistence_roundtrip() {
		let mut cache = ClientCache::new(CacheConfig::default()).with_store(Box::new(MemoryStore::new()));
		cache.add(key(1), Blob::from(vec![1, 2, 3]), attrs(2));
		cache.add(key(2), Blob::from(vec![4, 5]), attrs(0));
		assert_eq!(cache.save_to_persistent_storage().unwrap(), 2);

		// a fresh cache over the same store sees nothing until warmed up
		let mut restored = ClientCache::new(CacheConfig::default());
		assert!(restored.warm_up().unwrap() == 0);

		cache.clear();
		assert_eq!(cache.warm_up().unwrap(), 2);
		assert_eq!(cache.get(&key(1)).unwrap().as_slice(), &[1, 2, 3]);
	}
}
