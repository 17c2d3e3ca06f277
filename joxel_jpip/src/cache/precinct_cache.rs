//! Accumulation of partially received precincts.
//!
//! A precinct arrives as quality-layer increments, possibly spread over many
//! messages. The cache appends bytes in arrival order (quality-layer order by
//! protocol contract), unions the received layer set and flips to complete
//! when the sender says so.

use joxel_core::Blob;
use std::collections::{BTreeSet, HashMap};

/// Identifies one precinct in the codestream lattice.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct PrecinctKey {
	pub tile: u32,
	pub component: u16,
	pub resolution: u8,
	pub px: u32,
	pub py: u32,
	pub pz: u32,
}

#[derive(Clone, Debug, Default)]
struct PrecinctEntry {
	bytes: Blob,
	layers: BTreeSet<u8>,
	is_complete: bool,
}

/// Counters over the cached precinct population.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PrecinctStats {
	pub total: usize,
	pub complete: usize,
	pub partial: usize,
	pub total_size: usize,
	pub hits: u64,
	pub misses: u64,
}

impl PrecinctStats {
	/// `complete / total`; zero when empty.
	#[must_use]
	pub fn completion_rate(&self) -> f64 {
		if self.total == 0 {
			0.0
		} else {
			self.complete as f64 / self.total as f64
		}
	}
}

/// Cache of partial precincts, keyed by lattice position.
#[derive(Debug, Default)]
pub struct PrecinctCache {
	entries: HashMap<PrecinctKey, PrecinctEntry>,
	hits: u64,
	misses: u64,
}

impl PrecinctCache {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Merges an increment into the stored precinct.
	///
	/// Bytes append in call order; `layers` union into the received set;
	/// completeness only ever upgrades.
	pub fn merge_precinct(&mut self, key: PrecinctKey, bytes: &[u8], layers: &[u8], is_complete: bool) {
		let entry = self.entries.entry(key).or_default();
		entry.bytes.append(bytes);
		entry.layers.extend(layers.iter().copied());
		entry.is_complete |= is_complete;
	}

	#[must_use]
	pub fn has_precinct(&self, key: &PrecinctKey) -> bool {
		self.entries.contains_key(key)
	}

	#[must_use]
	pub fn is_precinct_complete(&self, key: &PrecinctKey) -> bool {
		self.entries.get(key).is_some_and(|entry| entry.is_complete)
	}

	/// The accumulated bytes and received layers of a precinct.
	pub fn get(&mut self, key: &PrecinctKey) -> Option<(&Blob, Vec<u8>)> {
		match self.entries.get(key) {
			Some(entry) => {
				self.hits += 1;
				Some((&entry.bytes, entry.layers.iter().copied().collect()))
			}
			None => {
				self.misses += 1;
				None
			}
		}
	}

	/// All precinct keys of one tile.
	#[must_use]
	pub fn precincts_for_tile(&self, tile: u32) -> Vec<PrecinctKey> {
		let mut keys: Vec<PrecinctKey> = self.entries.keys().filter(|key| key.tile == tile).copied().collect();
		keys.sort_by_key(|key| (key.component, key.resolution, key.pz, key.py, key.px));
		keys
	}

	/// All precinct keys at one resolution level.
	#[must_use]
	pub fn precincts_for_resolution(&self, resolution: u8) -> Vec<PrecinctKey> {
		let mut keys: Vec<PrecinctKey> = self
			.entries
			.keys()
			.filter(|key| key.resolution == resolution)
			.copied()
			.collect();
		keys.sort_by_key(|key| (key.tile, key.component, key.pz, key.py, key.px));
		keys
	}

	/// Drops all precincts of one tile. Returns the number dropped.
	pub fn invalidate_tile(&mut self, tile: u32) -> usize {
		let before = self.entries.len();
		self.entries.retain(|key, _| key.tile != tile);
		before - self.entries.len()
	}

	/// Drops all precincts at one resolution level. Returns the number dropped.
	pub fn invalidate_resolution(&mut self, resolution: u8) -> usize {
		let before = self.entries.len();
		self.entries.retain(|key, _| key.resolution != resolution);
		before - self.entries.len()
	}

	pub fn clear(&mut self) {
		self.entries.clear();
	}

	#[must_use]
	pub fn stats(&self) -> PrecinctStats {
		let complete = self.entries.values().filter(|entry| entry.is_complete).count();
		PrecinctStats {
			total: self.entries.len(),
			complete,
			partial: self.entries.len() - complete,
			total_size: self.entries.values().map(|entry| entry.bytes.len()).sum(),
			hits: self.hits,
			misses: self.misses,
		}
	}
}
