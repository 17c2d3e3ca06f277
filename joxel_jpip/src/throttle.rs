//! Token-bucket bandwidth limiting, per client and global.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Instant;

/// A linearly refilling token bucket. `None` as limit means unrestricted.
#[derive(Debug)]
struct TokenBucket {
	/// Refill rate and capacity in bytes per second; `None` = unlimited.
	limit: Option<u64>,
	tokens: f64,
	last_refill: Instant,
}

impl TokenBucket {
	fn new(limit: Option<u64>, now: Instant) -> Self {
		Self {
			limit,
			tokens: limit.map_or(0.0, |limit| limit as f64),
			last_refill: now,
		}
	}

	fn refill(&mut self, now: Instant) {
		let Some(limit) = self.limit else { return };
		let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
		self.tokens = (self.tokens + elapsed * limit as f64).min(limit as f64);
		self.last_refill = now;
	}

	fn has(&mut self, bytes: u64, now: Instant) -> bool {
		if self.limit.is_none() {
			return true;
		}
		self.refill(now);
		self.tokens >= bytes as f64
	}

	fn debit(&mut self, bytes: u64, now: Instant) {
		if self.limit.is_none() {
			return;
		}
		self.refill(now);
		self.tokens = (self.tokens - bytes as f64).max(0.0);
	}
}

/// Shared bandwidth limiter: one bucket per client plus one global bucket.
///
/// A send is admitted only when both buckets cover it; both are debited on
/// [`BandwidthThrottle::record_sent`].
#[derive(Debug)]
pub struct BandwidthThrottle {
	per_client_limit: Option<u64>,
	global: Mutex<TokenBucket>,
	clients: Mutex<HashMap<String, TokenBucket>>,
}

impl BandwidthThrottle {
	#[must_use]
	pub fn new(per_client_limit: Option<u64>, global_limit: Option<u64>) -> Self {
		Self {
			per_client_limit,
			global: Mutex::new(TokenBucket::new(global_limit, Instant::now())),
			clients: Mutex::new(HashMap::new()),
		}
	}

	/// `true` when both the client's bucket and the global bucket hold at
	/// least `bytes` tokens.
	#[must_use]
	pub fn can_send(&self, client: &str, bytes: u64) -> bool {
		let now = Instant::now();
		let mut clients = self.clients.lock();
		let bucket = clients
			.entry(client.to_string())
			.or_insert_with(|| TokenBucket::new(self.per_client_limit, now));
		bucket.has(bytes, now) && self.global.lock().has(bytes, now)
	}

	/// Debits `bytes` from the client's bucket and the global bucket.
	pub fn record_sent(&self, client: &str, bytes: u64) {
		let now = Instant::now();
		let mut clients = self.clients.lock();
		clients
			.entry(client.to_string())
			.or_insert_with(|| TokenBucket::new(self.per_client_limit, now))
			.debit(bytes, now);
		self.global.lock().debit(bytes, now);
	}

	/// Frees the bucket of a departed client.
	pub fn remove_client(&self, client: &str) {
		self.clients.lock().remove(client);
	}

	#[must_use]
	pub fn client_count(&self) -> usize {
		self.clients.lock().len()
	}
}
