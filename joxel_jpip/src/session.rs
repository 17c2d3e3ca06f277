//! Per-channel session state.
//!
//! A session exclusively owns its caches. Nothing else keeps a session alive:
//! the push pipeline and the server registry refer to sessions by id only.

use crate::cache::{CacheConfig, ClientCache, PrecinctCache};
use crate::error::{JpipError, Result};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// One client conversation and its state.
pub struct JpipSession {
	session_id: String,
	channel_id: Option<String>,
	target: String,
	active: bool,
	last_activity: Instant,
	pub client_cache: ClientCache,
	pub precinct_cache: PrecinctCache,
	metadata: HashMap<String, String>,
}

impl JpipSession {
	#[must_use]
	pub fn new(session_id: impl Into<String>, target: impl Into<String>, cache_config: CacheConfig) -> Self {
		Self {
			session_id: session_id.into(),
			channel_id: None,
			target: target.into(),
			active: true,
			last_activity: Instant::now(),
			client_cache: ClientCache::new(cache_config),
			precinct_cache: PrecinctCache::new(),
			metadata: HashMap::new(),
		}
	}

	#[must_use]
	pub fn session_id(&self) -> &str {
		&self.session_id
	}

	#[must_use]
	pub fn channel_id(&self) -> Option<&str> {
		self.channel_id.as_deref()
	}

	/// Binds the session to a transport channel.
	pub fn bind_channel(&mut self, channel_id: impl Into<String>) {
		self.channel_id = Some(channel_id.into());
	}

	#[must_use]
	pub fn target(&self) -> &str {
		&self.target
	}

	#[must_use]
	pub fn is_active(&self) -> bool {
		self.active
	}

	/// Bumps the activity stamp. Fails on a closed session.
	pub fn touch(&mut self) -> Result<()> {
		if !self.active {
			return Err(JpipError::SessionClosed {
				session_id: self.session_id.clone(),
			});
		}
		self.last_activity = Instant::now();
		Ok(())
	}

	/// Time since the last request on this session.
	#[must_use]
	pub fn idle_for(&self) -> Duration {
		self.last_activity.elapsed()
	}

	/// Closes the session and flushes both caches.
	pub fn close(&mut self) {
		if !self.active {
			return;
		}
		log::info!("closing session {}", self.session_id);
		self.active = false;
		self.client_cache.clear();
		self.precinct_cache.clear();
	}

	pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
		self.metadata.insert(key.into(), value.into());
	}

	#[must_use]
	pub fn metadata(&self, key: &str) -> Option<&str> {
		self.metadata.get(key).map(String::as_str)
	}
}
