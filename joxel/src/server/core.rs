//! Request dispatch against the session and image registries.
//!
//! Dispatch is transport neutral: the HTTP and WebSocket surfaces both funnel
//! parsed requests through [`JpipServer::handle_request`]. A response carries
//! a status, protocol headers and the data bins to deliver; transports decide
//! how to put those on the wire.

use super::registry::{ImageEntry, ImageRegistry};
use crate::config::Config;
use dashmap::DashMap;
use joxel_codec::{DataBin, DataBinClass, TileLattice};
use joxel_core::{Blob, Viewport};
use joxel_jpip::{
	BandwidthThrottle, CacheKey, BinAttributes, JpipError, JpipRequest, JpipResponseHeaders, JpipSession,
	PredictivePushEngine, PushItem, PushManager, TileManager, TileManagerConfig, TilePrediction,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use uuid::Uuid;

/// Aggregate dispatch counters.
#[derive(Debug, Default)]
pub struct ServerStats {
	pub sessions_created: AtomicU64,
	pub sessions_reaped: AtomicU64,
	pub requests_served: AtomicU64,
	pub bytes_sent: AtomicU64,
	pub errors: AtomicU64,
}

/// One dispatched response.
#[derive(Debug)]
pub struct JpipResponse {
	pub status: u16,
	pub headers: JpipResponseHeaders,
	pub bins: Vec<DataBin>,
}

/// The transport-neutral server core.
pub struct JpipServer {
	config: Config,
	images: ImageRegistry,
	sessions: DashMap<String, Arc<Mutex<JpipSession>>>,
	throttle: Arc<BandwidthThrottle>,
	push: DashMap<String, Arc<Mutex<PushManager>>>,
	stats: ServerStats,
}

impl JpipServer {
	#[must_use]
	pub fn new(config: Config) -> Self {
		let throttle = Arc::new(BandwidthThrottle::new(
			config.throttle.per_client_bps,
			config.throttle.global_bps,
		));
		Self {
			config,
			images: ImageRegistry::new(),
			sessions: DashMap::new(),
			throttle,
			push: DashMap::new(),
			stats: ServerStats::default(),
		}
	}

	#[must_use]
	pub fn config(&self) -> &Config {
		&self.config
	}

	#[must_use]
	pub fn images(&self) -> &ImageRegistry {
		&self.images
	}

	#[must_use]
	pub fn stats(&self) -> &ServerStats {
		&self.stats
	}

	#[must_use]
	pub fn throttle(&self) -> &Arc<BandwidthThrottle> {
		&self.throttle
	}

	#[must_use]
	pub fn session_count(&self) -> usize {
		self.sessions.len()
	}

	/// Maps an error to the HTTP status the transports answer with.
	#[must_use]
	pub fn status_for(error: &JpipError) -> u16 {
		match error {
			JpipError::ProtocolError(_) => 400,
			JpipError::ChannelIdUnknown { .. } | JpipError::SessionNotFound { .. } | JpipError::TargetNotRegistered { .. } => 404,
			JpipError::SessionClosed { .. } => 410,
			JpipError::Timeout => 408,
			JpipError::BandwidthExceeded { .. } | JpipError::QueueFull => 503,
			_ => 500,
		}
	}

	/// Dispatches one parsed request.
	pub fn handle_request(&self, client: &str, request: &JpipRequest) -> Result<JpipResponse, JpipError> {
		let result = self.dispatch(client, request);
		match &result {
			Ok(response) => {
				self.stats.requests_served.fetch_add(1, Ordering::Relaxed);
				let bytes: usize = response.bins.iter().map(DataBin::len).sum();
				self.stats.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
			}
			Err(_) => {
				self.stats.errors.fetch_add(1, Ordering::Relaxed);
			}
		}
		result
	}

	fn dispatch(&self, client: &str, request: &JpipRequest) -> Result<JpipResponse, JpipError> {
		if request.new_channel.is_some() {
			return self.create_session(request);
		}

		let Some(channel_id) = &request.channel_id else {
			return Err(JpipError::ProtocolError("request names neither cid nor cnew".to_string()));
		};
		let session = self
			.sessions
			.get(channel_id)
			.map(|entry| Arc::clone(entry.value()))
			.ok_or_else(|| JpipError::ChannelIdUnknown {
				channel_id: channel_id.clone(),
			})?;

		let mut session = session.lock();
		session.touch()?;

		let target = request.target.clone().unwrap_or_else(|| session.target().to_string());
		let image = self.images.get(&target).ok_or_else(|| JpipError::TargetNotRegistered {
			target: target.clone(),
		})?;

		let mut bins = self.select_bins(&image, request, &mut session);
		if let Some(limit) = request.max_response_length {
			truncate_to_budget(&mut bins, limit);
		}

		let total: u64 = bins.iter().map(|bin| bin.len() as u64).sum();
		if !self.throttle.can_send(client, total) {
			return Err(JpipError::BandwidthExceeded {
				client: client.to_string(),
			});
		}
		self.throttle.record_sent(client, total);

		// remember what this session now holds, for delta delivery
		for bin in &bins {
			session.client_cache.add(
				CacheKey::new(target.clone(), bin.class, bin.id),
				bin.bytes.clone(),
				BinAttributes {
					resolution_level: request.resolution_levels.unwrap_or(0),
					is_complete: bin.is_complete,
					..BinAttributes::default()
				},
			);
		}

		self.feed_push_pipeline(&target, &image, request, session.session_id());

		let headers = JpipResponseHeaders::new()
			.with_capability(image.htj2k)
			.with_preference(request.coding_preference)
			.with_target_id(&target);
		Ok(JpipResponse {
			status: 200,
			headers,
			bins,
		})
	}

	fn create_session(&self, request: &JpipRequest) -> Result<JpipResponse, JpipError> {
		let target = request
			.target
			.clone()
			.ok_or_else(|| JpipError::ProtocolError("cnew without target".to_string()))?;
		let image = self.images.get(&target).ok_or_else(|| JpipError::TargetNotRegistered {
			target: target.clone(),
		})?;
		let transport = request.new_channel.expect("checked by caller");

		let session_id = Uuid::new_v4().simple().to_string();
		let channel_id = Uuid::new_v4().simple().to_string();
		let mut session = JpipSession::new(session_id, &target, self.config.cache.clone());
		session.bind_channel(&channel_id);
		if let Some(main_header) = image.bins.first() {
			session.client_cache.add(
				CacheKey::new(target.clone(), main_header.class, main_header.id),
				main_header.bytes.clone(),
				BinAttributes {
					is_complete: true,
					..BinAttributes::default()
				},
			);
		}
		self.sessions.insert(channel_id.clone(), Arc::new(Mutex::new(session)));
		self.stats.sessions_created.fetch_add(1, Ordering::Relaxed);
		log::info!("session created on channel {channel_id} for target {target:?}");

		let headers = JpipResponseHeaders::new()
			.with_new_channel(&channel_id, &self.config.server.jpip_path, transport)
			.with_capability(image.htj2k)
			.with_preference(request.coding_preference)
			.with_target_id(&target);
		Ok(JpipResponse {
			status: 200,
			headers,
			// a fresh channel always starts with the main header
			bins: image.bins.iter().take(1).cloned().collect(),
		})
	}

	/// Picks the bins answering a request, suppressing bins the session
	/// already holds.
	fn select_bins(&self, image: &ImageEntry, request: &JpipRequest, session: &mut JpipSession) -> Vec<DataBin> {
		let mut bins: Vec<DataBin> = image
			.bins
			.iter()
			.filter(|bin| self.bin_matches_region(image, bin, request))
			.filter(|bin| {
				let key = CacheKey::new(image.name.clone(), bin.class, bin.id);
				!session.client_cache.contains(&key)
			})
			.cloned()
			.collect();

		if request.want_metadata {
			let text = image.codestream.comments.join("\n");
			bins.push(DataBin::new(DataBinClass::Metadata, 0, Blob::from(text), true));
		}
		bins
	}

	/// Region-limited requests only receive tiles intersecting the window.
	fn bin_matches_region(&self, image: &ImageEntry, bin: &DataBin, request: &JpipRequest) -> bool {
		let (Some((width, height)), Some((x, y))) = (request.region_size, request.region_offset) else {
			return true;
		};
		if matches!(bin.class, DataBinClass::MainHeader | DataBinClass::Metadata) {
			return true;
		}
		let Ok(lattice) = TileLattice::from_siz(&image.codestream.siz) else {
			return true;
		};
		let Ok(tile) = lattice.tile_by_index(bin.id) else {
			return false;
		};
		let window = joxel_core::VolumeRegion::new(x, y, 0, width, height, image.codestream.siz.depth);
		tile.intersects(&window)
	}

	/// Viewport-shaped requests drive the predictive push pipeline.
	fn feed_push_pipeline(&self, target: &str, image: &ImageEntry, request: &JpipRequest, session_id: &str) {
		if !self.config.push.enabled {
			return;
		}
		let (Some((width, height)), Some((x, y))) = (request.region_size, request.region_offset) else {
			return;
		};
		let manager = self.push_manager_for(target, image);
		let level = request
			.resolution_levels
			.unwrap_or(image.codestream.cod.decomposition_levels);
		let viewport = Viewport::new(f64::from(x), f64::from(y), f64::from(width), f64::from(height), level);

		let lattice = match TileLattice::from_siz(&image.codestream.siz) {
			Ok(lattice) => lattice,
			Err(_) => return,
		};
		let bins = &image.bins;
		manager.lock().on_viewport_update(session_id, viewport, |prediction: &TilePrediction| {
			let tile_index = prediction.tile_y * lattice.tiles_x() + prediction.tile_x;
			bins
				.iter()
				.find(|bin| bin.class == DataBinClass::Tile && bin.id == tile_index)
				.cloned()
		});
	}

	fn push_manager_for(&self, target: &str, image: &ImageEntry) -> Arc<Mutex<PushManager>> {
		if let Some(manager) = self.push.get(target) {
			return Arc::clone(manager.value());
		}
		let siz = &image.codestream.siz;
		let tile_manager = TileManager::new(TileManagerConfig {
			image_width: siz.width,
			image_height: siz.height,
			tile_width: siz.tile_width,
			tile_height: siz.tile_height,
			component_count: siz.component_count(),
			max_resolution_levels: image.codestream.cod.decomposition_levels + 1,
			..TileManagerConfig::default()
		});
		let engine = PredictivePushEngine::new(self.config.push.engine.clone(), tile_manager);
		let manager = Arc::new(Mutex::new(PushManager::new(
			engine,
			self.config.push.queue_capacity,
			Arc::clone(&self.throttle),
		)));
		self.push.insert(target.to_string(), Arc::clone(&manager));
		manager
	}

	/// Drains queued pushes for one target.
	pub fn drain_pushes(&self, target: &str, max_items: usize) -> Vec<PushItem> {
		match self.push.get(target) {
			Some(manager) => manager.lock().drain(max_items),
			None => Vec::new(),
		}
	}

	/// Closes and removes sessions idle past the timeout. Returns the number
	/// reaped.
	pub fn reap_idle_sessions(&self) -> usize {
		let timeout = Duration::from_secs(self.config.server.session_timeout_secs);
		let mut reaped = Vec::new();
		self.sessions.retain(|channel_id, session| {
			let mut session = session.lock();
			if session.idle_for() > timeout {
				session.close();
				reaped.push((channel_id.clone(), session.session_id().to_string()));
				false
			} else {
				true
			}
		});
		for (channel_id, session_id) in &reaped {
			self.throttle.remove_client(channel_id);
			for manager in self.push.iter() {
				manager.value().lock().forget_session(session_id);
			}
			log::info!("reaped idle session on channel {channel_id}");
		}
		self.stats.sessions_reaped.fetch_add(reaped.len() as u64, Ordering::Relaxed);
		reaped.len()
	}
}

fn truncate_to_budget(bins: &mut Vec<DataBin>, limit: u64) {
	let mut used = 0u64;
	bins.retain(|bin| {
		used += bin.len() as u64;
		used <= limit
	});
}

#[cfg(test)]
mod tests {
	use super::*;
	use joxel_codec::{EncodeParams, Encoder, SampleVolume};

	fn server_with_image() -> JpipServer {
		let server = JpipServer::new(Config::default());
		let volume = SampleVolume::gradient(8, 8, 1, 8);
		let bytes = Encoder::new().encode(&volume, &EncodeParams::lossless((4, 4, 1), 1)).unwrap();
		server.images().register_bytes("scan", bytes).unwrap();
		server
	}

	fn open_channel(server: &JpipServer) -> String {
		let request = JpipRequest::from_query("cnew=http&target=scan").unwrap();
		let response = server.handle_request("client-1", &request).unwrap();
		let cnew = &response.headers.as_slice()[0].1;
		cnew
			.split(',')
			.find_map(|field| field.strip_prefix("cid="))
			.unwrap()
			.to_string()
	}

	#[test]
	fn cnew_creates_a_session() {
		let server = server_with_image();
		let request = JpipRequest::from_query("cnew=http&target=scan").unwrap();
		let response = server.handle_request("client-1", &request).unwrap();

		assert_eq!(response.status, 200);
		let headers = response.headers.as_slice();
		assert_eq!(headers[0].0, "JPIP-cnew");
		assert!(headers[0].1.contains("transport=http"));
		assert_eq!(server.session_count(), 1);
		// the main header rides along
		assert_eq!(response.bins.len(), 1);
		assert_eq!(response.bins[0].class, DataBinClass::MainHeader);
	}

	#[test]
	fn unknown_cid_is_a_client_error() {
		let server = server_with_image();
		let request = JpipRequest::from_query("cid=nope&target=scan").unwrap();
		let error = server.handle_request("client-1", &request).unwrap_err();
		assert_eq!(
			error,
			JpipError::ChannelIdUnknown {
				channel_id: "nope".to_string()
			}
		);
		assert_eq!(JpipServer::status_for(&error), 404);
	}

	#[test]
	fn missing_cid_and_cnew_rejected() {
		let server = server_with_image();
		let request = JpipRequest::from_query("target=scan").unwrap();
		let error = server.handle_request("client-1", &request).unwrap_err();
		assert_eq!(JpipServer::status_for(&error), 400);
	}

	#[test]
	fn unregistered_target_is_not_found() {
		let server = server_with_image();
		let request = JpipRequest::from_query("cnew=http&target=missing").unwrap();
		let error = server.handle_request("client-1", &request).unwrap_err();
		assert_eq!(
			error,
			JpipError::TargetNotRegistered {
				target: "missing".to_string()
			}
		);
		assert_eq!(JpipServer::status_for(&error), 404);
	}

	#[test]
	fn image_request_returns_bins_once() {
		let server = server_with_image();
		let channel = open_channel(&server);

		let request = JpipRequest::from_query(&format!("cid={channel}&target=scan")).unwrap();
		let response = server.handle_request("client-1", &request).unwrap();
		// 4 tile headers + 4 tile bodies + main header (already sent at cnew,
		// so suppressed by delta delivery)
		assert_eq!(response.bins.len(), 8);

		// asking again: the session has everything
		let response = server.handle_request("client-1", &request).unwrap();
		assert!(response.bins.is_empty());
	}

	#[test]
	fn region_limits_the_tile_set() {
		let server = server_with_image();
		let channel = open_channel(&server);

		// top-left quadrant of the 8x8 image with 4x4 tiles: one tile
		let request = JpipRequest::from_query(&format!("cid={channel}&rsiz=4,4&roff=0,0")).unwrap();
		let response = server.handle_request("client-1", &request).unwrap();
		let tiles: Vec<u32> = response
			.bins
			.iter()
			.filter(|bin| bin.class == DataBinClass::Tile)
			.map(|bin| bin.id)
			.collect();
		assert_eq!(tiles, vec![0]);
	}

	#[test]
	fn metadata_request_includes_a_metadata_bin() {
		let server = server_with_image();
		let channel = open_channel(&server);
		let request = JpipRequest::from_query(&format!("cid={channel}&meta=yes")).unwrap();
		let response = server.handle_request("client-1", &request).unwrap();
		assert!(response.bins.iter().any(|bin| bin.class == DataBinClass::Metadata));
	}

	#[test]
	fn len_budget_truncates_the_response() {
		let server = server_with_image();
		let channel = open_channel(&server);
		let request = JpipRequest::from_query(&format!("cid={channel}&len=100")).unwrap();
		let response = server.handle_request("client-1", &request).unwrap();
		let total: usize = response.bins.iter().map(DataBin::len).sum();
		assert!(total <= 100);
	}

	#[test]
	fn throttled_client_gets_bandwidth_error() {
		let mut config = Config::default();
		config.throttle.per_client_bps = Some(10);
		let server = JpipServer::new(config);
		let volume = SampleVolume::gradient(8, 8, 1, 8);
		let bytes = Encoder::new().encode(&volume, &EncodeParams::lossless((4, 4, 1), 1)).unwrap();
		server.images().register_bytes("scan", bytes).unwrap();

		let channel = open_channel(&server);
		let request = JpipRequest::from_query(&format!("cid={channel}&target=scan")).unwrap();
		let error = server.handle_request("client-1", &request).unwrap_err();
		assert!(matches!(error, JpipError::BandwidthExceeded { .. }));
		assert_eq!(JpipServer::status_for(&error), 503);
	}

	#[test]
	fn viewport_requests_feed_the_push_queue() {
		let server = server_with_image();
		let channel = open_channel(&server);
		let request = JpipRequest::from_query(&format!("cid={channel}&rsiz=4,4&roff=0,0&reslevels=1")).unwrap();
		server.handle_request("client-1", &request).unwrap();

		let pushes = server.drain_pushes("scan", 16);
		// neighbors of the requested tile, minus what the session already has
		assert!(!pushes.is_empty());
		assert!(pushes.iter().all(|item| item.bin.class == DataBinClass::Tile));
	}

	#[test]
	fn reaper_closes_idle_sessions() {
		let mut config = Config::default();
		config.server.session_timeout_secs = 0;
		let server = JpipServer::new(config);
		let volume = SampleVolume::gradient(8, 8, 1, 8);
		let bytes = Encoder::new().encode(&volume, &EncodeParams::lossless((4, 4, 1), 1)).unwrap();
		server.images().register_bytes("scan", bytes).unwrap();

		open_channel(&server);
		assert_eq!(server.session_count(), 1);
		std::thread::sleep(Duration::from_millis(10));
		assert_eq!(server.reap_idle_sessions(), 1);
		assert_eq!(server.session_count(), 0);
		assert_eq!(server.stats().sessions_reaped.load(Ordering::Relaxed), 1);
	}
}
