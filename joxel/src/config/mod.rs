//! Server configuration, deserialized from a YAML file.
//!
//! ```yaml
//! server:
//!   ip: 0.0.0.0
//!   port: 8080
//! targets:
//!   - name: brain
//!     path: testdata/brain.jp3d
//! throttle:
//!   per_client_bps: 2000000
//! ```

use anyhow::{Context, Result};
use joxel_derive::context;
use joxel_jpip::{BandwidthConfig, CacheConfig, PushEngineConfig, SchedulerConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Network and lifecycle settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
	pub ip: String,
	pub port: u16,
	/// Sessions idle longer than this are reaped.
	pub session_timeout_secs: u64,
	/// Sweep interval of the session reaper.
	pub reaper_interval_secs: u64,
	pub request_queue_capacity: usize,
	/// Mount path of the interactive endpoint.
	pub jpip_path: String,
	pub request_timeout_secs: u64,
	pub max_concurrent_requests: usize,
}

impl Default for ServerConfig {
	fn default() -> Self {
		Self {
			ip: "0.0.0.0".to_string(),
			port: 8080,
			session_timeout_secs: 300,
			reaper_interval_secs: 30,
			request_queue_capacity: 256,
			jpip_path: "/jpip".to_string(),
			request_timeout_secs: 30,
			max_concurrent_requests: 256,
		}
	}
}

/// One image to register at startup.
#[derive(Clone, Debug, Deserialize)]
pub struct TargetConfig {
	pub name: String,
	pub path: PathBuf,
}

/// Bandwidth limits; absent values mean unrestricted.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
	pub per_client_bps: Option<u64>,
	pub global_bps: Option<u64>,
}

/// Push pipeline settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PushConfig {
	pub enabled: bool,
	pub queue_capacity: usize,
	pub engine: PushEngineConfig,
}

impl Default for PushConfig {
	fn default() -> Self {
		Self {
			enabled: true,
			queue_capacity: 128,
			engine: PushEngineConfig::default(),
		}
	}
}

/// The whole configuration file.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
	pub server: ServerConfig,
	pub targets: Vec<TargetConfig>,
	pub cache: CacheConfig,
	pub throttle: ThrottleConfig,
	pub bandwidth: BandwidthConfig,
	pub scheduler: SchedulerConfig,
	pub push: PushConfig,
	pub transport: crate::transport::HttpTransportConfig,
}

impl Config {
	#[context("loading configuration from {path:?}")]
	pub fn from_file(path: &Path) -> Result<Config> {
		let text = std::fs::read_to_string(path).context("reading configuration file")?;
		Self::from_str(&text)
	}

	pub fn from_str(text: &str) -> Result<Config> {
		Ok(serde_yaml_ng::from_str(text)?)
	}
}
