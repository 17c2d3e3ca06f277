//! Client-side WebSocket connection with keepalive and reconnection.
//!
//! The connection task owns the socket. Outgoing frames arrive over a
//! channel, incoming frames are forwarded to another; dropped connections are
//! retried with jittered exponential backoff until the policy gives up, and a
//! successful connect resets the attempt counter. Keepalive pings double as
//! RTT probes for the bandwidth estimator.

use super::backoff::{ConnectionState, ReconnectConfig, ReconnectPolicy};
use super::frame::{FrameType, WsFrame};
use anyhow::{Context, Result, bail};
use futures::{SinkExt, StreamExt};
use joxel_jpip::BandwidthEstimator;
use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Client connection tuning.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct WsClientConfig {
	pub url: String,
	pub ping_interval_ms: u64,
	pub reconnect: ReconnectConfig,
}

impl Default for WsClientConfig {
	fn default() -> Self {
		Self {
			url: "ws://127.0.0.1:8080/jpip/ws".to_string(),
			ping_interval_ms: 15_000,
			reconnect: ReconnectConfig::default(),
		}
	}
}

/// A reconnecting WebSocket client.
pub struct WsClient {
	config: WsClientConfig,
	state: Arc<Mutex<ConnectionState>>,
	estimator: Arc<Mutex<BandwidthEstimator>>,
}

impl WsClient {
	#[must_use]
	pub fn new(config: WsClientConfig, estimator: Arc<Mutex<BandwidthEstimator>>) -> Self {
		Self {
			config,
			state: Arc::new(Mutex::new(ConnectionState::Disconnected)),
			estimator,
		}
	}

	/// Observable connection state.
	#[must_use]
	pub fn state_handle(&self) -> Arc<Mutex<ConnectionState>> {
		Arc::clone(&self.state)
	}

	fn set_state(&self, state: ConnectionState) {
		*self.state.lock() = state;
	}

	/// Runs the connection until `outgoing` closes or reconnection gives up.
	///
	/// Transport errors inside the reconnect window are absorbed; once the
	/// policy is exhausted the final error surfaces to the caller.
	pub async fn run(
		mut self,
		incoming: mpsc::Sender<WsFrame>,
		mut outgoing: mpsc::Receiver<WsFrame>,
	) -> Result<()> {
		let mut policy = ReconnectPolicy::new(self.config.reconnect.clone());
		loop {
			self.set_state(ConnectionState::Connecting);
			match self.run_once(&mut policy, &incoming, &mut outgoing).await {
				Ok(()) => {
					self.set_state(ConnectionState::Disconnected);
					return Ok(());
				}
				Err(error) => {
					log::warn!("connection to {} failed: {error}", self.config.url);
				}
			}
			self.set_state(ConnectionState::Disconnected);

			let Some(delay) = policy.next_delay() else {
				bail!("giving up on {} after {} attempts", self.config.url, policy.attempts_made());
			};
			log::debug!("reconnecting to {} in {delay:?}", self.config.url);
			tokio::time::sleep(delay).await;
		}
	}

	async fn run_once(
		&mut self,
		policy: &mut ReconnectPolicy,
		incoming: &mpsc::Sender<WsFrame>,
		outgoing: &mut mpsc::Receiver<WsFrame>,
	) -> Result<()> {
		let (socket, _response) = connect_async(&self.config.url)
			.await
			.context("websocket connect failed")?;
		let (mut sink, mut stream) = socket.split();
		self.set_state(ConnectionState::Connected);
		// a successful connect restarts the backoff schedule
		policy.reset();
		log::info!("connected to {}", self.config.url);

		let mut ping_timer = tokio::time::interval(Duration::from_millis(self.config.ping_interval_ms.max(1)));
		ping_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
		ping_timer.tick().await; // immediate first tick
		let mut last_ping: Option<Instant> = None;

		loop {
			tokio::select! {
				frame = outgoing.recv() => {
					match frame {
						Some(frame) => {
							sink
								.send(Message::Binary(frame.serialize().into_vec().into()))
								.await
								.context("websocket send failed")?;
						}
						None => {
							// caller hung up: close cleanly
							self.set_state(ConnectionState::Closing);
							let _ = sink.send(Message::Close(None)).await;
							return Ok(());
						}
					}
				}
				_ = ping_timer.tick() => {
					last_ping = Some(Instant::now());
					sink
						.send(Message::Binary(WsFrame::ping().serialize().into_vec().into()))
						.await
						.context("websocket ping failed")?;
				}
				message = stream.next() => {
					let Some(message) = message else {
						bail!("websocket stream ended");
					};
					match message.context("websocket receive failed")? {
						Message::Binary(bytes) => {
							let Some(frame) = WsFrame::deserialize(&bytes) else {
								log::warn!("dropping malformed frame of {} bytes", bytes.len());
								continue;
							};
							match frame.frame_type {
								FrameType::Ping => {
									sink
										.send(Message::Binary(WsFrame::pong().serialize().into_vec().into()))
										.await
										.context("websocket pong failed")?;
								}
								FrameType::Pong => self.handle_pong(last_ping.take()),
								_ => {
									if incoming.send(frame).await.is_err() {
										self.set_state(ConnectionState::Closing);
										return Ok(());
									}
								}
							}
						}
						Message::Close(_) => bail!("server closed the connection"),
						_ => {}
					}
				}
			}
		}
	}

	/// A pong answers the most recent ping; the elapsed time is an RTT
	/// sample.
	fn handle_pong(&self, last_ping: Option<Instant>) {
		if let Some(sent) = last_ping {
			let rtt = sent.elapsed();
			self.estimator.lock().record_rtt(rtt);
			log::trace!("keepalive rtt {rtt:?}");
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use joxel_jpip::BandwidthConfig;

	#[test]
	fn pong_feeds_the_estimator() {
		let estimator = Arc::new(Mutex::new(BandwidthEstimator::new(BandwidthConfig::default())));
		let client = WsClient::new(WsClientConfig::default(), Arc::clone(&estimator));

		client.handle_pong(Some(Instant::now() - Duration::from_millis(40)));
		let estimate = estimator.lock().estimate();
		// the RTT baseline moved away from its empty default
		assert!(!estimate.congestion_detected);

		// a pong without a matching ping is ignored
		client.handle_pong(None);
	}

	#[test]
	fn initial_state_is_disconnected() {
		let estimator = Arc::new(Mutex::new(BandwidthEstimator::new(BandwidthConfig::default())));
		let client = WsClient::new(WsClientConfig::default(), estimator);
		assert_eq!(*client.state_handle().lock(), ConnectionState::Disconnected);
	}
}
