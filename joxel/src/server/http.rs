//! HTTP and WebSocket surface over the dispatch core.
//!
//! The router exposes the interactive endpoint, its WebSocket companion and a
//! `/status` liveness probe. Cross-cutting middleware (load shedding,
//! concurrency limits, timeouts) wraps the whole router; a background reaper
//! sweeps idle sessions while the server runs.

use super::core::{JpipResponse, JpipServer};
use super::queue::RequestQueue;
use crate::transport::{FrameType, WsFrame, handshake, serialize_bins};
use anyhow::{Context, Result};
use axum::error_handling::HandleErrorLayer;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{RawQuery, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{BoxError, Router, routing::get};
use bytes::Bytes;
use joxel_jpip::{JpipError, JpipRequest};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower::{ServiceBuilder, limit::ConcurrencyLimitLayer, load_shed::LoadShedLayer};
use tower_http::timeout::TimeoutLayer;

/// The running HTTP server around a [`JpipServer`] core.
pub struct HttpServer {
	core: Arc<JpipServer>,
	ip: String,
	port: u16,
	exit_signal: Option<oneshot::Sender<()>>,
	join: Option<tokio::task::JoinHandle<()>>,
}

impl HttpServer {
	#[must_use]
	pub fn new(core: Arc<JpipServer>, ip: &str, port: u16) -> Self {
		Self {
			core,
			ip: ip.to_string(),
			port,
			exit_signal: None,
			join: None,
		}
	}

	#[must_use]
	pub fn core(&self) -> &Arc<JpipServer> {
		&self.core
	}

	/// Builds the router with the global middleware stack applied.
	#[must_use]
	pub fn router(core: Arc<JpipServer>) -> Router {
		let config = core.config().server.clone();
		let jpip_path = config.jpip_path.clone();
		let ws_path = format!("{jpip_path}/ws");

		Router::new()
			.route(&jpip_path, get(handle_jpip))
			.route(&ws_path, get(handle_ws_upgrade))
			.route("/status", get(|| async { "ready!" }))
			.layer(
				ServiceBuilder::new()
					.layer(HandleErrorLayer::new(handle_middleware_error))
					.layer(LoadShedLayer::new())
					.layer(ConcurrencyLimitLayer::new(config.max_concurrent_requests)),
			)
			.layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
			.with_state(core)
	}

	/// Binds the listener and serves until [`HttpServer::stop`].
	pub async fn start(&mut self) -> Result<()> {
		let address = format!("{}:{}", self.ip, self.port);
		let listener = TcpListener::bind(&address)
			.await
			.with_context(|| format!("binding {address}"))?;
		log::info!("listening on {address}");

		let router = Self::router(Arc::clone(&self.core));
		let (exit_tx, exit_rx) = oneshot::channel::<()>();
		self.exit_signal = Some(exit_tx);

		let reaper = spawn_reaper(Arc::clone(&self.core));
		let join = tokio::spawn(async move {
			let serve = axum::serve(listener, router).with_graceful_shutdown(async {
				let _ = exit_rx.await;
			});
			if let Err(error) = serve.await {
				log::error!("server task failed: {error}");
			}
			reaper.abort();
		});
		self.join = Some(join);
		Ok(())
	}

	/// Signals shutdown and waits for the serving task.
	pub async fn stop(&mut self) {
		if let Some(exit) = self.exit_signal.take() {
			let _ = exit.send(());
		}
		if let Some(join) = self.join.take() {
			let _ = join.await;
		}
	}
}

fn spawn_reaper(core: Arc<JpipServer>) -> tokio::task::JoinHandle<()> {
	let interval = Duration::from_secs(core.config().server.reaper_interval_secs.max(1));
	tokio::spawn(async move {
		let mut timer = tokio::time::interval(interval);
		timer.tick().await;
		loop {
			timer.tick().await;
			let reaped = core.reap_idle_sessions();
			if reaped > 0 {
				log::debug!("reaper closed {reaped} idle sessions");
			}
		}
	})
}

async fn handle_middleware_error(error: BoxError) -> (StatusCode, String) {
	if error.is::<tower::load_shed::error::Overloaded>() {
		(StatusCode::SERVICE_UNAVAILABLE, "overloaded, retry later".to_string())
	} else {
		(StatusCode::INTERNAL_SERVER_ERROR, format!("middleware failure: {error}"))
	}
}

/// `GET /jpip?...` — parse, dispatch, answer with a bin stream body.
async fn handle_jpip(State(core): State<Arc<JpipServer>>, RawQuery(query): RawQuery) -> Response {
	let query = query.unwrap_or_default();
	let request = match JpipRequest::from_query(&query) {
		Ok(request) => request,
		Err(error) => return error_response(&error),
	};
	let client = request
		.channel_id
		.clone()
		.unwrap_or_else(|| "anonymous".to_string());

	match core.handle_request(&client, &request) {
		Ok(response) => jpip_response(&core, response),
		Err(error) => error_response(&error),
	}
}

fn jpip_response(core: &Arc<JpipServer>, response: JpipResponse) -> Response {
	let mut headers = HeaderMap::new();
	for (name, value) in response.headers.as_slice() {
		if let (Ok(name), Ok(value)) = (
			HeaderName::from_bytes(name.as_bytes()),
			HeaderValue::from_str(value),
		) {
			headers.insert(name, value);
		}
	}
	if let Some(alt_svc) = core.config().transport.http3.alt_svc_header() {
		if let Ok(value) = HeaderValue::from_str(&alt_svc) {
			headers.insert(HeaderName::from_static("alt-svc"), value);
		}
	}
	let body = serialize_bins(&response.bins).into_vec();
	(
		StatusCode::from_u16(response.status).unwrap_or(StatusCode::OK),
		headers,
		body,
	)
		.into_response()
}

fn error_response(error: &JpipError) -> Response {
	let status = StatusCode::from_u16(JpipServer::status_for(error)).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
	log::debug!("request failed: {error}");
	(status, error.to_string()).into_response()
}

/// `GET /jpip/ws` — validated upgrade into the framed message loop.
async fn handle_ws_upgrade(
	State(core): State<Arc<JpipServer>>,
	headers: HeaderMap,
	upgrade: WebSocketUpgrade,
) -> Response {
	let header_pairs: Vec<(String, String)> = headers
		.iter()
		.map(|(name, value)| {
			(
				name.as_str().to_string(),
				value.to_str().unwrap_or_default().to_string(),
			)
		})
		.collect();
	if let Err(error) = handshake::validate_upgrade(&header_pairs) {
		log::warn!("rejected websocket upgrade: {error}");
		return (StatusCode::BAD_REQUEST, error.to_string()).into_response();
	}

	upgrade
		.protocols([handshake::SUBPROTOCOL])
		.on_upgrade(move |socket| ws_session(core, socket))
}

/// Per-connection loop: requests in, responses, bins and pushes out.
///
/// Incoming request frames pass through the bounded priority queue, so a
/// session-creation request overtakes queued image-data requests even when a
/// client pipelines them.
async fn ws_session(core: Arc<JpipServer>, mut socket: WebSocket) {
	let mut client = "anonymous".to_string();
	let mut target: Option<String> = None;
	let mut queue = RequestQueue::new(core.config().server.request_queue_capacity);
	// Request ids travel alongside the queued request so replies correlate.
	let mut pending_ids: std::collections::HashMap<String, u32> = std::collections::HashMap::new();
	let mut push_timer = tokio::time::interval(Duration::from_millis(250));
	push_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

	loop {
		tokio::select! {
			message = socket.recv() => {
				let Some(Ok(message)) = message else { break };
				match message {
					Message::Binary(bytes) => {
						let Some(frame) = WsFrame::deserialize(&bytes) else {
							log::warn!("dropping malformed frame of {} bytes", bytes.len());
							continue;
						};
						if !accept_ws_frame(&core, &mut socket, frame, &mut client, &mut target, &mut queue, &mut pending_ids).await {
							break;
						}
						// drain everything admissible, highest class first
						let mut ok = true;
						while let Some(queued) = queue.dequeue() {
							let request_id = pending_ids.remove(&queued.client).unwrap_or(0);
							ok = answer_request(&core, &mut socket, &queued.client, &queued.request, request_id).await;
							if !ok {
								break;
							}
						}
						if !ok {
							break;
						}
					}
					Message::Close(_) => break,
					_ => {}
				}
			}
			_ = push_timer.tick() => {
				let Some(target) = &target else { continue };
				for item in core.drain_pushes(target, 8) {
					let payload = serialize_bins(std::slice::from_ref(&item.bin));
					let frame = WsFrame::new(FrameType::Push, 0, payload);
					if send_frame(&mut socket, &frame).await.is_err() {
						return;
					}
				}
			}
		}
	}
	log::debug!("websocket session for {client} ended");
}

#[allow(clippy::too_many_arguments)]
async fn accept_ws_frame(
	core: &Arc<JpipServer>,
	socket: &mut WebSocket,
	frame: WsFrame,
	client: &mut String,
	target: &mut Option<String>,
	queue: &mut RequestQueue,
	pending_ids: &mut std::collections::HashMap<String, u32>,
) -> bool {
	match frame.frame_type {
		FrameType::Ping => send_frame(socket, &WsFrame::new(FrameType::Pong, frame.request_id, joxel_core::Blob::new_empty()))
			.await
			.is_ok(),
		FrameType::Request => {
			let query = frame.payload.as_str().into_owned();
			match JpipRequest::from_query(&query) {
				Ok(request) => {
					if let Some(cid) = &request.channel_id {
						*client = cid.clone();
					}
					if let Some(requested) = &request.target {
						*target = Some(requested.clone());
					}
					match queue.enqueue(client, request) {
						Ok(()) => {
							pending_ids.insert(client.clone(), frame.request_id);
							true
						}
						Err(error) => send_error_frame(socket, frame.request_id, &error).await,
					}
				}
				Err(error) => send_error_frame(socket, frame.request_id, &error).await,
			}
		}
		_ => true, // pongs and control frames need no reply here
	}
}

async fn answer_request(
	core: &Arc<JpipServer>,
	socket: &mut WebSocket,
	client: &str,
	request: &JpipRequest,
	request_id: u32,
) -> bool {
	match core.handle_request(client, request) {
		Ok(response) => {
			let mut header_text = format!("{}", response.status);
			for (name, value) in response.headers.as_slice() {
				header_text.push_str(&format!("\n{name}: {value}"));
			}
			let reply = WsFrame::new(FrameType::Response, request_id, joxel_core::Blob::from(header_text));
			if send_frame(socket, &reply).await.is_err() {
				return false;
			}
			for bin in &response.bins {
				let payload = serialize_bins(std::slice::from_ref(bin));
				let frame = WsFrame::new(FrameType::DataBin, request_id, payload);
				if send_frame(socket, &frame).await.is_err() {
					return false;
				}
			}
			true
		}
		Err(error) => send_error_frame(socket, request_id, &error).await,
	}
}

async fn send_error_frame(socket: &mut WebSocket, request_id: u32, error: &JpipError) -> bool {
	let status = JpipServer::status_for(error);
	let payload = joxel_core::Blob::from(format!("{status}\n{error}"));
	send_frame(socket, &WsFrame::new(FrameType::Error, request_id, payload))
		.await
		.is_ok()
}

async fn send_frame(socket: &mut WebSocket, frame: &WsFrame) -> Result<()> {
	socket
		.send(Message::Binary(Bytes::from(frame.serialize().into_vec())))
		.await
		.context("websocket send failed")
}
