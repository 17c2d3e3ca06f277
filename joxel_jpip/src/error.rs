//! Typed errors of the delivery stack.
//!
//! Session-scoped failures carry the session id and, where known, the request
//! target, so protocol errors can be traced to one client conversation.

use thiserror::Error;

/// Errors produced by sessions, caches, schedulers and transports.
#[derive(Debug, Error, PartialEq)]
pub enum JpipError {
	#[error("cache full")]
	CacheFull,

	#[error("queue full")]
	QueueFull,

	#[error("bandwidth budget exceeded for client {client}")]
	BandwidthExceeded { client: String },

	#[error("session {session_id} not found")]
	SessionNotFound { session_id: String },

	#[error("session {session_id} is closed")]
	SessionClosed { session_id: String },

	#[error("unknown channel id {channel_id}")]
	ChannelIdUnknown { channel_id: String },

	#[error("target {target} is not registered")]
	TargetNotRegistered { target: String },

	#[error("request timed out")]
	Timeout,

	#[error("operation cancelled")]
	Cancelled,

	#[error("transport error: {0}")]
	TransportError(String),

	#[error("protocol error: {0}")]
	ProtocolError(String),

	#[error("internal error: {0}")]
	Internal(String),
}

pub type Result<T> = std::result::Result<T, JpipError>;
