//! Typed error taxonomy of the codec core.
//!
//! Parser errors identify the byte offset (and marker where applicable) so a
//! failing codestream can be located without re-parsing.

use crate::marker::Marker;
use thiserror::Error;

/// Errors produced by codestream parsing, building, transform and coding.
#[derive(Debug, Error, PartialEq)]
pub enum CodecError {
	#[error("missing SOC marker at start of codestream")]
	MissingSoc,

	#[error("missing EOC marker at end of codestream")]
	MissingEoc,

	#[error("malformed header at offset {offset}: {reason}")]
	MalformedHeader { offset: u64, reason: String },

	#[error("duplicate {marker} marker at offset {offset}")]
	DuplicateMarker { marker: Marker, offset: u64 },

	#[error("unknown marker 0x{code:04X} at offset {offset}")]
	UnknownMarker { code: u16, offset: u64 },

	#[error("truncated codestream at offset {offset}: {reason}")]
	TruncatedCodestream { offset: u64, reason: String },

	#[error("invalid configuration: {0}")]
	InvalidConfiguration(String),

	#[error("invalid SIZ: {0}")]
	InvalidSiz(String),

	#[error("invalid tile {index}: {reason}")]
	InvalidTile { index: u16, reason: String },

	#[error("unsupported profile: {0}")]
	UnsupportedProfile(String),

	#[error("sample plane mismatch: {0}")]
	PlaneMismatch(String),

	#[error("encoding failed: {0}")]
	EncodingFailed(String),

	#[error("decoding failed: {0}")]
	DecodingFailed(String),

	#[error("operation cancelled")]
	Cancelled,
}

impl From<anyhow::Error> for CodecError {
	fn from(err: anyhow::Error) -> Self {
		CodecError::EncodingFailed(err.to_string())
	}
}

impl CodecError {
	pub(crate) fn malformed(offset: u64, reason: impl Into<String>) -> Self {
		CodecError::MalformedHeader {
			offset,
			reason: reason.into(),
		}
	}

	pub(crate) fn truncated(offset: u64, reason: impl Into<String>) -> Self {
		CodecError::TruncatedCodestream {
			offset,
			reason: reason.into(),
		}
	}
}

pub type Result<T> = std::result::Result<T, CodecError>;
