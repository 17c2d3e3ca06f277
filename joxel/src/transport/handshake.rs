//! Server-side WebSocket upgrade validation.
//!
//! The upgrade must carry `Upgrade: websocket`, `Connection: Upgrade` and a
//! `Sec-WebSocket-Key`; when the client offers subprotocols, `jpip` must be
//! among them. The accept token is the standard SHA-1 of key + GUID, base64
//! encoded.

use anyhow::{Result, bail};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use sha1::{Digest, Sha1};

const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// The subprotocol this service speaks.
pub const SUBPROTOCOL: &str = "jpip";

/// The validated pieces of an upgrade request.
#[derive(Clone, Debug, PartialEq)]
pub struct UpgradeRequest {
	pub accept_token: String,
	/// Set when the client offered `Sec-WebSocket-Protocol` and it matched.
	pub subprotocol: Option<&'static str>,
}

fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
	headers
		.iter()
		.find(|(key, _)| key.eq_ignore_ascii_case(name))
		.map(|(_, value)| value.as_str())
}

/// Validates the upgrade headers and computes the accept token.
pub fn validate_upgrade(headers: &[(String, String)]) -> Result<UpgradeRequest> {
	let upgrade = header(headers, "Upgrade").unwrap_or_default();
	if !upgrade.eq_ignore_ascii_case("websocket") {
		bail!("missing or invalid Upgrade header: {upgrade:?}");
	}

	let connection = header(headers, "Connection").unwrap_or_default();
	if !connection
		.split(',')
		.any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
	{
		bail!("Connection header does not request an upgrade: {connection:?}");
	}

	let Some(key) = header(headers, "Sec-WebSocket-Key") else {
		bail!("Sec-WebSocket-Key header missing");
	};

	let subprotocol = match header(headers, "Sec-WebSocket-Protocol") {
		None => None,
		Some(offered) => {
			if !offered.split(',').any(|token| token.trim() == SUBPROTOCOL) {
				bail!("unsupported subprotocol {offered:?}, expected {SUBPROTOCOL:?}");
			}
			Some(SUBPROTOCOL)
		}
	};

	Ok(UpgradeRequest {
		accept_token: accept_token(key),
		subprotocol,
	})
}

/// `base64(sha1(key + GUID))` per the WebSocket handshake.
#[must_use]
pub fn accept_token(key: &str) -> String {
	let mut hasher = Sha1::new();
	hasher.update(key.as_bytes());
	hasher.update(WEBSOCKET_GUID.as_bytes());
	BASE64.encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn headers(entries: &[(&str, &str)]) -> Vec<(String, String)> {
		entries
			.iter()
			.map(|(key, value)| (key.to_string(), value.to_string()))
			.collect()
	}

	fn valid_headers() -> Vec<(String, String)> {
		headers(&[
			("Upgrade", "websocket"),
			("Connection", "Upgrade"),
			("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ=="),
		])
	}

	#[test]
	fn rfc_example_accept_token() {
		// the sample key/accept pair from RFC 6455
		assert_eq!(
			accept_token("dGhlIHNhbXBsZSBub25jZQ=="),
			"s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
		);
	}

	#[test]
	fn valid_upgrade_passes() {
		let request = validate_upgrade(&valid_headers()).unwrap();
		assert_eq!(request.accept_token, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
		assert_eq!(request.subprotocol, None);
	}

	#[test]
	fn jpip_subprotocol_accepted() {
		let mut upgrade_headers = valid_headers();
		upgrade_headers.push(("Sec-WebSocket-Protocol".to_string(), "jpip".to_string()));
		let request = validate_upgrade(&upgrade_headers).unwrap();
		assert_eq!(request.subprotocol, Some("jpip"));
	}

	#[test]
	fn foreign_subprotocol_rejected() {
		let mut upgrade_headers = valid_headers();
		upgrade_headers.push(("Sec-WebSocket-Protocol".to_string(), "chat".to_string()));
		assert!(validate_upgrade(&upgrade_headers).is_err());
	}

	#[test]
	fn missing_pieces_rejected() {
		assert!(validate_upgrade(&headers(&[("Connection", "Upgrade"), ("Sec-WebSocket-Key", "x")])).is_err());
		assert!(validate_upgrade(&headers(&[("Upgrade", "websocket"), ("Sec-WebSocket-Key", "x")])).is_err());
		assert!(validate_upgrade(&headers(&[("Upgrade", "websocket"), ("Connection", "Upgrade")])).is_err());
	}

	#[test]
	fn header_names_are_case_insensitive() {
		let request = validate_upgrade(&headers(&[
			("upgrade", "WebSocket"),
			("connection", "keep-alive, Upgrade"),
			("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ=="),
		]))
		.unwrap();
		assert!(!request.accept_token.is_empty());
	}
}
