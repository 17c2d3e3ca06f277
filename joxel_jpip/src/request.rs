//! Request-parameter and response-header codec of the interactive protocol.
//!
//! Only the parameter subset the server actually consumes is modeled;
//! unknown parameters are ignored by contract.

use crate::error::{JpipError, Result};

/// Transport requested by `cnew`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChannelTransport {
	Http,
	HttpTcp,
	Ws,
}

impl ChannelTransport {
	#[must_use]
	pub fn as_str(self) -> &'static str {
		match self {
			ChannelTransport::Http => "http",
			ChannelTransport::HttpTcp => "http-tcp",
			ChannelTransport::Ws => "ws",
		}
	}
}

/// Codestream flavor preference announced via `pref`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum CodingPreference {
	Htj2k,
	Legacy,
	#[default]
	None,
}

/// The parsed request parameters.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct JpipRequest {
	pub target: Option<String>,
	/// Requested full size `fsiz=W,H`.
	pub full_size: Option<(u32, u32)>,
	/// Requested region size `rsiz=W,H`.
	pub region_size: Option<(u32, u32)>,
	/// Requested region offset `roff=X,Y`.
	pub region_offset: Option<(u32, u32)>,
	pub layers: Option<u16>,
	pub resolution_levels: Option<u8>,
	pub components: Vec<u16>,
	pub want_metadata: bool,
	pub max_response_length: Option<u64>,
	pub channel_id: Option<String>,
	pub new_channel: Option<ChannelTransport>,
	pub coding_preference: CodingPreference,
}

impl JpipRequest {
	/// Parses a query string of `key=value` pairs separated by `&`.
	pub fn from_query(query: &str) -> Result<Self> {
		let mut request = JpipRequest::default();
		for pair in query.split('&').filter(|pair| !pair.is_empty()) {
			let (key, value) = pair
				.split_once('=')
				.ok_or_else(|| JpipError::ProtocolError(format!("parameter {pair:?} has no value")))?;
			match key {
				"target" => request.target = Some(value.to_string()),
				"fsiz" => request.full_size = Some(parse_pair(key, value)?),
				"rsiz" => request.region_size = Some(parse_pair(key, value)?),
				"roff" => request.region_offset = Some(parse_pair(key, value)?),
				"layers" => request.layers = Some(parse_number(key, value)?),
				"reslevels" => request.resolution_levels = Some(parse_number(key, value)?),
				"comps" => {
					request.components = value
						.split(',')
						.map(|component| parse_number("comps", component))
						.collect::<Result<Vec<u16>>>()?;
				}
				"meta" => request.want_metadata = value == "yes",
				"len" => request.max_response_length = Some(parse_number(key, value)?),
				"cid" => request.channel_id = Some(value.to_string()),
				"cnew" => {
					request.new_channel = Some(match value {
						"http" => ChannelTransport::Http,
						"http-tcp" => ChannelTransport::HttpTcp,
						"ws" => ChannelTransport::Ws,
						other => {
							return Err(JpipError::ProtocolError(format!("unknown cnew transport {other:?}")));
						}
					});
				}
				"pref" => {
					request.coding_preference = match value {
						"htj2k" => CodingPreference::Htj2k,
						"legacy" => CodingPreference::Legacy,
						"none" => CodingPreference::None,
						other => {
							return Err(JpipError::ProtocolError(format!("unknown pref {other:?}")));
						}
					};
				}
				_ => {} // unknown parameters are ignored
			}
		}
		Ok(request)
	}
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
	value
		.parse()
		.map_err(|_| JpipError::ProtocolError(format!("parameter {key}={value:?} is not a valid number")))
}

fn parse_pair(key: &str, value: &str) -> Result<(u32, u32)> {
	let (a, b) = value
		.split_once(',')
		.ok_or_else(|| JpipError::ProtocolError(format!("parameter {key}={value:?} is not a pair")))?;
	Ok((parse_number(key, a)?, parse_number(key, b)?))
}

/// Response headers the server attaches to protocol replies.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct JpipResponseHeaders {
	headers: Vec<(String, String)>,
}

impl JpipResponseHeaders {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// `JPIP-cnew: cid=<id>,path=<path>,transport=<transport>`
	#[must_use]
	pub fn with_new_channel(mut self, channel_id: &str, path: &str, transport: ChannelTransport) -> Self {
		self.headers.push((
			"JPIP-cnew".to_string(),
			format!("cid={channel_id},path={path},transport={}", transport.as_str()),
		));
		self
	}

	/// `JPIP-cap: htj2k|j2k`
	#[must_use]
	pub fn with_capability(mut self, htj2k: bool) -> Self {
		self
			.headers
			.push(("JPIP-cap".to_string(), if htj2k { "htj2k" } else { "j2k" }.to_string()));
		self
	}

	/// `JPIP-pref: htj2k|j2k`
	#[must_use]
	pub fn with_preference(mut self, preference: CodingPreference) -> Self {
		let value = match preference {
			CodingPreference::Htj2k => "htj2k",
			CodingPreference::Legacy | CodingPreference::None => "j2k",
		};
		self.headers.push(("JPIP-pref".to_string(), value.to_string()));
		self
	}

	/// `JPIP-tid: <target>`
	#[must_use]
	pub fn with_target_id(mut self, target: &str) -> Self {
		self.headers.push(("JPIP-tid".to_string(), target.to_string()));
		self
	}

	#[must_use]
	pub fn as_slice(&self) -> &[(String, String)] {
		&self.headers
	}
}
