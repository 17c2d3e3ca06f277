//! HTTP transport codec: the data-bin response body format and transport
//! configuration, including the optional HTTP/3 advertisement.

use anyhow::{Result, ensure};
use joxel_codec::{DataBin, DataBinClass};
use joxel_core::Blob;
use joxel_core::io::{ValueReader, ValueReaderSlice, ValueWriter, ValueWriterBlob};
use serde::Deserialize;

/// HTTP/3 is configuration-only: when enabled the server advertises the UDP
/// port through `Alt-Svc`, an actual QUIC listener is out of scope here.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Http3Config {
	pub enabled: bool,
	pub udp_port: u16,
}

impl Default for Http3Config {
	fn default() -> Self {
		Self {
			enabled: false,
			udp_port: 8443,
		}
	}
}

impl Http3Config {
	/// The `Alt-Svc` header value, when HTTP/3 is enabled.
	#[must_use]
	pub fn alt_svc_header(&self) -> Option<String> {
		self.enabled.then(|| format!("h3=\":{}\"; ma=86400", self.udp_port))
	}
}

/// Transport tuning shared by the HTTP and WebSocket surfaces.
#[derive(Clone, Debug, Deserialize, Default)]
#[serde(default)]
pub struct HttpTransportConfig {
	pub http3: Http3Config,
}

/// Serializes bins into a response body.
///
/// Per bin: `[class:1][id:4 BE][complete:1][len:4 BE][bytes]`. The same
/// layout rides inside WebSocket data-bin frames.
pub fn serialize_bins(bins: &[DataBin]) -> Blob {
	let mut writer = ValueWriterBlob::new_be();
	for bin in bins {
		writer.write_u8(bin.class.as_u8()).expect("in-memory write");
		writer.write_u32(bin.id).expect("in-memory write");
		writer.write_u8(u8::from(bin.is_complete)).expect("in-memory write");
		writer.write_u32(bin.bytes.len() as u32).expect("in-memory write");
		writer.write_blob(&bin.bytes).expect("in-memory write");
	}
	writer.into_blob()
}

/// Parses a response body back into bins.
pub fn deserialize_bins(bytes: &[u8]) -> Result<Vec<DataBin>> {
	let mut reader = ValueReaderSlice::new_be(bytes);
	let mut bins = Vec::new();
	while reader.has_remaining() {
		ensure!(reader.remaining() >= 10, "trailing garbage in bin stream");
		let class = DataBinClass::from_u8(reader.read_u8()?)?;
		let id = reader.read_u32()?;
		let is_complete = reader.read_u8()? == 1;
		let length = reader.read_u32()?;
		let payload = reader.read_blob(u64::from(length))?;
		bins.push(DataBin::new(class, id, payload, is_complete));
	}
	Ok(bins)
}
