//! Binary message framing used on the WebSocket channel.
//!
//! Layout: `[type:1][request_id:4 BE][length:4 BE][payload]`, where `length`
//! counts the whole frame including the nine header bytes and a request id of
//! zero means "not correlated to a request".

use joxel_core::Blob;
use joxel_core::io::{ValueReader, ValueReaderSlice, ValueWriter, ValueWriterBlob};

/// Frame header length in bytes.
pub const FRAME_HEADER_LEN: usize = 9;

/// Message kinds carried over the channel.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FrameType {
	Request,
	Response,
	DataBin,
	Ping,
	Pong,
	Control,
	Error,
	Push,
}

impl FrameType {
	#[must_use]
	pub fn as_u8(self) -> u8 {
		match self {
			FrameType::Request => 1,
			FrameType::Response => 2,
			FrameType::DataBin => 3,
			FrameType::Ping => 4,
			FrameType::Pong => 5,
			FrameType::Control => 6,
			FrameType::Error => 7,
			FrameType::Push => 8,
		}
	}

	#[must_use]
	pub fn from_u8(value: u8) -> Option<FrameType> {
		Some(match value {
			1 => FrameType::Request,
			2 => FrameType::Response,
			3 => FrameType::DataBin,
			4 => FrameType::Ping,
			5 => FrameType::Pong,
			6 => FrameType::Control,
			7 => FrameType::Error,
			8 => FrameType::Push,
			_ => return None,
		})
	}
}

/// One framed message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WsFrame {
	pub frame_type: FrameType,
	/// Zero when the frame is not a reply to anything.
	pub request_id: u32,
	pub payload: Blob,
}

impl WsFrame {
	#[must_use]
	pub fn new(frame_type: FrameType, request_id: u32, payload: Blob) -> Self {
		Self {
			frame_type,
			request_id,
			payload,
		}
	}

	#[must_use]
	pub fn ping() -> Self {
		Self::new(FrameType::Ping, 0, Blob::new_empty())
	}

	#[must_use]
	pub fn pong() -> Self {
		Self::new(FrameType::Pong, 0, Blob::new_empty())
	}

	/// Serializes the frame into its wire form.
	#[must_use]
	pub fn serialize(&self) -> Blob {
		let mut writer = ValueWriterBlob::new_be();
		writer.write_u8(self.frame_type.as_u8()).expect("in-memory write");
		writer.write_u32(self.request_id).expect("in-memory write");
		writer
			.write_u32((FRAME_HEADER_LEN + self.payload.len()) as u32)
			.expect("in-memory write");
		writer.write_blob(&self.payload).expect("in-memory write");
		writer.into_blob()
	}

	/// Parses a frame; `None` for short buffers, length mismatches and
	/// unknown types.
	#[must_use]
	pub fn deserialize(bytes: &[u8]) -> Option<WsFrame> {
		if bytes.len() < FRAME_HEADER_LEN {
			return None;
		}
		let mut reader = ValueReaderSlice::new_be(bytes);
		let frame_type = FrameType::from_u8(reader.read_u8().ok()?)?;
		let request_id = reader.read_u32().ok()?;
		let length = reader.read_u32().ok()? as usize;
		if length < FRAME_HEADER_LEN || length != bytes.len() {
			return None;
		}
		let payload = reader.read_blob((length - FRAME_HEADER_LEN) as u64).ok()?;
		Some(WsFrame {
			frame_type,
			request_id,
			payload,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	#[case(FrameType::Request)]
	#[case(FrameType::Response)]
	#[case(FrameType::DataBin)]
	#[case(FrameType::Ping)]
	#[case(FrameType::Pong)]
	#[case(FrameType::Control)]
	#[case(FrameType::Error)]
	#[case(FrameType::Push)]
	fn roundtrip_all_types(#[case] frame_type: FrameType) {
		let frame = WsFrame::new(frame_type, 42, Blob::from(vec![1, 2, 3]));
		let bytes = frame.serialize();
		assert_eq!(WsFrame::deserialize(bytes.as_slice()), Some(frame));
	}

	#[test]
	fn wire_layout() {
		let frame = WsFrame::new(FrameType::DataBin, 0x01020304, Blob::from(vec![0xAA, 0xBB]));
		let bytes = frame.serialize();
		assert_eq!(
			bytes.as_slice(),
			&[3, 0x01, 0x02, 0x03, 0x04, 0x00, 0x00, 0x00, 0x0B, 0xAA, 0xBB]
		);
	}

	#[test]
	fn empty_payload_roundtrip() {
		let frame = WsFrame::ping();
		let bytes = frame.serialize();
		assert_eq!(bytes.len(), FRAME_HEADER_LEN);
		assert_eq!(WsFrame::deserialize(bytes.as_slice()), Some(frame));
	}

	#[test]
	fn short_buffers_rejected() {
		assert_eq!(WsFrame::deserialize(&[]), None);
		assert_eq!(WsFrame::deserialize(&[1, 0, 0, 0, 0, 0, 0, 0]), None);
	}

	#[test]
	fn unknown_type_rejected() {
		let mut bytes = WsFrame::ping().serialize().into_vec();
		bytes[0] = 99;
		assert_eq!(WsFrame::deserialize(&bytes), None);
	}

	#[test]
	fn length_mismatch_rejected() {
		let mut bytes = WsFrame::new(FrameType::Request, 1, Blob::from(vec![1, 2, 3])).serialize().into_vec();
		// declared length too small
		bytes[8] = 8;
		assert_eq!(WsFrame::deserialize(&bytes), None);
		// truncated buffer
		let frame = WsFrame::new(FrameType::Request, 1, Blob::from(vec![1, 2, 3])).serialize();
		assert_eq!(WsFrame::deserialize(&frame.as_slice()[..10]), None);
	}
}
