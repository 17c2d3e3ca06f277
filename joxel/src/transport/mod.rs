//! Message framing, connection lifecycle and transport configuration.

mod backoff;
mod frame;
pub mod handshake;
mod http;

#[cfg(feature = "ws-client")]
mod websocket;

pub use backoff::{ConnectionState, ReconnectConfig, ReconnectPolicy};
pub use frame::{FRAME_HEADER_LEN, FrameType, WsFrame};
pub use http::{Http3Config, HttpTransportConfig, deserialize_bins, serialize_bins};

#[cfg(feature = "ws-client")]
pub use websocket::{WsClient, WsClientConfig};
