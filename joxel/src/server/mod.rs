//! Server core and its HTTP/WebSocket surface.

mod core;
mod queue;
mod registry;

#[cfg(feature = "server")]
mod http;

pub use self::core::{JpipResponse, JpipServer, ServerStats};
pub use queue::{QueuedRequest, RequestClass, RequestQueue};
pub use registry::{ImageEntry, ImageFormat, ImageRegistry};

#[cfg(feature = "server")]
pub use http::HttpServer;
