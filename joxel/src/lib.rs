//! Interactive image server: a JPEG 2000 family codec behind an interactive
//! delivery protocol, with HTTP and WebSocket transports.

pub mod config;
pub mod server;
#[cfg(feature = "cli")]
pub mod tools;
pub mod transport;

pub use config::Config;
pub use server::{JpipServer, ImageRegistry};
