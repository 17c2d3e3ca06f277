//! Cross-cutting helpers: compression and cancellation.

mod cancel;
mod compression;

pub use cancel::CancelToken;
pub use compression::{
	Compression, compress_brotli, compress_gzip, decompress_brotli, decompress_gzip,
};
