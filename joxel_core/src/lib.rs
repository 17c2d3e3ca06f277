//! Shared foundation of the joxel workspace: byte containers, binary io,
//! canvas geometry, compression and cancellation.

pub mod io;
pub mod types;
pub use types::*;
pub mod utils;
pub use utils::*;
