//! Codestream model, builder and parser.

mod builder;
mod parser;
pub mod types;

pub use builder::{BuilderOptions, CodestreamBuilder, SOT_TOTAL_LEN, TilePartSource};
pub use parser::{CodestreamParser, ParserOptions};
pub use types::{
	CapParameters, Codestream, CodParameters, ComponentInfo, ProgressionOrder, QcdParameters, SizParameters, TilePart,
};
