//! JPEG 2000 family codec core: codestream syntax, wavelet transform,
//! quantization, tile geometry, packet sequencing, a reversible tile codec,
//! data-bin segmentation and structural conformance checks.

pub mod codestream;
pub mod conformance;
pub mod databin;
pub mod decoder;
pub mod dwt;
pub mod encoder;
mod error;
pub mod lattice;
pub mod marker;
pub mod progression;
pub mod quantizer;
pub mod volume;

pub use codestream::{
	CapParameters, Codestream, CodestreamBuilder, CodestreamParser, CodParameters, ComponentInfo, ParserOptions,
	ProgressionOrder, QcdParameters, SizParameters,
};
pub use databin::{DataBin, DataBinClass, generate_bins};
pub use decoder::Decoder;
pub use encoder::{EncodeMode, EncodeParams, Encoder};
pub use error::{CodecError, Result};
pub use lattice::TileLattice;
pub use quantizer::Quantizer;
pub use volume::SampleVolume;
