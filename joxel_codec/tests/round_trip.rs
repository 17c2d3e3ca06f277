//! Integration tests for codestream assembly and the full encode/decode path.
//!
//! These tests verify the byte-level marker structure of built codestreams and
//! that volumes survive a lossless round trip without corruption.

use joxel_codec::*;
use joxel_core::Blob;
use pretty_assertions::assert_eq;

fn find_marker(bytes: &[u8], marker: [u8; 2]) -> Option<usize> {
	bytes.windows(2).position(|window| window == marker)
}

#[test]
fn minimal_volumetric_codestream_has_all_markers() {
	// 4x4x2 volume, one 8-bit component, one decomposition level, one tile.
	let siz = SizParameters::new_3d((4, 4, 2), (4, 4, 2), ComponentInfo::new(8, false), 1);
	let cod = CodParameters::default();
	let qcd = QcdParameters::reversible(8);
	let bytes = CodestreamBuilder::new(siz, cod, qcd)
		.unwrap()
		.build(&[codestream::TilePartSource::new(0, Blob::from(vec![0u8; 16]))])
		.unwrap();
	let slice = bytes.as_slice();

	assert_eq!(&slice[0..2], &[0xFF, 0x4F], "must start with SOC");
	assert!(find_marker(slice, [0xFF, 0x51]).is_some(), "SIZ missing");
	assert!(find_marker(slice, [0xFF, 0x52]).is_some(), "COD missing");
	assert!(find_marker(slice, [0xFF, 0x5C]).is_some(), "QCD missing");
	assert!(find_marker(slice, [0xFF, 0x90]).is_some(), "SOT missing");
	assert!(find_marker(slice, [0xFF, 0x93]).is_some(), "SOD missing");
	assert_eq!(&slice[slice.len() - 2..], &[0xFF, 0xD9], "must end with EOC");

	// SIZ immediately follows SOC, COD precedes QCD.
	assert_eq!(find_marker(slice, [0xFF, 0x51]), Some(2));
	assert!(find_marker(slice, [0xFF, 0x52]).unwrap() < find_marker(slice, [0xFF, 0x5C]).unwrap());
}

#[test]
fn gradient_volume_encodes_into_eight_tiles() {
	let volume = SampleVolume::gradient(8, 8, 4, 8);
	let bytes = Encoder::new()
		.encode(&volume, &EncodeParams::lossless((4, 4, 2), 1))
		.unwrap();

	let parsed = CodestreamParser::new(ParserOptions::default())
		.parse(bytes.as_slice())
		.unwrap();
	assert_eq!(parsed.tiles.len(), 8);
	assert_eq!(parsed.siz.tile_width, 4);
	assert_eq!(parsed.siz.tile_height, 4);
	assert_eq!(parsed.siz.tile_depth, 2);
	assert_eq!(parsed.siz.depth, 4);
}

#[test]
fn parse_of_build_preserves_parameters() {
	let siz = SizParameters::new_2d(100, 60, 32, 32, ComponentInfo::new(10, true), 2);
	let cod = CodParameters {
		progression_order: ProgressionOrder::Rpcl,
		quality_layers: 4,
		decomposition_levels: 3,
		..CodParameters::default()
	};
	let tiles: Vec<codestream::TilePartSource> = (0..8)
		.map(|index| codestream::TilePartSource::new(index, Blob::from(vec![index as u8; 5])))
		.collect();

	let bytes = CodestreamBuilder::new(siz.clone(), cod.clone(), QcdParameters::reversible(10))
		.unwrap()
		.build(&tiles)
		.unwrap();
	let parsed = CodestreamParser::new(ParserOptions::default())
		.parse(bytes.as_slice())
		.unwrap();

	assert_eq!(parsed.siz, siz);
	assert_eq!(parsed.cod, cod);
	assert_eq!(parsed.tiles.len(), tiles.len());
}

#[test]
fn lossless_round_trip_across_bit_depths() {
	for bit_depth in [1u8, 2, 7, 8, 12, 16] {
		let volume = SampleVolume::gradient(16, 16, 1, bit_depth);
		let bytes = Encoder::new()
			.encode(&volume, &EncodeParams::lossless((8, 8, 1), 2))
			.unwrap();
		let restored = Decoder::new().decode(bytes.as_slice()).unwrap();
		assert_eq!(restored, volume, "bit depth {bit_depth}");
	}
}

#[test]
fn lossless_round_trip_volumetric_with_boundary_tiles() {
	// 10x6x3 volume with 4x4x2 tiles: every boundary tile is clamped.
	let plane: Vec<i32> = (0..10 * 6 * 3).map(|i| (i * 13) % 256).collect();
	let volume = SampleVolume::new(10, 6, 3, 8, false, vec![plane]).unwrap();
	let bytes = Encoder::new()
		.encode(&volume, &EncodeParams::lossless((4, 4, 2), 1))
		.unwrap();
	let restored = Decoder::new().decode(bytes.as_slice()).unwrap();
	assert_eq!(restored, volume);
}

#[test]
fn htj2k_capability_detected_from_cap_marker() {
	let volume = SampleVolume::gradient(8, 8, 1, 8);
	let params = EncodeParams {
		htj2k: true,
		..EncodeParams::lossless((8, 8, 1), 1)
	};
	let bytes = Encoder::new().encode(&volume, &params).unwrap();
	let parsed = CodestreamParser::new(ParserOptions::default())
		.parse(bytes.as_slice())
		.unwrap();
	assert!(parsed.is_htj2k);
	assert!(bytes.as_slice().windows(2).any(|w| w == [0xFF, 0x50]));
}

#[test]
fn bins_cover_the_whole_codestream() {
	let volume = SampleVolume::gradient(8, 8, 1, 8);
	let bytes = Encoder::new()
		.encode(&volume, &EncodeParams::lossless((4, 4, 1), 1))
		.unwrap();
	let parsed = CodestreamParser::new(ParserOptions::default())
		.parse(bytes.as_slice())
		.unwrap();
	let bins = generate_bins(&parsed, bytes.as_slice()).unwrap();

	// one main header + (header + body) per tile
	assert_eq!(bins.len(), 1 + 2 * 4);
	let covered: usize = bins.iter().map(DataBin::len).sum();
	// Everything except the trailing EOC is addressable.
	assert_eq!(covered, bytes.len() - 2);
}
