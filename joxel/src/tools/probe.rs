use anyhow::{Context, Result};
use joxel_codec::{CodestreamParser, ParserOptions};
use std::path::Path;

/// Parses a codestream and prints its structure to stdout.
pub fn probe(file: &Path, tolerant: bool) -> Result<()> {
	let bytes = std::fs::read(file).with_context(|| format!("reading {file:?}"))?;
	let codestream = CodestreamParser::new(ParserOptions {
		tolerate_errors: tolerant,
	})
	.parse(&bytes)
	.with_context(|| format!("parsing {file:?}"))?;

	let siz = &codestream.siz;
	println!("image: {}x{}x{}, {} component(s)", siz.width, siz.height, siz.depth, siz.component_count());
	println!("tiles: {}x{}x{} grid, {} tile-part(s)", siz.width.div_ceil(siz.tile_width), siz.height.div_ceil(siz.tile_height), siz.depth.div_ceil(siz.tile_depth), codestream.tiles.len());
	println!(
		"coding: {:?}, {} layer(s), {} level(s), {}",
		codestream.cod.progression_order,
		codestream.cod.quality_layers,
		codestream.cod.decomposition_levels,
		if codestream.cod.reversible { "reversible 5/3" } else { "irreversible 9/7" }
	);
	println!("high-throughput: {}", codestream.is_htj2k);
	for comment in &codestream.comments {
		println!("comment: {comment}");
	}
	for tile_part in &codestream.tiles {
		println!(
			"  tile {:3}  part {}/{}  header {:5} B  body {:7} B",
			tile_part.index,
			tile_part.tpsot,
			tile_part.tnsot,
			tile_part.header_range.length,
			tile_part.body_range.length
		);
	}
	if codestream.is_partial {
		println!("stream is partial");
	}
	for warning in &codestream.warnings {
		println!("warning: {warning}");
	}
	Ok(())
}
