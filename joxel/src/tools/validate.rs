use anyhow::{Context, Result, bail};
use joxel_codec::conformance;
use joxel_codec::{CodestreamParser, ParserOptions};
use std::path::Path;

/// Runs the structural conformance checks that apply to `file`.
pub fn validate(file: &Path) -> Result<()> {
	let bytes = std::fs::read(file).with_context(|| format!("reading {file:?}"))?;
	let mut failed = false;

	if bytes.starts_with(&conformance::JP2_SIGNATURE) {
		let report = conformance::validate_signature(&bytes);
		failed |= print_report("file format", &report);
	} else {
		let codestream = CodestreamParser::new(ParserOptions { tolerate_errors: true })
			.parse(&bytes)
			.with_context(|| format!("parsing {file:?}"))?;

		if codestream.siz.is_volumetric() {
			let report = conformance::validate_part10(&codestream.siz, codestream.cod.decomposition_levels);
			failed |= print_report("volumetric geometry", &report);
		}
		if codestream.is_htj2k {
			let report = conformance::validate_part15(&codestream, bytes.len() as u64);
			failed |= print_report("high throughput", &report);
		}
		if codestream.is_partial {
			println!("note: stream parsed as partial");
		}
	}

	if failed {
		bail!("{file:?} failed validation");
	}
	println!("{} is structurally valid", file.display());
	Ok(())
}

/// Prints a report; returns `true` when it carries errors.
fn print_report(name: &str, report: &conformance::ValidationReport) -> bool {
	for error in &report.errors {
		println!("{name}: error: {error}");
	}
	for warning in &report.warnings {
		println!("{name}: warning: {warning}");
	}
	!report.is_valid
}
