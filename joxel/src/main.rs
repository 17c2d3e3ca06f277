use anyhow::Result;
use clap::{Parser, Subcommand};
use joxel::tools;

#[derive(Parser)]
#[command(name = "joxel", version, about = "JPEG 2000 codec and interactive image server")]
struct Cli {
	/// Increase verbosity (-v: debug, -vv: trace).
	#[arg(short, long, action = clap::ArgAction::Count, global = true)]
	verbose: u8,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand)]
enum Command {
	/// Start the interactive image server.
	Serve {
		/// Path to the YAML configuration file.
		config: std::path::PathBuf,
	},
	/// Parse a codestream and print its structure.
	Probe {
		/// Codestream or boxed file to inspect.
		file: std::path::PathBuf,
		/// Keep going on damaged streams.
		#[arg(long)]
		tolerant: bool,
	},
	/// Run structural conformance checks on a file.
	Validate {
		file: std::path::PathBuf,
	},
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	let level = match cli.verbose {
		0 => log::LevelFilter::Info,
		1 => log::LevelFilter::Debug,
		_ => log::LevelFilter::Trace,
	};
	env_logger::Builder::from_default_env().filter_level(level).init();

	match cli.command {
		Command::Serve { config } => tools::serve(&config).await,
		Command::Probe { file, tolerant } => tools::probe(&file, tolerant),
		Command::Validate { file } => tools::validate(&file),
	}
}
