use clap::{command, Parser};
use tracing::Level;

#[derive(Parser)]
#[command(version)]
pub struct CliOpts {
	/// Path to the JSON lines file with headers, oldest first
	#[arg(long, value_name = "FILE")]
	pub headers: String,
	/// Path to the toml configuration file
	#[arg(short, long, value_name = "FILE")]
	pub config: Option<String>,
	/// Log level
	#[arg(long)]
	pub verbosity: Option<Level>,
	/// Set logs format to JSON
	#[arg(long)]
	pub logs_json: bool,
	/// Number of validators in the active set
	#[arg(long, value_name = "N")]
	pub active_validators: Option<u32>,
}
