use crate::{cli::CliOpts, config::RuntimeConfig};
use clap::Parser;
use color_eyre::{
	eyre::{eyre, WrapErr},
	Result,
};
use finality_core::{
	engine::BftEngine,
	utils::{default_subscriber, json_subscriber},
};
use std::{
	fs::{self, File},
	io::BufReader,
};
use tracing::info;

mod cli;
mod config;
mod replay;

pub fn load_runtime_config(opts: &CliOpts) -> Result<RuntimeConfig> {
	let mut cfg = if let Some(config_path) = &opts.config {
		fs::metadata(config_path).map_err(|_| eyre!("Provided config file doesn't exist."))?;
		confy::load_path(config_path)
			.wrap_err(format!("Failed to load configuration from {}", config_path))?
	} else {
		RuntimeConfig::default()
	};

	cfg.log_format_json = opts.logs_json || cfg.log_format_json;
	cfg.log_level = opts.verbosity.unwrap_or(cfg.log_level);

	// Flags override the config parameters
	if let Some(active_validators) = opts.active_validators {
		cfg.bft.active_validators = active_validators;
	}

	Ok(cfg)
}

pub fn main() -> Result<()> {
	color_eyre::install()?;
	let opts = CliOpts::parse();
	let cfg = load_runtime_config(&opts)?;

	if cfg.log_format_json {
		tracing::subscriber::set_global_default(json_subscriber(cfg.log_level))?;
	} else {
		tracing::subscriber::set_global_default(default_subscriber(cfg.log_level))?;
	};

	let version = clap::crate_version!();
	info!("Running finality replay version: {version}.");
	info!("Using config: {cfg:?}");

	let mut engine =
		BftEngine::new(cfg.bft.clone()).wrap_err("Invalid finality engine configuration")?;

	let file = File::open(&opts.headers)
		.wrap_err_with(|| format!("Failed to open headers file {}", opts.headers))?;
	let summary = replay::replay(&mut engine, BufReader::new(file))?;

	info!(
		accepted = summary.accepted,
		rejected = summary.rejected,
		finalized_height = summary.finalized_height,
		"Replay finished"
	);
	println!("{summary}");
	Ok(())
}
