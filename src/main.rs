mod cli;
mod dns;
mod domains;
mod engine;
mod output;
mod resolver;
mod stats;
mod transport;

use std::net::Ipv4Addr;
use std::path::PathBuf;

use anyhow::{anyhow, ensure, Result};
use clap::Parser;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::transport::EngineConfig;

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	init_tracing(cli.verbose);

	// Exit codes are part of the tool's contract: 1 for configuration and
	// socket failures, 2 for the dead-stop watchdog (raised elsewhere).
	if let Err(err) = run(cli).await {
		eprintln!("{:#}", err);
		std::process::exit(1);
	}
}

async fn run(cli: Cli) -> Result<()> {
	let config = build_config(&cli)?;
	let domains = domains::read_domain_file(&cli.domains)?;

	output::print_run_banner(&config, domains.len());

	let report = engine::run(&config, domains).await?;

	output::print_final_report(&report);
	let path = output::write_rate_series(&config, &report.samples)?;
	eprintln!("Rate series written to {}", path.display());

	Ok(())
}

fn init_tracing(verbose: bool) {
	let level = if verbose { Level::DEBUG } else { Level::INFO };
	let filter = EnvFilter::builder()
		.with_default_directive(level.into())
		.from_env_lossy();

	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.with_target(false)
		.init();
}

fn build_config(cli: &Cli) -> Result<EngineConfig> {
	ensure!(cli.concurrency > 0, "concurrency must be at least 1");
	ensure!(cli.pps > 0, "pps must be at least 1");
	ensure!(cli.retries > 0, "retries must be at least 1");

	let server = resolver::parse_nameserver(&cli.server)?;

	let retry_delay = cli::parse_duration(&cli.retry)?;
	ensure!(!retry_delay.is_zero(), "retry delay must be positive");

	let client_subnet = cli.client.as_deref()
		.map(|raw| {
			raw.parse::<Ipv4Addr>()
				.map_err(|e| anyhow!("invalid client subnet address '{}': {}", raw, e))
		})
		.transpose()?;

	Ok(EngineConfig {
		server,
		concurrency: cli.concurrency,
		pps: cli.pps,
		retry_delay,
		max_attempts: cli.retries,
		client_subnet,
		output_dir: PathBuf::from(&cli.output),
		..EngineConfig::default()
	})
}
