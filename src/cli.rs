use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::Parser;

/// Bulk DNS resolver and nameserver benchmark
#[derive(Parser, Debug)]
#[command(name = "massresolve")]
#[command(about = "Mass resolve DNS A records at a controlled packet rate")]
pub struct Cli {
	/// File containing domains to resolve (one per line)
	#[arg(short = 'd', long = "domains")]
	pub domains: String,

	/// Target nameserver (ip or ip:port, default port 53)
	#[arg(short = 's', long = "server", default_value = "8.8.8.8:53")]
	pub server: String,

	/// Maximum concurrent in-flight queries
	#[arg(short = 't', long = "concurrency", default_value = "1000")]
	pub concurrency: usize,

	/// Send up to this many DNS queries per second
	#[arg(long = "pps", default_value = "2000")]
	pub pps: u32,

	/// Resend an unanswered query after this long (e.g. 500ms, 1s)
	#[arg(long = "retry", default_value = "1s")]
	pub retry: String,

	/// Maximum send attempts per domain
	#[arg(long = "retries", default_value = "3")]
	pub retries: u32,

	/// IPv4 address for the EDNS0 client-subnet option
	#[arg(short = 'c', long = "client")]
	pub client: Option<String>,

	/// Output directory for the rate-series export
	#[arg(short = 'o', long = "output", default_value = "output")]
	pub output: String,

	/// Verbose logging of per-query state transitions
	#[arg(short = 'v', long = "verbose")]
	pub verbose: bool,
}

/// Parse a duration string of the form "<number><unit>" where unit is one
/// of ms, s, m, or h.
pub fn parse_duration(input: &str) -> Result<Duration> {
	let trimmed = input.trim();
	let unit_start = trimmed.find(|c: char| !c.is_ascii_digit())
		.ok_or_else(|| anyhow!("duration '{}' is missing a unit (ms, s, m, h)", input))?;
	let (number, unit) = trimmed.split_at(unit_start);
	let value: u64 = number.parse()
		.map_err(|_| anyhow!("duration '{}' has no numeric value", input))?;

	match unit {
		"ms" => Ok(Duration::from_millis(value)),
		"s" => Ok(Duration::from_secs(value)),
		"m" => Ok(Duration::from_secs(value * 60)),
		"h" => Ok(Duration::from_secs(value * 3600)),
		_ => Err(anyhow!("unknown duration unit '{}' in '{}'", unit, input)),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_parse_duration_units() {
		assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
		assert_eq!(parse_duration("1s").unwrap(), Duration::from_secs(1));
		assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
		assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
	}

	#[test]
	fn test_parse_duration_rejects_garbage() {
		assert!(parse_duration("").is_err());
		assert!(parse_duration("1").is_err());
		assert!(parse_duration("s").is_err());
		assert!(parse_duration("1x").is_err());
		assert!(parse_duration("fast").is_err());
	}
}
