use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use comfy_table::{Table, ContentArrangement, presets::UTF8_FULL};

use crate::stats::RateSample;
use crate::transport::{EngineConfig, RunReport};

/// Print the run configuration to stderr before starting.
pub fn print_run_banner(config: &EngineConfig, domain_count: usize) {
	eprintln!("Mass DNS Resolver");
	eprintln!("=================");
	eprintln!("Server:         {}", config.server);
	eprintln!("Domains:        {}", domain_count);
	eprintln!("Concurrency:    {}", config.concurrency);
	eprintln!("Rate:           {} pps (sending delay {:?})", config.pps, config.sending_delay());
	eprintln!("Retry delay:    {:?}", config.retry_delay);
	eprintln!("Max attempts:   {}", config.max_attempts);
	match config.client_subnet {
		Some(addr) => eprintln!("Client subnet:  {}", addr),
		None => eprintln!("Client subnet:  none"),
	}
	eprintln!();
}

/// Rewrite the live throughput line on stderr.
pub fn live_rate_line(elapsed_secs: f64, rate_qps: f64) {
	eprint!("\x1b[2K\r[{:.2}] rate: {:.4} queries/s", elapsed_secs, rate_qps);
}

/// Print the final run summary as a formatted table.
pub fn print_final_report(report: &RunReport) {
	let mut table = Table::new();
	table.load_preset(UTF8_FULL);
	table.set_content_arrangement(ContentArrangement::Dynamic);
	table.set_header(vec![
		"Attempts", "Success", "Failed", "Avg Retries", "Elapsed", "Rate",
	]);
	table.add_row(vec![
		report.attempts.to_string(),
		report.success.to_string(),
		report.fail.to_string(),
		format!("{:.3}", report.avg_retries()),
		format!("{:.3}s", report.elapsed.as_secs_f64()),
		format!("{:.3} q/s", report.overall_rate()),
	]);

	println!("\nRun Summary");
	println!("===========\n");
	println!("{table}");
}

/// Write the throughput time-series as CSV for the chart renderer.
///
/// The file lands in the configured output directory, named after the
/// nameserver and whether a client subnet was attached.
pub fn write_rate_series(config: &EngineConfig, samples: &[RateSample]) -> Result<PathBuf> {
	std::fs::create_dir_all(&config.output_dir)
		.with_context(|| format!("create output directory '{}'", config.output_dir.display()))?;

	let stamp = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_secs())
		.unwrap_or(0);
	let path = config.output_dir.join(format!(
		"ns-{}_client-{}_{}.csv",
		config.server.ip(),
		config.client_subnet.is_some(),
		stamp,
	));

	let mut writer = csv::Writer::from_path(&path)
		.with_context(|| format!("create rate series file '{}'", path.display()))?;
	writer.write_record(["elapsed_secs", "rate_qps"])?;
	for sample in samples {
		writer.write_record([
			format!("{:.3}", sample.elapsed_secs),
			format!("{:.4}", sample.rate_qps),
		])?;
	}
	writer.flush()?;

	Ok(path)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_write_rate_series() {
		let dir = std::env::temp_dir()
			.join(format!("massresolve-rates-{}", std::process::id()));
		let config = EngineConfig {
			output_dir: dir.clone(),
			..EngineConfig::default()
		};
		let samples = vec![
			RateSample { elapsed_secs: 0.0, rate_qps: 0.0 },
			RateSample { elapsed_secs: 0.2, rate_qps: 150.0 },
		];

		let path = write_rate_series(&config, &samples).unwrap();
		let content = std::fs::read_to_string(&path).unwrap();
		assert!(content.starts_with("elapsed_secs,rate_qps"));
		assert!(content.contains("0.200,150.0000"));

		std::fs::remove_dir_all(dir).unwrap();
	}

	#[test]
	fn test_write_rate_series_empty_run() {
		// A run that resolved nothing still has the seed sample; the
		// export must not fail on it.
		let dir = std::env::temp_dir()
			.join(format!("massresolve-rates-empty-{}", std::process::id()));
		let config = EngineConfig {
			output_dir: dir.clone(),
			..EngineConfig::default()
		};
		let samples = vec![RateSample { elapsed_secs: 0.0, rate_qps: 0.0 }];

		let path = write_rate_series(&config, &samples).unwrap();
		assert!(path.exists());

		std::fs::remove_dir_all(dir).unwrap();
	}
}
