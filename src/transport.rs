use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use tokio::time::Instant;

use crate::stats::RateSample;

/// Default sampler cadence.
pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(200);

/// Default watchdog window, in sampler ticks.
pub const DEAD_STOP_TICKS: u32 = 75;

/// Engine configuration, assembled from the CLI by `main`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
	/// Target nameserver.
	pub server: SocketAddr,

	/// Maximum in-flight queries; also sizes the engine channels.
	pub concurrency: usize,

	/// Target send rate in queries per second.
	pub pps: u32,

	/// How long to wait for a reply before resending.
	pub retry_delay: Duration,

	/// Maximum send attempts per domain, including the first.
	pub max_attempts: u32,

	/// Optional EDNS0 client-subnet address; absent means no OPT record.
	pub client_subnet: Option<Ipv4Addr>,

	/// Cadence of the throughput sampler.
	pub sample_interval: Duration,

	/// Zero-progress ticks tolerated before the watchdog terminates the run.
	pub dead_stop_ticks: u32,

	/// Directory the rate-series export is written to.
	pub output_dir: PathBuf,
}

impl EngineConfig {
	/// Inter-send delay derived from the target packet rate.
	pub fn sending_delay(&self) -> Duration {
		Duration::from_secs(1) / self.pps
	}
}

impl Default for EngineConfig {
	fn default() -> Self {
		Self {
			server: SocketAddr::from(([8, 8, 8, 8], 53)),
			concurrency: 1000,
			pps: 2000,
			retry_delay: Duration::from_secs(1),
			max_attempts: 3,
			client_subnet: None,
			sample_interval: SAMPLE_INTERVAL,
			dead_stop_ticks: DEAD_STOP_TICKS,
			output_dir: PathBuf::from("output"),
		}
	}
}

/// One outstanding query. Lives in the coordinator's registry from first
/// send until it is resolved or runs out of attempts.
#[derive(Debug)]
pub struct InFlight {
	/// DNS transaction id; unique across the registry, never zero.
	pub id: u16,

	/// Creation stamp distinguishing this record from an earlier record
	/// that used the same id. Stale timer expiries are detected by
	/// comparing `(id, seq)`.
	pub seq: u64,

	/// Fully qualified name being resolved (trailing dot).
	pub domain: String,

	/// When the current attempt is considered lost.
	pub deadline: Instant,

	/// 1-based send attempts for this domain.
	pub attempt: u32,
}

/// Registration handed to the timeout service; echoed back on the expiry
/// channel once the deadline elapses.
#[derive(Debug)]
pub struct TimeoutEntry {
	pub id: u16,
	pub seq: u64,
	pub deadline: Instant,
}

/// A send request for the sender task.
#[derive(Debug)]
pub struct QueryJob {
	pub id: u16,
	pub domain: String,
}

/// Reply fields the receiver extracts; correlation happens in the
/// coordinator.
#[derive(Debug)]
pub struct Answer {
	pub id: u16,
	pub domain: String,
	pub addresses: Vec<Ipv4Addr>,
}

/// Outcome of a full engine run.
#[derive(Debug)]
pub struct RunReport {
	pub attempts: u64,
	pub success: u64,
	pub fail: u64,
	pub retry_sum: u64,
	pub elapsed: Duration,
	pub samples: Vec<RateSample>,
}

impl RunReport {
	/// Average send attempts per resolved domain; 0.0 when nothing resolved.
	pub fn avg_retries(&self) -> f64 {
		if self.success == 0 {
			0.0
		} else {
			self.retry_sum as f64 / self.success as f64
		}
	}

	/// Overall resolution rate across the whole run.
	pub fn overall_rate(&self) -> f64 {
		let secs = self.elapsed.as_secs_f64();
		if secs == 0.0 {
			0.0
		} else {
			self.success as f64 / secs
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_sending_delay_from_pps() {
		let config = EngineConfig { pps: 2000, ..EngineConfig::default() };
		assert_eq!(config.sending_delay(), Duration::from_micros(500));

		let config = EngineConfig { pps: 1, ..EngineConfig::default() };
		assert_eq!(config.sending_delay(), Duration::from_secs(1));
	}

	#[test]
	fn test_avg_retries_zero_success() {
		let report = RunReport {
			attempts: 5,
			success: 0,
			fail: 5,
			retry_sum: 0,
			elapsed: Duration::from_secs(1),
			samples: Vec::new(),
		};
		assert_eq!(report.avg_retries(), 0.0);
	}

	#[test]
	fn test_avg_retries_and_rate() {
		let report = RunReport {
			attempts: 2,
			success: 2,
			fail: 0,
			retry_sum: 3,
			elapsed: Duration::from_secs(2),
			samples: Vec::new(),
		};
		assert!((report.avg_retries() - 1.5).abs() < f64::EPSILON);
		assert!((report.overall_rate() - 1.0).abs() < f64::EPSILON);
	}
}
