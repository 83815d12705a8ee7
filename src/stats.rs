use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::output;
use crate::transport::EngineConfig;

/// Monotonic run counters. Mutated only by the coordinator; the sampler
/// task reads them through atomic loads.
#[derive(Debug, Default)]
pub struct Counters {
	attempts: AtomicU64,
	success: AtomicU64,
	fail: AtomicU64,
	retry_sum: AtomicU64,
}

impl Counters {
	pub fn new() -> Self {
		Self::default()
	}

	/// A domain was taken on for resolution.
	pub fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	/// A domain resolved after the given number of send attempts.
	pub fn record_success(&self, tries: u32) {
		self.success.fetch_add(1, Ordering::Relaxed);
		self.retry_sum.fetch_add(u64::from(tries), Ordering::Relaxed);
	}

	/// A domain ran out of attempts.
	pub fn record_fail(&self) {
		self.fail.fetch_add(1, Ordering::Relaxed);
	}

	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	pub fn success(&self) -> u64 {
		self.success.load(Ordering::Relaxed)
	}

	pub fn fail(&self) -> u64 {
		self.fail.load(Ordering::Relaxed)
	}

	pub fn retry_sum(&self) -> u64 {
		self.retry_sum.load(Ordering::Relaxed)
	}
}

/// One point of the throughput time-series.
#[derive(Debug, Clone, Copy)]
pub struct RateSample {
	pub elapsed_secs: f64,
	pub rate_qps: f64,
}

/// Stall detector. Counts down over sampler ticks that saw no new
/// resolutions and resets on any progress.
#[derive(Debug)]
pub struct DeadStop {
	remaining: u32,
	window: u32,
}

impl DeadStop {
	pub fn new(window: u32) -> Self {
		Self { remaining: window, window }
	}

	/// Feed one tick's resolution delta. Returns true when the stall
	/// window is exhausted.
	pub fn observe(&mut self, delta: u64) -> bool {
		if delta > 0 {
			self.remaining = self.window;
			return false;
		}
		self.remaining = self.remaining.saturating_sub(1);
		self.remaining == 0
	}
}

/// Sample throughput on a fixed cadence until signalled done.
///
/// Each tick records `(elapsed, delta_success / interval)` and rewrites the
/// live rate line on stderr. A run that makes no progress for the whole
/// dead-stop window is terminated: the rate series is exported and the
/// process exits with code 2.
pub async fn run_sampler(
	counters: Arc<Counters>,
	config: EngineConfig,
	start: Instant,
	mut done: oneshot::Receiver<()>,
) -> Vec<RateSample> {
	let interval_secs = config.sample_interval.as_secs_f64();
	let mut ticker = tokio::time::interval_at(
		start + config.sample_interval,
		config.sample_interval,
	);

	let mut samples = vec![RateSample { elapsed_secs: 0.0, rate_qps: 0.0 }];
	let mut dead_stop = DeadStop::new(config.dead_stop_ticks);
	let mut last_success = 0u64;

	loop {
		tokio::select! {
			_ = &mut done => break,
			_ = ticker.tick() => {
				let success = counters.success();
				let delta = success - last_success;
				last_success = success;

				let elapsed = start.elapsed().as_secs_f64();
				let rate = delta as f64 / interval_secs;
				samples.push(RateSample { elapsed_secs: elapsed, rate_qps: rate });
				output::live_rate_line(elapsed, rate);

				if dead_stop.observe(delta) {
					if let Err(err) = output::write_rate_series(&config, &samples) {
						eprintln!("failed to export rate series: {:#}", err);
					}
					eprintln!();
					println!("Requests being decline. Terminating query.");
					std::process::exit(2);
				}
			}
		}
	}

	samples
}
