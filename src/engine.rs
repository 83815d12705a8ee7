use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::dns::{build_query, parse_reply, MAX_REPLY_SIZE};
use crate::domains::to_fqdn;
use crate::stats::{run_sampler, Counters};
use crate::transport::{
	Answer, EngineConfig, InFlight, QueryJob, RunReport, TimeoutEntry,
};

/// Resolve the given domains against the configured nameserver.
///
/// Spawns the scheduler, sender, receiver, timeout, and sampler tasks,
/// then runs the coordinator loop until every domain has reached a
/// terminal state. Socket errors are fatal and abort the run.
pub async fn run(config: &EngineConfig, domains: Vec<String>) -> Result<RunReport> {
	let bind_addr = if config.server.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
	let socket = UdpSocket::bind(bind_addr).await
		.with_context(|| format!("bind(udp, {})", bind_addr))?;
	socket.connect(config.server).await
		.with_context(|| format!("connect(udp, {})", config.server))?;
	let socket = Arc::new(socket);

	let (domains_tx, domains_rx) = mpsc::channel::<String>(config.concurrency);
	let (slot_tx, slot_rx) = mpsc::channel::<()>(config.concurrency);
	let (job_tx, job_rx) = mpsc::channel::<QueryJob>(config.concurrency);
	let (answer_tx, answer_rx) = mpsc::channel::<Answer>(config.concurrency);
	// Used as a queue; sized so resend bursts never block the coordinator.
	let (timeout_tx, timeout_rx) = mpsc::channel::<TimeoutEntry>(config.concurrency * 1000);
	let (expired_tx, expired_rx) = mpsc::channel::<TimeoutEntry>(1);
	let (done_tx, done_rx) = oneshot::channel::<()>();

	// The credit window: one token per allowed in-flight query. The
	// channel capacity equals the token count, so this cannot fail.
	for _ in 0..config.concurrency {
		let _ = slot_tx.try_send(());
	}

	let counters = Arc::new(Counters::new());
	let start = Instant::now();

	let scheduler_task = tokio::spawn(feed_domains(domains, domains_tx, slot_rx));
	let timeout_task = tokio::spawn(expire_timeouts(timeout_rx, expired_tx));
	let mut send_task = tokio::spawn(send_queries(
		socket.clone(),
		job_rx,
		config.sending_delay(),
		config.client_subnet,
	));
	let mut recv_task = tokio::spawn(read_replies(socket, answer_tx));
	let stats_task = tokio::spawn(run_sampler(
		counters.clone(),
		config.clone(),
		start,
		done_rx,
	));

	let coordinator = coordinate(
		config,
		counters.clone(),
		domains_rx,
		expired_rx,
		answer_rx,
		slot_tx,
		timeout_tx,
		job_tx,
	);
	tokio::pin!(coordinator);

	// The sender and receiver only return early on fatal socket errors.
	let run_result = tokio::select! {
		res = &mut coordinator => res,
		res = &mut send_task => Err(task_failure("sender", res)),
		res = &mut recv_task => Err(task_failure("receiver", res)),
	};

	scheduler_task.abort();
	timeout_task.abort();
	send_task.abort();
	recv_task.abort();

	let _ = done_tx.send(());
	let samples = stats_task.await.unwrap_or_default();

	run_result?;

	Ok(RunReport {
		attempts: counters.attempts(),
		success: counters.success(),
		fail: counters.fail(),
		retry_sum: counters.retry_sum(),
		elapsed: start.elapsed(),
		samples,
	})
}

fn task_failure(
	task: &str,
	res: std::result::Result<Result<()>, tokio::task::JoinError>,
) -> anyhow::Error {
	match res {
		Ok(Err(err)) => err,
		Ok(Ok(())) => anyhow!("{} task exited unexpectedly", task),
		Err(err) => anyhow!("{} task panicked: {}", task, err),
	}
}

/// Feed domains to the coordinator, one credit at a time.
///
/// Consumes one token from the credit channel per domain, so no more than
/// the credit window is ever in flight. Dropping the sender on exhaustion
/// is the "no more work" signal.
async fn feed_domains(
	domains: Vec<String>,
	domains_tx: mpsc::Sender<String>,
	mut slot_rx: mpsc::Receiver<()>,
) {
	for domain in domains {
		if slot_rx.recv().await.is_none() {
			return;
		}
		if domains_tx.send(to_fqdn(&domain)).await.is_err() {
			return;
		}
	}
}

/// Drain send jobs onto the socket, spacing writes by the sending delay.
async fn send_queries(
	socket: Arc<UdpSocket>,
	mut job_rx: mpsc::Receiver<QueryJob>,
	sending_delay: Duration,
	client_subnet: Option<std::net::Ipv4Addr>,
) -> Result<()> {
	while let Some(job) = job_rx.recv().await {
		let query = match build_query(job.id, &job.domain, client_subnet) {
			Ok(bytes) => bytes,
			Err(err) => {
				// The record stays registered and will exhaust its
				// retries through the normal timeout path.
				warn!("0x{:04x} cannot build query for {}: {:#}", job.id, job.domain, err);
				continue;
			}
		};
		socket.send(&query).await.context("write(udp)")?;
		tokio::time::sleep(sending_delay).await;
	}
	Ok(())
}

/// Read raw replies from the socket and hand the extracted fields to the
/// coordinator. Correlation is not done here.
async fn read_replies(socket: Arc<UdpSocket>, answer_tx: mpsc::Sender<Answer>) -> Result<()> {
	let mut buf = vec![0u8; MAX_REPLY_SIZE];
	loop {
		let len = socket.recv(&mut buf).await.context("read(udp)")?;
		match parse_reply(&buf[..len]) {
			Ok(answer) => {
				if answer_tx.send(answer).await.is_err() {
					return Ok(());
				}
			}
			Err(err) => debug!("dropping reply: {:#}", err),
		}
	}
}

/// Emit each registered record on the expiry channel once its deadline
/// passes. Registrations share one retry delay, so arrival order is
/// deadline order and a linear queue suffices. Nothing is cancelled here;
/// the coordinator discards stale expiries.
async fn expire_timeouts(
	mut register_rx: mpsc::Receiver<TimeoutEntry>,
	expired_tx: mpsc::Sender<TimeoutEntry>,
) {
	while let Some(entry) = register_rx.recv().await {
		tokio::time::sleep_until(entry.deadline).await;
		if expired_tx.send(entry).await.is_err() {
			return;
		}
	}
}

/// Draw a transaction id not currently in use. Rejection sampling; ids
/// are 16-bit and the in-flight cap is far below 65536.
fn next_id<R: Rng>(rng: &mut R, pending: &HashMap<u16, InFlight>) -> u16 {
	loop {
		let id: u16 = rng.gen();
		if id != 0 && !pending.contains_key(&id) {
			return id;
		}
	}
}

/// The coordinator: owns the in-flight registry and reacts to new
/// domains, timer expiries, and correlated replies.
#[allow(clippy::too_many_arguments)]
async fn coordinate(
	config: &EngineConfig,
	counters: Arc<Counters>,
	mut domains_rx: mpsc::Receiver<String>,
	mut expired_rx: mpsc::Receiver<TimeoutEntry>,
	mut answer_rx: mpsc::Receiver<Answer>,
	slot_tx: mpsc::Sender<()>,
	timeout_tx: mpsc::Sender<TimeoutEntry>,
	job_tx: mpsc::Sender<QueryJob>,
) -> Result<()> {
	let mut pending: HashMap<u16, InFlight> = HashMap::new();
	let mut rng = StdRng::from_entropy();
	let mut next_seq: u64 = 0;
	let mut domains_open = true;

	while domains_open || !pending.is_empty() {
		tokio::select! {
			maybe_domain = domains_rx.recv(), if domains_open => {
				let Some(domain) = maybe_domain else {
					domains_open = false;
					continue;
				};

				let id = next_id(&mut rng, &pending);
				next_seq += 1;
				let record = InFlight {
					id,
					seq: next_seq,
					domain,
					deadline: Instant::now() + config.retry_delay,
					attempt: 1,
				};
				debug!("0x{:04x} resolving {}", id, record.domain);
				counters.record_attempt();

				timeout_tx
					.send(TimeoutEntry { id, seq: record.seq, deadline: record.deadline })
					.await
					.map_err(|_| anyhow!("timeout service stopped"))?;
				job_tx
					.send(QueryJob { id, domain: record.domain.clone() })
					.await
					.map_err(|_| anyhow!("sender stopped"))?;
				pending.insert(id, record);
			}

			Some(entry) = expired_rx.recv() => {
				// A record is only acted on if it is still the current
				// registry entry for this id; expiries for resolved or
				// replaced records fall through.
				let current = pending.get(&entry.id)
					.map_or(false, |record| record.seq == entry.seq);
				if !current {
					continue;
				}

				let exhausted = pending.get(&entry.id)
					.map_or(true, |record| record.attempt >= config.max_attempts);
				if exhausted {
					if let Some(record) = pending.remove(&entry.id) {
						debug!(
							"0x{:04x} failed after {} tries: {}",
							record.id, record.attempt, record.domain,
						);
						counters.record_fail();
						// Credits only matter while the scheduler is
						// still feeding; it may already be gone.
						let _ = slot_tx.send(()).await;
					}
				} else if let Some(record) = pending.get_mut(&entry.id) {
					record.attempt += 1;
					record.deadline = Instant::now() + config.retry_delay;
					debug!(
						"0x{:04x} resend (try:{}) {}",
						record.id, record.attempt, record.domain,
					);
					let registration = TimeoutEntry {
						id: record.id,
						seq: record.seq,
						deadline: record.deadline,
					};
					let job = QueryJob { id: record.id, domain: record.domain.clone() };
					timeout_tx.send(registration).await
						.map_err(|_| anyhow!("timeout service stopped"))?;
					job_tx.send(job).await
						.map_err(|_| anyhow!("sender stopped"))?;
				}
			}

			Some(answer) = answer_rx.recv() => {
				let matched = match pending.get(&answer.id) {
					// Late reply or spoof
					None => false,
					Some(record) if record.domain != answer.domain => {
						debug!(
							"0x{:04x} mismatched question: {} != {}",
							answer.id, record.domain, answer.domain,
						);
						false
					}
					Some(_) => true,
				};
				if !matched {
					continue;
				}

				if let Some(record) = pending.remove(&answer.id) {
					debug!("0x{:04x} resolved {}", record.id, record.domain);
					counters.record_success(record.attempt);
					print_resolved(&record.domain, &answer.addresses);
					let _ = slot_tx.send(()).await;
				}
			}
		}
	}

	Ok(())
}

/// Report one resolution on stdout: name without the trailing dot, then
/// the addresses in sorted order.
fn print_resolved(domain: &str, addresses: &[std::net::Ipv4Addr]) {
	let name = domain.strip_suffix('.').unwrap_or(domain);
	let mut addrs: Vec<String> = addresses.iter().map(ToString::to_string).collect();
	addrs.sort();
	println!("{}, {}", name, addrs.join(" "));
}
