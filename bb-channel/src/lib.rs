//! A payload-opaque unreliable datagram emulator.
//!
//! Sits between a reliable transport engine (`bb-transport`) and a real or
//! simulated socket, and deterministically perturbs outgoing datagrams —
//! drop, duplicate, reorder, delay, rate-limit — so the transports above it
//! can be stress-tested without a flaky real network. Perturbation is
//! applied once, at enqueue time; once a frame is in the outbound FIFO its
//! bytes are never mutated again.

mod rng;
mod socket;

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::thread::sleep;
use std::time::{Duration, Instant};

use log::{debug, trace, warn};

pub use socket::DatagramSocket;

use rng::Rng;

/// Upper bound on how long [`Channel::send`]'s drain loop will wait for the
/// queue head to become ready before giving up for this call.
const DRAIN_WAIT_CAP: Duration = Duration::from_millis(150);
/// Chunk size for the bounded wait inside the drain loop.
const DRAIN_WAIT_CHUNK: Duration = Duration::from_millis(5);
/// Extra delay applied to a duplicated copy relative to its original.
const DUP_DELAY: Duration = Duration::from_millis(1);

/// Channel impairment configuration.
#[derive(Clone, Copy, Debug)]
pub struct ChannelConfig {
	/// Percent chance \[0, 100\] a sent datagram is dropped silently.
	pub loss_pct: u8,
	/// Percent chance \[0, 100\] a sent datagram is duplicated.
	pub dup_pct: u8,
	/// Percent chance \[0, 100\] the queue head is swapped with the next entry after enqueue.
	pub reorder_pct: u8,
	/// Mean additional delay applied before a datagram becomes eligible for transmission.
	pub delay_mean: Duration,
	/// Jitter applied symmetrically around `delay_mean`.
	pub jitter: Duration,
	/// Token-bucket rate limit in megabits/second. `None` disables rate limiting.
	pub rate_mbps: Option<f64>,
	/// PRNG seed. `0` resolves to a fixed nonzero constant.
	pub seed: u64,
}

impl Default for ChannelConfig {
	fn default() -> Self {
		Self {
			loss_pct: 0,
			dup_pct: 0,
			reorder_pct: 0,
			delay_mean: Duration::ZERO,
			jitter: Duration::ZERO,
			rate_mbps: None,
			seed: 0,
		}
	}
}

struct QueuedFrame {
	bytes: Vec<u8>,
	ready_at: Instant,
}

/// The unreliable channel.
pub struct Channel<S> {
	socket: S,
	peer: SocketAddr,
	cfg: ChannelConfig,
	rng: Rng,
	queue: VecDeque<QueuedFrame>,
	next_tx_at: Option<Instant>,
}

impl<S: DatagramSocket> Channel<S> {
	/// Create a channel bound to `peer` over `socket`.
	pub fn create(socket: S, peer: SocketAddr, cfg: ChannelConfig) -> Self {
		Self {
			socket,
			peer,
			rng: Rng::new(cfg.seed),
			cfg,
			queue: VecDeque::new(),
			next_tx_at: None,
		}
	}

	/// The peer address frames are currently sent to (and the last source
	/// address a datagram was received from, once `recv` has learned it).
	pub fn peer(&self) -> SocketAddr {
		self.peer
	}

	/// Enqueue `buf` for transmission (applying impairments), then
	/// opportunistically drain the outbound queue.
	///
	/// Returns the input length as "logical success" whenever the datagram
	/// was dropped, queued, or deferred by rate limiting — only an
	/// unrecoverable socket error produces an `Err`.
	pub fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
		self.enqueue(buf);
		self.drain()?;
		Ok(buf.len())
	}

	fn enqueue(&mut self, buf: &[u8]) {
		if self.rng.chance(self.cfg.loss_pct) {
			debug!("DROP {} bytes to {}", buf.len(), self.peer);
			return;
		}

		let ready_at = Instant::now() + self.jittered_delay();
		self.queue.push_back(QueuedFrame { bytes: buf.to_vec(), ready_at });

		if self.rng.chance(self.cfg.dup_pct) {
			self.queue.push_back(QueuedFrame { bytes: buf.to_vec(), ready_at: ready_at + DUP_DELAY });
		}

		if self.rng.chance(self.cfg.reorder_pct) && self.queue.len() >= 2 {
			self.queue.swap(0, 1);
		}
	}

	fn jittered_delay(&mut self) -> Duration {
		let mean_ns = self.cfg.delay_mean.as_nanos() as f64;
		let jitter_ns = self.cfg.jitter.as_nanos() as f64;

		let offset = if jitter_ns > 0.0 { self.rng.uniform(-jitter_ns, jitter_ns) } else { 0.0 };

		let total_ns = (mean_ns + offset).max(0.0);
		Duration::from_nanos(total_ns as u64)
	}

	/// Drain as much of the outbound queue as the bounded wait and token
	/// bucket allow.
	fn drain(&mut self) -> io::Result<()> {
		let wait_start = Instant::now();

		while let Some(front) = self.queue.front() {
			let now = Instant::now();

			if front.ready_at <= now {
				break;
			}

			if wait_start.elapsed() >= DRAIN_WAIT_CAP {
				break;
			}

			let remaining = front.ready_at - now;
			sleep(remaining.min(DRAIN_WAIT_CHUNK).min(DRAIN_WAIT_CAP.saturating_sub(wait_start.elapsed())));
		}

		loop {
			let Some(front) = self.queue.front() else { break };

			let now = Instant::now();

			if front.ready_at > now {
				break;
			}

			if let Some(next_tx_at) = self.next_tx_at {
				if next_tx_at > now {
					break;
				}
			}

			match self.socket.send_to(&front.bytes, self.peer) {
				Ok(n) => {
					trace!("SEND {n} bytes to {}", self.peer);

					if let Some(rate_mbps) = self.cfg.rate_mbps {
						let ns_per_byte = 8000.0 / rate_mbps;
						self.next_tx_at = Some(now + Duration::from_nanos((ns_per_byte * n as f64) as u64));
					}

					self.queue.pop_front();
				}
				Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
				Err(e) => {
					warn!("Fatal socket error while draining channel queue: {e}");
					return Err(e);
				}
			}
		}

		Ok(())
	}

	/// Opportunistically drain whatever the outbound queue's readiness and
	/// the rate limiter's token bucket currently allow, without enqueuing
	/// anything new. Transport engines call this from their own `recv` so a
	/// backlog built up by one `send` that outran the rate limit still
	/// makes progress even if the application doesn't call `send` again
	/// right away.
	pub fn pump(&mut self) -> io::Result<()> {
		self.drain()
	}

	/// Wait up to `timeout` for one datagram. Returns `0` on timeout.
	/// Updates the remembered peer to the datagram's source address.
	pub fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
		match self.socket.recv_from(buf, timeout)? {
			None => Ok(0),
			Some((n, src)) => {
				trace!("RECV {n} bytes from {src}");
				self.peer = src;
				Ok(n)
			}
		}
	}

	/// Release the outbound queue. Idempotent-safe only once — calling any
	/// other method after this is unspecified.
	pub fn destroy(self) {
		drop(self);
	}
}
