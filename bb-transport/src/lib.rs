//! Reliable transport engines over [`bb_channel::Channel`].
//!
//! Two interchangeable sliding-window ARQ engines implement the same
//! [`Transport`] seam so callers (and the `bb-app` demo) stay
//! transport-agnostic, the way `bb_proto.h` sits in front of the GBN/SR
//! constructors in the original prototype: cumulative-ACK Go-Back-N
//! ([`gbn::Gbn`]) and per-segment Selective Repeat ([`sr::Sr`]).

pub mod gbn;
pub mod sr;

#[cfg(test)]
pub(crate) mod test_support;

use std::io;
use std::time::Duration;

pub use bb_channel::{ChannelConfig, DatagramSocket};
pub use gbn::{Gbn, GbnConfig};
pub use sr::{Sr, SrConfig};

/// Maximum window size, compile-time capped regardless of configuration.
/// Chosen so that `seq mod wnd` slot indexing can never alias within the
/// sequence space (`wnd <= 2^31`, with plenty of headroom to spare).
pub const MAX_WND: u32 = 256;

/// Window size used when a configuration supplies `0`.
pub const DEFAULT_WND: u32 = 32;

/// MSS used when a configuration supplies `0`.
pub const DEFAULT_MSS: usize = 512;

/// RTO used when a configuration supplies `0`.
pub const DEFAULT_RTO_MS: u64 = 120;

/// Clamp a configured window to `[1, MAX_WND]`, defaulting `0` to
/// [`DEFAULT_WND`].
pub(crate) fn clamp_wnd(wnd: u32) -> u32 {
	if wnd == 0 {
		DEFAULT_WND
	} else {
		wnd.min(MAX_WND)
	}
}

pub(crate) fn default_if_zero(v: usize, default: usize) -> usize {
	if v == 0 {
		default
	} else {
		v
	}
}

pub(crate) fn default_if_zero_u64(v: u64, default: u64) -> u64 {
	if v == 0 {
		default
	} else {
		v
	}
}

/// The common interface applications drive, independent of whether the
/// underlying engine is GBN or SR.
pub trait Transport {
	/// Hand application bytes to the engine for reliable delivery. Never
	/// blocks: queues as many segments as the current window allows and
	/// returns. Retransmission and ack consumption for what was queued
	/// happen lazily, driven by subsequent [`Transport::recv`] calls.
	fn send(&mut self, data: &[u8]) -> io::Result<()>;

	/// Wait up to `timeout` for progress. Returns `Ok(0)` if nothing was
	/// delivered to the application this call (a retransmit, a pure ACK,
	/// or a timeout), `Ok(n)` with the number of bytes written to `out`
	/// when an in-order application message was delivered.
	fn recv(&mut self, out: &mut [u8], timeout: Duration) -> io::Result<usize>;

	/// Release the underlying channel and socket. There is no teardown
	/// handshake (out of scope, see spec Non-goals) — this just drops
	/// resources on the caller's side.
	fn close(self);
}
