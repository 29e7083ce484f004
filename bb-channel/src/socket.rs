//! The socket abstraction the channel is generic over.
//!
//! Separating this from [`crate::Channel`] mirrors the teacher workspace's
//! habit of keeping protocol logic decoupled from the concrete transport
//! (e.g. `net::udp::Socket` vs. the underlying link) — here it additionally
//! lets the deterministic impairment logic be exercised in tests without a
//! real OS socket.

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

/// A datagram socket bound to a single local address, capable of sending
/// to and receiving from any peer.
pub trait DatagramSocket {
	/// Send `buf` to `peer`. Returns the number of bytes written.
	fn send_to(&self, buf: &[u8], peer: SocketAddr) -> io::Result<usize>;

	/// Wait up to `timeout` for one datagram. Returns `Ok(None)` on
	/// timeout, `Ok(Some((len, src)))` on success.
	fn recv_from(&self, buf: &mut [u8], timeout: Duration) -> io::Result<Option<(usize, SocketAddr)>>;

	/// The address this socket is bound to.
	fn local_addr(&self) -> io::Result<SocketAddr>;
}

impl DatagramSocket for UdpSocket {
	fn send_to(&self, buf: &[u8], peer: SocketAddr) -> io::Result<usize> {
		UdpSocket::send_to(self, buf, peer)
	}

	fn recv_from(&self, buf: &mut [u8], timeout: Duration) -> io::Result<Option<(usize, SocketAddr)>> {
		// A zero timeout must mean "poll, don't block" — `set_read_timeout`
		// treats `Some(Duration::ZERO)` as an error, so map it to the
		// smallest representable nonzero timeout instead.
		let effective = if timeout.is_zero() { Duration::from_nanos(1) } else { timeout };

		self.set_read_timeout(Some(effective))?;

		match UdpSocket::recv_from(self, buf) {
			Ok((n, addr)) => Ok(Some((n, addr))),
			Err(e) if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut => Ok(None),
			Err(e) => Err(e),
		}
	}

	fn local_addr(&self) -> io::Result<SocketAddr> {
		UdpSocket::local_addr(self)
	}
}
