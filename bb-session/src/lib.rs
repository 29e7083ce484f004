//! Single-peer UDP session bring-up and the process-wide log backend.
//!
//! Mirrors `main_server.c`/`main_client.c`'s bring-up sequence: the server
//! binds and blocks on its first datagram to learn the peer's address (no
//! handshake, no negotiation — out of scope per the Non-goals), while the
//! client binds an ephemeral port and sends one seed datagram so the server
//! has somewhere to learn a peer from. Both sides then build their own
//! channel and transport engine on top of the now-connected socket.

pub mod logger;

use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use bb_channel::ChannelConfig;
use bb_transport::{Gbn, GbnConfig, Sr, SrConfig};

pub use logger::Logger;

/// How long the server's bring-up recv waits for the client's seed datagram
/// before giving up.
pub const BRING_UP_TIMEOUT: Duration = Duration::from_secs(30);

/// Install [`Logger`] as the process-wide `log` backend. Call once, at
/// process start — a second call is a programmer error, matching
/// `log::set_logger`'s own contract.
pub fn install_logger(level: log::LevelFilter) {
	log::set_logger(&Logger).expect("logger already installed");
	log::set_max_level(level);
}

/// Bind the server socket and block until the first datagram arrives,
/// learning the peer address from it. The datagram's payload is discarded;
/// only its source address matters here.
pub fn server_bind_and_learn_peer(bind_addr: impl ToSocketAddrs) -> io::Result<(UdpSocket, SocketAddr)> {
	let socket = UdpSocket::bind(bind_addr)?;
	socket.set_read_timeout(Some(BRING_UP_TIMEOUT))?;

	let mut buf = [0u8; 2048];
	let (_, peer) = socket.recv_from(&mut buf)?;

	socket.set_read_timeout(None)?;
	log::info!("server learned peer {peer}");

	Ok((socket, peer))
}

/// Bind an ephemeral client socket and send a single seed datagram to
/// `server`, giving the server something to learn a peer address from.
pub fn client_bind_and_seed(server: SocketAddr) -> io::Result<UdpSocket> {
	let socket = UdpSocket::bind("0.0.0.0:0")?;
	socket.send_to(&[0u8], server)?;
	log::info!("client seeded server at {server}");
	Ok(socket)
}

/// Bring up a server-side Go-Back-N session: bind, learn the peer, build
/// the channel and engine.
pub fn server_gbn_session(
	bind_addr: impl ToSocketAddrs,
	channel_cfg: ChannelConfig,
	cfg: GbnConfig,
	init_seq: u32,
) -> io::Result<Gbn<UdpSocket>> {
	let (socket, peer) = server_bind_and_learn_peer(bind_addr)?;
	Ok(Gbn::new(socket, peer, channel_cfg, cfg, init_seq))
}

/// Bring up a client-side Go-Back-N session: bind ephemerally, seed the
/// server, build the channel and engine.
pub fn client_gbn_session(
	server: SocketAddr,
	channel_cfg: ChannelConfig,
	cfg: GbnConfig,
	init_seq: u32,
) -> io::Result<Gbn<UdpSocket>> {
	let socket = client_bind_and_seed(server)?;
	Ok(Gbn::new(socket, server, channel_cfg, cfg, init_seq))
}

/// Bring up a server-side Selective Repeat session.
pub fn server_sr_session(
	bind_addr: impl ToSocketAddrs,
	channel_cfg: ChannelConfig,
	cfg: SrConfig,
	init_seq: u32,
) -> io::Result<Sr<UdpSocket>> {
	let (socket, peer) = server_bind_and_learn_peer(bind_addr)?;
	Ok(Sr::new(socket, peer, channel_cfg, cfg, init_seq))
}

/// Bring up a client-side Selective Repeat session.
pub fn client_sr_session(
	server: SocketAddr,
	channel_cfg: ChannelConfig,
	cfg: SrConfig,
	init_seq: u32,
) -> io::Result<Sr<UdpSocket>> {
	let socket = client_bind_and_seed(server)?;
	Ok(Sr::new(socket, server, channel_cfg, cfg, init_seq))
}
