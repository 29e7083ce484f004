//! In-memory loopback socket pair used only by this crate's unit tests, so
//! GBN/SR engines can be exercised end-to-end without a real OS socket.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Duration;

use bb_channel::DatagramSocket;

pub fn client_addr() -> SocketAddr {
	"127.0.0.1:19001".parse().unwrap()
}

pub fn server_addr() -> SocketAddr {
	"127.0.0.1:19002".parse().unwrap()
}

type Inbox = Rc<RefCell<VecDeque<(Vec<u8>, SocketAddr)>>>;

pub struct LoopbackSocket {
	local: SocketAddr,
	inbox: Inbox,
	peer_inbox: Inbox,
}

impl DatagramSocket for LoopbackSocket {
	fn send_to(&self, buf: &[u8], _peer: SocketAddr) -> io::Result<usize> {
		self.peer_inbox.borrow_mut().push_back((buf.to_vec(), self.local));
		Ok(buf.len())
	}

	fn recv_from(&self, buf: &mut [u8], _timeout: Duration) -> io::Result<Option<(usize, SocketAddr)>> {
		match self.inbox.borrow_mut().pop_front() {
			None => Ok(None),
			Some((bytes, from)) => {
				let n = bytes.len().min(buf.len());
				buf[..n].copy_from_slice(&bytes[..n]);
				Ok(Some((n, from)))
			}
		}
	}

	fn local_addr(&self) -> io::Result<SocketAddr> {
		Ok(self.local)
	}
}

pub struct Pipe;

impl Pipe {
	/// Build a connected client/server socket pair: each socket's outbound
	/// datagrams land directly in the other's inbox.
	pub fn new() -> (LoopbackSocket, LoopbackSocket) {
		let to_server: Inbox = Rc::new(RefCell::new(VecDeque::new()));
		let to_client: Inbox = Rc::new(RefCell::new(VecDeque::new()));

		let client = LoopbackSocket { local: client_addr(), inbox: to_client.clone(), peer_inbox: to_server.clone() };
		let server = LoopbackSocket { local: server_addr(), inbox: to_server, peer_inbox: to_client };

		(client, server)
	}
}
