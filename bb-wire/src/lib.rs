//! On-wire frame format and pack/parse for the Byte Bistro transport core.
//!
//! The wire layout is the single source of truth for the protocol (acts as
//! the project's mini-RFC, see `bb_wire.h` in the original prototype): a
//! fixed 16-byte header, little-endian, no padding, followed by the
//! payload. Changing the layout is a protocol-versioning event, not a
//! refactor — keep `HEADER_LEN` and the field offsets below in lockstep
//! with any change.

use std::cmp::Ordering;

pub mod seq;

pub use seq::seq_cmp;

/// Magic value identifying a Byte Bistro frame.
pub const MAGIC: u16 = 0xB17E;

/// Value of the `hdrlen` field: bytes after the `hdrlen` field itself, up to
/// the end of the header. A version marker; strict on receive.
pub const HDRLEN: u8 = 10;

/// Total header size on the wire, in bytes.
pub const HEADER_LEN: usize = 16;

/// Byte offset of the `crc` field within the header.
const CRC_OFFSET: usize = 14;

bitflags::bitflags! {
	/// Frame flag bitfield.
	#[derive(Clone, Copy, PartialEq, Eq, Default)]
	pub struct Flags: u8 {
		const ACK = 0x01;
		const DATA = 0x02;
		const FIN = 0x04;
	}
}

/// A parsed frame header (wire framing fields excluded: `magic`/`hdrlen` are
/// validated on parse and reconstructed on pack, not carried by callers).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
	pub flags: Flags,
	pub seq: u32,
	pub ack: u32,
	pub len: u16,
}

/// Reasons [`parse`] rejects a buffer. All are silent-drop conditions per
/// the transport's error taxonomy — callers log and discard, never panic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseError {
	/// Fewer than [`HEADER_LEN`] bytes were supplied.
	ShortHeader,
	/// The `magic` field did not match [`MAGIC`].
	BadMagic,
	/// The `hdrlen` field was not [`HDRLEN`].
	BadHdrLen,
	/// `len` claims more payload than the buffer actually has.
	Underrun,
	/// The stored checksum did not match the recomputed one.
	BadChecksum,
}

/// Pack a frame into `buf`. Returns the number of bytes written
/// (`HEADER_LEN + payload.len()`), or `0` if `buf` is too small to hold the
/// header and payload.
pub fn pack(buf: &mut [u8], flags: Flags, seq: u32, ack: u32, payload: &[u8]) -> usize {
	let total = HEADER_LEN + payload.len();

	if buf.len() < total || payload.len() > u16::MAX as usize {
		return 0;
	}

	buf[0..2].copy_from_slice(&MAGIC.to_le_bytes());
	buf[2] = flags.bits();
	buf[3] = HDRLEN;
	buf[4..8].copy_from_slice(&seq.to_le_bytes());
	buf[8..12].copy_from_slice(&ack.to_le_bytes());
	buf[12..14].copy_from_slice(&(payload.len() as u16).to_le_bytes());
	buf[CRC_OFFSET..HEADER_LEN].copy_from_slice(&[0; 4]);
	buf[HEADER_LEN..total].copy_from_slice(payload);

	let crc = checksum(&buf[..total]);
	buf[CRC_OFFSET..HEADER_LEN].copy_from_slice(&crc.to_le_bytes());

	total
}

/// Parse and validate a frame. On success, returns the header and a slice
/// of `bytes` containing exactly the payload (offset [`HEADER_LEN`],
/// length `header.len`).
pub fn parse(bytes: &[u8]) -> Result<(Header, &[u8]), ParseError> {
	if bytes.len() < HEADER_LEN {
		log::debug!("Frame shorter than header ({} bytes)", bytes.len());
		return Err(ParseError::ShortHeader);
	}

	let magic = u16::from_le_bytes(bytes[0..2].try_into().unwrap());

	if magic != MAGIC {
		log::debug!("Frame with bad magic {magic:#06x}, expected {MAGIC:#06x}");
		return Err(ParseError::BadMagic);
	}

	let flags = Flags::from_bits_truncate(bytes[2]);
	let hdrlen = bytes[3];

	if hdrlen != HDRLEN {
		log::debug!("Frame with unsupported hdrlen {hdrlen}, expected {HDRLEN}");
		return Err(ParseError::BadHdrLen);
	}

	let seq = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
	let ack = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
	let len = u16::from_le_bytes(bytes[12..14].try_into().unwrap());
	let stored_crc = u32::from_le_bytes(bytes[CRC_OFFSET..HEADER_LEN].try_into().unwrap());

	let total = HEADER_LEN + len as usize;

	if bytes.len() < total {
		log::debug!("Frame claims {len} byte payload but only {} bytes were received", bytes.len() - HEADER_LEN);
		return Err(ParseError::Underrun);
	}

	let mut zeroed = bytes[..total].to_vec();
	zeroed[CRC_OFFSET..HEADER_LEN].copy_from_slice(&[0; 4]);

	if checksum(&zeroed) != stored_crc {
		log::debug!("Frame seq={seq} failed checksum validation, dropping");
		return Err(ParseError::BadChecksum);
	}

	Ok((Header { flags, seq, ack, len }, &bytes[HEADER_LEN..total]))
}

/// Compute the frame's integrity field over `span` (header with the crc
/// field already zeroed, followed by payload), preferring hardware CRC32C
/// and falling back to Fletcher-32.
fn checksum(span: &[u8]) -> u32 {
	if bb_checksum::crc32c_hw_available() {
		bb_checksum::crc32c_hw(span)
	} else {
		bb_checksum::fletcher32(span)
	}
}

impl Ord for Header {
	fn cmp(&self, other: &Self) -> Ordering {
		seq_cmp(self.seq, other.seq)
	}
}

impl PartialOrd for Header {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trip_preserves_flags_seq_ack_payload() {
		let mut buf = [0u8; 64];
		let payload = b"ABC";

		let n = pack(&mut buf, Flags::DATA, 1, 0, payload);
		assert_eq!(n, HEADER_LEN + payload.len());

		let (header, parsed_payload) = parse(&buf[..n]).expect("valid frame");

		assert_eq!(header.flags, Flags::DATA);
		assert_eq!(header.seq, 1);
		assert_eq!(header.ack, 0);
		assert_eq!(header.len, payload.len() as u16);
		assert_eq!(parsed_payload, payload);
	}

	#[test]
	fn zero_length_payload_is_valid() {
		let mut buf = [0u8; 16];
		let n = pack(&mut buf, Flags::DATA, 5, 5, &[]);
		assert_eq!(n, HEADER_LEN);

		let (header, payload) = parse(&buf[..n]).expect("valid empty frame");
		assert_eq!(header.len, 0);
		assert!(payload.is_empty());
	}

	#[test]
	fn pack_fails_when_buffer_too_small() {
		let mut buf = [0u8; 10];
		assert_eq!(pack(&mut buf, Flags::DATA, 1, 0, b"hello"), 0);
	}

	#[test]
	fn bit_flip_anywhere_breaks_parse() {
		let mut buf = [0u8; 64];
		let n = pack(&mut buf, Flags::DATA | Flags::ACK, 7, 3, b"payload bytes");

		for i in 0..n {
			let mut corrupt = buf;
			corrupt[i] ^= 0x01;
			assert!(parse(&corrupt[..n]).is_err(), "bit flip at byte {i} should invalidate frame");
		}
	}

	#[test]
	fn bad_magic_is_rejected() {
		let mut buf = [0u8; 16];
		pack(&mut buf, Flags::DATA, 0, 0, &[]);
		buf[0] ^= 0xff;
		assert_eq!(parse(&buf), Err(ParseError::BadMagic));
	}

	#[test]
	fn short_buffer_is_rejected() {
		assert_eq!(parse(&[0u8; 4]), Err(ParseError::ShortHeader));
	}

	#[test]
	fn underrun_is_rejected() {
		let mut buf = [0u8; 32];
		let n = pack(&mut buf, Flags::DATA, 0, 0, b"0123456789");
		assert_eq!(parse(&buf[..n - 1]), Err(ParseError::Underrun));
	}
}
