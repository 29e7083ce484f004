//! The ASCII `ORDER`/`REPLY` application protocol run over a
//! `bb_transport::Transport`.
//!
//! This crate knows nothing about sequence numbers, windows, or the
//! unreliable channel underneath it — it only encodes and decodes the byte
//! slices a transport hands it. It exists to give the reliability core
//! something concrete to carry end-to-end, not to gate its correctness.

use std::fmt;
use std::str::FromStr;

/// A customer order: `ORDER <id> <item> <qty>\n`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Order {
	pub id: u32,
	pub item: String,
	pub qty: u16,
}

/// The kitchen's reply to an order: `REPLY <id> <status>\n`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
	pub id: u32,
	pub status: ReplyStatus,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplyStatus {
	Ok,
	Err,
}

impl fmt::Display for ReplyStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			ReplyStatus::Ok => "OK",
			ReplyStatus::Err => "ERR",
		})
	}
}

impl FromStr for ReplyStatus {
	type Err = DecodeError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"OK" => Ok(ReplyStatus::Ok),
			"ERR" => Ok(ReplyStatus::Err),
			_ => Err(DecodeError::BadStatus),
		}
	}
}

/// Reasons decoding a line rejects it. All silent-drop conditions at the
/// call site, same convention as `bb_wire::ParseError`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeError {
	NotUtf8,
	BadKeyword,
	MissingField,
	BadInt,
	InvalidItemName,
	BadStatus,
	TrailingField,
}

impl fmt::Display for DecodeError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let msg = match self {
			DecodeError::NotUtf8 => "line is not valid UTF-8",
			DecodeError::BadKeyword => "missing or wrong leading keyword",
			DecodeError::MissingField => "line has too few fields",
			DecodeError::BadInt => "a numeric field did not parse",
			DecodeError::InvalidItemName => "item name contains whitespace",
			DecodeError::BadStatus => "status field is neither OK nor ERR",
			DecodeError::TrailingField => "line has extra fields after the expected ones",
		};
		f.write_str(msg)
	}
}

impl std::error::Error for DecodeError {}

fn validate_item(item: &str) -> Result<(), DecodeError> {
	if item.is_empty() || item.chars().any(|c| c.is_whitespace()) {
		Err(DecodeError::InvalidItemName)
	} else {
		Ok(())
	}
}

impl Order {
	/// Construct an order, rejecting item names with embedded whitespace
	/// (the wire encoding is space-delimited and has no quoting).
	pub fn new(id: u32, item: impl Into<String>, qty: u16) -> Result<Self, DecodeError> {
		let item = item.into();
		validate_item(&item)?;
		Ok(Self { id, item, qty })
	}

	pub fn encode(&self) -> Vec<u8> {
		format!("ORDER {} {} {}\n", self.id, self.item, self.qty).into_bytes()
	}

	pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
		let text = std::str::from_utf8(bytes).map_err(|_| DecodeError::NotUtf8)?;
		let line = text.strip_suffix('\n').unwrap_or(text);
		let mut fields = line.split(' ');

		if fields.next() != Some("ORDER") {
			log::debug!("ORDER line missing leading keyword: {line:?}");
			return Err(DecodeError::BadKeyword);
		}

		let id = fields.next().ok_or(DecodeError::MissingField)?.parse().map_err(|_| DecodeError::BadInt)?;
		let item = fields.next().ok_or(DecodeError::MissingField)?;
		validate_item(item)?;
		let qty = fields.next().ok_or(DecodeError::MissingField)?.parse().map_err(|_| DecodeError::BadInt)?;

		if fields.next().is_some() {
			return Err(DecodeError::TrailingField);
		}

		Ok(Self { id, item: item.to_string(), qty })
	}
}

impl Reply {
	pub fn new(id: u32, status: ReplyStatus) -> Self {
		Self { id, status }
	}

	pub fn encode(&self) -> Vec<u8> {
		format!("REPLY {} {}\n", self.id, self.status).into_bytes()
	}

	pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
		let text = std::str::from_utf8(bytes).map_err(|_| DecodeError::NotUtf8)?;
		let line = text.strip_suffix('\n').unwrap_or(text);
		let mut fields = line.split(' ');

		if fields.next() != Some("REPLY") {
			log::debug!("REPLY line missing leading keyword: {line:?}");
			return Err(DecodeError::BadKeyword);
		}

		let id = fields.next().ok_or(DecodeError::MissingField)?.parse().map_err(|_| DecodeError::BadInt)?;
		let status: ReplyStatus = fields.next().ok_or(DecodeError::MissingField)?.parse()?;

		if fields.next().is_some() {
			return Err(DecodeError::TrailingField);
		}

		Ok(Self { id, status })
	}
}
