//! Wire format shared by the registry bridge client and its Windows backend.
//!
//! A session is a single TCP stream. The backend greets the client with a fixed [`BANNER`], then
//! serves requests strictly one at a time: a one byte [`Opcode`], the request's fields in
//! declaration order, and a reply led by a little endian `u32` status. Every operation is declared
//! once in [`ops`], which keeps both ends of the stream in agreement on field order and widths.
//!
//! Registry value payloads travel as raw bytes; [`value`] converts between those bytes and the
//! typed [`Value`] representation.

#![warn(
	clippy::all,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

use std::io::{self, Read, Write};

use thiserror::Error;

pub mod consts;
pub mod frame;
pub mod ops;
pub mod value;

pub use consts::RawHkey;
pub use frame::{decode, encode, Wire};
pub use ops::{KeyInfo, Opcode, Operation, Request, Response, ValueData, ValueEntry};
pub use value::{RegType, Value, ValueError};

/// Greeting written by the backend as soon as the client connects.
pub const BANNER: &str = "Bridge started 2.0";

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
	#[error("i/o error on the bridge stream: {0}")]
	Io(#[from] io::Error),
	#[error("bridge peer closed the stream in the middle of a message")]
	UnexpectedEof,
	#[error("bridge string is not valid utf-8: {0}")]
	InvalidUtf8(#[from] std::string::FromUtf8Error),
	#[error("unknown operation code {0}")]
	UnknownOpcode(u8),
	#[error("bridge version mismatch <expected='{expected}', received='{received}'>")]
	BannerMismatch {
		expected: &'static str,
		received: String,
	},
	#[error("bridge frame of {0} bytes exceeds the maximum frame length")]
	FrameTooLarge(u32),
	#[error("bridge stream was closed after an earlier failure")]
	Closed,
}

/// Sends the greeting, first thing on a freshly accepted stream.
pub fn write_banner(writer: &mut impl Write) -> Result<()> {
	writer.write_all(BANNER.as_bytes())?;
	writer.flush().map_err(Into::into)
}

/// Reads the peer's greeting and checks it against our own [`BANNER`].
pub fn read_banner(reader: &mut impl Read) -> Result<()> {
	let mut received = vec![0u8; BANNER.len()];
	frame::read_exact(reader, &mut received)?;

	if received == BANNER.as_bytes() {
		Ok(())
	} else {
		Err(Error::BannerMismatch {
			expected: BANNER,
			received: String::from_utf8_lossy(&received).into_owned(),
		})
	}
}
