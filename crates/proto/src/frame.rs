//! Primitive encoders and decoders for the bridge stream.
//!
//! Integers are little endian. Strings and byte buffers are framed as a `u32` byte length followed
//! by the payload, strings being UTF-8. A zero length string stands for "absent", which the backend
//! hands to the native API as a null pointer.

use std::io::{self, Read};

use crate::{Error, Result};

/// Frames longer than this are treated as a corrupted stream instead of being allocated.
pub const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

/// Whether a payload of `len` bytes is short enough for the peer to accept as one frame.
#[must_use]
pub fn fits_frame(len: usize) -> bool {
	u32::try_from(len).is_ok_and(|len| len <= MAX_FRAME_LEN)
}

/// Like [`Read::read_exact`], but a stream closed halfway through is reported as
/// [`Error::UnexpectedEof`].
pub fn read_exact(reader: &mut impl Read, buf: &mut [u8]) -> Result<()> {
	reader.read_exact(buf).map_err(|e| {
		if e.kind() == io::ErrorKind::UnexpectedEof {
			Error::UnexpectedEof
		} else {
			Error::Io(e)
		}
	})
}

pub mod decode {
	use std::io::Read;

	use super::{read_exact, MAX_FRAME_LEN};
	use crate::{Error, Result};

	pub fn u8(reader: &mut impl Read) -> Result<u8> {
		let mut buf = [0u8; 1];
		read_exact(reader, &mut buf)?;
		Ok(buf[0])
	}

	pub fn u32(reader: &mut impl Read) -> Result<u32> {
		let mut buf = [0u8; 4];
		read_exact(reader, &mut buf)?;
		Ok(u32::from_le_bytes(buf))
	}

	pub fn u64(reader: &mut impl Read) -> Result<u64> {
		let mut buf = [0u8; 8];
		read_exact(reader, &mut buf)?;
		Ok(u64::from_le_bytes(buf))
	}

	/// Deserialize buf as it's u32 length and data.
	pub fn buf(reader: &mut impl Read) -> Result<Vec<u8>> {
		let len = u32(reader)?;
		if len > MAX_FRAME_LEN {
			return Err(Error::FrameTooLarge(len));
		}

		let mut buf = vec![0u8; len as usize];
		read_exact(reader, &mut buf)?;

		Ok(buf)
	}

	/// Deserialize string as it's u32 length and UTF-8 data, the empty frame decoding to `None`.
	pub fn string(reader: &mut impl Read) -> Result<Option<String>> {
		let buf = buf(reader)?;
		if buf.is_empty() {
			return Ok(None);
		}

		String::from_utf8(buf).map(Some).map_err(Into::into)
	}
}

pub mod encode {
	pub fn u8(buf: &mut Vec<u8>, value: u8) {
		buf.push(value);
	}

	pub fn u32(buf: &mut Vec<u8>, value: u32) {
		buf.extend_from_slice(&value.to_le_bytes());
	}

	pub fn u64(buf: &mut Vec<u8>, value: u64) {
		buf.extend_from_slice(&value.to_le_bytes());
	}

	/// Serialize buf as it's u32 length and data.
	///
	/// Callers check [`fits_frame`](super::fits_frame) first. Anything longer than `u32::MAX` is
	/// announced as `u32::MAX`, which the peer refuses as [`Error::FrameTooLarge`](crate::Error).
	pub fn buf(buf: &mut Vec<u8>, bytes: &[u8]) {
		u32(buf, u32::try_from(bytes.len()).unwrap_or(u32::MAX));
		buf.extend_from_slice(bytes);
	}

	/// Serialize string as it's u32 length and UTF-8 data, `None` becoming the empty frame.
	pub fn string(buf: &mut Vec<u8>, text: Option<&str>) {
		self::buf(buf, text.unwrap_or_default().as_bytes());
	}
}

/// Something with a fixed position in a request or reply.
pub trait Wire: Sized {
	fn encode(&self, buf: &mut Vec<u8>);

	fn decode(reader: &mut impl Read) -> Result<Self>;
}

impl Wire for () {
	fn encode(&self, _: &mut Vec<u8>) {}

	fn decode(_: &mut impl Read) -> Result<Self> {
		Ok(())
	}
}

impl Wire for bool {
	fn encode(&self, buf: &mut Vec<u8>) {
		encode::u8(buf, u8::from(*self));
	}

	fn decode(reader: &mut impl Read) -> Result<Self> {
		decode::u8(reader).map(|byte| byte != 0)
	}
}

impl Wire for u32 {
	fn encode(&self, buf: &mut Vec<u8>) {
		encode::u32(buf, *self);
	}

	fn decode(reader: &mut impl Read) -> Result<Self> {
		decode::u32(reader)
	}
}

impl Wire for u64 {
	fn encode(&self, buf: &mut Vec<u8>) {
		encode::u64(buf, *self);
	}

	fn decode(reader: &mut impl Read) -> Result<Self> {
		decode::u64(reader)
	}
}

impl Wire for Vec<u8> {
	fn encode(&self, buf: &mut Vec<u8>) {
		encode::buf(buf, self);
	}

	fn decode(reader: &mut impl Read) -> Result<Self> {
		decode::buf(reader)
	}
}

impl Wire for Option<String> {
	fn encode(&self, buf: &mut Vec<u8>) {
		encode::string(buf, self.as_deref());
	}

	fn decode(reader: &mut impl Read) -> Result<Self> {
		decode::string(reader)
	}
}

/// Reply strings are never absent, so the empty frame is simply the empty string.
impl Wire for String {
	fn encode(&self, buf: &mut Vec<u8>) {
		encode::string(buf, Some(self));
	}

	fn decode(reader: &mut impl Read) -> Result<Self> {
		decode::string(reader).map(Option::unwrap_or_default)
	}
}
