//! Conversion between typed registry values and the raw bytes stored by the registry.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::frame::Wire;

/// Registry value type tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegType(pub u32);

impl RegType {
	pub const NONE: Self = Self(0);
	pub const SZ: Self = Self(1);
	pub const EXPAND_SZ: Self = Self(2);
	pub const BINARY: Self = Self(3);
	pub const DWORD: Self = Self(4);
	pub const DWORD_LITTLE_ENDIAN: Self = Self(4);
	pub const DWORD_BIG_ENDIAN: Self = Self(5);
	pub const LINK: Self = Self(6);
	pub const MULTI_SZ: Self = Self(7);
	pub const RESOURCE_LIST: Self = Self(8);
	pub const FULL_RESOURCE_DESCRIPTOR: Self = Self(9);
	pub const RESOURCE_REQUIREMENTS_LIST: Self = Self(10);
	pub const QWORD: Self = Self(11);
	pub const QWORD_LITTLE_ENDIAN: Self = Self(11);

	const fn name(self) -> Option<&'static str> {
		Some(match self {
			Self::NONE => "REG_NONE",
			Self::SZ => "REG_SZ",
			Self::EXPAND_SZ => "REG_EXPAND_SZ",
			Self::BINARY => "REG_BINARY",
			Self::DWORD => "REG_DWORD",
			Self::DWORD_BIG_ENDIAN => "REG_DWORD_BIG_ENDIAN",
			Self::LINK => "REG_LINK",
			Self::MULTI_SZ => "REG_MULTI_SZ",
			Self::RESOURCE_LIST => "REG_RESOURCE_LIST",
			Self::FULL_RESOURCE_DESCRIPTOR => "REG_FULL_RESOURCE_DESCRIPTOR",
			Self::RESOURCE_REQUIREMENTS_LIST => "REG_RESOURCE_REQUIREMENTS_LIST",
			Self::QWORD => "REG_QWORD",
			_ => return None,
		})
	}
}

impl fmt::Display for RegType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.name() {
			Some(name) => f.write_str(name),
			None => write!(f, "REG_0x{:X}", self.0),
		}
	}
}

impl From<u32> for RegType {
	fn from(raw: u32) -> Self {
		Self(raw)
	}
}

impl From<RegType> for u32 {
	fn from(typ: RegType) -> Self {
		typ.0
	}
}

impl Wire for RegType {
	fn encode(&self, buf: &mut Vec<u8>) {
		self.0.encode(buf);
	}

	fn decode(reader: &mut impl std::io::Read) -> crate::Result<Self> {
		u32::decode(reader).map(Self)
	}
}

/// A registry value in its natural representation.
///
/// Which variant a stored value decodes to is decided by its type tag: integers for `DWORD` and
/// `QWORD`, text for the string types, a list for `MULTI_SZ`, and raw bytes for everything else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
	/// Absent value, or empty binary data.
	None,
	Dword(u32),
	Qword(u64),
	String(String),
	ExpandString(String),
	MultiString(Vec<String>),
	Binary(Vec<u8>),
}

impl Value {
	/// The type tag this value is naturally stored under.
	#[must_use]
	pub const fn reg_type(&self) -> RegType {
		match self {
			Self::None => RegType::NONE,
			Self::Dword(_) => RegType::DWORD,
			Self::Qword(_) => RegType::QWORD,
			Self::String(_) => RegType::SZ,
			Self::ExpandString(_) => RegType::EXPAND_SZ,
			Self::MultiString(_) => RegType::MULTI_SZ,
			Self::Binary(_) => RegType::BINARY,
		}
	}

	#[must_use]
	pub const fn kind(&self) -> &'static str {
		match self {
			Self::None => "none",
			Self::Dword(_) | Self::Qword(_) => "int",
			Self::String(_) | Self::ExpandString(_) => "str",
			Self::MultiString(_) => "list",
			Self::Binary(_) => "bytes",
		}
	}

	#[must_use]
	pub fn as_str(&self) -> Option<&str> {
		match self {
			Self::String(text) | Self::ExpandString(text) => Some(text),
			_ => None,
		}
	}
}

impl From<u32> for Value {
	fn from(value: u32) -> Self {
		Self::Dword(value)
	}
}

impl From<u64> for Value {
	fn from(value: u64) -> Self {
		Self::Qword(value)
	}
}

impl From<&str> for Value {
	fn from(value: &str) -> Self {
		Self::String(value.to_owned())
	}
}

impl From<String> for Value {
	fn from(value: String) -> Self {
		Self::String(value)
	}
}

impl From<Vec<String>> for Value {
	fn from(value: Vec<String>) -> Self {
		Self::MultiString(value)
	}
}

impl From<&[&str]> for Value {
	fn from(value: &[&str]) -> Self {
		Self::MultiString(value.iter().map(|item| (*item).to_owned()).collect())
	}
}

impl From<Vec<u8>> for Value {
	fn from(value: Vec<u8>) -> Self {
		Self::Binary(value)
	}
}

impl From<&[u8]> for Value {
	fn from(value: &[u8]) -> Self {
		Self::Binary(value.to_vec())
	}
}

impl<T: Into<Self>> From<Option<T>> for Value {
	fn from(value: Option<T>) -> Self {
		value.map_or(Self::None, Into::into)
	}
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueError {
	#[error("{typ} requires an integer value, got {kind}")]
	ExpectedInteger { typ: RegType, kind: &'static str },
	#[error("{value} does not fit in a {typ} value")]
	OutOfRange { typ: RegType, value: u64 },
	#[error("{typ} requires a string value, got {kind}")]
	ExpectedString { typ: RegType, kind: &'static str },
	#[error("{typ} requires a list of strings, got {kind}")]
	ExpectedList { typ: RegType, kind: &'static str },
	#[error("element {index} of a {typ} value contains a null character")]
	InvalidElement { typ: RegType, index: usize },
	#[error("Objects of type '{kind}' can not be used as binary registry values")]
	UnsupportedBinary { kind: &'static str },
}

/// Converts `value` into the bytes stored under the type tag `typ`.
pub fn encode_value(value: &Value, typ: RegType) -> Result<Vec<u8>, ValueError> {
	match typ {
		RegType::DWORD => {
			let number = match value {
				Value::None => 0,
				Value::Dword(number) => *number,
				Value::Qword(number) => u32::try_from(*number)
					.map_err(|_| ValueError::OutOfRange { typ, value: *number })?,
				other => {
					return Err(ValueError::ExpectedInteger {
						typ,
						kind: other.kind(),
					})
				}
			};

			Ok(number.to_le_bytes().to_vec())
		}

		RegType::QWORD => {
			let number = match value {
				Value::None => 0,
				Value::Dword(number) => u64::from(*number),
				Value::Qword(number) => *number,
				other => {
					return Err(ValueError::ExpectedInteger {
						typ,
						kind: other.kind(),
					})
				}
			};

			Ok(number.to_le_bytes().to_vec())
		}

		RegType::SZ | RegType::EXPAND_SZ => match value {
			Value::None => Ok(utf16_terminated("")),
			Value::String(text) | Value::ExpandString(text) => Ok(utf16_terminated(text)),
			other => Err(ValueError::ExpectedString {
				typ,
				kind: other.kind(),
			}),
		},

		RegType::MULTI_SZ => {
			let items: &[String] = match value {
				Value::None => &[],
				Value::MultiString(items) => items,
				other => {
					return Err(ValueError::ExpectedList {
						typ,
						kind: other.kind(),
					})
				}
			};

			let mut data = Vec::new();
			for (index, item) in items.iter().enumerate() {
				if item.contains('\0') {
					return Err(ValueError::InvalidElement { typ, index });
				}
				data.extend(utf16_terminated(item));
			}

			Ok(data)
		}

		// Every other tag stores opaque bytes.
		_ => match value {
			Value::None => Ok(Vec::new()),
			Value::Binary(bytes) => Ok(bytes.clone()),
			Value::String(text) | Value::ExpandString(text) => Ok(text.as_bytes().to_vec()),
			Value::Dword(number) => Ok(number.to_string().into_bytes()),
			Value::Qword(number) => Ok(number.to_string().into_bytes()),
			Value::MultiString(_) => Err(ValueError::UnsupportedBinary { kind: value.kind() }),
		},
	}
}

/// Interprets the first `size` bytes of `data` according to the type tag `typ`.
///
/// `size` is the length reported alongside the data and is clamped to what was actually received.
#[must_use]
pub fn decode_value(data: &[u8], size: usize, typ: RegType) -> Value {
	let data = &data[..size.min(data.len())];

	match typ {
		RegType::DWORD => {
			let mut bytes = [0u8; 4];
			let len = data.len().min(4);
			bytes[..len].copy_from_slice(&data[..len]);
			Value::Dword(u32::from_le_bytes(bytes))
		}

		RegType::QWORD => {
			let mut bytes = [0u8; 8];
			let len = data.len().min(8);
			bytes[..len].copy_from_slice(&data[..len]);
			Value::Qword(u64::from_le_bytes(bytes))
		}

		RegType::SZ => Value::String(utf16_until_null(data)),

		RegType::EXPAND_SZ => Value::ExpandString(utf16_until_null(data)),

		RegType::MULTI_SZ => {
			let text = utf16_lossy(data);
			if text.is_empty() {
				return Value::MultiString(Vec::new());
			}

			let text = text.strip_suffix('\0').unwrap_or(&text);
			Value::MultiString(text.split('\0').map(ToOwned::to_owned).collect())
		}

		_ if data.is_empty() => Value::None,

		_ => Value::Binary(data.to_vec()),
	}
}

fn utf16_terminated(text: &str) -> Vec<u8> {
	text.encode_utf16()
		.chain(Some(0))
		.flat_map(u16::to_le_bytes)
		.collect()
}

/// Decodes whole UTF-16LE code units, a trailing odd byte being dropped.
fn utf16_lossy(data: &[u8]) -> String {
	let units = data
		.chunks_exact(2)
		.map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
		.collect::<Vec<_>>();

	String::from_utf16_lossy(&units)
}

fn utf16_until_null(data: &[u8]) -> String {
	let mut text = utf16_lossy(data);
	if let Some(end) = text.find('\0') {
		text.truncate(end);
	}
	text
}

#[cfg(test)]
mod tests {
	use super::*;

	fn round_trip(value: Value, typ: RegType) {
		let data = encode_value(&value, typ).unwrap();
		assert_eq!(decode_value(&data, data.len(), typ), value, "{typ}");
	}

	#[test]
	fn representative_values_round_trip() {
		round_trip(Value::Dword(45), RegType::DWORD);
		round_trip(Value::Qword(0x1122_3344_5566_7788), RegType::QWORD);
		round_trip(Value::from("A string value"), RegType::SZ);
		round_trip(Value::from("日本語"), RegType::SZ);
		round_trip(
			Value::ExpandString("The path is %path%".to_owned()),
			RegType::EXPAND_SZ,
		);
		round_trip(
			Value::from(&["Lots", "of", "string", "values"][..]),
			RegType::MULTI_SZ,
		);
		round_trip(Value::from(&b"binary\x00data"[..]), RegType::BINARY);
		round_trip(Value::String("x".repeat(16383)), RegType::SZ);
		round_trip(Value::Binary(vec![b'x'; 16384]), RegType::BINARY);
	}

	#[test]
	fn integer_boundaries() {
		round_trip(Value::Dword(0), RegType::DWORD);
		round_trip(Value::Dword(u32::MAX), RegType::DWORD);
		round_trip(Value::Qword(u64::MAX), RegType::QWORD);

		assert_eq!(
			encode_value(&Value::Qword(u64::from(u32::MAX) + 1), RegType::DWORD),
			Err(ValueError::OutOfRange {
				typ: RegType::DWORD,
				value: u64::from(u32::MAX) + 1
			})
		);
		assert_eq!(
			encode_value(&Value::Qword(7), RegType::DWORD).unwrap(),
			vec![7, 0, 0, 0]
		);
	}

	#[test]
	fn multi_string_elements_are_each_terminated() {
		let data = encode_value(&Value::from(&["a", "b"][..]), RegType::MULTI_SZ).unwrap();
		assert_eq!(data, vec![b'a', 0, 0, 0, b'b', 0, 0, 0]);

		assert!(encode_value(&Value::MultiString(vec![]), RegType::MULTI_SZ)
			.unwrap()
			.is_empty());
	}

	#[test]
	fn multi_string_of_empty_elements() {
		round_trip(
			Value::from(&["", "", "", ""][..]),
			RegType::MULTI_SZ,
		);
		round_trip(Value::MultiString(vec![]), RegType::MULTI_SZ);
	}

	#[test]
	fn multi_string_rejects_embedded_nulls() {
		assert_eq!(
			encode_value(&Value::from(&["ok", "bad\0"][..]), RegType::MULTI_SZ),
			Err(ValueError::InvalidElement {
				typ: RegType::MULTI_SZ,
				index: 1
			})
		);
	}

	#[test]
	fn absent_values_encode_as_defaults() {
		assert_eq!(encode_value(&Value::None, RegType::DWORD).unwrap(), vec![0; 4]);
		assert_eq!(encode_value(&Value::None, RegType::QWORD).unwrap(), vec![0; 8]);
		assert_eq!(encode_value(&Value::None, RegType::SZ).unwrap(), vec![0, 0]);
		assert!(encode_value(&Value::None, RegType::MULTI_SZ).unwrap().is_empty());
		assert!(encode_value(&Value::None, RegType::BINARY).unwrap().is_empty());
	}

	#[test]
	fn absent_binary_reads_back_as_none() {
		round_trip(Value::None, RegType::BINARY);
		assert_eq!(decode_value(&[], 0, RegType::LINK), Value::None);
	}

	#[test]
	fn binary_tags_stringify_scalars() {
		assert_eq!(
			encode_value(&Value::Dword(42), RegType::BINARY).unwrap(),
			b"42".to_vec()
		);
		assert_eq!(
			encode_value(&Value::from("abc"), RegType::RESOURCE_LIST).unwrap(),
			b"abc".to_vec()
		);
		assert_eq!(
			encode_value(&Value::from(&["a"][..]), RegType::BINARY),
			Err(ValueError::UnsupportedBinary { kind: "list" })
		);
	}

	#[test]
	fn type_mismatches_are_rejected() {
		assert!(matches!(
			encode_value(&Value::from("1"), RegType::DWORD),
			Err(ValueError::ExpectedInteger { kind: "str", .. })
		));
		assert!(matches!(
			encode_value(&Value::Dword(1), RegType::SZ),
			Err(ValueError::ExpectedString { kind: "int", .. })
		));
		assert!(matches!(
			encode_value(&Value::from("a"), RegType::MULTI_SZ),
			Err(ValueError::ExpectedList { kind: "str", .. })
		));
	}

	#[test]
	fn short_integers_are_zero_extended() {
		assert_eq!(decode_value(&[], 0, RegType::DWORD), Value::Dword(0));
		assert_eq!(decode_value(&[0x34, 0x12], 2, RegType::DWORD), Value::Dword(0x1234));
		assert_eq!(decode_value(&[1, 0, 0, 0], 4, RegType::QWORD), Value::Qword(1));
	}

	#[test]
	fn strings_stop_at_the_first_null() {
		let mut data = utf16_terminated("first");
		data.extend(utf16_terminated("second"));

		assert_eq!(
			decode_value(&data, data.len(), RegType::SZ),
			Value::from("first")
		);
	}

	#[test]
	fn declared_size_clamps_the_buffer() {
		let data = utf16_terminated("abcdef");

		// Odd sizes are rounded down to whole code units.
		assert_eq!(decode_value(&data, 5, RegType::SZ), Value::from("ab"));
		assert_eq!(decode_value(&data, 4096, RegType::SZ), Value::from("abcdef"));
		assert_eq!(
			decode_value(b"binary", 3, RegType::BINARY),
			Value::Binary(b"bin".to_vec())
		);
	}

	#[test]
	fn unknown_tags_display_numerically() {
		assert_eq!(RegType::SZ.to_string(), "REG_SZ");
		assert_eq!(RegType(0x42).to_string(), "REG_0x42");
	}

	#[test]
	fn values_serialize_by_variant() {
		let json = serde_json::to_string(&Value::Dword(45)).unwrap();
		assert_eq!(json, r#"{"Dword":45}"#);
		assert_eq!(serde_json::from_str::<Value>(&json).unwrap(), Value::Dword(45));
	}
}
