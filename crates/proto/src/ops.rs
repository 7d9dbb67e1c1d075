//! The operation table.
//!
//! Each entry declares an operation's code, its request fields in wire order and its reply type.
//! From that single declaration we get the request struct with its [`Wire`] impl, the [`Opcode`]
//! variant and the [`Request`] enum the backend decodes into, so the client and the backend can't
//! disagree about a layout.

use std::io::Read;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{
	consts::{RawHkey, ERROR_SUCCESS},
	frame::{decode, encode, Wire},
	value::RegType,
	Error, Result,
};

macro_rules! wire_struct {
	(
		$(#[$meta:meta])*
		$name:ident { $($field:ident: $ty:ty),* $(,)? }
	) => {
		$(#[$meta])*
		#[derive(Debug, Clone, Default, PartialEq, Eq)]
		pub struct $name {
			$(pub $field: $ty,)*
		}

		impl Wire for $name {
			#[allow(unused_variables)]
			fn encode(&self, buf: &mut Vec<u8>) {
				$(self.$field.encode(buf);)*
			}

			#[allow(unused_variables)]
			fn decode(reader: &mut impl Read) -> Result<Self> {
				Ok(Self {
					$($field: <$ty as Wire>::decode(reader)?,)*
				})
			}
		}
	};
}

macro_rules! operations {
	($(
		$(#[$meta:meta])*
		$name:ident = $code:literal { $($field:ident: $ty:ty),* $(,)? } -> $reply:ty;
	)*) => {
		/// First byte of every request.
		#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
		#[repr(u8)]
		pub enum Opcode {
			/// Ends the session. Carries no fields and gets no reply.
			Abort = 0,
			$($name = $code,)*
		}

		impl TryFrom<u8> for Opcode {
			type Error = Error;

			fn try_from(code: u8) -> Result<Self> {
				match code {
					0 => Ok(Self::Abort),
					$($code => Ok(Self::$name),)*
					unknown => Err(Error::UnknownOpcode(unknown)),
				}
			}
		}

		$(
			wire_struct! {
				$(#[$meta])*
				$name { $($field: $ty),* }
			}

			impl Operation for $name {
				const OPCODE: Opcode = Opcode::$name;
				type Reply = $reply;
			}

			impl From<$name> for Request {
				fn from(request: $name) -> Self {
					Self::$name(request)
				}
			}
		)*

		/// A decoded request, as seen by the backend.
		#[derive(Debug, Clone, PartialEq, Eq)]
		pub enum Request {
			$($name($name),)*
		}

		impl Request {
			#[must_use]
			pub const fn opcode(&self) -> Opcode {
				match self {
					$(Self::$name(_) => Opcode::$name,)*
				}
			}

			/// Reads the fields following `opcode`. [`Opcode::Abort`] has none and yields `None`.
			pub fn decode(opcode: Opcode, reader: &mut impl Read) -> Result<Option<Self>> {
				match opcode {
					Opcode::Abort => Ok(None),
					$(Opcode::$name => <$name as Wire>::decode(reader).map(|request| Some(Self::$name(request))),)*
				}
			}

			pub fn encode(&self, buf: &mut Vec<u8>) {
				encode::u8(buf, self.opcode() as u8);
				match self {
					$(Self::$name(request) => request.encode(buf),)*
				}
			}
		}
	};
}

/// A request type together with the reply it expects.
pub trait Operation: Wire + Into<Request> {
	const OPCODE: Opcode;
	type Reply: Wire;

	/// The complete request message: opcode followed by the fields.
	fn to_message(&self) -> Vec<u8> {
		let mut buf = vec![Self::OPCODE as u8];
		self.encode(&mut buf);
		buf
	}
}

wire_struct! {
	/// One value as returned by enumeration.
	ValueEntry { name: String, data: Vec<u8>, typ: RegType }
}

wire_struct! {
	/// A value's raw data and type tag.
	ValueData { data: Vec<u8>, typ: RegType }
}

/// Summary of a key, as returned by [`QueryInfoKey`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyInfo {
	pub sub_keys: u32,
	pub values: u32,
	/// Last write time, in 100 nanosecond intervals since January 1, 1601 (UTC).
	pub last_modified: u64,
}

impl Wire for KeyInfo {
	fn encode(&self, buf: &mut Vec<u8>) {
		encode::u32(buf, self.sub_keys);
		encode::u32(buf, self.values);
		encode::u64(buf, self.last_modified);
	}

	fn decode(reader: &mut impl Read) -> Result<Self> {
		Ok(Self {
			sub_keys: decode::u32(reader)?,
			values: decode::u32(reader)?,
			last_modified: decode::u64(reader)?,
		})
	}
}

operations! {
	/// Liveness check, answered with an empty success.
	Connect = 1 {} -> ();
	CloseKey = 2 { key: RawHkey } -> ();
	ConnectRegistry = 3 { key: RawHkey, computer_name: Option<String> } -> RawHkey;
	CreateKey = 4 { key: RawHkey, sub_key: Option<String> } -> RawHkey;
	CreateKeyEx = 5 {
		key: RawHkey,
		reserved: u32,
		access: u32,
		sub_key: Option<String>,
	} -> RawHkey;
	DeleteKey = 6 { key: RawHkey, sub_key: Option<String> } -> ();
	DeleteKeyEx = 7 {
		key: RawHkey,
		reserved: u32,
		access: u32,
		sub_key: Option<String>,
	} -> ();
	DeleteValue = 8 { key: RawHkey, value_name: Option<String> } -> ();
	EnumKey = 9 { key: RawHkey, index: u32 } -> String;
	EnumValue = 10 { key: RawHkey, index: u32 } -> ValueEntry;
	ExpandEnvironmentStrings = 11 { input: Option<String> } -> String;
	FlushKey = 12 { key: RawHkey } -> ();
	LoadKey = 13 { key: RawHkey, sub_key: Option<String>, file_name: Option<String> } -> ();
	OpenKey = 14 {
		key: RawHkey,
		reserved: u32,
		access: u32,
		sub_key: Option<String>,
	} -> RawHkey;
	OpenKeyEx = 15 {
		key: RawHkey,
		reserved: u32,
		access: u32,
		sub_key: Option<String>,
	} -> RawHkey;
	QueryInfoKey = 16 { key: RawHkey } -> KeyInfo;
	QueryValue = 17 { key: RawHkey, sub_key: Option<String> } -> String;
	QueryValueEx = 18 { key: RawHkey, value_name: Option<String> } -> ValueData;
	SaveKey = 19 { key: RawHkey, file_name: Option<String> } -> ();
	SetValue = 20 { key: RawHkey, sub_key: Option<String>, value: Option<String> } -> ();
	SetValueEx = 21 {
		key: RawHkey,
		typ: RegType,
		value_name: Option<String>,
		data: Vec<u8>,
	} -> ();
	DisableReflectionKey = 22 { key: RawHkey } -> ();
	EnableReflectionKey = 23 { key: RawHkey } -> ();
	QueryReflectionKey = 24 { key: RawHkey } -> bool;
	GetFileInfo = 25 { path_name: Option<String>, string_name: Option<String> } -> String;
}

/// Outcome of a request, as carried by the reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response<T> {
	Success(T),
	Failure { status: u32, message: String },
}

impl<T: Wire> Response<T> {
	pub fn encode(&self, buf: &mut Vec<u8>) {
		match self {
			Self::Success(reply) => {
				encode::u32(buf, ERROR_SUCCESS);
				reply.encode(buf);
			}
			Self::Failure { status, message } => {
				debug_assert_ne!(*status, ERROR_SUCCESS, "failures need a non-zero status");
				encode::u32(buf, *status);
				encode::string(buf, Some(message));
			}
		}
	}

	pub fn decode(reader: &mut impl Read) -> Result<Self> {
		let status = decode::u32(reader)?;
		if status == ERROR_SUCCESS {
			return T::decode(reader).map(Self::Success);
		}

		let message = decode::string(reader)?.unwrap_or_default();
		trace!(status, %message, "bridge reported a failure");

		Ok(Self::Failure { status, message })
	}
}
