use std::{
	fmt,
	hash::{Hash, Hasher},
	mem,
	sync::Arc,
};

use tracing::warn;
use wslreg_proto::RawHkey;

use crate::{RegistryApi, Result};

/// An open registry key.
///
/// Owns its handle id and closes it when dropped. [`Hkey::detach`] hands the id over to the caller
/// instead, after which closing is up to them.
pub struct Hkey {
	raw: RawHkey,
	api: Arc<dyn RegistryApi>,
}

impl Hkey {
	pub(crate) fn new(raw: RawHkey, api: Arc<dyn RegistryApi>) -> Self {
		Self { raw, api }
	}

	/// The handle id, zero once closed or detached.
	#[must_use]
	pub const fn as_raw(&self) -> RawHkey {
		self.raw
	}

	#[must_use]
	pub const fn is_open(&self) -> bool {
		self.raw != 0
	}

	/// Closes the key. Closing an already closed handle does nothing.
	///
	/// The handle counts as closed afterwards even if the close itself failed.
	pub fn close(&mut self) -> Result<()> {
		match mem::take(&mut self.raw) {
			0 => Ok(()),
			raw => self.api.close_key(raw),
		}
	}

	/// Gives up ownership of the handle id without closing it.
	pub fn detach(&mut self) -> RawHkey {
		mem::take(&mut self.raw)
	}
}

impl Drop for Hkey {
	fn drop(&mut self) {
		let raw = self.raw;
		if let Err(e) = self.close() {
			warn!(?e, "Failed to close registry key <raw={raw:#x}> on drop;");
		}
	}
}

impl PartialEq for Hkey {
	fn eq(&self, other: &Self) -> bool {
		self.raw == other.raw
	}
}

impl Eq for Hkey {}

impl Hash for Hkey {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.raw.hash(state);
	}
}

impl fmt::Debug for Hkey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("Hkey")
			.field(&format_args!("{:#x}", self.raw))
			.finish()
	}
}

impl fmt::Display for Hkey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "<Hkey:{:08X}>", self.raw)
	}
}

/// Anything that names a registry key: an open [`Hkey`], a predefined root such as
/// [`HKEY_CURRENT_USER`](crate::HKEY_CURRENT_USER), or a raw id.
pub trait AsRawHkey {
	fn as_raw_hkey(&self) -> RawHkey;
}

impl AsRawHkey for RawHkey {
	fn as_raw_hkey(&self) -> RawHkey {
		*self
	}
}

impl AsRawHkey for Hkey {
	fn as_raw_hkey(&self) -> RawHkey {
		self.raw
	}
}

impl<T: AsRawHkey + ?Sized> AsRawHkey for &T {
	fn as_raw_hkey(&self) -> RawHkey {
		(**self).as_raw_hkey()
	}
}
