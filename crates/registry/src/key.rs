use std::collections::HashMap;

use wslreg_proto::{
	consts::{
		is_predefined, HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE, KEY_READ, KEY_WOW64_32KEY,
		KEY_WOW64_64KEY,
	},
	RawHkey, RegType, Value,
};

use crate::{registry::Keys, AsRawHkey, Hkey, Registry, Result};

#[derive(Debug)]
enum KeyHandle {
	/// A predefined root, used as is and never closed.
	Root(RawHkey),
	Open(Hkey),
}

/// A key together with the access it was opened with.
///
/// Sub keys are opened with the same access unless told otherwise, so a key obtained from
/// [`RegKey::local_machine_32`] keeps looking at the 32 bit view all the way down. Values read
/// through this type come out the way a reader wants them: `REG_SZ` cut at the first null and
/// `REG_EXPAND_SZ` already expanded.
#[derive(Debug)]
pub struct RegKey {
	registry: Registry,
	handle: KeyHandle,
	access: u32,
}

impl RegKey {
	/// Opens `sub_key` below `root`. Without a sub key a predefined root is wrapped as is, while any
	/// other key is reopened so the result owns its own handle.
	pub fn open(
		registry: &Registry,
		root: impl AsRawHkey,
		sub_key: Option<&str>,
		access: u32,
	) -> Result<Self> {
		let sub_key = sub_key.filter(|sub_key| !sub_key.is_empty());
		let raw = root.as_raw_hkey();

		let handle = if sub_key.is_none() && is_predefined(raw) {
			KeyHandle::Root(raw)
		} else {
			KeyHandle::Open(registry.open_key_ex(raw, sub_key, 0, access)?)
		};

		Ok(Self {
			registry: registry.clone(),
			handle,
			access,
		})
	}

	/// Takes ownership of an already opened key.
	#[must_use]
	pub fn from_hkey(registry: &Registry, key: Hkey, access: u32) -> Self {
		Self {
			registry: registry.clone(),
			handle: KeyHandle::Open(key),
			access,
		}
	}

	/// `HKEY_CURRENT_USER`, for reading.
	pub fn current_user(registry: &Registry) -> Result<Self> {
		Self::open(registry, HKEY_CURRENT_USER, None, KEY_READ)
	}

	/// `HKEY_LOCAL_MACHINE` as 32 bit programs see it, for reading.
	pub fn local_machine_32(registry: &Registry) -> Result<Self> {
		Self::open(registry, HKEY_LOCAL_MACHINE, None, KEY_READ | KEY_WOW64_32KEY)
	}

	/// `HKEY_LOCAL_MACHINE` as 64 bit programs see it, for reading.
	pub fn local_machine_64(registry: &Registry) -> Result<Self> {
		Self::open(registry, HKEY_LOCAL_MACHINE, None, KEY_READ | KEY_WOW64_64KEY)
	}

	#[must_use]
	pub const fn access(&self) -> u32 {
		self.access
	}

	#[must_use]
	pub const fn registry(&self) -> &Registry {
		&self.registry
	}

	/// Opens a sub key, with this key's access unless `access` says otherwise.
	pub fn open_subkey(&self, sub_key: &str, access: Option<u32>) -> Result<Self> {
		Self::open(
			&self.registry,
			self,
			Some(sub_key),
			access.unwrap_or(self.access),
		)
	}

	/// Opens a sub key with this key's access.
	pub fn subkey(&self, sub_key: &str) -> Result<Self> {
		self.open_subkey(sub_key, None)
	}

	pub fn iter(&self) -> Keys<'_> {
		self.registry.keys(self)
	}

	/// Names of all sub keys, in enumeration order.
	pub fn subkey_names(&self) -> Result<Vec<String>> {
		self.iter().collect()
	}

	/// Reads a value, `None` naming the key's unnamed value.
	pub fn value(&self, name: Option<&str>) -> Result<(Value, RegType)> {
		let (value, typ) = self.registry.query_value_ex(self, name)?;

		self.refine(value, typ)
	}

	/// Every value of the key by name. Should a name come up twice, the later one wins.
	pub fn values(&self) -> Result<HashMap<String, (Value, RegType)>> {
		let mut values = HashMap::new();

		for entry in self.registry.values(self) {
			let (name, value, typ) = entry?;
			values.insert(name, self.refine(value, typ)?);
		}

		Ok(values)
	}

	/// Stores `value` under its natural type tag.
	pub fn set_value(&self, name: Option<&str>, value: &Value) -> Result<()> {
		self.registry
			.set_value_ex(self, name, 0, value.reg_type(), value)
	}

	/// Closes the key now instead of on drop. Predefined roots are left alone.
	pub fn close(&mut self) -> Result<()> {
		match &mut self.handle {
			KeyHandle::Root(_) => Ok(()),
			KeyHandle::Open(key) => key.close(),
		}
	}

	fn refine(&self, value: Value, typ: RegType) -> Result<(Value, RegType)> {
		let value = match value {
			Value::ExpandString(text) => {
				Value::ExpandString(self.registry.expand_environment_strings(&text)?)
			}
			// Decoding already stops `REG_SZ` at the first null.
			other => other,
		};

		Ok((value, typ))
	}
}

impl AsRawHkey for RegKey {
	fn as_raw_hkey(&self) -> RawHkey {
		match &self.handle {
			KeyHandle::Root(raw) => *raw,
			KeyHandle::Open(key) => key.as_raw(),
		}
	}
}

impl<'a> IntoIterator for &'a RegKey {
	type Item = Result<String>;
	type IntoIter = Keys<'a>;

	fn into_iter(self) -> Self::IntoIter {
		self.iter()
	}
}
