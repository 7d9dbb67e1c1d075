use std::{fmt, sync::Arc};

use tracing::info;
use wslreg_proto::{
	consts::KEY_READ,
	frame::{fits_frame, MAX_FRAME_LEN},
	value::{decode_value, encode_value},
	KeyInfo, RawHkey, RegType, Value,
};

use crate::{AsRawHkey, BridgeConfig, Environment, Error, Hkey, RegistryApi, Result};

/// The registry, with typed values and owned handles.
///
/// Arguments are checked before anything is sent, values are converted to and from their stored
/// bytes here, and every key opened through this type comes back as an [`Hkey`] that closes itself.
#[derive(Clone)]
pub struct Registry {
	api: Arc<dyn RegistryApi>,
}

impl fmt::Debug for Registry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Registry").finish_non_exhaustive()
	}
}

/// Rejects names the native API would silently cut short, or the bridge could not carry.
fn check_name(what: &str, name: Option<&str>) -> Result<()> {
	match name {
		Some(name) if name.contains('\0') => Err(Error::Validation(format!(
			"{what} may not contain a null character"
		))),
		Some(name) => check_len(what, name.len()),
		None => Ok(()),
	}
}

fn check_len(what: &str, len: usize) -> Result<()> {
	if fits_frame(len) {
		Ok(())
	} else {
		Err(Error::Validation(format!(
			"{what} of {len} bytes is over the {MAX_FRAME_LEN} byte limit"
		)))
	}
}

impl Registry {
	#[must_use]
	pub fn new(api: Arc<dyn RegistryApi>) -> Self {
		Self { api }
	}

	/// Picks the backend for the current platform, configured from `WSLREG_*` variables.
	pub fn from_environment() -> Result<Self> {
		Self::from_config(&BridgeConfig::from_env())
	}

	pub fn from_config(config: &BridgeConfig) -> Result<Self> {
		let environment = Environment::detect();
		info!(?environment, "Selecting registry backend;");

		environment.connect(config).map(Self::new)
	}

	#[must_use]
	pub const fn api(&self) -> &Arc<dyn RegistryApi> {
		&self.api
	}

	fn wrap(&self, raw: RawHkey) -> Hkey {
		Hkey::new(raw, Arc::clone(&self.api))
	}

	pub fn close_key(&self, mut key: Hkey) -> Result<()> {
		key.close()
	}

	/// Connects to a predefined key on another computer, or locally for `None`.
	pub fn connect_registry(
		&self,
		computer_name: Option<&str>,
		key: impl AsRawHkey,
	) -> Result<Hkey> {
		check_name("computer name", computer_name)?;

		self.api
			.connect_registry(computer_name, key.as_raw_hkey())
			.map(|raw| self.wrap(raw))
			.map_err(|e| e.with_path(computer_name))
	}

	pub fn create_key(&self, key: impl AsRawHkey, sub_key: Option<&str>) -> Result<Hkey> {
		check_name("sub key", sub_key)?;

		self.api
			.create_key(key.as_raw_hkey(), sub_key)
			.map(|raw| self.wrap(raw))
			.map_err(|e| e.with_path(sub_key))
	}

	pub fn create_key_ex(
		&self,
		key: impl AsRawHkey,
		sub_key: &str,
		reserved: u32,
		access: u32,
	) -> Result<Hkey> {
		check_name("sub key", Some(sub_key))?;

		self.api
			.create_key_ex(key.as_raw_hkey(), Some(sub_key), reserved, access)
			.map(|raw| self.wrap(raw))
			.map_err(|e| e.with_path(Some(sub_key)))
	}

	/// Deletes a key without sub keys.
	pub fn delete_key(&self, key: impl AsRawHkey, sub_key: &str) -> Result<()> {
		check_name("sub key", Some(sub_key))?;

		self.api
			.delete_key(key.as_raw_hkey(), Some(sub_key))
			.map_err(|e| e.with_path(Some(sub_key)))
	}

	/// Deletes a key from a specific registry view, `access` being one of the `KEY_WOW64_*` flags.
	pub fn delete_key_ex(
		&self,
		key: impl AsRawHkey,
		sub_key: &str,
		access: u32,
		reserved: u32,
	) -> Result<()> {
		check_name("sub key", Some(sub_key))?;

		self.api
			.delete_key_ex(key.as_raw_hkey(), Some(sub_key), access, reserved)
			.map_err(|e| e.with_path(Some(sub_key)))
	}

	pub fn delete_value(&self, key: impl AsRawHkey, value_name: Option<&str>) -> Result<()> {
		check_name("value name", value_name)?;

		self.api
			.delete_value(key.as_raw_hkey(), value_name)
			.map_err(|e| e.with_path(value_name))
	}

	/// Name of the sub key at `index`. Running past the last one fails with [`Error::NotFound`].
	pub fn enum_key(&self, key: impl AsRawHkey, index: u32) -> Result<String> {
		self.api.enum_key(key.as_raw_hkey(), index)
	}

	/// Name, value and type of the value at `index`. Running past the last one fails with
	/// [`Error::NotFound`].
	pub fn enum_value(&self, key: impl AsRawHkey, index: u32) -> Result<(String, Value, RegType)> {
		let entry = self.api.enum_value(key.as_raw_hkey(), index)?;
		let value = decode_value(&entry.data, entry.data.len(), entry.typ);

		Ok((entry.name, value, entry.typ))
	}

	/// Iterates over the names of the sub keys of `key`.
	pub fn keys(&self, key: impl AsRawHkey) -> Keys<'_> {
		Enumerate::new(self, key.as_raw_hkey(), |registry, key, index| {
			registry.enum_key(key, index)
		})
	}

	/// Iterates over the values of `key`.
	pub fn values(&self, key: impl AsRawHkey) -> Values<'_> {
		Enumerate::new(self, key.as_raw_hkey(), |registry, key, index| {
			registry.enum_value(key, index)
		})
	}

	/// Expands `%NAME%` references against the environment of the process serving the registry.
	pub fn expand_environment_strings(&self, input: &str) -> Result<String> {
		check_name("input", Some(input))?;

		self.api.expand_environment_strings(Some(input))
	}

	pub fn flush_key(&self, key: impl AsRawHkey) -> Result<()> {
		self.api.flush_key(key.as_raw_hkey())
	}

	/// Loads a hive file saved with [`Registry::save_key`] as `sub_key` of `key`.
	pub fn load_key(&self, key: impl AsRawHkey, sub_key: &str, file_name: &str) -> Result<()> {
		check_name("sub key", Some(sub_key))?;
		check_name("file name", Some(file_name))?;

		self.api
			.load_key(key.as_raw_hkey(), Some(sub_key), Some(file_name))
			.map_err(|e| e.with_path(Some(file_name)))
	}

	/// Opens `sub_key` for reading.
	pub fn open_key(&self, key: impl AsRawHkey, sub_key: Option<&str>) -> Result<Hkey> {
		self.open_key_ex(key, sub_key, 0, KEY_READ)
	}

	pub fn open_key_ex(
		&self,
		key: impl AsRawHkey,
		sub_key: Option<&str>,
		reserved: u32,
		access: u32,
	) -> Result<Hkey> {
		check_name("sub key", sub_key)?;

		self.api
			.open_key_ex(key.as_raw_hkey(), sub_key, reserved, access)
			.map(|raw| self.wrap(raw))
			.map_err(|e| e.with_path(sub_key))
	}

	pub fn query_info_key(&self, key: impl AsRawHkey) -> Result<KeyInfo> {
		self.api.query_info_key(key.as_raw_hkey())
	}

	/// The unnamed value of `sub_key`, as a string.
	pub fn query_value(&self, key: impl AsRawHkey, sub_key: Option<&str>) -> Result<String> {
		check_name("sub key", sub_key)?;

		self.api
			.query_value(key.as_raw_hkey(), sub_key)
			.map_err(|e| e.with_path(sub_key))
	}

	pub fn query_value_ex(
		&self,
		key: impl AsRawHkey,
		value_name: Option<&str>,
	) -> Result<(Value, RegType)> {
		check_name("value name", value_name)?;

		let data = self
			.api
			.query_value_ex(key.as_raw_hkey(), value_name)
			.map_err(|e| e.with_path(value_name))?;

		Ok((
			decode_value(&data.data, data.data.len(), data.typ),
			data.typ,
		))
	}

	/// Saves `key` and everything below it to a hive file. The file must not exist yet.
	pub fn save_key(&self, key: impl AsRawHkey, file_name: &str) -> Result<()> {
		check_name("file name", Some(file_name))?;

		self.api
			.save_key(key.as_raw_hkey(), Some(file_name))
			.map_err(|e| e.with_path(Some(file_name)))
	}

	/// Sets the unnamed value of `sub_key`, creating the key if needed. Only `REG_SZ` is accepted.
	pub fn set_value(
		&self,
		key: impl AsRawHkey,
		sub_key: Option<&str>,
		typ: RegType,
		value: Option<&str>,
	) -> Result<()> {
		if typ != RegType::SZ {
			return Err(Error::Validation(format!(
				"type must be {}, got {typ}",
				RegType::SZ
			)));
		}
		check_name("sub key", sub_key)?;
		check_name("value", value)?;

		self.api
			.set_value(key.as_raw_hkey(), sub_key, value)
			.map_err(|e| e.with_path(sub_key))
	}

	/// Stores `value` under `value_name` with the type tag `typ`. `reserved` is ignored.
	pub fn set_value_ex(
		&self,
		key: impl AsRawHkey,
		value_name: Option<&str>,
		_reserved: u32,
		typ: RegType,
		value: &Value,
	) -> Result<()> {
		check_name("value name", value_name)?;
		let data = encode_value(value, typ)?;
		check_len("value data", data.len())?;

		self.api
			.set_value_ex(key.as_raw_hkey(), value_name, typ, &data)
			.map_err(|e| e.with_path(value_name))
	}

	pub fn disable_reflection_key(&self, key: impl AsRawHkey) -> Result<()> {
		self.api.disable_reflection_key(key.as_raw_hkey())
	}

	pub fn enable_reflection_key(&self, key: impl AsRawHkey) -> Result<()> {
		self.api.enable_reflection_key(key.as_raw_hkey())
	}

	/// Whether reflection is disabled for `key`.
	pub fn query_reflection_key(&self, key: impl AsRawHkey) -> Result<bool> {
		self.api.query_reflection_key(key.as_raw_hkey())
	}

	/// Reads `string_name` (`FileVersion`, `ProductName`, ...) from the version resource of a file.
	pub fn get_file_info(&self, path_name: &str, string_name: &str) -> Result<String> {
		check_name("path", Some(path_name))?;
		check_name("string name", Some(string_name))?;

		self.api
			.get_file_info(Some(path_name), Some(string_name))
			.map_err(|e| e.with_path(Some(path_name)))
	}
}

/// Walks an enumeration index upwards until the registry reports there is nothing left.
///
/// Any failure other than [`Error::NotFound`] is yielded once, after which the iterator is done.
pub struct Enumerate<'a, T> {
	registry: &'a Registry,
	key: RawHkey,
	index: u32,
	done: bool,
	fetch: fn(&Registry, RawHkey, u32) -> Result<T>,
}

pub type Keys<'a> = Enumerate<'a, String>;
pub type Values<'a> = Enumerate<'a, (String, Value, RegType)>;

impl<'a, T> Enumerate<'a, T> {
	fn new(
		registry: &'a Registry,
		key: RawHkey,
		fetch: fn(&Registry, RawHkey, u32) -> Result<T>,
	) -> Self {
		Self {
			registry,
			key,
			index: 0,
			done: false,
			fetch,
		}
	}
}

impl<T> Iterator for Enumerate<'_, T> {
	type Item = Result<T>;

	fn next(&mut self) -> Option<Self::Item> {
		if self.done {
			return None;
		}

		match (self.fetch)(self.registry, self.key, self.index) {
			Ok(item) => {
				self.index += 1;
				Some(Ok(item))
			}
			Err(e) => {
				self.done = true;
				(!e.is_not_found()).then_some(Err(e))
			}
		}
	}
}

impl<T> fmt::Debug for Enumerate<'_, T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Enumerate")
			.field("key", &format_args!("{:#x}", self.key))
			.field("index", &self.index)
			.field("done", &self.done)
			.finish_non_exhaustive()
	}
}
