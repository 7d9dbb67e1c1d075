use wslreg_proto::{KeyInfo, RawHkey, RegType, ValueData, ValueEntry};

use crate::Result;

/// The raw registry surface: one method per bridged operation, handles as plain ids and values as
/// bytes plus their type tag.
///
/// Implemented natively on Windows, by the bridge client under WSL, and by the backend side of the
/// bridge through whatever implementation it serves. Failures come back as
/// [`Error::NotFound`](crate::Error::NotFound) or [`Error::Native`](crate::Error::Native) carrying
/// the native status code.
pub trait RegistryApi: Send + Sync {
	fn close_key(&self, key: RawHkey) -> Result<()>;

	fn connect_registry(&self, computer_name: Option<&str>, key: RawHkey) -> Result<RawHkey>;

	fn create_key(&self, key: RawHkey, sub_key: Option<&str>) -> Result<RawHkey>;

	fn create_key_ex(
		&self,
		key: RawHkey,
		sub_key: Option<&str>,
		reserved: u32,
		access: u32,
	) -> Result<RawHkey>;

	fn delete_key(&self, key: RawHkey, sub_key: Option<&str>) -> Result<()>;

	fn delete_key_ex(
		&self,
		key: RawHkey,
		sub_key: Option<&str>,
		access: u32,
		reserved: u32,
	) -> Result<()>;

	fn delete_value(&self, key: RawHkey, value_name: Option<&str>) -> Result<()>;

	fn enum_key(&self, key: RawHkey, index: u32) -> Result<String>;

	fn enum_value(&self, key: RawHkey, index: u32) -> Result<ValueEntry>;

	fn expand_environment_strings(&self, input: Option<&str>) -> Result<String>;

	fn flush_key(&self, key: RawHkey) -> Result<()>;

	fn load_key(&self, key: RawHkey, sub_key: Option<&str>, file_name: Option<&str>)
		-> Result<()>;

	fn open_key_ex(
		&self,
		key: RawHkey,
		sub_key: Option<&str>,
		reserved: u32,
		access: u32,
	) -> Result<RawHkey>;

	fn query_info_key(&self, key: RawHkey) -> Result<KeyInfo>;

	fn query_value(&self, key: RawHkey, sub_key: Option<&str>) -> Result<String>;

	fn query_value_ex(&self, key: RawHkey, value_name: Option<&str>) -> Result<ValueData>;

	fn save_key(&self, key: RawHkey, file_name: Option<&str>) -> Result<()>;

	fn set_value(&self, key: RawHkey, sub_key: Option<&str>, value: Option<&str>) -> Result<()>;

	fn set_value_ex(
		&self,
		key: RawHkey,
		value_name: Option<&str>,
		typ: RegType,
		data: &[u8],
	) -> Result<()>;

	fn disable_reflection_key(&self, key: RawHkey) -> Result<()>;

	fn enable_reflection_key(&self, key: RawHkey) -> Result<()>;

	fn query_reflection_key(&self, key: RawHkey) -> Result<bool>;

	/// Reads a string from a file's version resource, such as `FileVersion` or `ProductName`.
	fn get_file_info(&self, path_name: Option<&str>, string_name: Option<&str>) -> Result<String>;
}
