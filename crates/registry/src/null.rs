use wslreg_proto::{KeyInfo, RawHkey, RegType, ValueData, ValueEntry};

use crate::{Error, RegistryApi, Result};

/// Selected where no registry is reachable; every call fails with [`Error::NotImplemented`].
#[derive(Debug, Default, Clone, Copy)]
pub struct NullApi;

macro_rules! not_implemented {
	($($name:ident($($arg:ident: $ty:ty),*) -> $ret:ty;)*) => {
		$(
			fn $name(&self, $(_: $ty),*) -> Result<$ret> {
				Err(Error::NotImplemented)
			}
		)*
	};
}

impl RegistryApi for NullApi {
	not_implemented! {
		close_key(key: RawHkey) -> ();
		connect_registry(computer_name: Option<&str>, key: RawHkey) -> RawHkey;
		create_key(key: RawHkey, sub_key: Option<&str>) -> RawHkey;
		create_key_ex(key: RawHkey, sub_key: Option<&str>, reserved: u32, access: u32) -> RawHkey;
		delete_key(key: RawHkey, sub_key: Option<&str>) -> ();
		delete_key_ex(key: RawHkey, sub_key: Option<&str>, access: u32, reserved: u32) -> ();
		delete_value(key: RawHkey, value_name: Option<&str>) -> ();
		enum_key(key: RawHkey, index: u32) -> String;
		enum_value(key: RawHkey, index: u32) -> ValueEntry;
		expand_environment_strings(input: Option<&str>) -> String;
		flush_key(key: RawHkey) -> ();
		load_key(key: RawHkey, sub_key: Option<&str>, file_name: Option<&str>) -> ();
		open_key_ex(key: RawHkey, sub_key: Option<&str>, reserved: u32, access: u32) -> RawHkey;
		query_info_key(key: RawHkey) -> KeyInfo;
		query_value(key: RawHkey, sub_key: Option<&str>) -> String;
		query_value_ex(key: RawHkey, value_name: Option<&str>) -> ValueData;
		save_key(key: RawHkey, file_name: Option<&str>) -> ();
		set_value(key: RawHkey, sub_key: Option<&str>, value: Option<&str>) -> ();
		set_value_ex(key: RawHkey, value_name: Option<&str>, typ: RegType, data: &[u8]) -> ();
		disable_reflection_key(key: RawHkey) -> ();
		enable_reflection_key(key: RawHkey) -> ();
		query_reflection_key(key: RawHkey) -> bool;
		get_file_info(path_name: Option<&str>, string_name: Option<&str>) -> String;
	}
}
