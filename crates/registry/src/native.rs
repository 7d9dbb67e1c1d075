//! Direct calls into the Windows registry API.
//!
//! This is what the bridge backend serves, and what [`Registry::from_environment`] picks when
//! running on Windows itself.
//!
//! [`Registry::from_environment`]: crate::Registry::from_environment

#![allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]

use std::{ffi::c_void, io, iter, ptr};

use windows_sys::{
	core::PCWSTR,
	Win32::{
		Foundation::{BOOL, FILETIME},
		Storage::FileSystem::{GetFileVersionInfoSizeW, GetFileVersionInfoW, VerQueryValueW},
		System::{
			Environment::ExpandEnvironmentStringsW,
			Registry::{
				RegCloseKey, RegConnectRegistryW, RegCreateKeyExW, RegCreateKeyW,
				RegDeleteKeyExW, RegDeleteKeyW, RegDeleteValueW, RegDisableReflectionKey,
				RegEnableReflectionKey, RegEnumKeyExW, RegEnumValueW, RegFlushKey, RegLoadKeyW,
				RegOpenKeyExW, RegQueryInfoKeyW, RegQueryReflectionKey, RegQueryValueExW,
				RegQueryValueW, RegSaveKeyW, RegSetValueExW, RegSetValueW, HKEY,
			},
		},
	},
};
use wslreg_proto::{
	consts::{is_predefined, ERROR_MORE_DATA, ERROR_RESOURCE_TYPE_NOT_FOUND, REG_OPTION_NON_VOLATILE},
	KeyInfo, RawHkey, RegType, ValueData, ValueEntry,
};

use crate::{error::check, Error, RegistryApi, Result};

/// Longest key name the registry allows, plus the terminator.
const MAX_KEY_NAME: usize = 257;

#[derive(Debug, Default, Clone, Copy)]
pub struct NativeApi;

impl NativeApi {
	#[must_use]
	pub const fn new() -> Self {
		Self
	}
}

/// Predefined roots travel as their 32 bit values, the API wants them sign extended.
fn hkey(raw: RawHkey) -> HKEY {
	if is_predefined(raw) {
		raw as u32 as i32 as HKEY
	} else {
		raw as HKEY
	}
}

fn wide(text: Option<&str>) -> Option<Vec<u16>> {
	text.map(|text| text.encode_utf16().chain(iter::once(0)).collect())
}

fn pcwstr(text: &Option<Vec<u16>>) -> PCWSTR {
	text.as_ref().map_or(ptr::null(), |text| text.as_ptr())
}

fn until_null(units: &[u16]) -> String {
	let end = units.iter().position(|unit| *unit == 0).unwrap_or(units.len());
	String::from_utf16_lossy(&units[..end])
}

fn last_error() -> Error {
	Error::from_code(
		io::Error::last_os_error()
			.raw_os_error()
			.unwrap_or_default() as u32,
	)
}

impl RegistryApi for NativeApi {
	fn close_key(&self, key: RawHkey) -> Result<()> {
		check(unsafe { RegCloseKey(hkey(key)) })
	}

	fn connect_registry(&self, computer_name: Option<&str>, key: RawHkey) -> Result<RawHkey> {
		let computer_name = wide(computer_name);
		let mut result: HKEY = 0;

		check(unsafe { RegConnectRegistryW(pcwstr(&computer_name), hkey(key), &mut result) })?;

		Ok(result as RawHkey)
	}

	fn create_key(&self, key: RawHkey, sub_key: Option<&str>) -> Result<RawHkey> {
		let sub_key = wide(sub_key);
		let mut result: HKEY = 0;

		check(unsafe { RegCreateKeyW(hkey(key), pcwstr(&sub_key), &mut result) })?;

		Ok(result as RawHkey)
	}

	fn create_key_ex(
		&self,
		key: RawHkey,
		sub_key: Option<&str>,
		reserved: u32,
		access: u32,
	) -> Result<RawHkey> {
		let sub_key = wide(sub_key);
		let mut result: HKEY = 0;

		check(unsafe {
			RegCreateKeyExW(
				hkey(key),
				pcwstr(&sub_key),
				reserved,
				ptr::null(),
				REG_OPTION_NON_VOLATILE,
				access,
				ptr::null(),
				&mut result,
				ptr::null_mut(),
			)
		})?;

		Ok(result as RawHkey)
	}

	fn delete_key(&self, key: RawHkey, sub_key: Option<&str>) -> Result<()> {
		let sub_key = wide(sub_key);
		check(unsafe { RegDeleteKeyW(hkey(key), pcwstr(&sub_key)) })
	}

	fn delete_key_ex(
		&self,
		key: RawHkey,
		sub_key: Option<&str>,
		access: u32,
		reserved: u32,
	) -> Result<()> {
		let sub_key = wide(sub_key);
		check(unsafe { RegDeleteKeyExW(hkey(key), pcwstr(&sub_key), access, reserved) })
	}

	fn delete_value(&self, key: RawHkey, value_name: Option<&str>) -> Result<()> {
		let value_name = wide(value_name);
		check(unsafe { RegDeleteValueW(hkey(key), pcwstr(&value_name)) })
	}

	fn enum_key(&self, key: RawHkey, index: u32) -> Result<String> {
		let mut name = vec![0u16; MAX_KEY_NAME];

		loop {
			let mut len = name.len() as u32;
			let status = unsafe {
				RegEnumKeyExW(
					hkey(key),
					index,
					name.as_mut_ptr(),
					&mut len,
					ptr::null(),
					ptr::null_mut(),
					ptr::null_mut(),
					ptr::null_mut(),
				)
			};

			if status == ERROR_MORE_DATA {
				name.resize(name.len() * 2, 0);
				continue;
			}
			check(status)?;

			return Ok(String::from_utf16_lossy(&name[..len as usize]));
		}
	}

	fn enum_value(&self, key: RawHkey, index: u32) -> Result<ValueEntry> {
		let (mut max_name, mut max_data) = (0u32, 0u32);
		check(unsafe {
			RegQueryInfoKeyW(
				hkey(key),
				ptr::null_mut(),
				ptr::null_mut(),
				ptr::null(),
				ptr::null_mut(),
				ptr::null_mut(),
				ptr::null_mut(),
				ptr::null_mut(),
				&mut max_name,
				&mut max_data,
				ptr::null_mut(),
				ptr::null_mut(),
			)
		})?;

		let mut name = vec![0u16; max_name as usize + 1];
		let mut data = vec![0u8; (max_data as usize).max(1)];

		loop {
			let mut name_len = name.len() as u32;
			let mut data_len = data.len() as u32;
			let mut typ = 0u32;

			let status = unsafe {
				RegEnumValueW(
					hkey(key),
					index,
					name.as_mut_ptr(),
					&mut name_len,
					ptr::null(),
					&mut typ,
					data.as_mut_ptr(),
					&mut data_len,
				)
			};

			// Values can change between the size query and the read.
			if status == ERROR_MORE_DATA {
				name.resize(name.len() * 2, 0);
				let grown = (data.len() * 2).max(data_len as usize);
				data.resize(grown, 0);
				continue;
			}
			check(status)?;

			data.truncate(data_len as usize);
			return Ok(ValueEntry {
				name: String::from_utf16_lossy(&name[..name_len as usize]),
				data,
				typ: RegType(typ),
			});
		}
	}

	fn expand_environment_strings(&self, input: Option<&str>) -> Result<String> {
		let input = wide(Some(input.unwrap_or_default()));
		let mut expanded = vec![0u16; 256];

		loop {
			let needed = unsafe {
				ExpandEnvironmentStringsW(
					pcwstr(&input),
					expanded.as_mut_ptr(),
					expanded.len() as u32,
				)
			};

			match needed as usize {
				0 => return Err(last_error()),
				needed if needed > expanded.len() => expanded.resize(needed, 0),
				_ => return Ok(until_null(&expanded)),
			}
		}
	}

	fn flush_key(&self, key: RawHkey) -> Result<()> {
		check(unsafe { RegFlushKey(hkey(key)) })
	}

	fn load_key(
		&self,
		key: RawHkey,
		sub_key: Option<&str>,
		file_name: Option<&str>,
	) -> Result<()> {
		let sub_key = wide(sub_key);
		let file_name = wide(file_name);

		check(unsafe { RegLoadKeyW(hkey(key), pcwstr(&sub_key), pcwstr(&file_name)) })
	}

	fn open_key_ex(
		&self,
		key: RawHkey,
		sub_key: Option<&str>,
		reserved: u32,
		access: u32,
	) -> Result<RawHkey> {
		let sub_key = wide(sub_key);
		let mut result: HKEY = 0;

		check(unsafe {
			RegOpenKeyExW(hkey(key), pcwstr(&sub_key), reserved, access, &mut result)
		})?;

		Ok(result as RawHkey)
	}

	fn query_info_key(&self, key: RawHkey) -> Result<KeyInfo> {
		let (mut sub_keys, mut values) = (0u32, 0u32);
		let mut last_write = FILETIME {
			dwLowDateTime: 0,
			dwHighDateTime: 0,
		};

		check(unsafe {
			RegQueryInfoKeyW(
				hkey(key),
				ptr::null_mut(),
				ptr::null_mut(),
				ptr::null(),
				&mut sub_keys,
				ptr::null_mut(),
				ptr::null_mut(),
				&mut values,
				ptr::null_mut(),
				ptr::null_mut(),
				ptr::null_mut(),
				&mut last_write,
			)
		})?;

		Ok(KeyInfo {
			sub_keys,
			values,
			last_modified: (u64::from(last_write.dwHighDateTime) << 32)
				| u64::from(last_write.dwLowDateTime),
		})
	}

	fn query_value(&self, key: RawHkey, sub_key: Option<&str>) -> Result<String> {
		let sub_key = wide(sub_key);
		let mut size = 0i32;

		let status =
			unsafe { RegQueryValueW(hkey(key), pcwstr(&sub_key), ptr::null_mut(), &mut size) };
		if status != ERROR_MORE_DATA {
			check(status)?;
		}

		let mut text = vec![0u16; size.max(2) as usize / 2 + 1];
		loop {
			let mut size = (text.len() * 2) as i32;
			let status =
				unsafe { RegQueryValueW(hkey(key), pcwstr(&sub_key), text.as_mut_ptr(), &mut size) };

			if status == ERROR_MORE_DATA {
				text.resize(text.len() * 2, 0);
				continue;
			}
			check(status)?;

			return Ok(until_null(&text[..(size as usize / 2).min(text.len())]));
		}
	}

	fn query_value_ex(&self, key: RawHkey, value_name: Option<&str>) -> Result<ValueData> {
		let value_name = wide(Some(value_name.unwrap_or_default()));
		let mut size = 0u32;

		let status = unsafe {
			RegQueryValueExW(
				hkey(key),
				pcwstr(&value_name),
				ptr::null(),
				ptr::null_mut(),
				ptr::null_mut(),
				&mut size,
			)
		};
		if status != ERROR_MORE_DATA {
			check(status)?;
		}

		let mut data = vec![0u8; (size as usize).max(1)];
		loop {
			let mut len = data.len() as u32;
			let mut typ = 0u32;

			let status = unsafe {
				RegQueryValueExW(
					hkey(key),
					pcwstr(&value_name),
					ptr::null(),
					&mut typ,
					data.as_mut_ptr(),
					&mut len,
				)
			};

			if status == ERROR_MORE_DATA {
				let grown = (data.len() * 2).max(len as usize);
				data.resize(grown, 0);
				continue;
			}
			check(status)?;

			data.truncate(len as usize);
			return Ok(ValueData {
				data,
				typ: RegType(typ),
			});
		}
	}

	fn save_key(&self, key: RawHkey, file_name: Option<&str>) -> Result<()> {
		let file_name = wide(file_name);
		check(unsafe { RegSaveKeyW(hkey(key), pcwstr(&file_name), ptr::null()) })
	}

	fn set_value(&self, key: RawHkey, sub_key: Option<&str>, value: Option<&str>) -> Result<()> {
		let sub_key = wide(sub_key);
		let value = wide(Some(value.unwrap_or_default())).unwrap_or_default();

		check(unsafe {
			RegSetValueW(
				hkey(key),
				pcwstr(&sub_key),
				RegType::SZ.0,
				value.as_ptr(),
				((value.len() - 1) * 2) as u32,
			)
		})
	}

	fn set_value_ex(
		&self,
		key: RawHkey,
		value_name: Option<&str>,
		typ: RegType,
		data: &[u8],
	) -> Result<()> {
		let value_name = wide(value_name);

		check(unsafe {
			RegSetValueExW(
				hkey(key),
				pcwstr(&value_name),
				0,
				typ.0,
				data.as_ptr(),
				data.len() as u32,
			)
		})
	}

	fn disable_reflection_key(&self, key: RawHkey) -> Result<()> {
		check(unsafe { RegDisableReflectionKey(hkey(key)) })
	}

	fn enable_reflection_key(&self, key: RawHkey) -> Result<()> {
		check(unsafe { RegEnableReflectionKey(hkey(key)) })
	}

	fn query_reflection_key(&self, key: RawHkey) -> Result<bool> {
		let mut disabled: BOOL = 0;
		check(unsafe { RegQueryReflectionKey(hkey(key), &mut disabled) })?;

		Ok(disabled != 0)
	}

	fn get_file_info(&self, path_name: Option<&str>, string_name: Option<&str>) -> Result<String> {
		let path = wide(Some(path_name.unwrap_or_default()));

		let mut ignored = 0u32;
		let size = unsafe { GetFileVersionInfoSizeW(pcwstr(&path), &mut ignored) };
		if size == 0 {
			return Err(last_error().with_path(path_name));
		}

		let mut block = vec![0u8; size as usize];
		if unsafe { GetFileVersionInfoW(pcwstr(&path), 0, size, block.as_mut_ptr().cast()) } == 0 {
			return Err(last_error().with_path(path_name));
		}

		// US English, Unicode, for files without a translation table.
		let (language, code_page) = query_version_value(&block, r"\VarFileInfo\Translation")
			.filter(|(_, len)| *len >= 4)
			.map_or((0x0409, 0x04B0), |(value, _)| {
				// SAFETY: the translation table holds at least one pair of u16s, checked above.
				unsafe {
					let pair = value.cast::<u16>();
					(pair.read_unaligned(), pair.add(1).read_unaligned())
				}
			});

		let query = format!(
			r"\StringFileInfo\{language:04x}{code_page:04x}\{}",
			string_name.unwrap_or_default()
		);

		let (value, len) = query_version_value(&block, &query)
			.ok_or_else(|| Error::from_code(ERROR_RESOURCE_TYPE_NOT_FOUND).with_path(string_name))?;

		// SAFETY: string values point into `block` and are `len` wide characters long.
		let units = unsafe { std::slice::from_raw_parts(value.cast::<u16>(), len as usize) };

		Ok(until_null(units))
	}
}

/// Looks `sub_block` up in a version resource, returning a pointer into `block` and the length.
fn query_version_value(block: &[u8], sub_block: &str) -> Option<(*const c_void, u32)> {
	let sub_block = wide(Some(sub_block));
	let mut value: *mut c_void = ptr::null_mut();
	let mut len = 0u32;

	let found =
		unsafe { VerQueryValueW(block.as_ptr().cast(), pcwstr(&sub_block), &mut value, &mut len) };

	(found != 0 && !value.is_null()).then_some((value.cast_const(), len))
}
