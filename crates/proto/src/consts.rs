//! Registry constants, with the same numeric values as the Windows headers.

/// Opaque handle id as it travels between the client and the backend.
///
/// Zero means "no handle". The predefined root keys below are only meaningful to the backend, which
/// turns them back into the sign-extended pointers the native API expects.
pub type RawHkey = u64;

// Predefined root keys
pub const HKEY_CLASSES_ROOT: RawHkey = 0x8000_0000;
pub const HKEY_CURRENT_USER: RawHkey = 0x8000_0001;
pub const HKEY_LOCAL_MACHINE: RawHkey = 0x8000_0002;
pub const HKEY_USERS: RawHkey = 0x8000_0003;
pub const HKEY_PERFORMANCE_DATA: RawHkey = 0x8000_0004;
pub const HKEY_CURRENT_CONFIG: RawHkey = 0x8000_0005;
pub const HKEY_DYN_DATA: RawHkey = 0x8000_0006;

/// Whether `raw` names one of the predefined root keys rather than an opened key.
#[must_use]
pub const fn is_predefined(raw: RawHkey) -> bool {
	raw >= HKEY_CLASSES_ROOT && raw <= HKEY_DYN_DATA
}

// Access rights
pub const KEY_QUERY_VALUE: u32 = 0x0001;
pub const KEY_SET_VALUE: u32 = 0x0002;
pub const KEY_CREATE_SUB_KEY: u32 = 0x0004;
pub const KEY_ENUMERATE_SUB_KEYS: u32 = 0x0008;
pub const KEY_NOTIFY: u32 = 0x0010;
pub const KEY_CREATE_LINK: u32 = 0x0020;
pub const KEY_WOW64_64KEY: u32 = 0x0100;
pub const KEY_WOW64_32KEY: u32 = 0x0200;
pub const KEY_WOW64_RES: u32 = 0x0300;
pub const KEY_WRITE: u32 = 0x0002_0006;
pub const KEY_READ: u32 = 0x0002_0019;
pub const KEY_EXECUTE: u32 = KEY_READ;
pub const KEY_ALL_ACCESS: u32 = 0x000F_003F;

// Key creation options
pub const REG_OPTION_RESERVED: u32 = 0x0000;
pub const REG_OPTION_NON_VOLATILE: u32 = 0x0000;
pub const REG_OPTION_VOLATILE: u32 = 0x0001;
pub const REG_OPTION_CREATE_LINK: u32 = 0x0002;
pub const REG_OPTION_BACKUP_RESTORE: u32 = 0x0004;
pub const REG_OPTION_OPEN_LINK: u32 = 0x0008;
pub const REG_LEGAL_OPTION: u32 = REG_OPTION_RESERVED
	| REG_OPTION_NON_VOLATILE
	| REG_OPTION_VOLATILE
	| REG_OPTION_CREATE_LINK
	| REG_OPTION_BACKUP_RESTORE
	| REG_OPTION_OPEN_LINK;

// Key creation dispositions
pub const REG_CREATED_NEW_KEY: u32 = 0x0001;
pub const REG_OPENED_EXISTING_KEY: u32 = 0x0002;

// Hive load/restore flags
pub const REG_WHOLE_HIVE_VOLATILE: u32 = 0x0001;
pub const REG_REFRESH_HIVE: u32 = 0x0002;
pub const REG_NO_LAZY_FLUSH: u32 = 0x0004;

// Change notification filters
pub const REG_NOTIFY_CHANGE_NAME: u32 = 0x0001;
pub const REG_NOTIFY_CHANGE_ATTRIBUTES: u32 = 0x0002;
pub const REG_NOTIFY_CHANGE_LAST_SET: u32 = 0x0004;
pub const REG_NOTIFY_CHANGE_SECURITY: u32 = 0x0008;
pub const REG_LEGAL_CHANGE_FILTER: u32 = REG_NOTIFY_CHANGE_NAME
	| REG_NOTIFY_CHANGE_ATTRIBUTES
	| REG_NOTIFY_CHANGE_LAST_SET
	| REG_NOTIFY_CHANGE_SECURITY;

// Native status codes the bridge cares about
pub const ERROR_SUCCESS: u32 = 0;
pub const ERROR_FILE_NOT_FOUND: u32 = 2;
pub const ERROR_ACCESS_DENIED: u32 = 5;
pub const ERROR_INVALID_HANDLE: u32 = 6;
pub const ERROR_BAD_NETPATH: u32 = 53;
pub const ERROR_INVALID_PARAMETER: u32 = 87;
pub const ERROR_CALL_NOT_IMPLEMENTED: u32 = 120;
pub const ERROR_ALREADY_EXISTS: u32 = 183;
pub const ERROR_MORE_DATA: u32 = 234;
pub const ERROR_NO_MORE_ITEMS: u32 = 259;
pub const ERROR_KEY_DELETED: u32 = 1018;
pub const ERROR_RESOURCE_TYPE_NOT_FOUND: u32 = 1813;
