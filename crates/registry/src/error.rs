use wslreg_proto::{
	consts::{
		ERROR_CALL_NOT_IMPLEMENTED, ERROR_FILE_NOT_FOUND, ERROR_INVALID_PARAMETER,
		ERROR_NO_MORE_ITEMS, ERROR_SUCCESS,
	},
	ValueError,
};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
	/// The key or value doesn't exist, or an enumeration ran past its last entry.
	#[error("{message}{}", path_suffix(.path))]
	NotFound {
		code: u32,
		message: String,
		path: Option<String>,
	},
	#[error("[Error {code}] {message}{}", path_suffix(.path))]
	Native {
		code: u32,
		errno: i32,
		message: String,
		path: Option<String>,
	},
	#[error("invalid argument: {0}")]
	Validation(String),
	#[error("invalid registry value: {0}")]
	Value(#[from] ValueError),
	#[error("registry bridge connection broken: {0}")]
	ConnectionBroken(#[from] wslreg_proto::Error),
	#[error("failed to start the registry bridge: {0}")]
	Startup(String),
	#[error(
		"registry access is only supported on Windows or under the Windows Subsystem for Linux"
	)]
	NotImplemented,
}

fn path_suffix(path: &Option<String>) -> String {
	path.as_ref()
		.map(|path| format!(": '{path}'"))
		.unwrap_or_default()
}

impl Error {
	/// Classifies a non-zero native status along with its message.
	#[must_use]
	pub fn from_status(code: u32, message: impl Into<String>) -> Self {
		let message = message.into();
		if code == ERROR_FILE_NOT_FOUND || code == ERROR_NO_MORE_ITEMS {
			Self::NotFound {
				code,
				message,
				path: None,
			}
		} else {
			Self::Native {
				code,
				errno: errno_for(code),
				message,
				path: None,
			}
		}
	}

	/// Same as [`Error::from_status`], looking the message up by code.
	#[must_use]
	pub fn from_code(code: u32) -> Self {
		Self::from_status(code, message_for(code))
	}

	/// Attaches the key, value or file name the failed call was about.
	#[must_use]
	pub fn with_path(mut self, name: Option<&str>) -> Self {
		if let (Self::NotFound { path, .. } | Self::Native { path, .. }, Some(name)) =
			(&mut self, name)
		{
			path.get_or_insert_with(|| name.to_owned());
		}
		self
	}

	#[must_use]
	pub const fn is_not_found(&self) -> bool {
		matches!(self, Self::NotFound { .. })
	}

	/// Native status code this error stands for. Failures of the bridge itself have none.
	#[must_use]
	pub const fn status(&self) -> Option<u32> {
		match self {
			Self::NotFound { code, .. } | Self::Native { code, .. } => Some(*code),
			Self::Validation(_) | Self::Value(_) => Some(ERROR_INVALID_PARAMETER),
			Self::NotImplemented => Some(ERROR_CALL_NOT_IMPLEMENTED),
			Self::ConnectionBroken(_) | Self::Startup(_) => None,
		}
	}

	/// Posix errno equivalent of the native status, when there is one.
	#[must_use]
	pub const fn errno(&self) -> Option<i32> {
		match self {
			Self::NotFound { code, .. } => Some(errno_for(*code)),
			Self::Native { errno, .. } => Some(*errno),
			_ => None,
		}
	}

	/// The message sent back to the client when a request fails, without the path.
	#[must_use]
	pub fn wire_message(&self) -> String {
		match self {
			Self::NotFound { message, .. } | Self::Native { message, .. } => message.clone(),
			other => other.to_string(),
		}
	}
}

/// Turns a native status into a result.
pub(crate) fn check(code: u32) -> Result<()> {
	if code == ERROR_SUCCESS {
		Ok(())
	} else {
		Err(Error::from_code(code))
	}
}

// errno values as defined by the Windows C runtime
const ENOENT: i32 = 2;
const E2BIG: i32 = 7;
const ENOEXEC: i32 = 8;
const EBADF: i32 = 9;
const ECHILD: i32 = 10;
const EAGAIN: i32 = 11;
const ENOMEM: i32 = 12;
const EACCES: i32 = 13;
const EEXIST: i32 = 17;
const EXDEV: i32 = 18;
const EINVAL: i32 = 22;
const EMFILE: i32 = 24;
const ENOSPC: i32 = 28;
const EPIPE: i32 = 32;
const ENOTEMPTY: i32 = 41;

/// Maps a native status code to its errno equivalent, `EINVAL` when there is none.
#[must_use]
pub const fn errno_for(code: u32) -> i32 {
	match code {
		2 | 3 | 15 | 18 | 53 | 67 | 161 | 206 => ENOENT,
		4 => EMFILE,
		5 | 16 | 19..=36 | 65 | 82 | 83 | 108 | 132 | 158 | 167 => EACCES,
		6 | 114 | 130 => EBADF,
		7..=9 | 1816 => ENOMEM,
		10 => E2BIG,
		11 | 188..=202 => ENOEXEC,
		17 => EXDEV,
		80 | 183 => EEXIST,
		89 | 164 | 215 => EAGAIN,
		109 => EPIPE,
		112 => ENOSPC,
		128 | 129 => ECHILD,
		145 => ENOTEMPTY,
		_ => EINVAL,
	}
}

/// Human readable text for a native status code.
#[must_use]
pub fn message_for(code: u32) -> String {
	system_message(code)
		.map(|message| {
			message
				.trim_end_matches(|c: char| c <= ' ' || c == '.')
				.to_owned()
		})
		.filter(|message| !message.is_empty())
		.unwrap_or_else(|| format!("Windows Error 0x{code:x}"))
}

#[cfg(windows)]
fn system_message(code: u32) -> Option<String> {
	use windows_sys::Win32::System::Diagnostics::Debug::{
		FormatMessageW, FORMAT_MESSAGE_FROM_SYSTEM, FORMAT_MESSAGE_IGNORE_INSERTS,
	};

	let mut buf = [0u16; 1024];
	// SAFETY: the buffer outlives the call and its length is passed along.
	let len = unsafe {
		FormatMessageW(
			FORMAT_MESSAGE_FROM_SYSTEM | FORMAT_MESSAGE_IGNORE_INSERTS,
			std::ptr::null(),
			code,
			0,
			buf.as_mut_ptr(),
			buf.len() as u32,
			std::ptr::null(),
		)
	};

	(len != 0).then(|| String::from_utf16_lossy(&buf[..len as usize]))
}

/// Off Windows there is no system message table, so we carry the texts the bridge itself produces.
#[cfg(not(windows))]
fn system_message(code: u32) -> Option<String> {
	let message = match code {
		2 => "The system cannot find the file specified.",
		5 => "Access is denied.",
		6 => "The handle is invalid.",
		53 => "The network path was not found.",
		87 => "The parameter is incorrect.",
		120 => "This function is not supported on this system.",
		183 => "Cannot create a file when that file already exists.",
		234 => "More data is available.",
		259 => "No more data is available.",
		1018 => "Illegal operation attempted on a registry key that has been marked for deletion.",
		1813 => "The specified resource type cannot be found in the image file.",
		_ => return None,
	};

	Some(message.to_owned())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn not_found_is_classified_separately() {
		assert!(Error::from_code(ERROR_FILE_NOT_FOUND).is_not_found());
		assert!(Error::from_code(ERROR_NO_MORE_ITEMS).is_not_found());
		assert!(!Error::from_code(5).is_not_found());
	}

	#[test]
	fn native_errors_carry_errno() {
		match Error::from_status(5, "Access is denied") {
			Error::Native {
				code,
				errno,
				message,
				path,
			} => {
				assert_eq!(code, 5);
				assert_eq!(errno, EACCES);
				assert_eq!(message, "Access is denied");
				assert_eq!(path, None);
			}
			other => panic!("unexpected error: {other:?}"),
		}
	}

	#[test]
	fn errno_table() {
		assert_eq!(errno_for(2), ENOENT);
		assert_eq!(errno_for(6), EBADF);
		assert_eq!(errno_for(25), EACCES);
		assert_eq!(errno_for(145), ENOTEMPTY);
		assert_eq!(errno_for(190), ENOEXEC);
		assert_eq!(errno_for(1816), ENOMEM);
		assert_eq!(errno_for(87), EINVAL);
		assert_eq!(errno_for(0xDEAD), EINVAL);
	}

	#[test]
	fn display_follows_the_native_layout() {
		let err = Error::from_status(5, "Access is denied").with_path(Some("Software"));
		assert_eq!(err.to_string(), "[Error 5] Access is denied: 'Software'");
		assert_eq!(err.wire_message(), "Access is denied");

		let err = Error::from_status(2, "The system cannot find the file specified");
		assert_eq!(err.to_string(), "The system cannot find the file specified");
	}

	#[test]
	fn path_is_only_attached_once() {
		let err = Error::from_code(2)
			.with_path(Some("first"))
			.with_path(Some("second"));

		assert!(err.to_string().ends_with(": 'first'"));
	}

	#[test]
	fn message_lookup_is_trimmed() {
		let message = message_for(ERROR_FILE_NOT_FOUND);
		assert!(!message.is_empty());
		assert!(!message.ends_with('.'));
		assert!(!message.ends_with(char::is_whitespace));
	}

	#[test]
	fn unknown_codes_fall_back_to_hex() {
		assert_eq!(message_for(0x2000_0000), "Windows Error 0x20000000");
	}

	#[test]
	fn statuses_for_bridge_side_failures() {
		assert_eq!(
			Error::Validation("x".to_owned()).status(),
			Some(ERROR_INVALID_PARAMETER)
		);
		assert_eq!(
			Error::NotImplemented.status(),
			Some(ERROR_CALL_NOT_IMPLEMENTED)
		);
		assert_eq!(Error::from_code(1018).status(), Some(1018));
	}

	#[test]
	fn transport_failures_have_no_status() {
		let broken = Error::ConnectionBroken(wslreg_proto::Error::Closed);
		assert_eq!(broken.status(), None);
		assert_eq!(broken.errno(), None);

		assert_eq!(Error::Startup("no backend".to_owned()).status(), None);
	}
}
