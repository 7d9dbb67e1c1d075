//!
//! # wslreg
//!
//! Windows registry access that works the same on Windows and under the Windows Subsystem for
//! Linux.
//!
//! On Windows the registry API is called directly. Under WSL a small backend executable is started
//! on the Windows side and the calls travel to it over a loopback TCP connection (see [`bridge`]).
//! Anywhere else every call fails with [`Error::NotImplemented`].
//!
//! ## Basic example
//!
//! ```no_run
//! use wslreg::{RegKey, Registry, Value, HKEY_CURRENT_USER, KEY_ALL_ACCESS};
//!
//! # fn main() -> wslreg::Result<()> {
//! let registry = Registry::from_environment()?;
//!
//! let key = registry.create_key_ex(HKEY_CURRENT_USER, r"Software\Example", 0, KEY_ALL_ACCESS)?;
//! registry.set_value_ex(&key, Some("Answer"), 0, Value::Dword(42).reg_type(), &Value::Dword(42))?;
//!
//! let (value, _typ) = registry.query_value_ex(&key, Some("Answer"))?;
//! assert_eq!(value, Value::Dword(42));
//!
//! let software = RegKey::current_user(&registry)?.subkey("Software")?;
//! for name in &software {
//! 	println!("{}", name?);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

mod api;
pub mod bridge;
mod config;
mod env;
mod error;
mod handle;
mod key;
#[cfg(windows)]
mod native;
mod null;
mod registry;

pub use api::RegistryApi;
pub use bridge::BridgeApi;
pub use config::{
	BridgeConfig, BACKEND_ENV, CALL_TIMEOUT_ENV, CONNECT_TIMEOUT_ENV, EXIT_TIMEOUT_ENV,
	STARTUP_TIMEOUT_ENV,
};
pub use env::{is_wsl_release, Environment};
pub use error::{errno_for, message_for, Error, Result};
pub use handle::{AsRawHkey, Hkey};
pub use key::RegKey;
#[cfg(windows)]
pub use native::NativeApi;
pub use null::NullApi;
pub use registry::{Enumerate, Keys, Registry, Values};

pub use wslreg_proto as proto;
pub use wslreg_proto::{consts::*, KeyInfo, RegType, Value, ValueError};
