use std::{
	env, fs,
	path::{Path, PathBuf},
	time::Duration,
};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{Error, Result};

/// Overrides the path of the backend executable.
pub const BACKEND_ENV: &str = "WSLREG_BACKEND";
pub const STARTUP_TIMEOUT_ENV: &str = "WSLREG_STARTUP_TIMEOUT_MS";
pub const CALL_TIMEOUT_ENV: &str = "WSLREG_CALL_TIMEOUT_MS";
pub const CONNECT_TIMEOUT_ENV: &str = "WSLREG_CONNECT_TIMEOUT_MS";
pub const EXIT_TIMEOUT_ENV: &str = "WSLREG_EXIT_TIMEOUT_MS";

/// How the bridge client finds, starts and talks to its backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
	pub backend_path: PathBuf,
	/// How long the backend gets to connect back and greet us.
	pub startup_timeout_ms: u64,
	/// Read timeout for a single reply.
	pub call_timeout_ms: u64,
	/// Reply timeout for `ConnectRegistry`, which may reach out over the network.
	pub connect_registry_timeout_ms: u64,
	/// How long a dropped bridge waits for the backend to exit before killing it.
	pub exit_timeout_ms: u64,
}

impl Default for BridgeConfig {
	fn default() -> Self {
		Self {
			backend_path: default_backend_path(),
			startup_timeout_ms: 10_000,
			call_timeout_ms: 5_000,
			connect_registry_timeout_ms: 20_000,
			exit_timeout_ms: 2_000,
		}
	}
}

impl BridgeConfig {
	/// Reads a JSON config file, missing fields taking their defaults.
	pub fn load(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();
		let contents = fs::read_to_string(path).map_err(|e| {
			Error::Startup(format!(
				"failed to read bridge config <path='{}'>: {e}",
				path.display()
			))
		})?;

		serde_json::from_str(&contents).map_err(|e| {
			Error::Startup(format!(
				"failed to parse bridge config <path='{}'>: {e}",
				path.display()
			))
		})
	}

	/// Defaults, with any `WSLREG_*` environment overrides applied.
	#[must_use]
	pub fn from_env() -> Self {
		Self::default().with_env_overrides()
	}

	#[must_use]
	pub fn with_env_overrides(mut self) -> Self {
		if let Some(path) = env::var_os(BACKEND_ENV) {
			self.backend_path = path.into();
		}

		for (var, field) in [
			(STARTUP_TIMEOUT_ENV, &mut self.startup_timeout_ms),
			(CALL_TIMEOUT_ENV, &mut self.call_timeout_ms),
			(CONNECT_TIMEOUT_ENV, &mut self.connect_registry_timeout_ms),
			(EXIT_TIMEOUT_ENV, &mut self.exit_timeout_ms),
		] {
			let Ok(value) = env::var(var) else {
				continue;
			};

			match value.parse() {
				Ok(ms) => *field = ms,
				Err(e) => warn!(%var, %value, ?e, "Ignoring invalid timeout override;"),
			}
		}

		self
	}

	#[must_use]
	pub const fn startup_timeout(&self) -> Duration {
		Duration::from_millis(self.startup_timeout_ms)
	}

	#[must_use]
	pub const fn call_timeout(&self) -> Duration {
		Duration::from_millis(self.call_timeout_ms)
	}

	#[must_use]
	pub const fn connect_registry_timeout(&self) -> Duration {
		Duration::from_millis(self.connect_registry_timeout_ms)
	}

	#[must_use]
	pub const fn exit_timeout(&self) -> Duration {
		Duration::from_millis(self.exit_timeout_ms)
	}
}

/// Windows' name for the architecture we were built for.
const fn arch_suffix() -> &'static str {
	if cfg!(target_arch = "aarch64") {
		"arm64"
	} else if cfg!(target_arch = "x86") {
		"x86"
	} else {
		"x64"
	}
}

/// `backend-<arch>.exe`, next to the running executable.
fn default_backend_path() -> PathBuf {
	let name = format!("backend-{}.exe", arch_suffix());

	env::current_exe()
		.ok()
		.and_then(|exe| exe.parent().map(|dir| dir.join(&name)))
		.unwrap_or_else(|| PathBuf::from(name))
}
