use std::{fs, sync::Arc};

use crate::{BridgeApi, BridgeConfig, NullApi, RegistryApi, Result};

const OS_RELEASE: &str = "/proc/sys/kernel/osrelease";

/// Where we are running, as far as registry access is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
	/// Windows itself: the registry API is called directly.
	Windows,
	/// Linux under the Windows Subsystem for Linux: calls go through the bridge backend.
	Wsl,
	/// Anything else. Registry calls fail with [`Error::NotImplemented`](crate::Error::NotImplemented).
	Unsupported,
}

impl Environment {
	#[must_use]
	pub fn detect() -> Self {
		if cfg!(windows) {
			Self::Windows
		} else if cfg!(target_os = "linux")
			&& fs::read_to_string(OS_RELEASE).is_ok_and(|release| is_wsl_release(&release))
		{
			Self::Wsl
		} else {
			Self::Unsupported
		}
	}

	/// Builds the [`RegistryApi`] this environment calls for, starting the bridge backend under WSL.
	pub fn connect(self, config: &BridgeConfig) -> Result<Arc<dyn RegistryApi>> {
		match self {
			Self::Windows => native(),
			Self::Wsl => Ok(Arc::new(BridgeApi::spawn(config)?)),
			Self::Unsupported => Ok(Arc::new(NullApi)),
		}
	}
}

/// WSL kernels carry "microsoft" in their release string, in either case depending on version.
#[must_use]
pub fn is_wsl_release(release: &str) -> bool {
	release.to_ascii_lowercase().contains("microsoft")
}

#[cfg(windows)]
fn native() -> Result<Arc<dyn RegistryApi>> {
	Ok(Arc::new(crate::NativeApi))
}

#[cfg(not(windows))]
fn native() -> Result<Arc<dyn RegistryApi>> {
	Err(crate::Error::NotImplemented)
}
