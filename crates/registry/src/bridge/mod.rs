//! Registry access from WSL, through a backend process running on the Windows side.
//!
//! The client listens on an ephemeral loopback port and starts the backend executable with that
//! port; the backend connects back, sends the protocol banner and then serves requests until it
//! receives [`Opcode::Abort`](wslreg_proto::Opcode::Abort) or the stream closes.

use std::{
	net::{Ipv4Addr, TcpListener},
	process::{Child, Command, Stdio},
	sync::{Mutex, PoisonError},
	thread,
	time::{Duration, Instant},
};

use tracing::{debug, info, warn};
use wslreg_proto::{
	ops::{
		CloseKey, Connect, ConnectRegistry, CreateKey, CreateKeyEx, DeleteKey, DeleteKeyEx,
		DeleteValue, DisableReflectionKey, EnableReflectionKey, EnumKey, EnumValue,
		ExpandEnvironmentStrings, FlushKey, GetFileInfo, LoadKey, OpenKeyEx, QueryInfoKey,
		QueryReflectionKey, QueryValue, QueryValueEx, SaveKey, SetValue, SetValueEx,
	},
	KeyInfo, Operation, RawHkey, RegType, ValueData, ValueEntry,
};

use crate::{BridgeConfig, Error, RegistryApi, Result};

mod server;
mod session;

pub use server::{connect_and_serve, serve};
pub use session::Session;

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// [`RegistryApi`] over a bridge session.
///
/// Calls from several threads are serialized, one request in flight at a time. Dropping the
/// bridge asks the backend to exit, closes the stream and reaps it, killing a backend that
/// outstays the exit timeout.
#[derive(Debug)]
pub struct BridgeApi {
	session: Mutex<Session>,
	backend: Option<Child>,
	connect_registry_timeout: Duration,
	exit_timeout: Duration,
}

impl BridgeApi {
	/// Starts the backend executable named by `config` and waits for it to connect back.
	pub fn spawn(config: &BridgeConfig) -> Result<Self> {
		let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
			.and_then(|listener| listener.local_addr().map(|addr| (listener, addr.port())));
		let (listener, port) = listener
			.map_err(|e| Error::Startup(format!("failed to listen for the bridge backend: {e}")))?;

		let mut command = Command::new(&config.backend_path);
		command
			.arg("-p")
			.arg(port.to_string())
			.stdin(Stdio::null())
			.stdout(Stdio::null())
			.stderr(Stdio::null());
		if let Some(dir) = config.backend_path.parent().filter(|dir| dir.is_dir()) {
			command.current_dir(dir);
		}

		let mut backend = command.spawn().map_err(|e| {
			Error::Startup(format!(
				"failed to start the bridge backend <path='{}'>: {e}",
				config.backend_path.display()
			))
		})?;
		info!(
			pid = backend.id(),
			port,
			path = %config.backend_path.display(),
			"Started registry bridge backend;"
		);

		match Session::accept(&listener, config.startup_timeout(), config.call_timeout()) {
			Ok(session) => {
				let mut bridge = Self::from_session(session, config);
				bridge.backend = Some(backend);
				Ok(bridge)
			}
			Err(e) => {
				if let Err(e) = backend.kill().and_then(|()| backend.wait()) {
					warn!(?e, "Failed to stop the bridge backend after a failed startup;");
				}
				Err(e)
			}
		}
	}

	/// Wraps an established session whose backend process, if any, is managed elsewhere.
	#[must_use]
	pub fn from_session(session: Session, config: &BridgeConfig) -> Self {
		Self {
			session: Mutex::new(session),
			backend: None,
			connect_registry_timeout: config.connect_registry_timeout(),
			exit_timeout: config.exit_timeout(),
		}
	}

	fn call<O: Operation>(&self, op: &O) -> Result<O::Reply> {
		self.session
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.call(op)
	}

	/// Round trip with no side effects, answered by any live backend.
	pub fn ping(&self) -> Result<()> {
		self.call(&Connect {})
	}
}

impl Drop for BridgeApi {
	fn drop(&mut self) {
		let session = self
			.session
			.get_mut()
			.unwrap_or_else(PoisonError::into_inner);
		if let Err(e) = session.abort() {
			debug!(?e, "Failed to send abort to the bridge backend;");
		}
		session.shutdown();

		if let Some(backend) = self.backend.take() {
			reap(backend, self.exit_timeout);
		}
	}
}

/// Waits up to `timeout` for the backend to exit, then kills it.
fn reap(mut backend: Child, timeout: Duration) {
	let deadline = Instant::now() + timeout;

	loop {
		match backend.try_wait() {
			Ok(Some(status)) => {
				debug!(%status, "Registry bridge backend exited;");
				return;
			}
			Ok(None) if Instant::now() < deadline => thread::sleep(EXIT_POLL_INTERVAL),
			Ok(None) => break,
			Err(e) => {
				warn!(?e, "Failed to reap the registry bridge backend;");
				break;
			}
		}
	}

	warn!(
		pid = backend.id(),
		?timeout,
		"Registry bridge backend did not exit, killing it;"
	);
	if let Err(e) = backend.kill().and_then(|()| backend.wait()) {
		warn!(?e, "Failed to kill the registry bridge backend;");
	}
}

fn owned(text: Option<&str>) -> Option<String> {
	text.map(ToOwned::to_owned)
}

impl RegistryApi for BridgeApi {
	fn close_key(&self, key: RawHkey) -> Result<()> {
		self.call(&CloseKey { key })
	}

	fn connect_registry(&self, computer_name: Option<&str>, key: RawHkey) -> Result<RawHkey> {
		let op = ConnectRegistry {
			key,
			computer_name: owned(computer_name),
		};

		self.session
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.call_with_timeout(&op, self.connect_registry_timeout)
	}

	fn create_key(&self, key: RawHkey, sub_key: Option<&str>) -> Result<RawHkey> {
		self.call(&CreateKey {
			key,
			sub_key: owned(sub_key),
		})
	}

	fn create_key_ex(
		&self,
		key: RawHkey,
		sub_key: Option<&str>,
		reserved: u32,
		access: u32,
	) -> Result<RawHkey> {
		self.call(&CreateKeyEx {
			key,
			reserved,
			access,
			sub_key: owned(sub_key),
		})
	}

	fn delete_key(&self, key: RawHkey, sub_key: Option<&str>) -> Result<()> {
		self.call(&DeleteKey {
			key,
			sub_key: owned(sub_key),
		})
	}

	fn delete_key_ex(
		&self,
		key: RawHkey,
		sub_key: Option<&str>,
		access: u32,
		reserved: u32,
	) -> Result<()> {
		self.call(&DeleteKeyEx {
			key,
			reserved,
			access,
			sub_key: owned(sub_key),
		})
	}

	fn delete_value(&self, key: RawHkey, value_name: Option<&str>) -> Result<()> {
		self.call(&DeleteValue {
			key,
			value_name: owned(value_name),
		})
	}

	fn enum_key(&self, key: RawHkey, index: u32) -> Result<String> {
		self.call(&EnumKey { key, index })
	}

	fn enum_value(&self, key: RawHkey, index: u32) -> Result<ValueEntry> {
		self.call(&EnumValue { key, index })
	}

	fn expand_environment_strings(&self, input: Option<&str>) -> Result<String> {
		self.call(&ExpandEnvironmentStrings {
			input: owned(input),
		})
	}

	fn flush_key(&self, key: RawHkey) -> Result<()> {
		self.call(&FlushKey { key })
	}

	fn load_key(
		&self,
		key: RawHkey,
		sub_key: Option<&str>,
		file_name: Option<&str>,
	) -> Result<()> {
		self.call(&LoadKey {
			key,
			sub_key: owned(sub_key),
			file_name: owned(file_name),
		})
	}

	fn open_key_ex(
		&self,
		key: RawHkey,
		sub_key: Option<&str>,
		reserved: u32,
		access: u32,
	) -> Result<RawHkey> {
		self.call(&OpenKeyEx {
			key,
			reserved,
			access,
			sub_key: owned(sub_key),
		})
	}

	fn query_info_key(&self, key: RawHkey) -> Result<KeyInfo> {
		self.call(&QueryInfoKey { key })
	}

	fn query_value(&self, key: RawHkey, sub_key: Option<&str>) -> Result<String> {
		self.call(&QueryValue {
			key,
			sub_key: owned(sub_key),
		})
	}

	fn query_value_ex(&self, key: RawHkey, value_name: Option<&str>) -> Result<ValueData> {
		self.call(&QueryValueEx {
			key,
			value_name: owned(value_name),
		})
	}

	fn save_key(&self, key: RawHkey, file_name: Option<&str>) -> Result<()> {
		self.call(&SaveKey {
			key,
			file_name: owned(file_name),
		})
	}

	fn set_value(&self, key: RawHkey, sub_key: Option<&str>, value: Option<&str>) -> Result<()> {
		self.call(&SetValue {
			key,
			sub_key: owned(sub_key),
			value: owned(value),
		})
	}

	fn set_value_ex(
		&self,
		key: RawHkey,
		value_name: Option<&str>,
		typ: RegType,
		data: &[u8],
	) -> Result<()> {
		self.call(&SetValueEx {
			key,
			typ,
			value_name: owned(value_name),
			data: data.to_vec(),
		})
	}

	fn disable_reflection_key(&self, key: RawHkey) -> Result<()> {
		self.call(&DisableReflectionKey { key })
	}

	fn enable_reflection_key(&self, key: RawHkey) -> Result<()> {
		self.call(&EnableReflectionKey { key })
	}

	fn query_reflection_key(&self, key: RawHkey) -> Result<bool> {
		self.call(&QueryReflectionKey { key })
	}

	fn get_file_info(&self, path_name: Option<&str>, string_name: Option<&str>) -> Result<String> {
		self.call(&GetFileInfo {
			path_name: owned(path_name),
			string_name: owned(string_name),
		})
	}
}
