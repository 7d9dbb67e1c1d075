#![allow(dead_code)]

use std::{
	collections::{BTreeMap, HashMap, HashSet},
	fs,
	net::{Ipv4Addr, TcpListener},
	path::Path,
	sync::{Arc, Mutex, MutexGuard},
	thread::{self, JoinHandle},
	time::Duration,
};

use serde::{Deserialize, Serialize};
use wslreg::{
	bridge::{connect_and_serve, Session},
	is_predefined, BridgeApi, BridgeConfig, Error, KeyInfo, RawHkey, RegType, Registry,
	RegistryApi, Result, ERROR_ACCESS_DENIED, ERROR_ALREADY_EXISTS, ERROR_BAD_NETPATH,
	ERROR_FILE_NOT_FOUND, ERROR_INVALID_HANDLE, ERROR_INVALID_PARAMETER, ERROR_KEY_DELETED,
	ERROR_NO_MORE_ITEMS, ERROR_RESOURCE_TYPE_NOT_FOUND, HKEY_CLASSES_ROOT, HKEY_DYN_DATA,
	KEY_ALL_ACCESS, KEY_CREATE_SUB_KEY, KEY_ENUMERATE_SUB_KEYS, KEY_QUERY_VALUE, KEY_SET_VALUE,
	KEY_WOW64_RES,
};
use wslreg::proto::{ValueData, ValueEntry};

/// Hive files written by [`MemoryRegistry::save_key`] fail to load with this when corrupted.
const ERROR_BADDB: u32 = 1009;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Node {
	values: Vec<StoredValue>,
	subkeys: BTreeMap<String, Node>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredValue {
	name: String,
	typ: RegType,
	data: Vec<u8>,
}

#[derive(Debug, Clone)]
struct OpenedKey {
	root: RawHkey,
	path: Vec<String>,
	access: u32,
}

#[derive(Debug, Default)]
struct State {
	roots: BTreeMap<RawHkey, Node>,
	handles: HashMap<RawHkey, OpenedKey>,
	next_handle: RawHkey,
	reflection_disabled: HashSet<(RawHkey, Vec<String>)>,
	environment: HashMap<String, String>,
	file_info: HashMap<(String, String), String>,
	clock: u64,
}

/// An in-memory registry with enough of the native behavior to exercise the bridge end to end:
/// access checks, handle bookkeeping, enumeration exhaustion and the native status codes.
#[derive(Debug)]
pub struct MemoryRegistry {
	state: Mutex<State>,
}

fn fail<T>(code: u32) -> Result<T> {
	Err(Error::from_code(code))
}

fn split(sub_key: Option<&str>) -> Vec<String> {
	sub_key
		.unwrap_or_default()
		.split('\\')
		.filter(|part| !part.is_empty())
		.map(ToOwned::to_owned)
		.collect()
}

fn require(key: &OpenedKey, access: u32) -> Result<()> {
	if key.access & access == access {
		Ok(())
	} else {
		fail(ERROR_ACCESS_DENIED)
	}
}

fn utf16_terminated(text: &str) -> Vec<u8> {
	text.encode_utf16()
		.chain(Some(0))
		.flat_map(u16::to_le_bytes)
		.collect()
}

impl Node {
	fn descend(&self, path: &[String]) -> Option<&Self> {
		path.iter().try_fold(self, |node, part| node.subkeys.get(part))
	}

	fn descend_mut(&mut self, path: &[String]) -> Option<&mut Self> {
		path.iter()
			.try_fold(self, |node, part| node.subkeys.get_mut(part))
	}

	fn create(&mut self, path: &[String]) -> &mut Self {
		path.iter().fold(self, |node, part| {
			node.subkeys.entry(part.clone()).or_default()
		})
	}

	fn value(&self, name: &str) -> Option<&StoredValue> {
		self.values.iter().find(|value| value.name == name)
	}

	fn set(&mut self, name: &str, typ: RegType, data: Vec<u8>) {
		match self.values.iter_mut().find(|value| value.name == name) {
			Some(value) => {
				value.typ = typ;
				value.data = data;
			}
			None => self.values.push(StoredValue {
				name: name.to_owned(),
				typ,
				data,
			}),
		}
	}
}

impl State {
	fn resolve(&self, key: RawHkey) -> Result<OpenedKey> {
		if is_predefined(key) {
			return Ok(OpenedKey {
				root: key,
				path: Vec::new(),
				access: KEY_ALL_ACCESS,
			});
		}

		self.handles
			.get(&key)
			.cloned()
			.ok_or_else(|| Error::from_code(ERROR_INVALID_HANDLE))
	}

	fn node(&self, key: &OpenedKey) -> Result<&Node> {
		self.roots
			.get(&key.root)
			.and_then(|root| root.descend(&key.path))
			.ok_or_else(|| Error::from_code(ERROR_KEY_DELETED))
	}

	fn node_mut(&mut self, key: &OpenedKey) -> Result<&mut Node> {
		self.roots
			.get_mut(&key.root)
			.and_then(|root| root.descend_mut(&key.path))
			.ok_or_else(|| Error::from_code(ERROR_KEY_DELETED))
	}

	fn open_handle(&mut self, root: RawHkey, path: Vec<String>, access: u32) -> RawHkey {
		self.next_handle += 4;
		self.handles.insert(
			self.next_handle,
			OpenedKey {
				root,
				path,
				access: access & !KEY_WOW64_RES,
			},
		);
		self.next_handle
	}

	fn create(&mut self, key: RawHkey, sub_key: Option<&str>, access: u32) -> Result<RawHkey> {
		let parent = self.resolve(key)?;
		let parts = split(sub_key);
		if !parts.is_empty() {
			require(&parent, KEY_CREATE_SUB_KEY)?;
		}

		self.node_mut(&parent)?.create(&parts);
		self.clock += 1;

		let mut path = parent.path;
		path.extend(parts);
		Ok(self.open_handle(parent.root, path, access))
	}

	fn delete(&mut self, key: RawHkey, sub_key: Option<&str>) -> Result<()> {
		let parent = self.resolve(key)?;
		let mut parts = split(sub_key);
		let Some(name) = parts.pop() else {
			return fail(ERROR_INVALID_PARAMETER);
		};

		let node = self
			.node_mut(&parent)?
			.descend_mut(&parts)
			.ok_or_else(|| Error::from_code(ERROR_FILE_NOT_FOUND))?;

		let Some(child) = node.subkeys.get(&name) else {
			return fail(ERROR_FILE_NOT_FOUND);
		};
		if !child.subkeys.is_empty() {
			return fail(ERROR_ACCESS_DENIED);
		}

		node.subkeys.remove(&name);
		self.clock += 1;
		Ok(())
	}
}

impl MemoryRegistry {
	pub fn new() -> Self {
		let mut state = State {
			next_handle: 0x1000,
			..Default::default()
		};

		for root in HKEY_CLASSES_ROOT..=HKEY_DYN_DATA {
			state.roots.insert(root, Node::default());
		}
		for (name, value) in [
			("windir", r"C:\Windows"),
			("SystemRoot", r"C:\Windows"),
			("path", r"C:\Windows\system32;C:\Windows"),
			("USERNAME", "tester"),
		] {
			state
				.environment
				.insert(name.to_ascii_lowercase(), value.to_owned());
		}

		Self {
			state: Mutex::new(state),
		}
	}

	pub fn with_file_info(self, path: &str, name: &str, value: &str) -> Self {
		self.state()
			.file_info
			.insert((path.to_owned(), name.to_owned()), value.to_owned());
		self
	}

	fn state(&self) -> MutexGuard<'_, State> {
		self.state.lock().unwrap()
	}

	/// Handles currently open, predefined roots not included.
	pub fn open_handles(&self) -> usize {
		self.state().handles.len()
	}

	pub fn key_exists(&self, root: RawHkey, path: &str) -> bool {
		self.state()
			.roots
			.get(&root)
			.and_then(|node| node.descend(&split(Some(path))))
			.is_some()
	}
}

impl RegistryApi for MemoryRegistry {
	fn close_key(&self, key: RawHkey) -> Result<()> {
		if is_predefined(key) {
			return Ok(());
		}

		self.state()
			.handles
			.remove(&key)
			.map(|_| ())
			.ok_or_else(|| Error::from_code(ERROR_INVALID_HANDLE))
	}

	fn connect_registry(&self, computer_name: Option<&str>, key: RawHkey) -> Result<RawHkey> {
		if computer_name.is_some_and(|name| !name.is_empty()) {
			return fail(ERROR_BAD_NETPATH);
		}
		if !is_predefined(key) {
			return fail(ERROR_INVALID_HANDLE);
		}

		Ok(self.state().open_handle(key, Vec::new(), KEY_ALL_ACCESS))
	}

	fn create_key(&self, key: RawHkey, sub_key: Option<&str>) -> Result<RawHkey> {
		self.state().create(key, sub_key, KEY_ALL_ACCESS)
	}

	fn create_key_ex(
		&self,
		key: RawHkey,
		sub_key: Option<&str>,
		_reserved: u32,
		access: u32,
	) -> Result<RawHkey> {
		self.state().create(key, sub_key, access)
	}

	fn delete_key(&self, key: RawHkey, sub_key: Option<&str>) -> Result<()> {
		self.state().delete(key, sub_key)
	}

	fn delete_key_ex(
		&self,
		key: RawHkey,
		sub_key: Option<&str>,
		_access: u32,
		_reserved: u32,
	) -> Result<()> {
		self.state().delete(key, sub_key)
	}

	fn delete_value(&self, key: RawHkey, value_name: Option<&str>) -> Result<()> {
		let mut state = self.state();
		let opened = state.resolve(key)?;
		require(&opened, KEY_SET_VALUE)?;

		let node = state.node_mut(&opened)?;
		let name = value_name.unwrap_or_default();
		let Some(index) = node.values.iter().position(|value| value.name == name) else {
			return fail(ERROR_FILE_NOT_FOUND);
		};

		node.values.remove(index);
		state.clock += 1;
		Ok(())
	}

	fn enum_key(&self, key: RawHkey, index: u32) -> Result<String> {
		let state = self.state();
		let opened = state.resolve(key)?;
		require(&opened, KEY_ENUMERATE_SUB_KEYS)?;

		state
			.node(&opened)?
			.subkeys
			.keys()
			.nth(index as usize)
			.cloned()
			.ok_or_else(|| Error::from_code(ERROR_NO_MORE_ITEMS))
	}

	fn enum_value(&self, key: RawHkey, index: u32) -> Result<ValueEntry> {
		let state = self.state();
		let opened = state.resolve(key)?;
		require(&opened, KEY_QUERY_VALUE)?;

		state
			.node(&opened)?
			.values
			.get(index as usize)
			.map(|value| ValueEntry {
				name: value.name.clone(),
				data: value.data.clone(),
				typ: value.typ,
			})
			.ok_or_else(|| Error::from_code(ERROR_NO_MORE_ITEMS))
	}

	fn expand_environment_strings(&self, input: Option<&str>) -> Result<String> {
		let state = self.state();
		let mut expanded = String::new();
		let mut rest = input.unwrap_or_default();

		while let Some(start) = rest.find('%') {
			expanded.push_str(&rest[..start]);
			let after = &rest[start + 1..];

			match after.find('%') {
				Some(end) => {
					let name = &after[..end];
					match state.environment.get(&name.to_ascii_lowercase()) {
						Some(value) => {
							expanded.push_str(value);
							rest = &after[end + 1..];
						}
						None => {
							expanded.push('%');
							expanded.push_str(name);
							rest = &after[end..];
						}
					}
				}
				None => {
					expanded.push('%');
					rest = after;
				}
			}
		}
		expanded.push_str(rest);

		Ok(expanded)
	}

	fn flush_key(&self, key: RawHkey) -> Result<()> {
		let state = self.state();
		let opened = state.resolve(key)?;
		state.node(&opened).map(|_| ())
	}

	fn load_key(
		&self,
		key: RawHkey,
		sub_key: Option<&str>,
		file_name: Option<&str>,
	) -> Result<()> {
		let mut state = self.state();
		let opened = state.resolve(key)?;
		let mut parts = split(sub_key);
		let Some(name) = parts.pop() else {
			return fail(ERROR_INVALID_PARAMETER);
		};

		let contents = fs::read(file_name.unwrap_or_default())
			.map_err(|_| Error::from_code(ERROR_FILE_NOT_FOUND))?;
		let hive: Node =
			serde_json::from_slice(&contents).map_err(|_| Error::from_code(ERROR_BADDB))?;

		let parent = state
			.node_mut(&opened)?
			.descend_mut(&parts)
			.ok_or_else(|| Error::from_code(ERROR_FILE_NOT_FOUND))?;
		if parent.subkeys.contains_key(&name) {
			return fail(ERROR_ALREADY_EXISTS);
		}

		parent.subkeys.insert(name, hive);
		state.clock += 1;
		Ok(())
	}

	fn open_key_ex(
		&self,
		key: RawHkey,
		sub_key: Option<&str>,
		_reserved: u32,
		access: u32,
	) -> Result<RawHkey> {
		let mut state = self.state();
		let parent = state.resolve(key)?;
		let parts = split(sub_key);

		if state.node(&parent)?.descend(&parts).is_none() {
			return fail(ERROR_FILE_NOT_FOUND);
		}

		let mut path = parent.path;
		path.extend(parts);
		Ok(state.open_handle(parent.root, path, access))
	}

	fn query_info_key(&self, key: RawHkey) -> Result<KeyInfo> {
		let state = self.state();
		let opened = state.resolve(key)?;
		require(&opened, KEY_QUERY_VALUE)?;
		let node = state.node(&opened)?;

		Ok(KeyInfo {
			sub_keys: node.subkeys.len() as u32,
			values: node.values.len() as u32,
			last_modified: state.clock,
		})
	}

	fn query_value(&self, key: RawHkey, sub_key: Option<&str>) -> Result<String> {
		let state = self.state();
		let opened = state.resolve(key)?;
		let node = state
			.node(&opened)?
			.descend(&split(sub_key))
			.ok_or_else(|| Error::from_code(ERROR_FILE_NOT_FOUND))?;

		Ok(node
			.value("")
			.filter(|value| value.typ == RegType::SZ)
			.and_then(|value| {
				wslreg::proto::value::decode_value(&value.data, value.data.len(), value.typ)
					.as_str()
					.map(ToOwned::to_owned)
			})
			.unwrap_or_default())
	}

	fn query_value_ex(&self, key: RawHkey, value_name: Option<&str>) -> Result<ValueData> {
		let state = self.state();
		let opened = state.resolve(key)?;
		require(&opened, KEY_QUERY_VALUE)?;

		state
			.node(&opened)?
			.value(value_name.unwrap_or_default())
			.map(|value| ValueData {
				data: value.data.clone(),
				typ: value.typ,
			})
			.ok_or_else(|| Error::from_code(ERROR_FILE_NOT_FOUND))
	}

	fn save_key(&self, key: RawHkey, file_name: Option<&str>) -> Result<()> {
		let state = self.state();
		let opened = state.resolve(key)?;
		let path = Path::new(file_name.unwrap_or_default());
		if path.exists() {
			return fail(ERROR_ALREADY_EXISTS);
		}

		let contents = serde_json::to_vec(state.node(&opened)?)
			.map_err(|_| Error::from_code(ERROR_INVALID_PARAMETER))?;
		fs::write(path, contents).map_err(|_| Error::from_code(ERROR_ACCESS_DENIED))
	}

	fn set_value(&self, key: RawHkey, sub_key: Option<&str>, value: Option<&str>) -> Result<()> {
		let mut state = self.state();
		let opened = state.resolve(key)?;
		require(&opened, KEY_SET_VALUE)?;

		state
			.node_mut(&opened)?
			.create(&split(sub_key))
			.set("", RegType::SZ, utf16_terminated(value.unwrap_or_default()));
		state.clock += 1;
		Ok(())
	}

	fn set_value_ex(
		&self,
		key: RawHkey,
		value_name: Option<&str>,
		typ: RegType,
		data: &[u8],
	) -> Result<()> {
		let mut state = self.state();
		let opened = state.resolve(key)?;
		require(&opened, KEY_SET_VALUE)?;

		state
			.node_mut(&opened)?
			.set(value_name.unwrap_or_default(), typ, data.to_vec());
		state.clock += 1;
		Ok(())
	}

	fn disable_reflection_key(&self, key: RawHkey) -> Result<()> {
		let mut state = self.state();
		let opened = state.resolve(key)?;
		state.node(&opened)?;

		state.reflection_disabled.insert((opened.root, opened.path));
		Ok(())
	}

	fn enable_reflection_key(&self, key: RawHkey) -> Result<()> {
		let mut state = self.state();
		let opened = state.resolve(key)?;
		state.node(&opened)?;

		state.reflection_disabled.remove(&(opened.root, opened.path));
		Ok(())
	}

	fn query_reflection_key(&self, key: RawHkey) -> Result<bool> {
		let state = self.state();
		let opened = state.resolve(key)?;
		state.node(&opened)?;

		Ok(state
			.reflection_disabled
			.contains(&(opened.root, opened.path)))
	}

	fn get_file_info(&self, path_name: Option<&str>, string_name: Option<&str>) -> Result<String> {
		let state = self.state();
		let path = path_name.unwrap_or_default();
		if !state.file_info.keys().any(|(known, _)| known == path) {
			return fail(ERROR_FILE_NOT_FOUND);
		}

		state
			.file_info
			.get(&(path.to_owned(), string_name.unwrap_or_default().to_owned()))
			.cloned()
			.ok_or_else(|| Error::from_code(ERROR_RESOURCE_TYPE_NOT_FOUND))
	}
}

pub fn test_config() -> BridgeConfig {
	BridgeConfig {
		startup_timeout_ms: 5_000,
		call_timeout_ms: 5_000,
		..Default::default()
	}
}

/// A bridge client and a backend serving a [`MemoryRegistry`] on a thread, over loopback TCP.
pub struct Bridge {
	pub api: Arc<BridgeApi>,
	pub registry: Registry,
	pub store: Arc<MemoryRegistry>,
	server: Option<JoinHandle<wslreg::proto::Result<()>>>,
}

impl Bridge {
	pub fn start() -> Self {
		Self::with_store(MemoryRegistry::new())
	}

	pub fn with_store(store: MemoryRegistry) -> Self {
		let store = Arc::new(store);
		let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
		let port = listener.local_addr().unwrap().port();

		let server = {
			let store = Arc::clone(&store);
			thread::spawn(move || connect_and_serve(port, &*store))
		};

		let config = test_config();
		let session =
			Session::accept(&listener, config.startup_timeout(), config.call_timeout()).unwrap();

		let api = Arc::new(BridgeApi::from_session(session, &config));

		Self {
			registry: Registry::new(api.clone()),
			api,
			store,
			server: Some(server),
		}
	}

	/// Drops the client side and waits for the backend loop to wind down.
	pub fn shutdown(mut self) -> wslreg::proto::Result<()> {
		let server = self.server.take().unwrap();
		drop(self);

		server.join().unwrap()
	}
}

/// Runs `test` against the in-memory registry directly, then again through the bridge.
pub fn with_each_backend(test: impl Fn(&Registry, &MemoryRegistry)) {
	with_each_store(MemoryRegistry::new, test);
}

/// [`with_each_backend`], each run getting a fresh store from `make_store`.
pub fn with_each_store(
	make_store: impl Fn() -> MemoryRegistry,
	test: impl Fn(&Registry, &MemoryRegistry),
) {
	let store = Arc::new(make_store());
	test(&Registry::new(store.clone()), &store);

	let bridge = Bridge::with_store(make_store());
	test(&bridge.registry, &bridge.store);
	bridge.shutdown().unwrap();
}

/// Polls `condition` for up to a second.
pub fn eventually(condition: impl Fn() -> bool) -> bool {
	for _ in 0..100 {
		if condition() {
			return true;
		}
		thread::sleep(Duration::from_millis(10));
	}
	false
}
