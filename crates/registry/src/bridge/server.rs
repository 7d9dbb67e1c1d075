use std::{
	io::{self, BufReader, Read, Write},
	net::{Ipv4Addr, TcpStream},
};

use tracing::{debug, error, info, trace};
use wslreg_proto::{
	consts::ERROR_CALL_NOT_IMPLEMENTED,
	ops::{
		CloseKey, ConnectRegistry, CreateKey, CreateKeyEx, DeleteKey, DeleteKeyEx, DeleteValue,
		DisableReflectionKey, EnableReflectionKey, EnumKey, EnumValue, ExpandEnvironmentStrings,
		FlushKey, GetFileInfo, LoadKey, OpenKey, OpenKeyEx, QueryInfoKey, QueryReflectionKey,
		QueryValue, QueryValueEx, SaveKey, SetValue, SetValueEx,
	},
	write_banner, Opcode, Request, Response, Wire,
};

use crate::{RegistryApi, Result};

/// Connects to a bridge client listening on the loopback `port` and serves it.
pub fn connect_and_serve(port: u16, api: &dyn RegistryApi) -> wslreg_proto::Result<()> {
	let stream = TcpStream::connect((Ipv4Addr::LOCALHOST, port))?;
	info!(port, "Connected to registry bridge client;");

	serve(stream, api)
}

/// Serves requests from `stream` against `api` until the client aborts or disconnects.
///
/// Failed registry calls are reported back to the client and don't end the session; stream
/// errors and unknown operation codes do.
pub fn serve(stream: TcpStream, api: &dyn RegistryApi) -> wslreg_proto::Result<()> {
	stream.set_nodelay(true)?;
	let mut reader = BufReader::new(stream.try_clone()?);
	let mut writer = stream;

	write_banner(&mut writer)?;

	loop {
		let Some(code) = read_opcode(&mut reader)? else {
			info!("Registry bridge client disconnected;");
			return Ok(());
		};

		let opcode = Opcode::try_from(code).map_err(|e| {
			error!(?e, "Closing registry bridge;");
			e
		})?;

		let Some(request) = Request::decode(opcode, &mut reader)? else {
			info!("Registry bridge client requested shutdown;");
			return Ok(());
		};

		trace!(?opcode, "Serving bridge request;");
		writer.write_all(&dispatch(api, request))?;
	}
}

/// The next operation code, `None` once the client has closed its end.
fn read_opcode(reader: &mut impl Read) -> wslreg_proto::Result<Option<u8>> {
	let mut code = [0u8; 1];
	loop {
		match reader.read(&mut code) {
			Ok(0) => return Ok(None),
			Ok(_) => return Ok(Some(code[0])),
			Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
			Err(e) => return Err(e.into()),
		}
	}
}

fn dispatch(api: &dyn RegistryApi, request: Request) -> Vec<u8> {
	let mut buf = Vec::new();

	match request {
		Request::Connect(_) => respond(&mut buf, Ok(())),

		Request::CloseKey(CloseKey { key }) => respond(&mut buf, api.close_key(key)),

		Request::ConnectRegistry(ConnectRegistry { key, computer_name }) => respond(
			&mut buf,
			api.connect_registry(computer_name.as_deref(), key),
		),

		Request::CreateKey(CreateKey { key, sub_key }) => {
			respond(&mut buf, api.create_key(key, sub_key.as_deref()));
		}

		Request::CreateKeyEx(CreateKeyEx {
			key,
			reserved,
			access,
			sub_key,
		}) => respond(
			&mut buf,
			api.create_key_ex(key, sub_key.as_deref(), reserved, access),
		),

		Request::DeleteKey(DeleteKey { key, sub_key }) => {
			respond(&mut buf, api.delete_key(key, sub_key.as_deref()));
		}

		Request::DeleteKeyEx(DeleteKeyEx {
			key,
			reserved,
			access,
			sub_key,
		}) => respond(
			&mut buf,
			api.delete_key_ex(key, sub_key.as_deref(), access, reserved),
		),

		Request::DeleteValue(DeleteValue { key, value_name }) => {
			respond(&mut buf, api.delete_value(key, value_name.as_deref()));
		}

		Request::EnumKey(EnumKey { key, index }) => respond(&mut buf, api.enum_key(key, index)),

		Request::EnumValue(EnumValue { key, index }) => {
			respond(&mut buf, api.enum_value(key, index));
		}

		Request::ExpandEnvironmentStrings(ExpandEnvironmentStrings { input }) => {
			respond(&mut buf, api.expand_environment_strings(input.as_deref()));
		}

		Request::FlushKey(FlushKey { key }) => respond(&mut buf, api.flush_key(key)),

		Request::LoadKey(LoadKey {
			key,
			sub_key,
			file_name,
		}) => respond(
			&mut buf,
			api.load_key(key, sub_key.as_deref(), file_name.as_deref()),
		),

		// Both open flavours share the native call.
		Request::OpenKey(OpenKey {
			key,
			reserved,
			access,
			sub_key,
		})
		| Request::OpenKeyEx(OpenKeyEx {
			key,
			reserved,
			access,
			sub_key,
		}) => respond(
			&mut buf,
			api.open_key_ex(key, sub_key.as_deref(), reserved, access),
		),

		Request::QueryInfoKey(QueryInfoKey { key }) => {
			respond(&mut buf, api.query_info_key(key));
		}

		Request::QueryValue(QueryValue { key, sub_key }) => {
			respond(&mut buf, api.query_value(key, sub_key.as_deref()));
		}

		Request::QueryValueEx(QueryValueEx { key, value_name }) => {
			respond(&mut buf, api.query_value_ex(key, value_name.as_deref()));
		}

		Request::SaveKey(SaveKey { key, file_name }) => {
			respond(&mut buf, api.save_key(key, file_name.as_deref()));
		}

		Request::SetValue(SetValue {
			key,
			sub_key,
			value,
		}) => respond(
			&mut buf,
			api.set_value(key, sub_key.as_deref(), value.as_deref()),
		),

		Request::SetValueEx(SetValueEx {
			key,
			typ,
			value_name,
			data,
		}) => respond(
			&mut buf,
			api.set_value_ex(key, value_name.as_deref(), typ, &data),
		),

		Request::DisableReflectionKey(DisableReflectionKey { key }) => {
			respond(&mut buf, api.disable_reflection_key(key));
		}

		Request::EnableReflectionKey(EnableReflectionKey { key }) => {
			respond(&mut buf, api.enable_reflection_key(key));
		}

		Request::QueryReflectionKey(QueryReflectionKey { key }) => {
			respond(&mut buf, api.query_reflection_key(key));
		}

		Request::GetFileInfo(GetFileInfo {
			path_name,
			string_name,
		}) => respond(
			&mut buf,
			api.get_file_info(path_name.as_deref(), string_name.as_deref()),
		),
	}

	buf
}

fn respond<T: Wire>(buf: &mut Vec<u8>, result: Result<T>) {
	let response = match result {
		Ok(reply) => Response::Success(reply),
		Err(e) => {
			debug!(?e, "Registry call failed;");
			Response::Failure {
				// Only local failures get here, never a broken bridge.
				status: e.status().unwrap_or(ERROR_CALL_NOT_IMPLEMENTED),
				message: e.wire_message(),
			}
		}
	};

	response.encode(buf);
}
