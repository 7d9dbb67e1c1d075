use std::{
	io::{self, BufReader, Write},
	net::{Shutdown, TcpListener, TcpStream},
	thread,
	time::{Duration, Instant},
};

use tracing::{debug, error, trace};
use wslreg_proto::{read_banner, Opcode, Operation, Response};

use crate::{Error, Result};

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Client end of a bridge connection.
///
/// Requests are strictly sequential: each call writes one request and reads its complete reply
/// before returning. A transport failure poisons the session, later calls fail immediately.
#[derive(Debug)]
pub struct Session {
	reader: BufReader<TcpStream>,
	writer: TcpStream,
	call_timeout: Duration,
	broken: bool,
}

impl Session {
	/// Waits up to `startup_timeout` for the backend to connect, then performs the handshake.
	pub fn accept(
		listener: &TcpListener,
		startup_timeout: Duration,
		call_timeout: Duration,
	) -> Result<Self> {
		let startup_failed =
			|e: io::Error| Error::Startup(format!("failed to accept the bridge connection: {e}"));

		listener.set_nonblocking(true).map_err(startup_failed)?;
		let deadline = Instant::now() + startup_timeout;

		let stream = loop {
			match listener.accept() {
				Ok((stream, peer)) => {
					debug!(%peer, "Registry bridge backend connected;");
					break stream;
				}
				Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
					if Instant::now() >= deadline {
						return Err(Error::Startup(format!(
							"the bridge backend did not connect within {startup_timeout:?}"
						)));
					}
					thread::sleep(ACCEPT_POLL_INTERVAL);
				}
				Err(e) => return Err(startup_failed(e)),
			}
		};

		stream.set_nonblocking(false).map_err(startup_failed)?;

		Self::handshake(stream, call_timeout)
	}

	/// Reads the backend's greeting from an already connected stream.
	pub fn handshake(stream: TcpStream, call_timeout: Duration) -> Result<Self> {
		stream.set_nodelay(true).map_err(wslreg_proto::Error::from)?;
		stream
			.set_read_timeout(Some(call_timeout))
			.map_err(wslreg_proto::Error::from)?;

		let writer = stream.try_clone().map_err(wslreg_proto::Error::from)?;
		let mut reader = BufReader::new(stream);

		read_banner(&mut reader).map_err(|e| {
			error!(?e, "Registry bridge handshake failed;");
			Error::ConnectionBroken(e)
		})?;
		debug!("Registry bridge handshake complete;");

		Ok(Self {
			reader,
			writer,
			call_timeout,
			broken: false,
		})
	}

	#[must_use]
	pub const fn is_broken(&self) -> bool {
		self.broken
	}

	/// Sends `op` and waits for its reply.
	///
	/// A failure reported by the backend becomes [`Error::NotFound`] or [`Error::Native`]; anything
	/// going wrong on the stream itself becomes [`Error::ConnectionBroken`].
	pub fn call<O: Operation>(&mut self, op: &O) -> Result<O::Reply> {
		if self.broken {
			return Err(Error::ConnectionBroken(wslreg_proto::Error::Closed));
		}

		let message = op.to_message();
		debug!(opcode = ?O::OPCODE, "Sending bridge request;");
		trace!(len = message.len(), "Bridge request encoded;");

		let response = self
			.writer
			.write_all(&message)
			.map_err(wslreg_proto::Error::from)
			.and_then(|()| Response::<O::Reply>::decode(&mut self.reader));

		match response {
			Ok(Response::Success(reply)) => Ok(reply),
			Ok(Response::Failure { status, message }) => Err(Error::from_status(status, message)),
			Err(e) => {
				error!(opcode = ?O::OPCODE, ?e, "Registry bridge connection broken;");
				self.broken = true;
				Err(Error::ConnectionBroken(e))
			}
		}
	}

	/// Like [`Session::call`], with a different reply timeout for this one call.
	pub fn call_with_timeout<O: Operation>(
		&mut self,
		op: &O,
		timeout: Duration,
	) -> Result<O::Reply> {
		self.set_read_timeout(timeout)?;
		let result = self.call(op);
		if !self.broken {
			self.set_read_timeout(self.call_timeout)?;
		}

		result
	}

	/// Tells the backend to exit. The session is unusable afterwards.
	pub fn abort(&mut self) -> Result<()> {
		if self.broken {
			return Ok(());
		}
		self.broken = true;

		self.writer
			.write_all(&[Opcode::Abort as u8])
			.map_err(|e| Error::ConnectionBroken(e.into()))
	}

	/// Closes the stream in both directions, so the backend reads end of stream even when it never
	/// got an abort. The session is unusable afterwards.
	pub fn shutdown(&mut self) {
		self.broken = true;

		// NotConnected once the backend has already gone away.
		if let Err(e) = self.writer.shutdown(Shutdown::Both) {
			trace!(?e, "Bridge stream already closed;");
		}
	}

	fn set_read_timeout(&mut self, timeout: Duration) -> Result<()> {
		self.writer
			.set_read_timeout(Some(timeout))
			.map_err(|e| {
				self.broken = true;
				Error::ConnectionBroken(e.into())
			})
	}
}
