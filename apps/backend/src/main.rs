use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use wslreg::{bridge::connect_and_serve, RegistryApi};

/// Serves registry requests to a wslreg client running under the Windows Subsystem for Linux.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
	/// Loopback port the client is listening on.
	#[arg(short, long)]
	port: u16,
}

#[cfg(windows)]
fn registry() -> impl RegistryApi {
	wslreg::NativeApi
}

#[cfg(not(windows))]
fn registry() -> impl RegistryApi {
	tracing::warn!("Not running on Windows, every registry call will fail;");
	wslreg::NullApi
}

fn main() -> ExitCode {
	let args = Args::parse();

	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
		)
		.with_writer(std::io::stderr)
		.init();

	let api = registry();

	match connect_and_serve(args.port, &api) {
		Ok(()) => {
			info!("Registry bridge backend finished;");
			ExitCode::SUCCESS
		}
		Err(e) => {
			error!(?e, port = args.port, "Registry bridge backend failed;");
			ExitCode::FAILURE
		}
	}
}
