//! Manager binary: the DSS control plane. Listens on a single UDP port
//! and serializes every request through one `ManagerState` behind a
//! mutex, mirroring the source's single-socket, single-threaded loop.

use std::sync::Arc;

use clap::Parser;
use dss_core::Response;
use dss_manager::{params::*, ManagerError, ManagerState};
use tokio::net::UdpSocket;
use tokio::sync::Mutex;

#[derive(Parser, Debug)]
#[command(name = "manager", about = "DSS manager process")]
struct Cli {
    /// UDP port to listen on for every manager command
    port: u16,
}

impl Cli {
    fn validate(&self) -> anyhow::Result<()> {
        if self.port == 0 {
            anyhow::bail!("port must be nonzero");
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    cli.validate()?;

    let socket = UdpSocket::bind(("0.0.0.0", cli.port)).await?;
    tracing::info!(port = cli.port, "manager listening");

    let state = Arc::new(Mutex::new(ManagerState::new()));
    let mut buf = vec![0u8; dss_transport::recv_buffer_size()];

    loop {
        let Some((maybe_req, addr)) = dss_transport::recv_request(&socket, &mut buf).await? else {
            continue;
        };
        let Some(req) = maybe_req else {
            tracing::warn!(%addr, "received an unparseable frame");
            continue;
        };

        tracing::info!(command = %req.command, %addr, "received command");
        let resp = dispatch(&state, &req.command, req.parameters).await;
        if let Err(e) = dss_transport::reply(&socket, addr, &resp).await {
            tracing::warn!(%addr, error = %e, "failed to send reply");
        }
    }
}

fn params<T: serde::de::DeserializeOwned + Default>(value: serde_json::Value) -> T {
    serde_json::from_value(value).unwrap_or_default()
}

fn to_response(result: Result<serde_json::Value, ManagerError>) -> Response {
    match result {
        Ok(serde_json::Value::Null) => Response::success(None),
        Ok(data) => Response::success(Some(data)),
        Err(e) => Response::failure(e.to_string()),
    }
}

async fn dispatch(state: &Arc<Mutex<ManagerState>>, command: &str, parameters: serde_json::Value) -> Response {
    let mut state = state.lock().await;
    match command {
        "register-user" => to_response(state.register_user(params(parameters))),
        "register-disk" => to_response(state.register_disk(params(parameters))),
        "configure-dss" => to_response(state.configure_dss(params(parameters))),
        "ls" => to_response(state.list_files(params(parameters))),
        "copy" => to_response(state.copy(params(parameters))),
        "copy-complete" => to_response(state.copy_complete(params(parameters))),
        "read" => to_response(state.read(params(parameters))),
        "read-complete" => to_response(state.read_complete(params(parameters))),
        "disk-failure" => to_response(state.disk_failure(params(parameters))),
        "recovery-complete" => to_response(state.recovery_complete(params(parameters))),
        "decommission-dss" => to_response(state.decommission_dss(params(parameters))),
        "decommission-complete" => to_response(state.decommission_complete(params(parameters))),
        "deregister-user" => to_response(state.deregister_user(params(parameters))),
        "deregister-disk" => to_response(state.deregister_disk(params(parameters))),
        _ => Response::failure(ManagerError::UnknownCommand.to_string()),
    }
}
