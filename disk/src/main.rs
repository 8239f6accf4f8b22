//! Disk binary: an in-memory block store exposed over two UDP ports, a
//! management port that currently only logs traffic and a command port
//! that serves `write-block`/`read-block`/`fail`/`recovery-write`.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use dss_core::{decode_block, encode_block, BlockTag, Request, Response};
use dss_disk::{BlockStore, DiskError};
use serde_json::json;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;

#[derive(Parser, Debug)]
#[command(name = "disk", about = "DSS disk process")]
struct Cli {
    /// This disk's registered name
    name: String,
    /// Manager host
    manager_ip: String,
    /// Manager port
    manager_port: u16,
    /// Management port this disk listens on
    m_port: u16,
    /// Command port this disk listens on
    c_port: u16,
}

impl Cli {
    fn validate(&self) -> anyhow::Result<()> {
        if !dss_core::is_valid_name(&self.name) {
            anyhow::bail!("invalid disk name: {}", self.name);
        }
        if self.m_port == 0 || self.c_port == 0 || self.manager_port == 0 {
            anyhow::bail!("ports must be nonzero");
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    cli.validate()?;

    let m_sock = UdpSocket::bind(("0.0.0.0", cli.m_port)).await?;
    let c_sock = UdpSocket::bind(("0.0.0.0", cli.c_port)).await?;
    tracing::info!(name = %cli.name, m_port = cli.m_port, c_port = cli.c_port, "disk started");

    register_with_manager(&cli).await?;

    let store = Arc::new(Mutex::new(BlockStore::new()));

    tokio::select! {
        _ = management_loop(m_sock) => {}
        _ = command_loop(c_sock, store) => {}
    }

    Ok(())
}

async fn register_with_manager(cli: &Cli) -> anyhow::Result<()> {
    let manager_addr: SocketAddr = format!("{}:{}", cli.manager_ip, cli.manager_port).parse()?;
    let req = Request::new(
        "register-disk",
        json!({
            "disk_name": cli.name,
            "ipv4_addr": "127.0.0.1",
            "m_port": cli.m_port,
            "c_port": cli.c_port,
        }),
        Some(cli.name.as_str()),
    );
    let resp = dss_transport::request(manager_addr, &req, dss_transport::REQUEST_TIMEOUT).await?;
    if resp.is_success() {
        tracing::info!("registered with manager");
    } else {
        tracing::error!(message = ?resp.message, "manager rejected registration");
    }
    Ok(())
}

async fn management_loop(socket: UdpSocket) -> anyhow::Result<()> {
    let mut buf = vec![0u8; dss_transport::recv_buffer_size()];
    loop {
        if let Some((_, addr)) = dss_transport::recv_request(&socket, &mut buf).await? {
            tracing::debug!(%addr, "management message received");
        }
    }
}

async fn command_loop(socket: UdpSocket, store: Arc<Mutex<BlockStore>>) -> anyhow::Result<()> {
    let mut buf = vec![0u8; dss_transport::recv_buffer_size()];
    loop {
        let Some((maybe_req, addr)) = dss_transport::recv_request(&socket, &mut buf).await? else {
            continue;
        };
        let Some(req) = maybe_req else {
            continue;
        };

        let resp = handle_command(&store, &req).await;
        if let Err(e) = dss_transport::reply(&socket, addr, &resp).await {
            tracing::warn!(%addr, error = %e, "failed to send reply");
        }
    }
}

async fn handle_command(store: &Arc<Mutex<BlockStore>>, req: &Request) -> Response {
    match req.command.as_str() {
        "write-block" => handle_write_block(store, &req.parameters).await,
        "read-block" => handle_read_block(store, &req.parameters).await,
        "fail" => handle_fail(store, &req.parameters).await,
        "recovery-write" => handle_write_block(store, &req.parameters).await,
        _ => Response::failure("Unknown command"),
    }
}

fn block_tag(value: &serde_json::Value) -> Option<BlockTag> {
    match value.as_str()? {
        "data" => Some(BlockTag::Data),
        "parity" => Some(BlockTag::Parity),
        _ => None,
    }
}

async fn handle_write_block(store: &Arc<Mutex<BlockStore>>, params: &serde_json::Value) -> Response {
    let (Some(file_name), Some(dss_name), Some(stripe_num), Some(tag), Some(encoded)) = (
        params["file_name"].as_str(),
        params["dss_name"].as_str(),
        params["stripe_num"].as_u64(),
        block_tag(&params["block_type"]),
        params["block_data"].as_str(),
    ) else {
        return Response::failure(DiskError::MissingParameters.to_string());
    };

    let data = match decode_block(encoded) {
        Ok(d) => d,
        Err(e) => return Response::failure(e.to_string()),
    };

    store.lock().await.write_block(dss_name, file_name, stripe_num, tag, data);
    tracing::info!(dss_name, file_name, stripe_num, "stored block");
    Response::success(None)
}

async fn handle_read_block(store: &Arc<Mutex<BlockStore>>, params: &serde_json::Value) -> Response {
    let (Some(file_name), Some(dss_name), Some(stripe_num)) = (
        params["file_name"].as_str(),
        params["dss_name"].as_str(),
        params["stripe_num"].as_u64(),
    ) else {
        return Response::failure(DiskError::MissingParameters.to_string());
    };

    match store.lock().await.read_block(dss_name, file_name, stripe_num) {
        Ok((data, tag)) => Response::success(Some(json!({
            "block_data": encode_block(&data),
            "block_type": tag.as_str(),
        }))),
        Err(e) => Response::failure(e.to_string()),
    }
}

async fn handle_fail(store: &Arc<Mutex<BlockStore>>, params: &serde_json::Value) -> Response {
    let Some(dss_name) = params["dss_name"].as_str() else {
        return Response::failure(DiskError::MissingDssName.to_string());
    };
    store.lock().await.fail(dss_name);
    tracing::warn!(dss_name, "simulated disk failure");
    Response::success(None)
}
