//! User binary: a thin REPL shell over the tested `dss-user` fan-out
//! engine. Parses commands, talks to the manager for directory
//! operations, and drives `dss_user::{copy_file, read_file, fail_disk,
//! recover_disk}` for the data-plane work.

use std::net::SocketAddr;

use clap::Parser;
use dss_core::{DiskContact, Request, Response};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UdpSocket;

#[derive(Parser, Debug)]
#[command(name = "user", about = "DSS user process")]
struct Cli {
    /// This user's registered name
    name: String,
    /// Manager host
    manager_ip: String,
    /// Manager port
    manager_port: u16,
    /// Management port this user listens on
    m_port: u16,
    /// Command port this user listens on
    c_port: u16,
}

impl Cli {
    fn validate(&self) -> anyhow::Result<()> {
        if !dss_core::is_valid_name(&self.name) {
            anyhow::bail!("invalid user name: {}", self.name);
        }
        if self.m_port == 0 || self.c_port == 0 || self.manager_port == 0 {
            anyhow::bail!("ports must be nonzero");
        }
        Ok(())
    }
}

struct Context {
    name: String,
    manager_addr: SocketAddr,
    m_port: u16,
    c_port: u16,
    rng: StdRng,
}

impl Context {
    async fn send_to_manager(&self, command: &str, parameters: Value) -> anyhow::Result<Response> {
        let req = Request::new(command, parameters, Some(self.name.as_str()));
        let resp =
            dss_transport::request(self.manager_addr, &req, dss_transport::REQUEST_TIMEOUT).await?;
        Ok(resp)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    cli.validate()?;

    let manager_addr: SocketAddr = format!("{}:{}", cli.manager_ip, cli.manager_port).parse()?;
    let m_sock = UdpSocket::bind(("0.0.0.0", cli.m_port)).await?;
    let c_sock = UdpSocket::bind(("0.0.0.0", cli.c_port)).await?;
    tracing::info!(name = %cli.name, m_port = cli.m_port, c_port = cli.c_port, "user started");

    tokio::spawn(background_loop(m_sock, "management"));
    tokio::spawn(background_loop(c_sock, "command"));

    let ctx = Context {
        name: cli.name.clone(),
        manager_addr,
        m_port: cli.m_port,
        c_port: cli.c_port,
        rng: StdRng::from_entropy(),
    };
    register_with_manager(&ctx).await?;

    repl(ctx).await
}

async fn background_loop(socket: UdpSocket, label: &'static str) {
    let mut buf = vec![0u8; dss_transport::recv_buffer_size()];
    loop {
        match dss_transport::recv_request(&socket, &mut buf).await {
            Ok(Some((_, addr))) => tracing::debug!(%addr, label, "message received"),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(label, error = %e, "recv error");
                break;
            }
        }
    }
}

async fn register_with_manager(ctx: &Context) -> anyhow::Result<()> {
    let resp = ctx
        .send_to_manager(
            "register-user",
            json!({
                "user_name": ctx.name,
                "ipv4_addr": "127.0.0.1",
                "m_port": ctx.m_port,
                "c_port": ctx.c_port,
            }),
        )
        .await?;
    if resp.is_success() {
        tracing::info!("registered with manager");
    } else {
        tracing::error!(message = ?resp.message, "manager rejected registration");
    }
    Ok(())
}

async fn repl(mut ctx: Context) -> anyhow::Result<()> {
    println!("User {} ready. Available commands:", ctx.name);
    println!("  configure-dss <dss_name> <n> <striping_unit>");
    println!("  ls");
    println!("  copy <file_path>");
    println!("  read <dss_name> <file_name> [error_prob]");
    println!("  disk-failure <dss_name>");
    println!("  decommission-dss <dss_name>");
    println!("  deregister-user");
    println!("  quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{}> ", ctx.name);
        use std::io::Write;
        std::io::stdout().flush().ok();

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let command = line.trim();
        if command.eq_ignore_ascii_case("quit") {
            break;
        }

        let parts: Vec<&str> = command.split_whitespace().collect();
        let result = match parts.first().copied() {
            Some("configure-dss") => handle_configure_dss(&ctx, &parts).await,
            Some("ls") => handle_ls(&ctx).await,
            Some("copy") => handle_copy(&ctx, &parts).await,
            Some("read") => handle_read(&mut ctx, &parts).await,
            Some("disk-failure") => handle_disk_failure(&mut ctx, &parts).await,
            Some("decommission-dss") => handle_decommission_dss(&ctx, &parts).await,
            Some("deregister-user") => {
                let stop = handle_deregister_user(&ctx).await?;
                if stop {
                    break;
                }
                Ok(())
            }
            Some(other) => {
                println!("Unknown command: {other}");
                Ok(())
            }
            None => Ok(()),
        };
        if let Err(e) = result {
            println!("Error: {e}");
        }
    }
    Ok(())
}

async fn handle_configure_dss(ctx: &Context, parts: &[&str]) -> anyhow::Result<()> {
    if parts.len() != 4 {
        println!("Usage: configure-dss <dss_name> <n> <striping_unit>");
        return Ok(());
    }
    let n: u32 = parts[2].parse()?;
    let striping_unit: u32 = parts[3].parse()?;

    let resp = ctx
        .send_to_manager(
            "configure-dss",
            json!({
                "dss_name": parts[1],
                "n": n,
                "striping_unit": striping_unit,
                "user_name": ctx.name,
            }),
        )
        .await?;
    println!("DSS configuration: {:?}", resp.status);
    if let Some(message) = &resp.message {
        println!("Message: {message}");
    }
    Ok(())
}

async fn handle_ls(ctx: &Context) -> anyhow::Result<()> {
    let resp = ctx.send_to_manager("ls", json!({ "user_name": ctx.name })).await?;
    if !resp.is_success() {
        println!("ls failed: {}", resp.message.unwrap_or_else(|| "Unknown error".into()));
        return Ok(());
    }

    let dsses = resp
        .data
        .as_ref()
        .and_then(|d| d.get("dsses"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    if dsses.is_empty() {
        println!("No DSSs configured");
        return Ok(());
    }

    println!("\n{}", "=".repeat(70));
    println!("Distributed Storage Systems - File Listing");
    println!("{}\n", "=".repeat(70));

    for dss in &dsses {
        let dss_name = dss["dss_name"].as_str().unwrap_or_default();
        let n = dss["n"].as_u64().unwrap_or_default();
        let striping_unit = dss["striping_unit"].as_u64().unwrap_or_default();
        let disk_names: Vec<String> = dss["disks"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|d| d["disk_name"].as_str().map(str::to_string))
            .collect();

        println!(
            "{dss_name}: Disk array with n={n} ({}) with striping-unit {striping_unit} B.",
            disk_names.join(", ")
        );

        let files = dss["files"].as_array().cloned().unwrap_or_default();
        if files.is_empty() {
            println!("  (no files)");
        } else {
            for file in &files {
                println!(
                    "  {:<30} {:>10} B  {}",
                    file["file_name"].as_str().unwrap_or_default(),
                    file["file_size"].as_u64().unwrap_or_default(),
                    file["owner"].as_str().unwrap_or_default(),
                );
            }
        }
        println!();
    }
    Ok(())
}

async fn handle_copy(ctx: &Context, parts: &[&str]) -> anyhow::Result<()> {
    if parts.len() != 2 {
        println!("Usage: copy <file_path>");
        return Ok(());
    }
    let file_path = parts[1];
    let file_data = match tokio::fs::read(file_path).await {
        Ok(d) => d,
        Err(_) => {
            println!("Error: File {file_path} does not exist");
            return Ok(());
        }
    };
    let file_name = std::path::Path::new(file_path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(file_path)
        .to_string();
    let file_size = file_data.len() as u64;

    println!("Copying file: {file_name} ({file_size} bytes)");
    let resp = ctx
        .send_to_manager(
            "copy",
            json!({ "file_name": file_name, "file_size": file_size, "owner": ctx.name }),
        )
        .await?;
    if !resp.is_success() {
        println!("Copy failed: {}", resp.message.unwrap_or_else(|| "Unknown error".into()));
        return Ok(());
    }

    let data = resp.data.unwrap_or(Value::Null);
    let dss_name = data["dss_name"].as_str().unwrap_or_default().to_string();
    let n = data["n"].as_u64().unwrap_or_default() as u32;
    let striping_unit = data["striping_unit"].as_u64().unwrap_or_default() as u32;
    let disks: Vec<DiskContact> = serde_json::from_value(data["disks"].clone())?;

    println!("Selected DSS: {dss_name} with {n} disks, striping-unit: {striping_unit} B");
    println!("Performing file copy to DSS...");

    dss_user::copy_file(&ctx.name, &disks, &dss_name, &file_name, n, striping_unit, &file_data).await?;

    let complete = ctx
        .send_to_manager(
            "copy-complete",
            json!({ "file_name": file_name, "file_size": file_size, "owner": ctx.name, "dss_name": dss_name }),
        )
        .await?;
    if complete.is_success() {
        println!("File {file_name} successfully copied to DSS {dss_name}");
    } else {
        println!(
            "Copy completion failed: {}",
            complete.message.unwrap_or_else(|| "Unknown error".into())
        );
    }
    Ok(())
}

async fn handle_read(ctx: &mut Context, parts: &[&str]) -> anyhow::Result<()> {
    if parts.len() < 3 || parts.len() > 4 {
        println!("Usage: read <dss_name> <file_name> [error_prob]");
        return Ok(());
    }
    let dss_name = parts[1];
    let file_name = parts[2];
    let error_prob: u8 = if parts.len() == 4 {
        let p: i32 = parts[3].parse()?;
        if !(0..=100).contains(&p) {
            println!("Error: error_prob must be between 0 and 100");
            return Ok(());
        }
        p as u8
    } else {
        10
    };

    println!("Reading file: {file_name} from DSS {dss_name} (error_prob={error_prob}%)");
    let resp = ctx
        .send_to_manager("read", json!({ "dss_name": dss_name, "file_name": file_name, "user_name": ctx.name }))
        .await?;
    if !resp.is_success() {
        println!("Read failed: {}", resp.message.unwrap_or_else(|| "Unknown error".into()));
        return Ok(());
    }

    let data = resp.data.unwrap_or(Value::Null);
    let file_size = data["file_size"].as_u64().unwrap_or_default();
    let n = data["n"].as_u64().unwrap_or_default() as u32;
    let striping_unit = data["striping_unit"].as_u64().unwrap_or_default() as u32;
    let disks: Vec<DiskContact> = serde_json::from_value(data["disks"].clone())?;

    println!("File size: {file_size} bytes, DSS: {n} disks, striping-unit: {striping_unit} B");
    println!("Performing file read from DSS...");

    let output = dss_user::read_file(
        &ctx.name, &disks, dss_name, file_name, file_size, n, striping_unit, error_prob, &mut ctx.rng,
    )
    .await?;

    let output_path = format!("read_{file_name}");
    tokio::fs::write(&output_path, &output).await?;

    match tokio::fs::read(file_name).await {
        Ok(original) if original == output => {
            println!("File integrity verified: {file_name} matches {output_path}");
        }
        Ok(_) => println!("File integrity check failed: contents differ from {file_name}"),
        Err(_) => println!("Could not verify file integrity: {file_name} not found locally"),
    }

    let complete = ctx
        .send_to_manager(
            "read-complete",
            json!({ "dss_name": dss_name, "file_name": file_name, "user_name": ctx.name }),
        )
        .await?;
    if complete.is_success() {
        println!("File {file_name} successfully read from DSS {dss_name}");
    } else {
        println!(
            "Read completion failed: {}",
            complete.message.unwrap_or_else(|| "Unknown error".into())
        );
    }
    Ok(())
}

async fn handle_disk_failure(ctx: &mut Context, parts: &[&str]) -> anyhow::Result<()> {
    if parts.len() != 2 {
        println!("Usage: disk-failure <dss_name>");
        return Ok(());
    }
    let dss_name = parts[1];
    println!("Simulating disk failure on DSS: {dss_name}");

    let resp = ctx.send_to_manager("disk-failure", json!({ "dss_name": dss_name })).await?;
    if !resp.is_success() {
        println!("Disk failure failed: {}", resp.message.unwrap_or_else(|| "Unknown error".into()));
        return Ok(());
    }

    let data = resp.data.unwrap_or(Value::Null);
    let n = data["n"].as_u64().unwrap_or_default() as u32;
    let striping_unit = data["striping_unit"].as_u64().unwrap_or_default();
    let disks: Vec<DiskContact> = serde_json::from_value(data["disks"].clone())?;

    println!("DSS parameters: {n} disks, striping-unit: {striping_unit} B");
    println!("Performing disk failure simulation...");

    let failed_index = rand::Rng::gen_range(&mut ctx.rng, 0..n as usize);
    let failed_name = disks[failed_index].disk_name.clone();
    dss_user::fail_disk(&ctx.name, &disks[failed_index], dss_name).await?;
    println!("Disk {failed_name} failed successfully");

    let ls_resp = ctx.send_to_manager("ls", json!({ "user_name": ctx.name })).await?;
    let files_to_recover: Vec<String> = ls_resp
        .data
        .as_ref()
        .and_then(|d| d.get("dsses"))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .find(|d| d["dss_name"].as_str() == Some(dss_name))
        .and_then(|d| d["files"].as_array().cloned())
        .into_iter()
        .flatten()
        .filter_map(|f| f["file_name"].as_str().map(str::to_string))
        .collect();

    for file_name in &files_to_recover {
        dss_user::recover_disk(&ctx.name, &disks, failed_index, dss_name, file_name, n).await?;
        println!("File {file_name} stripe 0 recovered successfully");
    }
    println!("Disk {failed_name} recovered successfully");

    let complete = ctx.send_to_manager("recovery-complete", json!({ "dss_name": dss_name })).await?;
    if complete.is_success() {
        println!("Disk failure simulation completed for DSS {dss_name}");
    } else {
        println!(
            "Recovery completion failed: {}",
            complete.message.unwrap_or_else(|| "Unknown error".into())
        );
    }
    Ok(())
}

async fn handle_decommission_dss(ctx: &Context, parts: &[&str]) -> anyhow::Result<()> {
    if parts.len() != 2 {
        println!("Usage: decommission-dss <dss_name>");
        return Ok(());
    }
    let dss_name = parts[1];
    println!("Decommissioning DSS: {dss_name}");

    let resp = ctx.send_to_manager("decommission-dss", json!({ "dss_name": dss_name })).await?;
    if !resp.is_success() {
        println!("Decommission failed: {}", resp.message.unwrap_or_else(|| "Unknown error".into()));
        return Ok(());
    }

    println!("Performing DSS decommissioning...");
    tokio::time::sleep(std::time::Duration::from_secs(1)).await;

    let complete = ctx.send_to_manager("decommission-complete", json!({ "dss_name": dss_name })).await?;
    if complete.is_success() {
        println!("DSS {dss_name} successfully decommissioned");
    } else {
        println!(
            "Decommission completion failed: {}",
            complete.message.unwrap_or_else(|| "Unknown error".into())
        );
    }
    Ok(())
}

async fn handle_deregister_user(ctx: &Context) -> anyhow::Result<bool> {
    let resp = ctx.send_to_manager("deregister-user", json!({ "user_name": ctx.name })).await?;
    println!("Deregistration: {:?}", resp.status);
    if let Some(message) = &resp.message {
        println!("Message: {message}");
    }
    Ok(resp.is_success())
}
