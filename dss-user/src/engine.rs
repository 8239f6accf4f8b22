//! Fan-out I/O engine: stripes a file across a DSS's disks in parallel,
//! reassembles it on read with parity verification and bounded retry,
//! and drives single-disk failure/recovery. Every disk round-trip goes
//! through [`dss_transport::request`]; callers own the wall-clock file
//! bytes, this module only ever sees `Vec<u8>` blocks.

use std::net::SocketAddr;
use std::time::Duration;

use dss_core::{
    decode_block, encode_block, parity, parity_index, pad, stripe_count, verify, BlockTag,
    DiskContact, Request, Status,
};
use dss_transport::REQUEST_TIMEOUT;
use rand::Rng;
use serde_json::json;

use crate::error::UserError;

const WRITE_STAGGER: Duration = Duration::from_millis(100);
const MAX_READ_ATTEMPTS: u32 = 3;

fn disk_addr(contact: &DiskContact) -> Result<SocketAddr, UserError> {
    format!("{}:{}", contact.ipv4_addr, contact.c_port)
        .parse()
        .map_err(|_| UserError::InvalidDiskAddress(contact.ipv4_addr.clone(), contact.c_port))
}

async fn call_disk(
    contact: &DiskContact,
    req: &Request,
) -> Result<dss_core::Response, UserError> {
    let addr = disk_addr(contact)?;
    dss_transport::request(addr, req, REQUEST_TIMEOUT)
        .await
        .map_err(|source| UserError::Disk {
            disk: contact.disk_name.clone(),
            source,
        })
}

async fn write_block(
    sender: &str,
    contact: &DiskContact,
    command: &str,
    dss_name: &str,
    file_name: &str,
    stripe_num: u64,
    tag: BlockTag,
    data: &[u8],
) -> Result<(), UserError> {
    let req = Request::new(
        command,
        json!({
            "file_name": file_name,
            "dss_name": dss_name,
            "stripe_num": stripe_num,
            "block_type": tag.as_str(),
            "block_data": encode_block(data),
        }),
        Some(sender),
    );
    let resp = call_disk(contact, &req).await?;
    if resp.status != Status::Success {
        return Err(UserError::DiskRejected(
            contact.disk_name.clone(),
            resp.message.unwrap_or_default(),
        ));
    }
    Ok(())
}

async fn read_block(
    sender: &str,
    contact: &DiskContact,
    dss_name: &str,
    file_name: &str,
    stripe_num: u64,
) -> Result<(Vec<u8>, BlockTag), UserError> {
    let req = Request::new(
        "read-block",
        json!({
            "file_name": file_name,
            "dss_name": dss_name,
            "stripe_num": stripe_num,
        }),
        Some(sender),
    );
    let resp = call_disk(contact, &req).await?;
    if resp.status != Status::Success {
        return Err(UserError::DiskRejected(
            contact.disk_name.clone(),
            resp.message.unwrap_or_default(),
        ));
    }
    let data = resp.data.unwrap_or(serde_json::Value::Null);
    let encoded = data["block_data"].as_str().unwrap_or_default();
    let tag_str = data["block_type"].as_str().unwrap_or_default();
    let block = decode_block(encoded)?;
    let tag = if tag_str == "parity" {
        BlockTag::Parity
    } else {
        BlockTag::Data
    };
    Ok((block, tag))
}

/// Write one stripe's blocks to their disks in parallel, staggering the
/// start of each write as the source does.
async fn write_stripe_to_disks(
    sender: &str,
    disks: &[DiskContact],
    dss_name: &str,
    file_name: &str,
    stripe_num: u64,
    blocks: &[Vec<u8>],
    parity_disk: usize,
) -> Result<(), UserError> {
    let mut futs = Vec::with_capacity(disks.len());
    for (i, (disk, block)) in disks.iter().zip(blocks.iter()).enumerate() {
        let tag = if i == parity_disk { BlockTag::Parity } else { BlockTag::Data };
        futs.push(write_block(sender, disk, "write-block", dss_name, file_name, stripe_num, tag, block));
        if i + 1 < disks.len() {
            tokio::time::sleep(WRITE_STAGGER).await;
        }
    }
    let results = futures::future::join_all(futs).await;
    if results.iter().all(Result::is_ok) {
        Ok(())
    } else {
        Err(UserError::StripeWriteFailed(stripe_num))
    }
}

/// Read every disk's block for a stripe in parallel. Returns `Err` if
/// any disk fails to answer successfully.
async fn read_stripe_from_disks(
    sender: &str,
    disks: &[DiskContact],
    dss_name: &str,
    file_name: &str,
    stripe_num: u64,
) -> Result<(Vec<Vec<u8>>, Vec<BlockTag>), UserError> {
    let futs = disks
        .iter()
        .map(|disk| read_block(sender, disk, dss_name, file_name, stripe_num));
    let results = futures::future::join_all(futs).await;

    let mut blocks = Vec::with_capacity(disks.len());
    let mut tags = Vec::with_capacity(disks.len());
    for r in results {
        match r {
            Ok((block, tag)) => {
                blocks.push(block);
                tags.push(tag);
            }
            Err(_) => return Err(UserError::StripeReadFailed(stripe_num)),
        }
    }
    Ok((blocks, tags))
}

/// Stripe `file_data` across `disks` and write every stripe's blocks and
/// rotating parity block to the DSS.
pub async fn copy_file(
    sender: &str,
    disks: &[DiskContact],
    dss_name: &str,
    file_name: &str,
    n: u32,
    striping_unit: u32,
    file_data: &[u8],
) -> Result<(), UserError> {
    let file_size = file_data.len() as u64;
    let num_stripes = stripe_count(file_size, n, striping_unit);
    let data_per_stripe = (n - 1) as u64 * striping_unit as u64;

    for stripe_num in 0..num_stripes {
        let start = (stripe_num * data_per_stripe) as usize;
        let end = ((start as u64 + data_per_stripe).min(file_size)) as usize;
        let stripe_data = &file_data[start..end];

        let mut data_blocks = Vec::with_capacity(n as usize - 1);
        for i in 0..(n as usize - 1) {
            let block_start = i * striping_unit as usize;
            let block_end = (block_start + striping_unit as usize).min(stripe_data.len());
            let raw = if block_start < stripe_data.len() {
                &stripe_data[block_start..block_end]
            } else {
                &[]
            };
            data_blocks.push(pad(raw, striping_unit));
        }

        let parity_block = parity(&data_blocks)?;
        let parity_disk = parity_index(stripe_num, n) as usize;

        let mut stripe_blocks = Vec::with_capacity(n as usize);
        let mut data_iter = data_blocks.into_iter();
        for disk_index in 0..n as usize {
            if disk_index == parity_disk {
                stripe_blocks.push(parity_block.clone());
            } else {
                stripe_blocks.push(data_iter.next().expect("n-1 data blocks for n-1 non-parity disks"));
            }
        }

        write_stripe_to_disks(sender, disks, dss_name, file_name, stripe_num, &stripe_blocks, parity_disk)
            .await?;
        tracing::info!(stripe = stripe_num, total = num_stripes, "stripe written");
    }
    Ok(())
}

/// Read a file back from its DSS, verifying parity per stripe and
/// retrying with error injection disabled after the first attempt.
/// `error_prob` is a percent chance (0-100) of flipping one bit in one
/// block of each stripe's first read attempt, for fault-injection tests.
pub async fn read_file(
    sender: &str,
    disks: &[DiskContact],
    dss_name: &str,
    file_name: &str,
    file_size: u64,
    n: u32,
    striping_unit: u32,
    error_prob: u8,
    rng: &mut impl Rng,
) -> Result<Vec<u8>, UserError> {
    let num_stripes = stripe_count(file_size, n, striping_unit);
    let mut output = Vec::with_capacity((num_stripes * (n as u64 - 1) * striping_unit as u64) as usize);

    for stripe_num in 0..num_stripes {
        let parity_disk = parity_index(stripe_num, n) as usize;
        let mut verified = None;

        for attempt in 0..MAX_READ_ATTEMPTS {
            let (mut blocks, _tags) =
                read_stripe_from_disks(sender, disks, dss_name, file_name, stripe_num).await?;

            if attempt == 0 && error_prob > 0 && rng.gen_range(1..=100) <= error_prob {
                let victim = rng.gen_range(0..blocks.len());
                blocks[victim] = dss_core::inject_flip(&blocks[victim], rng);
                tracing::warn!(stripe = stripe_num, block = victim, "injected bit error");
            }

            let mut data_blocks = Vec::with_capacity(n as usize - 1);
            let mut parity_block = Vec::new();
            for (i, block) in blocks.into_iter().enumerate() {
                if i == parity_disk {
                    parity_block = block;
                } else {
                    data_blocks.push(block);
                }
            }

            if verify(&data_blocks, &parity_block) {
                verified = Some(data_blocks);
                break;
            }
            tracing::warn!(stripe = stripe_num, attempt, "parity verification failed");
        }

        let data_blocks =
            verified.ok_or(UserError::ParityVerificationFailed(stripe_num, MAX_READ_ATTEMPTS))?;
        for block in data_blocks {
            output.extend(block);
        }
    }

    output.truncate(file_size as usize);
    Ok(output)
}

/// Tell a disk it has failed, discarding its in-memory contents for the
/// named DSS.
pub async fn fail_disk(sender: &str, disk: &DiskContact, dss_name: &str) -> Result<(), UserError> {
    let req = Request::new("fail", json!({ "dss_name": dss_name }), Some(sender));
    let resp = call_disk(disk, &req).await?;
    if resp.status != Status::Success {
        return Err(UserError::DiskRejected(disk.disk_name.clone(), resp.message.unwrap_or_default()));
    }
    Ok(())
}

/// Reconstruct stripe 0 of `file_name` onto the failed disk by XOR-ing
/// every remaining disk's block for that stripe. This only recovers
/// stripe 0, matching the documented recovery limitation: files whose
/// data spans more than one stripe keep later stripes unrecovered.
pub async fn recover_disk(
    sender: &str,
    disks: &[DiskContact],
    failed_index: usize,
    dss_name: &str,
    file_name: &str,
    n: u32,
) -> Result<(), UserError> {
    let failed_disk = disks.get(failed_index).ok_or(UserError::DiskIndexOutOfRange(failed_index))?;
    let remaining: Vec<DiskContact> = disks
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != failed_index)
        .map(|(_, d)| d.clone())
        .collect();

    let stripe_num = 0u64;
    let (blocks, _tags) =
        read_stripe_from_disks(sender, &remaining, dss_name, file_name, stripe_num).await?;

    let mut reconstructed = blocks
        .first()
        .cloned()
        .ok_or(UserError::StripeReadFailed(stripe_num))?;
    for block in &blocks[1..] {
        for (a, b) in reconstructed.iter_mut().zip(block.iter()) {
            *a ^= b;
        }
    }

    let parity_disk = parity_index(stripe_num, n) as usize;
    let tag = if failed_index == parity_disk { BlockTag::Parity } else { BlockTag::Data };

    write_block(sender, failed_disk, "recovery-write", dss_name, file_name, stripe_num, tag, &reconstructed).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tokio::net::UdpSocket;

    async fn spawn_disk(store: std::sync::Arc<tokio::sync::Mutex<dss_disk::BlockStore>>) -> DiskContact {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 1 << 20];
            loop {
                let Ok(Some((Some(req), from))) = dss_transport::recv_request(&socket, &mut buf).await else {
                    continue;
                };
                let resp = match req.command.as_str() {
                    "write-block" | "recovery-write" => {
                        let p = &req.parameters;
                        let stripe_num = p["stripe_num"].as_u64().unwrap();
                        let tag = if p["block_type"] == "parity" { BlockTag::Parity } else { BlockTag::Data };
                        let data = decode_block(p["block_data"].as_str().unwrap()).unwrap();
                        store.lock().await.write_block("A", "f", stripe_num, tag, data);
                        dss_core::Response::success(None)
                    }
                    "read-block" => {
                        let p = &req.parameters;
                        let stripe_num = p["stripe_num"].as_u64().unwrap();
                        match store.lock().await.read_block("A", "f", stripe_num) {
                            Ok((data, tag)) => dss_core::Response::success(Some(json!({
                                "block_data": encode_block(&data),
                                "block_type": tag.as_str(),
                            }))),
                            Err(_) => dss_core::Response::failure("Block not found"),
                        }
                    }
                    "fail" => {
                        store.lock().await.fail("A");
                        dss_core::Response::success(None)
                    }
                    _ => dss_core::Response::failure("Unknown command"),
                };
                let _ = dss_transport::reply(&socket, from, &resp).await;
            }
        });
        DiskContact {
            disk_name: "d0".into(),
            ipv4_addr: addr.ip().to_string(),
            c_port: addr.port(),
        }
    }

    #[tokio::test]
    async fn copy_then_read_round_trips_a_small_file() {
        let mut contacts = Vec::new();
        for _ in 0..3 {
            let store = std::sync::Arc::new(tokio::sync::Mutex::new(dss_disk::BlockStore::new()));
            contacts.push(spawn_disk(store).await);
        }

        let data = b"hello distributed storage world!".to_vec();
        copy_file("u1", &contacts, "A", "f", 3, 128, &data).await.unwrap();

        let mut rng = StdRng::seed_from_u64(42);
        let out = read_file("u1", &contacts, "A", "f", data.len() as u64, 3, 128, 0, &mut rng)
            .await
            .unwrap();
        assert_eq!(out, data);
    }

    #[tokio::test]
    async fn read_with_injected_error_still_recovers_via_retry() {
        let mut contacts = Vec::new();
        for _ in 0..3 {
            let store = std::sync::Arc::new(tokio::sync::Mutex::new(dss_disk::BlockStore::new()));
            contacts.push(spawn_disk(store).await);
        }

        let data = b"retry me please".to_vec();
        copy_file("u1", &contacts, "A", "f", 3, 128, &data).await.unwrap();

        let mut rng = StdRng::seed_from_u64(7);
        let out = read_file("u1", &contacts, "A", "f", data.len() as u64, 3, 128, 100, &mut rng)
            .await
            .unwrap();
        assert_eq!(out, data);
    }

    #[tokio::test]
    async fn recover_disk_reconstructs_stripe_zero_after_failure() {
        let mut contacts = Vec::new();
        for _ in 0..3 {
            let store = std::sync::Arc::new(tokio::sync::Mutex::new(dss_disk::BlockStore::new()));
            contacts.push(spawn_disk(store).await);
        }

        let data = b"single stripe payload".to_vec();
        copy_file("u1", &contacts, "A", "f", 3, 128, &data).await.unwrap();

        let (before_blocks, _) = read_stripe_from_disks("u1", &contacts, "A", "f", 0).await.unwrap();

        fail_disk("u1", &contacts[1], "A").await.unwrap();
        recover_disk("u1", &contacts, 1, "A", "f", 3).await.unwrap();

        let (after_blocks, _) = read_stripe_from_disks("u1", &contacts, "A", "f", 0).await.unwrap();
        assert_eq!(after_blocks[1], before_blocks[1]);

        let mut rng = StdRng::seed_from_u64(1);
        let out = read_file("u1", &contacts, "A", "f", data.len() as u64, 3, 128, 0, &mut rng)
            .await
            .unwrap();
        assert_eq!(out, data);
    }
}
