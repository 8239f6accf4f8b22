use thiserror::Error;

#[derive(Error, Debug)]
pub enum UserError {
    #[error("invalid disk address {0}:{1}")]
    InvalidDiskAddress(String, u16),
    #[error("transport error talking to disk {disk}: {source}")]
    Disk {
        disk: String,
        #[source]
        source: dss_transport::TransportError,
    },
    #[error("disk {0} rejected the request: {1}")]
    DiskRejected(String, String),
    #[error("stripe {0} failed to write to every disk")]
    StripeWriteFailed(u64),
    #[error("stripe {0} failed to read from every disk")]
    StripeReadFailed(u64),
    #[error("stripe {0} failed parity verification after {1} attempts")]
    ParityVerificationFailed(u64, u32),
    #[error("wire codec error: {0}")]
    Wire(#[from] dss_core::WireError),
    #[error("no disk in the layout at index {0}")]
    DiskIndexOutOfRange(usize),
    #[error("stripe codec error: {0}")]
    Stripe(#[from] dss_core::StripeError),
}
