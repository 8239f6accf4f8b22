use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiskError {
    #[error("Missing required parameters")]
    MissingParameters,
    #[error("Missing DSS name")]
    MissingDssName,
    #[error("Block not found")]
    BlockNotFound,
}
