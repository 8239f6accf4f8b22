use thiserror::Error;

/// Every manager-side failure, worded to match the FAILURE message a
/// client actually sees on the wire. The catalogue is part of the
/// contract, not incidental logging.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManagerError {
    #[error("Missing required parameters")]
    MissingParameters,
    #[error("Missing required parameters: file_name, file_size, owner")]
    MissingCopyParameters,
    #[error("Missing required parameters: dss_name, file_name, user_name")]
    MissingReadParameters,
    #[error("Missing required parameter: dss_name")]
    MissingDssName,
    #[error("Missing user name")]
    MissingUserName,
    #[error("Missing disk name")]
    MissingDiskName,
    #[error("Invalid user name")]
    InvalidUserName,
    #[error("Invalid disk name")]
    InvalidDiskName,
    #[error("Invalid DSS name")]
    InvalidDssName,
    #[error("User name already registered")]
    UserNameTaken,
    #[error("Disk name already registered")]
    DiskNameTaken,
    #[error("Port already in use")]
    PortTaken,
    #[error("n must be >= 3")]
    NTooSmall,
    #[error("Invalid striping unit size")]
    StripingUnitOutOfRange,
    #[error("Striping unit must be power of 2")]
    StripingUnitNotPowerOfTwo,
    #[error("DSS name already exists")]
    DssNameTaken,
    #[error("Insufficient free disks")]
    InsufficientFreeDisks,
    #[error("User not registered")]
    UserNotRegistered,
    #[error("No DSSs configured")]
    NoDssConfigured,
    #[error("Copy operation already in progress")]
    CopyInProgress,
    #[error("No copy operation in progress")]
    NoCopyInProgress,
    #[error("DSS not found")]
    DssNotFound,
    #[error("File not found on DSS")]
    FileNotFound,
    #[error("User is not the owner of this file")]
    NotOwner,
    #[error("Read operation not found in progress")]
    ReadOperationNotFound,
    #[error("Read operations in progress - cannot perform disk failure")]
    ReadsInProgress,
    #[error("Disk failure operation already in progress")]
    FailureInProgress,
    #[error("No disk failure operation in progress")]
    NoFailureInProgress,
    #[error("Decommission operation already in progress")]
    DecommissionInProgress,
    #[error("No decommission operation in progress")]
    NoDecommissionInProgress,
    #[error("User not found")]
    UserNotFound,
    #[error("Disk not found")]
    DiskNotFound,
    #[error("Disk is in use (InDSS state)")]
    DiskInUse,
    #[error("Unknown command")]
    UnknownCommand,
}
