//! Registry and directory entities owned by the manager, plus the block
//! tag shared between disk and user wire messages.

use serde::{Deserialize, Serialize};

/// A registered user process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub name: String,
    pub addr: String,
    pub m_port: u16,
    pub c_port: u16,
}

/// Lifecycle state of a registered disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiskState {
    Free,
    InDss,
}

/// A registered disk process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskInfo {
    pub name: String,
    pub addr: String,
    pub m_port: u16,
    pub c_port: u16,
    pub state: DiskState,
    /// Set when `state == InDss`.
    pub dss: Option<String>,
}

/// A single file's directory entry within a DSS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    pub size: u64,
    pub owner: String,
}

/// A configured distributed storage system: `n` disks in a fixed order
/// sharing one striping unit, plus its file directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DssConfig {
    pub name: String,
    pub n: u32,
    pub striping_unit: u32,
    /// Ordered disk names; index in this list is the disk index used by
    /// `parity_index`.
    pub disks: Vec<String>,
    pub owner: String,
    pub files: Vec<FileEntry>,
}

/// Contact details for one disk, as handed to a user in a DSS layout response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskContact {
    pub disk_name: String,
    pub ipv4_addr: String,
    pub c_port: u16,
}

/// The DSS layout a user needs to perform fan-out I/O: ordered disk
/// contacts plus the striping parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DssLayout {
    pub dss_name: String,
    pub n: u32,
    pub striping_unit: u32,
    pub disks: Vec<DiskContact>,
}

/// Tag distinguishing a data block from the rotating parity block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockTag {
    Data,
    Parity,
}

impl BlockTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockTag::Data => "data",
            BlockTag::Parity => "parity",
        }
    }
}

/// Validate an entity name: 1-15 alphanumeric characters.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name.len() <= 15 && name.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Validate a striping unit: a power of two in `[128, 1_048_576]`.
pub fn is_valid_striping_unit(unit: u32) -> bool {
    (128..=1_048_576).contains(&unit) && unit.is_power_of_two()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_validation() {
        assert!(is_valid_name("disk1"));
        assert!(is_valid_name("A"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("this-name-has-dashes"));
        assert!(!is_valid_name("waytoolongofanamefortheregistry"));
    }

    #[test]
    fn striping_unit_validation() {
        assert!(is_valid_striping_unit(128));
        assert!(is_valid_striping_unit(1_048_576));
        assert!(is_valid_striping_unit(4096));
        assert!(!is_valid_striping_unit(127));
        assert!(!is_valid_striping_unit(1_048_577));
        assert!(!is_valid_striping_unit(200)); // not a power of two
    }
}
