//! Manager state machine: registries, DSS directory, and the four
//! critical sections. The manager process is logically single-threaded —
//! every method here takes `&mut self` and assumes the caller has already
//! serialized access (a single `tokio::sync::Mutex<ManagerState>` in the
//! binary). No method suspends.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use dss_core::{is_valid_name, is_valid_striping_unit, DiskContact, DiskInfo, DiskState, DssConfig, FileEntry, UserInfo};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde_json::{json, Value};

use crate::error::ManagerError;
use crate::params::*;

/// How long the copy critical section may be held before the manager
/// unilaterally releases it for a new requester.
const COPY_WATCHDOG: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
struct ReadOp {
    dss_name: String,
    file_name: String,
    user_name: String,
}

pub struct ManagerState {
    users: BTreeMap<String, UserInfo>,
    disks: BTreeMap<String, DiskInfo>,
    dsses: BTreeMap<String, DssConfig>,
    copy_started: Option<Instant>,
    reads_in_progress: Vec<ReadOp>,
    failure_in_progress: bool,
    decommission_in_progress: bool,
    dss_selection_index: u64,
    rng: StdRng,
}

impl ManagerState {
    /// Build a manager with OS-seeded randomness, for production use.
    pub fn new() -> Self {
        ManagerState::with_rng(StdRng::from_entropy())
    }

    /// Build a manager with an explicitly seeded RNG, for reproducible tests.
    pub fn with_seed(seed: u64) -> Self {
        ManagerState::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        ManagerState {
            users: BTreeMap::new(),
            disks: BTreeMap::new(),
            dsses: BTreeMap::new(),
            copy_started: None,
            reads_in_progress: Vec::new(),
            failure_in_progress: false,
            decommission_in_progress: false,
            dss_selection_index: 0,
            rng,
        }
    }

    fn port_taken(&self, m_port: u16, c_port: u16) -> bool {
        self.users.values().any(|u| u.m_port == m_port || u.c_port == c_port)
            || self.disks.values().any(|d| d.m_port == m_port || d.c_port == c_port)
    }

    fn disk_contacts(&self, names: &[String]) -> Vec<DiskContact> {
        names
            .iter()
            .filter_map(|name| self.disks.get(name))
            .map(|d| DiskContact {
                disk_name: d.name.clone(),
                ipv4_addr: d.addr.clone(),
                c_port: d.c_port,
            })
            .collect()
    }

    fn dss_layout_json(&self, dss: &DssConfig) -> Value {
        json!({
            "dss_name": dss.name,
            "n": dss.n,
            "striping_unit": dss.striping_unit,
            "disks": self.disk_contacts(&dss.disks),
        })
    }

    pub fn register_user(&mut self, p: RegisterUserParams) -> Result<Value, ManagerError> {
        let (Some(name), Some(addr), Some(m_port), Some(c_port)) =
            (p.user_name, p.ipv4_addr, p.m_port, p.c_port)
        else {
            return Err(ManagerError::MissingParameters);
        };

        if !is_valid_name(&name) {
            return Err(ManagerError::InvalidUserName);
        }
        if self.users.contains_key(&name) {
            return Err(ManagerError::UserNameTaken);
        }
        if self.port_taken(m_port, c_port) {
            return Err(ManagerError::PortTaken);
        }

        self.users.insert(
            name.clone(),
            UserInfo {
                name,
                addr,
                m_port,
                c_port,
            },
        );
        Ok(Value::Null)
    }

    pub fn register_disk(&mut self, p: RegisterDiskParams) -> Result<Value, ManagerError> {
        let (Some(name), Some(addr), Some(m_port), Some(c_port)) =
            (p.disk_name, p.ipv4_addr, p.m_port, p.c_port)
        else {
            return Err(ManagerError::MissingParameters);
        };

        if !is_valid_name(&name) {
            return Err(ManagerError::InvalidDiskName);
        }
        if self.disks.contains_key(&name) {
            return Err(ManagerError::DiskNameTaken);
        }
        if self.port_taken(m_port, c_port) {
            return Err(ManagerError::PortTaken);
        }

        self.disks.insert(
            name.clone(),
            DiskInfo {
                name,
                addr,
                m_port,
                c_port,
                state: DiskState::Free,
                dss: None,
            },
        );
        Ok(Value::Null)
    }

    pub fn configure_dss(&mut self, p: ConfigureDssParams) -> Result<Value, ManagerError> {
        let (Some(dss_name), Some(n), Some(striping_unit), Some(user_name)) =
            (p.dss_name, p.n, p.striping_unit, p.user_name)
        else {
            return Err(ManagerError::MissingParameters);
        };

        if !is_valid_name(&dss_name) {
            return Err(ManagerError::InvalidDssName);
        }
        if n < 3 {
            return Err(ManagerError::NTooSmall);
        }
        if !(128..=1_048_576).contains(&striping_unit) {
            return Err(ManagerError::StripingUnitOutOfRange);
        }
        if !is_valid_striping_unit(striping_unit) {
            return Err(ManagerError::StripingUnitNotPowerOfTwo);
        }
        if self.dsses.contains_key(&dss_name) {
            return Err(ManagerError::DssNameTaken);
        }

        let mut free: Vec<String> = self
            .disks
            .values()
            .filter(|d| d.state == DiskState::Free)
            .map(|d| d.name.clone())
            .collect();

        if (free.len() as u32) < n {
            return Err(ManagerError::InsufficientFreeDisks);
        }

        free.shuffle(&mut self.rng);
        let selected: Vec<String> = free.into_iter().take(n as usize).collect();

        for disk_name in &selected {
            if let Some(disk) = self.disks.get_mut(disk_name) {
                disk.state = DiskState::InDss;
                disk.dss = Some(dss_name.clone());
            }
        }

        self.dsses.insert(
            dss_name.clone(),
            DssConfig {
                name: dss_name,
                n,
                striping_unit,
                disks: selected,
                owner: user_name,
                files: Vec::new(),
            },
        );
        Ok(Value::Null)
    }

    pub fn list_files(&self, p: LsParams) -> Result<Value, ManagerError> {
        let user_name = p.user_name.ok_or(ManagerError::MissingUserName)?;
        if !self.users.contains_key(&user_name) {
            return Err(ManagerError::UserNotRegistered);
        }
        if self.dsses.is_empty() {
            return Err(ManagerError::NoDssConfigured);
        }

        let dsses: Vec<Value> = self
            .dsses
            .values()
            .map(|dss| {
                let files: Vec<Value> = dss
                    .files
                    .iter()
                    .map(|f| json!({"file_name": f.name, "file_size": f.size, "owner": f.owner}))
                    .collect();
                json!({
                    "dss_name": dss.name,
                    "n": dss.n,
                    "striping_unit": dss.striping_unit,
                    "disks": self.disk_contacts(&dss.disks),
                    "files": files,
                })
            })
            .collect();

        Ok(json!({ "dsses": dsses }))
    }

    pub fn copy(&mut self, p: CopyParams) -> Result<Value, ManagerError> {
        if self.dsses.is_empty() {
            return Err(ManagerError::NoDssConfigured);
        }

        if let Some(started) = self.copy_started {
            if started.elapsed() > COPY_WATCHDOG {
                tracing::warn!("copy operation timed out, resetting critical section");
                self.copy_started = None;
            } else {
                return Err(ManagerError::CopyInProgress);
            }
        }

        let (Some(file_name), Some(_file_size), Some(_owner)) = (p.file_name, p.file_size, p.owner) else {
            return Err(ManagerError::MissingCopyParameters);
        };

        let dss_names: Vec<&String> = self.dsses.keys().collect();
        let idx = (self.dss_selection_index % dss_names.len() as u64) as usize;
        let selected_name = dss_names[idx].clone();
        self.dss_selection_index += 1;

        self.copy_started = Some(Instant::now());

        let dss = &self.dsses[&selected_name];
        tracing::info!(dss = %selected_name, file = %file_name, "copy phase 1: DSS selected");
        Ok(self.dss_layout_json(dss))
    }

    pub fn copy_complete(&mut self, p: CopyCompleteParams) -> Result<Value, ManagerError> {
        if self.copy_started.is_none() {
            return Err(ManagerError::NoCopyInProgress);
        }

        let (Some(file_name), Some(file_size), Some(owner), Some(dss_name)) =
            (p.file_name, p.file_size, p.owner, p.dss_name)
        else {
            return Err(ManagerError::MissingParameters);
        };

        let Some(dss) = self.dsses.get_mut(&dss_name) else {
            self.copy_started = None;
            return Err(ManagerError::DssNotFound);
        };

        dss.files.retain(|f| f.name != file_name);
        dss.files.push(FileEntry {
            name: file_name,
            size: file_size,
            owner,
        });

        self.copy_started = None;
        Ok(Value::Null)
    }

    pub fn read(&mut self, p: ReadParams) -> Result<Value, ManagerError> {
        let (Some(dss_name), Some(file_name), Some(user_name)) = (p.dss_name, p.file_name, p.user_name) else {
            return Err(ManagerError::MissingReadParameters);
        };

        let Some(dss) = self.dsses.get(&dss_name) else {
            return Err(ManagerError::DssNotFound);
        };

        let Some(file) = dss.files.iter().find(|f| f.name == file_name) else {
            return Err(ManagerError::FileNotFound);
        };

        if file.owner != user_name {
            return Err(ManagerError::NotOwner);
        }

        let file_size = file.size;
        let n = dss.n;
        let striping_unit = dss.striping_unit;
        let disks = self.disk_contacts(&dss.disks);

        self.reads_in_progress.push(ReadOp {
            dss_name: dss_name.clone(),
            file_name: file_name.clone(),
            user_name: user_name.clone(),
        });

        Ok(json!({
            "dss_name": dss_name,
            "file_size": file_size,
            "n": n,
            "striping_unit": striping_unit,
            "disks": disks,
        }))
    }

    pub fn read_complete(&mut self, p: ReadCompleteParams) -> Result<Value, ManagerError> {
        let (Some(dss_name), Some(file_name), Some(user_name)) = (p.dss_name, p.file_name, p.user_name) else {
            return Err(ManagerError::MissingParameters);
        };

        let before = self.reads_in_progress.len();
        self.reads_in_progress.retain(|op| {
            !(op.dss_name == dss_name && op.file_name == file_name && op.user_name == user_name)
        });

        if self.reads_in_progress.len() == before {
            return Err(ManagerError::ReadOperationNotFound);
        }
        Ok(Value::Null)
    }

    pub fn disk_failure(&mut self, p: DssNameParams) -> Result<Value, ManagerError> {
        let dss_name = p.dss_name.ok_or(ManagerError::MissingDssName)?;
        let Some(dss) = self.dsses.get(&dss_name) else {
            return Err(ManagerError::DssNotFound);
        };
        if !self.reads_in_progress.is_empty() {
            return Err(ManagerError::ReadsInProgress);
        }
        if self.failure_in_progress {
            return Err(ManagerError::FailureInProgress);
        }

        self.failure_in_progress = true;
        Ok(self.dss_layout_json(dss))
    }

    pub fn recovery_complete(&mut self, p: DssNameParams) -> Result<Value, ManagerError> {
        let dss_name = p.dss_name.ok_or(ManagerError::MissingDssName)?;
        if !self.failure_in_progress {
            return Err(ManagerError::NoFailureInProgress);
        }
        if !self.dsses.contains_key(&dss_name) {
            self.failure_in_progress = false;
            return Err(ManagerError::DssNotFound);
        }
        self.failure_in_progress = false;
        Ok(Value::Null)
    }

    pub fn decommission_dss(&mut self, p: DssNameParams) -> Result<Value, ManagerError> {
        let dss_name = p.dss_name.ok_or(ManagerError::MissingDssName)?;
        let Some(dss) = self.dsses.get(&dss_name) else {
            return Err(ManagerError::DssNotFound);
        };
        if self.decommission_in_progress {
            return Err(ManagerError::DecommissionInProgress);
        }

        self.decommission_in_progress = true;
        Ok(self.dss_layout_json(dss))
    }

    pub fn decommission_complete(&mut self, p: DssNameParams) -> Result<Value, ManagerError> {
        let dss_name = p.dss_name.ok_or(ManagerError::MissingDssName)?;
        if !self.decommission_in_progress {
            return Err(ManagerError::NoDecommissionInProgress);
        }
        let Some(dss) = self.dsses.remove(&dss_name) else {
            self.decommission_in_progress = false;
            return Err(ManagerError::DssNotFound);
        };

        for disk_name in &dss.disks {
            if let Some(disk) = self.disks.get_mut(disk_name) {
                disk.state = DiskState::Free;
                disk.dss = None;
            }
        }

        self.decommission_in_progress = false;
        Ok(Value::Null)
    }

    pub fn deregister_user(&mut self, p: UserNameParams) -> Result<Value, ManagerError> {
        let user_name = p.user_name.ok_or(ManagerError::MissingUserName)?;
        if self.users.remove(&user_name).is_none() {
            return Err(ManagerError::UserNotFound);
        }
        Ok(Value::Null)
    }

    pub fn deregister_disk(&mut self, p: DiskNameParams) -> Result<Value, ManagerError> {
        let disk_name = p.disk_name.ok_or(ManagerError::MissingDiskName)?;
        let Some(disk) = self.disks.get(&disk_name) else {
            return Err(ManagerError::DiskNotFound);
        };
        if disk.state != DiskState::Free {
            return Err(ManagerError::DiskInUse);
        }
        self.disks.remove(&disk_name);
        Ok(Value::Null)
    }
}

impl Default for ManagerState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register_disks(mgr: &mut ManagerState, names: &[&str], start_port: u16) {
        for (i, name) in names.iter().enumerate() {
            mgr.register_disk(RegisterDiskParams {
                disk_name: Some(name.to_string()),
                ipv4_addr: Some("127.0.0.1".into()),
                m_port: Some(start_port + i as u16 * 2),
                c_port: Some(start_port + i as u16 * 2 + 1),
            })
            .unwrap();
        }
    }

    #[test]
    fn register_user_rejects_duplicate_name_and_port() {
        let mut mgr = ManagerState::with_seed(1);
        mgr.register_user(RegisterUserParams {
            user_name: Some("u1".into()),
            ipv4_addr: Some("127.0.0.1".into()),
            m_port: Some(9000),
            c_port: Some(9001),
        })
        .unwrap();

        let dup = mgr.register_user(RegisterUserParams {
            user_name: Some("u1".into()),
            ipv4_addr: Some("127.0.0.1".into()),
            m_port: Some(9002),
            c_port: Some(9003),
        });
        assert_eq!(dup.unwrap_err(), ManagerError::UserNameTaken);

        let port_conflict = mgr.register_user(RegisterUserParams {
            user_name: Some("u2".into()),
            ipv4_addr: Some("127.0.0.1".into()),
            m_port: Some(9000),
            c_port: Some(9005),
        });
        assert_eq!(port_conflict.unwrap_err(), ManagerError::PortTaken);
    }

    #[test]
    fn configure_dss_validates_every_field() {
        let mut mgr = ManagerState::with_seed(2);
        register_disks(&mut mgr, &["d1", "d2", "d3"], 9100);

        assert_eq!(
            mgr.configure_dss(ConfigureDssParams {
                dss_name: Some("A".into()),
                n: Some(2),
                striping_unit: Some(128),
                user_name: Some("u1".into()),
            })
            .unwrap_err(),
            ManagerError::NTooSmall
        );

        assert_eq!(
            mgr.configure_dss(ConfigureDssParams {
                dss_name: Some("A".into()),
                n: Some(3),
                striping_unit: Some(200),
                user_name: Some("u1".into()),
            })
            .unwrap_err(),
            ManagerError::StripingUnitNotPowerOfTwo
        );

        assert_eq!(
            mgr.configure_dss(ConfigureDssParams {
                dss_name: Some("A".into()),
                n: Some(4),
                striping_unit: Some(128),
                user_name: Some("u1".into()),
            })
            .unwrap_err(),
            ManagerError::InsufficientFreeDisks
        );

        mgr.configure_dss(ConfigureDssParams {
            dss_name: Some("A".into()),
            n: Some(3),
            striping_unit: Some(128),
            user_name: Some("u1".into()),
        })
        .unwrap();

        assert_eq!(
            mgr.configure_dss(ConfigureDssParams {
                dss_name: Some("A".into()),
                n: Some(3),
                striping_unit: Some(128),
                user_name: Some("u1".into()),
            })
            .unwrap_err(),
            ManagerError::DssNameTaken
        );
    }

    fn setup_one_dss(mgr: &mut ManagerState, dss_name: &str, disks: &[&str], port_base: u16) {
        register_disks(mgr, disks, port_base);
        mgr.configure_dss(ConfigureDssParams {
            dss_name: Some(dss_name.into()),
            n: Some(disks.len() as u32),
            striping_unit: Some(128),
            user_name: Some("owner".into()),
        })
        .unwrap();
    }

    #[test]
    fn copy_mutual_exclusion_and_completion() {
        let mut mgr = ManagerState::with_seed(3);
        mgr.register_user(RegisterUserParams {
            user_name: Some("owner".into()),
            ipv4_addr: Some("127.0.0.1".into()),
            m_port: Some(8000),
            c_port: Some(8001),
        })
        .unwrap();
        setup_one_dss(&mut mgr, "A", &["d1", "d2", "d3"], 9200);

        let resp = mgr
            .copy(CopyParams {
                file_name: Some("f".into()),
                file_size: Some(100),
                owner: Some("owner".into()),
            })
            .unwrap();
        let dss_name = resp["dss_name"].as_str().unwrap().to_string();

        // Second copy before copy-complete: rejected.
        let second = mgr.copy(CopyParams {
            file_name: Some("g".into()),
            file_size: Some(50),
            owner: Some("owner".into()),
        });
        assert_eq!(second.unwrap_err(), ManagerError::CopyInProgress);

        mgr.copy_complete(CopyCompleteParams {
            file_name: Some("f".into()),
            file_size: Some(100),
            owner: Some("owner".into()),
            dss_name: Some(dss_name),
        })
        .unwrap();

        // Now a new copy succeeds.
        mgr.copy(CopyParams {
            file_name: Some("g".into()),
            file_size: Some(50),
            owner: Some("owner".into()),
        })
        .unwrap();
    }

    #[test]
    fn read_requires_ownership() {
        let mut mgr = ManagerState::with_seed(4);
        for user in ["u1", "u2"] {
            mgr.register_user(RegisterUserParams {
                user_name: Some(user.into()),
                ipv4_addr: Some("127.0.0.1".into()),
                m_port: Some(8100 + user.len() as u16),
                c_port: Some(8200 + user.len() as u16),
            })
            .unwrap();
        }
        setup_one_dss(&mut mgr, "A", &["d1", "d2", "d3"], 9300);

        let resp = mgr
            .copy(CopyParams {
                file_name: Some("f".into()),
                file_size: Some(10),
                owner: Some("u1".into()),
            })
            .unwrap();
        let dss_name = resp["dss_name"].as_str().unwrap().to_string();
        mgr.copy_complete(CopyCompleteParams {
            file_name: Some("f".into()),
            file_size: Some(10),
            owner: Some("u1".into()),
            dss_name: Some(dss_name.clone()),
        })
        .unwrap();

        let not_owner = mgr.read(ReadParams {
            dss_name: Some(dss_name.clone()),
            file_name: Some("f".into()),
            user_name: Some("u2".into()),
        });
        assert_eq!(not_owner.unwrap_err(), ManagerError::NotOwner);

        mgr.read(ReadParams {
            dss_name: Some(dss_name.clone()),
            file_name: Some("f".into()),
            user_name: Some("u1".into()),
        })
        .unwrap();

        // A disk failure is rejected while the read above is outstanding.
        assert_eq!(
            mgr.disk_failure(DssNameParams {
                dss_name: Some(dss_name)
            })
            .unwrap_err(),
            ManagerError::ReadsInProgress
        );
    }

    #[test]
    fn round_robin_selects_dsses_in_lexicographic_order() {
        let mut mgr = ManagerState::with_seed(5);
        mgr.register_user(RegisterUserParams {
            user_name: Some("owner".into()),
            ipv4_addr: Some("127.0.0.1".into()),
            m_port: Some(7000),
            c_port: Some(7001),
        })
        .unwrap();
        register_disks(&mut mgr, &["d1", "d2", "d3", "d4", "d5", "d6"], 9400);
        mgr.configure_dss(ConfigureDssParams {
            dss_name: Some("B".into()),
            n: Some(3),
            striping_unit: Some(128),
            user_name: Some("owner".into()),
        })
        .unwrap();
        mgr.configure_dss(ConfigureDssParams {
            dss_name: Some("A".into()),
            n: Some(3),
            striping_unit: Some(128),
            user_name: Some("owner".into()),
        })
        .unwrap();

        let mut selections = Vec::new();
        for i in 0..4 {
            let resp = mgr
                .copy(CopyParams {
                    file_name: Some(format!("f{i}")),
                    file_size: Some(1),
                    owner: Some("owner".into()),
                })
                .unwrap();
            let dss_name = resp["dss_name"].as_str().unwrap().to_string();
            mgr.copy_complete(CopyCompleteParams {
                file_name: Some(format!("f{i}")),
                file_size: Some(1),
                owner: Some("owner".into()),
                dss_name: Some(dss_name.clone()),
            })
            .unwrap();
            selections.push(dss_name);
        }

        assert_eq!(selections, vec!["A", "B", "A", "B"]);
    }

    #[test]
    fn deregister_disk_requires_free_state() {
        let mut mgr = ManagerState::with_seed(6);
        register_disks(&mut mgr, &["d1", "d2", "d3"], 9500);
        mgr.configure_dss(ConfigureDssParams {
            dss_name: Some("A".into()),
            n: Some(3),
            striping_unit: Some(128),
            user_name: Some("owner".into()),
        })
        .unwrap();

        assert_eq!(
            mgr.deregister_disk(DiskNameParams {
                disk_name: Some("d1".into())
            })
            .unwrap_err(),
            ManagerError::DiskInUse
        );
    }
}
