//! Typed views over each command's `parameters` object. Fields are
//! `Option` so a missing key deserializes to `None` instead of failing
//! the whole frame, matching the source's `params.get(...)` + `all([...])`
//! presence check.

use serde::Deserialize;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct RegisterUserParams {
    pub user_name: Option<String>,
    pub ipv4_addr: Option<String>,
    pub m_port: Option<u16>,
    pub c_port: Option<u16>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct RegisterDiskParams {
    pub disk_name: Option<String>,
    pub ipv4_addr: Option<String>,
    pub m_port: Option<u16>,
    pub c_port: Option<u16>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ConfigureDssParams {
    pub dss_name: Option<String>,
    pub n: Option<u32>,
    pub striping_unit: Option<u32>,
    pub user_name: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct LsParams {
    pub user_name: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct CopyParams {
    pub file_name: Option<String>,
    pub file_size: Option<u64>,
    pub owner: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct CopyCompleteParams {
    pub file_name: Option<String>,
    pub file_size: Option<u64>,
    pub owner: Option<String>,
    pub dss_name: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ReadParams {
    pub dss_name: Option<String>,
    pub file_name: Option<String>,
    pub user_name: Option<String>,
}

pub type ReadCompleteParams = ReadParams;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct DssNameParams {
    pub dss_name: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct UserNameParams {
    pub user_name: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct DiskNameParams {
    pub disk_name: Option<String>,
}
