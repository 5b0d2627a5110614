mod client;
mod factory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cli::output::{Record, Tabular};

pub use client::ApiClient;
pub use factory::{build, DEFAULT_ENDPOINT, DEFAULT_TIMEOUT_MINUTES};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("API request failed with HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("API request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected API response: {0}")]
    Decode(String),

    #[error("invalid request URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("cannot sign request: {0}")]
    Signing(String),
}

// -- Resources ----------------------------------------------------------------
//
// The API speaks kebab-case; everything printed by the CLI is lower_snake.

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all(deserialize = "kebab-case"))]
pub struct Instance {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Not part of the API payload; filled in from the zone that was queried.
    #[serde(default)]
    pub zone: String,
    #[serde(default)]
    pub state: String,
    #[serde(default, rename(serialize = "ip_address", deserialize = "public-ip"))]
    pub public_ip: Option<String>,
    #[serde(default)]
    pub instance_type: Option<ResourceRef>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Tabular for Instance {
    const HEADERS: &'static [&'static str] = &["ID", "NAME", "ZONE", "STATE", "IP ADDRESS"];

    fn row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.name.clone(),
            self.zone.clone(),
            self.state.clone(),
            self.public_ip.clone().unwrap_or_else(|| "-".into()),
        ]
    }
}

impl Record for Instance {
    fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("ID", self.id.clone()),
            ("Name", self.name.clone()),
            ("Zone", self.zone.clone()),
            (
                "Type",
                self.instance_type
                    .as_ref()
                    .map(|t| t.id.clone())
                    .unwrap_or_else(|| "-".into()),
            ),
            (
                "IP Address",
                self.public_ip.clone().unwrap_or_else(|| "-".into()),
            ),
            ("State", self.state.clone()),
            (
                "Creation Date",
                self.created_at.clone().unwrap_or_else(|| "-".into()),
            ),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all(deserialize = "kebab-case"))]
pub struct DnsDomain {
    pub id: String,
    #[serde(default, rename(deserialize = "unicode-name"))]
    pub name: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Tabular for DnsDomain {
    const HEADERS: &'static [&'static str] = &["ID", "NAME", "CREATED AT"];

    fn row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.name.clone(),
            self.created_at.clone().unwrap_or_default(),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub record_type: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub ttl: Option<u64>,
}

impl Tabular for DnsRecord {
    const HEADERS: &'static [&'static str] = &["ID", "NAME", "TYPE", "CONTENT", "TTL"];

    fn row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.name.clone(),
            self.record_type.clone(),
            self.content.clone(),
            self.ttl.map(|t| t.to_string()).unwrap_or_default(),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbaasService {
    pub name: String,
    #[serde(default, rename = "type")]
    pub service_type: String,
    #[serde(default)]
    pub plan: String,
    #[serde(default)]
    pub state: String,
}

impl Tabular for DbaasService {
    const HEADERS: &'static [&'static str] = &["NAME", "TYPE", "PLAN", "STATE"];

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.service_type.clone(),
            self.plan.clone(),
            self.state.clone(),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IamRole {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub editable: bool,
}

impl Tabular for IamRole {
    const HEADERS: &'static [&'static str] = &["ID", "NAME", "DESCRIPTION", "EDITABLE"];

    fn row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.name.clone(),
            self.description.clone(),
            self.editable.to_string(),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketUsage {
    pub name: String,
    #[serde(default, rename(deserialize = "zone-name"))]
    pub zone: String,
    /// Bytes.
    #[serde(default)]
    pub size: u64,
}

impl Tabular for BucketUsage {
    const HEADERS: &'static [&'static str] = &["NAME", "ZONE", "SIZE"];

    fn row(&self) -> Vec<String> {
        vec![self.name.clone(), self.zone.clone(), human_size(self.size)]
    }
}

fn human_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB", "PiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

// -- Capabilities -------------------------------------------------------------

#[async_trait]
pub trait InstanceLister: Send + Sync {
    async fn list_instances(&self, zone: &str) -> Result<Vec<Instance>, ApiError>;
    async fn get_instance(&self, zone: &str, id: &str) -> Result<Instance, ApiError>;
}

#[async_trait]
pub trait DomainLister: Send + Sync {
    async fn list_dns_domains(&self, zone: &str) -> Result<Vec<DnsDomain>, ApiError>;
    async fn list_dns_records(&self, zone: &str, domain_id: &str)
        -> Result<Vec<DnsRecord>, ApiError>;
}

#[async_trait]
pub trait DatabaseLister: Send + Sync {
    async fn list_dbaas_services(&self, zone: &str) -> Result<Vec<DbaasService>, ApiError>;
}

#[async_trait]
pub trait RoleLister: Send + Sync {
    async fn list_iam_roles(&self, zone: &str) -> Result<Vec<IamRole>, ApiError>;
}

#[async_trait]
pub trait BucketLister: Send + Sync {
    async fn list_bucket_usage(&self, zone: &str) -> Result<Vec<BucketUsage>, ApiError>;
}

/// Everything a command body may ask of the provider.
pub trait CloudApi: InstanceLister + DomainLister + DatabaseLister + RoleLister + BucketLister {}

impl<T> CloudApi for T where
    T: InstanceLister + DomainLister + DatabaseLister + RoleLister + BucketLister
{
}
