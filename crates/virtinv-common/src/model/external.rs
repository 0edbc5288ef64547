//! Entities owned by other parts of the inventory. This crate only ever
//! references them; their records arrive through the store.

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    pub id: u64,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRole {
    pub id: u64,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    pub id: u64,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: u64,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpAddress {
    pub id: u64,
    /// Host address with prefix length, e.g. `192.0.2.10/24`.
    pub address: IpNetwork,
    /// Interface the address is assigned to.
    #[serde(default)]
    pub interface: Option<u64>,
}

impl IpAddress {
    pub fn family(&self) -> u8 {
        match self.address {
            IpNetwork::V4(_) => 4,
            IpNetwork::V6(_) => 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vlan {
    pub id: u64,
    pub vid: u16,
    pub name: String,
}

impl Vlan {
    pub fn display_name(&self) -> String {
        format!("{} ({})", self.vid, self.name)
    }
}
