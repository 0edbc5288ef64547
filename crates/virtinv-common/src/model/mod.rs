//! Virtualization inventory entities as loaded from the store.
//!
//! Relationships are held as the related entity itself, the way an ORM instance
//! exposes them after a join. The representation layer decides how deep to render
//! them; the entity graph here has no cycles.

pub mod external;

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use mac_address::MacAddress;
use serde::{Deserialize, Serialize};

use crate::choices::{FormFactor, InterfaceMode, VmStatus};
use crate::custom_fields::CustomFields;
use crate::links::ViewName;

pub use external::{DeviceRole, IpAddress, Platform, Site, Tenant, Vlan};

/// The resource kinds this service owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    ClusterType,
    ClusterGroup,
    Cluster,
    VirtualMachine,
    Interface,
}

impl Kind {
    pub fn as_str(self) -> &'static str {
        match self {
            Kind::ClusterType => "cluster_type",
            Kind::ClusterGroup => "cluster_group",
            Kind::Cluster => "cluster",
            Kind::VirtualMachine => "virtual_machine",
            Kind::Interface => "interface",
        }
    }

    pub fn view(self) -> ViewName {
        match self {
            Kind::ClusterType => ViewName::ClusterType,
            Kind::ClusterGroup => ViewName::ClusterGroup,
            Kind::Cluster => ViewName::Cluster,
            Kind::VirtualMachine => ViewName::VirtualMachine,
            Kind::Interface => ViewName::Interface,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterType {
    pub id: u64,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterGroup {
    pub id: u64,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub id: u64,
    pub name: String,
    pub cluster_type: ClusterType,
    pub group: Option<ClusterGroup>,
    pub site: Option<Site>,
    pub comments: String,
    pub custom_fields: CustomFields,
    pub created: NaiveDate,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VirtualMachine {
    pub id: u64,
    pub name: String,
    pub status: VmStatus,
    pub cluster: Cluster,
    pub role: Option<DeviceRole>,
    pub tenant: Option<Tenant>,
    pub platform: Option<Platform>,
    pub primary_ip4: Option<IpAddress>,
    pub primary_ip6: Option<IpAddress>,
    pub vcpus: Option<u16>,
    /// Memory in MB.
    pub memory: Option<u32>,
    /// Disk in GB.
    pub disk: Option<u32>,
    pub comments: String,
    pub custom_fields: CustomFields,
    pub created: NaiveDate,
    pub last_updated: DateTime<Utc>,
}

impl VirtualMachine {
    /// The address clients should use to reach this machine. Never written
    /// directly; it follows `primary_ip4`/`primary_ip6`.
    pub fn primary_ip(&self, prefer_ipv4: bool) -> Option<&IpAddress> {
        if prefer_ipv4 && self.primary_ip4.is_some() {
            return self.primary_ip4.as_ref();
        }
        self.primary_ip6.as_ref().or(self.primary_ip4.as_ref())
    }
}

/// A virtual machine network interface.
#[derive(Debug, Clone, PartialEq)]
pub struct Interface {
    pub id: u64,
    pub name: String,
    pub virtual_machine: VirtualMachine,
    pub form_factor: FormFactor,
    pub enabled: bool,
    pub mac_address: Option<MacAddress>,
    pub mtu: Option<u16>,
    pub mode: Option<InterfaceMode>,
    pub untagged_vlan: Option<Vlan>,
    /// Sorted by id, no duplicates.
    pub tagged_vlans: Vec<Vlan>,
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(id: u64, address: &str) -> IpAddress {
        IpAddress {
            id,
            address: address.parse().unwrap(),
            interface: None,
        }
    }

    fn vm(primary_ip4: Option<IpAddress>, primary_ip6: Option<IpAddress>) -> VirtualMachine {
        let now = Utc::now();
        VirtualMachine {
            id: 1,
            name: "vm1".to_string(),
            status: VmStatus::Active,
            cluster: Cluster {
                id: 1,
                name: "c1".to_string(),
                cluster_type: ClusterType {
                    id: 1,
                    name: "KVM".to_string(),
                    slug: "kvm".to_string(),
                },
                group: None,
                site: None,
                comments: String::new(),
                custom_fields: CustomFields::new(),
                created: now.date_naive(),
                last_updated: now,
            },
            role: None,
            tenant: None,
            platform: None,
            primary_ip4,
            primary_ip6,
            vcpus: None,
            memory: None,
            disk: None,
            comments: String::new(),
            custom_fields: CustomFields::new(),
            created: now.date_naive(),
            last_updated: now,
        }
    }

    #[test]
    fn test_primary_ip_preference() {
        let v4 = ip(1, "192.0.2.10/24");
        let v6 = ip(2, "2001:db8::10/64");

        let both = vm(Some(v4.clone()), Some(v6.clone()));
        assert_eq!(both.primary_ip(false), Some(&v6));
        assert_eq!(both.primary_ip(true), Some(&v4));

        let only_v4 = vm(Some(v4.clone()), None);
        assert_eq!(only_v4.primary_ip(false), Some(&v4));

        let only_v6 = vm(None, Some(v6.clone()));
        assert_eq!(only_v6.primary_ip(true), Some(&v6));

        assert_eq!(vm(None, None).primary_ip(true), None);
    }

    #[test]
    fn test_external_summaries() {
        assert_eq!(ip(1, "2001:db8::1/64").family(), 6);
        let vlan = Vlan {
            id: 3,
            vid: 100,
            name: "servers".to_string(),
        };
        assert_eq!(vlan.display_name(), "100 (servers)");
    }
}
