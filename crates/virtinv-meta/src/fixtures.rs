use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use virtinv_common::{DeviceRole, IpAddress, Platform, Site, Tenant, Vlan};

/// Objects owned by other parts of the inventory that virtualization
/// resources point at. They are loaded once and only read afterwards,
/// except for IP address interface assignments.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Fixtures {
    pub sites: Vec<Site>,
    pub device_roles: Vec<DeviceRole>,
    pub platforms: Vec<Platform>,
    pub tenants: Vec<Tenant>,
    pub ip_addresses: Vec<IpAddress>,
    pub vlans: Vec<Vlan>,
}

impl Fixtures {
    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read fixtures from {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse fixtures in {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sections_are_optional() {
        let f: Fixtures = serde_json::from_str(
            r#"{"sites": [{"id": 1, "name": "DC1", "slug": "dc1"}],
                "ip_addresses": [{"id": 9, "address": "10.0.0.5/24"}]}"#,
        )
        .unwrap();
        assert_eq!(f.sites.len(), 1);
        assert!(f.vlans.is_empty());
        assert_eq!(f.ip_addresses[0].family(), 4);
        assert_eq!(f.ip_addresses[0].interface, None);
    }
}
