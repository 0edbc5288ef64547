//! Nested forms of entities served elsewhere.
//!
//! IP addresses and VLANs get local summary types instead of the IPAM nested
//! forms: the IPAM side embeds virtual machines and interfaces, so borrowing its
//! types would tie the two domains into a loop.

use serde::Serialize;

use crate::links::{LinkResolver, ViewName};
use crate::model::{DeviceRole, IpAddress, Platform, Site, Tenant, Vlan};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NestedSite {
    pub id: u64,
    pub url: String,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NestedDeviceRole {
    pub id: u64,
    pub url: String,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NestedPlatform {
    pub id: u64,
    pub url: String,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NestedTenant {
    pub id: u64,
    pub url: String,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VirtualMachineIpAddress {
    pub id: u64,
    pub url: String,
    pub family: u8,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceVlan {
    pub id: u64,
    pub url: String,
    pub vid: u16,
    pub name: String,
    pub display_name: String,
}

impl Site {
    pub fn to_nested(&self, links: &LinkResolver) -> NestedSite {
        NestedSite {
            id: self.id,
            url: links.detail(ViewName::Site, self.id),
            name: self.name.clone(),
            slug: self.slug.clone(),
        }
    }
}

impl DeviceRole {
    pub fn to_nested(&self, links: &LinkResolver) -> NestedDeviceRole {
        NestedDeviceRole {
            id: self.id,
            url: links.detail(ViewName::DeviceRole, self.id),
            name: self.name.clone(),
            slug: self.slug.clone(),
        }
    }
}

impl Platform {
    pub fn to_nested(&self, links: &LinkResolver) -> NestedPlatform {
        NestedPlatform {
            id: self.id,
            url: links.detail(ViewName::Platform, self.id),
            name: self.name.clone(),
            slug: self.slug.clone(),
        }
    }
}

impl Tenant {
    pub fn to_nested(&self, links: &LinkResolver) -> NestedTenant {
        NestedTenant {
            id: self.id,
            url: links.detail(ViewName::Tenant, self.id),
            name: self.name.clone(),
            slug: self.slug.clone(),
        }
    }
}

impl IpAddress {
    pub fn to_nested(&self, links: &LinkResolver) -> VirtualMachineIpAddress {
        VirtualMachineIpAddress {
            id: self.id,
            url: links.detail(ViewName::IpAddress, self.id),
            family: self.family(),
            address: self.address.to_string(),
        }
    }
}

impl Vlan {
    pub fn to_nested(&self, links: &LinkResolver) -> InterfaceVlan {
        InterfaceVlan {
            id: self.id,
            url: links.detail(ViewName::Vlan, self.id),
            vid: self.vid,
            name: self.name.clone(),
            display_name: self.display_name(),
        }
    }
}
