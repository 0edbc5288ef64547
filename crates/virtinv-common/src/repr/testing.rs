//! Sample entities shared by the representation tests.

use chrono::{NaiveDate, TimeZone, Utc};
use serde_json::json;

use crate::choices::{FormFactor, InterfaceMode, VmStatus};
use crate::custom_fields::{CustomFieldSpec, CustomFields, StaticCustomFieldRegistry};
use crate::links::LinkResolver;
use crate::model::{
    Cluster, ClusterGroup, ClusterType, DeviceRole, Interface, IpAddress, Kind, Platform, Site,
    Tenant, VirtualMachine, Vlan,
};
use crate::repr::ReprContext;

pub fn registry() -> StaticCustomFieldRegistry {
    StaticCustomFieldRegistry::new()
        .with_field(
            Kind::Cluster,
            CustomFieldSpec {
                name: "env".to_string(),
                label: None,
                default: Some(json!("prod")),
            },
        )
        .with_field(
            Kind::Cluster,
            CustomFieldSpec {
                name: "owner".to_string(),
                label: None,
                default: None,
            },
        )
}

pub fn with_ctx<T>(f: impl FnOnce(&ReprContext<'_>) -> T) -> T {
    let links = LinkResolver::new("http://inv.local/api/").unwrap();
    let registry = registry();
    let ctx = ReprContext {
        links: &links,
        custom_fields: &registry,
        prefer_ipv4: false,
    };
    f(&ctx)
}

pub fn cluster() -> Cluster {
    let mut custom_fields = CustomFields::new();
    custom_fields.insert("env".to_string(), json!("prod"));
    Cluster {
        id: 3,
        name: "dc1-kvm".to_string(),
        cluster_type: ClusterType {
            id: 1,
            name: "KVM".to_string(),
            slug: "kvm".to_string(),
        },
        group: Some(ClusterGroup {
            id: 2,
            name: "Production".to_string(),
            slug: "production".to_string(),
        }),
        site: Some(Site {
            id: 5,
            name: "DC1".to_string(),
            slug: "dc1".to_string(),
        }),
        comments: String::new(),
        custom_fields,
        created: NaiveDate::from_ymd_opt(2017, 8, 1).unwrap(),
        last_updated: Utc.with_ymd_and_hms(2017, 8, 2, 10, 30, 0).unwrap(),
    }
}

pub fn ip(id: u64, address: &str) -> IpAddress {
    IpAddress {
        id,
        address: address.parse().unwrap(),
        interface: Some(20),
    }
}

pub fn virtual_machine() -> VirtualMachine {
    VirtualMachine {
        id: 10,
        name: "web01".to_string(),
        status: VmStatus::Staged,
        cluster: cluster(),
        role: Some(DeviceRole {
            id: 6,
            name: "Web Server".to_string(),
            slug: "web-server".to_string(),
        }),
        tenant: Some(Tenant {
            id: 7,
            name: "Acme".to_string(),
            slug: "acme".to_string(),
        }),
        platform: Some(Platform {
            id: 8,
            name: "Ubuntu 16.04".to_string(),
            slug: "ubuntu-16-04".to_string(),
        }),
        primary_ip4: Some(ip(30, "192.0.2.10/24")),
        primary_ip6: Some(ip(31, "2001:db8::10/64")),
        vcpus: Some(4),
        memory: Some(8192),
        disk: Some(80),
        comments: "frontend".to_string(),
        custom_fields: CustomFields::new(),
        created: NaiveDate::from_ymd_opt(2017, 8, 3).unwrap(),
        last_updated: Utc.with_ymd_and_hms(2017, 8, 3, 9, 0, 0).unwrap(),
    }
}

pub fn vlan(id: u64, vid: u16, name: &str) -> Vlan {
    Vlan {
        id,
        vid,
        name: name.to_string(),
    }
}

pub fn interface() -> Interface {
    Interface {
        id: 20,
        name: "eth0".to_string(),
        virtual_machine: virtual_machine(),
        form_factor: FormFactor::Virtual,
        enabled: true,
        mac_address: Some("52:54:00:12:34:56".parse().unwrap()),
        mtu: Some(1500),
        mode: Some(InterfaceMode::Tagged),
        untagged_vlan: Some(vlan(40, 10, "mgmt")),
        tagged_vlans: vec![vlan(41, 20, "web"), vlan(42, 30, "db")],
        description: "uplink".to_string(),
    }
}
