use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::choices::{ChoiceRepr, VmStatus};
use crate::custom_fields::{self, CustomFields};
use crate::error::ValidationErrors;
use crate::links::ViewName;
use crate::model::{Kind, VirtualMachine};
use crate::repr::external::{
    NestedDeviceRole, NestedPlatform, NestedTenant, VirtualMachineIpAddress,
};
use crate::repr::{NestedCluster, Payload, ReprContext, Represent, Writable, WriteMode};

pub const MAX_NAME_LEN: usize = 64;
pub const MAX_VCPUS: i64 = 32767;
pub const MAX_SIZE: i64 = 2147483647;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NestedVirtualMachine {
    pub id: u64,
    pub url: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VirtualMachineRepr {
    pub id: u64,
    pub url: String,
    pub name: String,
    pub status: ChoiceRepr,
    pub cluster: NestedCluster,
    pub role: Option<NestedDeviceRole>,
    pub tenant: Option<NestedTenant>,
    pub platform: Option<NestedPlatform>,
    pub primary_ip: Option<VirtualMachineIpAddress>,
    pub primary_ip4: Option<VirtualMachineIpAddress>,
    pub primary_ip6: Option<VirtualMachineIpAddress>,
    pub vcpus: Option<u16>,
    pub memory: Option<u32>,
    pub disk: Option<u32>,
    pub comments: String,
    pub custom_fields: CustomFields,
    pub created: NaiveDate,
    pub last_updated: DateTime<Utc>,
}

/// `primary_ip` has no writable counterpart; it is derived from the two
/// family-specific primaries.
#[derive(Debug, Clone, PartialEq)]
pub struct WritableVirtualMachine {
    pub name: String,
    pub status: VmStatus,
    pub cluster: u64,
    pub role: Option<u64>,
    pub tenant: Option<u64>,
    pub platform: Option<u64>,
    pub primary_ip4: Option<u64>,
    pub primary_ip6: Option<u64>,
    pub vcpus: Option<u16>,
    pub memory: Option<u32>,
    pub disk: Option<u32>,
    pub comments: String,
    pub custom_fields: CustomFields,
}

impl Represent for VirtualMachine {
    type Nested = NestedVirtualMachine;
    type Full = VirtualMachineRepr;

    fn to_nested(&self, ctx: &ReprContext<'_>) -> NestedVirtualMachine {
        NestedVirtualMachine {
            id: self.id,
            url: ctx.links.detail(ViewName::VirtualMachine, self.id),
            name: self.name.clone(),
        }
    }

    fn to_full(&self, ctx: &ReprContext<'_>) -> VirtualMachineRepr {
        let links = ctx.links;
        VirtualMachineRepr {
            id: self.id,
            url: links.detail(ViewName::VirtualMachine, self.id),
            name: self.name.clone(),
            status: ChoiceRepr::of(self.status),
            cluster: self.cluster.to_nested(ctx),
            role: self.role.as_ref().map(|r| r.to_nested(links)),
            tenant: self.tenant.as_ref().map(|t| t.to_nested(links)),
            platform: self.platform.as_ref().map(|p| p.to_nested(links)),
            primary_ip: self.primary_ip(ctx.prefer_ipv4).map(|ip| ip.to_nested(links)),
            primary_ip4: self.primary_ip4.as_ref().map(|ip| ip.to_nested(links)),
            primary_ip6: self.primary_ip6.as_ref().map(|ip| ip.to_nested(links)),
            vcpus: self.vcpus,
            memory: self.memory,
            disk: self.disk,
            comments: self.comments.clone(),
            custom_fields: custom_fields::merge_for_read(
                ctx.custom_fields,
                Kind::VirtualMachine,
                &self.custom_fields,
            ),
            created: self.created,
            last_updated: self.last_updated,
        }
    }
}

impl Writable for WritableVirtualMachine {
    type Entity = VirtualMachine;

    fn from_payload(
        payload: &Value,
        mode: WriteMode<'_, VirtualMachine>,
        ctx: &ReprContext<'_>,
    ) -> Result<Self, ValidationErrors> {
        let base = mode.patch_base();
        let mut p = Payload::new(payload, mode.is_partial())?;

        let name = p.required_str("name", MAX_NAME_LEN, base.map(|b| b.name.as_str()));
        let status = p.choice("status", VmStatus::default(), base.map(|b| b.status));
        let cluster = p.required_ref("cluster", base.map(|b| b.cluster.id));
        let role = p.optional_ref("role", base.map(|b| b.role.as_ref().map(|r| r.id)));
        let tenant = p.optional_ref("tenant", base.map(|b| b.tenant.as_ref().map(|t| t.id)));
        let platform =
            p.optional_ref("platform", base.map(|b| b.platform.as_ref().map(|x| x.id)));
        let primary_ip4 = p.optional_ref(
            "primary_ip4",
            base.map(|b| b.primary_ip4.as_ref().map(|ip| ip.id)),
        );
        let primary_ip6 = p.optional_ref(
            "primary_ip6",
            base.map(|b| b.primary_ip6.as_ref().map(|ip| ip.id)),
        );
        let vcpus = p
            .int_in_range("vcpus", 0, MAX_VCPUS, base.map(|b| b.vcpus.map(i64::from)))
            .and_then(|v| u16::try_from(v).ok());
        let memory = p
            .int_in_range("memory", 0, MAX_SIZE, base.map(|b| b.memory.map(i64::from)))
            .and_then(|v| u32::try_from(v).ok());
        let disk = p
            .int_in_range("disk", 0, MAX_SIZE, base.map(|b| b.disk.map(i64::from)))
            .and_then(|v| u32::try_from(v).ok());
        let comments = p.text("comments", None, base.map(|b| b.comments.as_str()));
        if p.contains("primary_ip") {
            tracing::debug!("ignoring read-only field primary_ip");
        }
        let custom_fields = match custom_fields::merge_for_write(
            ctx.custom_fields,
            Kind::VirtualMachine,
            p.get("custom_fields"),
            mode.instance().map(|i| &i.custom_fields),
        ) {
            Ok(cf) => cf,
            Err(e) => {
                p.reject(e);
                CustomFields::new()
            }
        };

        p.finish(Self {
            name,
            status,
            cluster,
            role,
            tenant,
            platform,
            primary_ip4,
            primary_ip6,
            vcpus,
            memory,
            disk,
            comments,
            custom_fields,
        })
    }
}

impl From<&VirtualMachine> for WritableVirtualMachine {
    fn from(vm: &VirtualMachine) -> Self {
        Self {
            name: vm.name.clone(),
            status: vm.status,
            cluster: vm.cluster.id,
            role: vm.role.as_ref().map(|r| r.id),
            tenant: vm.tenant.as_ref().map(|t| t.id),
            platform: vm.platform.as_ref().map(|p| p.id),
            primary_ip4: vm.primary_ip4.as_ref().map(|ip| ip.id),
            primary_ip6: vm.primary_ip6.as_ref().map(|ip| ip.id),
            vcpus: vm.vcpus,
            memory: vm.memory,
            disk: vm.disk,
            comments: vm.comments.clone(),
            custom_fields: vm.custom_fields.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FieldError;
    use crate::repr::testing::{virtual_machine, with_ctx};
    use serde_json::json;

    #[test]
    fn test_full_representation() {
        with_ctx(|ctx| {
            let full = serde_json::to_value(virtual_machine().to_full(ctx)).unwrap();
            assert_eq!(full["status"], json!({"value": 3, "label": "Staged"}));
            assert_eq!(
                full["cluster"],
                json!({
                    "id": 3,
                    "url": "http://inv.local/api/virtualization/clusters/3/",
                    "name": "dc1-kvm"
                })
            );
            assert_eq!(full["role"]["slug"], "web-server");
            assert_eq!(full["primary_ip4"]["family"], 4);
            assert_eq!(full["primary_ip6"]["address"], "2001:db8::10/64");
            assert_eq!(full["primary_ip"], full["primary_ip6"]);
            assert_eq!(full["memory"], 8192);
            assert_eq!(full["custom_fields"], json!({}));
        });
    }

    #[test]
    fn test_primary_ip_follows_preference() {
        with_ctx(|ctx| {
            let preferring_v4 = ReprContext {
                prefer_ipv4: true,
                ..*ctx
            };
            let full = virtual_machine().to_full(&preferring_v4);
            assert_eq!(full.primary_ip.map(|ip| ip.id), Some(30));
        });
    }

    #[test]
    fn test_invalid_status_names_the_field() {
        with_ctx(|ctx| {
            let err = WritableVirtualMachine::from_payload(
                &json!({"name": "web02", "cluster": 3, "status": 7}),
                WriteMode::Create,
                ctx,
            )
            .unwrap_err();
            match err.for_field("status") {
                Some(FieldError::InvalidChoiceValue { allowed, .. }) => {
                    assert_eq!(allowed, &vec![json!(1), json!(0), json!(3)]);
                }
                other => panic!("unexpected: {other:?}"),
            }
        });
    }

    #[test]
    fn test_defaults_and_read_only_primary_ip() {
        with_ctx(|ctx| {
            let w = WritableVirtualMachine::from_payload(
                &json!({"name": "web02", "cluster": 3, "primary_ip": 99, "vcpus": "2"}),
                WriteMode::Create,
                ctx,
            )
            .unwrap();
            assert_eq!(w.status, VmStatus::Active);
            assert_eq!(w.vcpus, Some(2));
            assert_eq!(w.primary_ip4, None);
            assert_eq!(w.primary_ip6, None);
        });
    }

    #[test]
    fn test_writable_round_trips_scalars() {
        with_ctx(|ctx| {
            let vm = virtual_machine();
            let full = serde_json::to_value(vm.to_full(ctx)).unwrap();
            let payload = json!({
                "name": full["name"],
                "status": full["status"],
                "cluster": full["cluster"]["id"],
                "role": full["role"]["id"],
                "tenant": full["tenant"]["id"],
                "platform": full["platform"]["id"],
                "primary_ip4": full["primary_ip4"]["id"],
                "primary_ip6": full["primary_ip6"]["id"],
                "vcpus": full["vcpus"],
                "memory": full["memory"],
                "disk": full["disk"],
                "comments": full["comments"],
                "custom_fields": full["custom_fields"],
            });
            let w = WritableVirtualMachine::from_payload(&payload, WriteMode::Replace(&vm), ctx)
                .unwrap();
            assert_eq!(w, WritableVirtualMachine::from(&vm));
        });
    }

    #[test]
    fn test_nested_is_subset_of_full() {
        with_ctx(|ctx| {
            let vm = virtual_machine();
            let nested = serde_json::to_value(vm.to_nested(ctx)).unwrap();
            let full = serde_json::to_value(vm.to_full(ctx)).unwrap();
            for (key, value) in nested.as_object().unwrap() {
                assert_eq!(&full[key], value);
            }
            assert_eq!(nested.as_object().unwrap().len(), 3);
        });
    }
}
