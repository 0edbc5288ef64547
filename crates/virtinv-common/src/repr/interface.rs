use std::collections::BTreeSet;

use mac_address::MacAddress;
use serde::Serialize;
use serde_json::Value;

use crate::choices::{ChoiceRepr, FormFactor, InterfaceMode};
use crate::error::ValidationErrors;
use crate::links::ViewName;
use crate::model::Interface;
use crate::repr::external::InterfaceVlan;
use crate::repr::{NestedVirtualMachine, Payload, ReprContext, Represent, Writable, WriteMode};

pub const MAX_NAME_LEN: usize = 64;
pub const MAX_DESCRIPTION_LEN: usize = 100;
pub const MAX_MTU: i64 = 32767;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NestedInterface {
    pub id: u64,
    pub url: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceRepr {
    pub id: u64,
    pub url: String,
    pub name: String,
    pub virtual_machine: NestedVirtualMachine,
    pub form_factor: ChoiceRepr,
    pub enabled: bool,
    pub mac_address: Option<String>,
    pub mtu: Option<u16>,
    pub mode: Option<ChoiceRepr>,
    pub untagged_vlan: Option<InterfaceVlan>,
    pub tagged_vlans: Vec<InterfaceVlan>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WritableInterface {
    pub name: String,
    pub virtual_machine: u64,
    /// Always [`FormFactor::Virtual`]; whatever the payload says is discarded.
    pub form_factor: FormFactor,
    pub enabled: bool,
    pub mac_address: Option<MacAddress>,
    pub mtu: Option<u16>,
    pub mode: Option<InterfaceMode>,
    pub untagged_vlan: Option<u64>,
    pub tagged_vlans: BTreeSet<u64>,
    pub description: String,
}

impl Represent for Interface {
    type Nested = NestedInterface;
    type Full = InterfaceRepr;

    fn to_nested(&self, ctx: &ReprContext<'_>) -> NestedInterface {
        NestedInterface {
            id: self.id,
            url: ctx.links.detail(ViewName::Interface, self.id),
            name: self.name.clone(),
        }
    }

    fn to_full(&self, ctx: &ReprContext<'_>) -> InterfaceRepr {
        InterfaceRepr {
            id: self.id,
            url: ctx.links.detail(ViewName::Interface, self.id),
            name: self.name.clone(),
            virtual_machine: self.virtual_machine.to_nested(ctx),
            form_factor: ChoiceRepr::of(self.form_factor),
            enabled: self.enabled,
            mac_address: self.mac_address.map(|m| m.to_string()),
            mtu: self.mtu,
            mode: self.mode.map(ChoiceRepr::of),
            untagged_vlan: self.untagged_vlan.as_ref().map(|v| v.to_nested(ctx.links)),
            tagged_vlans: self
                .tagged_vlans
                .iter()
                .map(|v| v.to_nested(ctx.links))
                .collect(),
            description: self.description.clone(),
        }
    }
}

impl Writable for WritableInterface {
    type Entity = Interface;

    fn from_payload(
        payload: &Value,
        mode: WriteMode<'_, Interface>,
        _ctx: &ReprContext<'_>,
    ) -> Result<Self, ValidationErrors> {
        let base = mode.patch_base();
        let mut p = Payload::new(payload, mode.is_partial())?;

        let name = p.required_str("name", MAX_NAME_LEN, base.map(|b| b.name.as_str()));
        let virtual_machine =
            p.required_ref("virtual_machine", base.map(|b| b.virtual_machine.id));
        if p.contains("form_factor") {
            tracing::debug!("form_factor is fixed for virtual interfaces; ignoring payload value");
        }
        let enabled = p.boolean("enabled", true, base.map(|b| b.enabled));
        let mac_address = p.mac_address("mac_address", base.map(|b| b.mac_address));
        let mtu = p
            .int_in_range("mtu", 0, MAX_MTU, base.map(|b| b.mtu.map(i64::from)))
            .and_then(|v| u16::try_from(v).ok());
        let mode_choice = p.optional_choice("mode", base.map(|b| b.mode));
        let untagged_vlan = p.optional_ref(
            "untagged_vlan",
            base.map(|b| b.untagged_vlan.as_ref().map(|v| v.id)),
        );
        let tagged_vlans = p.ref_set(
            "tagged_vlans",
            base.map(|b| b.tagged_vlans.iter().map(|v| v.id).collect()),
        );
        let description = p.text(
            "description",
            Some(MAX_DESCRIPTION_LEN),
            base.map(|b| b.description.as_str()),
        );

        p.finish(Self {
            name,
            virtual_machine,
            form_factor: FormFactor::Virtual,
            enabled,
            mac_address,
            mtu,
            mode: mode_choice,
            untagged_vlan,
            tagged_vlans,
            description,
        })
    }
}

impl From<&Interface> for WritableInterface {
    fn from(iface: &Interface) -> Self {
        Self {
            name: iface.name.clone(),
            virtual_machine: iface.virtual_machine.id,
            form_factor: iface.form_factor,
            enabled: iface.enabled,
            mac_address: iface.mac_address,
            mtu: iface.mtu,
            mode: iface.mode,
            untagged_vlan: iface.untagged_vlan.as_ref().map(|v| v.id),
            tagged_vlans: iface.tagged_vlans.iter().map(|v| v.id).collect(),
            description: iface.description.clone(),
        }
    }
}
