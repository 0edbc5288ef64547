//! Resource representations.
//!
//! Every kind has three shapes:
//! - a nested form (`id`, `url`, `name`, sometimes `slug`) used when it is
//!   embedded in another object,
//! - a full form that renders its own scalar fields and expands each direct
//!   relationship to that relation's nested form, one level deep and no further,
//! - a writable form that takes relationships as raw primary keys.
//!
//! Nothing here recurses through a generic serializer. Each relationship has its
//! own nested type, which is what keeps clusters and virtual machines (or
//! interfaces and VLANs) from expanding into each other.

pub mod cluster;
pub mod cluster_group;
pub mod cluster_type;
pub mod external;
pub mod interface;
pub mod payload;
#[cfg(test)]
pub(crate) mod testing;
pub mod virtual_machine;

use serde::Serialize;
use serde_json::Value;

use crate::custom_fields::CustomFieldRegistry;
use crate::error::ValidationErrors;
use crate::links::LinkResolver;

pub use cluster::{ClusterRepr, NestedCluster, WritableCluster};
pub use cluster_group::{ClusterGroupRepr, NestedClusterGroup, WritableClusterGroup};
pub use cluster_type::{ClusterTypeRepr, NestedClusterType, WritableClusterType};
pub use external::{
    InterfaceVlan, NestedDeviceRole, NestedPlatform, NestedSite, NestedTenant,
    VirtualMachineIpAddress,
};
pub use interface::{InterfaceRepr, NestedInterface, WritableInterface};
pub use payload::Payload;
pub use virtual_machine::{NestedVirtualMachine, VirtualMachineRepr, WritableVirtualMachine};

/// Collaborators a representation needs besides the entity itself.
#[derive(Clone, Copy)]
pub struct ReprContext<'a> {
    pub links: &'a LinkResolver,
    pub custom_fields: &'a dyn CustomFieldRegistry,
    /// Which family wins when deriving `primary_ip` from both primaries.
    pub prefer_ipv4: bool,
}

pub trait Represent {
    type Nested: Serialize;
    type Full: Serialize;

    fn to_nested(&self, ctx: &ReprContext<'_>) -> Self::Nested;
    fn to_full(&self, ctx: &ReprContext<'_>) -> Self::Full;
}

/// How a payload relates to the object it writes.
#[derive(Debug)]
pub enum WriteMode<'a, E> {
    Create,
    /// Full replacement: absent fields take their defaults.
    Replace(&'a E),
    /// Partial update: absent fields keep the instance's values.
    Patch(&'a E),
}

impl<'a, E> WriteMode<'a, E> {
    pub fn instance(&self) -> Option<&'a E> {
        match self {
            WriteMode::Create => None,
            WriteMode::Replace(e) | WriteMode::Patch(e) => Some(e),
        }
    }

    /// The instance whose values stand in for absent keys.
    pub fn patch_base(&self) -> Option<&'a E> {
        match self {
            WriteMode::Patch(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, WriteMode::Patch(_))
    }
}

impl<E> Clone for WriteMode<'_, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for WriteMode<'_, E> {}

/// Write-side shape of an entity: scalar fields validated, relationships as ids.
pub trait Writable: Sized {
    type Entity;

    fn from_payload(
        payload: &Value,
        mode: WriteMode<'_, Self::Entity>,
        ctx: &ReprContext<'_>,
    ) -> Result<Self, ValidationErrors>;
}
