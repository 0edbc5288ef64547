pub mod choices;
pub mod custom_fields;
pub mod error;
pub mod links;
pub mod model;
pub mod repr;
pub mod slug;
pub mod telemetry;

pub use choices::{Choice, ChoiceRepr, FormFactor, InterfaceMode, VmStatus};
pub use custom_fields::{
    CustomFieldRegistry, CustomFieldSpec, CustomFields, RegistryError, StaticCustomFieldRegistry,
};
pub use error::{FieldError, ValidationErrors};
pub use links::{LinkError, LinkResolver, ViewName};
pub use model::{
    Cluster, ClusterGroup, ClusterType, DeviceRole, Interface, IpAddress, Kind, Platform, Site,
    Tenant, VirtualMachine, Vlan,
};
pub use repr::{ReprContext, Represent, Writable, WriteMode};
