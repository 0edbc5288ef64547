//! Hyperlink generation for API representations.
//!
//! Every representation carries a `url` pointing at the detail endpoint of the
//! object. Routes are addressed by their view name (e.g.
//! `virtualization-api:cluster-detail`) so foreign kinds like IP addresses and
//! VLANs can be linked without depending on the code that serves them.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("invalid base url '{url}': {source}")]
    InvalidBase {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("base url '{0}' cannot carry a path")]
    CannotBeABase(String),

    #[error("unknown view name '{0}'")]
    UnknownView(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewName {
    ClusterType,
    ClusterGroup,
    Cluster,
    VirtualMachine,
    Interface,
    Site,
    DeviceRole,
    Platform,
    Tenant,
    IpAddress,
    Vlan,
}

impl ViewName {
    pub const ALL: [ViewName; 11] = [
        ViewName::ClusterType,
        ViewName::ClusterGroup,
        ViewName::Cluster,
        ViewName::VirtualMachine,
        ViewName::Interface,
        ViewName::Site,
        ViewName::DeviceRole,
        ViewName::Platform,
        ViewName::Tenant,
        ViewName::IpAddress,
        ViewName::Vlan,
    ];

    pub fn route_name(self) -> &'static str {
        match self {
            ViewName::ClusterType => "virtualization-api:clustertype-detail",
            ViewName::ClusterGroup => "virtualization-api:clustergroup-detail",
            ViewName::Cluster => "virtualization-api:cluster-detail",
            ViewName::VirtualMachine => "virtualization-api:virtualmachine-detail",
            ViewName::Interface => "virtualization-api:interface-detail",
            ViewName::Site => "dcim-api:site-detail",
            ViewName::DeviceRole => "dcim-api:devicerole-detail",
            ViewName::Platform => "dcim-api:platform-detail",
            ViewName::Tenant => "tenancy-api:tenant-detail",
            ViewName::IpAddress => "ipam-api:ipaddress-detail",
            ViewName::Vlan => "ipam-api:vlan-detail",
        }
    }

    /// Collection path relative to the API root, with a trailing slash.
    pub fn path(self) -> &'static str {
        match self {
            ViewName::ClusterType => "virtualization/cluster-types/",
            ViewName::ClusterGroup => "virtualization/cluster-groups/",
            ViewName::Cluster => "virtualization/clusters/",
            ViewName::VirtualMachine => "virtualization/virtual-machines/",
            ViewName::Interface => "virtualization/interfaces/",
            ViewName::Site => "dcim/sites/",
            ViewName::DeviceRole => "dcim/device-roles/",
            ViewName::Platform => "dcim/platforms/",
            ViewName::Tenant => "tenancy/tenants/",
            ViewName::IpAddress => "ipam/ip-addresses/",
            ViewName::Vlan => "ipam/vlans/",
        }
    }
}

impl fmt::Display for ViewName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.route_name())
    }
}

impl FromStr for ViewName {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ViewName::ALL
            .into_iter()
            .find(|v| v.route_name() == s)
            .ok_or_else(|| LinkError::UnknownView(s.to_string()))
    }
}

/// Resolves view names to absolute URLs under the API root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkResolver {
    base: Url,
}

impl LinkResolver {
    /// `base` is the API root, e.g. `http://inventory.example.com/api/`. A
    /// missing trailing slash is added; query and fragment are dropped.
    pub fn new(base: &str) -> Result<Self, LinkError> {
        let mut url = Url::parse(base).map_err(|source| LinkError::InvalidBase {
            url: base.to_string(),
            source,
        })?;
        if url.cannot_be_a_base() {
            return Err(LinkError::CannotBeABase(base.to_string()));
        }
        url.set_query(None);
        url.set_fragment(None);
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(Self { base: url })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn detail(&self, view: ViewName, id: u64) -> String {
        let mut url = self.base.clone();
        url.set_path(&format!("{}{}{}/", self.base.path(), view.path(), id));
        url.to_string()
    }

    /// Detail URL for a route given by name.
    pub fn reverse(&self, view_name: &str, id: u64) -> Result<String, LinkError> {
        let view: ViewName = view_name.parse()?;
        Ok(self.detail(view, id))
    }

    /// Page URL of a collection.
    pub fn list(&self, view: ViewName, limit: usize, offset: usize) -> String {
        let mut url = self.base.clone();
        url.set_path(&format!("{}{}", self.base.path(), view.path()));
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string())
            .append_pair("offset", &offset.to_string());
        url.to_string()
    }
}
