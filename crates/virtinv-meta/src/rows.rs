//! Stored rows. Relationships are kept as ids and resolved on read.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, Utc};
use mac_address::MacAddress;

use virtinv_common::{CustomFields, FormFactor, InterfaceMode, VmStatus};

#[derive(Debug)]
pub(crate) struct Table<T> {
    rows: BTreeMap<u64, T>,
    last_id: u64,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            last_id: 0,
        }
    }
}

impl<T> Table<T> {
    pub fn allocate(&mut self) -> u64 {
        self.last_id = self.last_id.saturating_add(1);
        self.last_id
    }

    pub fn get(&self, id: u64) -> Option<&T> {
        self.rows.get(&id)
    }

    pub fn get_mut(&mut self, id: u64) -> Option<&mut T> {
        self.rows.get_mut(&id)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.rows.contains_key(&id)
    }

    pub fn insert(&mut self, id: u64, row: T) {
        self.rows.insert(id, row);
    }

    pub fn remove(&mut self, id: u64) -> Option<T> {
        self.rows.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Rows in id order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &T)> {
        self.rows.iter().map(|(id, row)| (*id, row))
    }

    /// True when some row other than `except` matches.
    pub fn any_other(&self, except: Option<u64>, pred: impl Fn(&T) -> bool) -> bool {
        self.iter()
            .any(|(id, row)| Some(id) != except && pred(row))
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ClusterRow {
    pub name: String,
    pub cluster_type: u64,
    pub group: Option<u64>,
    pub site: Option<u64>,
    pub comments: String,
    pub custom_fields: CustomFields,
    pub created: NaiveDate,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub(crate) struct VirtualMachineRow {
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
    pub created: NaiveDate,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub(crate) struct InterfaceRow {
    pub name: String,
    pub virtual_machine: u64,
    pub form_factor: FormFactor,
    pub enabled: bool,
    pub mac_address: Option<MacAddress>,
    pub mtu: Option<u16>,
    pub mode: Option<InterfaceMode>,
    pub untagged_vlan: Option<u64>,
    pub tagged_vlans: BTreeSet<u64>,
    pub description: String,
}
