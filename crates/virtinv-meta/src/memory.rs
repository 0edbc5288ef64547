use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use anyhow::anyhow;
use chrono::Utc;
use tokio::sync::{broadcast, RwLock};
use tokio_stream::{wrappers::BroadcastStream, StreamExt};

use virtinv_common::repr::{
    WritableCluster, WritableClusterGroup, WritableClusterType, WritableInterface,
    WritableVirtualMachine,
};
use virtinv_common::{
    Cluster, ClusterGroup, ClusterType, DeviceRole, FieldError, Interface, IpAddress, Kind,
    Platform, Site, Tenant, ValidationErrors, VirtualMachine, Vlan,
};

use crate::fixtures::Fixtures;
use crate::rows::{ClusterRow, InterfaceRow, Table, VirtualMachineRow};
use crate::types::{
    ChangeAction, ChangeEvent, ChangeStream, InventoryStore, Listing, Merge, Page, StoreError,
    StoreResult,
};

#[derive(Debug, Clone)]
pub struct MemoryInventory {
    inner: Arc<RwLock<Inner>>,
    tx: broadcast::Sender<ChangeEvent>,
}

#[derive(Debug, Default)]
struct Inner {
    revision: u64,
    pending: Vec<(Kind, u64, ChangeAction)>,

    sites: BTreeMap<u64, Site>,
    device_roles: BTreeMap<u64, DeviceRole>,
    platforms: BTreeMap<u64, Platform>,
    tenants: BTreeMap<u64, Tenant>,
    ip_addresses: BTreeMap<u64, IpAddress>,
    vlans: BTreeMap<u64, Vlan>,

    cluster_types: Table<ClusterType>,
    cluster_groups: Table<ClusterGroup>,
    clusters: Table<ClusterRow>,
    virtual_machines: Table<VirtualMachineRow>,
    interfaces: Table<InterfaceRow>,
}

impl MemoryInventory {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(1024);
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
            tx,
        }
    }

    /// Replace-or-insert externally owned objects. Address assignments that
    /// point at unknown interfaces are dropped.
    pub async fn load_fixtures(&self, fixtures: Fixtures) {
        let mut inner = self.inner.write().await;
        let counts = (
            fixtures.sites.len(),
            fixtures.device_roles.len(),
            fixtures.platforms.len(),
            fixtures.tenants.len(),
            fixtures.ip_addresses.len(),
            fixtures.vlans.len(),
        );

        inner.sites.extend(fixtures.sites.into_iter().map(|s| (s.id, s)));
        inner
            .device_roles
            .extend(fixtures.device_roles.into_iter().map(|r| (r.id, r)));
        inner
            .platforms
            .extend(fixtures.platforms.into_iter().map(|p| (p.id, p)));
        inner
            .tenants
            .extend(fixtures.tenants.into_iter().map(|t| (t.id, t)));
        inner.vlans.extend(fixtures.vlans.into_iter().map(|v| (v.id, v)));
        for mut ip in fixtures.ip_addresses {
            if let Some(iface) = ip.interface {
                if !inner.interfaces.contains(iface) {
                    tracing::warn!(ip = ip.id, interface = iface, "dropping assignment to unknown interface");
                    ip.interface = None;
                }
            }
            inner.ip_addresses.insert(ip.id, ip);
        }

        tracing::info!(
            sites = counts.0,
            device_roles = counts.1,
            platforms = counts.2,
            tenants = counts.3,
            ip_addresses = counts.4,
            vlans = counts.5,
            "fixtures loaded"
        );
    }

    fn emit(&self, events: Vec<ChangeEvent>) {
        for event in events {
            let _ = self.tx.send(event);
        }
    }

    /// Run `apply` under the write lock, publish what it recorded, and read
    /// the written object back.
    async fn write<T>(
        &self,
        apply: impl FnOnce(&mut Inner) -> StoreResult<u64> + Send,
        load: impl FnOnce(&Inner, u64) -> StoreResult<T> + Send,
    ) -> StoreResult<T> {
        let (saved, events) = {
            let mut inner = self.inner.write().await;
            let id = match apply(&mut *inner) {
                Ok(id) => id,
                Err(e) => {
                    inner.pending.clear();
                    return Err(e);
                }
            };
            let events = inner.commit();
            (load(&*inner, id), events)
        };
        self.emit(events);
        saved
    }
}

impl Default for MemoryInventory {
    fn default() -> Self {
        Self::new()
    }
}

fn ensure_exists<T>(table: &Table<T>, kind: Kind, id: Option<u64>) -> StoreResult<()> {
    match id {
        Some(id) if !table.contains(id) => Err(StoreError::NotFound { kind, id }),
        _ => Ok(()),
    }
}

fn assign_id<T>(table: &mut Table<T>, id: Option<u64>) -> (u64, ChangeAction) {
    match id {
        Some(id) => (id, ChangeAction::Updated),
        None => (table.allocate(), ChangeAction::Created),
    }
}

fn missing_pk(field: &str, id: u64) -> FieldError {
    FieldError::conflict(field, format!("Invalid pk \"{id}\" - object does not exist."))
}

fn check_ref(
    errors: &mut ValidationErrors,
    field: &str,
    id: Option<u64>,
    exists: impl Fn(u64) -> bool,
) {
    if let Some(id) = id {
        if !exists(id) {
            errors.push(missing_pk(field, id));
        }
    }
}

fn check_unique(errors: &mut ValidationErrors, taken: bool, field: &str, noun: &str) {
    if taken {
        errors.push(FieldError::conflict(
            field,
            format!("{noun} with this {field} already exists."),
        ));
    }
}

fn conflicts(errors: ValidationErrors) -> StoreResult<()> {
    errors.into_result(()).map_err(StoreError::Conflict)
}

fn protect(kind: Kind, id: u64, users: usize, noun: &str) -> StoreResult<()> {
    if users == 0 {
        return Ok(());
    }
    Err(StoreError::Protected {
        kind,
        id,
        message: format!("referenced by {users} {noun}(s)"),
    })
}

fn related<T: Clone>(map: &BTreeMap<u64, T>, what: &str, id: Option<u64>) -> StoreResult<Option<T>> {
    id.map(|id| {
        map.get(&id)
            .cloned()
            .ok_or_else(|| StoreError::Backend(anyhow!("dangling {what} reference {id}")))
    })
    .transpose()
}

fn listing<R, T>(
    table: &Table<R>,
    page: Page,
    load: impl Fn(u64) -> StoreResult<T>,
) -> StoreResult<Listing<T>> {
    let items = table
        .iter()
        .skip(page.offset)
        .take(page.limit)
        .map(|(id, _)| load(id))
        .collect::<StoreResult<Vec<_>>>()?;
    Ok(Listing {
        count: table.len(),
        items,
    })
}

impl Inner {
    fn record(&mut self, kind: Kind, id: u64, action: ChangeAction) {
        self.pending.push((kind, id, action));
    }

    /// Assign revisions to everything recorded since the last commit.
    fn commit(&mut self) -> Vec<ChangeEvent> {
        let pending = std::mem::take(&mut self.pending);
        pending
            .into_iter()
            .map(|(kind, id, action)| {
                self.revision = self.revision.saturating_add(1);
                ChangeEvent {
                    kind,
                    id,
                    action,
                    revision: self.revision,
                }
            })
            .collect()
    }

    fn load_cluster_type(&self, id: u64) -> StoreResult<ClusterType> {
        self.cluster_types.get(id).cloned().ok_or(StoreError::NotFound {
            kind: Kind::ClusterType,
            id,
        })
    }

    fn load_cluster_group(&self, id: u64) -> StoreResult<ClusterGroup> {
        self.cluster_groups.get(id).cloned().ok_or(StoreError::NotFound {
            kind: Kind::ClusterGroup,
            id,
        })
    }

    fn load_cluster(&self, id: u64) -> StoreResult<Cluster> {
        let row = self.clusters.get(id).ok_or(StoreError::NotFound {
            kind: Kind::Cluster,
            id,
        })?;
        Ok(Cluster {
            id,
            name: row.name.clone(),
            cluster_type: self.load_cluster_type(row.cluster_type)?,
            group: row.group.map(|g| self.load_cluster_group(g)).transpose()?,
            site: related(&self.sites, "site", row.site)?,
            comments: row.comments.clone(),
            custom_fields: row.custom_fields.clone(),
            created: row.created,
            last_updated: row.last_updated,
        })
    }

    fn load_virtual_machine(&self, id: u64) -> StoreResult<VirtualMachine> {
        let row = self.virtual_machines.get(id).ok_or(StoreError::NotFound {
            kind: Kind::VirtualMachine,
            id,
        })?;
        Ok(VirtualMachine {
            id,
            name: row.name.clone(),
            status: row.status,
            cluster: self.load_cluster(row.cluster)?,
            role: related(&self.device_roles, "device role", row.role)?,
            tenant: related(&self.tenants, "tenant", row.tenant)?,
            platform: related(&self.platforms, "platform", row.platform)?,
            primary_ip4: related(&self.ip_addresses, "ip address", row.primary_ip4)?,
            primary_ip6: related(&self.ip_addresses, "ip address", row.primary_ip6)?,
            vcpus: row.vcpus,
            memory: row.memory,
            disk: row.disk,
            comments: row.comments.clone(),
            custom_fields: row.custom_fields.clone(),
            created: row.created,
            last_updated: row.last_updated,
        })
    }

    fn load_interface(&self, id: u64) -> StoreResult<Interface> {
        let row = self.interfaces.get(id).ok_or(StoreError::NotFound {
            kind: Kind::Interface,
            id,
        })?;
        let tagged_vlans = row
            .tagged_vlans
            .iter()
            .filter_map(|v| related(&self.vlans, "vlan", Some(*v)).transpose())
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(Interface {
            id,
            name: row.name.clone(),
            virtual_machine: self.load_virtual_machine(row.virtual_machine)?,
            form_factor: row.form_factor,
            enabled: row.enabled,
            mac_address: row.mac_address,
            mtu: row.mtu,
            mode: row.mode,
            untagged_vlan: related(&self.vlans, "vlan", row.untagged_vlan)?,
            tagged_vlans,
            description: row.description.clone(),
        })
    }

    fn load_ip_address(&self, id: u64) -> StoreResult<IpAddress> {
        self.ip_addresses
            .get(&id)
            .cloned()
            .ok_or(StoreError::AddressNotFound(id))
    }

    fn save_cluster_type(&mut self, id: Option<u64>, input: WritableClusterType) -> StoreResult<u64> {
        ensure_exists(&self.cluster_types, Kind::ClusterType, id)?;
        let mut errors = ValidationErrors::new();
        check_unique(
            &mut errors,
            self.cluster_types.any_other(id, |t| t.name == input.name),
            "name",
            "cluster type",
        );
        check_unique(
            &mut errors,
            self.cluster_types.any_other(id, |t| t.slug == input.slug),
            "slug",
            "cluster type",
        );
        conflicts(errors)?;

        let (id, action) = assign_id(&mut self.cluster_types, id);
        self.cluster_types.insert(
            id,
            ClusterType {
                id,
                name: input.name,
                slug: input.slug,
            },
        );
        self.record(Kind::ClusterType, id, action);
        Ok(id)
    }

    fn save_cluster_group(
        &mut self,
        id: Option<u64>,
        input: WritableClusterGroup,
    ) -> StoreResult<u64> {
        ensure_exists(&self.cluster_groups, Kind::ClusterGroup, id)?;
        let mut errors = ValidationErrors::new();
        check_unique(
            &mut errors,
            self.cluster_groups.any_other(id, |g| g.name == input.name),
            "name",
            "cluster group",
        );
        check_unique(
            &mut errors,
            self.cluster_groups.any_other(id, |g| g.slug == input.slug),
            "slug",
            "cluster group",
        );
        conflicts(errors)?;

        let (id, action) = assign_id(&mut self.cluster_groups, id);
        self.cluster_groups.insert(
            id,
            ClusterGroup {
                id,
                name: input.name,
                slug: input.slug,
            },
        );
        self.record(Kind::ClusterGroup, id, action);
        Ok(id)
    }

    fn save_cluster(&mut self, id: Option<u64>, input: WritableCluster) -> StoreResult<u64> {
        ensure_exists(&self.clusters, Kind::Cluster, id)?;
        let mut errors = ValidationErrors::new();
        check_ref(&mut errors, "type", Some(input.cluster_type), |i| {
            self.cluster_types.contains(i)
        });
        check_ref(&mut errors, "group", input.group, |i| self.cluster_groups.contains(i));
        check_ref(&mut errors, "site", input.site, |i| self.sites.contains_key(&i));
        check_unique(
            &mut errors,
            self.clusters.any_other(id, |c| c.name == input.name),
            "name",
            "cluster",
        );
        conflicts(errors)?;

        let now = Utc::now();
        let created = id
            .and_then(|id| self.clusters.get(id))
            .map_or(now.date_naive(), |row| row.created);
        let (id, action) = assign_id(&mut self.clusters, id);
        self.clusters.insert(
            id,
            ClusterRow {
                name: input.name,
                cluster_type: input.cluster_type,
                group: input.group,
                site: input.site,
                comments: input.comments,
                custom_fields: input.custom_fields,
                created,
                last_updated: now,
            },
        );
        self.record(Kind::Cluster, id, action);
        Ok(id)
    }

    /// A primary address must exist, be of `family`, and sit on an interface
    /// of the machine being written.
    fn check_primary(
        &self,
        errors: &mut ValidationErrors,
        field: &str,
        address: Option<u64>,
        family: u8,
        vm: Option<u64>,
    ) {
        let Some(address) = address else {
            return;
        };
        let Some(ip) = self.ip_addresses.get(&address) else {
            errors.push(missing_pk(field, address));
            return;
        };
        if ip.family() != family {
            errors.push(FieldError::conflict(
                field,
                format!("{} is not an IPv{family} address.", ip.address),
            ));
            return;
        }
        let owner = ip
            .interface
            .and_then(|i| self.interfaces.get(i))
            .map(|row| row.virtual_machine);
        if vm.is_none() || owner != vm {
            errors.push(FieldError::conflict(
                field,
                format!(
                    "The specified IP address ({}) is not assigned to this virtual machine.",
                    ip.address
                ),
            ));
        }
    }

    fn save_virtual_machine(
        &mut self,
        id: Option<u64>,
        input: WritableVirtualMachine,
    ) -> StoreResult<u64> {
        ensure_exists(&self.virtual_machines, Kind::VirtualMachine, id)?;
        let mut errors = ValidationErrors::new();
        check_ref(&mut errors, "cluster", Some(input.cluster), |i| self.clusters.contains(i));
        check_ref(&mut errors, "role", input.role, |i| self.device_roles.contains_key(&i));
        check_ref(&mut errors, "tenant", input.tenant, |i| self.tenants.contains_key(&i));
        check_ref(&mut errors, "platform", input.platform, |i| {
            self.platforms.contains_key(&i)
        });
        self.check_primary(&mut errors, "primary_ip4", input.primary_ip4, 4, id);
        self.check_primary(&mut errors, "primary_ip6", input.primary_ip6, 6, id);
        check_unique(
            &mut errors,
            self.virtual_machines.any_other(id, |vm| vm.name == input.name),
            "name",
            "virtual machine",
        );
        conflicts(errors)?;

        let now = Utc::now();
        let created = id
            .and_then(|id| self.virtual_machines.get(id))
            .map_or(now.date_naive(), |row| row.created);
        let (id, action) = assign_id(&mut self.virtual_machines, id);
        self.virtual_machines.insert(
            id,
            VirtualMachineRow {
                name: input.name,
                status: input.status,
                cluster: input.cluster,
                role: input.role,
                tenant: input.tenant,
                platform: input.platform,
                primary_ip4: input.primary_ip4,
                primary_ip6: input.primary_ip6,
                vcpus: input.vcpus,
                memory: input.memory,
                disk: input.disk,
                comments: input.comments,
                custom_fields: input.custom_fields,
                created,
                last_updated: now,
            },
        );
        self.record(Kind::VirtualMachine, id, action);
        Ok(id)
    }

    fn save_interface(&mut self, id: Option<u64>, input: WritableInterface) -> StoreResult<u64> {
        ensure_exists(&self.interfaces, Kind::Interface, id)?;
        let mut errors = ValidationErrors::new();
        check_ref(&mut errors, "virtual_machine", Some(input.virtual_machine), |i| {
            self.virtual_machines.contains(i)
        });
        check_ref(&mut errors, "untagged_vlan", input.untagged_vlan, |i| {
            self.vlans.contains_key(&i)
        });
        if let Some(missing) = input
            .tagged_vlans
            .iter()
            .find(|v| !self.vlans.contains_key(v))
        {
            errors.push(missing_pk("tagged_vlans", *missing));
        }
        if self.interfaces.any_other(id, |i| {
            i.virtual_machine == input.virtual_machine && i.name == input.name
        }) {
            errors.push(FieldError::conflict(
                "name",
                "The fields virtual_machine, name must make a unique set.",
            ));
        }
        conflicts(errors)?;

        let previous_vm = id
            .and_then(|id| self.interfaces.get(id))
            .map(|row| row.virtual_machine);
        let (id, action) = assign_id(&mut self.interfaces, id);
        if let Some(previous_vm) = previous_vm.filter(|vm| *vm != input.virtual_machine) {
            self.release_primaries(previous_vm, id);
        }
        self.interfaces.insert(
            id,
            InterfaceRow {
                name: input.name,
                virtual_machine: input.virtual_machine,
                form_factor: input.form_factor,
                enabled: input.enabled,
                mac_address: input.mac_address,
                mtu: input.mtu,
                mode: input.mode,
                untagged_vlan: input.untagged_vlan,
                tagged_vlans: input.tagged_vlans,
                description: input.description,
            },
        );
        self.record(Kind::Interface, id, action);
        Ok(id)
    }

    fn clear_primaries(&mut self, vm: u64, released: impl Fn(u64) -> bool) {
        let Some(row) = self.virtual_machines.get_mut(vm) else {
            return;
        };
        let mut changed = false;
        if row.primary_ip4.is_some_and(&released) {
            row.primary_ip4 = None;
            changed = true;
        }
        if row.primary_ip6.is_some_and(&released) {
            row.primary_ip6 = None;
            changed = true;
        }
        if changed {
            tracing::debug!(virtual_machine = vm, "primary address released");
            self.record(Kind::VirtualMachine, vm, ChangeAction::Updated);
        }
    }

    /// Clear primaries of `vm` that point at addresses on `interface`.
    fn release_primaries(&mut self, vm: u64, interface: u64) {
        let on_interface: BTreeSet<u64> = self
            .ip_addresses
            .values()
            .filter(|ip| ip.interface == Some(interface))
            .map(|ip| ip.id)
            .collect();
        if !on_interface.is_empty() {
            self.clear_primaries(vm, |ip| on_interface.contains(&ip));
        }
    }

    fn remove_interface(&mut self, id: u64, release_primaries: bool) {
        let Some(row) = self.interfaces.remove(id) else {
            return;
        };
        if release_primaries {
            self.release_primaries(row.virtual_machine, id);
        }
        for ip in self
            .ip_addresses
            .values_mut()
            .filter(|ip| ip.interface == Some(id))
        {
            ip.interface = None;
        }
        self.record(Kind::Interface, id, ChangeAction::Deleted);
    }

    fn delete(&mut self, kind: Kind, id: u64) -> StoreResult<u64> {
        match kind {
            Kind::ClusterType => {
                ensure_exists(&self.cluster_types, kind, Some(id))?;
                let users = self
                    .clusters
                    .iter()
                    .filter(|(_, c)| c.cluster_type == id)
                    .count();
                protect(kind, id, users, "cluster")?;
                self.cluster_types.remove(id);
            }
            Kind::ClusterGroup => {
                ensure_exists(&self.cluster_groups, kind, Some(id))?;
                let users = self
                    .clusters
                    .iter()
                    .filter(|(_, c)| c.group == Some(id))
                    .count();
                protect(kind, id, users, "cluster")?;
                self.cluster_groups.remove(id);
            }
            Kind::Cluster => {
                ensure_exists(&self.clusters, kind, Some(id))?;
                let users = self
                    .virtual_machines
                    .iter()
                    .filter(|(_, vm)| vm.cluster == id)
                    .count();
                protect(kind, id, users, "virtual machine")?;
                self.clusters.remove(id);
            }
            Kind::VirtualMachine => {
                ensure_exists(&self.virtual_machines, kind, Some(id))?;
                let interfaces: Vec<u64> = self
                    .interfaces
                    .iter()
                    .filter(|(_, i)| i.virtual_machine == id)
                    .map(|(iface, _)| iface)
                    .collect();
                tracing::debug!(virtual_machine = id, interfaces = interfaces.len(), "cascading delete");
                for iface in interfaces {
                    self.remove_interface(iface, false);
                }
                self.virtual_machines.remove(id);
            }
            Kind::Interface => {
                ensure_exists(&self.interfaces, kind, Some(id))?;
                self.remove_interface(id, true);
                return Ok(id);
            }
        }
        self.record(kind, id, ChangeAction::Deleted);
        Ok(id)
    }

    fn assign_ip_address(&mut self, id: u64, interface: Option<u64>) -> StoreResult<u64> {
        let current = self.load_ip_address(id)?.interface;
        if let Some(iface) = interface {
            if !self.interfaces.contains(iface) {
                return Err(StoreError::Conflict(missing_pk("interface", iface).into()));
            }
        }
        if current == interface {
            return Ok(id);
        }

        let owner = |iface: Option<u64>| {
            iface
                .and_then(|i| self.interfaces.get(i))
                .map(|row| row.virtual_machine)
        };
        let (old_vm, new_vm) = (owner(current), owner(interface));
        if let Some(old_vm) = old_vm.filter(|vm| Some(*vm) != new_vm) {
            self.clear_primaries(old_vm, |ip| ip == id);
        }
        if let Some(ip) = self.ip_addresses.get_mut(&id) {
            ip.interface = interface;
        }
        Ok(id)
    }
}

#[async_trait::async_trait]
impl InventoryStore for MemoryInventory {
    async fn cluster_type(&self, id: u64) -> StoreResult<ClusterType> {
        self.inner.read().await.load_cluster_type(id)
    }

    async fn cluster_types(&self, page: Page) -> StoreResult<Listing<ClusterType>> {
        let inner = self.inner.read().await;
        listing(&inner.cluster_types, page, |id| inner.load_cluster_type(id))
    }

    async fn save_cluster_type(
        &self,
        id: Option<u64>,
        input: WritableClusterType,
    ) -> StoreResult<ClusterType> {
        self.write(
            move |inner| inner.save_cluster_type(id, input),
            Inner::load_cluster_type,
        )
        .await
    }

    async fn update_cluster_type(
        &self,
        id: u64,
        merge: Merge<'_, ClusterType, WritableClusterType>,
    ) -> StoreResult<ClusterType> {
        self.write(
            move |inner| {
                let current = inner.load_cluster_type(id)?;
                let input = merge(&current).map_err(StoreError::Conflict)?;
                inner.save_cluster_type(Some(id), input)
            },
            Inner::load_cluster_type,
        )
        .await
    }

    async fn cluster_group(&self, id: u64) -> StoreResult<ClusterGroup> {
        self.inner.read().await.load_cluster_group(id)
    }

    async fn cluster_groups(&self, page: Page) -> StoreResult<Listing<ClusterGroup>> {
        let inner = self.inner.read().await;
        listing(&inner.cluster_groups, page, |id| inner.load_cluster_group(id))
    }

    async fn save_cluster_group(
        &self,
        id: Option<u64>,
        input: WritableClusterGroup,
    ) -> StoreResult<ClusterGroup> {
        self.write(
            move |inner| inner.save_cluster_group(id, input),
            Inner::load_cluster_group,
        )
        .await
    }

    async fn update_cluster_group(
        &self,
        id: u64,
        merge: Merge<'_, ClusterGroup, WritableClusterGroup>,
    ) -> StoreResult<ClusterGroup> {
        self.write(
            move |inner| {
                let current = inner.load_cluster_group(id)?;
                let input = merge(&current).map_err(StoreError::Conflict)?;
                inner.save_cluster_group(Some(id), input)
            },
            Inner::load_cluster_group,
        )
        .await
    }

    async fn cluster(&self, id: u64) -> StoreResult<Cluster> {
        self.inner.read().await.load_cluster(id)
    }

    async fn clusters(&self, page: Page) -> StoreResult<Listing<Cluster>> {
        let inner = self.inner.read().await;
        listing(&inner.clusters, page, |id| inner.load_cluster(id))
    }

    async fn save_cluster(&self, id: Option<u64>, input: WritableCluster) -> StoreResult<Cluster> {
        self.write(move |inner| inner.save_cluster(id, input), Inner::load_cluster)
            .await
    }

    async fn update_cluster(
        &self,
        id: u64,
        merge: Merge<'_, Cluster, WritableCluster>,
    ) -> StoreResult<Cluster> {
        self.write(
            move |inner| {
                let current = inner.load_cluster(id)?;
                let input = merge(&current).map_err(StoreError::Conflict)?;
                inner.save_cluster(Some(id), input)
            },
            Inner::load_cluster,
        )
        .await
    }

    async fn virtual_machine(&self, id: u64) -> StoreResult<VirtualMachine> {
        self.inner.read().await.load_virtual_machine(id)
    }

    async fn virtual_machines(&self, page: Page) -> StoreResult<Listing<VirtualMachine>> {
        let inner = self.inner.read().await;
        listing(&inner.virtual_machines, page, |id| {
            inner.load_virtual_machine(id)
        })
    }

    async fn save_virtual_machine(
        &self,
        id: Option<u64>,
        input: WritableVirtualMachine,
    ) -> StoreResult<VirtualMachine> {
        self.write(
            move |inner| inner.save_virtual_machine(id, input),
            Inner::load_virtual_machine,
        )
        .await
    }

    async fn update_virtual_machine(
        &self,
        id: u64,
        merge: Merge<'_, VirtualMachine, WritableVirtualMachine>,
    ) -> StoreResult<VirtualMachine> {
        self.write(
            move |inner| {
                let current = inner.load_virtual_machine(id)?;
                let input = merge(&current).map_err(StoreError::Conflict)?;
                inner.save_virtual_machine(Some(id), input)
            },
            Inner::load_virtual_machine,
        )
        .await
    }

    async fn interface(&self, id: u64) -> StoreResult<Interface> {
        self.inner.read().await.load_interface(id)
    }

    async fn interfaces(&self, page: Page) -> StoreResult<Listing<Interface>> {
        let inner = self.inner.read().await;
        listing(&inner.interfaces, page, |id| inner.load_interface(id))
    }

    async fn save_interface(
        &self,
        id: Option<u64>,
        input: WritableInterface,
    ) -> StoreResult<Interface> {
        self.write(
            move |inner| inner.save_interface(id, input),
            Inner::load_interface,
        )
        .await
    }

    async fn update_interface(
        &self,
        id: u64,
        merge: Merge<'_, Interface, WritableInterface>,
    ) -> StoreResult<Interface> {
        self.write(
            move |inner| {
                let current = inner.load_interface(id)?;
                let input = merge(&current).map_err(StoreError::Conflict)?;
                inner.save_interface(Some(id), input)
            },
            Inner::load_interface,
        )
        .await
    }

    async fn delete(&self, kind: Kind, id: u64) -> StoreResult<()> {
        self.write(move |inner| inner.delete(kind, id), |_, _| Ok(()))
            .await
    }

    async fn ip_address(&self, id: u64) -> StoreResult<IpAddress> {
        self.inner.read().await.load_ip_address(id)
    }

    async fn assign_ip_address(&self, id: u64, interface: Option<u64>) -> StoreResult<IpAddress> {
        self.write(
            move |inner| inner.assign_ip_address(id, interface),
            Inner::load_ip_address,
        )
        .await
    }

    async fn watch(&self, start_revision_exclusive: Option<u64>) -> StoreResult<ChangeStream> {
        let min_rev = start_revision_exclusive.unwrap_or(0);
        let rx = self.tx.subscribe();
        let stream = BroadcastStream::new(rx).filter_map(move |msg| match msg {
            Ok(ev) if ev.revision > min_rev => Some(ev),
            Ok(_) => None,
            Err(err) => {
                tracing::warn!(error = %err, "change watcher lagged");
                None
            }
        });
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use virtinv_common::{CustomFields, FormFactor, VmStatus};

    fn fixtures() -> Fixtures {
        Fixtures {
            sites: vec![Site {
                id: 1,
                name: "DC1".to_string(),
                slug: "dc1".to_string(),
            }],
            device_roles: vec![DeviceRole {
                id: 1,
                name: "Web Server".to_string(),
                slug: "web-server".to_string(),
            }],
            ip_addresses: vec![
                IpAddress {
                    id: 10,
                    address: "192.0.2.10/24".parse().unwrap(),
                    interface: None,
                },
                IpAddress {
                    id: 11,
                    address: "2001:db8::10/64".parse().unwrap(),
                    interface: None,
                },
            ],
            vlans: vec![
                Vlan {
                    id: 100,
                    vid: 10,
                    name: "mgmt".to_string(),
                },
                Vlan {
                    id: 101,
                    vid: 20,
                    name: "web".to_string(),
                },
            ],
            ..Fixtures::default()
        }
    }

    fn cluster_type(name: &str) -> WritableClusterType {
        WritableClusterType {
            name: name.to_string(),
            slug: name.to_lowercase(),
        }
    }

    fn vm_input(name: &str, cluster: u64) -> WritableVirtualMachine {
        WritableVirtualMachine {
            name: name.to_string(),
            status: VmStatus::Active,
            cluster,
            role: Some(1),
            tenant: None,
            platform: None,
            primary_ip4: None,
            primary_ip6: None,
            vcpus: Some(2),
            memory: Some(4096),
            disk: None,
            comments: String::new(),
            custom_fields: CustomFields::new(),
        }
    }

    fn iface_input(name: &str, vm: u64) -> WritableInterface {
        WritableInterface {
            name: name.to_string(),
            virtual_machine: vm,
            form_factor: FormFactor::Virtual,
            enabled: true,
            mac_address: None,
            mtu: None,
            mode: None,
            untagged_vlan: None,
            tagged_vlans: BTreeSet::new(),
            description: String::new(),
        }
    }

    /// Store with fixtures, one cluster type and one cluster.
    async fn seeded() -> (MemoryInventory, u64) {
        let store = MemoryInventory::new();
        store.load_fixtures(fixtures()).await;
        let ct = store.save_cluster_type(None, cluster_type("KVM")).await.unwrap();
        let cluster = store
            .save_cluster(
                None,
                WritableCluster {
                    name: "dc1-kvm".to_string(),
                    cluster_type: ct.id,
                    group: None,
                    site: Some(1),
                    comments: String::new(),
                    custom_fields: CustomFields::new(),
                },
            )
            .await
            .unwrap();
        (store, cluster.id)
    }

    fn conflict_on(err: StoreError, field: &str) -> bool {
        matches!(err, StoreError::Conflict(ref e) if e.for_field(field).is_some())
    }

    #[tokio::test]
    async fn test_uniqueness_is_enforced() {
        let (store, _) = seeded().await;
        let err = store
            .save_cluster_type(None, cluster_type("KVM"))
            .await
            .unwrap_err();
        match err {
            StoreError::Conflict(e) => {
                assert_eq!(e.for_field("name").unwrap().code(), "conflict");
                assert!(e.for_field("slug").is_some());
            }
            other => panic!("unexpected: {other:?}"),
        }

        // Saving an object under its own name is not a conflict.
        let saved = store
            .save_cluster_type(Some(1), cluster_type("KVM"))
            .await
            .unwrap();
        assert_eq!(saved.id, 1);
    }

    #[tokio::test]
    async fn test_unknown_references_name_the_field() {
        let (store, _) = seeded().await;
        let err = store
            .save_cluster(
                None,
                WritableCluster {
                    name: "orphan".to_string(),
                    cluster_type: 99,
                    group: Some(5),
                    site: None,
                    comments: String::new(),
                    custom_fields: CustomFields::new(),
                },
            )
            .await
            .unwrap_err();
        match err {
            StoreError::Conflict(e) => {
                assert!(e.for_field("type").is_some());
                assert!(e.for_field("group").is_some());
                assert!(e.for_field("site").is_none());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_update_keeps_created_and_unknown_id_is_not_found() {
        let (store, cluster) = seeded().await;
        let vm = store.save_virtual_machine(None, vm_input("web01", cluster)).await.unwrap();
        let mut input = vm_input("web01", cluster);
        input.status = VmStatus::Offline;
        let updated = store.save_virtual_machine(Some(vm.id), input).await.unwrap();
        assert_eq!(updated.created, vm.created);
        assert!(updated.last_updated >= vm.last_updated);
        assert_eq!(updated.status, VmStatus::Offline);

        let err = store
            .save_virtual_machine(Some(42), vm_input("ghost", cluster))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::NotFound {
                kind: Kind::VirtualMachine,
                id: 42
            }
        ));
    }

    #[tokio::test]
    async fn test_referenced_objects_are_protected() {
        let (store, cluster) = seeded().await;
        store.save_virtual_machine(None, vm_input("web01", cluster)).await.unwrap();

        let err = store.delete(Kind::ClusterType, 1).await.unwrap_err();
        assert!(matches!(err, StoreError::Protected { kind: Kind::ClusterType, .. }));
        let err = store.delete(Kind::Cluster, cluster).await.unwrap_err();
        assert!(matches!(err, StoreError::Protected { kind: Kind::Cluster, .. }));
        assert!(store.cluster(cluster).await.is_ok());
    }

    #[tokio::test]
    async fn test_primary_addresses_must_belong_to_the_machine() {
        let (store, cluster) = seeded().await;
        let vm = store.save_virtual_machine(None, vm_input("web01", cluster)).await.unwrap();

        let mut input = vm_input("web01", cluster);
        input.primary_ip4 = Some(11);
        let err = store.save_virtual_machine(Some(vm.id), input).await.unwrap_err();
        assert!(conflict_on(err, "primary_ip4"));

        let mut input = vm_input("web01", cluster);
        input.primary_ip4 = Some(10);
        let err = store.save_virtual_machine(Some(vm.id), input).await.unwrap_err();
        assert!(conflict_on(err, "primary_ip4"));

        let iface = store.save_interface(None, iface_input("eth0", vm.id)).await.unwrap();
        store.assign_ip_address(10, Some(iface.id)).await.unwrap();
        let mut input = vm_input("web01", cluster);
        input.primary_ip4 = Some(10);
        let vm = store.save_virtual_machine(Some(vm.id), input).await.unwrap();
        assert_eq!(vm.primary_ip(false).map(|ip| ip.id), Some(10));
    }

    #[tokio::test]
    async fn test_deleting_interface_releases_addresses() {
        let (store, cluster) = seeded().await;
        let vm = store.save_virtual_machine(None, vm_input("web01", cluster)).await.unwrap();
        let iface = store.save_interface(None, iface_input("eth0", vm.id)).await.unwrap();
        store.assign_ip_address(11, Some(iface.id)).await.unwrap();
        let mut input = vm_input("web01", cluster);
        input.primary_ip6 = Some(11);
        store.save_virtual_machine(Some(vm.id), input).await.unwrap();

        store.delete(Kind::Interface, iface.id).await.unwrap();
        let vm = store.virtual_machine(vm.id).await.unwrap();
        assert_eq!(vm.primary_ip6, None);
        assert_eq!(store.ip_address(11).await.unwrap().interface, None);
    }

    #[tokio::test]
    async fn test_deleting_machine_cascades_to_interfaces() {
        let (store, cluster) = seeded().await;
        let vm = store.save_virtual_machine(None, vm_input("web01", cluster)).await.unwrap();
        let eth0 = store.save_interface(None, iface_input("eth0", vm.id)).await.unwrap();
        let eth1 = store.save_interface(None, iface_input("eth1", vm.id)).await.unwrap();

        let mut events = store.watch(None).await.unwrap();
        store.delete(Kind::VirtualMachine, vm.id).await.unwrap();

        for expected in [(Kind::Interface, eth0.id), (Kind::Interface, eth1.id), (Kind::VirtualMachine, vm.id)] {
            let ev = events.next().await.unwrap();
            assert_eq!((ev.kind, ev.id), expected);
            assert_eq!(ev.action, ChangeAction::Deleted);
        }
        assert!(matches!(
            store.interface(eth0.id).await,
            Err(StoreError::NotFound { kind: Kind::Interface, .. })
        ));
        // The cluster is free to go once its machine is gone.
        store.delete(Kind::Cluster, cluster).await.unwrap();
    }

    #[tokio::test]
    async fn test_interface_names_are_unique_per_machine() {
        let (store, cluster) = seeded().await;
        let web01 = store.save_virtual_machine(None, vm_input("web01", cluster)).await.unwrap();
        let web02 = store.save_virtual_machine(None, vm_input("web02", cluster)).await.unwrap();
        store.save_interface(None, iface_input("eth0", web01.id)).await.unwrap();
        store.save_interface(None, iface_input("eth0", web02.id)).await.unwrap();

        let err = store
            .save_interface(None, iface_input("eth0", web01.id))
            .await
            .unwrap_err();
        assert!(conflict_on(err, "name"));
    }

    #[tokio::test]
    async fn test_tagged_vlans_load_in_id_order() {
        let (store, cluster) = seeded().await;
        let vm = store.save_virtual_machine(None, vm_input("web01", cluster)).await.unwrap();
        let mut input = iface_input("eth0", vm.id);
        input.tagged_vlans = BTreeSet::from([101, 100]);
        input.untagged_vlan = Some(100);
        let iface = store.save_interface(None, input).await.unwrap();
        let ids: Vec<u64> = iface.tagged_vlans.iter().map(|v| v.id).collect();
        assert_eq!(ids, vec![100, 101]);

        let mut input = iface_input("eth1", vm.id);
        input.tagged_vlans = BTreeSet::from([100, 999]);
        let err = store.save_interface(None, input).await.unwrap_err();
        assert!(conflict_on(err, "tagged_vlans"));
    }

    #[tokio::test]
    async fn test_listing_pages_and_revisions() {
        let store = MemoryInventory::new();
        let mut events = store.watch(None).await.unwrap();
        for name in ["KVM", "Xen", "VMware"] {
            store.save_cluster_type(None, cluster_type(name)).await.unwrap();
        }

        let page = store
            .cluster_types(Page { offset: 1, limit: 1 })
            .await
            .unwrap();
        assert_eq!(page.count, 3);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].name, "Xen");

        let mut last = 0;
        for _ in 0..3 {
            let ev = events.next().await.unwrap();
            assert_eq!(ev.action, ChangeAction::Created);
            assert!(ev.revision > last);
            last = ev.revision;
        }
    }
}
