use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use virtinv_common::repr::{
    WritableCluster, WritableClusterGroup, WritableClusterType, WritableInterface,
    WritableVirtualMachine,
};
use virtinv_common::{
    Cluster, ClusterGroup, ClusterType, Interface, IpAddress, Kind, ValidationErrors,
    VirtualMachine,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Created,
    Updated,
    Deleted,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: Kind,
    pub id: u64,
    pub action: ChangeAction,
    pub revision: u64,
}

pub type ChangeStream = Pin<Box<dyn Stream<Item = ChangeEvent> + Send>>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: Kind, id: u64 },

    /// A reference or uniqueness check failed; errors are keyed by field.
    #[error("write rejected: {0}")]
    Conflict(ValidationErrors),

    #[error("ip address {0} not found")]
    AddressNotFound(u64),

    #[error("{kind} {id} cannot be deleted: {message}")]
    Protected { kind: Kind, id: u64, message: String },

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Builds the input for an update from the object as currently stored. The
/// store calls it while holding its write lock, so nothing lands between the
/// read and the write.
pub type Merge<'a, E, W> = Box<dyn FnOnce(&E) -> Result<W, ValidationErrors> + Send + 'a>;

/// Window into an id-ordered listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Listing<T> {
    /// Total number of objects, independent of the page.
    pub count: usize,
    pub items: Vec<T>,
}

/// Persistence for the virtualization inventory.
///
/// Reads return fully loaded entities with their relationships resolved.
/// `save_*` creates when `id` is `None` and replaces the stored row otherwise;
/// the store enforces uniqueness and referential rules and assigns timestamps.
/// `update_*` derives the input from the stored object and saves it in one step.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn cluster_type(&self, id: u64) -> StoreResult<ClusterType>;
    async fn cluster_types(&self, page: Page) -> StoreResult<Listing<ClusterType>>;
    async fn save_cluster_type(
        &self,
        id: Option<u64>,
        input: WritableClusterType,
    ) -> StoreResult<ClusterType>;
    async fn update_cluster_type(
        &self,
        id: u64,
        merge: Merge<'_, ClusterType, WritableClusterType>,
    ) -> StoreResult<ClusterType>;

    async fn cluster_group(&self, id: u64) -> StoreResult<ClusterGroup>;
    async fn cluster_groups(&self, page: Page) -> StoreResult<Listing<ClusterGroup>>;
    async fn save_cluster_group(
        &self,
        id: Option<u64>,
        input: WritableClusterGroup,
    ) -> StoreResult<ClusterGroup>;
    async fn update_cluster_group(
        &self,
        id: u64,
        merge: Merge<'_, ClusterGroup, WritableClusterGroup>,
    ) -> StoreResult<ClusterGroup>;

    async fn cluster(&self, id: u64) -> StoreResult<Cluster>;
    async fn clusters(&self, page: Page) -> StoreResult<Listing<Cluster>>;
    async fn save_cluster(&self, id: Option<u64>, input: WritableCluster) -> StoreResult<Cluster>;
    async fn update_cluster(
        &self,
        id: u64,
        merge: Merge<'_, Cluster, WritableCluster>,
    ) -> StoreResult<Cluster>;

    async fn virtual_machine(&self, id: u64) -> StoreResult<VirtualMachine>;
    async fn virtual_machines(&self, page: Page) -> StoreResult<Listing<VirtualMachine>>;
    async fn save_virtual_machine(
        &self,
        id: Option<u64>,
        input: WritableVirtualMachine,
    ) -> StoreResult<VirtualMachine>;
    async fn update_virtual_machine(
        &self,
        id: u64,
        merge: Merge<'_, VirtualMachine, WritableVirtualMachine>,
    ) -> StoreResult<VirtualMachine>;

    async fn interface(&self, id: u64) -> StoreResult<Interface>;
    async fn interfaces(&self, page: Page) -> StoreResult<Listing<Interface>>;
    async fn save_interface(
        &self,
        id: Option<u64>,
        input: WritableInterface,
    ) -> StoreResult<Interface>;
    async fn update_interface(
        &self,
        id: u64,
        merge: Merge<'_, Interface, WritableInterface>,
    ) -> StoreResult<Interface>;

    async fn delete(&self, kind: Kind, id: u64) -> StoreResult<()>;

    async fn ip_address(&self, id: u64) -> StoreResult<IpAddress>;

    /// Move an address onto `interface`, or unassign it with `None`.
    async fn assign_ip_address(&self, id: u64, interface: Option<u64>) -> StoreResult<IpAddress>;

    /// Change events committed after `start_revision_exclusive`.
    async fn watch(&self, start_revision_exclusive: Option<u64>) -> StoreResult<ChangeStream>;
}
