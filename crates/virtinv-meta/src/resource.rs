//! Glue between the representation layer and the store: one trait that says
//! how each kind is fetched and saved, and the write path shared by create,
//! replace and partial update.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use virtinv_common::repr::{
    WritableCluster, WritableClusterGroup, WritableClusterType, WritableInterface,
    WritableVirtualMachine,
};
use virtinv_common::{
    Cluster, ClusterGroup, ClusterType, Interface, Kind, ReprContext, Represent,
    ValidationErrors, VirtualMachine, Writable, WriteMode,
};

use crate::types::{InventoryStore, Listing, Merge, Page, StoreError, StoreResult};

#[derive(Debug, Error)]
pub enum WriteError {
    /// The payload or the store rejected one or more fields.
    #[error("validation failed: {0}")]
    Invalid(ValidationErrors),

    #[error("{kind} {id} not found")]
    NotFound { kind: Kind, id: u64 },

    #[error(transparent)]
    Store(StoreError),
}

impl From<ValidationErrors> for WriteError {
    fn from(errors: ValidationErrors) -> Self {
        WriteError::Invalid(errors)
    }
}

impl From<StoreError> for WriteError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(errors) => WriteError::Invalid(errors),
            StoreError::NotFound { kind, id } => WriteError::NotFound { kind, id },
            other => WriteError::Store(other),
        }
    }
}

#[async_trait]
pub trait StoredResource: Represent + Sized + Send + Sync + 'static {
    type Input: Writable<Entity = Self> + Send;

    const KIND: Kind;

    fn id(&self) -> u64;

    async fn fetch(store: &dyn InventoryStore, id: u64) -> StoreResult<Self>;

    async fn fetch_page(store: &dyn InventoryStore, page: Page) -> StoreResult<Listing<Self>>;

    async fn save(
        store: &dyn InventoryStore,
        id: Option<u64>,
        input: Self::Input,
    ) -> StoreResult<Self>;

    async fn update(
        store: &dyn InventoryStore,
        id: u64,
        merge: Merge<'_, Self, Self::Input>,
    ) -> StoreResult<Self>;
}

macro_rules! stored_resource {
    (
        $entity:ty,
        $input:ty,
        $kind:expr,
        $fetch:ident,
        $fetch_page:ident,
        $save:ident,
        $update:ident
    ) => {
        #[async_trait]
        impl StoredResource for $entity {
            type Input = $input;

            const KIND: Kind = $kind;

            fn id(&self) -> u64 {
                self.id
            }

            async fn fetch(store: &dyn InventoryStore, id: u64) -> StoreResult<Self> {
                store.$fetch(id).await
            }

            async fn fetch_page(
                store: &dyn InventoryStore,
                page: Page,
            ) -> StoreResult<Listing<Self>> {
                store.$fetch_page(page).await
            }

            async fn save(
                store: &dyn InventoryStore,
                id: Option<u64>,
                input: Self::Input,
            ) -> StoreResult<Self> {
                store.$save(id, input).await
            }

            async fn update(
                store: &dyn InventoryStore,
                id: u64,
                merge: Merge<'_, Self, Self::Input>,
            ) -> StoreResult<Self> {
                store.$update(id, merge).await
            }
        }
    };
}

stored_resource!(
    ClusterType,
    WritableClusterType,
    Kind::ClusterType,
    cluster_type,
    cluster_types,
    save_cluster_type,
    update_cluster_type
);
stored_resource!(
    ClusterGroup,
    WritableClusterGroup,
    Kind::ClusterGroup,
    cluster_group,
    cluster_groups,
    save_cluster_group,
    update_cluster_group
);
stored_resource!(
    Cluster,
    WritableCluster,
    Kind::Cluster,
    cluster,
    clusters,
    save_cluster,
    update_cluster
);
stored_resource!(
    VirtualMachine,
    WritableVirtualMachine,
    Kind::VirtualMachine,
    virtual_machine,
    virtual_machines,
    save_virtual_machine,
    update_virtual_machine
);
stored_resource!(
    Interface,
    WritableInterface,
    Kind::Interface,
    interface,
    interfaces,
    save_interface,
    update_interface
);

/// Which object a payload writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteTarget {
    Create,
    Replace(u64),
    Patch(u64),
}

/// Validate `payload` against the current state of the target and persist it.
///
/// Updates build their input inside the store's write, from the object as it
/// is stored at that moment. Field-level problems from the payload and from
/// the store come back together as [`WriteError::Invalid`]; nothing is
/// written in that case.
pub async fn from_writable<R: StoredResource>(
    store: &dyn InventoryStore,
    ctx: &ReprContext<'_>,
    payload: &Value,
    target: WriteTarget,
) -> Result<R, WriteError> {
    let saved = match target {
        WriteTarget::Create => {
            let input = R::Input::from_payload(payload, WriteMode::Create, ctx)?;
            R::save(store, None, input).await?
        }
        WriteTarget::Replace(id) => {
            let merge: Merge<'_, R, R::Input> = Box::new(move |current: &R| {
                R::Input::from_payload(payload, WriteMode::Replace(current), ctx)
            });
            R::update(store, id, merge).await?
        }
        WriteTarget::Patch(id) => {
            let merge: Merge<'_, R, R::Input> = Box::new(move |current: &R| {
                R::Input::from_payload(payload, WriteMode::Patch(current), ctx)
            });
            R::update(store, id, merge).await?
        }
    };
    tracing::debug!(kind = %R::KIND, id = saved.id(), ?target, "saved");
    Ok(saved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::fixtures::Fixtures;
    use crate::memory::MemoryInventory;
    use serde_json::json;
    use virtinv_common::{
        CustomFieldSpec, FormFactor, LinkResolver, Site, StaticCustomFieldRegistry, Vlan,
        VmStatus,
    };

    fn registry() -> StaticCustomFieldRegistry {
        StaticCustomFieldRegistry::new().with_field(
            Kind::Cluster,
            CustomFieldSpec {
                name: "env".to_string(),
                label: None,
                default: Some(json!("prod")),
            },
        )
    }

    async fn store() -> MemoryInventory {
        let store = MemoryInventory::new();
        store
            .load_fixtures(Fixtures {
                sites: vec![Site {
                    id: 1,
                    name: "DC1".to_string(),
                    slug: "dc1".to_string(),
                }],
                vlans: vec![Vlan {
                    id: 100,
                    vid: 10,
                    name: "mgmt".to_string(),
                }],
                ..Fixtures::default()
            })
            .await;
        store
    }

    #[tokio::test]
    async fn test_create_then_patch_cluster() {
        let store = store().await;
        let links = LinkResolver::new("http://inv.local/api/").unwrap();
        let registry = registry();
        let ctx = ReprContext {
            links: &links,
            custom_fields: &registry,
            prefer_ipv4: false,
        };

        let ct: ClusterType = from_writable(&store, &ctx, &json!({"name": "KVM"}), WriteTarget::Create)
            .await
            .unwrap();
        assert_eq!(ct.slug, "kvm");

        let cluster: Cluster = from_writable(
            &store,
            &ctx,
            &json!({"name": "dc1-kvm", "type": ct.id, "site": 1}),
            WriteTarget::Create,
        )
        .await
        .unwrap();
        assert_eq!(cluster.custom_fields.get("env"), Some(&json!("prod")));
        assert_eq!(cluster.group, None);

        let patched: Cluster = from_writable(
            &store,
            &ctx,
            &json!({"comments": "primary"}),
            WriteTarget::Patch(cluster.id),
        )
        .await
        .unwrap();
        assert_eq!(patched.comments, "primary");
        assert_eq!(patched.site.map(|s| s.id), Some(1));
        assert_eq!(patched.created, cluster.created);
    }

    #[tokio::test]
    async fn test_payload_and_store_errors_surface_as_invalid() {
        let store = store().await;
        let links = LinkResolver::new("http://inv.local/api/").unwrap();
        let registry = registry();
        let ctx = ReprContext {
            links: &links,
            custom_fields: &registry,
            prefer_ipv4: false,
        };

        let err = from_writable::<Cluster>(&store, &ctx, &json!({"name": "x"}), WriteTarget::Create)
            .await
            .unwrap_err();
        match err {
            WriteError::Invalid(e) => assert_eq!(e.for_field("type").unwrap().code(), "required"),
            other => panic!("unexpected: {other:?}"),
        }

        let err = from_writable::<Cluster>(
            &store,
            &ctx,
            &json!({"name": "x", "type": 77}),
            WriteTarget::Create,
        )
        .await
        .unwrap_err();
        match err {
            WriteError::Invalid(e) => assert_eq!(e.for_field("type").unwrap().code(), "conflict"),
            other => panic!("unexpected: {other:?}"),
        }

        let err = from_writable::<VirtualMachine>(
            &store,
            &ctx,
            &json!({"name": "web01"}),
            WriteTarget::Replace(5),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            WriteError::NotFound {
                kind: Kind::VirtualMachine,
                id: 5
            }
        ));
    }

    #[tokio::test]
    async fn test_interface_write_path() {
        let store = store().await;
        let links = LinkResolver::new("http://inv.local/api/").unwrap();
        let registry = registry();
        let ctx = ReprContext {
            links: &links,
            custom_fields: &registry,
            prefer_ipv4: false,
        };

        let ct: ClusterType = from_writable(&store, &ctx, &json!({"name": "KVM"}), WriteTarget::Create)
            .await
            .unwrap();
        let cluster: Cluster = from_writable(
            &store,
            &ctx,
            &json!({"name": "c1", "type": ct.id}),
            WriteTarget::Create,
        )
        .await
        .unwrap();
        let vm: VirtualMachine = from_writable(
            &store,
            &ctx,
            &json!({"name": "web01", "cluster": cluster.id}),
            WriteTarget::Create,
        )
        .await
        .unwrap();
        assert_eq!(vm.status, VmStatus::Active);

        let iface: Interface = from_writable(
            &store,
            &ctx,
            &json!({
                "name": "eth0",
                "virtual_machine": vm.id,
                "tagged_vlans": [100, 100],
                "mode": 200
            }),
            WriteTarget::Create,
        )
        .await
        .unwrap();
        assert_eq!(iface.form_factor, FormFactor::Virtual);
        assert_eq!(iface.tagged_vlans.len(), 1);
        assert_eq!(iface.virtual_machine.cluster.cluster_type.name, "KVM");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_patches_keep_both_changes() {
        let store = store().await;
        let links = Arc::new(LinkResolver::new("http://inv.local/api/").unwrap());
        let registry = Arc::new(registry());
        let ctx = ReprContext {
            links: &links,
            custom_fields: registry.as_ref(),
            prefer_ipv4: false,
        };

        let ct: ClusterType = from_writable(&store, &ctx, &json!({"name": "KVM"}), WriteTarget::Create)
            .await
            .unwrap();
        let cluster: Cluster = from_writable(
            &store,
            &ctx,
            &json!({"name": "c1", "type": ct.id}),
            WriteTarget::Create,
        )
        .await
        .unwrap();
        let mut ids = Vec::new();
        for i in 0..200 {
            let vm: VirtualMachine = from_writable(
                &store,
                &ctx,
                &json!({"name": format!("vm{i}"), "cluster": cluster.id}),
                WriteTarget::Create,
            )
            .await
            .unwrap();
            ids.push(vm.id);
        }

        let mut tasks = Vec::new();
        for &id in &ids {
            for patch in [json!({"comments": "x"}), json!({"vcpus": 4})] {
                let store = store.clone();
                let links = links.clone();
                let registry = registry.clone();
                tasks.push(tokio::spawn(async move {
                    let ctx = ReprContext {
                        links: &links,
                        custom_fields: registry.as_ref(),
                        prefer_ipv4: false,
                    };
                    from_writable::<VirtualMachine>(&store, &ctx, &patch, WriteTarget::Patch(id))
                        .await
                        .map(|vm| vm.id)
                }));
            }
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        for id in ids {
            let vm = store.virtual_machine(id).await.unwrap();
            assert_eq!(vm.comments, "x", "vm {id}");
            assert_eq!(vm.vcpus, Some(4), "vm {id}");
        }
    }
}
