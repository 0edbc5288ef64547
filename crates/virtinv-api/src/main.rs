mod args;
mod handlers;
mod state;

use std::sync::Arc;

use axum::{
    routing::{get, MethodRouter},
    Router,
};
use clap::Parser;
use tokio_stream::StreamExt;

use virtinv_common::telemetry::init_tracing;
use virtinv_common::{
    Cluster, ClusterGroup, ClusterType, Interface, LinkResolver, StaticCustomFieldRegistry,
    ViewName, VirtualMachine,
};
use virtinv_meta::{Fixtures, InventoryStore, MemoryInventory, StoredResource};

use crate::args::Args;
use crate::handlers::{
    assign_ip_address, collection_path, create, destroy, get_ip_address, healthz, list,
    partial_update, retrieve, update,
};
use crate::state::AppState;

/// Mount `route` at `path` with and without the trailing slash.
fn both(router: Router<AppState>, path: &str, route: MethodRouter<AppState>) -> Router<AppState> {
    router
        .route(&format!("{path}/"), route.clone())
        .route(path, route)
}

fn resource_routes<R: StoredResource>(router: Router<AppState>) -> Router<AppState> {
    let collection = collection_path(R::KIND.view());
    let detail = format!("{collection}/:id");
    let router = both(router, &collection, get(list::<R>).post(create::<R>));
    both(
        router,
        &detail,
        get(retrieve::<R>)
            .put(update::<R>)
            .patch(partial_update::<R>)
            .delete(destroy::<R>),
    )
}

fn router(st: AppState) -> Router {
    let mut api_routes = Router::new().route("/healthz", get(healthz));
    api_routes = resource_routes::<ClusterType>(api_routes);
    api_routes = resource_routes::<ClusterGroup>(api_routes);
    api_routes = resource_routes::<Cluster>(api_routes);
    api_routes = resource_routes::<VirtualMachine>(api_routes);
    api_routes = resource_routes::<Interface>(api_routes);
    api_routes = both(
        api_routes,
        &format!("{}/:id", collection_path(ViewName::IpAddress)),
        get(get_ip_address).patch(assign_ip_address),
    );

    Router::new().nest("/api", api_routes.with_state(st))
}

/// Log every committed change until the store goes away.
async fn log_changes(store: Arc<dyn InventoryStore>) {
    let mut events = match store.watch(None).await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to watch inventory changes");
            return;
        }
    };
    while let Some(ev) = events.next().await {
        tracing::info!(
            kind = %ev.kind,
            id = ev.id,
            action = ?ev.action,
            revision = ev.revision,
            "inventory changed"
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing("virtinv-api", &args.log_format);

    let links = LinkResolver::new(&args.base_url)?;

    let custom_fields = match &args.custom_fields {
        Some(path) => StaticCustomFieldRegistry::from_path(path)?,
        None => StaticCustomFieldRegistry::new(),
    };

    let store = MemoryInventory::new();
    if let Some(path) = &args.fixtures {
        store.load_fixtures(Fixtures::from_path(path)?).await;
    }
    let store: Arc<dyn InventoryStore> = Arc::new(store);

    tokio::spawn(log_changes(store.clone()));

    let st = AppState {
        store,
        links: Arc::new(links),
        custom_fields: Arc::new(custom_fields),
        prefer_ipv4: args.prefer_ipv4,
        page_size: args.page_size,
        max_page_size: args.max_page_size,
    };

    tracing::info!(
        listen_addr = %args.listen_addr,
        base_url = %st.links.base(),
        prefer_ipv4 = st.prefer_ipv4,
        "starting virtinv-api"
    );

    let app = router(st);
    let listener = tokio::net::TcpListener::bind(&args.listen_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
