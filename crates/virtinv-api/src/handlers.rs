use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use virtinv_common::repr::{NestedInterface, VirtualMachineIpAddress};
use virtinv_common::{FieldError, IpAddress, Represent, ValidationErrors, ViewName};
use virtinv_meta::{from_writable, Page, StoreError, StoredResource, WriteError, WriteTarget};

use crate::state::AppState;

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
    request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

fn error_response(status: StatusCode, code: &str, message: &str, details: Option<Value>) -> Response {
    let body = ErrorResponse {
        error: ErrorDetail {
            code: code.to_string(),
            message: message.to_string(),
            request_id: format!("req_{}", Uuid::new_v4()),
            details,
        },
    };
    (status, Json(body)).into_response()
}

fn validation_response(errors: &ValidationErrors) -> Response {
    let details = serde_json::to_value(errors).ok();
    error_response(
        StatusCode::BAD_REQUEST,
        "validation_error",
        &errors.to_string(),
        details,
    )
}

fn store_error_response(err: StoreError) -> Response {
    match err {
        StoreError::NotFound { .. } | StoreError::AddressNotFound(_) => {
            error_response(StatusCode::NOT_FOUND, "not_found", &err.to_string(), None)
        }
        StoreError::Conflict(errors) => validation_response(&errors),
        StoreError::Protected { .. } => {
            error_response(StatusCode::CONFLICT, "protected", &err.to_string(), None)
        }
        StoreError::Backend(e) => {
            tracing::error!(error = %e, "store failure");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "store_error",
                &format!("store error: {e}"),
                None,
            )
        }
    }
}

fn write_error_response(err: WriteError) -> Response {
    match err {
        WriteError::Invalid(errors) => validation_response(&errors),
        WriteError::NotFound { .. } => {
            error_response(StatusCode::NOT_FOUND, "not_found", &err.to_string(), None)
        }
        WriteError::Store(e) => store_error_response(e),
    }
}

/// Requests axum cannot extract (a body that is not JSON, a malformed id or
/// query string) are reported like any other field error.
fn rejection_response(field: &str, message: String) -> Response {
    let errors: ValidationErrors = FieldError::malformed(field, message).into();
    validation_response(&errors)
}

fn path_id(path: Result<Path<u64>, PathRejection>) -> Result<u64, Response> {
    match path {
        Ok(Path(id)) => Ok(id),
        Err(rejection) => Err(rejection_response("id", rejection.body_text())),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    #[serde(default)]
    pub brief: bool,
}

#[derive(Serialize)]
struct Paginated<T> {
    count: usize,
    next: Option<String>,
    previous: Option<String>,
    results: Vec<T>,
}

pub async fn healthz() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

pub async fn list<R: StoredResource>(
    State(st): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Response {
    let Query(params) = match params {
        Ok(q) => q,
        Err(rejection) => return rejection_response("non_field_errors", rejection.body_text()),
    };
    let limit = st.page_limit(params.limit);
    let offset = params.offset.unwrap_or(0);
    let listing = match R::fetch_page(st.store.as_ref(), Page { offset, limit }).await {
        Ok(l) => l,
        Err(e) => return store_error_response(e),
    };

    let view = R::KIND.view();
    let next = (offset.saturating_add(limit) < listing.count)
        .then(|| st.links.list(view, limit, offset + limit));
    let previous = (offset > 0).then(|| st.links.list(view, limit, offset.saturating_sub(limit)));

    let ctx = st.repr_ctx();
    if params.brief {
        let results: Vec<R::Nested> = listing.items.iter().map(|e| e.to_nested(&ctx)).collect();
        Json(Paginated {
            count: listing.count,
            next,
            previous,
            results,
        })
        .into_response()
    } else {
        let results: Vec<R::Full> = listing.items.iter().map(|e| e.to_full(&ctx)).collect();
        Json(Paginated {
            count: listing.count,
            next,
            previous,
            results,
        })
        .into_response()
    }
}

pub async fn retrieve<R: StoredResource>(
    State(st): State<AppState>,
    path: Result<Path<u64>, PathRejection>,
) -> Response {
    let id = match path_id(path) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match R::fetch(st.store.as_ref(), id).await {
        Ok(entity) => Json(entity.to_full(&st.repr_ctx())).into_response(),
        Err(e) => store_error_response(e),
    }
}

async fn write<R: StoredResource>(
    st: &AppState,
    payload: Result<Json<Value>, JsonRejection>,
    target: WriteTarget,
    status: StatusCode,
) -> Response {
    let Json(payload) = match payload {
        Ok(p) => p,
        Err(rejection) => return rejection_response("non_field_errors", rejection.body_text()),
    };
    let ctx = st.repr_ctx();
    match from_writable::<R>(st.store.as_ref(), &ctx, &payload, target).await {
        Ok(saved) => (status, Json(saved.to_full(&ctx))).into_response(),
        Err(e) => write_error_response(e),
    }
}

pub async fn create<R: StoredResource>(
    State(st): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    write::<R>(&st, payload, WriteTarget::Create, StatusCode::CREATED).await
}

pub async fn update<R: StoredResource>(
    State(st): State<AppState>,
    path: Result<Path<u64>, PathRejection>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let id = match path_id(path) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    write::<R>(&st, payload, WriteTarget::Replace(id), StatusCode::OK).await
}

pub async fn partial_update<R: StoredResource>(
    State(st): State<AppState>,
    path: Result<Path<u64>, PathRejection>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let id = match path_id(path) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    write::<R>(&st, payload, WriteTarget::Patch(id), StatusCode::OK).await
}

pub async fn destroy<R: StoredResource>(
    State(st): State<AppState>,
    path: Result<Path<u64>, PathRejection>,
) -> Response {
    let id = match path_id(path) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match st.store.delete(R::KIND, id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => store_error_response(e),
    }
}

/// IP address as seen from the virtualization side: the summary fields plus
/// the interface it is assigned to.
#[derive(Serialize)]
struct AddressAssignment {
    #[serde(flatten)]
    address: VirtualMachineIpAddress,
    interface: Option<NestedInterface>,
}

async fn render_address(st: &AppState, ip: IpAddress) -> Response {
    let interface = match ip.interface {
        Some(iface) => match st.store.interface(iface).await {
            Ok(i) => Some(i.to_nested(&st.repr_ctx())),
            Err(e) => return store_error_response(e),
        },
        None => None,
    };
    Json(AddressAssignment {
        address: ip.to_nested(&st.links),
        interface,
    })
    .into_response()
}

pub async fn get_ip_address(
    State(st): State<AppState>,
    path: Result<Path<u64>, PathRejection>,
) -> Response {
    let id = match path_id(path) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match st.store.ip_address(id).await {
        Ok(ip) => render_address(&st, ip).await,
        Err(e) => store_error_response(e),
    }
}

/// Body: `{"interface": <id> | null}`.
pub async fn assign_ip_address(
    State(st): State<AppState>,
    path: Result<Path<u64>, PathRejection>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let id = match path_id(path) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let Json(payload) = match payload {
        Ok(p) => p,
        Err(rejection) => return rejection_response("non_field_errors", rejection.body_text()),
    };
    let interface = match payload.get("interface") {
        Some(Value::Null) => None,
        Some(v) => match v.as_u64().filter(|id| *id > 0) {
            Some(iface) => Some(iface),
            None => {
                let errors: ValidationErrors =
                    FieldError::malformed("interface", "Incorrect type. Expected pk value.").into();
                return validation_response(&errors);
            }
        },
        None => {
            let errors: ValidationErrors = FieldError::required("interface").into();
            return validation_response(&errors);
        }
    };

    match st.store.assign_ip_address(id, interface).await {
        Ok(ip) => {
            tracing::info!(ip = id, ?interface, "address assignment changed");
            render_address(&st, ip).await
        }
        Err(e) => store_error_response(e),
    }
}

/// Collection path for a view, as mounted under the API root.
pub fn collection_path(view: ViewName) -> String {
    format!("/{}", view.path().trim_end_matches('/'))
}
