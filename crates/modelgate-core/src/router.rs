use std::convert::Infallible;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio_stream::wrappers::ReceiverStream;
use tracing::info;

use modelgate_protocol::chat::ChatCompletionRequest;
use modelgate_protocol::responses::CreateResponseRequest;
use modelgate_provider_core::{RegisterProviderInput, TenantContext, UpdateProviderInput};

use crate::error::GatewayError;
use crate::gateway::{Gateway, RelayHandle};

pub const ORGANIZATION_HEADER: &str = "x-organization-id";
pub const PROJECTS_HEADER: &str = "x-project-ids";
pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

#[derive(Clone)]
pub struct GatewayState {
    pub gateway: Arc<Gateway>,
    pub admin_key: Arc<str>,
    pub default_organization_id: Option<i64>,
}

pub fn gateway_router(state: GatewayState) -> Router {
    let admin = Router::new()
        .route(
            "/admin/providers",
            get(list_providers).post(register_provider),
        )
        .route("/admin/providers/{public_id}", patch(update_provider))
        .route("/admin/providers/{public_id}/sync", post(sync_provider))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth));

    Router::new()
        .route("/health", get(health))
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/responses", post(create_response))
        .route("/v1/models", get(list_models))
        .merge(admin)
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "ok": true })))
}

async fn admin_auth(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    req: axum::http::Request<Body>,
    next: Next,
) -> Result<Response, GatewayError> {
    let key = extract_admin_key(&headers).ok_or(GatewayError::Unauthorized)?;
    if key != *state.admin_key {
        return Err(GatewayError::Unauthorized);
    }
    Ok(next.run(req).await)
}

fn extract_admin_key(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(ADMIN_KEY_HEADER)
        && let Ok(s) = value.to_str()
    {
        let s = s.trim();
        if !s.is_empty() {
            return Some(s.to_string());
        }
    }

    if let Some(value) = headers.get(header::AUTHORIZATION)
        && let Ok(auth) = value.to_str()
    {
        let auth = auth.trim();
        let prefix = "Bearer ";
        if auth.len() > prefix.len() && auth[..prefix.len()].eq_ignore_ascii_case(prefix) {
            let token = auth[prefix.len()..].trim();
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }

    None
}

/// Tenant scope from the headers set by the upstream auth layer.
pub fn tenant_from_headers(
    headers: &HeaderMap,
    default_organization_id: Option<i64>,
) -> Result<TenantContext, GatewayError> {
    let header_text = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    let organization_id = header_text(ORGANIZATION_HEADER)
        .map(|value| {
            value.parse::<i64>().map_err(|_| {
                GatewayError::bad_request(format!("invalid {ORGANIZATION_HEADER} header"))
            })
        })
        .transpose()?;

    let mut project_ids = Vec::new();
    if let Some(value) = header_text(PROJECTS_HEADER) {
        for part in value.split(',').map(str::trim).filter(|part| !part.is_empty()) {
            let id = part.parse::<i64>().map_err(|_| {
                GatewayError::bad_request(format!("invalid {PROJECTS_HEADER} header"))
            })?;
            if !project_ids.contains(&id) {
                project_ids.push(id);
            }
        }
    }

    Ok(TenantContext::new(organization_id, project_ids)
        .with_default_organization(default_organization_id))
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, GatewayError> {
    serde_json::from_slice(body)
        .map_err(|err| GatewayError::bad_request(format!("invalid request body: {err}")))
}

fn sse_response(handle: RelayHandle) -> Response {
    let stream = ReceiverStream::new(handle.frames).map(Ok::<_, Infallible>);
    let mut response = Response::new(Body::from_stream(stream));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        HeaderName::from_static("x-accel-buffering"),
        HeaderValue::from_static("no"),
    );
    response
}

async fn chat_completions(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let tenant = tenant_from_headers(&headers, state.default_organization_id)?;
    let request: ChatCompletionRequest = parse_body(&body)?;
    if request.is_stream() {
        let handle = state.gateway.stream_chat_completion(&tenant, request).await?;
        return Ok(sse_response(handle));
    }
    let response = state.gateway.chat_completion(&tenant, request).await?;
    Ok(Json(response).into_response())
}

async fn create_response(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let tenant = tenant_from_headers(&headers, state.default_organization_id)?;
    let request: CreateResponseRequest = parse_body(&body)?;
    if request.stream.unwrap_or(false) {
        let handle = state.gateway.stream_response(&tenant, request).await?;
        return Ok(sse_response(handle));
    }
    let response = state.gateway.create_response(&tenant, request).await?;
    Ok(Json(response).into_response())
}

async fn list_models(
    State(state): State<GatewayState>,
    headers: HeaderMap,
) -> Result<Response, GatewayError> {
    let tenant = tenant_from_headers(&headers, state.default_organization_id)?;
    let models = state.gateway.list_models(&tenant).await?;
    Ok(Json(models).into_response())
}

async fn list_providers(
    State(state): State<GatewayState>,
    headers: HeaderMap,
) -> Result<Response, GatewayError> {
    let tenant = tenant_from_headers(&headers, state.default_organization_id)?;
    let providers = state
        .gateway
        .registry()
        .list_accessible_providers(&tenant)
        .await?;
    Ok(Json(json!({ "object": "list", "data": providers })).into_response())
}

async fn register_provider(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let tenant = tenant_from_headers(&headers, state.default_organization_id)?;
    let input: RegisterProviderInput = parse_body(&body)?;
    let registered = state
        .gateway
        .registry()
        .register_provider(&tenant, input)
        .await?;
    Ok((StatusCode::CREATED, Json(registered)).into_response())
}

async fn update_provider(
    State(state): State<GatewayState>,
    Path(public_id): Path<String>,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let input: UpdateProviderInput = parse_body(&body)?;
    let registry = state.gateway.registry();
    let provider = registry.find_by_public_id(&public_id).await?;
    let provider = registry.update_provider(provider, input).await?;
    info!(event = "provider_updated", provider = %provider.public_id, active = provider.active);
    Ok(Json(provider).into_response())
}

async fn sync_provider(
    State(state): State<GatewayState>,
    Path(public_id): Path<String>,
) -> Result<Response, GatewayError> {
    let synced = state.gateway.sync_provider(&public_id).await?;
    Ok(Json(synced).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_headers_parse_org_and_projects() {
        let mut headers = HeaderMap::new();
        headers.insert(ORGANIZATION_HEADER, HeaderValue::from_static(" 7 "));
        headers.insert(PROJECTS_HEADER, HeaderValue::from_static("3, 4,,3"));
        let tenant = tenant_from_headers(&headers, Some(1)).unwrap();
        assert_eq!(tenant.organization_id, Some(7));
        assert_eq!(tenant.project_ids, vec![3, 4]);
        assert_eq!(tenant.default_organization_id, Some(1));
    }

    #[test]
    fn missing_org_falls_back_to_default() {
        let tenant = tenant_from_headers(&HeaderMap::new(), Some(1)).unwrap();
        assert_eq!(tenant.organization_id, None);
        assert_eq!(tenant.effective_organization(), Some(1));
    }

    #[test]
    fn malformed_tenant_headers_are_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(PROJECTS_HEADER, HeaderValue::from_static("a"));
        let err = tenant_from_headers(&headers, None).unwrap_err();
        assert_eq!(err.code(), "validation_error");
    }

    #[test]
    fn admin_key_from_header_or_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("bearer secret"));
        assert_eq!(extract_admin_key(&headers).as_deref(), Some("secret"));
        headers.insert(ADMIN_KEY_HEADER, HeaderValue::from_static("other"));
        assert_eq!(extract_admin_key(&headers).as_deref(), Some("other"));
    }
}
