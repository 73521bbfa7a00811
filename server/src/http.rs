use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{FromRequestParts, Path, Query, State},
    http::{self, HeaderName, HeaderValue, StatusCode, request::Parts},
    response::IntoResponse,
    routing::get,
};
use platform_api::{ApiError, ApiResult};
use platform_authz::{AliasTable, Authorize, Filter, HookContext, Method, Params, PolicyBuilder, Principal};
use platform_db::MemoryStore;
use serde::Serialize;
use serde_json::{Map, Value};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info;
use uuid::Uuid;

use crate::config::AppConfig;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ADMIN_HEADER: &str = "x-user-admin";
const PROVIDER: &str = "rest";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<MemoryStore>,
    pub authorize: Arc<Authorize<Arc<MemoryStore>>>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(store: Arc<MemoryStore>, config: Arc<AppConfig>) -> Self {
        let builder = PolicyBuilder::new(AliasTable::default(), config.mode);
        Self {
            authorize: Arc::new(Authorize::new(store.clone(), builder)),
            store,
            config,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServeConfig {
    addr: SocketAddr,
}

impl ServeConfig {
    pub fn new(host: IpAddr, port: u16) -> Self {
        Self {
            addr: SocketAddr::from((host, port)),
        }
    }
}

pub async fn serve(config: ServeConfig, state: AppState) -> anyhow::Result<()> {
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;

    info!(%config.addr, "reservations server listening");
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;
    Ok(())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed = origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect::<Vec<_>>();
    let allow_origin = if allowed.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(allowed)
    };
    CorsLayer::new()
        .allow_headers([
            http::header::CONTENT_TYPE,
            HeaderName::from_static(USER_ID_HEADER),
            HeaderName::from_static(USER_ADMIN_HEADER),
        ])
        .allow_methods([
            http::Method::GET,
            http::Method::POST,
            http::Method::PUT,
            http::Method::PATCH,
            http::Method::DELETE,
        ])
        .allow_origin(allow_origin)
}

pub fn build_router(state: AppState) -> Router {
    let request_id = MakeRequestUuid;
    let header_name = HeaderName::from_static("x-request-id");
    Router::new()
        .route("/health", get(health_handler))
        .route(
            "/{service}",
            get(find_handler)
                .post(create_handler)
                .patch(patch_many_handler)
                .delete(remove_many_handler),
        )
        .route(
            "/{service}/{id}",
            get(get_handler)
                .put(update_handler)
                .patch(patch_handler)
                .delete(remove_handler),
        )
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(header_name.clone(), request_id))
                .layer(PropagateRequestIdLayer::new(header_name))
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&state.config.cors_allowed_origins)),
        )
        .with_state(state)
}

/// Principal forwarded by the authentication gateway.
#[derive(Clone, Copy, Debug)]
pub struct Caller(pub Principal);

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(raw) = parts.headers.get(USER_ID_HEADER) else {
            return Ok(Caller(Principal::Anonymous));
        };
        let id = raw
            .to_str()
            .ok()
            .and_then(|s| Uuid::parse_str(s.trim()).ok())
            .ok_or_else(|| ApiError::InvalidInput(format!("{USER_ID_HEADER} must be a UUID")))?;
        let admin = parts
            .headers
            .get(USER_ADMIN_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true"));
        Ok(Caller(Principal::User { id, admin }))
    }
}

type QueryPairs = Query<Vec<(String, String)>>;

async fn find_handler(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path(service): Path<String>,
    Query(pairs): QueryPairs,
) -> ApiResult<Json<Value>> {
    let ctx = context(Method::Find, service, principal, pairs)?;
    dispatch(&state, ctx).await.map(Json)
}

async fn get_handler(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path((service, id)): Path<(String, String)>,
    Query(pairs): QueryPairs,
) -> ApiResult<Json<Value>> {
    let ctx = context(Method::Get, service, principal, pairs)?.with_id(id);
    dispatch(&state, ctx).await.map(Json)
}

async fn create_handler(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path(service): Path<String>,
    Query(pairs): QueryPairs,
    Json(body): Json<Value>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let ctx = context(Method::Create, service, principal, pairs)?.with_data(body);
    let created = dispatch(&state, ctx).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_handler(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path((service, id)): Path<(String, String)>,
    Query(pairs): QueryPairs,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let ctx = context(Method::Update, service, principal, pairs)?
        .with_id(id)
        .with_data(body);
    dispatch(&state, ctx).await.map(Json)
}

async fn patch_handler(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path((service, id)): Path<(String, String)>,
    Query(pairs): QueryPairs,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let ctx = context(Method::Patch, service, principal, pairs)?
        .with_id(id)
        .with_data(body);
    dispatch(&state, ctx).await.map(Json)
}

async fn patch_many_handler(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path(service): Path<String>,
    Query(pairs): QueryPairs,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let ctx = context(Method::Patch, service, principal, pairs)?.with_data(body);
    dispatch(&state, ctx).await.map(Json)
}

async fn remove_handler(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path((service, id)): Path<(String, String)>,
    Query(pairs): QueryPairs,
) -> ApiResult<Json<Value>> {
    let ctx = context(Method::Remove, service, principal, pairs)?.with_id(id);
    dispatch(&state, ctx).await.map(Json)
}

async fn remove_many_handler(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path(service): Path<String>,
    Query(pairs): QueryPairs,
) -> ApiResult<Json<Value>> {
    let ctx = context(Method::Remove, service, principal, pairs)?;
    dispatch(&state, ctx).await.map(Json)
}

fn context(
    method: Method,
    service: String,
    principal: Principal,
    pairs: Vec<(String, String)>,
) -> ApiResult<HookContext> {
    let params = Params::external(principal, PROVIDER).with_query(query_filter(pairs)?);
    Ok(HookContext::new(method, service, params))
}

/// Runs the authorization hook, then the store call it allowed.
async fn dispatch(state: &AppState, mut ctx: HookContext) -> ApiResult<Value> {
    state.authorize.before(&mut ctx).await?;
    if let Some(result) = ctx.result.take() {
        return Ok(result);
    }

    let HookContext {
        method,
        path,
        id,
        data,
        params,
        ..
    } = ctx;
    let store = &state.store;
    let query = &params.query;
    let payload = || data.clone().unwrap_or(Value::Null);

    let value = match (method, id.as_deref()) {
        (Method::Find, _) => {
            let page = store.find(&path, query).await?;
            serde_json::to_value(page).map_err(|err| ApiError::internal(err.into()))?
        }
        (Method::Get, Some(id)) => store.get(&path, id, query).await?,
        (Method::Create, _) => store.create(&path, payload()).await?,
        (Method::Update, Some(id)) => store.update(&path, id, payload(), query).await?,
        (Method::Patch, id) => store.patch(&path, id, payload(), query).await?,
        (Method::Remove, id) => store.remove(&path, id, query).await?,
        (Method::Get | Method::Update, None) => {
            return Err(ApiError::InvalidInput(format!("{method} requires an id")));
        }
    };
    Ok(value)
}

/// Builds a filter from query-string pairs. `field[op]=v` nests under the
/// field, repeated `[$in]`/`[$nin]` keys collect into a list. Any other
/// repeated key is rejected.
pub fn query_filter(pairs: Vec<(String, String)>) -> ApiResult<Filter> {
    let mut map = Map::new();
    for (key, raw) in pairs {
        let value = coerce(&raw);
        let nested = key
            .split_once('[')
            .and_then(|(field, rest)| rest.strip_suffix(']').map(|inner| (field, inner)));
        let Some((field, inner)) = nested else {
            if map.contains_key(&key) {
                return Err(duplicate(&key));
            }
            map.insert(key, value);
            continue;
        };
        let entry = map
            .entry(field.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        let Value::Object(ops) = entry else {
            return Err(duplicate(field));
        };
        if inner == "$in" || inner == "$nin" {
            if let Value::Array(items) = ops
                .entry(inner.to_string())
                .or_insert_with(|| Value::Array(Vec::new()))
            {
                items.push(value);
            }
        } else if ops.insert(inner.to_string(), value).is_some() {
            return Err(duplicate(&key));
        }
    }
    Ok(Filter::from(map))
}

fn duplicate(key: &str) -> ApiError {
    ApiError::InvalidInput(format!("query key `{key}` is given more than once"))
}

fn coerce(raw: &str) -> Value {
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "null" => Value::Null,
        _ => raw
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(raw.to_string())),
    }
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        ok: true,
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    version: &'static str,
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for CTRL+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    ctrl_c.await;

    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    };
}
