//! The per-request enforcement hook run before service methods.
//!
//! [`Authorize::before`] builds the caller's [`PolicySet`], checks create
//! payloads, narrows unscoped queries and fetches-then-checks scoped
//! operations. On success the context may carry a narrowed query, the
//! compiled policy, the accessible fields and, for `get`, the result itself.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::error::AuthzError;
use crate::filter::Filter;
use crate::policy::{PolicyBuilder, Principal};
use crate::rule::PolicySet;
use crate::subject::Subject;

/// Transport directive stripped from the query before the scoped fetch.
pub const CLIENT_DIRECTIVE: &str = "$client";

static NO_PAYLOAD: Value = Value::Null;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Find,
    Get,
    Create,
    Update,
    Patch,
    Remove,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Find => "find",
            Method::Get => "get",
            Method::Create => "create",
            Method::Update => "update",
            Method::Patch => "patch",
            Method::Remove => "remove",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "find" => Ok(Method::Find),
            "get" => Ok(Method::Get),
            "create" => Ok(Method::Create),
            "update" => Ok(Method::Update),
            "patch" => Ok(Method::Patch),
            "remove" => Ok(Method::Remove),
            other => Err(format!("unknown service method `{other}`")),
        }
    }
}

/// Call parameters shared between the hook and the service.
#[derive(Debug, Clone, Default)]
pub struct Params {
    pub principal: Principal,
    pub query: Filter,
    /// Transport the call arrived through; `None` for internal calls.
    pub provider: Option<String>,
    pub policy: Option<PolicySet>,
    pub accessible_fields: Option<Vec<String>>,
}

impl Params {
    pub fn external(principal: Principal, provider: impl Into<String>) -> Self {
        Self {
            principal,
            provider: Some(provider.into()),
            ..Self::default()
        }
    }

    pub fn with_query(mut self, query: Filter) -> Self {
        self.query = query;
        self
    }
}

#[derive(Debug, Clone)]
pub struct HookContext {
    pub method: Method,
    /// Service path; doubles as the subject type.
    pub path: String,
    pub id: Option<String>,
    pub data: Option<Value>,
    pub params: Params,
    /// Set by the hook to short-circuit the service call.
    pub result: Option<Value>,
}

impl HookContext {
    pub fn new(method: Method, path: impl Into<String>, params: Params) -> Self {
        Self {
            method,
            path: path.into(),
            id: None,
            data: None,
            params,
            result: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Record access the hook needs from the persistence layer.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, service: &str, id: &str, params: &Params) -> anyhow::Result<Value>;

    /// Field names of the service's records, when the store knows them.
    fn schema(&self, _service: &str) -> Option<Vec<String>> {
        None
    }
}

#[async_trait]
impl<S: RecordStore + ?Sized> RecordStore for Arc<S> {
    async fn get(&self, service: &str, id: &str, params: &Params) -> anyhow::Result<Value> {
        (**self).get(service, id, params).await
    }

    fn schema(&self, service: &str) -> Option<Vec<String>> {
        (**self).schema(service)
    }
}

pub struct Authorize<S> {
    store: S,
    builder: PolicyBuilder,
    service: Option<String>,
}

impl<S: RecordStore> Authorize<S> {
    pub fn new(store: S, builder: PolicyBuilder) -> Self {
        Self {
            store,
            builder,
            service: None,
        }
    }

    /// Checks against, and fetches from, `name` instead of the request path.
    pub fn for_service(mut self, name: impl Into<String>) -> Self {
        self.service = Some(name.into());
        self
    }

    pub fn builder(&self) -> &PolicyBuilder {
        &self.builder
    }

    #[instrument(
        name = "authz.authorize",
        skip_all,
        fields(method = %ctx.method, path = %ctx.path, scoped = ctx.id.is_some())
    )]
    pub async fn before(&self, ctx: &mut HookContext) -> Result<(), AuthzError> {
        let verb = ctx.method.as_str();
        let service = self.service.clone().unwrap_or_else(|| ctx.path.clone());
        let deny = || {
            info!(action = verb, subject = %service, "authorization denied");
            AuthzError::denied(verb, service.as_str())
        };

        let policy = self.builder.build(&ctx.params.principal);
        ctx.params.policy = Some(policy.clone());
        if let Some(schema) = self.store.schema(&service) {
            ctx.params.accessible_fields = Some(policy.accessible_fields(verb, &service, &schema));
        }

        if ctx.method == Method::Create {
            let payload = match &ctx.data {
                Some(Value::Array(items)) if !items.is_empty() => &items[0],
                Some(data) => data,
                None => &NO_PAYLOAD,
            };
            if !policy.can(Method::Create.as_str(), Subject::record(&ctx.path, payload)) {
                return Err(deny());
            }
        }

        let Some(id) = ctx.id.clone() else {
            let derived = policy.derive_query(&service, verb).ok_or_else(deny)?;
            debug!(filter = %derived, "narrowing query");
            ctx.params.query.merge(derived);
            return Ok(());
        };

        let mut fetch_params = ctx.params.clone();
        fetch_params.provider = None;
        fetch_params.query.remove(CLIENT_DIRECTIVE);
        let record = self.store.get(&service, &id, &fetch_params).await?;

        if !policy.can(verb, Subject::record(&service, &record)) {
            return Err(deny());
        }
        if ctx.method == Method::Get {
            ctx.result = Some(record);
        }
        Ok(())
    }
}
