use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use platform_authz::{Filter, Params, RecordStore, compare, fields, lookup};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::{StoreError, StoreResult};

const LIMIT: &str = "$limit";
const SKIP: &str = "$skip";
const SORT: &str = "$sort";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Paginate {
    pub default: usize,
    pub max: usize,
}

impl Default for Paginate {
    fn default() -> Self {
        Self { default: 10, max: 25 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Page {
    pub total: usize,
    pub limit: usize,
    pub skip: usize,
    pub data: Vec<Value>,
}

/// In-process document store keyed by service name.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Value>>>,
    schemas: HashMap<String, Vec<String>>,
    paginate: Paginate,
}

impl MemoryStore {
    pub fn new(paginate: Paginate) -> Self {
        Self {
            paginate,
            ..Self::default()
        }
    }

    pub fn with_schema<S: Into<String>>(
        mut self,
        service: impl Into<String>,
        fields: impl IntoIterator<Item = S>,
    ) -> Self {
        self.schemas
            .insert(service.into(), fields.into_iter().map(Into::into).collect());
        self
    }

    pub async fn find(&self, service: &str, query: &Filter) -> StoreResult<Page> {
        let limit = directive_usize(query, LIMIT)?
            .unwrap_or(self.paginate.default)
            .min(self.paginate.max);
        let skip = directive_usize(query, SKIP)?.unwrap_or(0);

        let mut matched = self.matching(service, query).await?;
        if let Some(sort) = query.get(SORT) {
            sort_records(&mut matched, sort)?;
        }
        let total = matched.len();
        let data = matched.into_iter().skip(skip).take(limit).collect();
        debug!(service, total, limit, skip, "find");
        Ok(Page {
            total,
            limit,
            skip,
            data,
        })
    }

    pub async fn get(&self, service: &str, id: &str, query: &Filter) -> StoreResult<Value> {
        let constraints = query.constraints();
        let collections = self.collections.read().await;
        for record in collections.get(service).into_iter().flatten() {
            if record_id(record) == Some(id) && constraints.matches(record)? {
                return Ok(record.clone());
            }
        }
        Err(StoreError::not_found(service, id))
    }

    /// Creates one record, or one per element of an array payload. A batch
    /// is written only when every element is a valid record.
    pub async fn create(&self, service: &str, data: Value) -> StoreResult<Value> {
        let Value::Array(items) = data else {
            return self.insert(service, data).await;
        };
        let prepared = items
            .into_iter()
            .map(prepare)
            .collect::<StoreResult<Vec<_>>>()?;
        self.collections
            .write()
            .await
            .entry(service.to_string())
            .or_default()
            .extend(prepared.iter().cloned());
        Ok(Value::Array(prepared))
    }

    pub async fn insert(&self, service: &str, data: Value) -> StoreResult<Value> {
        let record = prepare(data)?;
        self.collections
            .write()
            .await
            .entry(service.to_string())
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    /// Replaces a record, keeping its id.
    pub async fn update(&self, service: &str, id: &str, data: Value, query: &Filter) -> StoreResult<Value> {
        let Value::Object(mut replacement) = data else {
            return Err(StoreError::InvalidPayload("records must be JSON objects".into()));
        };
        replacement.insert(fields::ID.into(), Value::String(id.to_string()));
        let constraints = query.constraints();
        let mut collections = self.collections.write().await;
        for record in collections.get_mut(service).into_iter().flatten() {
            if record_id(record) == Some(id) && constraints.matches(record)? {
                *record = Value::Object(replacement);
                return Ok(record.clone());
            }
        }
        Err(StoreError::not_found(service, id))
    }

    /// Merges `data` into one record, or into every record matching `query`
    /// when no id is given.
    pub async fn patch(&self, service: &str, id: Option<&str>, data: Value, query: &Filter) -> StoreResult<Value> {
        let Value::Object(changes) = data else {
            return Err(StoreError::InvalidPayload("patch data must be a JSON object".into()));
        };
        let constraints = query.constraints();
        let mut collections = self.collections.write().await;
        let mut patched = Vec::new();
        for record in collections.get_mut(service).into_iter().flatten() {
            if id.is_some_and(|id| record_id(record) != Some(id)) || !constraints.matches(record)? {
                continue;
            }
            if let Value::Object(map) = record {
                apply_changes(map, &changes);
            }
            patched.push(record.clone());
        }
        match id {
            Some(id) => patched.pop().ok_or_else(|| StoreError::not_found(service, id)),
            None => Ok(Value::Array(patched)),
        }
    }

    pub async fn remove(&self, service: &str, id: Option<&str>, query: &Filter) -> StoreResult<Value> {
        let constraints = query.constraints();
        let mut collections = self.collections.write().await;
        let Some(records) = collections.get_mut(service) else {
            return match id {
                Some(id) => Err(StoreError::not_found(service, id)),
                None => Ok(Value::Array(Vec::new())),
            };
        };

        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(records.len());
        for record in records.drain(..) {
            let targeted = id.is_none_or(|id| record_id(&record) == Some(id));
            if targeted && constraints.matches(&record)? {
                removed.push(record);
            } else {
                kept.push(record);
            }
        }
        *records = kept;

        match id {
            Some(id) => removed.pop().ok_or_else(|| StoreError::not_found(service, id)),
            None => Ok(Value::Array(removed)),
        }
    }

    async fn matching(&self, service: &str, query: &Filter) -> StoreResult<Vec<Value>> {
        let constraints = query.constraints();
        let collections = self.collections.read().await;
        let mut matched = Vec::new();
        for record in collections.get(service).into_iter().flatten() {
            if constraints.matches(record)? {
                matched.push(record.clone());
            }
        }
        Ok(matched)
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get(&self, service: &str, id: &str, params: &Params) -> anyhow::Result<Value> {
        Ok(MemoryStore::get(self, service, id, &params.query).await?)
    }

    fn schema(&self, service: &str) -> Option<Vec<String>> {
        self.schemas.get(service).cloned()
    }
}

/// Assigns `id` and `createdAt` when the payload lacks them.
fn prepare(data: Value) -> StoreResult<Value> {
    let Value::Object(mut record) = data else {
        return Err(StoreError::InvalidPayload("records must be JSON objects".into()));
    };
    if !record.get(fields::ID).is_some_and(Value::is_string) {
        record.insert(fields::ID.into(), Value::String(Uuid::new_v4().to_string()));
    }
    record
        .entry(fields::CREATED_AT)
        .or_insert_with(|| Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)));
    Ok(Value::Object(record))
}

fn record_id(record: &Value) -> Option<&str> {
    record.get(fields::ID).and_then(Value::as_str)
}

fn apply_changes(record: &mut Map<String, Value>, changes: &Map<String, Value>) {
    for (key, value) in changes {
        if key != fields::ID {
            record.insert(key.clone(), value.clone());
        }
    }
}

fn directive_usize(query: &Filter, key: &str) -> StoreResult<Option<usize>> {
    match query.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_u64()
            .map(|n| Some(n as usize))
            .ok_or_else(|| StoreError::InvalidPayload(format!("`{key}` must be a non-negative integer"))),
    }
}

fn sort_records(records: &mut [Value], sort: &Value) -> StoreResult<()> {
    let Value::Object(keys) = sort else {
        return Err(StoreError::InvalidPayload("`$sort` must be an object".into()));
    };
    let mut order = Vec::with_capacity(keys.len());
    for (field, direction) in keys {
        let descending = match direction.as_i64() {
            Some(1) => false,
            Some(-1) => true,
            _ => {
                return Err(StoreError::InvalidPayload(format!(
                    "`$sort` direction for `{field}` must be 1 or -1"
                )));
            }
        };
        order.push((field.as_str(), descending));
    }
    records.sort_by(|a, b| {
        for (field, descending) in &order {
            let ord = match (lookup(a, field), lookup(b, field)) {
                (Some(x), Some(y)) => compare(x, y).unwrap_or(Ordering::Equal),
                (Some(_), None) => Ordering::Greater,
                (None, Some(_)) => Ordering::Less,
                (None, None) => Ordering::Equal,
            };
            let ord = if *descending { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
    Ok(())
}
