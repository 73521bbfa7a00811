//! Document filters in the store's query language.
//!
//! A [`Filter`] is a JSON object in the Mongo-style subset the services
//! accept: `field: value` equality, per-field operator objects
//! (`{"$gte": ...}`), and `$or` / `$and` lists of nested filters. Any other
//! top-level `$`-prefixed key is a transport or paging directive and is
//! ignored when matching.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::value::{compare, field_equals, lookup, values_equal};

pub const OR: &str = "$or";
pub const AND: &str = "$and";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("filter must be a JSON object")]
    NotAnObject,
    #[error("`{0}` expects an array of filters")]
    ExpectedFilterList(String),
    #[error("`$in` / `$nin` on `{0}` expects an array")]
    ExpectedArray(String),
    #[error("unknown operator `{operator}` on `{field}`")]
    UnknownOperator { field: String, operator: String },
}

/// Per-field comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Nin,
}

impl Operator {
    pub fn keyword(self) -> &'static str {
        match self {
            Operator::Eq => "$eq",
            Operator::Ne => "$ne",
            Operator::Gt => "$gt",
            Operator::Gte => "$gte",
            Operator::Lt => "$lt",
            Operator::Lte => "$lte",
            Operator::In => "$in",
            Operator::Nin => "$nin",
        }
    }

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Some(match keyword {
            "$eq" => Operator::Eq,
            "$ne" => Operator::Ne,
            "$gt" => Operator::Gt,
            "$gte" => Operator::Gte,
            "$lt" => Operator::Lt,
            "$lte" => Operator::Lte,
            "$in" => Operator::In,
            "$nin" => Operator::Nin,
            _ => return None,
        })
    }

    /// Applies the operator to a (possibly missing) field value.
    pub fn test(self, field: Option<&Value>, operand: &Value) -> bool {
        use std::cmp::Ordering::*;

        let ordered = |accept: &[std::cmp::Ordering]| {
            field
                .and_then(|actual| compare(actual, operand))
                .is_some_and(|ord| accept.contains(&ord))
        };
        match self {
            Operator::Eq => field_equals(field, operand),
            Operator::Ne => !field_equals(field, operand),
            Operator::Gt => ordered(&[Greater]),
            Operator::Gte => ordered(&[Greater, Equal]),
            Operator::Lt => ordered(&[Less]),
            Operator::Lte => ordered(&[Less, Equal]),
            Operator::In => operand
                .as_array()
                .is_some_and(|items| items.iter().any(|item| field_equals(field, item))),
            Operator::Nin => operand
                .as_array()
                .is_some_and(|items| !items.iter().any(|item| field_equals(field, item))),
        }
    }
}

/// Returns true for top-level keys that carry directives rather than
/// constraints.
pub fn is_directive(key: &str) -> bool {
    key.starts_with('$') && key != OR && key != AND
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filter(Map<String, Value>);

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A filter with a single `field: value` clause.
    pub fn clause(field: impl Into<String>, value: Value) -> Self {
        let mut map = Map::new();
        map.insert(field.into(), value);
        Self(map)
    }

    /// Matches everything when true (no constraints and no directives).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Constraint clauses only, with directives dropped.
    pub fn constraints(&self) -> Filter {
        Filter(
            self.0
                .iter()
                .filter(|(key, _)| !is_directive(key))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        )
    }

    /// Evaluates the filter against an in-memory record.
    pub fn matches(&self, record: &Value) -> Result<bool, FilterError> {
        for (key, expected) in &self.0 {
            let satisfied = match key.as_str() {
                OR => {
                    let mut any = false;
                    for branch in filter_list(key, expected)? {
                        if branch.matches(record)? {
                            any = true;
                            break;
                        }
                    }
                    any
                }
                AND => {
                    let mut all = true;
                    for branch in filter_list(key, expected)? {
                        if !branch.matches(record)? {
                            all = false;
                            break;
                        }
                    }
                    all
                }
                directive if is_directive(directive) => true,
                field => field_matches(field, lookup(record, field), expected)?,
            };
            if !satisfied {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// AND-merges `other` into this filter.
    ///
    /// Keys missing here are copied over, keys holding an equal value are
    /// left alone, and conflicting keys are appended to `$and` so that both
    /// constraints hold.
    pub fn merge(&mut self, other: Filter) {
        let mut extra = Vec::new();
        for (key, value) in other.0 {
            match self.0.get(&key) {
                None => {
                    self.0.insert(key, value);
                }
                Some(existing) if *existing == value => {}
                Some(_) if key == AND => match value {
                    Value::Array(items) => extra.extend(items),
                    single => extra.push(single),
                },
                Some(_) => extra.push(Value::Object(Filter::clause(key, value).0)),
            }
        }
        if extra.is_empty() {
            return;
        }

        let mut clauses = match self.0.remove(AND) {
            Some(Value::Array(items)) => items,
            Some(single) => vec![single],
            None => Vec::new(),
        };
        for clause in extra {
            if !clauses.contains(&clause) {
                clauses.push(clause);
            }
        }
        self.0.insert(AND.to_string(), Value::Array(clauses));
    }

    /// Collapses `{ "$or": [ branch ] }` into `branch`. Only this exact
    /// single-key, single-branch shape is rewritten.
    pub fn collapse_single_or(self) -> Filter {
        if self.0.len() == 1 {
            if let Some(Value::Array(branches)) = self.0.get(OR) {
                if let [Value::Object(branch)] = branches.as_slice() {
                    return Filter(branch.clone());
                }
            }
        }
        self
    }
}

impl From<Map<String, Value>> for Filter {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for Filter {
    type Error = FilterError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Ok(Self::default()),
            _ => Err(FilterError::NotAnObject),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Value::Object(self.0.clone()))
    }
}

fn filter_list(key: &str, value: &Value) -> Result<Vec<Filter>, FilterError> {
    let Value::Array(items) = value else {
        return Err(FilterError::ExpectedFilterList(key.to_string()));
    };
    items
        .iter()
        .map(|item| match item {
            Value::Object(map) => Ok(Filter(map.clone())),
            _ => Err(FilterError::ExpectedFilterList(key.to_string())),
        })
        .collect()
}

fn field_matches(field: &str, actual: Option<&Value>, expected: &Value) -> Result<bool, FilterError> {
    let operators = match expected {
        Value::Object(map) if !map.is_empty() && map.keys().all(|k| k.starts_with('$')) => map,
        _ => {
            return Ok(match actual {
                Some(value) => values_equal(value, expected),
                None => expected.is_null(),
            });
        }
    };

    for (keyword, operand) in operators {
        let operator =
            Operator::from_keyword(keyword).ok_or_else(|| FilterError::UnknownOperator {
                field: field.to_string(),
                operator: keyword.clone(),
            })?;
        if matches!(operator, Operator::In | Operator::Nin) && !operand.is_array() {
            return Err(FilterError::ExpectedArray(field.to_string()));
        }
        if !operator.test(actual, operand) {
            return Ok(false);
        }
    }
    Ok(true)
}
