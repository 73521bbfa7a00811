//! Field-level rule conditions.
//!
//! A [`Condition`] is a small expression tree with two backends:
//! [`Condition::evaluate`] tests an in-memory record, and
//! [`Condition::to_filter`] compiles the same tree into a [`Filter`]. Both
//! resolve relative operands against the same instant and share the
//! comparison helpers in [`crate::value`].

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::filter::{Filter, OR, Operator};
use crate::value::lookup;

/// Right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    Value(Value),
    /// The instant this many seconds before evaluation time.
    SecondsAgo(i64),
}

impl Operand {
    pub fn ago(duration: Duration) -> Self {
        Operand::SecondsAgo(duration.num_seconds())
    }

    pub fn resolve(&self, now: DateTime<Utc>) -> Value {
        match self {
            Operand::Value(value) => value.clone(),
            Operand::SecondsAgo(seconds) => {
                let instant = now - Duration::seconds(*seconds);
                Value::String(instant.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
        }
    }
}

impl From<Value> for Operand {
    fn from(value: Value) -> Self {
        Operand::Value(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub field: String,
    pub operator: Operator,
    pub operand: Operand,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Compare(Comparison),
    All(Vec<Condition>),
    Any(Vec<Condition>),
}

impl Condition {
    pub fn compare(field: impl Into<String>, operator: Operator, operand: impl Into<Operand>) -> Self {
        Condition::Compare(Comparison {
            field: field.into(),
            operator,
            operand: operand.into(),
        })
    }

    pub fn eq(field: impl Into<String>, value: Value) -> Self {
        Self::compare(field, Operator::Eq, value)
    }

    /// Matches records where the field is null or absent.
    pub fn is_null(field: impl Into<String>) -> Self {
        Self::eq(field, Value::Null)
    }

    pub fn all(conditions: impl IntoIterator<Item = Condition>) -> Self {
        Condition::All(conditions.into_iter().collect())
    }

    pub fn any(conditions: impl IntoIterator<Item = Condition>) -> Self {
        Condition::Any(conditions.into_iter().collect())
    }

    pub fn evaluate(&self, record: &Value, now: DateTime<Utc>) -> bool {
        match self {
            Condition::Compare(cmp) => cmp
                .operator
                .test(lookup(record, &cmp.field), &cmp.operand.resolve(now)),
            Condition::All(items) => items.iter().all(|c| c.evaluate(record, now)),
            Condition::Any(items) => items.iter().any(|c| c.evaluate(record, now)),
        }
    }

    pub fn to_filter(&self, now: DateTime<Utc>) -> Filter {
        match self {
            Condition::Compare(cmp) => {
                let operand = cmp.operand.resolve(now);
                let expected = match cmp.operator {
                    Operator::Eq if !operand.is_object() => operand,
                    op => {
                        let mut operators = Map::new();
                        operators.insert(op.keyword().to_string(), operand);
                        Value::Object(operators)
                    }
                };
                Filter::clause(cmp.field.clone(), expected)
            }
            Condition::All(items) => items.iter().fold(Filter::new(), |mut acc, c| {
                acc.merge(c.to_filter(now));
                acc
            }),
            Condition::Any(items) => Filter::clause(
                OR,
                Value::Array(items.iter().map(|c| c.to_filter(now).into_value()).collect()),
            ),
        }
    }
}
