//! Filter to `sea_orm` condition translation.
//!
//! Missing columns are NULL in SQL, so the negative operators (`$ne`, `$nin`)
//! also admit NULL rows to keep the same answer the in-memory matcher gives
//! for an absent field.

use platform_authz::{AND, Filter, FilterError, OR, Operator, is_directive};
use sea_orm::Condition;
use sea_orm::sea_query::{Alias, Expr, SimpleExpr, Value as DbValue};
use serde_json::Value;

use crate::{StoreError, StoreResult};

pub fn to_condition(filter: &Filter) -> StoreResult<Condition> {
    let mut all = Condition::all();
    for (key, value) in filter.iter() {
        match key.as_str() {
            OR => {
                let mut any = Condition::any();
                for branch in branches(key, value)? {
                    any = any.add(to_condition(&branch)?);
                }
                all = all.add(any);
            }
            AND => {
                for branch in branches(key, value)? {
                    all = all.add(to_condition(&branch)?);
                }
            }
            directive if is_directive(directive) => {}
            field => all = all.add(field_condition(field, value)?),
        }
    }
    Ok(all)
}

fn branches(key: &str, value: &Value) -> StoreResult<Vec<Filter>> {
    let Value::Array(items) = value else {
        return Err(FilterError::ExpectedFilterList(key.to_string()).into());
    };
    items
        .iter()
        .cloned()
        .map(|item| Filter::try_from(item).map_err(StoreError::from))
        .collect()
}

fn field_condition(field: &str, expected: &Value) -> StoreResult<Condition> {
    match expected {
        Value::Object(ops) if !ops.is_empty() && ops.keys().all(|k| k.starts_with('$')) => {
            let mut all = Condition::all();
            for (keyword, operand) in ops {
                let operator = Operator::from_keyword(keyword).ok_or_else(|| {
                    StoreError::from(FilterError::UnknownOperator {
                        field: field.to_string(),
                        operator: keyword.clone(),
                    })
                })?;
                all = all.add(operator_condition(field, operator, operand)?);
            }
            Ok(all)
        }
        plain => operator_condition(field, Operator::Eq, plain),
    }
}

fn operator_condition(field: &str, operator: Operator, operand: &Value) -> StoreResult<Condition> {
    let col = || Expr::col(Alias::new(field));
    let cond = match operator {
        Operator::Eq if operand.is_null() => Condition::all().add(col().is_null()),
        Operator::Eq => Condition::all().add(col().eq(scalar(field, operand)?)),
        Operator::Ne if operand.is_null() => Condition::all().add(col().is_not_null()),
        Operator::Ne => Condition::any()
            .add(col().ne(scalar(field, operand)?))
            .add(col().is_null()),
        Operator::Gt => Condition::all().add(col().gt(scalar(field, operand)?)),
        Operator::Gte => Condition::all().add(col().gte(scalar(field, operand)?)),
        Operator::Lt => Condition::all().add(col().lt(scalar(field, operand)?)),
        Operator::Lte => Condition::all().add(col().lte(scalar(field, operand)?)),
        Operator::In => {
            let (values, with_null) = list(field, operand)?;
            let mut any = Condition::any();
            if !values.is_empty() {
                any = any.add(col().is_in(values));
            }
            if with_null {
                any = any.add(col().is_null());
            }
            if any.is_empty() {
                any = any.add(never());
            }
            any
        }
        Operator::Nin => {
            let (values, with_null) = list(field, operand)?;
            match (values.is_empty(), with_null) {
                (true, false) => Condition::all(),
                (true, true) => Condition::all().add(col().is_not_null()),
                (false, false) => Condition::any()
                    .add(col().is_not_in(values))
                    .add(col().is_null()),
                (false, true) => Condition::all()
                    .add(col().is_not_in(values))
                    .add(col().is_not_null()),
            }
        }
    };
    Ok(cond)
}

fn never() -> SimpleExpr {
    Expr::val(1).eq(0)
}

fn list(field: &str, operand: &Value) -> StoreResult<(Vec<DbValue>, bool)> {
    let Value::Array(items) = operand else {
        return Err(FilterError::ExpectedArray(field.to_string()).into());
    };
    let mut values = Vec::with_capacity(items.len());
    let mut with_null = false;
    for item in items {
        if item.is_null() {
            with_null = true;
        } else {
            values.push(scalar(field, item)?);
        }
    }
    Ok((values, with_null))
}

fn scalar(field: &str, value: &Value) -> StoreResult<DbValue> {
    let unsupported = |reason: &str| StoreError::Unsupported {
        field: field.to_string(),
        reason: reason.to_string(),
    };
    match value {
        Value::Bool(b) => Ok((*b).into()),
        Value::String(s) => Ok(s.clone().into()),
        Value::Number(n) => n
            .as_i64()
            .map(DbValue::from)
            .or_else(|| n.as_f64().map(DbValue::from))
            .ok_or_else(|| unsupported("number out of range")),
        Value::Null => Err(unsupported("null is only valid with equality operators")),
        Value::Array(_) | Value::Object(_) => Err(unsupported("nested documents have no column form")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::sea_query::{Asterisk, PostgresQueryBuilder, Query};
    use serde_json::json;

    fn sql(filter: Value) -> String {
        let filter = Filter::try_from(filter).unwrap();
        Query::select()
            .column(Asterisk)
            .from(Alias::new("reservations"))
            .cond_where(to_condition(&filter).unwrap())
            .to_string(PostgresQueryBuilder)
    }

    #[test]
    fn equality_and_null() {
        let out = sql(json!({"userId": "u1", "seatId": null}));
        assert!(out.contains(r#""userId" = 'u1'"#), "{out}");
        assert!(out.contains(r#""seatId" IS NULL"#), "{out}");
    }

    #[test]
    fn derived_reservation_scope() {
        let out = sql(json!({
            "$or": [
                {"userId": "u1", "confirmed": false, "expired": false,
                 "createdAt": {"$gte": "2026-10-16T11:55:00Z"}},
                {"userId": "u1", "seatId": null}
            ]
        }));
        assert!(out.contains(" OR "), "{out}");
        assert!(out.contains(r#""createdAt" >= '2026-10-16T11:55:00Z'"#), "{out}");
        assert!(out.contains(r#""confirmed" = FALSE"#), "{out}");
    }

    #[test]
    fn negative_operators_admit_null() {
        let out = sql(json!({"seatId": {"$ne": "s1"}}));
        assert!(out.contains(r#""seatId" <> 's1' OR "seatId" IS NULL"#), "{out}");
        let out = sql(json!({"seatId": {"$nin": ["s1", null]}}));
        assert!(out.contains("NOT IN ('s1')"), "{out}");
        assert!(out.contains(r#""seatId" IS NOT NULL"#), "{out}");
    }

    #[test]
    fn directives_are_not_columns() {
        let out = sql(json!({"$limit": 5, "$client": {"x": 1}, "floor": 2}));
        assert!(!out.contains("limit"), "{out}");
        assert!(out.contains(r#""floor" = 2"#), "{out}");
    }

    #[test]
    fn nested_documents_are_rejected() {
        let filter = Filter::try_from(json!({"meta": {"a": 1}})).unwrap();
        let err = to_condition(&filter).unwrap_err();
        assert!(matches!(err, StoreError::Unsupported { .. }));
    }
}
