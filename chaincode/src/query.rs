//! Rich-query selectors.
//!
//! A query is a JSON object with a mandatory non-empty `selector` and an
//! optional `limit`. Selector keys are dot-paths into the document; values
//! are either literals (exact match) or operator objects:
//!
//! ```json
//! {"selector": {"status": "active", "metadata.version": {"$gte": 2}}, "limit": 10}
//! ```

use serde_json::{Map, Value};
use std::cmp::Ordering;

use crate::error::{ContractError, Result};

const OPERATORS: &[&str] = &["$eq", "$ne", "$gt", "$gte", "$lt", "$lte", "$in"];

#[derive(Debug, Clone, PartialEq)]
pub struct RichQuery {
    pub selector: Map<String, Value>,
    pub limit: Option<usize>,
}

impl RichQuery {
    /// Parse and validate a query string.
    ///
    /// Queries without a non-empty selector are rejected so a caller can
    /// never trigger a full-ledger scan.
    pub fn parse(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)?;
        let Value::Object(mut obj) = value else {
            return Err(ContractError::InvalidArgument(
                "Query must be a JSON object".into(),
            ));
        };

        let selector = match obj.remove("selector") {
            Some(Value::Object(s)) if !s.is_empty() => s,
            _ => {
                return Err(ContractError::InvalidArgument(
                    "Query must include a non-empty selector".into(),
                ))
            }
        };

        for (field, condition) in &selector {
            if let Value::Object(ops) = condition {
                for op in ops.keys().filter(|k| k.starts_with('$')) {
                    if !OPERATORS.contains(&op.as_str()) {
                        return Err(ContractError::InvalidArgument(format!(
                            "Unsupported operator {op} on {field}"
                        )));
                    }
                }
            }
        }

        let limit = match obj.get("limit") {
            None | Some(Value::Null) => None,
            Some(v) => match v.as_u64() {
                Some(n) if n > 0 => Some(n as usize),
                _ => {
                    return Err(ContractError::InvalidArgument(
                        "limit must be a positive integer".into(),
                    ))
                }
            },
        };

        Ok(Self { selector, limit })
    }

    /// Build a single-field equality query.
    pub fn field_equals(field: &str, value: impl Into<Value>) -> Self {
        let mut selector = Map::new();
        selector.insert(field.to_string(), value.into());
        Self {
            selector,
            limit: None,
        }
    }

    /// Whether a document satisfies every selector clause.
    pub fn matches(&self, doc: &Value) -> bool {
        self.selector.iter().all(|(path, condition)| {
            let actual = lookup(doc, path);
            match condition {
                Value::Object(ops) if is_operator_object(ops) => ops
                    .iter()
                    .all(|(op, operand)| apply(op, actual, operand)),
                literal => actual == Some(literal),
            }
        })
    }
}

fn is_operator_object(obj: &Map<String, Value>) -> bool {
    !obj.is_empty() && obj.keys().all(|k| k.starts_with('$'))
}

fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |current, segment| current.get(segment))
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn apply(op: &str, actual: Option<&Value>, operand: &Value) -> bool {
    match op {
        "$eq" => actual == Some(operand),
        "$ne" => actual != Some(operand),
        "$in" => match (actual, operand) {
            (Some(v), Value::Array(options)) => options.contains(v),
            _ => false,
        },
        _ => {
            let Some(ordering) = actual.and_then(|v| compare(v, operand)) else {
                return false;
            };
            match op {
                "$gt" => ordering == Ordering::Greater,
                "$gte" => ordering != Ordering::Less,
                "$lt" => ordering == Ordering::Less,
                "$lte" => ordering != Ordering::Greater,
                _ => false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rejects_missing_or_empty_selector() {
        assert!(RichQuery::parse("{}").is_err());
        assert!(RichQuery::parse(r#"{"selector":{}}"#).is_err());
        assert!(RichQuery::parse(r#"{"selector":"status"}"#).is_err());
        assert!(RichQuery::parse("[]").is_err());
        assert!(RichQuery::parse("not json").is_err());
        assert!(RichQuery::parse(r#"{"selector":{"status":"active"}}"#).is_ok());
    }

    #[test]
    fn test_rejects_unknown_operator() {
        let err = RichQuery::parse(r#"{"selector":{"status":{"$regex":".*"}}}"#).unwrap_err();
        assert!(err.to_string().contains("$regex"));
    }

    #[test]
    fn test_matches_nested_and_operators() {
        let doc = json!({
            "status": "active",
            "issuer": "Org1MSP",
            "metadata": {"version": 3}
        });

        let q = RichQuery::parse(
            r#"{"selector":{"status":"active","metadata.version":{"$gte":2,"$lt":4}}}"#,
        )
        .unwrap();
        assert!(q.matches(&doc));

        let q = RichQuery::parse(r#"{"selector":{"issuer":{"$in":["Org2MSP","Org3MSP"]}}}"#)
            .unwrap();
        assert!(!q.matches(&doc));

        let q = RichQuery::parse(r#"{"selector":{"missing":{"$ne":"x"}}}"#).unwrap();
        assert!(q.matches(&doc));
    }

    #[test]
    fn test_limit() {
        let q = RichQuery::parse(r#"{"selector":{"a":1},"limit":5}"#).unwrap();
        assert_eq!(q.limit, Some(5));
        assert!(RichQuery::parse(r#"{"selector":{"a":1},"limit":0}"#).is_err());
    }
}
