//! Statement and Result Types
//!
//! Wire-level shapes shared by the executor, the dispatcher and the
//! replication fan-out.

use std::sync::Arc;

use base64::Engine;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A SQL statement with positional parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    /// Opaque SQL text
    #[serde(rename = "sqlQuery")]
    pub text: String,
    /// Positional parameters (`?1`, `?2`, ... or `?`)
    #[serde(default, deserialize_with = "null_as_empty")]
    pub params: Vec<serde_json::Value>,
}

impl Statement {
    /// Statement without parameters
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            params: Vec::new(),
        }
    }

    /// Statement with positional parameters
    pub fn with_params(text: impl Into<String>, params: Vec<serde_json::Value>) -> Self {
        Self {
            text: text.into(),
            params,
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<serde_json::Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<serde_json::Value>>::deserialize(deserializer)?.unwrap_or_default())
}

/// A single column value read back from storage
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl ColumnValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ColumnValue::Null)
    }
}

impl From<rusqlite::types::ValueRef<'_>> for ColumnValue {
    fn from(value: rusqlite::types::ValueRef<'_>) -> Self {
        use rusqlite::types::ValueRef;
        match value {
            ValueRef::Null => ColumnValue::Null,
            ValueRef::Integer(i) => ColumnValue::Integer(i),
            ValueRef::Real(f) => ColumnValue::Float(f),
            ValueRef::Text(t) => ColumnValue::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => ColumnValue::Bytes(b.to_vec()),
        }
    }
}

impl Serialize for ColumnValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            ColumnValue::Null => serializer.serialize_none(),
            ColumnValue::Integer(i) => serializer.serialize_i64(*i),
            ColumnValue::Float(f) if f.is_finite() => serializer.serialize_f64(*f),
            ColumnValue::Float(_) => serializer.serialize_none(),
            ColumnValue::Text(s) => serializer.serialize_str(s),
            ColumnValue::Bytes(b) => {
                serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(b))
            }
        }
    }
}

/// One result row: column names in declared order, paired with values.
///
/// Rows of the same result share a single column list.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    columns: Arc<[String]>,
    values: Vec<ColumnValue>,
}

impl Record {
    pub(crate) fn new(columns: Arc<[String]>, values: Vec<ColumnValue>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[ColumnValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value of the first column named `name`
    pub fn get(&self, name: &str) -> Option<&ColumnValue> {
        self.columns
            .iter()
            .position(|c| c == name)
            .map(|i| &self.values[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ColumnValue)> {
        self.columns.iter().map(String::as_str).zip(self.values.iter())
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (column, value) in self.iter() {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// Outcome of executing one statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionResult {
    pub rows: Vec<Record>,
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn ok(rows: Vec<Record>) -> Self {
        Self { rows, error: None }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            rows: Vec::new(),
            error: Some(error.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Bind a JSON request parameter as a SQLite value
pub fn json_to_sql(v: &serde_json::Value) -> rusqlite::types::Value {
    use rusqlite::types::Value;
    match v {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Integer(i64::from(*b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Integer(i)
            } else if let Some(f) = n.as_f64() {
                Value::Real(f)
            } else {
                Value::Text(n.to_string())
            }
        }
        serde_json::Value::String(s) => Value::Text(s.clone()),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => Value::Text(v.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::types::Value;
    use serde_json::json;

    #[test]
    fn test_statement_wire_format() {
        let stmt: Statement = serde_json::from_str(r#"{"sqlQuery":"SELECT ?1","params":[7]}"#).unwrap();
        assert_eq!(stmt.text, "SELECT ?1");
        assert_eq!(stmt.params, vec![json!(7)]);

        let stmt: Statement = serde_json::from_str(r#"{"sqlQuery":"SELECT 1","params":null}"#).unwrap();
        assert!(stmt.params.is_empty());

        let stmt: Statement = serde_json::from_str(r#"{"sqlQuery":"SELECT 1"}"#).unwrap();
        assert!(stmt.params.is_empty());

        let out = serde_json::to_value(Statement::new("DELETE FROM t")).unwrap();
        assert_eq!(out, json!({"sqlQuery": "DELETE FROM t", "params": []}));
    }

    #[test]
    fn test_column_value_json() {
        assert_eq!(serde_json::to_value(ColumnValue::Null).unwrap(), json!(null));
        assert_eq!(serde_json::to_value(ColumnValue::Integer(-3)).unwrap(), json!(-3));
        assert_eq!(serde_json::to_value(ColumnValue::Float(1.5)).unwrap(), json!(1.5));
        assert_eq!(serde_json::to_value(ColumnValue::Float(f64::NAN)).unwrap(), json!(null));
        assert_eq!(serde_json::to_value(ColumnValue::Text("a".into())).unwrap(), json!("a"));
        assert_eq!(
            serde_json::to_value(ColumnValue::Bytes(vec![0xde, 0xad, 0xbe, 0xef])).unwrap(),
            json!("3q2+7w==")
        );
    }

    #[test]
    fn test_record_keeps_column_order() {
        let columns: Arc<[String]> = vec!["z".to_string(), "a".to_string(), "m".to_string()].into();
        let record = Record::new(
            columns,
            vec![ColumnValue::Integer(1), ColumnValue::Null, ColumnValue::Text("x".into())],
        );
        assert_eq!(serde_json::to_string(&record).unwrap(), r#"{"z":1,"a":null,"m":"x"}"#);
        assert_eq!(record.get("m"), Some(&ColumnValue::Text("x".into())));
        assert_eq!(record.get("missing"), None);
    }

    #[test]
    fn test_json_to_sql() {
        assert_eq!(json_to_sql(&json!(null)), Value::Null);
        assert_eq!(json_to_sql(&json!(true)), Value::Integer(1));
        assert_eq!(json_to_sql(&json!(42)), Value::Integer(42));
        assert_eq!(json_to_sql(&json!(2.25)), Value::Real(2.25));
        assert_eq!(json_to_sql(&json!(u64::MAX)), Value::Real(u64::MAX as f64));
        assert_eq!(json_to_sql(&json!("s")), Value::Text("s".into()));
        assert_eq!(json_to_sql(&json!([1, 2])), Value::Text("[1,2]".into()));
    }
}
