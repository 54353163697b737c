//! Raw result rows.
//!
//! Stores hand back rows of named columns in query order. Consumers read
//! them positionally (the normalizer walks every column) or by name.

use crate::model::*;
use crate::{Error, Result};

/// A single row in a store result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    pub fields: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style column append.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(column, value);
        self
    }

    pub fn push(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.fields.push((column.into(), value.into()));
    }

    pub fn get_value(&self, column: &str) -> Option<&Value> {
        self.fields.iter().find(|(c, _)| c == column).map(|(_, v)| v)
    }

    /// Get a typed value from the row.
    pub fn get<T: FromValue>(&self, column: &str) -> Result<T> {
        let val = self
            .get_value(column)
            .ok_or_else(|| Error::NotFound(format!("Column '{column}'")))?;
        T::from_value(val)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.fields.iter().map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Convert from Value to concrete types.
pub trait FromValue: Sized {
    fn from_value(val: &Value) -> Result<Self>;
}

fn type_error(expected: &str, val: &Value) -> Error {
    Error::TypeError {
        expected: expected.into(),
        got: val.type_name().into(),
    }
}

impl FromValue for Value {
    fn from_value(val: &Value) -> Result<Self> {
        Ok(val.clone())
    }
}

impl FromValue for Node {
    fn from_value(val: &Value) -> Result<Self> {
        match val {
            Value::Node(n) => Ok(*n.clone()),
            _ => Err(type_error("Node", val)),
        }
    }
}

impl FromValue for Relationship {
    fn from_value(val: &Value) -> Result<Self> {
        match val {
            Value::Relationship(r) => Ok(*r.clone()),
            _ => Err(type_error("Relationship", val)),
        }
    }
}

impl FromValue for String {
    fn from_value(val: &Value) -> Result<Self> {
        match val {
            Value::String(s) => Ok(s.clone()),
            _ => Err(type_error("String", val)),
        }
    }
}

impl FromValue for i64 {
    fn from_value(val: &Value) -> Result<Self> {
        val.as_int().ok_or_else(|| type_error("Integer", val))
    }
}

impl FromValue for f64 {
    fn from_value(val: &Value) -> Result<Self> {
        val.as_float().ok_or_else(|| type_error("Float", val))
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(val: &Value) -> Result<Self> {
        match val {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(val: &Value) -> Result<Self> {
        match val {
            Value::List(items) => items.iter().map(T::from_value).collect(),
            Value::Null => Ok(Vec::new()),
            _ => Err(type_error("List", val)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_access() {
        let row = Row::new()
            .with("value", "EMEA")
            .with("score", 2.5)
            .with("name", Value::Null)
            .with("ids", vec![1i64, 2]);

        assert_eq!(row.get::<String>("value").unwrap(), "EMEA");
        assert_eq!(row.get::<f64>("score").unwrap(), 2.5);
        assert_eq!(row.get::<Option<String>>("name").unwrap(), None);
        assert_eq!(row.get::<Vec<i64>>("ids").unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_missing_column_and_type_mismatch() {
        let row = Row::new().with("value", 3);
        assert!(matches!(row.get::<String>("other"), Err(Error::NotFound(_))));
        assert!(matches!(row.get::<Node>("value"), Err(Error::TypeError { .. })));
    }

    #[test]
    fn test_columns_keep_query_order() {
        let row = Row::new().with("b", 1).with("a", 2);
        let names: Vec<&str> = row.fields.iter().map(|(c, _)| c.as_str()).collect();
        assert_eq!(names, ["b", "a"]);
    }
}
