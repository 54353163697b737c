//! Universal value type for graph properties and query rows.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Node, Path, Relationship};

/// Property and row value.
///
/// Stored properties are loosely typed: the same key may hold a scalar on
/// one entity and a list on another. Both shapes are kept as they come from
/// the store; predicates check them explicitly (see [`Value::matches_any`]).
///
/// Row cells additionally carry graph elements (`Node`, `Relationship`,
/// `Path`) as returned by traversal queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(HashMap<String, Value>),

    // Graph types
    Node(Box<Node>),
    Relationship(Box<Relationship>),
    Path(Box<Path>),
}

// ============================================================================
// Type checking
// ============================================================================

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => "BOOLEAN",
            Value::Int(_) => "INTEGER",
            Value::Float(_) => "FLOAT",
            Value::String(_) => "STRING",
            Value::List(_) => "LIST",
            Value::Map(_) => "MAP",
            Value::Node(_) => "NODE",
            Value::Relationship(_) => "RELATIONSHIP",
            Value::Path(_) => "PATH",
        }
    }

    pub fn is_null(&self) -> bool { matches!(self, Value::Null) }
    pub fn is_list(&self) -> bool { matches!(self, Value::List(_)) }

    /// Attempt to extract as i64
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    /// Attempt to extract as f64
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Attempt to extract as &str
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Cypher `toFloat`: numbers pass through, numeric strings parse,
    /// anything else is null.
    pub fn to_float(&self) -> Option<f64> {
        match self {
            Value::String(s) => s.trim().parse().ok(),
            other => other.as_float(),
        }
    }

    /// Cypher `toString` for scalars. Returns `None` for null and
    /// non-scalar values.
    pub fn to_cypher_string(&self) -> Option<String> {
        match self {
            Value::String(s) => Some(s.clone()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(format!("{f:.1}")),
            Value::Float(f) => Some(f.to_string()),
            _ => None,
        }
    }

    /// The value viewed as a list of elements: a list yields its items,
    /// null yields nothing, anything else yields itself.
    pub fn elements(&self) -> &[Value] {
        match self {
            Value::List(items) => items,
            Value::Null => &[],
            other => std::slice::from_ref(other),
        }
    }

    /// Membership test against a set of accepted values, treating the
    /// stored value as either a scalar or an array of scalars.
    ///
    /// Mirrors `(x IN $p OR any(e IN x WHERE e IN $p))`.
    pub fn matches_any(&self, accepted: &[Value]) -> bool {
        match self {
            Value::Null => false,
            Value::List(items) => items
                .iter()
                .any(|item| accepted.iter().any(|a| item.equivalent(a))),
            scalar => accepted.iter().any(|a| scalar.equivalent(a)),
        }
    }

    /// Cypher equality: numeric values compare across int/float,
    /// null is never equal to anything.
    pub fn equivalent(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => false,
            (a, b) if a.is_numeric() && b.is_numeric() => {
                a.neo4j_cmp(b) == Some(Ordering::Equal)
            }
            (a, b) => a == b,
        }
    }

    fn is_numeric(&self) -> bool { matches!(self, Value::Int(_) | Value::Float(_)) }
}

// ============================================================================
// Conversions (From impls)
// ============================================================================

impl From<bool> for Value { fn from(v: bool) -> Self { Value::Bool(v) } }
impl From<i32> for Value { fn from(v: i32) -> Self { Value::Int(v as i64) } }
impl From<i64> for Value { fn from(v: i64) -> Self { Value::Int(v) } }
impl From<u64> for Value { fn from(v: u64) -> Self { Value::Int(v as i64) } }
impl From<usize> for Value { fn from(v: usize) -> Self { Value::Int(v as i64) } }
impl From<f64> for Value { fn from(v: f64) -> Self { Value::Float(v) } }
impl From<String> for Value { fn from(v: String) -> Self { Value::String(v) } }
impl From<&str> for Value { fn from(v: &str) -> Self { Value::String(v.to_owned()) } }
impl From<Node> for Value { fn from(v: Node) -> Self { Value::Node(Box::new(v)) } }
impl From<Relationship> for Value {
    fn from(v: Relationship) -> Self { Value::Relationship(Box::new(v)) }
}
impl From<Path> for Value { fn from(v: Path) -> Self { Value::Path(Box::new(v)) } }
impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self { Value::List(v.into_iter().map(Into::into).collect()) }
}
impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self { v.map(Into::into).unwrap_or(Value::Null) }
}

// ============================================================================
// Display
// ============================================================================

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(s) => write!(f, "\"{}\"", s.replace('"', "\\\"")),
            Value::List(l) => {
                write!(f, "[")?;
                for (i, v) in l.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Value::Map(m) => {
                write!(f, "{{")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            Value::Node(n) => write!(f, "({}:{})", n.id, n.labels.join(":")),
            Value::Relationship(r) => write!(f, "[{}:{} {}->{}]", r.id, r.rel_type, r.src, r.dst),
            Value::Path(p) => write!(f, "<path len {}>", p.len()),
        }
    }
}

// ============================================================================
// Comparison (Neo4j ordering rules)
// ============================================================================

impl Value {
    /// Neo4j comparison. Returns None for incompatible types (like SQL NULL behavior).
    pub fn neo4j_cmp(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Bool(a), Value::Bool(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::String(a), Value::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}
