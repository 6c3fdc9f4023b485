//! Data types exchanged with the CRM.
//!
//! # Design
//! A record is an ordered field map. Every module shares the same shape, so
//! there is no per-module struct; field names are the CRM's own. Values are
//! kept as JSON because the server echoes everything back as strings while
//! callers may submit numbers and booleans.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A CRM record: field name to value, in insertion order.
pub type Record = Map<String, Value>;

/// Field holding the server-assigned identifier.
pub const ID_FIELD: &str = "id";

/// The identifier of a record, if it has a non-empty one.
pub fn record_id(record: &Record) -> Option<&str> {
    record
        .get(ID_FIELD)
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
}

/// Render a field value the way the server stores it.
///
/// Strings pass through; numbers and booleans become their text form; null
/// becomes the empty string. Arrays and objects are JSON-encoded.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// True for null, empty strings and whitespace-only strings.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Build a record from `(field, value)` pairs.
pub fn record<I, K, V>(pairs: I) -> Record
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// One page of search results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchPage {
    pub records: Vec<Record>,
    /// Number of records on this page.
    pub result_count: usize,
    /// Total matches across all pages, when the server reports it.
    pub total_count: Option<usize>,
    pub next_offset: usize,
}

/// Outcome counters of a relationship change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipResult {
    #[serde(default)]
    pub created: u32,
    #[serde(default)]
    pub failed: u32,
    #[serde(default)]
    pub deleted: u32,
}

/// Error object the server returns in place of a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    pub name: String,
    pub number: u32,
    #[serde(default)]
    pub description: String,
}

impl Fault {
    pub const INVALID_LOGIN: u32 = 10;
    pub const INVALID_SESSION: u32 = 11;
    pub const MODULE_NOT_FOUND: u32 = 20;

    pub fn is_authentication(&self) -> bool {
        matches!(self.number, Self::INVALID_LOGIN | Self::INVALID_SESSION)
    }
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.description.is_empty() {
            write!(f, "{} ({})", self.name, self.number)
        } else {
            write!(f, "{} ({}): {}", self.name, self.number, self.description)
        }
    }
}
