//! Search criteria and their compilation into the server's query string.
//!
//! The server accepts a SQL-like `WHERE` fragment. Each criterion becomes one
//! clause and clauses are joined with `AND`; empty criteria select everything.

use serde_json::Value;

use crate::error::{CrmError, Result};
use crate::types::value_to_text;

/// Comparison applied to a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equals,
    NotEquals,
    Contains,
    StartsWith,
    EndsWith,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    /// Value must be a two-element array.
    Between,
    /// Value must be an array.
    In,
    NotIn,
    IsNull,
    IsNotNull,
}

impl Operator {
    pub fn parse(name: &str) -> Option<Self> {
        let op = match name.trim().to_ascii_lowercase().as_str() {
            "=" | "eq" | "equals" => Operator::Equals,
            "!=" | "<>" | "ne" | "not_equals" => Operator::NotEquals,
            "like" | "contains" => Operator::Contains,
            "starts_with" => Operator::StartsWith,
            "ends_with" => Operator::EndsWith,
            "<" | "lt" | "less_than" => Operator::LessThan,
            "<=" | "lte" | "less_than_or_equal" => Operator::LessThanOrEqual,
            ">" | "gt" | "greater_than" => Operator::GreaterThan,
            ">=" | "gte" | "greater_than_or_equal" => Operator::GreaterThanOrEqual,
            "between" => Operator::Between,
            "in" => Operator::In,
            "not_in" => Operator::NotIn,
            "is_null" => Operator::IsNull,
            "is_not_null" => Operator::IsNotNull,
            _ => return None,
        };
        Some(op)
    }
}

/// Condition on one field.
#[derive(Debug, Clone, PartialEq)]
pub enum Criterion {
    Equals(Value),
    Op { operator: Operator, value: Value },
}

/// Ordered set of field conditions, all of which must hold.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria {
    clauses: Vec<(String, Criterion)>,
}

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn equals(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.clauses
            .push((field.to_string(), Criterion::Equals(value.into())));
        self
    }

    pub fn op(mut self, field: &str, operator: Operator, value: impl Into<Value>) -> Self {
        self.clauses.push((
            field.to_string(),
            Criterion::Op {
                operator,
                value: value.into(),
            },
        ));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    pub fn clauses(&self) -> &[(String, Criterion)] {
        &self.clauses
    }

    /// Parse the `{field: literal | {operator, value}}` descriptor form.
    pub fn from_json(value: &Value) -> Result<Self> {
        let map = value
            .as_object()
            .ok_or_else(|| CrmError::validation("search criteria must be an object"))?;
        let mut criteria = Criteria::new();
        for (field, spec) in map {
            let criterion = match spec.as_object() {
                Some(desc) if desc.contains_key("operator") => {
                    let name = desc.get("operator").and_then(Value::as_str).unwrap_or_default();
                    let operator = Operator::parse(name).ok_or_else(|| {
                        CrmError::validation(format!("Field '{field}' uses unknown operator '{name}'"))
                    })?;
                    Criterion::Op {
                        operator,
                        value: desc.get("value").cloned().unwrap_or(Value::Null),
                    }
                }
                _ => Criterion::Equals(spec.clone()),
            };
            criteria.clauses.push((field.clone(), criterion));
        }
        Ok(criteria)
    }

    /// Compile into the server's query string.
    pub fn to_query(&self) -> Result<String> {
        let mut clauses = Vec::with_capacity(self.clauses.len());
        let mut errors = Vec::new();
        for (field, criterion) in &self.clauses {
            match compile_clause(field, criterion) {
                Ok(clause) => clauses.push(clause),
                Err(message) => errors.push(message),
            }
        }
        if !errors.is_empty() {
            return Err(CrmError::Validation { errors });
        }
        Ok(clauses.join(" AND "))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Criteria {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            clauses: iter
                .into_iter()
                .map(|(k, v)| (k.into(), Criterion::Equals(v.into())))
                .collect(),
        }
    }
}

fn compile_clause(field: &str, criterion: &Criterion) -> std::result::Result<String, String> {
    if field.is_empty() || !field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.') {
        return Err(format!("Field '{field}' is not a valid field name"));
    }
    let (operator, value) = match criterion {
        Criterion::Equals(value) => (Operator::Equals, value),
        Criterion::Op { operator, value } => (*operator, value),
    };
    let clause = match operator {
        Operator::Equals => format!("{field} = {}", quote(value)),
        Operator::NotEquals => format!("{field} != {}", quote(value)),
        Operator::Contains => format!("{field} LIKE {}", quote_like("%", value, "%")),
        Operator::StartsWith => format!("{field} LIKE {}", quote_like("", value, "%")),
        Operator::EndsWith => format!("{field} LIKE {}", quote_like("%", value, "")),
        Operator::LessThan => format!("{field} < {}", quote(value)),
        Operator::LessThanOrEqual => format!("{field} <= {}", quote(value)),
        Operator::GreaterThan => format!("{field} > {}", quote(value)),
        Operator::GreaterThanOrEqual => format!("{field} >= {}", quote(value)),
        Operator::Between => match value.as_array().map(Vec::as_slice) {
            Some([low, high]) => format!("{field} BETWEEN {} AND {}", quote(low), quote(high)),
            _ => return Err(format!("Field '{field}' between requires exactly two values")),
        },
        Operator::In | Operator::NotIn => {
            let items = value
                .as_array()
                .filter(|items| !items.is_empty())
                .ok_or_else(|| format!("Field '{field}' set operator requires a non-empty list"))?;
            let list = items.iter().map(quote).collect::<Vec<_>>().join(", ");
            let keyword = if operator == Operator::In { "IN" } else { "NOT IN" };
            format!("{field} {keyword} ({list})")
        }
        Operator::IsNull => format!("{field} IS NULL"),
        Operator::IsNotNull => format!("{field} IS NOT NULL"),
    };
    Ok(clause)
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('\'', "\\'")
}

fn quote(value: &Value) -> String {
    format!("'{}'", escape(&value_to_text(value)))
}

/// Quote a LIKE operand; `%` and `_` in the value match literally.
fn quote_like(prefix: &str, value: &Value, suffix: &str) -> String {
    let literal = escape(&value_to_text(value)).replace('%', "\\%").replace('_', "\\_");
    format!("'{prefix}{literal}{suffix}'")
}
