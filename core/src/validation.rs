//! Declarative field validation.
//!
//! Rules are evaluated per field present in the input. Every violation across
//! every field is collected so the caller receives the complete list in one
//! `CrmError::Validation`.

use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde_json::Value;

use crate::types::{is_blank, value_to_text, Record};

/// Date format the server stores.
pub const DATE_FORMAT: &str = "%Y-%m-%d";
/// Date-time format the server stores.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One constraint on a field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    MaxLength(usize),
    /// Value must be one of a closed set.
    In(&'static [&'static str]),
    Email,
    Phone,
    Min(f64),
    Max(f64),
    Numeric,
    Date,
    DateTime,
}

/// Field rules of one module, in declaration order.
pub type RuleSet = Vec<(&'static str, Vec<Rule>)>;

/// Compile a built-in pattern once; a pattern that fails to compile is
/// logged and treated as matching nothing.
fn cached(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!(pattern, error = %e, "invalid validation pattern, treating as non-match");
            None
        }
    })
    .as_ref()
}

fn email_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached(&RE, r"^[A-Za-z0-9._%+'-]+@[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}$")
}

fn phone_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached(&RE, r"^\+?[0-9 ().\-/]*(\s*(x|ext\.?)\s*[0-9]+)?$")
}

pub fn is_valid_email(text: &str) -> bool {
    email_regex().is_some_and(|re| re.is_match(text.trim()))
}

/// Digits, spaces and the usual separators, with at least three digits.
pub fn is_valid_phone(text: &str) -> bool {
    let text = text.trim();
    phone_regex().is_some_and(|re| re.is_match(text)) && text.chars().filter(char::is_ascii_digit).count() >= 3
}

/// Finite numbers only; `NaN` and `inf` text does not count as numeric.
pub fn parse_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    n.filter(|n| n.is_finite())
}

pub fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), DATE_FORMAT).ok()
}

/// Accepts the server's `YYYY-MM-DD HH:MM:SS` as well as RFC 3339.
pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    NaiveDateTime::parse_from_str(text, DATETIME_FORMAT)
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(text).ok().map(|dt| dt.naive_utc()))
}

/// Parse either a date or a date-time; dates sort as midnight.
pub fn parse_temporal(value: &Value) -> Option<NaiveDateTime> {
    let text = value.as_str()?;
    parse_datetime(text).or_else(|| parse_date(text).and_then(|d| d.and_hms_opt(0, 0, 0)))
}

/// Violation message for one rule, or `None` when the value satisfies it.
pub fn check_rule(field: &str, value: &Value, rule: &Rule) -> Option<String> {
    let text = value_to_text(value);
    match rule {
        Rule::MaxLength(max) => (text.chars().count() > *max)
            .then(|| format!("Field '{field}' must not exceed {max} characters")),
        Rule::In(allowed) => (!allowed.contains(&text.as_str())).then(|| {
            format!("Field '{field}' must be one of: {}", allowed.join(", "))
        }),
        Rule::Email => (!is_valid_email(&text)).then(|| format!("Field '{field}' must be a valid email address")),
        Rule::Phone => (!is_valid_phone(&text)).then(|| format!("Field '{field}' must be a valid phone number")),
        Rule::Min(min) => match parse_number(value) {
            Some(n) if n < *min => Some(format!("Field '{field}' must be at least {min}")),
            Some(_) => None,
            None => Some(format!("Field '{field}' must be numeric")),
        },
        Rule::Max(max) => match parse_number(value) {
            Some(n) if n > *max => Some(format!("Field '{field}' must be at most {max}")),
            Some(_) => None,
            None => Some(format!("Field '{field}' must be numeric")),
        },
        Rule::Numeric => parse_number(value)
            .is_none()
            .then(|| format!("Field '{field}' must be numeric")),
        Rule::Date => parse_date(&text)
            .is_none()
            .then(|| format!("Field '{field}' must be a date (YYYY-MM-DD)")),
        Rule::DateTime => parse_datetime(&text)
            .is_none()
            .then(|| format!("Field '{field}' must be a date-time (YYYY-MM-DD HH:MM:SS)")),
    }
}

/// Evaluate every rule against every field present in `fields`.
///
/// Blank values are skipped; absence is the job of `check_required`.
pub fn validate_fields(fields: &Record, rules: &RuleSet) -> Vec<String> {
    let mut errors = Vec::new();
    for (field, field_rules) in rules {
        let Some(value) = fields.get(*field) else {
            continue;
        };
        if is_blank(value) {
            continue;
        }
        let mut numeric_reported = false;
        for rule in field_rules {
            if let Some(message) = check_rule(field, value, rule) {
                // Min and Max on the same non-numeric value say the same thing.
                if message.ends_with("must be numeric") {
                    if numeric_reported {
                        continue;
                    }
                    numeric_reported = true;
                }
                errors.push(message);
            }
        }
    }
    errors
}

/// Messages for every required field that is missing or blank.
pub fn check_required(fields: &Record, required: &[&str]) -> Vec<String> {
    required
        .iter()
        .filter(|name| fields.get(**name).map_or(true, is_blank))
        .map(|name| format!("Field '{name}' is required"))
        .collect()
}
