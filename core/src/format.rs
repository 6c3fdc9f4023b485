//! Record shaping helpers shared by the module table.

use serde_json::Value;

use crate::types::{value_to_text, Record};
use crate::validation::{parse_date, parse_datetime, parse_temporal, DATETIME_FORMAT, DATE_FORMAT};

/// Trim surrounding whitespace from every string value.
pub fn trim_strings(record: &mut Record) {
    for value in record.values_mut() {
        if let Value::String(s) = value {
            let trimmed = s.trim();
            if trimmed.len() != s.len() {
                *s = trimmed.to_string();
            }
        }
    }
}

/// Lowercase the listed fields, e.g. email addresses.
pub fn lowercase_fields(record: &mut Record, fields: &[&str]) {
    for field in fields {
        if let Some(Value::String(s)) = record.get_mut(*field) {
            *s = s.to_lowercase();
        }
    }
}

/// Rewrite parseable date-times into the server's `YYYY-MM-DD HH:MM:SS`.
pub fn normalize_datetimes(record: &mut Record, fields: &[&str]) {
    for field in fields {
        if let Some(Value::String(s)) = record.get_mut(*field) {
            if let Some(dt) = parse_datetime(s) {
                *s = dt.format(DATETIME_FORMAT).to_string();
            }
        }
    }
}

/// Rewrite parseable dates (or date-times) into `YYYY-MM-DD`.
pub fn normalize_dates(record: &mut Record, fields: &[&str]) {
    for field in fields {
        if let Some(Value::String(s)) = record.get_mut(*field) {
            let date = parse_date(s).or_else(|| parse_datetime(s).map(|dt| dt.date()));
            if let Some(date) = date {
                *s = date.format(DATE_FORMAT).to_string();
            }
        }
    }
}

/// Join the non-empty name parts with single spaces.
pub fn full_name(record: &Record, parts: &[&str]) -> String {
    parts
        .iter()
        .filter_map(|field| record.get(*field))
        .map(value_to_text)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Insert `full_name` built from salutation, first and last name.
pub fn add_full_name(record: &mut Record) {
    let name = full_name(record, &["salutation", "first_name", "last_name"]);
    if !name.is_empty() {
        record.insert("full_name".to_string(), Value::String(name));
    }
}

/// Violation when both fields are present and `start` is after `end`.
pub fn check_order(record: &Record, start: &str, end: &str) -> Option<String> {
    let from = record.get(start).and_then(parse_temporal)?;
    let to = record.get(end).and_then(parse_temporal)?;
    (from > to).then(|| format!("Field '{start}' must not be after '{end}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::record;

    #[test]
    fn full_name_skips_blank_parts() {
        let rec = record([("salutation", ""), ("first_name", " Jane "), ("last_name", "Doe")]);
        assert_eq!(full_name(&rec, &["salutation", "first_name", "last_name"]), "Jane Doe");
    }

    #[test]
    fn datetimes_are_normalized_to_server_format() {
        let mut rec = record([("date_start", "2024-05-01T09:30:00Z"), ("date_end", "garbage")]);
        normalize_datetimes(&mut rec, &["date_start", "date_end"]);
        assert_eq!(rec["date_start"], "2024-05-01 09:30:00");
        assert_eq!(rec["date_end"], "garbage");
    }

    #[test]
    fn dates_drop_time_component() {
        let mut rec = record([("due_date", "2024-05-01 23:59:59")]);
        normalize_dates(&mut rec, &["due_date"]);
        assert_eq!(rec["due_date"], "2024-05-01");
    }

    #[test]
    fn order_check_ignores_missing_or_unparseable() {
        let rec = record([("start", "2024-02-01"), ("end", "2024-01-01")]);
        assert!(check_order(&rec, "start", "end").is_some());
        let rec = record([("start", "2024-02-01")]);
        assert!(check_order(&rec, "start", "end").is_none());
        let rec = record([("start", "2024-01-01"), ("end", "2024-01-01 10:00:00")]);
        assert!(check_order(&rec, "start", "end").is_none());
    }

    #[test]
    fn trim_and_lowercase() {
        let mut rec = record([("email1", "  Jane@Example.COM ")]);
        trim_strings(&mut rec);
        lowercase_fields(&mut rec, &["email1"]);
        assert_eq!(rec["email1"], "jane@example.com");
    }
}
