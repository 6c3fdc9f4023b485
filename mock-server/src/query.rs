//! Parser and evaluator for the `WHERE` fragments clients send as `query`.
//!
//! Supports the subset a client compiles: `AND`-joined clauses of the form
//! `field <op> 'value'`, `LIKE`, `BETWEEN`, `IN`/`NOT IN` and `IS [NOT] NULL`.
//! Field names may carry a `table.` prefix, which is ignored.

use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compare {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Compare { field: String, op: Compare, value: String },
    Like { field: String, pattern: String },
    Between { field: String, low: String, high: String },
    In { field: String, values: Vec<String>, negated: bool },
    Null { field: String, negated: bool },
}

/// Parse a query string; the empty string matches everything.
pub fn parse(query: &str) -> Result<Vec<Condition>, String> {
    let mut parser = Parser {
        chars: query.chars().collect(),
        pos: 0,
    };
    let mut conditions = Vec::new();
    parser.skip_ws();
    if parser.at_end() {
        return Ok(conditions);
    }
    loop {
        conditions.push(parser.condition()?);
        parser.skip_ws();
        if parser.at_end() {
            return Ok(conditions);
        }
        if !parser.keyword("AND") {
            return Err(format!("expected AND at offset {}", parser.pos));
        }
    }
}

/// True when `record` satisfies every condition.
pub fn matches(record: &Map<String, Value>, conditions: &[Condition]) -> bool {
    conditions.iter().all(|c| holds(record, c))
}

fn field_text(record: &Map<String, Value>, field: &str) -> Option<String> {
    match record.get(field)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn compare(left: &str, right: &str) -> std::cmp::Ordering {
    match (left.trim().parse::<f64>(), right.trim().parse::<f64>()) {
        (Ok(a), Ok(b)) => a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal),
        _ => left.to_lowercase().cmp(&right.to_lowercase()),
    }
}

fn holds(record: &Map<String, Value>, condition: &Condition) -> bool {
    use std::cmp::Ordering::*;
    match condition {
        Condition::Compare { field, op, value } => {
            let actual = field_text(record, field).unwrap_or_default();
            let ord = compare(&actual, value);
            match op {
                Compare::Eq => ord == Equal,
                Compare::Ne => ord != Equal,
                Compare::Lt => ord == Less,
                Compare::Le => ord != Greater,
                Compare::Gt => ord == Greater,
                Compare::Ge => ord != Less,
            }
        }
        Condition::Like { field, pattern } => field_text(record, field)
            .is_some_and(|actual| like(&actual.to_lowercase(), &pattern.to_lowercase())),
        Condition::Between { field, low, high } => {
            let actual = field_text(record, field).unwrap_or_default();
            compare(&actual, low) != Less && compare(&actual, high) != Greater
        }
        Condition::In { field, values, negated } => {
            let actual = field_text(record, field).unwrap_or_default();
            values.iter().any(|v| compare(&actual, v) == Equal) != *negated
        }
        Condition::Null { field, negated } => {
            let is_null = field_text(record, field).map_or(true, |s| s.is_empty());
            is_null != *negated
        }
    }
}

enum Piece {
    Any,
    One,
    Literal(char),
}

fn pieces(pattern: &str) -> Vec<Piece> {
    let mut out = Vec::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        out.push(match c {
            '%' => Piece::Any,
            '_' => Piece::One,
            '\\' => Piece::Literal(chars.next().unwrap_or('\\')),
            other => Piece::Literal(other),
        });
    }
    out
}

/// SQL `LIKE`: `%` is any run, `_` any one character, `\` escapes either.
fn like(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let mut reachable = vec![false; text.len() + 1];
    reachable[0] = true;
    for piece in pieces(pattern) {
        let mut next = vec![false; text.len() + 1];
        match piece {
            Piece::Any => {
                let mut seen = false;
                for (i, slot) in next.iter_mut().enumerate() {
                    seen |= reachable[i];
                    *slot = seen;
                }
            }
            Piece::One => {
                for i in 0..text.len() {
                    next[i + 1] |= reachable[i];
                }
            }
            Piece::Literal(c) => {
                for i in 0..text.len() {
                    next[i + 1] |= reachable[i] && text[i] == c;
                }
            }
        }
        reachable = next;
    }
    reachable[text.len()]
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn is_ident_char(c: char) -> bool {
        c.is_ascii_alphanumeric() || c == '_' || c == '.'
    }

    /// Consume `word` case-insensitively if it stands alone at the cursor.
    fn keyword(&mut self, word: &str) -> bool {
        self.skip_ws();
        let len = word.chars().count();
        let end = self.pos + len;
        if end > self.chars.len() {
            return false;
        }
        let candidate: String = self.chars[self.pos..end].iter().collect();
        let bounded = self.chars.get(end).map_or(true, |c| !Self::is_ident_char(*c));
        if candidate.eq_ignore_ascii_case(word) && bounded {
            self.pos = end;
            true
        } else {
            false
        }
    }

    fn symbol(&mut self, symbol: &str) -> bool {
        self.skip_ws();
        let len = symbol.chars().count();
        let end = self.pos + len;
        if end <= self.chars.len() && self.chars[self.pos..end].iter().copied().eq(symbol.chars()) {
            self.pos = end;
            true
        } else {
            false
        }
    }

    fn ident(&mut self) -> Result<String, String> {
        self.skip_ws();
        let start = self.pos;
        while self.peek().is_some_and(Self::is_ident_char) {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(format!("expected field name at offset {start}"));
        }
        let name: String = self.chars[start..self.pos].iter().collect();
        Ok(match name.rsplit_once('.') {
            Some((_, field)) => field.to_string(),
            None => name,
        })
    }

    fn string(&mut self) -> Result<String, String> {
        self.quoted(false)
    }

    /// Like `string`, but escapes stay in place for the LIKE matcher.
    fn like_pattern(&mut self) -> Result<String, String> {
        self.quoted(true)
    }

    fn quoted(&mut self, keep_wildcard_escapes: bool) -> Result<String, String> {
        self.skip_ws();
        if self.peek() != Some('\'') {
            return Err(format!("expected quoted value at offset {}", self.pos));
        }
        self.pos += 1;
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err("unterminated string".to_string()),
                Some('\\') => {
                    self.pos += 1;
                    let escaped = self.peek().ok_or("unterminated escape")?;
                    if keep_wildcard_escapes && matches!(escaped, '%' | '_' | '\\') {
                        out.push('\\');
                    }
                    out.push(escaped);
                    self.pos += 1;
                }
                Some('\'') => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some(c) => {
                    out.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    fn list(&mut self) -> Result<Vec<String>, String> {
        if !self.symbol("(") {
            return Err(format!("expected ( at offset {}", self.pos));
        }
        let mut values = vec![self.string()?];
        while self.symbol(",") {
            values.push(self.string()?);
        }
        if !self.symbol(")") {
            return Err(format!("expected ) at offset {}", self.pos));
        }
        Ok(values)
    }

    fn condition(&mut self) -> Result<Condition, String> {
        let field = self.ident()?;
        if self.keyword("IS") {
            let negated = self.keyword("NOT");
            if !self.keyword("NULL") {
                return Err(format!("expected NULL at offset {}", self.pos));
            }
            return Ok(Condition::Null { field, negated });
        }
        if self.keyword("LIKE") {
            let pattern = self.like_pattern()?;
            return Ok(Condition::Like { field, pattern });
        }
        if self.keyword("BETWEEN") {
            let low = self.string()?;
            if !self.keyword("AND") {
                return Err(format!("expected AND at offset {}", self.pos));
            }
            let high = self.string()?;
            return Ok(Condition::Between { field, low, high });
        }
        if self.keyword("NOT") {
            if !self.keyword("IN") {
                return Err(format!("expected IN at offset {}", self.pos));
            }
            return Ok(Condition::In {
                field,
                values: self.list()?,
                negated: true,
            });
        }
        if self.keyword("IN") {
            return Ok(Condition::In {
                field,
                values: self.list()?,
                negated: false,
            });
        }
        let op = [
            ("!=", Compare::Ne),
            ("<>", Compare::Ne),
            ("<=", Compare::Le),
            (">=", Compare::Ge),
            ("=", Compare::Eq),
            ("<", Compare::Lt),
            (">", Compare::Gt),
        ]
        .into_iter()
        .find(|(symbol, _)| self.symbol(symbol))
        .map(|(_, op)| op)
        .ok_or_else(|| format!("unsupported operator at offset {}", self.pos))?;
        let value = self.string()?;
        Ok(Condition::Compare { field, op, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn empty_query_matches_all() {
        assert!(parse("  ").unwrap().is_empty());
    }

    #[test]
    fn parses_and_chain_with_prefix_and_escapes() {
        let conditions = parse(r"contacts.last_name = 'O\'Brien' AND status != 'Dead'").unwrap();
        assert_eq!(
            conditions[0],
            Condition::Compare {
                field: "last_name".to_string(),
                op: Compare::Eq,
                value: "O'Brien".to_string(),
            }
        );
        assert_eq!(conditions.len(), 2);
    }

    #[test]
    fn evaluates_operators() {
        let r = rec(json!({"name": "Acme Corp", "amount": "250", "status": "New", "note": ""}));
        let check = |q: &str| matches(&r, &parse(q).unwrap());
        assert!(check("name LIKE '%corp'"));
        assert!(check("name LIKE 'acme%'"));
        assert!(!check("name LIKE '%widget%'"));
        assert!(check("amount > '99'"));
        assert!(check("amount BETWEEN '100' AND '300'"));
        assert!(check("status IN ('New', 'Assigned')"));
        assert!(check("status NOT IN ('Dead')"));
        assert!(check("note IS NULL AND missing IS NULL"));
        assert!(check("name IS NOT NULL"));
    }

    #[test]
    fn like_honors_single_char_and_escaped_wildcards() {
        let sale = rec(json!({"discount": "50% off", "code": "A_1"}));
        let bulk = rec(json!({"discount": "500 units", "code": "AB1"}));
        let q = parse(r"discount LIKE '%50\%%'").unwrap();
        assert!(matches(&sale, &q));
        assert!(!matches(&bulk, &q));

        let literal = parse(r"code LIKE 'A\_1'").unwrap();
        assert!(matches(&sale, &literal));
        assert!(!matches(&bulk, &literal));
        let single = parse("code LIKE 'A_1'").unwrap();
        assert!(matches(&bulk, &single));

        let path = rec(json!({"path": r"C:\temp"}));
        assert!(matches(&path, &parse(r"path LIKE '%:\\t%'").unwrap()));
    }

    #[test]
    fn rejects_unsupported_syntax() {
        assert!(parse("name = 'a' OR name = 'b'").is_err());
        assert!(parse("name ~ 'a'").is_err());
        assert!(parse("name = 'open").is_err());
    }
}
