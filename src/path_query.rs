// 🧭 Path Queries - Declarative field selection over arbitrary JSON
//
// A small JSONPath subset, compiled once when configuration is loaded:
//
//   $                 root
//   .name  ['name']   object member
//   [3]               array element
//   .*  [*]           every child (array elements or object members)
//   ..name  ..*       recursive descent
//
// Evaluation returns matches in document order (object members keep the
// order they had in the payload).

use serde_json::Value;
use std::fmt;
use std::iter::Peekable;
use std::str::{CharIndices, FromStr};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid path query `{query}` at offset {offset}: {reason}")]
pub struct PathSyntaxError {
    pub query: String,
    pub offset: usize,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Child(String),
    Index(usize),
    Wildcard,
    Descendant(String),
    DescendantWildcard,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathQuery {
    source: String,
    segments: Vec<Segment>,
}

impl PathQuery {
    /// Compile a query string
    pub fn parse(query: &str) -> Result<Self, PathSyntaxError> {
        let source = query.trim();
        let err = |offset: usize, reason: String| PathSyntaxError {
            query: source.to_string(),
            offset,
            reason,
        };

        let mut chars = source.char_indices().peekable();
        match chars.next() {
            Some((_, '$')) => {}
            _ => return Err(err(0, "query must start with `$`".to_string())),
        }

        let mut segments = Vec::new();
        while let Some((offset, c)) = chars.next() {
            match c {
                '.' => {
                    let descendant = matches!(chars.peek(), Some((_, '.')));
                    if descendant {
                        chars.next();
                    }
                    let name = take_name(&mut chars);
                    if name.is_empty() {
                        return Err(err(offset, "expected a member name after `.`".to_string()));
                    }
                    segments.push(match (descendant, name == "*") {
                        (false, false) => Segment::Child(name),
                        (false, true) => Segment::Wildcard,
                        (true, false) => Segment::Descendant(name),
                        (true, true) => Segment::DescendantWildcard,
                    });
                }
                '[' => segments.push(parse_bracket(&mut chars, offset, &err)?),
                other => return Err(err(offset, format!("unexpected character `{other}`"))),
            }
        }

        Ok(PathQuery {
            source: source.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// All matches in document order
    pub fn find<'a>(&self, root: &'a Value) -> Vec<&'a Value> {
        let mut current = vec![root];

        for segment in &self.segments {
            let mut next = Vec::new();
            for node in current {
                match segment {
                    Segment::Child(name) => {
                        if let Some(v) = node.as_object().and_then(|o| o.get(name)) {
                            next.push(v);
                        }
                    }
                    Segment::Index(i) => {
                        if let Some(v) = node.as_array().and_then(|a| a.get(*i)) {
                            next.push(v);
                        }
                    }
                    Segment::Wildcard => push_children(node, &mut next),
                    Segment::Descendant(name) => {
                        let mut visited = Vec::new();
                        push_self_and_descendants(node, &mut visited);
                        for n in visited {
                            if let Some(v) = n.as_object().and_then(|o| o.get(name)) {
                                next.push(v);
                            }
                        }
                    }
                    Segment::DescendantWildcard => {
                        let mut visited = Vec::new();
                        push_self_and_descendants(node, &mut visited);
                        for n in visited {
                            push_children(n, &mut next);
                        }
                    }
                }
            }
            current = next;
        }

        current
    }

}

impl FromStr for PathQuery {
    type Err = PathSyntaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PathQuery::parse(s)
    }
}

impl fmt::Display for PathQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

// ============================================================================
// PARSER HELPERS
// ============================================================================

/// Dotted member names are identifiers (`[A-Za-z0-9_-]+`) or a lone `*`.
/// Anything else is left for the caller to reject.
fn take_name(chars: &mut Peekable<CharIndices<'_>>) -> String {
    if let Some(&(_, '*')) = chars.peek() {
        chars.next();
        return "*".to_string();
    }
    let mut name = String::new();
    while let Some(&(_, c)) = chars.peek() {
        if !(c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            break;
        }
        name.push(c);
        chars.next();
    }
    name
}

fn parse_bracket<F>(
    chars: &mut Peekable<CharIndices<'_>>,
    offset: usize,
    err: &F,
) -> Result<Segment, PathSyntaxError>
where
    F: Fn(usize, String) -> PathSyntaxError,
{
    // Quoted member name: ['name'] or ["name"]
    if let Some(&(_, quote)) = chars.peek() {
        if quote == '\'' || quote == '"' {
            chars.next();
            let mut name = String::new();
            loop {
                match chars.next() {
                    Some((_, c)) if c == quote => break,
                    Some((_, c)) => name.push(c),
                    None => return Err(err(offset, "unterminated quoted member name".to_string())),
                }
            }
            return match chars.next() {
                Some((_, ']')) => Ok(Segment::Child(name)),
                _ => Err(err(offset, "expected `]` after quoted member name".to_string())),
            };
        }
    }

    let mut inner = String::new();
    loop {
        match chars.next() {
            Some((_, ']')) => break,
            Some((_, c)) => inner.push(c),
            None => return Err(err(offset, "unterminated `[`".to_string())),
        }
    }

    let inner = inner.trim();
    if inner == "*" {
        return Ok(Segment::Wildcard);
    }
    inner
        .parse::<usize>()
        .map(Segment::Index)
        .map_err(|_| err(offset, format!("expected an index, `*` or a quoted name, got `{inner}`")))
}

// ============================================================================
// EVALUATION HELPERS
// ============================================================================

fn push_children<'a>(node: &'a Value, out: &mut Vec<&'a Value>) {
    match node {
        Value::Array(items) => out.extend(items.iter()),
        Value::Object(members) => out.extend(members.values()),
        _ => {}
    }
}

/// Pre-order walk
fn push_self_and_descendants<'a>(node: &'a Value, out: &mut Vec<&'a Value>) {
    out.push(node);
    match node {
        Value::Array(items) => items.iter().for_each(|v| push_self_and_descendants(v, out)),
        Value::Object(members) => members.values().for_each(|v| push_self_and_descendants(v, out)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload() -> Value {
        json!({
            "bank_reference": "APP_001",
            "order": { "id": "MFG_001", "facility": { "name": "Chennai Production Unit" } },
            "production_history": [
                { "status": "received", "timestamp": "2025-08-16T08:00:00Z" },
                { "status": "dispatched", "tracking_number": "DTDC123" }
            ],
            "odd key": null
        })
    }

    fn first<'a>(query: &str, data: &'a Value) -> Option<&'a Value> {
        PathQuery::parse(query).unwrap().find(data).into_iter().next()
    }

    #[test]
    fn test_member_and_index() {
        let data = payload();
        assert_eq!(first("$.order.id", &data), Some(&json!("MFG_001")));
        assert_eq!(first("$.production_history[1].status", &data), Some(&json!("dispatched")));
        assert_eq!(
            first("$['order'][\"facility\"].name", &data),
            Some(&json!("Chennai Production Unit"))
        );
    }

    #[test]
    fn test_wildcard_in_document_order() {
        let data = payload();
        let q = PathQuery::parse("$.production_history[*].status").unwrap();
        assert_eq!(q.find(&data), vec![&json!("received"), &json!("dispatched")]);

        let q = PathQuery::parse("$.production_history.*").unwrap();
        assert_eq!(q.find(&data).len(), 2);

        let q = PathQuery::parse("$.order-ref.*").unwrap();
        assert!(q.find(&data).is_empty());
    }

    #[test]
    fn test_recursive_descent() {
        let data = payload();
        let q = PathQuery::parse("$..tracking_number").unwrap();
        assert_eq!(q.find(&data), vec![&json!("DTDC123")]);

        assert_eq!(first("$..status", &data), Some(&json!("received")));
    }

    #[test]
    fn test_no_match_and_null() {
        let data = payload();
        assert!(PathQuery::parse("$.missing.deeper").unwrap().find(&data).is_empty());
        assert!(first("$.production_history[7]", &data).is_none());
        assert_eq!(first("$['odd key']", &data), Some(&Value::Null));
    }

    #[test]
    fn test_syntax_errors() {
        for bad in [
            "status", "$.", "$.a..", "$[", "$[abc]", "$['open", "$.a b", "$#", "$.status]", "$.a'b", "$.a(b)",
            "$.a*",
        ] {
            let err = PathQuery::parse(bad).unwrap_err();
            assert_eq!(err.query, bad.trim());
        }
        let err = PathQuery::parse("order.id").unwrap_err();
        assert_eq!(err.offset, 0);

        let err = PathQuery::parse("$.status]").unwrap_err();
        assert_eq!(err.offset, 8);
        assert!(err.reason.contains("`]`"));
    }

    #[test]
    fn test_display_round_trip() {
        let q: PathQuery = " $.order.id ".parse().unwrap();
        assert_eq!(q.to_string(), "$.order.id");
    }
}
