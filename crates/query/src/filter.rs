//! Clause and payload parsing.
//!
//! Filters are plain equality maps: a comma-separated list of field names
//! zipped with the positional arguments given alongside it.

use docket_driver::{Filter, Record, Value};

/// Zip a filter clause with its positional arguments.
///
/// A clause without commas names a single field and needs exactly one
/// argument. A clause with commas needs exactly as many arguments as it has
/// fields. Anything else yields no filter at all; the read then returns
/// every row rather than failing.
///
/// The clause is taken literally apart from trimming each field name, so
/// `"a = ?"` is a field called `a = ?`.
pub fn parse_filter(clause: &str, args: &[Value]) -> Option<Filter> {
    if clause.trim().is_empty() {
        return None;
    }
    let fields: Vec<&str> = if clause.contains(',') { clause.split(',').collect() } else { vec![clause] };
    if fields.len() != args.len() {
        tracing::trace!(clause, args = args.len(), "Filter arguments do not match clause; ignoring filter");
        return None;
    }
    let filter: Filter = fields.into_iter().map(str::trim).map(str::to_string).zip(args.iter().cloned()).collect();
    (!filter.is_empty()).then_some(filter)
}

/// Zip an insert field list with its values. Counts must match exactly.
pub fn zip_fields(fields: &str, values: Vec<Value>) -> Result<Record, String> {
    let names: Vec<&str> = fields.split(',').map(str::trim).collect();
    if names.iter().any(|name| name.is_empty()) {
        return Err(format!("empty field name in \"{fields}\""));
    }
    if names.len() != values.len() {
        return Err(format!("{} field(s) in \"{fields}\" but {} value(s)", names.len(), values.len()));
    }
    Ok(names.into_iter().map(str::to_string).zip(values).collect())
}

/// Parse a `set` payload of comma-separated `field=value` entries.
///
/// Each entry splits on its first `=` only, so values may contain `=`.
/// Values are stored as strings. Blank entries are skipped.
pub fn parse_assignments(payload: &str) -> Result<Record, String> {
    let mut record = Record::new();
    for entry in payload.split(',').filter(|entry| !entry.trim().is_empty()) {
        let Some((field, value)) = entry.split_once('=') else {
            return Err(format!("expected field=value, got \"{}\"", entry.trim()));
        };
        let field = field.trim();
        if field.is_empty() {
            return Err(format!("missing field name in \"{}\"", entry.trim()));
        }
        record.insert(field.to_string(), Value::String(value.trim().to_string()));
    }
    if record.is_empty() {
        return Err("nothing to set".to_string());
    }
    Ok(record)
}

/// Single-row reads take a bare field list; drop an `ORDER BY` keyword if
/// the ordering carries one.
pub fn strip_order_prefix(order_by: &str) -> &str {
    let trimmed = order_by.trim_start();
    trimmed.strip_prefix("ORDER BY").map_or(trimmed, str::trim_start).trim_end()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn filter(pairs: &[(&str, Value)]) -> Option<Filter> {
        Some(pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect())
    }

    #[rstest]
    #[case("a,b", vec![json!(1), json!(2)], filter(&[("a", json!(1)), ("b", json!(2))]))]
    #[case("a = ?", vec![json!(5)], filter(&[("a = ?", json!(5))]))]
    #[case("a,b", vec![json!(1)], None)]
    #[case("a, b ,c", vec![json!(1), json!("x"), json!(true)], filter(&[("a", json!(1)), ("b", json!("x")), ("c", json!(true))]))]
    #[case(" id ", vec![json!(7)], filter(&[("id", json!(7))]))]
    #[case("id", vec![], None)]
    #[case("id", vec![json!(1), json!(2)], None)]
    #[case("", vec![json!(1)], None)]
    #[case("a,b", vec![json!(1), json!(2), json!(3)], None)]
    fn test_parse_filter(#[case] clause: &str, #[case] args: Vec<Value>, #[case] expected: Option<Filter>) {
        assert_eq!(parse_filter(clause, &args), expected);
    }

    #[test]
    fn test_zip_fields() {
        let record = zip_fields("id, name", vec![json!(2), json!("y")]).unwrap();
        assert_eq!(Value::Object(record), json!({"id": 2, "name": "y"}));
    }

    #[rstest]
    #[case("id,name", vec![json!(1)])]
    #[case("id", vec![json!(1), json!(2)])]
    #[case("id,,name", vec![json!(1), json!(2), json!(3)])]
    fn test_zip_fields_rejects(#[case] fields: &str, #[case] values: Vec<Value>) {
        assert!(zip_fields(fields, values).is_err());
    }

    #[rstest]
    #[case("name=bob", json!({"name": "bob"}))]
    #[case("name = bob, email=b@x.io", json!({"name": "bob", "email": "b@x.io"}))]
    #[case("query=a=b", json!({"query": "a=b"}))]
    #[case("name=bob,", json!({"name": "bob"}))]
    #[case("note=", json!({"note": ""}))]
    fn test_parse_assignments(#[case] payload: &str, #[case] expected: Value) {
        assert_eq!(Value::Object(parse_assignments(payload).unwrap()), expected);
    }

    #[rstest]
    #[case("name")]
    #[case("=bob")]
    #[case("")]
    #[case(" , ")]
    fn test_parse_assignments_rejects(#[case] payload: &str) {
        assert!(parse_assignments(payload).is_err());
    }

    #[rstest]
    #[case("ORDER BY -id", "-id")]
    #[case("  ORDER BY name,-id ", "name,-id")]
    #[case("-id", "-id")]
    #[case("", "")]
    fn test_strip_order_prefix(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(strip_order_prefix(input), expected);
    }
}
