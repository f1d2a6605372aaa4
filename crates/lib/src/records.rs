//! Parser for semi-structured data-resolver replies.
//!
//! A data reply is a body of text where each data row is one line starting
//! with a `-` list marker, e.g. `- temp: 28.5, month: Jan`. All other lines
//! (headers, prose) are skipped. Each row becomes one record; values that
//! parse as finite floats are stored numerically, everything else as the
//! trimmed string.

use serde_json::Value;

/// One parsed data row: field name -> numeric or string value, in field order.
pub type DataRecord = serde_json::Map<String, Value>;

/// Parse a resolver reply body into an ordered sequence of records.
///
/// Grammar per line:
/// ```text
/// line  := "-" ws* entry ("," ws* entry)*
/// entry := key ws* ":" ws* value
/// ```
/// Never fails: input with no qualifying lines yields an empty sequence, a
/// marker line with no parseable entries yields an empty record, and
/// duplicate keys within one line are last-write-wins.
pub fn parse(text: &str) -> Vec<DataRecord> {
    let mut records = Vec::new();
    for line in text.lines() {
        let Some(rest) = line.trim_start().strip_prefix('-') else {
            continue;
        };
        let mut record = DataRecord::new();
        for entry in rest.split(',') {
            // An entry without a ':' separator is not a key/value pair; skip it.
            let Some((key, value)) = entry.split_once(':') else {
                continue;
            };
            record.insert(key.trim().to_string(), coerce(value.trim()));
        }
        records.push(record);
    }
    records
}

/// Numeric coercion: finite floats become numbers, everything else stays a string.
fn coerce(raw: &str) -> Value {
    if let Ok(n) = raw.parse::<f64>() {
        if let Some(num) = serde_json::Number::from_f64(n) {
            return Value::Number(num);
        }
    }
    Value::String(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_rows_with_mixed_value_types() {
        let records = parse("- temp: 28.5, month: Jan\n- temp: 29.1, month: Feb");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["temp"], json!(28.5));
        assert_eq!(records[0]["month"], json!("Jan"));
        assert_eq!(records[1]["temp"], json!(29.1));
        assert_eq!(records[1]["month"], json!("Feb"));
    }

    #[test]
    fn empty_input_yields_empty_sequence() {
        assert!(parse("").is_empty());
    }

    #[test]
    fn input_without_marker_lines_yields_empty_sequence() {
        assert!(parse("no dashes here").is_empty());
        assert!(parse("Relevant context (ranked by similarity):\nsome prose").is_empty());
    }

    #[test]
    fn prose_interleaved_with_rows_is_skipped() {
        let records = parse("Monthly averages:\n- temp: 28.5, month: Jan\nEnd of data.");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["month"], json!("Jan"));
    }

    #[test]
    fn marker_line_without_entries_yields_empty_record() {
        let records = parse("- just some words without separators");
        assert_eq!(records.len(), 1);
        assert!(records[0].is_empty());
    }

    #[test]
    fn duplicate_keys_last_write_wins() {
        let records = parse("- temp: 1.0, temp: 2.0");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].len(), 1);
        assert_eq!(records[0]["temp"], json!(2.0));
    }

    #[test]
    fn value_keeps_everything_after_first_colon() {
        let records = parse("- time: 12:30, site: B");
        assert_eq!(records[0]["time"], json!("12:30"));
        assert_eq!(records[0]["site"], json!("B"));
    }

    #[test]
    fn whitespace_is_trimmed_from_keys_and_values() {
        let records = parse("-   depth :  1000 ,  region :  Bay of Bengal ");
        assert_eq!(records[0]["depth"], json!(1000.0));
        assert_eq!(records[0]["region"], json!("Bay of Bengal"));
    }

    #[test]
    fn non_finite_floats_stay_strings() {
        // "NaN" and "inf" parse as f64 but are not representable as JSON numbers.
        let records = parse("- a: NaN, b: inf, c: -3.5");
        assert_eq!(records[0]["a"], json!("NaN"));
        assert_eq!(records[0]["b"], json!("inf"));
        assert_eq!(records[0]["c"], json!(-3.5));
    }

    #[test]
    fn field_sets_may_differ_across_records() {
        let records = parse("- temp: 28.5, month: Jan\n- salinity: 35.1");
        assert_eq!(records.len(), 2);
        assert!(records[0].contains_key("temp"));
        assert!(!records[1].contains_key("temp"));
        assert_eq!(records[1]["salinity"], json!(35.1));
    }

    #[test]
    fn records_serialize_in_field_order() {
        let records = parse("- month: Jan, temp: 28.5");
        let s = serde_json::to_string(&records[0]).expect("serialize record");
        assert_eq!(s, r#"{"month":"Jan","temp":28.5}"#);
    }
}
