//! INSERT statement rendering.

use chrono::SecondsFormat;
use tracing::warn;

use crate::core::{quote_ident, Record, SqlValue};

/// Render one `INSERT INTO ... VALUES (...);` line per record, in order.
///
/// Never fails: values that cannot be rendered precisely fall back to quoted
/// text and are logged.
pub fn generate_insert_statements(records: &[Record]) -> String {
    let mut out = String::new();
    for record in records {
        let columns: Vec<String> = record.columns.iter().map(|c| quote_ident(&c.name)).collect();
        let values: Vec<String> = record.values.iter().map(sql_value_to_literal).collect();
        out.push_str(&format!(
            "INSERT INTO {} ({}) VALUES ({});\n",
            record.table.qualified_name(),
            columns.join(", "),
            values.join(", ")
        ));
    }
    out
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn float_literal(text: String, is_nan: bool, is_infinite: bool) -> String {
    if is_nan || is_infinite {
        // "NaN", "inf", "-inf"
        let word = match text.as_str() {
            "inf" => "Infinity",
            "-inf" => "-Infinity",
            _ => "NaN",
        };
        quote(word)
    } else {
        text
    }
}

/// SQL literal for a single value.
pub fn sql_value_to_literal(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => "NULL".to_string(),
        SqlValue::Bool(b) => b.to_string(),
        SqlValue::I16(v) => v.to_string(),
        SqlValue::I32(v) => v.to_string(),
        SqlValue::I64(v) => v.to_string(),
        SqlValue::F32(v) => float_literal(v.to_string(), v.is_nan(), v.is_infinite()),
        SqlValue::F64(v) => float_literal(v.to_string(), v.is_nan(), v.is_infinite()),
        SqlValue::Decimal(d) => d.normalize().to_string(),
        SqlValue::Text(s) => quote(s),
        SqlValue::Bytes(b) => format!("'\\x{}'", hex::encode(b)),
        SqlValue::Uuid(u) => quote(&u.hyphenated().to_string()),
        SqlValue::Date(d) => quote(&d.format("%Y-%m-%d").to_string()),
        SqlValue::Time(t) => quote(&t.format("%H:%M:%S").to_string()),
        SqlValue::DateTime(t) => quote(&t.and_utc().to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        SqlValue::DateTimeOffset(t) => quote(&t.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        SqlValue::Json(j) => match serde_json::to_string(j) {
            Ok(text) => quote(&text),
            Err(e) => {
                warn!("failed to serialize JSON value, falling back to debug text: {}", e);
                quote(&format!("{:?}", j))
            }
        },
        SqlValue::Unknown(s) => {
            warn!("rendering value of unrecognised type as text: {}", s);
            quote(s)
        }
    }
}
