//! SQL text for the warehouse conveniences.

use desk_core::RawRecord;
use serde_json::Value;

pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub fn vector_search_sql(index: &str, embedding: &[f32], limit: usize) -> String {
    let vector = embedding
        .iter()
        .map(|component| component.to_string())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "SELECT * FROM vector_search(index => {}, query_vector => array({}), num_results => {})",
        quote_literal(index),
        vector,
        limit.max(1)
    )
}

pub fn select_by_ids_sql(table: &str, id_column: &str, ids: &[String]) -> String {
    let list = ids
        .iter()
        .map(|id| quote_literal(id))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "SELECT * FROM {table} WHERE {id_column} IN ({list}) LIMIT {}",
        ids.len().max(1)
    )
}

/// First present, non-null value among `keys`, rendered as text.
pub fn text_field(row: &RawRecord, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match row.get(*key)? {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    })
}

/// Warehouse rows carry numbers either natively or as strings.
pub fn number_field(row: &RawRecord, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| match row.get(*key)? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    })
}
