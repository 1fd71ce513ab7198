//! Parameter schema inference from pipe-delimited parameter tables.

use std::{error::Error, fmt};

use toolsmith_store::models::{InputSchema, ParamType, PropertySchema};

const HEADER_NAMES: &[&str] = &["名称", "name", "参数", "parameter", "参数名"];
const EMPTY_MARKERS: &[&str] = &["-", "无", "none", "n/a", "null"];

/// Returned when parameter text is present but no row could be read from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDegraded {
    pub text: String,
}

impl fmt::Display for SchemaDegraded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let preview: String = self.text.chars().take(60).collect();
        write!(f, "no parameter rows found in {preview:?}")
    }
}

impl Error for SchemaDegraded {}

/// Infers an input schema, reporting text that could not be read.
///
/// # Errors
/// Returns `SchemaDegraded` when the text is non-empty but has no table rows.
pub fn try_infer_schema(input_params: Option<&str>) -> Result<InputSchema, SchemaDegraded> {
    let mut schema = InputSchema::default();
    let text = input_params.map(str::trim).unwrap_or_default();
    if text.is_empty() || is_empty_marker(text) {
        return Ok(schema);
    }

    let mut saw_table = false;
    for line in text.lines() {
        let Some(cells) = split_row(line) else {
            continue;
        };
        saw_table = true;
        if cells.len() < 3 {
            continue;
        }
        let name = cells[0].trim_matches('`').trim();
        if name.is_empty()
            || is_empty_marker(name)
            || is_separator(&cells)
            || HEADER_NAMES.iter().any(|header| header.eq_ignore_ascii_case(name))
        {
            continue;
        }
        if schema.properties.contains_key(name) {
            continue;
        }

        let description = cells[2..].join(" | ");
        if is_required(&description) {
            schema.required.push(name.to_string());
        }
        schema.properties.insert(
            name.to_string(),
            PropertySchema {
                kind: map_type(cells[1]),
                description,
            },
        );
    }

    if saw_table {
        Ok(schema)
    } else {
        Err(SchemaDegraded {
            text: text.to_string(),
        })
    }
}

/// Infers an input schema. Degraded or missing text yields the empty schema.
#[must_use]
pub fn infer_schema(input_params: Option<&str>) -> InputSchema {
    try_infer_schema(input_params).unwrap_or_default()
}

/// Maps a declared type to a JSON type by substring, most specific first.
#[must_use]
pub fn map_type(declared: &str) -> ParamType {
    let declared = declared.to_lowercase();
    if declared.contains("int") || declared.contains("long") {
        ParamType::Integer
    } else if ["float", "double", "decimal", "number"]
        .iter()
        .any(|token| declared.contains(token))
    {
        ParamType::Number
    } else if declared.contains("bool") {
        ParamType::Boolean
    } else {
        ParamType::String
    }
}

fn is_required(description: &str) -> bool {
    let lowered = description.to_lowercase();
    let negated = lowered.contains("非必填")
        || lowered.contains("not required")
        || lowered.contains("optional");
    !negated && (lowered.contains("必填") || lowered.contains("required"))
}

fn split_row(line: &str) -> Option<Vec<&str>> {
    let line = line.trim();
    if !line.contains('|') {
        return None;
    }
    let inner = line.strip_prefix('|').unwrap_or(line);
    let inner = inner.strip_suffix('|').unwrap_or(inner);
    Some(inner.split('|').map(str::trim).collect())
}

fn is_separator(cells: &[&str]) -> bool {
    cells
        .iter()
        .all(|cell| !cell.is_empty() && cell.chars().all(|ch| matches!(ch, '-' | ':' | ' ')))
}

fn is_empty_marker(text: &str) -> bool {
    EMPTY_MARKERS
        .iter()
        .any(|marker| marker.eq_ignore_ascii_case(text.trim()))
}
