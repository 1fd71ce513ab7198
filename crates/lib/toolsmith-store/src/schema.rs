pub const TABLE_INTERFACE: &str = "interface_record";
pub const TABLE_TOOL: &str = "tool_descriptor";

pub const DEFAULT_STALENESS_MINUTES: u64 = 30;
pub const DEFAULT_MAX_RECORDS: usize = 10;
pub const DEFAULT_MODULE_EXTENSION: &str = "py";

/// Derives the tool name shared by the interface record, the registry row,
/// and the generated module file.
///
/// Lower-cases the trimmed name and replaces every non-word character with
/// `_`. Returns `None` when nothing is left. Applying it twice yields the
/// same key.
#[must_use]
pub fn make_tool_name(interface_name: &str) -> Option<String> {
    let trimmed = interface_name.trim();
    if trimmed.is_empty() {
        return None;
    }
    let name: String = trimmed
        .to_lowercase()
        .chars()
        .map(|ch| if ch.is_alphanumeric() || ch == '_' { ch } else { '_' })
        .collect();
    Some(name)
}

/// File name of a generated module for a tool name.
#[must_use]
pub fn module_file_name(tool_name: &str, extension: &str) -> String {
    let extension = extension.trim_start_matches('.');
    if extension.is_empty() {
        tool_name.to_string()
    } else {
        format!("{tool_name}.{extension}")
    }
}
