use crate::error::StoreError;

/// Get a required column value from a row, returning CorruptRow on failure.
pub fn get<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    row.get(idx).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: e.to_string(),
    })
}

/// Get an optional column value.
pub fn get_opt<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<Option<T>, StoreError> {
    row.get(idx).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: e.to_string(),
    })
}

/// Parse a string into an enum, returning CorruptRow on failure.
pub fn parse_enum<T: std::str::FromStr>(
    raw: &str,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    raw.parse().map_err(|_| StoreError::CorruptRow {
        table,
        column,
        detail: format!("unknown variant: {raw}"),
    })
}

/// Parse a JSON string-list column (tags, permissions).
pub fn parse_string_list(
    raw: &str,
    table: &'static str,
    column: &'static str,
) -> Result<Vec<String>, StoreError> {
    forge_core::tags::decode(raw).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: format!("invalid JSON list: {e}"),
    })
}

/// Escape LIKE special characters for safe pattern matching.
pub fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
