//! Tag-sets and permission-sets travel as JSON arrays of short strings.
//! Insertion order is preserved for display; uniqueness is not enforced.

/// Encode a string list for storage in a TEXT column.
pub fn encode(items: &[String]) -> Result<String, serde_json::Error> {
    serde_json::to_string(items)
}

/// Decode a stored string list.
pub fn decode(raw: &str) -> Result<Vec<String>, serde_json::Error> {
    serde_json::from_str(raw)
}
