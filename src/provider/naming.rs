//! Generated resource names.

use uuid::Uuid;

/// Prefix used when neither a name nor a prefix is configured.
pub const UNIQUE_ID_PREFIX: &str = "awsform-";

/// Length of the unique suffix appended to prefixes.
pub const UNIQUE_SUFFIX_LEN: usize = 26;

/// Returns `name` when set, else `prefix` (or [`UNIQUE_ID_PREFIX`]) plus a unique suffix.
#[must_use]
pub fn create_name(name: Option<&str>, prefix: Option<&str>) -> String {
    if let Some(name) = name {
        return name.to_string();
    }
    format!("{}{}", prefix.unwrap_or(UNIQUE_ID_PREFIX), unique_suffix())
}

/// Returns true if `name` looks generated from `prefix`.
#[must_use]
pub fn has_generated_suffix(name: &str, prefix: &str) -> bool {
    name.strip_prefix(prefix).is_some_and(|rest| {
        rest.len() == UNIQUE_SUFFIX_LEN && rest.chars().all(|c| c.is_ascii_hexdigit())
    })
}

fn unique_suffix() -> String {
    Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(UNIQUE_SUFFIX_LEN)
        .collect()
}
