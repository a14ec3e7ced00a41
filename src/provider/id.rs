//! Composite resource IDs.
//!
//! Resources identified by several values store them joined by a separator,
//! e.g. `my-cluster:vpc-cni` for an EKS addon.

use crate::error::{AwsformError, ResourceError, Result};

/// Default separator for composite IDs.
pub const RESOURCE_ID_SEPARATOR: &str = ",";

/// Joins `parts` into an ID using the default separator.
///
/// # Errors
///
/// Returns an error if the number of parts differs from `count`, or if a part
/// is empty and `allow_empty` is false.
pub fn flatten_resource_id(parts: &[&str], count: usize, allow_empty: bool) -> Result<String> {
    flatten_resource_id_with_separator(parts, count, allow_empty, RESOURCE_ID_SEPARATOR)
}

/// Splits `id` into its parts using the default separator.
///
/// # Errors
///
/// Returns an error if the ID does not have exactly `count` parts, or if a
/// part is empty and `allow_empty` is false.
pub fn expand_resource_id(id: &str, count: usize, allow_empty: bool) -> Result<Vec<String>> {
    expand_resource_id_with_separator(id, count, allow_empty, RESOURCE_ID_SEPARATOR)
}

/// Joins `parts` into an ID using `separator`.
///
/// # Errors
///
/// See [`flatten_resource_id`].
pub fn flatten_resource_id_with_separator(
    parts: &[&str],
    count: usize,
    allow_empty: bool,
    separator: &str,
) -> Result<String> {
    if parts.len() != count {
        return Err(AwsformError::Resource(ResourceError::InvalidIdParts(format!(
            "unexpected number of ID parts ({}), expected {count}",
            parts.len()
        ))));
    }

    if !allow_empty {
        if let Some(index) = parts.iter().position(|p| p.is_empty()) {
            return Err(AwsformError::Resource(ResourceError::InvalidIdParts(format!(
                "empty ID part: {index}"
            ))));
        }
    }

    Ok(parts.join(separator))
}

/// Splits `id` into its parts using `separator`.
///
/// # Errors
///
/// See [`expand_resource_id`].
pub fn expand_resource_id_with_separator(
    id: &str,
    count: usize,
    allow_empty: bool,
    separator: &str,
) -> Result<Vec<String>> {
    let parts: Vec<String> = id.split(separator).map(ToString::to_string).collect();

    if parts.len() != count {
        return Err(AwsformError::Resource(ResourceError::InvalidId {
            id: id.to_string(),
            expected: format!("expected {count} parts separated by ({separator})"),
        }));
    }

    if !allow_empty && parts.iter().any(String::is_empty) {
        return Err(AwsformError::Resource(ResourceError::InvalidId {
            id: id.to_string(),
            expected: format!("expected {count} non-empty parts separated by ({separator})"),
        }));
    }

    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten() {
        let id = flatten_resource_id(&["a", "b", "c"], 3, false).unwrap_or_default();
        assert_eq!(id, "a,b,c");
    }

    #[test]
    fn test_flatten_wrong_count() {
        let err = flatten_resource_id(&["a", "b"], 3, false).err();
        assert_eq!(
            err.map(|e| e.to_string()).as_deref(),
            Some("unexpected number of ID parts (2), expected 3")
        );
    }

    #[test]
    fn test_flatten_empty_part() {
        let err = flatten_resource_id(&["a", ""], 2, false).err();
        assert_eq!(err.map(|e| e.to_string()).as_deref(), Some("empty ID part: 1"));
        assert_eq!(
            flatten_resource_id(&["a", ""], 2, true).ok().as_deref(),
            Some("a,")
        );
    }

    #[test]
    fn test_expand() {
        let parts = expand_resource_id("a,b", 2, false).unwrap_or_default();
        assert_eq!(parts, vec!["a", "b"]);
    }

    #[test]
    fn test_expand_error_message() {
        let err = expand_resource_id("a,b,c", 2, false).err();
        assert_eq!(
            err.map(|e| e.to_string()).as_deref(),
            Some("unexpected format for ID (a,b,c), expected 2 parts separated by (,)")
        );
    }

    #[test]
    fn test_expand_custom_separator() {
        let parts = expand_resource_id_with_separator("cluster:vpc-cni", 2, false, ":")
            .unwrap_or_default();
        assert_eq!(parts, vec!["cluster", "vpc-cni"]);

        assert!(expand_resource_id_with_separator("cluster:", 2, false, ":").is_err());
        assert!(expand_resource_id_with_separator("cluster:", 2, true, ":").is_ok());
    }
}
