//! State model of a single resource instance.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

use super::timeouts::{Operation, TimeoutDefaults};
use crate::error::{AwsformError, ResourceError, Result};

/// Attribute map of a resource.
pub type Attributes = Map<String, Value>;

/// Planned and prior attributes of one resource instance.
///
/// CRUD functions read the planned values, write computed values back, and
/// set or clear the ID. An empty ID after `read` means the resource no
/// longer exists and should be dropped from state.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceData {
    type_name: String,
    id: String,
    attributes: Attributes,
    prior: Option<Attributes>,
    is_new: bool,
    timeouts: TimeoutDefaults,
}

/// Serializable snapshot of a resource after an operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceState {
    /// Resource type name, e.g. `aws_ebs_volume`.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Resource ID; `None` when the resource is gone.
    pub id: Option<String>,
    /// Attribute values.
    pub attributes: Attributes,
    /// Set when creation failed after the resource came into existence.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub tainted: bool,
}

impl ResourceData {
    /// Creates data for a resource about to be created.
    #[must_use]
    pub fn new(type_name: impl Into<String>, attributes: Attributes, timeouts: TimeoutDefaults) -> Self {
        Self {
            type_name: type_name.into(),
            id: String::new(),
            attributes,
            prior: None,
            is_new: false,
            timeouts,
        }
    }

    /// Creates data for an existing resource known only by its ID.
    #[must_use]
    pub fn existing(type_name: impl Into<String>, id: impl Into<String>, timeouts: TimeoutDefaults) -> Self {
        Self {
            type_name: type_name.into(),
            id: id.into(),
            attributes: Attributes::new(),
            prior: None,
            is_new: false,
            timeouts,
        }
    }

    /// Creates data for an update from refreshed `prior` state and `planned` values.
    ///
    /// Attributes absent from `planned` keep their prior value.
    #[must_use]
    pub fn for_update(prior: Self, planned: Attributes) -> Self {
        let mut attributes = prior.attributes.clone();
        attributes.extend(planned);

        Self {
            type_name: prior.type_name,
            id: prior.id,
            attributes,
            prior: Some(prior.attributes),
            is_new: false,
            timeouts: prior.timeouts,
        }
    }

    /// Returns the resource type name.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Returns the ID, or an empty string if unset.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Sets the ID.
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
    }

    /// Clears the ID, marking the resource as gone.
    pub fn clear_id(&mut self) {
        self.id.clear();
    }

    /// Returns true if the resource has no ID.
    #[must_use]
    pub fn is_gone(&self) -> bool {
        self.id.is_empty()
    }

    /// Returns true while the resource is being created.
    #[must_use]
    pub const fn is_new_resource(&self) -> bool {
        self.is_new
    }

    /// Marks the resource as being created.
    pub const fn mark_new_resource(&mut self) {
        self.is_new = true;
    }

    /// Returns the timeout for `operation`.
    #[must_use]
    pub const fn timeout(&self, operation: Operation) -> Duration {
        self.timeouts.get(operation)
    }

    /// Returns the raw value of an attribute.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name).filter(|v| !v.is_null())
    }

    /// Returns a non-empty string attribute.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str).filter(|s| !s.is_empty())
    }

    /// Returns a non-zero integer attribute.
    #[must_use]
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64).filter(|n| *n != 0)
    }

    /// Returns a non-zero integer attribute that fits in 32 bits.
    #[must_use]
    pub fn get_i32(&self, name: &str) -> Option<i32> {
        self.get_i64(name).and_then(|n| i32::try_from(n).ok())
    }

    /// Returns a boolean attribute, `false` when unset.
    #[must_use]
    pub fn get_bool(&self, name: &str) -> bool {
        self.get(name).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Returns a map of strings, e.g. `tags`.
    #[must_use]
    pub fn get_string_map(&self, name: &str) -> BTreeMap<String, String> {
        string_map(self.get(name))
    }

    /// Returns a list of strings.
    #[must_use]
    pub fn get_string_list(&self, name: &str) -> Vec<String> {
        self.get(name)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns a required string attribute.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::MissingAttribute`] if it is unset or empty.
    pub fn require_str(&self, name: &str) -> Result<&str> {
        self.get_str(name)
            .ok_or_else(|| AwsformError::Resource(ResourceError::missing(name)))
    }

    /// Sets an attribute.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        self.attributes.insert(name.to_string(), value.into());
    }

    /// Sets an attribute, or null when `value` is `None`.
    pub fn set_opt<V: Into<Value>>(&mut self, name: &str, value: Option<V>) {
        self.set(name, value.map_or(Value::Null, Into::into));
    }

    /// Sets a map of strings.
    pub fn set_string_map(&mut self, name: &str, map: &BTreeMap<String, String>) {
        let object: Map<String, Value> = map
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        self.set(name, Value::Object(object));
    }

    /// Returns true if `name` differs between prior and planned values.
    ///
    /// Without prior state every set attribute counts as changed.
    #[must_use]
    pub fn has_change(&self, name: &str) -> bool {
        let (old, new) = self.get_change(name);
        old != new
    }

    /// Returns true if any of `names` changed.
    #[must_use]
    pub fn has_changes(&self, names: &[&str]) -> bool {
        names.iter().any(|name| self.has_change(name))
    }

    /// Returns the prior and planned values of `name`.
    #[must_use]
    pub fn get_change(&self, name: &str) -> (Option<&Value>, Option<&Value>) {
        let old = self
            .prior
            .as_ref()
            .and_then(|p| p.get(name))
            .filter(|v| !v.is_null());
        (old, self.get(name))
    }

    /// Returns the prior and planned string maps of `name`.
    #[must_use]
    pub fn get_string_map_change(
        &self,
        name: &str,
    ) -> (BTreeMap<String, String>, BTreeMap<String, String>) {
        let (old, new) = self.get_change(name);
        (string_map(old), string_map(new))
    }

    /// Returns all attributes.
    #[must_use]
    pub const fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Consumes the data and returns its serializable state.
    #[must_use]
    pub fn into_state(self) -> ResourceState {
        ResourceState {
            id: if self.id.is_empty() { None } else { Some(self.id) },
            type_name: self.type_name,
            attributes: self.attributes,
            tainted: false,
        }
    }
}

fn string_map(value: Option<&Value>) -> BTreeMap<String, String> {
    value
        .and_then(Value::as_object)
        .map(|object| {
            object
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

/// Computes the tags to add or update and the keys to remove.
#[must_use]
pub fn diff_tags(
    old: &BTreeMap<String, String>,
    new: &BTreeMap<String, String>,
) -> (BTreeMap<String, String>, Vec<String>) {
    let upsert = new
        .iter()
        .filter(|(k, v)| old.get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let removed = old
        .keys()
        .filter(|k| !new.contains_key(*k))
        .cloned()
        .collect();
    (upsert, removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(value: Value) -> Attributes {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_typed_getters() {
        let data = ResourceData::new(
            "aws_ebs_volume",
            attrs(json!({
                "availability_zone": "us-west-2a",
                "size": 10,
                "encrypted": true,
                "snapshot_id": "",
                "tags": {"Name": "data"}
            })),
            TimeoutDefaults::default(),
        );

        assert_eq!(data.get_str("availability_zone"), Some("us-west-2a"));
        assert_eq!(data.get_i32("size"), Some(10));
        assert!(data.get_bool("encrypted"));
        assert_eq!(data.get_str("snapshot_id"), None);
        assert_eq!(data.get_string_map("tags").get("Name").map(String::as_str), Some("data"));
        assert!(data.require_str("kms_key_id").is_err());
    }

    #[test]
    fn test_changes_against_prior() {
        let mut prior = ResourceData::existing("aws_ebs_volume", "vol-1", TimeoutDefaults::default());
        prior.set("size", 10);
        prior.set("type", "gp2");

        let data = ResourceData::for_update(prior, attrs(json!({"size": 20})));

        assert!(data.has_change("size"));
        assert!(!data.has_change("type"));
        assert!(data.has_changes(&["iops", "size"]));
        assert_eq!(data.get_str("type"), Some("gp2"));
        assert_eq!(data.id(), "vol-1");
    }

    #[test]
    fn test_create_counts_set_attributes_as_changed() {
        let data = ResourceData::new(
            "aws_s3_bucket",
            attrs(json!({"versioning_enabled": true})),
            TimeoutDefaults::default(),
        );

        assert!(data.has_change("versioning_enabled"));
        assert!(!data.has_change("tags"));
    }

    #[test]
    fn test_into_state_drops_empty_id() {
        let mut data = ResourceData::existing("aws_s3_bucket", "b", TimeoutDefaults::default());
        data.clear_id();

        let state = data.into_state();
        assert_eq!(state.id, None);
        assert_eq!(state.type_name, "aws_s3_bucket");
    }

    #[test]
    fn test_diff_tags() {
        let old: BTreeMap<_, _> = [("a", "1"), ("b", "2")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let new: BTreeMap<_, _> = [("a", "1"), ("b", "3"), ("c", "4")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let (upsert, removed) = diff_tags(&old, &new);
        assert_eq!(upsert.len(), 2);
        assert_eq!(upsert.get("b").map(String::as_str), Some("3"));
        assert!(removed.is_empty());

        let (_, removed) = diff_tags(&new, &old);
        assert_eq!(removed, vec![String::from("c")]);
    }
}
