//! Field access over unstructured objects.
//!
//! Analyses read `spec`/`status` subtrees either through these path helpers or by deserializing
//! the subtree into a local serde view with [`ObjectExt::spec_as`].

use kube::api::DynamicObject;
use kube::ResourceExt;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;

/// Walk `keys` into a JSON value.
pub fn path<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().try_fold(value, |current, key| current.get(*key))
}

pub fn str_at<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    path(value, keys).and_then(Value::as_str)
}

pub fn array_at<'a>(value: &'a Value, keys: &[&str]) -> &'a [Value] {
    path(value, keys).and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[])
}

pub fn i64_at(value: &Value, keys: &[&str]) -> Option<i64> {
    path(value, keys).and_then(Value::as_i64)
}

/// A `map[string]string` at `keys`; non-string values are skipped.
pub fn string_map_at(value: &Value, keys: &[&str]) -> BTreeMap<String, String> {
    path(value, keys)
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

/// A status condition as published by most controllers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub type_: String,
    pub status: String,
    pub reason: Option<String>,
    pub message: Option<String>,
}

impl Condition {
    pub fn is_false(&self) -> bool {
        self.status.eq_ignore_ascii_case("false")
    }
}

/// Parse a `conditions` array.
pub fn conditions(list: &[Value]) -> Vec<Condition> {
    list.iter()
        .filter_map(|c| {
            Some(Condition {
                type_: c.get("type")?.as_str()?.to_string(),
                status: c.get("status").and_then(Value::as_str).unwrap_or("Unknown").to_string(),
                reason: c.get("reason").and_then(Value::as_str).map(str::to_string),
                message: c.get("message").and_then(Value::as_str).map(str::to_string),
            })
        })
        .collect()
}

/// Convenience accessors on dynamic objects.
pub trait ObjectExt {
    fn spec(&self) -> &Value;
    fn status(&self) -> &Value;
    fn namespace_or_default(&self) -> String;
    fn labels_map(&self) -> BTreeMap<String, String>;
    fn annotation(&self, key: &str) -> Option<&str>;
    fn spec_as<T: DeserializeOwned + Default>(&self) -> T;
    fn status_conditions(&self) -> Vec<Condition>;
}

static NULL: Value = Value::Null;

impl ObjectExt for DynamicObject {
    fn spec(&self) -> &Value {
        self.data.get("spec").unwrap_or(&NULL)
    }

    fn status(&self) -> &Value {
        self.data.get("status").unwrap_or(&NULL)
    }

    fn namespace_or_default(&self) -> String {
        self.namespace().unwrap_or_else(|| "default".to_string())
    }

    fn labels_map(&self) -> BTreeMap<String, String> {
        self.labels().clone()
    }

    fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata.annotations.as_ref().and_then(|a| a.get(key)).map(String::as_str)
    }

    /// Deserialize `spec` into a view type; a malformed or absent spec yields the default view so
    /// one bad object never aborts an analysis.
    fn spec_as<T: DeserializeOwned + Default>(&self) -> T {
        match self.data.get("spec") {
            Some(spec) => serde_json::from_value(spec.clone()).unwrap_or_else(|e| {
                tracing::debug!(
                    name = %self.name_any(),
                    error = %e,
                    "Spec did not match the expected shape; using defaults"
                );
                T::default()
            }),
            None => T::default(),
        }
    }

    fn status_conditions(&self) -> Vec<Condition> {
        conditions(array_at(self.status(), &["conditions"]))
    }
}

/// `namespace/name` for messages.
pub fn qualified_name(obj: &DynamicObject) -> String {
    match obj.namespace() {
        Some(ns) => format!("{}/{}", ns, obj.name_any()),
        None => obj.name_any(),
    }
}
