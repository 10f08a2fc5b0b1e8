// Copyright 2020 Joyent, Inc.

use std::collections::BTreeMap;
use std::fmt;

use serde_derive::{Deserialize, Serialize};

use crate::error::Error;

// Attribute names that are never echoed back by the `Debug` implementation.
const REDACTED_KEYS: [&str; 2] = ["password", "secret"];

/// The configuration a pooled data source is created from.
///
/// A `PoolProperties` is an immutable bag of connection attributes (endpoint
/// URL or host, port and database, credentials, pool sizing and timeouts)
/// together with the name of the pool implementation. Two instances are equal
/// when the pool implementation and every attribute are equal; attribute
/// insertion order does not matter.
#[derive(Clone, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolProperties {
    pool_class_name: String,
    #[serde(default)]
    props: BTreeMap<String, String>,
}

impl PoolProperties {
    /// Return a new instance of `PoolProperties` for the given pool
    /// implementation with no attributes.
    pub fn new<S: Into<String>>(pool_class_name: S) -> Self {
        PoolProperties {
            pool_class_name: pool_class_name.into(),
            props: BTreeMap::new(),
        }
    }

    /// Return a copy of these properties with one attribute set.
    pub fn with<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: ToString,
    {
        self.props.insert(key.into(), value.to_string());
        self
    }

    pub fn pool_class_name(&self) -> &str {
        &self.pool_class_name
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.props.get(key).map(String::as_str)
    }

    /// Look up the first of `keys` that carries a non-empty value.
    pub fn get_any(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .filter_map(|k| self.get(k))
            .find(|v| !v.trim().is_empty())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.props.iter()
    }

    pub fn len(&self) -> usize {
        self.props.len()
    }

    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }

    /// Decode properties from a JSON document. `key` names the document in
    /// the returned error.
    pub fn from_json(key: &str, json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).map_err(|source| {
            Error::InvalidPoolProperties {
                key: key.to_string(),
                source,
            }
        })
    }

    pub fn to_json(&self) -> String {
        // A struct of strings always serializes
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl fmt::Debug for PoolProperties {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let props: BTreeMap<&str, &str> = self
            .props
            .iter()
            .map(|(k, v)| {
                let lower = k.to_lowercase();
                if REDACTED_KEYS.iter().any(|r| lower.contains(r)) {
                    (k.as_str(), "******")
                } else {
                    (k.as_str(), v.as_str())
                }
            })
            .collect();
        f.debug_struct("PoolProperties")
            .field("pool_class_name", &self.pool_class_name)
            .field("props", &props)
            .finish()
    }
}
