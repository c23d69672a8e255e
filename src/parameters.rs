//! Named scalar parameters.
//!
//! Injection values, sampled points and fixed values all travel through the
//! crate as a [`Parameters`] map from parameter name to value.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PeError, Result};

/// An ordered map from parameter name to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parameters {
    #[serde(with = "crate::nonfinite::map")]
    values: BTreeMap<String, f64>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }

    /// Look up a key that must be present.
    pub fn require_value(&self, key: &str) -> Result<f64> {
        self.get(key)
            .ok_or_else(|| PeError::MissingParameter(key.to_string()))
    }

    pub fn insert(&mut self, key: impl Into<String>, value: f64) -> Option<f64> {
        self.values.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<f64> {
        self.values.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, &v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Check that every key in `required` is present.
    ///
    /// Reports the first missing key in the order given.
    pub fn require<S: AsRef<str>>(&self, required: &[S]) -> Result<()> {
        match required.iter().find(|key| !self.contains_key(key.as_ref())) {
            Some(key) => Err(PeError::MissingParameter(key.as_ref().to_string())),
            None => Ok(()),
        }
    }

    /// Insert every value of `other`, overwriting existing keys.
    pub fn extend_from(&mut self, other: &Parameters) {
        for (k, v) in other.iter() {
            self.insert(k, v);
        }
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for Parameters {
    fn from_iter<T: IntoIterator<Item = (K, f64)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl<K: Into<String>, const N: usize> From<[(K, f64); N]> for Parameters {
    fn from(value: [(K, f64); N]) -> Self {
        value.into_iter().collect()
    }
}

impl fmt::Display for Parameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body = self
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "{{{body}}}")
    }
}
