//! Class label vocabulary
//!
//! Maps the label keys stored in ledgers to the integer ids written into
//! `Y.npy`. Id 0 is the negative class: bundling keeps it as 0 and turns
//! every other id into 1.

use std::collections::BTreeMap;

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassVocabulary {
    default_key: String,
    ids: BTreeMap<String, i64>,
}

impl ClassVocabulary {
    /// Build a vocabulary; the default key must be one of the entries.
    pub fn new(default_key: impl Into<String>, ids: BTreeMap<String, i64>) -> Result<Self> {
        let default_key = default_key.into();
        if !ids.contains_key(&default_key) {
            return Err(StoreError::UnknownClass { key: default_key });
        }
        Ok(Self { default_key, ids })
    }

    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        Self::new(config.default_class.clone(), config.classes.clone())
    }

    /// Label given to files added without a class.
    pub fn default_key(&self) -> &str {
        &self.default_key
    }

    pub fn contains(&self, key: &str) -> bool {
        self.ids.contains_key(key)
    }

    pub fn id(&self, key: &str) -> Result<i64> {
        self.ids
            .get(key)
            .copied()
            .ok_or_else(|| StoreError::UnknownClass {
                key: key.to_string(),
            })
    }

    /// Resolve labels to ids, collapsing to 0/1 when `bundled`.
    pub fn label_ids<S: AsRef<str>>(&self, keys: &[S], bundled: bool) -> Result<Vec<i64>> {
        keys.iter()
            .map(|key| self.id(key.as_ref()).map(|id| bundle_id(id, bundled)))
            .collect()
    }
}

/// Nonzero ids become 1 when bundling; 0 stays 0.
pub fn bundle_id(id: i64, bundled: bool) -> i64 {
    if bundled {
        i64::from(id != 0)
    } else {
        id
    }
}
