//! Inventory records and their stats.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::InventoryError;

/// A stat value as rendered by the inventory: text or a count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum StatValue {
    Text(String),
    Count(u64),
}

impl std::fmt::Display for StatValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Count(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for StatValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for StatValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<u64> for StatValue {
    fn from(n: u64) -> Self {
        Self::Count(n)
    }
}

impl From<usize> for StatValue {
    fn from(n: usize) -> Self {
        Self::Count(n as u64)
    }
}

/// Stats keyed by the inventory's field names (`name_value`, `cidr_value`,
/// `network_ports_num`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Stats(BTreeMap<String, StatValue>);

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a stat, builder style.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<StatValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<StatValue>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&StatValue> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StatValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// One stat that did not match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatMismatch {
    pub key: String,
    pub expected: StatValue,
    /// `None` when the record does not carry the stat at all.
    pub actual: Option<StatValue>,
}

impl std::fmt::Display for StatMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.actual {
            Some(actual) => write!(f, "{}: expected {}, got {}", self.key, self.expected, actual),
            None => write!(f, "{}: expected {}, missing", self.key, self.expected),
        }
    }
}

/// A record in the product's inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InventoryRecord {
    /// Collection the record lives in (e.g. `nuage_network_subnets`).
    pub collection: String,

    /// Provider-side id of the source object.
    pub ems_ref: String,

    /// Name of the owning provider.
    pub provider: String,

    /// Display name.
    pub name: String,

    /// Rendered stats.
    pub stats: Stats,
}

impl InventoryRecord {
    /// Compare against `expected`; every expected key must be present and
    /// equal. Stats the record has beyond `expected` are ignored.
    pub fn validate_stats(&self, expected: &Stats) -> Result<(), InventoryError> {
        let mismatches: Vec<StatMismatch> = expected
            .iter()
            .filter_map(|(key, want)| {
                let got = self.stats.get(key);
                (got != Some(want)).then(|| StatMismatch {
                    key: key.to_string(),
                    expected: want.clone(),
                    actual: got.cloned(),
                })
            })
            .collect();

        if mismatches.is_empty() {
            Ok(())
        } else {
            Err(InventoryError::StatsMismatch {
                collection: self.collection.clone(),
                ems_ref: self.ems_ref.clone(),
                mismatches,
            })
        }
    }
}
