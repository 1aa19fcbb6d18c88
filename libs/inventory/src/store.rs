//! Inventory access.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use crate::InventoryRecord;

/// The product's inventory, as seen by a verification run.
///
/// Lookups are pure reads. Refresh asks the product to re-sync a provider;
/// the effect shows up in later lookups, not synchronously.
#[async_trait]
pub trait Inventory: Send + Sync {
    /// Find the record of `collection` that mirrors provider object `ems_ref`.
    async fn find_by_ems_ref(
        &self,
        collection: &str,
        ems_ref: &str,
        provider: &str,
    ) -> Result<Option<InventoryRecord>>;

    /// Ask the product to refresh everything it knows about `provider`.
    async fn refresh_provider_relationships(&self, provider: &str) -> Result<()>;
}

type Key = (String, String, String);

#[derive(Debug)]
struct Staged {
    record: InventoryRecord,
    /// Lookups that still return nothing after a refresh.
    lookups_until_visible: u32,
}

#[derive(Debug, Default)]
struct State {
    visible: HashMap<Key, InventoryRecord>,
    /// Exists on the provider, not yet synced.
    pending: HashMap<Key, Staged>,
    /// Refreshed, waiting out its sync lag.
    syncing: HashMap<Key, Staged>,
    lookups: u64,
    refreshes: u64,
}

/// In-memory inventory with a simulated sync lag.
///
/// Staged records only start syncing once their provider is refreshed, and
/// then stay invisible for a configured number of lookups.
#[derive(Debug, Default)]
pub struct InMemoryInventory {
    state: Mutex<State>,
}

impl InMemoryInventory {
    /// Create an empty inventory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record that is visible immediately.
    pub fn insert(&self, record: InventoryRecord) {
        let mut state = self.lock();
        state.visible.insert(key_of(&record), record);
    }

    /// Add a provider-side object that becomes visible after a refresh
    /// followed by `lookups_until_visible` empty lookups.
    pub fn stage(&self, record: InventoryRecord, lookups_until_visible: u32) {
        let mut state = self.lock();
        state.pending.insert(
            key_of(&record),
            Staged {
                record,
                lookups_until_visible,
            },
        );
    }

    /// Lookups served so far.
    pub fn lookups(&self) -> u64 {
        self.lock().lookups
    }

    /// Refreshes requested so far.
    pub fn refreshes(&self) -> u64 {
        self.lock().refreshes
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn key_of(record: &InventoryRecord) -> Key {
    (
        record.collection.clone(),
        record.ems_ref.clone(),
        record.provider.clone(),
    )
}

#[async_trait]
impl Inventory for InMemoryInventory {
    async fn find_by_ems_ref(
        &self,
        collection: &str,
        ems_ref: &str,
        provider: &str,
    ) -> Result<Option<InventoryRecord>> {
        let mut state = self.lock();
        state.lookups += 1;
        let key = (
            collection.to_string(),
            ems_ref.to_string(),
            provider.to_string(),
        );

        if let Some(record) = state.visible.get(&key) {
            return Ok(Some(record.clone()));
        }

        let Some(staged) = state.syncing.get_mut(&key) else {
            return Ok(None);
        };
        if staged.lookups_until_visible > 0 {
            staged.lookups_until_visible -= 1;
            return Ok(None);
        }

        if let Some(staged) = state.syncing.remove(&key) {
            debug!(collection, ems_ref, "[MOCK] Record synced into inventory");
            state.visible.insert(key, staged.record.clone());
            return Ok(Some(staged.record));
        }
        Ok(None)
    }

    async fn refresh_provider_relationships(&self, provider: &str) -> Result<()> {
        let mut state = self.lock();
        state.refreshes += 1;

        let keys: Vec<Key> = state
            .pending
            .keys()
            .filter(|(_, _, p)| p == provider)
            .cloned()
            .collect();
        debug!(provider, staged = keys.len(), "[MOCK] Refreshing provider relationships");
        for key in keys {
            if let Some(staged) = state.pending.remove(&key) {
                state.syncing.insert(key, staged);
            }
        }
        Ok(())
    }
}
