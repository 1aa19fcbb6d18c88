//! Inventory lookups and validation.
//!
//! The product mirrors provider-side objects into its own inventory
//! asynchronously: after a provider refresh, a subnet or port created
//! directly on the provider shows up in the inventory some seconds later,
//! keyed by the provider's id for it (its `ems_ref`).
//!
//! This crate provides:
//! - [`Inventory`]: the find-by-ems_ref and refresh calls, with an
//!   in-memory implementation for tests.
//! - [`object_in_inventory_with_timeout`]: wait for a record to appear.
//! - [`InventoryRecord::validate_stats`]: compare a record against the
//!   values expected from the provider side.
//! - [`sdn`]: the SDN sandbox model and the expected stats for its subnet
//!   and VM port.

mod error;
mod lookup;
mod record;
mod store;

pub mod sdn;

pub use error::InventoryError;
pub use lookup::{object_in_inventory_with_timeout, LookupConfig};
pub use record::{InventoryRecord, StatMismatch, StatValue, Stats};
pub use store::{InMemoryInventory, Inventory};
