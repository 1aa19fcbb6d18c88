//! In-process guest, appliance and provider.
//!
//! The three share guest state: a [`MockGuest`] changed over its shell is
//! what the next [`MockAppliance`] scan sees, and a VM created by a
//! [`MockProvider`] is reachable through a [`GuestConnector`].

mod appliance;
mod guest;
mod provider;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use appliance::MockAppliance;
pub use guest::{GuestShell, GuestState, MockGuest};
pub use provider::{GuestConnector, MockProvider};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
