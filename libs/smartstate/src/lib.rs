//! SmartState Analysis verification.
//!
//! SmartState Analysis (SSA) is the product's agentless scan of a VM or
//! template: it reads the guest's filesystem and configuration and records
//! users, groups, packages, services, files, and a drift history between
//! scans. Verifying it means collecting the same facts independently, over a
//! remote shell on the guest, and comparing them with what the scan shows.
//!
//! ## Layout
//!
//! - [`system`]: supported guest systems and how to count their facts
//! - [`shell`] / [`facts`]: the management channel and fact collection
//! - [`appliance`] / [`summary`]: the product, as the checks see it
//! - [`scan`]: start a scan and wait for its task to finish
//! - [`checks`] / [`drift`]: the comparisons themselves
//! - [`schedule`] / [`policy`]: scheduled and policy-driven analysis
//! - [`provision`]: bring up a VM ready for analysis
//! - [`config`]: provider test data and run settings
//! - [`mock`]: an in-process guest, appliance and provider for tests

pub mod appliance;
pub mod checks;
pub mod config;
pub mod drift;
pub mod facts;
pub mod mock;
pub mod policy;
pub mod provision;
pub mod scan;
pub mod schedule;
pub mod shell;
#[cfg(unix)]
pub mod ssh;
pub mod summary;
pub mod system;

mod error;

pub use appliance::{Appliance, ControlApi, Target, TargetKind};
pub use error::SmartStateError;
pub use summary::SummaryField;
pub use system::{detect_system_type, SystemType, UnixFlavor};
