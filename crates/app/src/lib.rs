//! # glowhub-app
//!
//! The runtime core: devices, transitions, rules and the control loop.
//!
//! ## Responsibilities
//! - Define the **`Device`** capability contract and the shared
//!   [`DeviceCore`](device::DeviceCore) bookkeeping every driver embeds
//! - Provide the generic building blocks drivers are made of:
//!   - [`Dimmable`](dimmable::Dimmable): stepped current → target transitions
//!   - [`Group`](group::Group): same-kind devices aggregated into one
//!   - [`Clock`](clock::Clock): calendar fields as rule triggers
//! - Run the **rule engine**: trigger observation, delay gating,
//!   AND-evaluation, receiver materialization, single-use lifecycle
//! - Own the **command queue**, its dispatcher and the **cycle scheduler**
//! - Define **port traits** adapters implement (`Transport`)
//!
//! ## Dependency rule
//! Depends on `glowhub-domain` only (plus `tokio` for channels and timers,
//! `parking_lot` for device locks). Never imports adapter crates.

pub mod clock;
pub mod command_queue;
pub mod device;
pub mod dimmable;
pub mod group;
pub mod isolate;
pub mod ports;
pub mod registry;
pub mod rule;
pub mod runtime;
pub mod scheduler;
