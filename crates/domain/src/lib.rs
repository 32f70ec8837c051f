//! # glowhub-domain
//!
//! Pure domain model for the glowhub home automation hub.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps
//! - Define the dynamically typed [`Value`](value::Value) observed by rules,
//!   together with the single coercion table used to compare values
//! - Define **Conditions** (operator + configured value + optional delay)
//! - Define the **`SwitchRequest`** command envelope
//! - Define the configuration records devices and rules are built from
//! - Define the public **status** shape of a device
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! Locks, channels and device behaviour live in the `app` crate.

pub mod error;
pub mod id;
pub mod time;

pub mod condition;
pub mod config;
pub mod request;
pub mod status;
pub mod value;
