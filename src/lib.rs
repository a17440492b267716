//! System coordinator firmware library.
//!
//! Exposes the coordinator, its bring-up sequence and the persisted
//! configuration for integration testing.  All ESP-IDF-specific code is
//! guarded by `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod app;
pub mod channels;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod fsm;
pub mod persist;
pub mod registry;
pub mod store;

pub mod adapters;
pub mod drivers;

#[cfg(target_os = "espidf")]
mod esp_link_shims;
