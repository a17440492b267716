//! Application core: the coordinator and its port boundary.
//!
//! [`service::System`] drives bring-up and the run loop.  Everything it
//! touches outside its own state goes through the **port traits** in
//! [`ports`], so the coordinator runs unchanged against mocks on the host.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
