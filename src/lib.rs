//! # mqtt-shepherd
//!
//! A device-management gateway that speaks an LWM2M-style resource protocol
//! over MQTT. Devices register on `register/<clientId>`, report on `notify`,
//! `update` and friends, and answer gateway requests sent to
//! `request/<clientId>`. The gateway keeps a per-device shadow of the
//! `object/instance/resource` tree, tracks liveness and tells the application
//! what changed through [`GatewayEvent`]s.
//!
//! ## Modules
//! - [`codec`]: path grammar and id/alias dictionaries
//! - [`diff`]: minimal shadow diffs
//! - [`correlator`]: transaction ids and pending requests
//! - [`directory`]: device records and lifecycle
//! - [`dispatch`]: inbound topic routing and channel handlers
//! - [`gateway`]: builder, event loop and request API

pub mod codec;
mod config;
mod constants;
pub mod correlator;
pub mod diff;
pub mod directory;
pub mod dispatch;
mod errors;
mod event;
pub mod gateway;
mod hooks;
mod metrics;
mod storage;
mod transport;
pub mod utils;

pub use codec::*;
pub use config::*;
pub use constants::RESERVED_CLIENT_ID;
pub use correlator::*;
pub use directory::*;
pub use dispatch::*;
pub use errors::*;
pub use event::*;
pub use gateway::*;
pub use hooks::*;
pub use metrics::*;
pub use storage::*;
pub use transport::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
