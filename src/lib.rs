//! # config-relay
//!
//! A configuration distribution control plane: admins publish releases,
//! relay servers record them in a release log and push change notifications
//! to clients parked on long polls, and the client library keeps a local,
//! always-available copy of every namespace it reads.
//!
//! - [`ServerBuilder`] / [`RelayServer`] - server assembly and lifecycle
//! - [`ReleasePublisher`] - records releases and compacts superseded events
//! - [`LogScanner`] - delivers release events to listeners in id order
//! - [`NotificationBroker`] - long-poll fan-out
//! - [`ConfigClient`] - client library entry point
mod broker;
mod cache;
mod client;
mod config;
pub mod constants;
mod core;
mod errors;
mod metrics;
mod network;
mod publisher;
mod scanner;
mod server;
mod storage;
pub mod utils;

pub use core::*;

pub use broker::*;
pub use cache::*;
pub use client::*;
pub use config::*;
pub use errors::*;
pub use metrics::*;
pub use network::*;
pub use publisher::*;
pub use scanner::*;
pub use server::*;
pub use storage::*;
pub use utils::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
//-----------------------------------------------------------
// Autometrics
/// autometrics: https://docs.autometrics.dev/rust/adding-alerts-and-slos
use autometrics::objectives::Objective;
use autometrics::objectives::ObjectiveLatency;
use autometrics::objectives::ObjectivePercentile;
const API_SLO: Objective = Objective::new("api")
    .success_rate(ObjectivePercentile::P99_9)
    .latency(ObjectiveLatency::Ms10, ObjectivePercentile::P99);
