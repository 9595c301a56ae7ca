//! HTTP surface of the relay: long-poll notifications, config fetch and
//! config service discovery, served with warp.
mod http_config_service;

pub use http_config_service::*;
