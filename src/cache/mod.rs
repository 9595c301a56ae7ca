//! Server-side read caches fed by release events.
mod config_query;
mod config_snapshot_cache;
mod release_message_cache;

pub use config_query::*;
pub use config_snapshot_cache::*;
pub use release_message_cache::*;
