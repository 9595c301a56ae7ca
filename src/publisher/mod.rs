//! Release publishing and compaction of superseded events.
mod compaction;
mod release_publisher;

pub use compaction::*;
pub use release_publisher::*;
