//! Assembly of the relay server: storage, publisher, scanner, caches,
//! broker and HTTP surface.
mod builder;
mod relay_server;

pub use builder::*;
pub use relay_server::*;
