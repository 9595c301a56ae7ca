mod event;
mod namespace;
mod notification;
mod release;
mod watch_key;

pub use event::*;
pub use namespace::*;
pub use notification::*;
pub use release::*;
pub use watch_key::*;
