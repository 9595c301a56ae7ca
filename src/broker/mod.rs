//! Long-poll notification fan-out.
mod notification_broker;
mod pending;

pub use notification_broker::*;

#[cfg(test)]
mod notification_broker_test;
#[cfg(test)]
mod pending_test;
