//! Periodic scanning of the release log and fan-out to listeners.
mod log_scanner;

pub use log_scanner::*;
#[cfg(test)]
use mockall::automock;

use crate::ReleaseEvent;
use crate::Result;


/// Receives every release event the scanner observes, in id order.
///
/// Implementations must be cheap; they run on the scanner task. A returned
/// error or a panic is logged and does not affect other listeners.
#[cfg_attr(test, automock)]
pub trait ReleaseListener: Send + Sync + 'static {
    fn handle_event(
        &self,
        event: &ReleaseEvent,
    ) -> Result<()>;
}
