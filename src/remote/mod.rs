//! Clients for the remote overlay services.
//!
//! Two JSON-over-HTTP collaborators: the splits store (`splits.rs`) that
//! the engine loads target lists from and persists achieved runs to, and
//! an optional remote timer (`timer.rs`) that mirrors start/stop/reset so
//! a second overlay can follow the same run. All calls are issued from
//! fire-and-forget tasks; results travel back to the controller over its
//! channels.

pub mod splits;
pub mod timer;

pub use splits::SplitsClient;
pub use timer::{RemoteTimerClient, TimerCommand};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Splits response is missing its entries")]
    MissingEntries,
}
