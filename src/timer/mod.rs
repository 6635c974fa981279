//! The timing core: press classification, the elapsed-time accumulator,
//! split tracking, and the controller that wires them together.
//!
//! Data flows one way. Input adapters feed [`PressEvent`]s to the
//! [`TimerController`] task, the [`PressClassifier`] condenses them into
//! committed actions, and those drive the [`TimeAccumulator`] and
//! [`SplitManager`]. Display output leaves through a
//! [`DisplaySink`](crate::display::DisplaySink) on an independent
//! fixed-rate refresh.
//!
//! [`PressEvent`]: crate::input::PressEvent

pub mod accumulator;
pub mod classifier;
pub mod clock;
pub mod controller;
pub mod splits;

pub use accumulator::TimeAccumulator;
pub use classifier::{ActionKind, ClassifierSettings, CommittedAction, PressClassifier};
pub use clock::Clock;
pub use controller::{
    ControllerCommand, ControllerSettings, RunState, TimerController, TimerControllerHandle,
};
pub use splits::{diff_against, SplitDiff, SplitEntry, SplitManager, SplitRecord, SplitsError};

use thiserror::Error;

/// Errors from the elapsed-time accumulator.
#[derive(Debug, Error)]
pub enum TimerError {
    #[error("Timer is already running")]
    AlreadyRunning,

    #[error("Timer is not running")]
    NotRunning,
}
