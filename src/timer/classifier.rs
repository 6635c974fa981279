use tracing::{debug, info};

use crate::input::{PressEvent, PressKind};

/// Tuning for press classification.
#[derive(Clone, Debug)]
pub struct ClassifierSettings {
    /// Maximum gap between successive press-starts still counted as part
    /// of the same rapid sequence.
    pub multi_press_window_ms: u64,
    /// How long a trigger must be held before the press commits.
    pub hold_confirm_ms: u64,
    /// Repetition count that turns a committed press into a reset.
    pub reset_press_count: u32,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            multi_press_window_ms: 300,
            hold_confirm_ms: 400,
            reset_press_count: 3,
        }
    }
}

/// What a confirmed hold means to the timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionKind {
    /// Start, stop, or advance a split, depending on the run state.
    Toggle,
    /// Deliberate rapid-press sequence: reset the run.
    Reset,
}

/// A hold that survived debouncing, emitted at most once per hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommittedAction {
    pub kind: ActionKind,
    /// The instant the (first) press of the sequence began. Timer
    /// operations anchor here so the confirmation delay is not counted.
    pub press_began_ms: u64,
    pub repetitions: u32,
}

/// Turns the press-start/held/end stream of one trigger into committed
/// actions.
///
/// Taps shorter than the hold threshold never commit. A hold commits
/// exactly once no matter how many held ticks arrive. The repetition
/// counter survives press-end and only resets when a later press-start
/// falls outside the multi-press window, so a triple-tap followed by a
/// qualifying hold commits once with count 3.
#[derive(Clone, Debug)]
pub struct PressClassifier {
    settings: ClassifierSettings,
    // Instant of the most recent press-start
    last_fresh_ms: u64,
    // Instant the current rapid sequence began
    press_began_ms: u64,
    multi_press_count: u32,
    // Whether the current hold already committed
    handled: bool,
}

impl PressClassifier {
    pub fn new(settings: ClassifierSettings) -> Self {
        Self {
            settings,
            last_fresh_ms: 0,
            press_began_ms: 0,
            multi_press_count: 0,
            handled: false,
        }
    }

    /// Feed one press event; returns a committed action when a hold is
    /// confirmed.
    pub fn observe(&mut self, event: PressEvent) -> Option<CommittedAction> {
        match event.kind {
            PressKind::Start => {
                if event.at_ms.saturating_sub(self.last_fresh_ms)
                    > self.settings.multi_press_window_ms
                {
                    self.multi_press_count = 1;
                    self.press_began_ms = event.at_ms;
                } else {
                    self.multi_press_count += 1;
                }
                self.last_fresh_ms = event.at_ms;
                debug!(
                    "Press start at {}ms (repetition {})",
                    event.at_ms, self.multi_press_count
                );
                None
            }
            PressKind::End => {
                self.handled = false;
                None
            }
            PressKind::Held => {
                if self.handled
                    || event.at_ms.saturating_sub(self.last_fresh_ms)
                        < self.settings.hold_confirm_ms
                {
                    return None;
                }
                self.handled = true;
                let kind = if self.multi_press_count == self.settings.reset_press_count {
                    ActionKind::Reset
                } else {
                    ActionKind::Toggle
                };
                info!(
                    "Hold confirmed at {}ms: {:?} (repetition {})",
                    event.at_ms, kind, self.multi_press_count
                );
                Some(CommittedAction {
                    kind,
                    press_began_ms: self.press_began_ms,
                    repetitions: self.multi_press_count,
                })
            }
        }
    }
}

impl Default for PressClassifier {
    fn default() -> Self {
        Self::new(ClassifierSettings::default())
    }
}
