//! Input sources for the overlay trigger.
//!
//! Two adapters sample physical devices and reduce them to one binary
//! question per tick: is the configured trigger currently fully
//! satisfied? State changes and still-held states become [`PressEvent`]s
//! on a shared channel, in timestamp order, consumed by the single
//! controller task.
//!
//! ```text
//! gamepad.rs  (gilrs, 30 Hz poll)  ─┐
//!                                   ├─[PressEvent]→ TimerController
//! keyboard.rs (bit-mask stream)    ─┘
//! ```

pub mod gamepad;
pub mod keyboard;
pub mod profiles;

pub use gamepad::{GamepadSettings, GamepadSourceHandle};
pub use keyboard::{KeyStreamHandle, KeyStreamSettings};
pub use profiles::{DeviceProfile, TriggerRule};

use thiserror::Error;

/// Phase of a press as seen by one sampling tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PressKind {
    /// The trigger just became satisfied.
    Start,
    /// The trigger stayed satisfied; re-emitted every tick while held.
    Held,
    /// The trigger just stopped being satisfied.
    End,
}

/// One logical press signal with its sampling timestamp (monotonic
/// milliseconds from the engine clock).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PressEvent {
    pub kind: PressKind,
    pub at_ms: u64,
}

/// Errors raised by the input adapters.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("Failed to initialize input source: {0}")]
    InitializationError(String),

    #[error("Press event channel closed")]
    ChannelClosed,

    #[error("Invalid key mask '{0}'")]
    BadKeyMask(String),

    #[error("Unknown trigger button '{0}' for the active profile")]
    UnknownButton(String),

    #[error("Key stream connection failed: {0}")]
    ConnectionError(String),
}

/// Edge detector shared by both adapters.
///
/// Emits exactly one signal per evaluation: `Start` on false→true, `End`
/// on true→false, `Held` on unchanged-true, nothing on unchanged-false.
#[derive(Clone, Copy, Debug, Default)]
pub struct TriggerEdge {
    last_state: bool,
}

impl TriggerEdge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebinding clears the remembered state so a held trigger does not
    /// leak an `End` into the new binding.
    pub fn rearm(&mut self) {
        self.last_state = false;
    }

    pub fn update(&mut self, state: bool) -> Option<PressKind> {
        if self.last_state == state {
            if state {
                Some(PressKind::Held)
            } else {
                None
            }
        } else {
            self.last_state = state;
            if state {
                Some(PressKind::Start)
            } else {
                Some(PressKind::End)
            }
        }
    }
}

/// Parse a configured key-combination mask.
///
/// Accepts a plain decimal number, a `0x`-prefixed hex mask, or a
/// `0b`-prefixed bit string.
pub fn parse_key_mask(text: &str) -> Result<u32, InputError> {
    let text = text.trim();
    if let Some(bits) = text.strip_prefix("0b") {
        let mut mask = 0u32;
        for c in bits.chars() {
            let bit = c.to_digit(2).ok_or_else(|| InputError::BadKeyMask(text.to_string()))?;
            mask = (mask << 1) | bit;
        }
        Ok(mask)
    } else if let Some(hex) = text.strip_prefix("0x") {
        u32::from_str_radix(hex, 16).map_err(|_| InputError::BadKeyMask(text.to_string()))
    } else {
        text.parse()
            .map_err(|_| InputError::BadKeyMask(text.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_emits_one_signal_per_transition() {
        let mut edge = TriggerEdge::new();
        assert_eq!(edge.update(false), None);
        assert_eq!(edge.update(true), Some(PressKind::Start));
        assert_eq!(edge.update(true), Some(PressKind::Held));
        assert_eq!(edge.update(true), Some(PressKind::Held));
        assert_eq!(edge.update(false), Some(PressKind::End));
        assert_eq!(edge.update(false), None);
    }

    #[test]
    fn rearm_forgets_a_held_trigger() {
        let mut edge = TriggerEdge::new();
        edge.update(true);
        edge.rearm();
        // Still physically held: reads as a fresh press, not a release.
        assert_eq!(edge.update(true), Some(PressKind::Start));
    }

    #[test]
    fn key_mask_formats() {
        assert_eq!(parse_key_mask("33").unwrap(), 33);
        assert_eq!(parse_key_mask("0x21").unwrap(), 0x21);
        assert_eq!(parse_key_mask("0b100001").unwrap(), 0b10_0001);
        assert!(parse_key_mask("0xzz").is_err());
        assert!(parse_key_mask("presses").is_err());
    }
}
