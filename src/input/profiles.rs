//! Per-device trigger tables.
//!
//! Plain data records keyed by device identity. Each profile maps the
//! overlay's button vocabulary ("start", "a", "up", ...) onto the rule
//! that decides whether that trigger is currently satisfied on the
//! device: a digital button, a directional axis with a threshold, or a
//! set of calibrated analog presets for adapters that report the whole
//! hat on a single axis.

use gilrs::{Axis, Button, Gamepad};

/// Tolerance for matching a calibrated analog preset.
const PRESET_EPSILON: f32 = 0.01;

/// How one named trigger is read off a device.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TriggerRule {
    /// A digital button index reports pressed.
    Button(Button),
    /// A directional axis crossed a threshold. Positive values satisfy
    /// at or above the threshold, negative values at or below.
    AxisThreshold { axis: Axis, value: f32 },
    /// The axis sits on one of several calibrated values. Satisfied when
    /// the closest preset is within [`PRESET_EPSILON`].
    AxisPresets {
        axis: Axis,
        presets: &'static [f32],
    },
}

impl TriggerRule {
    /// Evaluate against the live state of a gamepad.
    pub fn is_satisfied(&self, gamepad: &Gamepad<'_>) -> bool {
        match *self {
            TriggerRule::Button(button) => gamepad.is_pressed(button),
            TriggerRule::AxisThreshold { axis, value } => {
                axis_threshold_satisfied(value, axis_value(gamepad, axis))
            }
            TriggerRule::AxisPresets { axis, presets } => {
                preset_satisfied(presets, axis_value(gamepad, axis))
            }
        }
    }
}

fn axis_value(gamepad: &Gamepad<'_>, axis: Axis) -> f32 {
    gamepad.axis_data(axis).map_or(0.0, |data| data.value())
}

/// Threshold rule: the sign of the expected value picks the direction.
pub fn axis_threshold_satisfied(expected: f32, value: f32) -> bool {
    if expected > 0.0 {
        value >= expected
    } else {
        value <= expected
    }
}

/// Preset rule: smallest absolute difference wins the tie-break, and the
/// winner must sit within the fixed epsilon.
pub fn preset_satisfied(presets: &[f32], value: f32) -> bool {
    presets
        .iter()
        .map(|preset| (preset - value).abs())
        .fold(None, |best: Option<f32>, d| {
            Some(best.map_or(d, |b| b.min(d)))
        })
        .is_some_and(|closest| closest < PRESET_EPSILON)
}

/// One named trigger of a profile.
#[derive(Clone, Copy, Debug)]
pub struct TriggerSpec {
    pub name: &'static str,
    pub rule: TriggerRule,
}

/// Trigger bindings of one controller family.
#[derive(Clone, Copy, Debug)]
pub struct DeviceProfile {
    pub name: &'static str,
    pub vendor: Option<u16>,
    pub product: Option<u16>,
    pub triggers: &'static [TriggerSpec],
}

impl DeviceProfile {
    /// Rule for a named trigger, if the profile defines it.
    pub fn rule(&self, trigger: &str) -> Option<TriggerRule> {
        self.triggers
            .iter()
            .find(|spec| spec.name == trigger)
            .map(|spec| spec.rule)
    }

    /// Pick the profile for a device identity, falling back to the
    /// default profile for unrecognized devices.
    pub fn for_device(vendor: Option<u16>, product: Option<u16>) -> &'static DeviceProfile {
        PROFILES
            .iter()
            .find(|p| p.vendor == vendor && p.product == product)
            .copied()
            .unwrap_or(&XBOX)
    }

    /// Look up a profile by name, for explicit configuration overrides.
    pub fn by_name(name: &str) -> Option<&'static DeviceProfile> {
        PROFILES.iter().find(|p| p.name == name).copied()
    }

    /// Every known profile.
    pub fn all() -> impl Iterator<Item = &'static DeviceProfile> {
        PROFILES.iter().copied()
    }
}

macro_rules! spec {
    ($name:literal, $rule:expr) => {
        TriggerSpec {
            name: $name,
            rule: $rule,
        }
    };
}

static XBOX: DeviceProfile = DeviceProfile {
    name: "xbox",
    vendor: Some(0x045e),
    product: Some(0x028e),
    triggers: &[
        spec!("a", TriggerRule::Button(Button::South)),
        spec!("b", TriggerRule::Button(Button::East)),
        spec!("x", TriggerRule::Button(Button::West)),
        spec!("y", TriggerRule::Button(Button::North)),
        spec!("start", TriggerRule::Button(Button::Start)),
        spec!("select", TriggerRule::Button(Button::Select)),
        spec!("home", TriggerRule::Button(Button::Mode)),
        spec!("l1", TriggerRule::Button(Button::LeftTrigger)),
        spec!("l2", TriggerRule::Button(Button::LeftTrigger2)),
        spec!("r1", TriggerRule::Button(Button::RightTrigger)),
        spec!("r2", TriggerRule::Button(Button::RightTrigger2)),
        spec!("up", TriggerRule::Button(Button::DPadUp)),
        spec!("down", TriggerRule::Button(Button::DPadDown)),
        spec!("left", TriggerRule::Button(Button::DPadLeft)),
        spec!("right", TriggerRule::Button(Button::DPadRight)),
    ],
};

// Unbranded PS1 adapters report the hat as two axes around +-0.75.
static PS1: DeviceProfile = DeviceProfile {
    name: "ps1",
    vendor: Some(0x0810),
    product: Some(0x0001),
    triggers: &[
        spec!("triangle", TriggerRule::Button(Button::North)),
        spec!("circle", TriggerRule::Button(Button::East)),
        spec!("cross", TriggerRule::Button(Button::South)),
        spec!("square", TriggerRule::Button(Button::West)),
        spec!("start", TriggerRule::Button(Button::Start)),
        spec!("select", TriggerRule::Button(Button::Select)),
        spec!("l1", TriggerRule::Button(Button::LeftTrigger)),
        spec!("l2", TriggerRule::Button(Button::LeftTrigger2)),
        spec!("r1", TriggerRule::Button(Button::RightTrigger)),
        spec!("r2", TriggerRule::Button(Button::RightTrigger2)),
        spec!(
            "up",
            TriggerRule::AxisThreshold {
                axis: Axis::DPadY,
                value: -0.75,
            }
        ),
        spec!(
            "down",
            TriggerRule::AxisThreshold {
                axis: Axis::DPadY,
                value: 0.75,
            }
        ),
        spec!(
            "left",
            TriggerRule::AxisThreshold {
                axis: Axis::DPadX,
                value: -0.75,
            }
        ),
        spec!(
            "right",
            TriggerRule::AxisThreshold {
                axis: Axis::DPadX,
                value: 0.75,
            }
        ),
    ],
};

static GCN: DeviceProfile = DeviceProfile {
    name: "gcn",
    vendor: Some(0x0079),
    product: Some(0x1846),
    triggers: &[
        spec!("a", TriggerRule::Button(Button::East)),
        spec!("b", TriggerRule::Button(Button::South)),
        spec!("x", TriggerRule::Button(Button::North)),
        spec!("y", TriggerRule::Button(Button::West)),
        spec!("start", TriggerRule::Button(Button::Start)),
        spec!("l1", TriggerRule::Button(Button::LeftTrigger)),
        spec!("r1", TriggerRule::Button(Button::RightTrigger)),
        spec!("z", TriggerRule::Button(Button::RightTrigger2)),
        spec!("up", TriggerRule::Button(Button::DPadUp)),
        spec!("down", TriggerRule::Button(Button::DPadDown)),
        spec!("left", TriggerRule::Button(Button::DPadLeft)),
        spec!("right", TriggerRule::Button(Button::DPadRight)),
    ],
};

// DualSense through a generic driver reports the hat on one axis with a
// calibrated value per direction (and per wrap-around position).
static PS5: DeviceProfile = DeviceProfile {
    name: "ps5",
    vendor: Some(0x054c),
    product: Some(0x0ce6),
    triggers: &[
        spec!("triangle", TriggerRule::Button(Button::North)),
        spec!("circle", TriggerRule::Button(Button::East)),
        spec!("cross", TriggerRule::Button(Button::South)),
        spec!("square", TriggerRule::Button(Button::West)),
        spec!("start", TriggerRule::Button(Button::Start)),
        spec!("select", TriggerRule::Button(Button::Select)),
        spec!("l1", TriggerRule::Button(Button::LeftTrigger)),
        spec!("r1", TriggerRule::Button(Button::RightTrigger)),
        spec!(
            "l2",
            TriggerRule::AxisThreshold {
                axis: Axis::LeftZ,
                value: 0.25,
            }
        ),
        spec!(
            "r2",
            TriggerRule::AxisThreshold {
                axis: Axis::RightZ,
                value: 0.25,
            }
        ),
        spec!(
            "up",
            TriggerRule::AxisPresets {
                axis: Axis::DPadY,
                presets: &[-1.0, 1.0, -0.714],
            }
        ),
        spec!(
            "down",
            TriggerRule::AxisPresets {
                axis: Axis::DPadY,
                presets: &[0.14, 0.42, -0.14],
            }
        ),
        spec!(
            "left",
            TriggerRule::AxisPresets {
                axis: Axis::DPadX,
                presets: &[0.714, 1.0, 0.42],
            }
        ),
        spec!(
            "right",
            TriggerRule::AxisPresets {
                axis: Axis::DPadX,
                presets: &[-0.42, -0.714, -0.14],
            }
        ),
    ],
};

static PROFILES: [&DeviceProfile; 4] = [&XBOX, &PS1, &GCN, &PS5];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_lookup_prefers_exact_identity() {
        let profile = DeviceProfile::for_device(Some(0x054c), Some(0x0ce6));
        assert_eq!(profile.name, "ps5");
    }

    #[test]
    fn unknown_devices_fall_back_to_the_default_profile() {
        let profile = DeviceProfile::for_device(Some(0xdead), Some(0xbeef));
        assert_eq!(profile.name, "xbox");
        assert_eq!(DeviceProfile::for_device(None, None).name, "xbox");
    }

    #[test]
    fn profile_rules_resolve_by_name() {
        let profile = DeviceProfile::by_name("ps1").unwrap();
        assert_eq!(
            profile.rule("cross"),
            Some(TriggerRule::Button(Button::South))
        );
        assert_eq!(profile.rule("warp"), None);
    }

    #[test]
    fn positive_thresholds_satisfy_upward() {
        assert!(axis_threshold_satisfied(0.75, 0.75));
        assert!(axis_threshold_satisfied(0.75, 1.0));
        assert!(!axis_threshold_satisfied(0.75, 0.74));
    }

    #[test]
    fn negative_thresholds_satisfy_downward() {
        assert!(axis_threshold_satisfied(-0.75, -0.8));
        assert!(!axis_threshold_satisfied(-0.75, -0.5));
        assert!(!axis_threshold_satisfied(-0.75, 0.9));
    }

    #[test]
    fn preset_match_uses_the_closest_within_epsilon() {
        let presets = [-1.0, 1.0, -0.714];
        assert!(preset_satisfied(&presets, -0.714));
        assert!(preset_satisfied(&presets, -0.709));
        assert!(preset_satisfied(&presets, 0.995));
        assert!(!preset_satisfied(&presets, -0.70));
        assert!(!preset_satisfied(&presets, 0.0));
        assert!(!preset_satisfied(&[], 0.0));
    }
}
