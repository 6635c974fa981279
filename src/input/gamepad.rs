use gilrs::{Button, EventType, GamepadId, Gilrs};
use statum::{machine, state};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::profiles::{DeviceProfile, TriggerRule};
use super::{InputError, PressEvent, TriggerEdge};
use crate::timer::Clock;

// Buttons scanned when looking for a device to bind.
const ALL_BUTTONS: [Button; 17] = [
    Button::South,
    Button::East,
    Button::North,
    Button::West,
    Button::C,
    Button::Z,
    Button::LeftTrigger,
    Button::LeftTrigger2,
    Button::RightTrigger,
    Button::RightTrigger2,
    Button::Select,
    Button::Start,
    Button::Mode,
    Button::LeftThumb,
    Button::RightThumb,
    Button::DPadUp,
    Button::DPadDown,
];

/// Sampler settings.
#[derive(Clone, Debug)]
pub struct GamepadSettings {
    /// Fixed sampling rate in Hz.
    pub poll_hz: u32,
    /// Profile forced by configuration; otherwise picked per device.
    pub profile_override: Option<&'static DeviceProfile>,
}

impl Default for GamepadSettings {
    fn default() -> Self {
        Self {
            poll_hz: 30,
            profile_override: None,
        }
    }
}

// Sampler states
#[state]
#[derive(Debug, Clone)]
pub enum SamplerState {
    Initializing,
    Sampling,
}

#[machine]
#[derive(Debug)]
pub struct GamepadSampler<S: SamplerState> {
    // Gilrs context
    gilrs: Gilrs,

    // Device currently bound as the trigger source
    bound: Option<GamepadId>,

    settings: GamepadSettings,

    clock: Clock,

    // Channel towards the controller
    event_sender: mpsc::Sender<PressEvent>,

    // Live trigger binding (None while unbound)
    binding_rx: watch::Receiver<Option<String>>,

    // Rule resolved for the bound device and current binding
    rule: Option<TriggerRule>,

    edge: TriggerEdge,
}

impl GamepadSampler<Initializing> {
    pub fn create(
        settings: GamepadSettings,
        clock: Clock,
        event_sender: mpsc::Sender<PressEvent>,
        binding_rx: watch::Receiver<Option<String>>,
    ) -> Result<Self, InputError> {
        info!("Initializing gilrs gamepad interface");
        let gilrs = match Gilrs::new() {
            Ok(g) => g,
            Err(e) => {
                error!("Failed to initialize gilrs: {}", e);
                return Err(InputError::InitializationError(e.to_string()));
            }
        };

        Ok(Self::new(
            gilrs,
            None,
            settings,
            clock,
            event_sender,
            binding_rx,
            None,
            TriggerEdge::new(),
        ))
    }

    pub fn initialize(self) -> Result<GamepadSampler<Sampling>, InputError> {
        let gamepads: Vec<_> = self.gilrs.gamepads().collect();
        if gamepads.is_empty() {
            warn!("No gamepad connected yet, waiting for one to appear");
        } else {
            info!("Found {} gamepad(s):", gamepads.len());
            for (id, gamepad) in &gamepads {
                info!("  {}: {}", id, gamepad.name());
            }
        }

        Ok(self.transition())
    }
}

impl GamepadSampler<Sampling> {
    /// Sample at the configured rate until cancelled.
    pub async fn run_sampling_loop(mut self, cancel: CancellationToken) -> Result<(), InputError> {
        info!("Starting gamepad sampling at {} Hz", self.settings.poll_hz);
        let period = Duration::from_millis(1000 / u64::from(self.settings.poll_hz.max(1)));
        let mut ticker = tokio::time::interval(period);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Gamepad sampling cancelled");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    self.sample_tick()?;
                }
            }
        }
    }

    fn sample_tick(&mut self) -> Result<(), InputError> {
        self.pump_device_events();
        self.refresh_binding();

        if self.bound.is_none() {
            self.bind_first_active_device();
        }

        let Some(id) = self.bound else {
            return Ok(());
        };
        // The bound device can vanish between the event pump and here.
        let Some(gamepad) = self.gilrs.connected_gamepad(id) else {
            return self.handle_disconnect();
        };

        let satisfied = match self.rule {
            Some(rule) => rule.is_satisfied(&gamepad),
            None => false,
        };

        if let Some(kind) = self.edge.update(satisfied) {
            self.forward(PressEvent {
                kind,
                at_ms: self.clock.now_ms(),
            })?;
        }
        Ok(())
    }

    // Drain gilrs so cached gamepad state stays fresh; a disconnect of
    // the bound device is handled immediately.
    fn pump_device_events(&mut self) {
        let mut lost_bound = false;
        while let Some(event) = self.gilrs.next_event() {
            match event.event {
                EventType::Connected => {
                    info!("Gamepad {} connected", event.id);
                }
                EventType::Disconnected => {
                    warn!("Gamepad {} disconnected", event.id);
                    if self.bound == Some(event.id) {
                        lost_bound = true;
                    }
                }
                _ => {}
            }
        }
        if lost_bound {
            if let Err(e) = self.handle_disconnect() {
                error!("Failed to signal disconnect: {}", e);
            }
        }
    }

    // A disconnected device releases the trigger and unbinds; evaluation
    // stays suspended until another device shows a pressed button.
    fn handle_disconnect(&mut self) -> Result<(), InputError> {
        self.bound = None;
        self.rule = None;
        if let Some(kind) = self.edge.update(false) {
            self.forward(PressEvent {
                kind,
                at_ms: self.clock.now_ms(),
            })?;
        }
        Ok(())
    }

    // The first device observed with any active button becomes the bound
    // device until it disconnects.
    fn bind_first_active_device(&mut self) {
        let found = self.gilrs.gamepads().find_map(|(id, gamepad)| {
            let active = ALL_BUTTONS.iter().any(|b| gamepad.is_pressed(*b));
            if active {
                Some((id, gamepad.vendor_id(), gamepad.product_id()))
            } else {
                None
            }
        });

        if let Some((id, vendor, product)) = found {
            let profile = self
                .settings
                .profile_override
                .unwrap_or_else(|| DeviceProfile::for_device(vendor, product));
            info!(
                "Bound gamepad {} using profile '{}' ({:04x?}:{:04x?})",
                id, profile.name, vendor, product
            );
            self.bound = Some(id);
            self.edge.rearm();
            self.resolve_rule(profile);
        }
    }

    fn resolve_rule(&mut self, profile: &'static DeviceProfile) {
        let binding = self.binding_rx.borrow().clone();
        self.rule = match binding {
            Some(name) => {
                let rule = profile.rule(&name);
                if rule.is_none() {
                    warn!(
                        "Trigger '{}' is not defined by profile '{}'",
                        name, profile.name
                    );
                }
                rule
            }
            None => None,
        };
        debug!("Resolved trigger rule: {:?}", self.rule);
    }

    // Pick up a rebind. Only the edge state is cleared; classification
    // state deliberately lives elsewhere and survives rebinding.
    fn refresh_binding(&mut self) {
        if !self.binding_rx.has_changed().unwrap_or(false) {
            return;
        }
        self.binding_rx.mark_unchanged();
        self.edge.rearm();
        if let Some(id) = self.bound {
            if let Some(gamepad) = self.gilrs.connected_gamepad(id) {
                let profile = self.settings.profile_override.unwrap_or_else(|| {
                    DeviceProfile::for_device(gamepad.vendor_id(), gamepad.product_id())
                });
                self.resolve_rule(profile);
            }
        }
    }

    fn forward(&self, event: PressEvent) -> Result<(), InputError> {
        match self.event_sender.try_send(event) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Press event channel full, dropping {:?}", event);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!("Press event channel closed");
                Err(InputError::ChannelClosed)
            }
        }
    }
}

/// Handle for the gamepad sampling task.
///
/// Spawning builds the gilrs context up front (so initialization errors
/// surface to the caller) and runs the sampler on its own tokio task.
/// Dropping the handle leaves the task running; call [`stop`](Self::stop)
/// to cancel the polling registration.
pub struct GamepadSourceHandle {
    cancel: CancellationToken,
}

impl GamepadSourceHandle {
    pub fn spawn(
        settings: GamepadSettings,
        clock: Clock,
        event_sender: mpsc::Sender<PressEvent>,
        binding_rx: watch::Receiver<Option<String>>,
    ) -> Result<Self, InputError> {
        info!("Spawning gamepad source with settings: {:?}", settings);
        let sampler = GamepadSampler::create(settings, clock, event_sender, binding_rx)?;

        let cancel = CancellationToken::new();
        let task_token = cancel.clone();
        tokio::spawn(async move {
            match sampler.initialize() {
                Ok(sampling) => {
                    if let Err(e) = sampling.run_sampling_loop(task_token).await {
                        error!("Gamepad sampler terminated with error: {}", e);
                    }
                }
                Err(e) => error!("Failed to initialize gamepad sampler: {}", e),
            }
        });

        Ok(Self { cancel })
    }

    /// Cancel the polling task.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}
