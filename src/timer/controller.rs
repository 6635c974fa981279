use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::display::{format_time, DisplaySink, SplitRow, TimerFrame};
use crate::input::PressEvent;
use crate::remote::{RemoteError, RemoteTimerClient, SplitsClient, TimerCommand};

use super::classifier::{ActionKind, CommittedAction, PressClassifier};
use super::splits::{SplitEntry, SplitManager, SplitRecord};
use super::{ClassifierSettings, Clock, TimeAccumulator};

/// Configuration for one controller instance.
#[derive(Clone, Debug)]
pub struct ControllerSettings {
    /// Display refresh rate in Hz, independent of the input poll rates.
    pub display_refresh_hz: u32,
    /// Whether the main readout shows milliseconds.
    pub show_millis: bool,
    pub classifier: ClassifierSettings,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            display_refresh_hz: 30,
            show_millis: true,
            classifier: ClassifierSettings::default(),
        }
    }
}

/// Where the run currently stands.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RunState {
    /// Never started, or reset.
    #[default]
    Idle,
    Running,
    /// Paused mid-run; a toggle resumes.
    Stopped,
    /// Every split was played.
    Complete,
}

/// Commands accepted by a running controller.
#[derive(Clone, Debug)]
pub enum ControllerCommand {
    /// Rebind the gamepad trigger to a named button, or unbind.
    BindButton(Option<String>),
    /// Rebind the keyboard trigger mask; zero unbinds.
    BindKeyMask(u32),
    /// Fetch the split list from the configured server again.
    ReloadSplits,
}

// Outcome of one fire-and-forget split load.
struct LoadResult {
    generation: u64,
    result: Result<Vec<SplitEntry>, RemoteError>,
}

/// The orchestrator: owns the accumulator, the split list, and the press
/// classifier of one overlay instance, and runs them on a single task.
///
/// Three periodic activities interleave here without locks: press events
/// from the input adapters, the fixed-rate display refresh, and results
/// of fire-and-forget remote calls. Each mutation completes before the
/// next event is looked at.
pub struct TimerController {
    settings: ControllerSettings,
    clock: Clock,

    accumulator: TimeAccumulator,
    splits: SplitManager,
    classifier: PressClassifier,
    state: RunState,

    display: Box<dyn DisplaySink>,

    splits_client: Option<SplitsClient>,
    remote_timer: Option<RemoteTimerClient>,

    press_rx: mpsc::Receiver<PressEvent>,
    command_rx: mpsc::Receiver<ControllerCommand>,
    load_tx: mpsc::Sender<LoadResult>,
    load_rx: mpsc::Receiver<LoadResult>,

    button_binding_tx: watch::Sender<Option<String>>,
    key_mask_tx: watch::Sender<u32>,

    // Bumped on every reload/reset; stale load responses are discarded.
    load_generation: u64,
}

/// Handle for a spawned controller.
pub struct TimerControllerHandle {
    command_tx: mpsc::Sender<ControllerCommand>,
    cancel: CancellationToken,
}

impl TimerControllerHandle {
    /// Bind the gamepad trigger to a named button of the active profile.
    pub async fn set_timer_event_button(&self, name: Option<String>) {
        let _ = self
            .command_tx
            .send(ControllerCommand::BindButton(name))
            .await;
    }

    /// Bind the keyboard trigger to a key-combination mask.
    pub async fn set_timer_event_key(&self, mask: u32) {
        let _ = self
            .command_tx
            .send(ControllerCommand::BindKeyMask(mask))
            .await;
    }

    /// Ask for a fresh split list from the server.
    pub async fn reload_splits(&self) {
        let _ = self.command_tx.send(ControllerCommand::ReloadSplits).await;
    }

    /// Stop the controller task.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl TimerController {
    /// Build a controller and run it on its own task.
    ///
    /// `initial_entries` seeds the split list without a server round
    /// trip; when a splits client is configured, a load is requested as
    /// the task starts and its response replaces the seed.
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        settings: ControllerSettings,
        clock: Clock,
        display: Box<dyn DisplaySink>,
        press_rx: mpsc::Receiver<PressEvent>,
        button_binding_tx: watch::Sender<Option<String>>,
        key_mask_tx: watch::Sender<u32>,
        splits_client: Option<SplitsClient>,
        remote_timer: Option<RemoteTimerClient>,
        initial_entries: Option<Vec<SplitEntry>>,
    ) -> TimerControllerHandle {
        let (command_tx, command_rx) = mpsc::channel(16);
        let (load_tx, load_rx) = mpsc::channel(4);

        let classifier = PressClassifier::new(settings.classifier.clone());
        let mut controller = Self {
            settings,
            clock,
            accumulator: TimeAccumulator::new(),
            splits: SplitManager::new(),
            classifier,
            state: RunState::Idle,
            display,
            splits_client,
            remote_timer,
            press_rx,
            command_rx,
            load_tx,
            load_rx,
            button_binding_tx,
            key_mask_tx,
            load_generation: 0,
        };

        if let Some(entries) = initial_entries {
            controller.splits.install(entries);
        }

        let cancel = CancellationToken::new();
        let task_token = cancel.clone();
        tokio::spawn(async move {
            controller.run(task_token).await;
        });

        TimerControllerHandle { command_tx, cancel }
    }

    async fn run(mut self, cancel: CancellationToken) {
        info!("Timer controller started");

        if self.splits_client.is_some() {
            self.request_reload();
        }
        self.render_all_rows();

        let period =
            Duration::from_millis(1000 / u64::from(self.settings.display_refresh_hz.max(1)));
        let mut display_ticker = tokio::time::interval(period);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Timer controller cancelled");
                    return;
                }
                event = self.press_rx.recv() => {
                    match event {
                        Some(event) => self.on_press(event),
                        None => {
                            warn!("All input sources closed, stopping controller");
                            return;
                        }
                    }
                }
                _ = display_ticker.tick() => {
                    self.refresh_display();
                }
                Some(result) = self.load_rx.recv() => {
                    self.on_load(result);
                }
                command = self.command_rx.recv() => {
                    match command {
                        Some(command) => self.on_command(command),
                        None => {
                            warn!("Command channel closed, stopping controller");
                            return;
                        }
                    }
                }
            }
        }
    }

    fn on_press(&mut self, event: PressEvent) {
        if let Some(commit) = self.classifier.observe(event) {
            self.handle_commit(commit);
        }
    }

    // One committed hold becomes one timer operation. Mirrors the press
    // semantics of the overlay: a triple-press resets, anything else
    // starts, advances, or stops depending on where the run stands.
    fn handle_commit(&mut self, commit: CommittedAction) {
        debug!("Handling commit {:?} in state {:?}", commit, self.state);
        match commit.kind {
            ActionKind::Reset => {
                self.accumulator.reset();
                self.splits.reset();
                self.set_state(RunState::Idle);
                self.mirror_reset();
                self.request_reload();
                self.render_all_rows();
                self.refresh_display();
            }
            ActionKind::Toggle => {
                let was_running = self.accumulator.is_running();
                // Value the run as of the instant the hold began, so the
                // confirmation delay never shows up in a recorded split.
                let fixed = self.accumulator.fixed_elapsed(commit.press_began_ms);

                if was_running && self.splits.has_more() {
                    let index = self.splits.current_index().unwrap_or(0);
                    match self.splits.advance(fixed) {
                        Ok(record) => {
                            let row = Self::row_for(record, None, index);
                            self.display.set_split_row(&row);
                        }
                        Err(e) => error!("Failed to advance split: {}", e),
                    }
                    // The highlight moves on to the next split, if any.
                    if let Some(next) = self.splits.current_index() {
                        let record = self.splits.records()[next].clone();
                        let row = Self::row_for(&record, Some(next), next);
                        self.display.set_split_row(&row);
                    }
                    self.flush_pending_persist();
                }

                if !was_running {
                    match self.accumulator.start(commit.press_began_ms) {
                        Ok(()) => {
                            self.set_state(RunState::Running);
                            self.mirror(TimerCommand::Start);
                        }
                        Err(e) => error!("Failed to start timer: {}", e),
                    }
                } else if !self.splits.has_more() {
                    match self.accumulator.stop(commit.press_began_ms) {
                        Ok(total) => {
                            let complete = self.splits.started() && !self.splits.is_empty();
                            self.set_state(if complete {
                                RunState::Complete
                            } else {
                                RunState::Stopped
                            });
                            self.mirror(TimerCommand::Stop);
                            debug!("Timer halted at {}ms", total);
                        }
                        Err(e) => error!("Failed to stop timer: {}", e),
                    }
                }
                self.refresh_display();
            }
        }
    }

    fn on_command(&mut self, command: ControllerCommand) {
        match command {
            ControllerCommand::BindButton(name) => {
                info!("Rebinding gamepad trigger to {:?}", name);
                let _ = self.button_binding_tx.send(name);
            }
            ControllerCommand::BindKeyMask(mask) => {
                info!("Rebinding keyboard trigger to {:#010x}", mask);
                let _ = self.key_mask_tx.send(mask);
            }
            ControllerCommand::ReloadSplits => {
                self.request_reload();
            }
        }
    }

    // Fixed-rate refresh, decoupled from input and commit rates.
    fn refresh_display(&mut self) {
        let now = self.clock.now_ms();
        let elapsed = self.accumulator.query(now);
        self.display
            .set_timer(&TimerFrame::new(elapsed, self.settings.show_millis));

        if self.accumulator.is_running() {
            if let Some(index) = self.splits.current_index() {
                let diff = self.splits.current_diff(elapsed).map(|d| d.to_text());
                self.display.set_current_diff(index, diff.as_deref());
            }
        }

        // The completed-run check runs on every poll path, as the
        // exactly-once guard makes repeats free.
        self.flush_pending_persist();
    }

    fn on_load(&mut self, load: LoadResult) {
        if load.generation != self.load_generation {
            info!(
                "Discarding superseded split load (generation {} < {})",
                load.generation, self.load_generation
            );
            return;
        }
        match load.result {
            Ok(entries) => {
                self.splits.install(entries);
                self.render_all_rows();
            }
            Err(e) => {
                error!("Failed to load splits: {}", e);
                self.display.alert(&format!("Failed to load splits: {e}"));
                self.display.hide_splits();
            }
        }
    }

    fn request_reload(&mut self) {
        let Some(client) = self.splits_client.clone() else {
            return;
        };
        self.load_generation += 1;
        let generation = self.load_generation;
        let load_tx = self.load_tx.clone();
        debug!("Requesting split load (generation {})", generation);
        tokio::spawn(async move {
            let result = client.load().await;
            let _ = load_tx.send(LoadResult { generation, result }).await;
        });
    }

    fn flush_pending_persist(&mut self) {
        let Some(entries) = self.splits.take_pending_persist() else {
            return;
        };
        let Some(client) = self.splits_client.clone() else {
            debug!("No splits server configured, dropping run results");
            return;
        };
        tokio::spawn(async move {
            if let Err(e) = client.store(&entries).await {
                error!("Failed to persist run results: {}", e);
            }
        });
    }

    fn mirror(&self, command: TimerCommand) {
        let Some(client) = self.remote_timer.clone() else {
            return;
        };
        tokio::spawn(async move {
            if let Err(e) = client.send(command).await {
                warn!("Remote timer mirror failed: {}", e);
            }
        });
    }

    fn mirror_reset(&self) {
        let Some(client) = self.remote_timer.clone() else {
            return;
        };
        tokio::spawn(async move {
            if let Err(e) = client.reset_run().await {
                warn!("Remote timer mirror failed: {}", e);
            }
        });
    }

    fn set_state(&mut self, state: RunState) {
        if self.state != state {
            info!("Run state {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    fn row_for(record: &SplitRecord, current: Option<usize>, index: usize) -> SplitRow {
        let time_text = match record.achieved_ms.or(record.target_ms) {
            Some(t) => format_time(t, t < 60_000, true),
            None => String::new(),
        };
        SplitRow {
            index,
            label: record.label.clone(),
            time_text,
            diff_text: record.diff.map(|d| d.to_text()),
            active: current == Some(index),
        }
    }

    fn render_all_rows(&mut self) {
        if self.splits.is_empty() {
            self.display.hide_splits();
            return;
        }
        let current = self.splits.current_index();
        let rows: Vec<SplitRow> = self
            .splits
            .records()
            .iter()
            .enumerate()
            .map(|(index, record)| Self::row_for(record, current, index))
            .collect();
        for row in &rows {
            self.display.set_split_row(row);
        }
    }
}
