pub mod config;
pub mod display;
pub mod input;
pub mod remote;
pub mod timer;

use color_eyre::{eyre::eyre, Result};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::config::OverlayConfig;
use crate::display::ConsoleDisplay;
use crate::input::{
    parse_key_mask, DeviceProfile, GamepadSettings, GamepadSourceHandle, InputError,
    KeyStreamHandle, KeyStreamSettings,
};
use crate::remote::{RemoteTimerClient, SplitsClient};
use crate::timer::{ClassifierSettings, Clock, ControllerSettings, TimerController};

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config = config::load().await?;
    validate_input_config(&config)?;

    let clock = Clock::new();

    // One press channel shared by every input adapter; the controller is
    // the single consumer.
    let (press_tx, press_rx) = mpsc::channel(256);

    let (button_binding_tx, button_binding_rx) =
        watch::channel(config.input.trigger_button.clone());
    let initial_mask = match &config.input.key_mask {
        Some(text) => parse_key_mask(text)?,
        None => 0,
    };
    let (key_mask_tx, key_mask_rx) = watch::channel(initial_mask);

    let profile_override = match &config.input.profile {
        Some(name) => Some(
            DeviceProfile::by_name(name)
                .ok_or_else(|| eyre!("Unknown device profile '{}'", name))?,
        ),
        None => None,
    };

    let gamepad_handle = if config.input.gamepad {
        let settings = GamepadSettings {
            poll_hz: config.input.gamepad_poll_hz,
            profile_override,
        };
        Some(GamepadSourceHandle::spawn(
            settings,
            clock,
            press_tx.clone(),
            button_binding_rx,
        )?)
    } else {
        info!("Gamepad input disabled by configuration");
        None
    };

    let key_stream_handle = match &config.input.key_stream {
        Some(stream) => {
            let settings = KeyStreamSettings {
                broker_url: stream.broker_url.clone(),
                topic: stream.topic.clone(),
                poll_hz: stream.poll_hz,
                reconnect_timeout_secs: stream.reconnect_timeout_secs,
            };
            Some(KeyStreamHandle::spawn(
                settings,
                clock,
                press_tx.clone(),
                key_mask_rx,
            )?)
        }
        None => None,
    };
    // The adapters hold the remaining senders; with this copy gone, a
    // fully stopped adapter set is observable as a closed press channel.
    drop(press_tx);

    let splits_client = config.splits.server_url.clone().map(SplitsClient::new);
    let remote_timer = config
        .remote_timer
        .as_ref()
        .map(|remote| RemoteTimerClient::new(remote.url.clone()));
    let initial_entries = if config.splits.entries.is_empty() {
        None
    } else {
        Some(config.splits.entries.clone())
    };

    let controller_settings = ControllerSettings {
        display_refresh_hz: config.display.refresh_hz,
        show_millis: config.display.show_millis,
        classifier: ClassifierSettings::default(),
    };

    let controller_handle = TimerController::spawn(
        controller_settings,
        clock,
        Box::new(ConsoleDisplay::new()),
        press_rx,
        button_binding_tx,
        key_mask_tx,
        splits_client,
        remote_timer,
        initial_entries,
    );

    info!("opensplit running, press ctrl-c to exit");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    controller_handle.stop();
    if let Some(handle) = gamepad_handle {
        handle.stop();
    }
    if let Some(handle) = key_stream_handle {
        handle.stop();
    }

    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}

// A trigger that cannot work is a setup error, not something to discover
// mid-run.
fn validate_input_config(config: &OverlayConfig) -> Result<()> {
    if let Some(name) = &config.input.trigger_button {
        let known = match &config.input.profile {
            Some(profile_name) => DeviceProfile::by_name(profile_name)
                .map(|p| p.rule(name).is_some())
                .unwrap_or(false),
            None => DeviceProfile::all().any(|p| p.rule(name).is_some()),
        };
        if !known {
            return Err(InputError::UnknownButton(name.clone()).into());
        }
    }

    if config.input.key_mask.is_some() && config.input.key_stream.is_none() {
        warn!("key_mask is set but no key_stream is configured; the mask will never match");
    }
    if let Some(text) = &config.input.key_mask {
        parse_key_mask(text)?;
    }

    if !config.input.gamepad && config.input.key_stream.is_none() {
        warn!("No input source configured; the timer can only be driven by commands");
    }

    Ok(())
}
