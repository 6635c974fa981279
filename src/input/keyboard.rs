use std::time::Duration;

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{InputError, PressEvent, TriggerEdge};
use crate::timer::Clock;

/// Settings for the keyboard bit-mask stream.
#[derive(Clone, Debug)]
pub struct KeyStreamSettings {
    /// Broker address as `host` or `host:port`.
    pub broker_url: String,
    /// Topic the key logger publishes its masks on.
    pub topic: String,
    /// Rate at which the latest mask is re-evaluated, in Hz.
    pub poll_hz: u32,
    /// How long reconnection may be retried before the stream is torn
    /// down for good.
    pub reconnect_timeout_secs: u64,
}

impl Default for KeyStreamSettings {
    fn default() -> Self {
        Self {
            broker_url: "localhost:1883".to_string(),
            topic: "keys/state".to_string(),
            poll_hz: 20,
            reconnect_timeout_secs: 600,
        }
    }
}

/// Connection lifecycle of the stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
}

/// Parse one key-logger message: a hex string where nibble `i` holds bits
/// `4*i..4*i+4` of the mask (least significant nibble first).
fn parse_mask_message(payload: &[u8]) -> Result<u32, InputError> {
    let text = std::str::from_utf8(payload)
        .map_err(|_| InputError::BadKeyMask("<non-utf8 payload>".to_string()))?
        .trim();
    let mut mask = 0u32;
    for (i, c) in text.chars().enumerate() {
        if i >= 8 {
            break;
        }
        let digit = c
            .to_digit(16)
            .ok_or_else(|| InputError::BadKeyMask(text.to_string()))?;
        mask |= digit << (4 * i as u32);
    }
    Ok(mask)
}

/// Handle for the keyboard bit-mask stream.
///
/// Two tasks cooperate: a connection task owns the broker session and
/// publishes the most recent mask into a watch channel (any backlog of
/// intermediate messages is discarded by construction), and an evaluation
/// task re-checks that latest mask at a fixed rate, emitting press
/// signals on satisfaction changes.
///
/// A trigger is satisfied while every configured bit is set in the latest
/// mask; extra bits are ignored. A configured mask of zero disables the
/// stream's trigger entirely.
pub struct KeyStreamHandle {
    cancel: CancellationToken,
}

impl KeyStreamHandle {
    pub fn spawn(
        settings: KeyStreamSettings,
        clock: Clock,
        event_sender: mpsc::Sender<PressEvent>,
        mask_rx: watch::Receiver<u32>,
    ) -> Result<Self, InputError> {
        info!("Spawning key stream with settings: {:?}", settings);

        let parts: Vec<&str> = settings.broker_url.split(':').collect();
        let host = parts
            .first()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| InputError::ConnectionError("empty broker address".to_string()))?
            .to_string();
        let port: u16 = parts
            .get(1)
            .unwrap_or(&"1883")
            .parse()
            .map_err(|_| InputError::ConnectionError(settings.broker_url.clone()))?;

        let mut options = MqttOptions::new("opensplit-keys", host, port);
        options.set_keep_alive(Duration::from_secs(5));
        let (client, eventloop) = AsyncClient::new(options, 100);

        let cancel = CancellationToken::new();
        let (latest_tx, latest_rx) = watch::channel(0u32);

        let conn_token = cancel.clone();
        let topic = settings.topic.clone();
        let timeout = Duration::from_secs(settings.reconnect_timeout_secs);
        tokio::spawn(async move {
            run_connection(client, eventloop, topic, timeout, latest_tx, conn_token).await;
        });

        let eval_token = cancel.clone();
        let poll_hz = settings.poll_hz;
        tokio::spawn(async move {
            run_evaluation(poll_hz, clock, event_sender, latest_rx, mask_rx, eval_token).await;
        });

        Ok(Self { cancel })
    }

    /// Tear the stream down. A torn-down stream is not restarted
    /// implicitly; spawn a new handle to reconnect.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

// Owns the broker session. Every received message replaces the previous
// one in the watch channel, so the evaluation side only ever sees the
// most recent mask.
async fn run_connection(
    client: AsyncClient,
    mut eventloop: rumqttc::EventLoop,
    topic: String,
    reconnect_timeout: Duration,
    latest_tx: watch::Sender<u32>,
    cancel: CancellationToken,
) {
    let mut state = ConnectionState::Disconnected;
    let mut down_since: Option<Instant> = None;

    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => {
                info!("Key stream connection task cancelled");
                return;
            }
            event = eventloop.poll() => event,
        };

        match event {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("Key stream connected, subscribing to '{}'", topic);
                state = ConnectionState::Connected;
                down_since = None;
                if let Err(e) = client.subscribe(topic.as_str(), QoS::AtMostOnce).await {
                    error!("Failed to subscribe to '{}': {}", topic, e);
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                match parse_mask_message(&publish.payload) {
                    Ok(mask) => {
                        debug!("Key mask update: {:#010x}", mask);
                        let _ = latest_tx.send(mask);
                    }
                    Err(e) => warn!("Ignoring malformed key mask message: {}", e),
                }
            }
            Ok(_) => {}
            Err(e) => {
                match state {
                    ConnectionState::Connected => warn!("Key stream connection lost: {}", e),
                    ConnectionState::Disconnected => {
                        debug!("Key stream connection attempt failed: {}", e)
                    }
                }
                state = ConnectionState::Disconnected;
                let since = *down_since.get_or_insert_with(Instant::now);
                if since.elapsed() >= reconnect_timeout {
                    error!(
                        "Key stream could not reconnect within {:?}, tearing down",
                        reconnect_timeout
                    );
                    cancel.cancel();
                    return;
                }
                // All keys read as released while the stream is down.
                let _ = latest_tx.send(0);
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

// Fixed-rate evaluation of the latest mask against the configured
// trigger combination.
async fn run_evaluation(
    poll_hz: u32,
    clock: Clock,
    event_sender: mpsc::Sender<PressEvent>,
    latest_rx: watch::Receiver<u32>,
    mut mask_rx: watch::Receiver<u32>,
    cancel: CancellationToken,
) {
    let period = Duration::from_millis(1000 / u64::from(poll_hz.max(1)));
    let mut ticker = tokio::time::interval(period);
    let mut edge = TriggerEdge::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Key stream evaluation task cancelled");
                return;
            }
            _ = ticker.tick() => {}
        }

        // Rebinding clears the edge state only.
        if mask_rx.has_changed().unwrap_or(false) {
            mask_rx.mark_unchanged();
            edge.rearm();
        }

        let configured = *mask_rx.borrow();
        if configured == 0 {
            continue;
        }

        let latest = *latest_rx.borrow();
        let satisfied = (latest & configured) == configured;
        if let Some(kind) = edge.update(satisfied) {
            let event = PressEvent {
                kind,
                at_ms: clock.now_ms(),
            };
            if event_sender.try_send(event).is_err() {
                warn!("Press event channel unavailable, dropping {:?}", event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_message_nibbles_are_least_significant_first() {
        assert_eq!(parse_mask_message(b"1").unwrap(), 0x1);
        assert_eq!(parse_mask_message(b"01").unwrap(), 0x10);
        assert_eq!(parse_mask_message(b"21").unwrap(), 0x12);
        assert_eq!(parse_mask_message(b"00000008").unwrap(), 0x8000_0000);
        // Only 32 bits are honored; trailing nibbles are dropped.
        assert_eq!(parse_mask_message(b"000000001").unwrap(), 0);
    }

    #[test]
    fn mask_message_rejects_junk() {
        assert!(parse_mask_message(b"xyz").is_err());
        assert!(parse_mask_message(&[0xff, 0xfe]).is_err());
    }

    #[test]
    fn empty_message_reads_as_all_released() {
        assert_eq!(parse_mask_message(b"").unwrap(), 0);
    }

    #[test]
    fn all_configured_bits_must_be_set() {
        let configured = 0b0110u32;
        assert_eq!(0b0110 & configured, configured);
        assert_eq!(0b1111 & configured, configured);
        assert_ne!(0b0010 & configured, configured);
    }
}
