//! Message bus session.
//!
//! The session is an explicit three-state machine. Every entry into
//! `Connected` subscribes to the command topic and then republishes the
//! current selection as a retained message, which is how remote observers
//! resynchronize after a broker restart or a network blip.

use crate::config::{DeviceSettings, MqttSettings};
use crate::controller::StatePublisher;
use crate::error::BusError;
use crate::hal::{BusClient, ConnectOptions, InboundMessage};
use crate::selection::AntennaSelection;
use core::time::Duration;
use heapless::Vec;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub const MAX_COMMANDS_PER_POLL: usize = 8;

pub type CommandBatch = Vec<AntennaSelection, MAX_COMMANDS_PER_POLL>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

/// State change observed during a step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionTransition {
    Connected,
    ConnectFailed(BusError),
    Dropped,
}

/// Result of one reconnect-or-service step
#[derive(Debug, Default)]
pub struct StepOutcome {
    pub transition: Option<SessionTransition>,
    /// Accepted commands, in arrival order
    pub commands: CommandBatch,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    pub connects: u32,
    pub failed_attempts: u32,
    pub drops: u32,
    pub commands_accepted: u32,
    pub messages_ignored: u32,
}

#[derive(Debug)]
pub struct BusSession<C> {
    client: C,
    settings: MqttSettings,
    client_id: String,
    antenna_count: u8,
    connect_timeout: Duration,
    retry_interval_ms: u64,
    state: SessionState,
    last_attempt_ms: Option<u64>,
    stats: SessionStats,
}

impl<C: BusClient> BusSession<C> {
    /// Connection attempts are paced at the health-check interval.
    pub fn new(
        client: C,
        settings: MqttSettings,
        device: &DeviceSettings,
        antenna_count: u8,
    ) -> Self {
        Self {
            client,
            settings,
            client_id: device.client_id.clone(),
            antenna_count,
            connect_timeout: Duration::from_millis(device.bus_connect_timeout_ms),
            retry_interval_ms: device.check_interval_ms,
            state: SessionState::Disconnected,
            last_attempt_ms: None,
            stats: SessionStats::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    pub fn settings(&self) -> &MqttSettings {
        &self.settings
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "bus session transition");
            self.state = next;
        }
    }

    fn attempt_due(&self, now_ms: u64) -> bool {
        match self.last_attempt_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) >= self.retry_interval_ms,
        }
    }

    /// Reconnect-or-service step for the control loop.
    ///
    /// Disconnected: attempts a connection if the retry interval has passed.
    /// Connected: checks liveness and drains inbound commands. Inactive
    /// settings keep the session disconnected with no network activity.
    pub fn step(&mut self, now_ms: u64, selection: AntennaSelection) -> StepOutcome {
        if !self.settings.is_active() {
            if self.state != SessionState::Disconnected {
                self.client.disconnect();
                self.transition(SessionState::Disconnected);
            }
            return StepOutcome::default();
        }

        match self.state {
            SessionState::Connected => self.service(),
            SessionState::Disconnected | SessionState::Connecting => {
                if !self.attempt_due(now_ms) {
                    return StepOutcome::default();
                }
                let transition = match self.connect(now_ms, selection) {
                    Ok(()) => SessionTransition::Connected,
                    Err(e) => SessionTransition::ConnectFailed(e),
                };
                StepOutcome {
                    transition: Some(transition),
                    commands: CommandBatch::new(),
                }
            }
        }
    }

    /// One bounded connection attempt, followed by subscribe and the
    /// retained-state resync. Any failure leaves the session disconnected.
    pub fn connect(&mut self, now_ms: u64, selection: AntennaSelection) -> Result<(), BusError> {
        self.last_attempt_ms = Some(now_ms);
        self.transition(SessionState::Connecting);

        let options = ConnectOptions {
            client_id: &self.client_id,
            broker: self.settings.broker.trim(),
            port: self.settings.port,
            username: self.settings.credentials().map(|(user, _)| user),
            password: self.settings.credentials().map(|(_, pass)| pass),
            timeout: self.connect_timeout,
        };

        let payload = selection.to_payload();
        let result = self
            .client
            .connect(&options)
            .and_then(|()| self.client.subscribe(&self.settings.command_topic))
            .and_then(|()| {
                self.client
                    .publish(&self.settings.state_topic, payload.as_bytes(), true)
            });

        match result {
            Ok(()) => {
                self.transition(SessionState::Connected);
                self.stats.connects = self.stats.connects.saturating_add(1);
                info!(
                    broker = %self.settings.broker,
                    port = self.settings.port,
                    state = %payload,
                    "bus session connected"
                );
                Ok(())
            }
            Err(e) => {
                self.client.disconnect();
                self.transition(SessionState::Disconnected);
                self.stats.failed_attempts = self.stats.failed_attempts.saturating_add(1);
                warn!(broker = %self.settings.broker, error = %e, "bus connect failed");
                Err(e)
            }
        }
    }

    fn service(&mut self) -> StepOutcome {
        if !self.client.is_connected() {
            self.mark_dropped();
            return StepOutcome {
                transition: Some(SessionTransition::Dropped),
                commands: CommandBatch::new(),
            };
        }

        match self.client.poll() {
            Ok(messages) => StepOutcome {
                transition: None,
                commands: self.decode(messages),
            },
            Err(e) => {
                debug!(error = %e, "bus poll failed");
                self.mark_dropped();
                StepOutcome {
                    transition: Some(SessionTransition::Dropped),
                    commands: CommandBatch::new(),
                }
            }
        }
    }

    fn decode(&mut self, messages: std::vec::Vec<InboundMessage>) -> CommandBatch {
        let mut commands = CommandBatch::new();
        for message in messages {
            if message.topic != self.settings.command_topic {
                self.stats.messages_ignored = self.stats.messages_ignored.saturating_add(1);
                continue;
            }

            let decoded = core::str::from_utf8(&message.payload)
                .ok()
                .and_then(|text| AntennaSelection::from_command(text, self.antenna_count));

            match decoded {
                Some(selection) => {
                    if commands.push(selection).is_err() {
                        warn!("command burst exceeds {}, dropping", MAX_COMMANDS_PER_POLL);
                        self.stats.messages_ignored =
                            self.stats.messages_ignored.saturating_add(1);
                    } else {
                        self.stats.commands_accepted =
                            self.stats.commands_accepted.saturating_add(1);
                    }
                }
                None => {
                    debug!(
                        payload = %String::from_utf8_lossy(&message.payload),
                        "ignoring unrecognized command"
                    );
                    self.stats.messages_ignored = self.stats.messages_ignored.saturating_add(1);
                }
            }
        }
        commands
    }

    // A drop clears the pacing clock so the first reconnect is immediate.
    fn mark_dropped(&mut self) {
        self.client.disconnect();
        self.transition(SessionState::Disconnected);
        self.last_attempt_ms = None;
        self.stats.drops = self.stats.drops.saturating_add(1);
        warn!(broker = %self.settings.broker, "bus session dropped");
    }

    /// Replaces the settings, tearing down the current session if they
    /// differ. The next step reconnects with the new settings.
    pub fn reconfigure(&mut self, settings: MqttSettings) {
        if settings == self.settings {
            return;
        }
        if self.state != SessionState::Disconnected {
            self.client.disconnect();
            self.transition(SessionState::Disconnected);
        }
        self.settings = settings;
        self.last_attempt_ms = None;
        info!(
            active = self.settings.is_active(),
            broker = %self.settings.broker,
            "bus settings changed, session rebuilt"
        );
    }

    pub fn disconnect(&mut self) {
        if self.state != SessionState::Disconnected {
            self.client.disconnect();
            self.transition(SessionState::Disconnected);
        }
    }
}

impl<C: BusClient> StatePublisher for BusSession<C> {
    fn publish_state(&mut self, selection: AntennaSelection) -> bool {
        if self.state != SessionState::Connected {
            return false;
        }

        let payload = selection.to_payload();
        match self
            .client
            .publish(&self.settings.state_topic, payload.as_bytes(), true)
        {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "state publish failed");
                self.mark_dropped();
                false
            }
        }
    }
}
