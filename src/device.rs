use crate::config::{ConfigChange, Configuration, DeviceSettings};
use crate::controller::AntennaController;
use crate::error::ConfigError;
use crate::events::{CommandSource, EventKind, EventLog, EventRecord, RestartReason};
use crate::hal::{BusClient, Delay, KeyValueStore, NetworkLink, RelayOutputs, SystemControl};
use crate::relay::RelayDriver;
use crate::selection::{AntennaSelection, MAX_ANTENNAS};
use crate::session::{BusSession, SessionState, SessionStats, SessionTransition};
use crate::store::StateStore;
use crate::supervisor::{ConnectivityHealth, ConnectivitySupervisor, SupervisorAction};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

const STATUS_EVENT_COUNT: usize = 16;

/// The hardware and network handles a device is built from
#[derive(Debug)]
pub struct Parts<O, D, S, C, L, R> {
    pub outputs: O,
    pub delay: D,
    pub storage: S,
    pub bus: C,
    pub link: L,
    pub system: R,
}

/// What one control-loop tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub supervisor: SupervisorAction,
    pub session: Option<SessionTransition>,
    pub commands_applied: usize,
    pub restarting: bool,
}

/// Point-in-time view for the control surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub antenna: AntennaSelection,
    pub antenna_count: u8,
    pub bus_state: SessionState,
    pub bus_stats: SessionStats,
    pub link_associated: bool,
    pub health: ConnectivityHealth,
    pub uptime_ms: u64,
    pub restart_pending: bool,
    pub storage_write_failures: u32,
    pub recent_events: Vec<EventRecord>,
}

/// The antenna switch: sole owner of selection, configuration, bus session
/// and link health.
///
/// All mutation goes through `&mut self`, so the single-writer discipline is
/// enforced by ownership. A multi-threaded host wraps the whole device in
/// one mutex.
#[derive(Debug)]
pub struct AntennaSwitch<O, D, S, C, L, R> {
    controller: AntennaController<O, D, S>,
    session: BusSession<C>,
    supervisor: ConnectivitySupervisor,
    link: L,
    system: R,
    events: EventLog,
    boot_ms: u64,
    now_ms: u64,
    restart_pending: bool,
}

impl<O, D, S, C, L, R> AntennaSwitch<O, D, S, C, L, R>
where
    O: RelayOutputs,
    D: Delay,
    S: KeyValueStore,
    C: BusClient,
    L: NetworkLink,
    R: SystemControl,
{
    /// Boot sequence: restore the persisted selection onto the hardware
    /// before any network activity, then associate and advertise. The bus
    /// session is left disconnected for the first control-loop tick.
    pub fn boot(parts: Parts<O, D, S, C, L, R>, settings: &DeviceSettings, now_ms: u64) -> Self {
        let Parts {
            outputs,
            delay,
            storage,
            bus,
            mut link,
            system,
        } = parts;

        let antenna_count = outputs.channel_count().min(MAX_ANTENNAS);
        let driver = RelayDriver::new(outputs, delay, settings.active_high, settings.settle_ms);
        let store = StateStore::new(storage, antenna_count);
        let mut controller = AntennaController::new(driver, store);

        let (selection, config) = controller.restore();

        let mut supervisor = ConnectivitySupervisor::new(settings, now_ms);
        let associated = supervisor.connect_initial(&mut link, &config.wifi);

        let session = BusSession::new(bus, config.mqtt.clone(), settings, antenna_count);

        let mut events = EventLog::new();
        events.record(
            now_ms,
            EventKind::Boot {
                selection,
                associated,
            },
        );

        info!(
            antennas = antenna_count,
            selection = %selection,
            associated,
            bus_active = config.mqtt.is_active(),
            "antenna switch booted"
        );

        Self {
            controller,
            session,
            supervisor,
            link,
            system,
            events,
            boot_ms: now_ms,
            now_ms,
            restart_pending: false,
        }
    }

    /// Runs the supervisor check and then the bus reconnect-or-service step.
    pub fn tick(&mut self, now_ms: u64) -> TickReport {
        self.now_ms = now_ms;

        if self.restart_pending {
            return TickReport {
                supervisor: SupervisorAction::Idle,
                session: None,
                commands_applied: 0,
                restarting: true,
            };
        }

        let action = self.supervisor.check(
            now_ms,
            &mut self.link,
            self.controller.store().configuration(),
        );

        match action {
            SupervisorAction::Restart { failures } => {
                self.events
                    .record(now_ms, EventKind::ProbeFailed { failures });
                self.request_restart(RestartReason::LinkUnrecoverable);
                return TickReport {
                    supervisor: action,
                    session: None,
                    commands_applied: 0,
                    restarting: true,
                };
            }
            SupervisorAction::Degraded { failures } => {
                self.events
                    .record(now_ms, EventKind::ProbeFailed { failures });
            }
            SupervisorAction::Recovered => {
                self.events.record(now_ms, EventKind::LinkRecovered);
            }
            SupervisorAction::Idle | SupervisorAction::Healthy => {}
        }

        let outcome = self.session.step(now_ms, self.controller.selection());

        match &outcome.transition {
            Some(SessionTransition::Connected) => {
                self.events.record(now_ms, EventKind::BusConnected);
            }
            Some(SessionTransition::Dropped) => {
                self.events.record(now_ms, EventKind::BusDropped);
            }
            Some(SessionTransition::ConnectFailed(e)) => {
                self.events.record(
                    now_ms,
                    EventKind::BusConnectFailed {
                        reason: e.to_string(),
                    },
                );
            }
            None => {}
        }

        let commands_applied = outcome.commands.len();
        for selection in outcome.commands {
            self.apply(i64::from(selection.value()), CommandSource::Bus);
        }

        TickReport {
            supervisor: action,
            session: outcome.transition,
            commands_applied,
            restarting: false,
        }
    }

    fn apply(&mut self, requested: i64, source: CommandSource) -> AntennaSelection {
        let from = self.controller.selection();
        let failures_before = self.controller.store().write_failures();

        let to = self.controller.set_antenna(requested, &mut self.session);

        if self.controller.store().write_failures() != failures_before {
            self.events.record(self.now_ms, EventKind::StorageWriteFailed);
        }
        if from != to {
            self.events
                .record(self.now_ms, EventKind::AntennaChanged { from, to, source });
        }
        to
    }

    pub fn get_state(&self) -> AntennaSelection {
        self.controller.selection()
    }

    /// Control-surface selection request; see [`AntennaController::set_antenna`].
    pub fn set_antenna(&mut self, requested: i64) -> AntennaSelection {
        self.apply(requested, CommandSource::ControlSurface)
    }

    pub fn get_configuration(&self) -> &Configuration {
        self.controller.store().configuration()
    }

    /// Validates, persists and applies a new configuration.
    ///
    /// Bus changes rebuild the session immediately. Network credential
    /// changes are stored but only take effect after a restart, which the
    /// returned [`ConfigChange`] reports.
    pub fn set_configuration(&mut self, config: Configuration) -> Result<ConfigChange, ConfigError> {
        config.validate()?;

        let change = self.get_configuration().classify_change(&config);
        if !self.controller.store_mut().save_configuration(&config) {
            self.events.record(self.now_ms, EventKind::StorageWriteFailed);
        }

        if change.bus_changed {
            self.session.reconfigure(config.mqtt.clone());
        }
        if change.restart_required {
            info!("network credentials changed, effective after restart");
        }
        if !change.is_empty() {
            self.events
                .record(self.now_ms, EventKind::ConfigChanged { change });
        }

        Ok(change)
    }

    /// Operator-requested restart through the same path as escalation.
    pub fn restart(&mut self) {
        self.request_restart(RestartReason::Operator);
    }

    /// Outcome of an external firmware upload. Success restarts into the
    /// new image; failure leaves everything as it was.
    pub fn firmware_update_finished(&mut self, result: Result<(), String>) {
        match result {
            Ok(()) => self.request_restart(RestartReason::FirmwareUpdated),
            Err(reason) => {
                warn!(%reason, "firmware update failed, keeping current image");
                self.events
                    .record(self.now_ms, EventKind::FirmwareUpdateFailed { reason });
            }
        }
    }

    fn request_restart(&mut self, reason: RestartReason) {
        if self.restart_pending {
            return;
        }
        self.restart_pending = true;
        self.events
            .record(self.now_ms, EventKind::RestartRequested { reason });
        error!(?reason, "restarting device");
        self.session.disconnect();
        self.system.restart();
    }

    pub fn restart_pending(&self) -> bool {
        self.restart_pending
    }

    pub fn status(&self) -> DeviceStatus {
        DeviceStatus {
            antenna: self.controller.selection(),
            antenna_count: self.controller.antenna_count(),
            bus_state: self.session.state(),
            bus_stats: self.session.stats(),
            link_associated: self.link.is_associated(),
            health: self.supervisor.health(),
            uptime_ms: self.now_ms.saturating_sub(self.boot_ms),
            restart_pending: self.restart_pending,
            storage_write_failures: self.controller.store().write_failures(),
            recent_events: self.events.recent(STATUS_EVENT_COUNT).to_vec(),
        }
    }

    pub fn antenna_count(&self) -> u8 {
        self.controller.antenna_count()
    }

    pub fn session(&self) -> &BusSession<C> {
        &self.session
    }

    pub fn health(&self) -> ConnectivityHealth {
        self.supervisor.health()
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn store(&self) -> &StateStore<S> {
        self.controller.store()
    }
}
