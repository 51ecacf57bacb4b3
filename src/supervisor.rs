use crate::config::{Configuration, DeviceSettings, WifiSettings};
use crate::hal::NetworkLink;
use core::time::Duration;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// Link health bookkeeping. Lives only in memory; a restart resets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectivityHealth {
    pub last_check_ms: u64,
    pub consecutive_failures: u8,
    pub failure_ceiling: u8,
}

/// What a health check concluded and what the caller must do about it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorAction {
    /// Interval not yet elapsed, nothing was checked
    Idle,
    /// Probe succeeded
    Healthy,
    /// Probe failed, then the reconnect succeeded and a fresh probe passed
    Recovered,
    /// Probe failed and the link is still not usable: either the reconnect
    /// failed, or it reassociated but the gateway probe failed again.
    /// Association alone does not reset the failure count.
    Degraded { failures: u8 },
    /// Failure ceiling reached, the device must restart
    Restart { failures: u8 },
}

/// Periodic link health checker with an escalation ladder:
/// probe, then reconnect, then full restart once failures hit the ceiling.
#[derive(Debug)]
pub struct ConnectivitySupervisor {
    health: ConnectivityHealth,
    interval_ms: u64,
    probe_timeout: Duration,
    reconnect_timeout: Duration,
    hostname: String,
}

impl ConnectivitySupervisor {
    /// The first check runs one interval after `now_ms`.
    pub fn new(device: &DeviceSettings, now_ms: u64) -> Self {
        Self {
            health: ConnectivityHealth {
                last_check_ms: now_ms,
                consecutive_failures: 0,
                failure_ceiling: device.failure_ceiling.max(1),
            },
            interval_ms: device.check_interval_ms,
            probe_timeout: Duration::from_millis(device.probe_timeout_ms),
            reconnect_timeout: Duration::from_millis(device.reconnect_timeout_ms),
            hostname: device.hostname.clone(),
        }
    }

    pub fn health(&self) -> ConnectivityHealth {
        self.health
    }

    /// Boot-time association followed by the discovery advertisement.
    pub fn connect_initial<L: NetworkLink>(&mut self, link: &mut L, wifi: &WifiSettings) -> bool {
        match link.associate(&wifi.ssid, &wifi.password, &self.hostname, self.reconnect_timeout) {
            Ok(()) => {
                info!(ssid = %wifi.ssid, hostname = %self.hostname, "network associated");
                self.advertise(link);
                true
            }
            Err(e) => {
                warn!(ssid = %wifi.ssid, error = %e, "initial association failed");
                false
            }
        }
    }

    fn advertise<L: NetworkLink>(&self, link: &mut L) {
        if let Err(e) = link.advertise(&self.hostname) {
            warn!(error = %e, "discovery advertisement failed");
        }
    }

    fn probe<L: NetworkLink>(&self, link: &mut L, gateway: &str) -> bool {
        if !link.is_associated() {
            return false;
        }
        let target = gateway.trim();
        if target.is_empty() {
            // Nothing to probe; association is the best evidence available.
            return true;
        }
        link.probe(target, self.probe_timeout)
    }

    /// Runs a health check if the interval has elapsed since the last one.
    ///
    /// Safe to call on every loop iteration: between intervals it returns
    /// [`SupervisorAction::Idle`] without touching the link.
    pub fn check<L: NetworkLink>(
        &mut self,
        now_ms: u64,
        link: &mut L,
        config: &Configuration,
    ) -> SupervisorAction {
        if now_ms.saturating_sub(self.health.last_check_ms) < self.interval_ms {
            return SupervisorAction::Idle;
        }
        self.health.last_check_ms = now_ms;

        if self.probe(link, &config.gateway) {
            if self.health.consecutive_failures > 0 {
                info!(
                    previous_failures = self.health.consecutive_failures,
                    "link healthy again"
                );
            }
            self.health.consecutive_failures = 0;
            return SupervisorAction::Healthy;
        }

        self.health.consecutive_failures = self.health.consecutive_failures.saturating_add(1);
        let failures = self.health.consecutive_failures;
        warn!(
            failures,
            ceiling = self.health.failure_ceiling,
            gateway = %config.gateway,
            "link health probe failed"
        );

        if failures >= self.health.failure_ceiling {
            error!(failures, "link unrecoverable, restart required");
            return SupervisorAction::Restart { failures };
        }

        link.disassociate();
        let reassociated = link.associate(
            &config.wifi.ssid,
            &config.wifi.password,
            &self.hostname,
            self.reconnect_timeout,
        );

        // Association alone is not recovery: a black-holed link associates
        // fine, so the probe has to pass again too.
        match reassociated {
            Ok(()) if self.probe(link, &config.gateway) => {
                info!(after_failures = failures, "link recovered by reconnect");
                self.health.consecutive_failures = 0;
                self.advertise(link);
                SupervisorAction::Recovered
            }
            Ok(()) => {
                warn!(failures, "reassociated but gateway still unreachable");
                SupervisorAction::Degraded { failures }
            }
            Err(e) => {
                warn!(failures, error = %e, "reconnect failed");
                SupervisorAction::Degraded { failures }
            }
        }
    }
}
