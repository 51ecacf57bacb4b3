use antswitch::config::{Configuration, DeviceSettings, WifiSettings};
use antswitch::hal::mock::MockLink;
use antswitch::supervisor::*;

const INTERVAL: u64 = 30_000;

fn config() -> Configuration {
    Configuration {
        wifi: WifiSettings {
            ssid: "shack".to_string(),
            password: "secret".to_string(),
        },
        ..Configuration::default()
    }
}

fn booted() -> (ConnectivitySupervisor, MockLink) {
    let mut link = MockLink::new();
    let mut supervisor = ConnectivitySupervisor::new(&DeviceSettings::default(), 0);
    assert!(supervisor.connect_initial(&mut link, &config().wifi));
    (supervisor, link)
}

#[test]
fn test_initial_connect_advertises_hostname() {
    let (_, link) = booted();

    assert_eq!(link.advertised(), vec!["flexpilot-switch".to_string()]);
    assert_eq!(link.last_hostname().as_deref(), Some("flexpilot-switch"));
}

#[test]
fn test_initial_connect_without_ssid_fails() {
    let mut link = MockLink::new();
    let mut supervisor = ConnectivitySupervisor::new(&DeviceSettings::default(), 0);

    assert!(!supervisor.connect_initial(&mut link, &WifiSettings::default()));
    assert!(link.advertised().is_empty());
}

#[test]
fn test_check_is_self_clocked() {
    let (mut supervisor, mut link) = booted();
    let config = config();

    assert_eq!(supervisor.check(0, &mut link, &config), SupervisorAction::Idle);
    assert_eq!(supervisor.check(INTERVAL - 1, &mut link, &config), SupervisorAction::Idle);
    assert_eq!(link.probes(), 0);

    assert_eq!(supervisor.check(INTERVAL, &mut link, &config), SupervisorAction::Healthy);
    assert_eq!(link.probes(), 1);
    assert_eq!(supervisor.health().last_check_ms, INTERVAL);

    assert_eq!(supervisor.check(INTERVAL + 10, &mut link, &config), SupervisorAction::Idle);
    assert_eq!(link.probes(), 1);
}

#[test]
fn test_failed_probe_triggers_reconnect_and_recovers() {
    let (mut supervisor, mut link) = booted();
    let config = config();
    link.force_associated(false);

    let action = supervisor.check(INTERVAL, &mut link, &config);

    assert_eq!(action, SupervisorAction::Recovered);
    assert_eq!(supervisor.health().consecutive_failures, 0);
    assert_eq!(link.disassociate_calls(), 1);
    assert_eq!(link.associate_calls(), 2);
    // Re-advertised after recovery.
    assert_eq!(link.advertised().len(), 2);
}

#[test]
fn test_unreachable_access_point_degrades() {
    let (mut supervisor, mut link) = booted();
    let config = config();
    link.set_access_point(false);

    let action = supervisor.check(INTERVAL, &mut link, &config);

    assert_eq!(action, SupervisorAction::Degraded { failures: 1 });
    assert_eq!(supervisor.health().consecutive_failures, 1);
}

#[test]
fn test_restart_exactly_at_ceiling() {
    let (mut supervisor, mut link) = booted();
    let config = config();
    link.set_access_point(false);

    for i in 1..10u8 {
        let action = supervisor.check(INTERVAL * u64::from(i), &mut link, &config);
        assert_eq!(action, SupervisorAction::Degraded { failures: i });
    }
    let reconnects_before = link.associate_calls();

    let action = supervisor.check(INTERVAL * 10, &mut link, &config);

    assert_eq!(action, SupervisorAction::Restart { failures: 10 });
    // No reconnect attempt on the escalating cycle.
    assert_eq!(link.associate_calls(), reconnects_before);
}

#[test]
fn test_success_resets_counter() {
    let (mut supervisor, mut link) = booted();
    let config = config();
    link.set_access_point(false);

    for i in 1..=5u8 {
        supervisor.check(INTERVAL * u64::from(i), &mut link, &config);
    }
    assert_eq!(supervisor.health().consecutive_failures, 5);

    link.set_access_point(true);
    assert_eq!(
        supervisor.check(INTERVAL * 6, &mut link, &config),
        SupervisorAction::Recovered
    );
    assert_eq!(supervisor.health().consecutive_failures, 0);

    // A fresh outage needs the full ceiling again.
    link.set_access_point(false);
    for i in 7..16u64 {
        assert!(matches!(
            supervisor.check(INTERVAL * i, &mut link, &config),
            SupervisorAction::Degraded { .. }
        ));
    }
    assert!(matches!(
        supervisor.check(INTERVAL * 16, &mut link, &config),
        SupervisorAction::Restart { .. }
    ));
}

#[test]
fn test_black_holed_link_escalates() {
    let (mut supervisor, mut link) = booted();
    let config = config();
    link.set_forwarding(false);

    let mut last = SupervisorAction::Idle;
    for i in 1..=10u64 {
        last = supervisor.check(INTERVAL * i, &mut link, &config);
    }

    assert_eq!(last, SupervisorAction::Restart { failures: 10 });
}

#[test]
fn test_empty_gateway_trusts_association() {
    let (mut supervisor, mut link) = booted();
    let config = Configuration {
        gateway: String::new(),
        ..config()
    };
    link.set_forwarding(false);

    assert_eq!(supervisor.check(INTERVAL, &mut link, &config), SupervisorAction::Healthy);
    assert_eq!(link.probes(), 0);
}

#[test]
fn test_custom_ceiling() {
    let settings = DeviceSettings {
        failure_ceiling: 2,
        check_interval_ms: 1_000,
        ..DeviceSettings::default()
    };
    let mut link = MockLink::new();
    let mut supervisor = ConnectivitySupervisor::new(&settings, 500);
    let config = config();
    link.set_access_point(false);

    assert_eq!(supervisor.check(1_499, &mut link, &config), SupervisorAction::Idle);
    assert_eq!(
        supervisor.check(1_500, &mut link, &config),
        SupervisorAction::Degraded { failures: 1 }
    );
    assert_eq!(
        supervisor.check(2_500, &mut link, &config),
        SupervisorAction::Restart { failures: 2 }
    );
}
