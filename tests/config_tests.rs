use antswitch::config::*;
use antswitch::error::ConfigError;
use antswitch::events::{EventKind, EventLog};
use antswitch::protocol::{
    parse_request, read_request_line, ControlOp, ControlRequest, RequestLine, MAX_REQUEST_SIZE,
};

fn bus_enabled() -> Configuration {
    let mut config = Configuration::default();
    config.mqtt.enabled = true;
    config.mqtt.broker = "broker.local".to_string();
    config
}

#[test]
fn test_defaults() {
    let config = Configuration::default();
    assert_eq!(config.gateway, "192.168.1.1");
    assert_eq!(config.mqtt.port, 1883);
    assert_eq!(config.mqtt.state_topic, "flexpilot/antennaSwitch/state");
    assert!(!config.mqtt.is_active());
    assert!(config.validate().is_ok());

    let settings = DeviceSettings::default();
    assert_eq!(settings.settle_ms, 20);
    assert_eq!(settings.check_interval_ms, 30_000);
    assert_eq!(settings.failure_ceiling, 10);
    assert!(settings.active_high);
}

#[test]
fn test_disabled_bus_skips_bus_validation() {
    let mut config = Configuration::default();
    config.mqtt.port = 0;
    config.mqtt.command_topic = String::new();
    assert!(config.validate().is_ok());
}

#[test]
fn test_enabled_bus_validation() {
    let mut config = bus_enabled();
    assert!(config.validate().is_ok());

    config.mqtt.port = 0;
    assert_eq!(config.validate(), Err(ConfigError::InvalidPort));

    config.mqtt.port = 1883;
    config.mqtt.state_topic = " ".to_string();
    assert_eq!(config.validate(), Err(ConfigError::EmptyTopic("state")));

    config.mqtt.state_topic = "shack/#".to_string();
    assert!(matches!(
        config.validate(),
        Err(ConfigError::WildcardTopic { which: "state", .. })
    ));
}

#[test]
fn test_shared_command_and_state_topic_rejected() {
    let mut config = bus_enabled();
    config.mqtt.command_topic = "shack/switch".to_string();
    config.mqtt.state_topic = "shack/switch ".to_string();
    assert_eq!(
        config.validate(),
        Err(ConfigError::SharedTopic("shack/switch".to_string()))
    );

    // Harmless while the bus is off.
    config.mqtt.enabled = false;
    assert!(config.validate().is_ok());
}

#[test]
fn test_overlong_field_rejected() {
    let mut config = Configuration::default();
    config.wifi.ssid = "x".repeat(MAX_FIELD_LEN + 1);
    assert_eq!(
        config.validate(),
        Err(ConfigError::TooLong {
            field: "ssid",
            max: MAX_FIELD_LEN
        })
    );
}

#[test]
fn test_credentials() {
    let mut settings = MqttSettings::default();
    assert_eq!(settings.credentials(), None);
    settings.username = "op".to_string();
    settings.password = "pw".to_string();
    assert_eq!(settings.credentials(), Some(("op", "pw")));
}

#[test]
fn test_classify_change() {
    let base = bus_enabled();

    assert!(base.classify_change(&base).is_empty());

    let mut wifi = base.clone();
    wifi.wifi.password = "new".to_string();
    let change = base.classify_change(&wifi);
    assert!(change.restart_required && !change.bus_changed && !change.gateway_changed);

    let mut gateway = base.clone();
    gateway.gateway = "10.0.0.1".to_string();
    assert!(base.classify_change(&gateway).gateway_changed);

    let mut bus = base.clone();
    bus.mqtt.port = 8883;
    assert!(base.classify_change(&bus).bus_changed);
}

#[test]
fn test_partial_configuration_json_fills_defaults() {
    let config: Configuration =
        serde_json::from_str(r#"{"mqtt":{"enabled":true,"broker":"b"}}"#).unwrap();
    assert_eq!(config.mqtt.port, DEFAULT_MQTT_PORT);
    assert_eq!(config.mqtt.command_topic, DEFAULT_COMMAND_TOPIC);
    assert_eq!(config.gateway, DEFAULT_GATEWAY);
}

#[test]
fn test_event_log_evicts_oldest() {
    let mut log = EventLog::new();
    for i in 0..70u64 {
        log.record(i, EventKind::BusConnected);
    }

    assert_eq!(log.history().len(), 64);
    assert_eq!(log.history()[0].id, 7);
    assert_eq!(log.last().map(|e| e.id), Some(70));
    assert_eq!(log.recent(3).len(), 3);
    assert_eq!(log.recent(3)[0].timestamp_ms, 67);

    log.clear();
    assert!(log.history().is_empty());
}

#[test]
fn test_event_serialization_is_tagged() {
    let mut log = EventLog::new();
    log.record(5, EventKind::ProbeFailed { failures: 3 });

    let json = serde_json::to_value(log.last().unwrap()).unwrap();
    assert_eq!(json["kind"], "probe_failed");
    assert_eq!(json["failures"], 3);
    assert_eq!(json["timestamp_ms"], 5);
}

#[test]
fn test_request_wire_format() {
    let request = ControlRequest {
        id: 12,
        op: ControlOp::SetAntenna { antenna: 3 },
    };
    let line = serde_json::to_string(&request).unwrap();
    assert_eq!(parse_request(&line).unwrap(), request);

    let request = parse_request(r#"{"op":"get_config"}"#).unwrap();
    assert_eq!(request.id, 0);
    assert_eq!(request.op, ControlOp::GetConfig);

    let oversized = format!(r#"{{"op":"get_state","pad":"{}"}}"#, "x".repeat(5000));
    assert!(parse_request(&oversized).is_err());
}

#[tokio::test]
async fn test_request_lines_are_read_within_limit() {
    let stream = format!(
        "{{\"op\":\"get_state\"}}\n{}\n{{\"id\":2,\"op\":\"status\"}}",
        "x".repeat(3 * MAX_REQUEST_SIZE)
    );
    let mut reader = stream.as_bytes();

    let first = read_request_line(&mut reader).await.unwrap();
    assert_eq!(first, Some(RequestLine::Line("{\"op\":\"get_state\"}\n".to_string())));

    let oversized = read_request_line(&mut reader).await.unwrap();
    assert_eq!(oversized, Some(RequestLine::TooLarge));

    // The oversized line is skipped entirely; the next request still parses.
    match read_request_line(&mut reader).await.unwrap() {
        Some(RequestLine::Line(line)) => assert_eq!(parse_request(&line).unwrap().id, 2),
        other => panic!("unexpected {:?}", other),
    }

    assert_eq!(read_request_line(&mut reader).await.unwrap(), None);
}
