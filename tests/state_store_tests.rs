use antswitch::config::{Configuration, DEFAULT_COMMAND_TOPIC, DEFAULT_GATEWAY, DEFAULT_MQTT_PORT};
use antswitch::hal::mock::MemoryStore;
use antswitch::hal::{FileStore, KeyValueStore, StoredValue};
use antswitch::selection::AntennaSelection;
use antswitch::store::{keys, StateStore};
use antswitch::error::StorageError;

fn configured() -> Configuration {
    let mut config = Configuration::default();
    config.wifi.ssid = "shack".to_string();
    config.wifi.password = "secret".to_string();
    config.gateway = "10.0.0.1".to_string();
    config.mqtt.enabled = true;
    config.mqtt.broker = "10.0.0.5".to_string();
    config.mqtt.port = 1884;
    config.mqtt.username = "op".to_string();
    config.mqtt.password = "pw".to_string();
    config
}

#[test]
fn test_empty_store_loads_defaults() {
    let mut store = StateStore::new(MemoryStore::new(), 4);

    let (selection, config) = store.load();

    assert!(selection.is_off());
    assert!(!config.mqtt.enabled);
    assert_eq!(config.mqtt.port, DEFAULT_MQTT_PORT);
    assert_eq!(config.mqtt.command_topic, DEFAULT_COMMAND_TOPIC);
    assert_eq!(config.gateway, DEFAULT_GATEWAY);
    assert!(config.wifi.ssid.is_empty());
}

#[test]
fn test_selection_survives_power_cycle() {
    let storage = MemoryStore::new();
    let mut store = StateStore::new(storage.clone(), 4);
    store.load();

    assert!(store.save_selection(AntennaSelection::coerce(3, 4)));
    storage.power_cycle();

    let mut reopened = StateStore::new(storage, 4);
    let (selection, _) = reopened.load();
    assert_eq!(selection.value(), 3);
}

#[test]
fn test_configuration_round_trip() {
    let storage = MemoryStore::new();
    let mut store = StateStore::new(storage.clone(), 2);
    let config = configured();

    assert!(store.save_configuration(&config));
    storage.power_cycle();

    let (_, loaded) = StateStore::new(storage.clone(), 2).load();
    assert_eq!(loaded, config);
    assert_eq!(storage.committed(keys::MQTT_PORT), Some(StoredValue::Int(1884)));
}

#[test]
fn test_stored_selection_beyond_bank_is_coerced() {
    let storage = MemoryStore::new();
    storage.seed(keys::SELECTION, StoredValue::Int(7));

    let (selection, _) = StateStore::new(storage, 4).load();

    assert!(selection.is_off());
}

#[test]
fn test_read_failure_falls_back_to_defaults() {
    let storage = MemoryStore::new();
    storage.seed(keys::SELECTION, StoredValue::Int(2));
    storage.set_fail_reads(true);

    let (selection, config) = StateStore::new(storage, 4).load();

    assert!(selection.is_off());
    assert_eq!(config, Configuration::default());
}

#[test]
fn test_kind_mismatch_uses_default() {
    let storage = MemoryStore::new();
    storage.seed(keys::SELECTION, StoredValue::Str("two".into()));
    storage.seed(keys::MQTT_PORT, StoredValue::Str("1883".into()));
    storage.seed(keys::MQTT_BROKER, StoredValue::Str("broker.local".into()));

    assert!(matches!(
        storage.get_int(keys::SELECTION),
        Err(StorageError::KindMismatch { .. })
    ));

    let (selection, config) = StateStore::new(storage, 4).load();
    assert!(selection.is_off());
    assert_eq!(config.mqtt.port, DEFAULT_MQTT_PORT);
    assert_eq!(config.mqtt.broker, "broker.local");
}

#[test]
fn test_out_of_range_port_uses_default() {
    let storage = MemoryStore::new();
    storage.seed(keys::MQTT_PORT, StoredValue::Int(70_000));

    let (_, config) = StateStore::new(storage, 2).load();

    assert_eq!(config.mqtt.port, DEFAULT_MQTT_PORT);
}

#[test]
fn test_write_failure_keeps_memory_value() {
    let storage = MemoryStore::new();
    let mut store = StateStore::new(storage.clone(), 4);
    storage.set_fail_writes(true);

    assert!(!store.save_selection(AntennaSelection::coerce(2, 4)));

    assert_eq!(store.selection().value(), 2);
    assert_eq!(store.write_failures(), 1);
    assert_eq!(storage.committed(keys::SELECTION), None);
}

#[test]
fn test_failed_configuration_write_counts() {
    let storage = MemoryStore::new();
    let mut store = StateStore::new(storage.clone(), 2);
    storage.set_fail_writes(true);

    assert!(!store.save_configuration(&configured()));

    assert_eq!(store.configuration(), &configured());
    assert_eq!(store.write_failures(), 1);
    assert_eq!(storage.commit_count(), 0);
}

#[test]
fn test_file_store_persists_across_reopen() {
    let path = std::env::temp_dir().join(format!("antswitch-store-{}.json", std::process::id()));
    let _ = std::fs::remove_file(&path);

    {
        let mut store = StateStore::new(FileStore::open(&path).unwrap(), 4);
        store.load();
        assert!(store.save_selection(AntennaSelection::coerce(4, 4)));
        assert!(store.save_configuration(&configured()));
    }

    let mut reopened = StateStore::new(FileStore::open(&path).unwrap(), 4);
    let (selection, config) = reopened.load();
    assert_eq!(selection.value(), 4);
    assert_eq!(config, configured());
    assert_eq!(reopened.storage().path(), path.as_path());

    let _ = std::fs::remove_file(&path);
}

#[test]
fn test_file_store_missing_file_is_empty() {
    let path = std::env::temp_dir().join(format!("antswitch-missing-{}.json", std::process::id()));
    let _ = std::fs::remove_file(&path);

    let store = FileStore::open(&path).unwrap();

    assert_eq!(store.get(keys::SELECTION).unwrap(), None);
}

#[test]
fn test_file_store_rejects_corrupt_document() {
    let path = std::env::temp_dir().join(format!("antswitch-corrupt-{}.json", std::process::id()));
    std::fs::write(&path, "{not json").unwrap();

    assert!(matches!(FileStore::open(&path), Err(StorageError::ReadFailed(_))));

    let _ = std::fs::remove_file(&path);
}

#[test]
fn test_stored_shared_topics_disable_bus() {
    let storage = MemoryStore::new();
    storage.seed(keys::MQTT_ENABLED, StoredValue::Bool(true));
    storage.seed(keys::MQTT_BROKER, StoredValue::Str("10.0.0.5".into()));
    storage.seed(keys::MQTT_COMMAND_TOPIC, StoredValue::Str("shack/switch".into()));
    storage.seed(keys::MQTT_STATE_TOPIC, StoredValue::Str("shack/switch".into()));
    let mut store = StateStore::new(storage, 4);

    let (_, config) = store.load();

    assert!(!config.mqtt.enabled);
    assert_eq!(config.mqtt.broker, "10.0.0.5");
}
