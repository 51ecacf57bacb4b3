use antswitch::selection::*;
use proptest::prelude::*;

#[test]
fn test_coerce_in_range() {
    assert_eq!(AntennaSelection::coerce(0, 4).value(), 0);
    assert_eq!(AntennaSelection::coerce(1, 4).value(), 1);
    assert_eq!(AntennaSelection::coerce(4, 4).value(), 4);
}

#[test]
fn test_json_form_is_a_number() {
    let json = serde_json::json!({ "antenna": AntennaSelection::coerce(3, 4) });
    assert_eq!(json["antenna"], 3);

    let parsed: AntennaSelection = serde_json::from_value(json["antenna"].clone()).unwrap();
    assert_eq!(parsed.to_string(), "3");

    let off: AntennaSelection = serde_json::from_value(serde_json::json!(0)).unwrap();
    assert_eq!(off.to_string(), "off");
}

#[test]
fn test_coerce_out_of_range_is_off() {
    assert_eq!(AntennaSelection::coerce(5, 4), AntennaSelection::OFF);
    assert_eq!(AntennaSelection::coerce(-1, 4), AntennaSelection::OFF);
    assert_eq!(AntennaSelection::coerce(256, 4), AntennaSelection::OFF);
    assert_eq!(AntennaSelection::coerce(i64::MAX, 8), AntennaSelection::OFF);
    assert_eq!(AntennaSelection::coerce(i64::MIN, 8), AntennaSelection::OFF);
}

#[test]
fn test_path_mapping() {
    assert_eq!(AntennaSelection::OFF.path(), None);
    assert!(AntennaSelection::OFF.is_off());
    assert_eq!(AntennaSelection::coerce(3, 4).path(), Some(3));
}

#[test]
fn test_state_payload() {
    assert_eq!(AntennaSelection::OFF.to_payload().as_str(), "off");
    assert_eq!(AntennaSelection::coerce(2, 4).to_payload().as_str(), "2");
    assert_eq!(AntennaSelection::coerce(8, 8).to_string(), "8");
}

#[test]
fn test_decode_accepts_numbers_and_off() {
    assert_eq!(AntennaSelection::from_command("0", 2), Some(AntennaSelection::OFF));
    assert_eq!(AntennaSelection::from_command("2", 2).map(|s| s.value()), Some(2));
    assert_eq!(AntennaSelection::from_command("off", 2), Some(AntennaSelection::OFF));
    assert_eq!(AntennaSelection::from_command("OFF", 2), Some(AntennaSelection::OFF));
    assert_eq!(AntennaSelection::from_command("Off", 2), Some(AntennaSelection::OFF));
}

#[test]
fn test_decode_trims_whitespace() {
    assert_eq!(AntennaSelection::from_command(" 1\n", 2).map(|s| s.value()), Some(1));
    assert_eq!(AntennaSelection::from_command("\toff ", 2), Some(AntennaSelection::OFF));
}

#[test]
fn test_decode_leading_zeros() {
    assert_eq!(AntennaSelection::from_command("02", 2).map(|s| s.value()), Some(2));
    assert_eq!(AntennaSelection::from_command("000", 2), Some(AntennaSelection::OFF));
}

#[test]
fn test_decode_rejects_garbage() {
    for payload in ["", " ", "3", "-1", "+1", "1.0", "one", "antenna1", "1 2", "999", "offf", "0x1"] {
        assert_eq!(
            AntennaSelection::from_command(payload, 2),
            None,
            "payload {:?} should be ignored",
            payload
        );
    }
}

#[test]
fn test_serializes_as_plain_number() {
    let json = serde_json::to_string(&AntennaSelection::coerce(3, 4)).unwrap();
    assert_eq!(json, "3");
    let back: AntennaSelection = serde_json::from_str("0").unwrap();
    assert!(back.is_off());
}

proptest! {
    #[test]
    fn coerce_always_within_bounds(requested in any::<i64>(), count in 1u8..=MAX_ANTENNAS) {
        let selection = AntennaSelection::coerce(requested, count);
        prop_assert!(selection.value() <= count);
        if requested >= 0 && requested <= i64::from(count) {
            prop_assert_eq!(i64::from(selection.value()), requested);
        } else {
            prop_assert!(selection.is_off());
        }
    }

    #[test]
    fn decode_never_panics(payload in ".{0,16}", count in 1u8..=MAX_ANTENNAS) {
        if let Some(selection) = AntennaSelection::from_command(&payload, count) {
            prop_assert!(selection.value() <= count);
        }
    }

    #[test]
    fn published_payload_decodes_back(value in 0u8..=MAX_ANTENNAS) {
        let selection = AntennaSelection::coerce(i64::from(value), MAX_ANTENNAS);
        let payload = selection.to_payload();
        prop_assert_eq!(AntennaSelection::from_command(&payload, MAX_ANTENNAS), Some(selection));
    }
}
