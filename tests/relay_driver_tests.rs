use antswitch::hal::mock::{MockDelay, MockRelays, RelayEvent};
use antswitch::hal::Level;
use antswitch::relay::RelayDriver;
use antswitch::selection::AntennaSelection;
use proptest::prelude::*;

fn driver(channels: u8, active_high: bool) -> (RelayDriver<MockRelays, MockDelay>, MockRelays) {
    let relays = MockRelays::new(channels);
    let driver = RelayDriver::new(relays.clone(), relays.delay(), active_high, 20);
    (driver, relays)
}

#[test]
fn test_selects_single_path() {
    let (mut driver, relays) = driver(4, true);

    driver.apply_selection(AntennaSelection::coerce(3, 4));

    assert_eq!(relays.channels_at(Level::High), vec![2]);
    assert_eq!(driver.antenna_count(), 4);
}

#[test]
fn test_off_deenergizes_everything() {
    let (mut driver, relays) = driver(4, true);
    driver.apply_selection(AntennaSelection::coerce(1, 4));

    driver.apply_selection(AntennaSelection::OFF);

    assert!(relays.channels_at(Level::High).is_empty());
}

#[test]
fn test_break_before_make_ordering() {
    let (mut driver, relays) = driver(2, true);
    driver.apply_selection(AntennaSelection::coerce(1, 2));
    relays.clear_timeline();

    driver.apply_selection(AntennaSelection::coerce(2, 2));

    assert_eq!(
        relays.timeline(),
        vec![
            RelayEvent::Write { channel: 0, level: Level::Low },
            RelayEvent::Write { channel: 1, level: Level::Low },
            RelayEvent::Settle { ms: 20 },
            RelayEvent::Write { channel: 1, level: Level::High },
        ]
    );
}

#[test]
fn test_settles_even_when_switching_off() {
    let (mut driver, relays) = driver(2, true);
    driver.apply_selection(AntennaSelection::OFF);
    assert!(relays.timeline().contains(&RelayEvent::Settle { ms: 20 }));
}

#[test]
fn test_active_low_polarity() {
    let (mut driver, relays) = driver(3, false);

    driver.apply_selection(AntennaSelection::coerce(2, 3));
    assert_eq!(relays.channels_at(Level::Low), vec![1]);
    assert_eq!(relays.channels_at(Level::High), vec![0, 2]);

    driver.apply_selection(AntennaSelection::OFF);
    assert!(relays.channels_at(Level::Low).is_empty());
}

#[test]
fn test_reapplying_same_selection_is_stable() {
    let (mut driver, relays) = driver(4, true);
    driver.apply_selection(AntennaSelection::coerce(2, 4));
    let before = relays.levels();

    driver.apply_selection(AntennaSelection::coerce(2, 4));

    assert_eq!(relays.levels(), before);
}

proptest! {
    #[test]
    fn never_two_paths_energized(
        sequence in proptest::collection::vec(0u8..=4, 1..24),
        active_high: bool
    ) {
        let (mut driver, relays) = driver(4, active_high);
        driver.apply_selection(AntennaSelection::OFF);
        let initial = relays.levels();
        let energized = if active_high { Level::High } else { Level::Low };
        relays.clear_timeline();

        for value in sequence {
            driver.apply_selection(AntennaSelection::coerce(i64::from(value), 4));
            prop_assert!(relays.channels_at(energized).len() <= 1);
        }
        // Timeline replay covers every intermediate write, not just the end states.
        prop_assert!(relays.max_simultaneous(&initial, energized) <= 1);
    }
}
