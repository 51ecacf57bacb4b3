use crate::config::Configuration;
use crate::hal::{Delay, KeyValueStore, RelayOutputs};
use crate::relay::RelayDriver;
use crate::selection::AntennaSelection;
use crate::store::StateStore;
use tracing::info;

/// Outbound half of the bus session as seen by the controller.
pub trait StatePublisher {
    /// Publishes `selection` as retained state when connected, skipping
    /// silently otherwise. Returns whether a message went out.
    fn publish_state(&mut self, selection: AntennaSelection) -> bool;
}

/// Publisher for contexts with no bus at all
#[derive(Debug, Clone, Copy, Default)]
pub struct Offline;

impl StatePublisher for Offline {
    fn publish_state(&mut self, _selection: AntennaSelection) -> bool {
        false
    }
}

/// Applies selections: coerce, drive hardware, persist, publish.
#[derive(Debug)]
pub struct AntennaController<O, D, S> {
    driver: RelayDriver<O, D>,
    store: StateStore<S>,
}

impl<O, D, S> AntennaController<O, D, S>
where
    O: RelayOutputs,
    D: Delay,
    S: KeyValueStore,
{
    pub fn new(driver: RelayDriver<O, D>, store: StateStore<S>) -> Self {
        Self { driver, store }
    }

    /// Boot path: reads durable state and puts the hardware into the stored
    /// selection. Nothing is published or re-persisted.
    pub fn restore(&mut self) -> (AntennaSelection, Configuration) {
        let (selection, config) = self.store.load();
        self.driver.apply_selection(selection);
        info!(selection = %selection, "restored persisted selection");
        (selection, config)
    }

    /// Applies `requested` and returns the selection actually in effect.
    ///
    /// Out-of-range requests are applied as off. Hardware, durable copy and
    /// (when connected) the retained state message are all updated before
    /// this returns.
    pub fn set_antenna<P: StatePublisher + ?Sized>(
        &mut self,
        requested: i64,
        publisher: &mut P,
    ) -> AntennaSelection {
        let selection = AntennaSelection::coerce(requested, self.antenna_count());
        let previous = self.store.selection();

        self.driver.apply_selection(selection);
        self.store.save_selection(selection);
        let published = publisher.publish_state(selection);

        info!(
            requested,
            from = %previous,
            to = %selection,
            published,
            "antenna selection applied"
        );
        selection
    }

    pub fn antenna_count(&self) -> u8 {
        self.store.antenna_count()
    }

    pub fn selection(&self) -> AntennaSelection {
        self.store.selection()
    }

    pub fn store(&self) -> &StateStore<S> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut StateStore<S> {
        &mut self.store
    }

    pub fn driver(&self) -> &RelayDriver<O, D> {
        &self.driver
    }
}
