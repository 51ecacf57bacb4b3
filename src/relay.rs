use crate::hal::{Delay, Level, RelayOutputs};
use crate::selection::AntennaSelection;
use tracing::debug;

/// Break-before-make relay driver.
///
/// Every transition de-energizes all channels, waits out the settling
/// interval, and only then energizes the requested path. Two antenna paths
/// are never connected at the same time, even for a moment.
#[derive(Debug)]
pub struct RelayDriver<O, D> {
    outputs: O,
    delay: D,
    active_high: bool,
    settle_ms: u32,
}

impl<O: RelayOutputs, D: Delay> RelayDriver<O, D> {
    pub fn new(outputs: O, delay: D, active_high: bool, settle_ms: u32) -> Self {
        Self {
            outputs,
            delay,
            active_high,
            settle_ms,
        }
    }

    /// Paths available on this bank
    pub fn antenna_count(&self) -> u8 {
        self.outputs.channel_count()
    }

    fn level(&self, energized: bool) -> Level {
        if energized == self.active_high {
            Level::High
        } else {
            Level::Low
        }
    }

    /// Drives the bank to `selection`. Cannot fail.
    ///
    /// Callers must pass an already coerced selection; a path beyond the bank
    /// leaves every channel de-energized.
    pub fn apply_selection(&mut self, selection: AntennaSelection) {
        let off = self.level(false);
        for channel in 0..self.outputs.channel_count() {
            self.outputs.set_level(channel, off);
        }

        self.delay.delay_ms(self.settle_ms);

        if let Some(path) = selection.path() {
            if path <= self.outputs.channel_count() {
                let on = self.level(true);
                self.outputs.set_level(path - 1, on);
            }
        }

        debug!(selection = %selection, "relay state applied");
    }

    pub fn outputs(&self) -> &O {
        &self.outputs
    }
}
