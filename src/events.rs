use crate::config::ConfigChange;
use crate::selection::AntennaSelection;
use heapless::Vec;
use serde::{Deserialize, Serialize};

const MAX_EVENT_HISTORY: usize = 64;

/// Where a selection change came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandSource {
    ControlSurface,
    Bus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartReason {
    LinkUnrecoverable,
    FirmwareUpdated,
    Operator,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    Boot {
        selection: AntennaSelection,
        associated: bool,
    },
    AntennaChanged {
        from: AntennaSelection,
        to: AntennaSelection,
        source: CommandSource,
    },
    BusConnected,
    BusDropped,
    BusConnectFailed {
        reason: String,
    },
    ProbeFailed {
        failures: u8,
    },
    LinkRecovered,
    RestartRequested {
        reason: RestartReason,
    },
    StorageWriteFailed,
    ConfigChanged {
        change: ConfigChange,
    },
    FirmwareUpdateFailed {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: u32,
    pub timestamp_ms: u64,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Bounded device event history; the oldest entry is evicted when full.
#[derive(Debug)]
pub struct EventLog {
    history: Vec<EventRecord, MAX_EVENT_HISTORY>,
    next_id: u32,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            history: Vec::new(),
            next_id: 1,
        }
    }

    pub fn record(&mut self, timestamp_ms: u64, kind: EventKind) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);

        if self.history.is_full() {
            self.history.remove(0);
        }

        let _ = self.history.push(EventRecord {
            id,
            timestamp_ms,
            kind,
        });
        id
    }

    pub fn history(&self) -> &[EventRecord] {
        &self.history
    }

    /// The newest `count` events, oldest first.
    pub fn recent(&self, count: usize) -> &[EventRecord] {
        let start = self.history.len().saturating_sub(count);
        &self.history[start..]
    }

    pub fn last(&self) -> Option<&EventRecord> {
        self.history.last()
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}
