use arrayvec::ArrayString;
use core::fmt::{self, Write};
use serde::{Deserialize, Serialize};
use static_assertions::const_assert;

/// Upper bound on switchable paths; sizes the relay bank and history buffers.
pub const MAX_ANTENNAS: u8 = 8;

/// Wire token published for the all-off selection.
pub const OFF_TOKEN: &str = "off";

// Largest payload is either the off token or a three digit u8.
pub const MAX_PAYLOAD_SIZE: usize = 4;

const_assert!(MAX_ANTENNAS > 0);
const_assert!(OFF_TOKEN.len() <= MAX_PAYLOAD_SIZE);

pub type StatePayload = ArrayString<MAX_PAYLOAD_SIZE>;

/// The currently energized antenna path. `0` means every path is off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AntennaSelection(u8);

impl AntennaSelection {
    pub const OFF: Self = Self(0);

    /// Fail-safe coercion: anything outside `[0, antenna_count]` becomes off.
    pub fn coerce(requested: i64, antenna_count: u8) -> Self {
        match u8::try_from(requested) {
            Ok(value) if value <= antenna_count => Self(value),
            _ => Self::OFF,
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn is_off(self) -> bool {
        self.0 == 0
    }

    /// One-based path index, `None` when off.
    pub fn path(self) -> Option<u8> {
        if self.0 == 0 {
            None
        } else {
            Some(self.0)
        }
    }

    /// Retained state payload: `"off"` for 0, the decimal value otherwise.
    pub fn to_payload(self) -> StatePayload {
        let mut payload = StatePayload::new();
        if self.is_off() {
            payload.push_str(OFF_TOKEN);
        } else {
            // u8 renders in at most three digits
            let _ = write!(payload, "{}", self.0);
        }
        payload
    }

    /// Decodes an inbound command payload.
    ///
    /// Accepts `"0"`..`"N"` (ASCII digits only) and `"off"` in any case,
    /// after trimming surrounding whitespace. Everything else is `None` and
    /// is meant to be dropped without a reply.
    pub fn from_command(payload: &str, antenna_count: u8) -> Option<Self> {
        let payload = payload.trim();

        if payload.eq_ignore_ascii_case(OFF_TOKEN) {
            return Some(Self::OFF);
        }

        if payload.is_empty() || !payload.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        let value: u8 = payload.parse().ok()?;
        if value <= antenna_count {
            Some(Self(value))
        } else {
            None
        }
    }
}

impl fmt::Display for AntennaSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_payload())
    }
}
