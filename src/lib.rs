//! # Antenna Switch Supervisor
//!
//! Connectivity and state supervisor for a network-controllable antenna
//! switch: a small device that energizes exactly one of N antenna paths
//! through relay outputs, is controlled from a local control surface and an
//! MQTT-style message bus, and has to stay correct across flaky wireless
//! links, broker outages and power cycles.
//!
//! ## Features
//!
//! - **Break-before-make switching**: every change de-energizes all relays
//!   and settles before the new path is energized
//! - **Durable state**: selection and configuration survive restarts; storage
//!   faults degrade to defaults instead of failing boot
//! - **Bus session**: explicit `Disconnected/Connecting/Connected` state
//!   machine that republishes retained state on every (re)connection
//! - **Link supervision**: periodic gateway probe, bounded reconnect, and a
//!   full restart once consecutive failures reach the ceiling
//! - **Host simulator**: every hardware seam is a trait with an in-memory
//!   implementation in [`hal::mock`]
//!
//! ## Quick Start
//!
//! ```rust
//! use antswitch::config::DeviceSettings;
//! use antswitch::device::{AntennaSwitch, Parts};
//! use antswitch::hal::mock::{MemoryStore, MockBroker, MockLink, MockRelays, MockSystem};
//!
//! let relays = MockRelays::new(4);
//! let broker = MockBroker::new();
//! let parts = Parts {
//!     outputs: relays.clone(),
//!     delay: relays.delay(),
//!     storage: MemoryStore::new(),
//!     bus: broker.client(),
//!     link: MockLink::new(),
//!     system: MockSystem::new(),
//! };
//!
//! let mut device = AntennaSwitch::boot(parts, &DeviceSettings::default(), 0);
//! assert_eq!(device.set_antenna(3).value(), 3);
//! assert_eq!(device.set_antenna(42).value(), 0);
//! device.tick(30_000);
//! ```
//!
//! ## Architecture
//!
//! - [`relay`] - hardware driver
//! - [`store`] - state store over a durable key-value store
//! - [`controller`] - antenna controller
//! - [`session`] - message bus session
//! - [`supervisor`] - connectivity supervisor
//! - [`device`] - orchestrator and control-loop tick
//! - [`protocol`] - control-surface requests and responses

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::must_use_candidate)]

pub mod config;
pub mod controller;
pub mod device;
pub mod error;
pub mod events;
pub mod hal;
pub mod protocol;
pub mod relay;
pub mod selection;
pub mod session;
pub mod store;
pub mod supervisor;

// Re-export main public types for convenience
pub use config::{Configuration, DeviceSettings, MqttSettings, WifiSettings};
pub use device::{AntennaSwitch, DeviceStatus, Parts};
pub use protocol::{ControlOp, ControlRequest, ControlResponse};
pub use selection::AntennaSelection;
pub use session::SessionState;
pub use supervisor::SupervisorAction;
