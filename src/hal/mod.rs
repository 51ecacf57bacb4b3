//! Hardware and network seams.
//!
//! Everything the supervisor touches outside its own memory goes through one
//! of these traits: the relay outputs, the settle delay, the durable
//! key-value store, the message bus client, the wireless link and the
//! restart line. The [`mock`] module provides in-memory implementations for
//! tests and the host simulator; [`file_store`] provides a JSON-file backed
//! store so the simulator survives its own restarts.

pub mod file_store;
pub mod mock;

use crate::error::{BusError, LinkError, StorageError};
use core::time::Duration;
use serde::{Deserialize, Serialize};

pub use file_store::FileStore;

/// Electrical level of an output pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Level {
    Low,
    High,
}

/// A bank of relay driver outputs, addressed by zero-based channel.
pub trait RelayOutputs {
    fn channel_count(&self) -> u8;
    fn set_level(&mut self, channel: u8, level: Level);
}

/// Blocking delay used for the relay settling interval
pub trait Delay {
    fn delay_ms(&mut self, ms: u32);
}

/// A typed value held by the durable store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoredValue {
    Str(String),
    Int(i32),
    Bool(bool),
}

impl StoredValue {
    pub fn kind(&self) -> &'static str {
        match self {
            StoredValue::Str(_) => "string",
            StoredValue::Int(_) => "integer",
            StoredValue::Bool(_) => "boolean",
        }
    }
}

/// Durable key-value storage with explicit commit.
///
/// `put` may stage a value; only `commit` guarantees it survives power loss.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<StoredValue>, StorageError>;
    fn put(&mut self, key: &str, value: StoredValue) -> Result<(), StorageError>;
    fn commit(&mut self) -> Result<(), StorageError>;

    fn get_str(&self, key: &str) -> Result<Option<String>, StorageError> {
        match self.get(key)? {
            None => Ok(None),
            Some(StoredValue::Str(value)) => Ok(Some(value)),
            Some(other) => Err(mismatch(key, "string", &other)),
        }
    }

    fn get_int(&self, key: &str) -> Result<Option<i32>, StorageError> {
        match self.get(key)? {
            None => Ok(None),
            Some(StoredValue::Int(value)) => Ok(Some(value)),
            Some(other) => Err(mismatch(key, "integer", &other)),
        }
    }

    fn get_bool(&self, key: &str) -> Result<Option<bool>, StorageError> {
        match self.get(key)? {
            None => Ok(None),
            Some(StoredValue::Bool(value)) => Ok(Some(value)),
            Some(other) => Err(mismatch(key, "boolean", &other)),
        }
    }
}

fn mismatch(key: &str, expected: &'static str, found: &StoredValue) -> StorageError {
    StorageError::KindMismatch {
        key: key.to_string(),
        expected,
        found: found.kind(),
    }
}

/// Parameters for a single bounded broker connection attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions<'a> {
    pub client_id: &'a str,
    pub broker: &'a str,
    pub port: u16,
    pub username: Option<&'a str>,
    pub password: Option<&'a str>,
    pub timeout: Duration,
}

/// A message delivered by the broker on a subscribed topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Publish/subscribe client for the message bus.
///
/// `connect` blocks for at most `options.timeout`. `poll` services the
/// connection and drains whatever arrived since the last call; an error
/// from `poll` means the session has dropped.
pub trait BusClient {
    fn connect(&mut self, options: &ConnectOptions<'_>) -> Result<(), BusError>;
    fn disconnect(&mut self);
    fn is_connected(&self) -> bool;
    fn subscribe(&mut self, topic: &str) -> Result<(), BusError>;
    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), BusError>;
    fn poll(&mut self) -> Result<Vec<InboundMessage>, BusError>;
}

/// The wireless station interface
pub trait NetworkLink {
    fn is_associated(&self) -> bool;

    /// Joins the network and waits up to `timeout` for association.
    fn associate(
        &mut self,
        ssid: &str,
        password: &str,
        hostname: &str,
        timeout: Duration,
    ) -> Result<(), LinkError>;

    fn disassociate(&mut self);

    /// Active reachability check against `target`, bounded by `timeout`.
    fn probe(&mut self, target: &str, timeout: Duration) -> bool;

    /// (Re)starts the local discovery advertisement for `hostname`.
    fn advertise(&mut self, hostname: &str) -> Result<(), LinkError>;
}

/// The device restart line. Terminal: nothing after it runs on real hardware.
pub trait SystemControl {
    fn restart(&mut self);
}
