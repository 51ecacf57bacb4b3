//! In-memory hardware for tests and the host simulator.
//!
//! Every mock is a cheap clonable handle over shared state, so a test can
//! keep one handle for inspection (or fault injection) after moving another
//! into the device.

use super::{
    BusClient, ConnectOptions, Delay, InboundMessage, KeyValueStore, Level, NetworkLink,
    RelayOutputs, StoredValue, SystemControl,
};
use crate::error::{BusError, LinkError, StorageError};
use core::time::Duration;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const MAX_TIMELINE: usize = 256;
/// Publishes the broker keeps for inspection; older ones are dropped.
pub const MAX_PUBLISHED: usize = 256;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Relays
// ---------------------------------------------------------------------------

/// One observable step on the relay bank
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayEvent {
    Write { channel: u8, level: Level },
    Settle { ms: u32 },
}

#[derive(Debug)]
struct RelayBank {
    levels: Vec<Level>,
    timeline: VecDeque<RelayEvent>,
}

impl RelayBank {
    fn record(&mut self, event: RelayEvent) {
        if self.timeline.len() >= MAX_TIMELINE {
            self.timeline.pop_front();
        }
        self.timeline.push_back(event);
    }
}

/// Relay bank that remembers every write and settle, in order.
#[derive(Debug, Clone)]
pub struct MockRelays {
    bank: Arc<Mutex<RelayBank>>,
}

impl MockRelays {
    /// All channels start low.
    pub fn new(channels: u8) -> Self {
        Self {
            bank: Arc::new(Mutex::new(RelayBank {
                levels: vec![Level::Low; usize::from(channels)],
                timeline: VecDeque::new(),
            })),
        }
    }

    /// A delay that records its settles on this bank's timeline.
    pub fn delay(&self) -> MockDelay {
        MockDelay {
            bank: Arc::clone(&self.bank),
        }
    }

    pub fn levels(&self) -> Vec<Level> {
        lock(&self.bank).levels.clone()
    }

    /// Zero-based channels currently at `level`.
    pub fn channels_at(&self, level: Level) -> Vec<u8> {
        lock(&self.bank)
            .levels
            .iter()
            .enumerate()
            .filter(|(_, l)| **l == level)
            .map(|(i, _)| i as u8)
            .collect()
    }

    pub fn timeline(&self) -> Vec<RelayEvent> {
        lock(&self.bank).timeline.iter().copied().collect()
    }

    pub fn clear_timeline(&self) {
        lock(&self.bank).timeline.clear();
    }

    /// Replays the recorded timeline from `initial` and returns the largest
    /// number of channels that were at `level` at the same instant.
    pub fn max_simultaneous(&self, initial: &[Level], level: Level) -> usize {
        let mut levels = initial.to_vec();
        let mut max = levels.iter().filter(|l| **l == level).count();
        for event in lock(&self.bank).timeline.iter() {
            if let RelayEvent::Write { channel, level: written } = *event {
                if let Some(slot) = levels.get_mut(usize::from(channel)) {
                    *slot = written;
                }
                max = max.max(levels.iter().filter(|l| **l == level).count());
            }
        }
        max
    }
}

impl RelayOutputs for MockRelays {
    fn channel_count(&self) -> u8 {
        lock(&self.bank).levels.len() as u8
    }

    fn set_level(&mut self, channel: u8, level: Level) {
        let mut bank = lock(&self.bank);
        if let Some(slot) = bank.levels.get_mut(usize::from(channel)) {
            *slot = level;
            bank.record(RelayEvent::Write { channel, level });
        }
    }
}

/// Delay that returns immediately and records the requested interval
#[derive(Debug, Clone)]
pub struct MockDelay {
    bank: Arc<Mutex<RelayBank>>,
}

impl Delay for MockDelay {
    fn delay_ms(&mut self, ms: u32) {
        lock(&self.bank).record(RelayEvent::Settle { ms });
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct StoreInner {
    committed: HashMap<String, StoredValue>,
    staged: HashMap<String, StoredValue>,
    fail_reads: bool,
    fail_writes: bool,
    commits: u32,
}

/// Key-value store with a staged/committed split and fault toggles.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        lock(&self.inner).fail_reads = fail;
    }

    pub fn set_fail_writes(&self, fail: bool) {
        lock(&self.inner).fail_writes = fail;
    }

    /// Drops everything not yet committed, as a power loss would.
    pub fn power_cycle(&self) {
        lock(&self.inner).staged.clear();
    }

    pub fn committed(&self, key: &str) -> Option<StoredValue> {
        lock(&self.inner).committed.get(key).cloned()
    }

    pub fn commit_count(&self) -> u32 {
        lock(&self.inner).commits
    }

    /// Writes straight to committed storage, bypassing fault toggles.
    pub fn seed(&self, key: &str, value: StoredValue) {
        lock(&self.inner).committed.insert(key.to_string(), value);
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<StoredValue>, StorageError> {
        let inner = lock(&self.inner);
        if inner.fail_reads {
            return Err(StorageError::ReadFailed("injected read fault".into()));
        }
        Ok(inner
            .staged
            .get(key)
            .or_else(|| inner.committed.get(key))
            .cloned())
    }

    fn put(&mut self, key: &str, value: StoredValue) -> Result<(), StorageError> {
        let mut inner = lock(&self.inner);
        if inner.fail_writes {
            return Err(StorageError::WriteFailed("injected write fault".into()));
        }
        inner.staged.insert(key.to_string(), value);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        let mut inner = lock(&self.inner);
        if inner.fail_writes {
            return Err(StorageError::WriteFailed("injected commit fault".into()));
        }
        let staged: Vec<_> = inner.staged.drain().collect();
        inner.committed.extend(staged);
        inner.commits = inner.commits.saturating_add(1);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Message bus
// ---------------------------------------------------------------------------

/// A message the broker accepted from the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

#[derive(Debug)]
struct BrokerInner {
    online: bool,
    client_connected: bool,
    credentials: Option<(String, String)>,
    subscriptions: HashSet<String>,
    retained: HashMap<String, Vec<u8>>,
    inbox: VecDeque<InboundMessage>,
    published: VecDeque<PublishedMessage>,
    connect_attempts: u32,
    last_client_id: Option<String>,
}

/// A single-client broker living in memory.
#[derive(Debug, Clone)]
pub struct MockBroker {
    inner: Arc<Mutex<BrokerInner>>,
}

impl Default for MockBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBroker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(BrokerInner {
                online: true,
                client_connected: false,
                credentials: None,
                subscriptions: HashSet::new(),
                retained: HashMap::new(),
                inbox: VecDeque::new(),
                published: VecDeque::new(),
                connect_attempts: 0,
                last_client_id: None,
            })),
        }
    }

    pub fn client(&self) -> MockBusClient {
        MockBusClient {
            broker: self.clone(),
        }
    }

    /// Taking the broker offline drops any connected client.
    pub fn set_online(&self, online: bool) {
        let mut inner = lock(&self.inner);
        inner.online = online;
        if !online {
            inner.client_connected = false;
            inner.subscriptions.clear();
            inner.inbox.clear();
        }
    }

    pub fn is_online(&self) -> bool {
        lock(&self.inner).online
    }

    /// Requires these credentials on connect; `None` accepts anonymous clients.
    pub fn require_credentials(&self, credentials: Option<(&str, &str)>) {
        lock(&self.inner).credentials =
            credentials.map(|(user, pass)| (user.to_string(), pass.to_string()));
    }

    /// Publishes from another party. Delivered if the device subscribed.
    pub fn inject(&self, topic: &str, payload: &str, retain: bool) {
        let mut inner = lock(&self.inner);
        if retain {
            inner
                .retained
                .insert(topic.to_string(), payload.as_bytes().to_vec());
        }
        if inner.client_connected && inner.subscriptions.contains(topic) {
            inner.inbox.push_back(InboundMessage {
                topic: topic.to_string(),
                payload: payload.as_bytes().to_vec(),
            });
        }
    }

    pub fn retained(&self, topic: &str) -> Option<String> {
        lock(&self.inner)
            .retained
            .get(topic)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        lock(&self.inner).published.iter().cloned().collect()
    }

    pub fn clear_published(&self) {
        lock(&self.inner).published.clear();
    }

    pub fn connect_attempts(&self) -> u32 {
        lock(&self.inner).connect_attempts
    }

    pub fn subscriptions(&self) -> Vec<String> {
        let mut topics: Vec<_> = lock(&self.inner).subscriptions.iter().cloned().collect();
        topics.sort();
        topics
    }

    pub fn last_client_id(&self) -> Option<String> {
        lock(&self.inner).last_client_id.clone()
    }

    pub fn has_client(&self) -> bool {
        lock(&self.inner).client_connected
    }
}

/// Bus client bound to a [`MockBroker`]
#[derive(Debug, Clone)]
pub struct MockBusClient {
    broker: MockBroker,
}

impl BusClient for MockBusClient {
    fn connect(&mut self, options: &ConnectOptions<'_>) -> Result<(), BusError> {
        let mut inner = lock(&self.broker.inner);
        inner.connect_attempts = inner.connect_attempts.saturating_add(1);
        inner.last_client_id = Some(options.client_id.to_string());

        if !inner.online {
            return Err(BusError::Timeout(options.timeout.as_millis() as u64));
        }

        if let Some((user, pass)) = &inner.credentials {
            let presented = (options.username.unwrap_or(""), options.password.unwrap_or(""));
            if presented != (user.as_str(), pass.as_str()) {
                return Err(BusError::Refused("bad user name or password".into()));
            }
        }

        inner.client_connected = true;
        inner.subscriptions.clear();
        inner.inbox.clear();
        Ok(())
    }

    fn disconnect(&mut self) {
        let mut inner = lock(&self.broker.inner);
        inner.client_connected = false;
        inner.subscriptions.clear();
        inner.inbox.clear();
    }

    fn is_connected(&self) -> bool {
        let inner = lock(&self.broker.inner);
        inner.online && inner.client_connected
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), BusError> {
        let mut inner = lock(&self.broker.inner);
        if !(inner.online && inner.client_connected) {
            return Err(BusError::NotConnected);
        }
        inner.subscriptions.insert(topic.to_string());
        if let Some(payload) = inner.retained.get(topic).cloned() {
            inner.inbox.push_back(InboundMessage {
                topic: topic.to_string(),
                payload,
            });
        }
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), BusError> {
        let mut inner = lock(&self.broker.inner);
        if !(inner.online && inner.client_connected) {
            return Err(BusError::NotConnected);
        }
        if retain {
            inner.retained.insert(topic.to_string(), payload.to_vec());
        }
        if inner.published.len() >= MAX_PUBLISHED {
            inner.published.pop_front();
        }
        inner.published.push_back(PublishedMessage {
            topic: topic.to_string(),
            payload: String::from_utf8_lossy(payload).into_owned(),
            retain,
        });
        if inner.subscriptions.contains(topic) {
            inner.inbox.push_back(InboundMessage {
                topic: topic.to_string(),
                payload: payload.to_vec(),
            });
        }
        Ok(())
    }

    fn poll(&mut self) -> Result<Vec<InboundMessage>, BusError> {
        let mut inner = lock(&self.broker.inner);
        if !(inner.online && inner.client_connected) {
            return Err(BusError::NotConnected);
        }
        Ok(inner.inbox.drain(..).collect())
    }
}

// ---------------------------------------------------------------------------
// Wireless link
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct LinkInner {
    associated: bool,
    access_point_up: bool,
    forwarding: bool,
    expected_ssid: Option<String>,
    probes: u32,
    associate_calls: u32,
    disassociate_calls: u32,
    advertised: Vec<String>,
    last_hostname: Option<String>,
}

/// Simulated station interface.
///
/// `access_point_up` decides whether association can succeed; `forwarding`
/// decides whether an associated link actually carries traffic, so a link
/// can be associated but black-holed.
#[derive(Debug, Clone)]
pub struct MockLink {
    inner: Arc<Mutex<LinkInner>>,
}

impl Default for MockLink {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLink {
    /// Starts unassociated with a healthy access point in range.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(LinkInner {
                associated: false,
                access_point_up: true,
                forwarding: true,
                expected_ssid: None,
                probes: 0,
                associate_calls: 0,
                disassociate_calls: 0,
                advertised: Vec::new(),
                last_hostname: None,
            })),
        }
    }

    /// Only this SSID will associate; `None` accepts any non-empty SSID.
    pub fn expect_ssid(&self, ssid: Option<&str>) {
        lock(&self.inner).expected_ssid = ssid.map(str::to_string);
    }

    /// Losing the access point also drops the current association.
    pub fn set_access_point(&self, up: bool) {
        let mut inner = lock(&self.inner);
        inner.access_point_up = up;
        if !up {
            inner.associated = false;
        }
    }

    pub fn set_forwarding(&self, forwarding: bool) {
        lock(&self.inner).forwarding = forwarding;
    }

    pub fn force_associated(&self, associated: bool) {
        lock(&self.inner).associated = associated;
    }

    pub fn probes(&self) -> u32 {
        lock(&self.inner).probes
    }

    pub fn associate_calls(&self) -> u32 {
        lock(&self.inner).associate_calls
    }

    pub fn disassociate_calls(&self) -> u32 {
        lock(&self.inner).disassociate_calls
    }

    pub fn advertised(&self) -> Vec<String> {
        lock(&self.inner).advertised.clone()
    }

    pub fn last_hostname(&self) -> Option<String> {
        lock(&self.inner).last_hostname.clone()
    }
}

impl NetworkLink for MockLink {
    fn is_associated(&self) -> bool {
        lock(&self.inner).associated
    }

    fn associate(
        &mut self,
        ssid: &str,
        _password: &str,
        hostname: &str,
        timeout: Duration,
    ) -> Result<(), LinkError> {
        let mut inner = lock(&self.inner);
        inner.associate_calls = inner.associate_calls.saturating_add(1);
        inner.last_hostname = Some(hostname.to_string());

        let ssid_ok = !ssid.is_empty()
            && inner
                .expected_ssid
                .as_deref()
                .map_or(true, |expected| expected == ssid);

        if inner.access_point_up && ssid_ok {
            inner.associated = true;
            Ok(())
        } else {
            inner.associated = false;
            Err(LinkError::AssociationTimeout(timeout.as_millis() as u64))
        }
    }

    fn disassociate(&mut self) {
        let mut inner = lock(&self.inner);
        inner.associated = false;
        inner.disassociate_calls = inner.disassociate_calls.saturating_add(1);
    }

    fn probe(&mut self, _target: &str, _timeout: Duration) -> bool {
        let mut inner = lock(&self.inner);
        inner.probes = inner.probes.saturating_add(1);
        inner.associated && inner.forwarding
    }

    fn advertise(&mut self, hostname: &str) -> Result<(), LinkError> {
        let mut inner = lock(&self.inner);
        if !inner.associated {
            return Err(LinkError::NotAssociated);
        }
        inner.advertised.push(hostname.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Restart line
// ---------------------------------------------------------------------------

/// Counts restart requests instead of resetting the process
#[derive(Debug, Clone, Default)]
pub struct MockSystem {
    restarts: Arc<AtomicU32>,
}

impl MockSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn restarts(&self) -> u32 {
        self.restarts.load(Ordering::SeqCst)
    }
}

impl SystemControl for MockSystem {
    fn restart(&mut self) {
        self.restarts.fetch_add(1, Ordering::SeqCst);
    }
}
