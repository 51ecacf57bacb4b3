use antswitch::config::DeviceSettings;
use antswitch::device::{AntennaSwitch, Parts};
use antswitch::hal::mock::{MockBroker, MockBusClient, MockDelay, MockLink, MockRelays, MockSystem};
use antswitch::hal::{FileStore, Level};
use antswitch::protocol::{
    handle_line, read_request_line, ControlResponse, RequestLine, ResponseStatus, MAX_REQUEST_SIZE,
};
use antswitch::selection::MAX_ANTENNAS;
use clap::{App, Arg};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::time;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_PORT: &str = "8080";
const DEFAULT_STORE: &str = "antswitch-state.json";
const DEFAULT_TICK_MS: &str = "100";

type SimDevice = AntennaSwitch<MockRelays, MockDelay, FileStore, MockBusClient, MockLink, MockSystem>;

/// Fault toggles and inspection hooks that only exist on the simulator
#[derive(Debug, Deserialize)]
#[serde(tag = "sim", rename_all = "snake_case")]
enum SimRequest {
    LinkDown,
    LinkUp,
    BlackHole,
    Forwarding,
    BrokerOffline,
    BrokerOnline,
    Inject {
        payload: String,
        #[serde(default)]
        topic: Option<String>,
        #[serde(default)]
        retain: bool,
    },
    Relays,
    Published,
}

#[derive(Debug, Deserialize)]
struct SimEnvelope {
    #[serde(default)]
    id: u32,
    #[serde(flatten)]
    request: SimRequest,
}

/// Handles that outlive a simulated restart
struct Bench {
    relays: MockRelays,
    broker: MockBroker,
    link: MockLink,
    system: MockSystem,
    store_path: PathBuf,
    settings: DeviceSettings,
    started: Instant,
    restarts_seen: u32,
}

impl Bench {
    fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    fn boot(&self) -> Result<SimDevice, Box<dyn std::error::Error>> {
        let storage = FileStore::open(&self.store_path)?;
        let parts = Parts {
            outputs: self.relays.clone(),
            delay: self.relays.delay(),
            storage,
            bus: self.broker.client(),
            link: self.link.clone(),
            system: self.system.clone(),
        };
        Ok(AntennaSwitch::boot(parts, &self.settings, self.now_ms()))
    }
}

struct Simulator {
    bench: Bench,
    device: SimDevice,
}

impl Simulator {
    /// Drops the device and boots a fresh one from the same durable store,
    /// which is what a real restart does to RAM.
    fn reboot_if_requested(&mut self) {
        let restarts = self.bench.system.restarts();
        if restarts == self.bench.restarts_seen {
            return;
        }
        self.bench.restarts_seen = restarts;
        // Association does not survive a reset.
        self.bench.link.force_associated(false);

        match self.bench.boot() {
            Ok(device) => {
                info!(restarts, "🔄 simulated restart complete");
                self.device = device;
            }
            Err(e) => error!("restart failed to reopen store: {}", e),
        }
    }

    fn tick(&mut self) {
        let now_ms = self.bench.now_ms();
        let report = self.device.tick(now_ms);
        if report.commands_applied > 0 {
            info!(
                applied = report.commands_applied,
                antenna = %self.device.get_state(),
                "📨 bus commands applied"
            );
        }
        self.reboot_if_requested();
    }

    fn handle(&mut self, line: &str) -> String {
        let response = match serde_json::from_str::<SimEnvelope>(line) {
            Ok(envelope) => self.handle_sim(envelope),
            Err(_) => {
                let response = handle_line(&mut self.device, line);
                self.reboot_if_requested();
                serde_json::to_value(&response).unwrap_or_default()
            }
        };
        response.to_string()
    }

    fn handle_sim(&mut self, envelope: SimEnvelope) -> serde_json::Value {
        let id = envelope.id;
        let message = match envelope.request {
            SimRequest::LinkDown => {
                self.bench.link.set_access_point(false);
                "access point down".to_string()
            }
            SimRequest::LinkUp => {
                self.bench.link.set_access_point(true);
                self.bench.link.set_forwarding(true);
                "access point up".to_string()
            }
            SimRequest::BlackHole => {
                self.bench.link.set_forwarding(false);
                "link associated but not forwarding".to_string()
            }
            SimRequest::Forwarding => {
                self.bench.link.set_forwarding(true);
                "link forwarding".to_string()
            }
            SimRequest::BrokerOffline => {
                self.bench.broker.set_online(false);
                "broker offline".to_string()
            }
            SimRequest::BrokerOnline => {
                self.bench.broker.set_online(true);
                "broker online".to_string()
            }
            SimRequest::Inject {
                payload,
                topic,
                retain,
            } => {
                let topic =
                    topic.unwrap_or_else(|| self.device.get_configuration().mqtt.command_topic.clone());
                self.bench.broker.inject(&topic, &payload, retain);
                format!("published '{}' to {}", payload, topic)
            }
            SimRequest::Relays => {
                let levels: Vec<&str> = self
                    .bench
                    .relays
                    .levels()
                    .into_iter()
                    .map(|level| match level {
                        Level::High => "high",
                        Level::Low => "low",
                    })
                    .collect();
                return serde_json::json!({
                    "id": id,
                    "status": ResponseStatus::Success,
                    "relays": levels,
                    "antenna": self.device.get_state(),
                });
            }
            SimRequest::Published => {
                let published: Vec<_> = self
                    .bench
                    .broker
                    .published()
                    .into_iter()
                    .map(|m| serde_json::json!({"topic": m.topic, "payload": m.payload, "retain": m.retain}))
                    .collect();
                return serde_json::json!({
                    "id": id,
                    "status": ResponseStatus::Success,
                    "published": published,
                });
            }
        };

        info!("🔧 {}", message);
        serde_json::to_value(ControlResponse {
            message: Some(message),
            ..ControlResponse::success(id)
        })
        .unwrap_or_default()
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let matches = App::new("antswitch-sim")
        .version("0.1.0")
        .about("📡 Antenna switch host simulator")
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("Control surface TCP port")
                .takes_value(true)
                .default_value(DEFAULT_PORT),
        )
        .arg(
            Arg::with_name("store")
                .short("s")
                .long("store")
                .value_name("FILE")
                .help("Durable state file")
                .takes_value(true)
                .default_value(DEFAULT_STORE),
        )
        .arg(
            Arg::with_name("antennas")
                .short("n")
                .long("antennas")
                .value_name("COUNT")
                .help("Number of antenna paths")
                .takes_value(true)
                .default_value("2")
                .validator(|v| match v.parse::<u8>() {
                    Ok(n) if (1..=MAX_ANTENNAS).contains(&n) => Ok(()),
                    _ => Err(format!("antenna count must be between 1 and {}", MAX_ANTENNAS)),
                }),
        )
        .arg(
            Arg::with_name("active-low")
                .long("active-low")
                .help("Relay outputs energize on a low level"),
        )
        .arg(
            Arg::with_name("check-interval")
                .long("check-interval")
                .value_name("MS")
                .help("Link health check interval in milliseconds")
                .takes_value(true)
                .default_value("30000")
                .validator(|v| match v.parse::<u64>() {
                    Ok(ms) if ms > 0 => Ok(()),
                    _ => Err("interval must be a positive number".into()),
                }),
        )
        .arg(
            Arg::with_name("tick")
                .long("tick")
                .value_name("MS")
                .help("Control loop period in milliseconds")
                .takes_value(true)
                .default_value(DEFAULT_TICK_MS)
                .validator(|v| match v.parse::<u64>() {
                    Ok(ms) if ms > 0 => Ok(()),
                    _ => Err("tick must be a positive number".into()),
                }),
        )
        .get_matches();

    let port: u16 = matches.value_of("port").unwrap_or(DEFAULT_PORT).parse()?;
    let antennas: u8 = matches.value_of("antennas").unwrap_or("2").parse()?;
    let tick_ms: u64 = matches.value_of("tick").unwrap_or(DEFAULT_TICK_MS).parse()?;
    let settings = DeviceSettings {
        active_high: !matches.is_present("active-low"),
        check_interval_ms: matches.value_of("check-interval").unwrap_or("30000").parse()?,
        ..DeviceSettings::default()
    };

    println!("📡 Antenna Switch Simulator");
    println!("===========================");

    let bench = Bench {
        relays: MockRelays::new(antennas),
        broker: MockBroker::new(),
        link: MockLink::new(),
        system: MockSystem::new(),
        store_path: PathBuf::from(matches.value_of("store").unwrap_or(DEFAULT_STORE)),
        settings,
        started: Instant::now(),
        restarts_seen: 0,
    };
    let device = bench.boot()?;
    info!(
        antennas,
        store = %bench.store_path.display(),
        antenna = %device.get_state(),
        "device booted"
    );

    let sim = Arc::new(Mutex::new(Simulator { bench, device }));

    let tcp_sim = Arc::clone(&sim);
    let tcp_server = tokio::spawn(async move {
        if let Err(e) = start_tcp_server(tcp_sim, port).await {
            error!("TCP server error: {}", e);
        }
    });

    let mut interval = time::interval(Duration::from_millis(tick_ms));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                sim.lock().await.tick();
            }
            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    tcp_server.abort();
    println!("🛑 Antenna switch simulator stopped");

    Ok(())
}

async fn start_tcp_server(
    sim: Arc<Mutex<Simulator>>,
    port: u16,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    info!("🌐 control surface listening on port {}", port);

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("🔗 client connected: {}", addr);
                let client_sim = Arc::clone(&sim);
                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, client_sim).await {
                        warn!("client {} error: {}", addr, e);
                    }
                    info!("🔌 client {} disconnected", addr);
                });
            }
            Err(e) => {
                error!("failed to accept connection: {}", e);
            }
        }
    }
}

async fn handle_client(
    stream: TcpStream,
    sim: Arc<Mutex<Simulator>>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    while let Some(line) = read_request_line(&mut reader).await? {
        let response = match line {
            RequestLine::Line(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                sim.lock().await.handle(trimmed)
            }
            RequestLine::TooLarge => {
                warn!("dropped request over {} bytes", MAX_REQUEST_SIZE);
                let response = ControlResponse::invalid(
                    0,
                    format!("request exceeds {} bytes", MAX_REQUEST_SIZE),
                );
                serde_json::to_string(&response).unwrap_or_default()
            }
        };
        writer.write_all(response.as_bytes()).await?;
        writer.write_all(b"\n").await?;
    }

    Ok(())
}
