use antswitch::config::Configuration;
use antswitch::protocol::{ControlOp, ControlRequest, ControlResponse, ResponseStatus};
use antswitch::selection::AntennaSelection;
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use colored::*;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: &str = "8080";
const RESPONSE_TIMEOUT_SECS: u64 = 5;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("antswitch")
        .version("0.1.0")
        .about("📡 Antenna switch control client")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("host")
                .short("h")
                .long("host")
                .value_name("HOST")
                .help("Device or simulator host address")
                .takes_value(true)
                .default_value(DEFAULT_HOST)
                .global(true),
        )
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("Control surface port")
                .takes_value(true)
                .default_value(DEFAULT_PORT)
                .global(true),
        )
        .arg(
            Arg::with_name("format")
                .short("f")
                .long("format")
                .value_name("FORMAT")
                .help("Output format")
                .takes_value(true)
                .possible_values(&["json", "table"])
                .default_value("table")
                .global(true),
        )
        .subcommand(SubCommand::with_name("state").about("📍 Show the selected antenna"))
        .subcommand(
            SubCommand::with_name("set")
                .about("🔀 Select an antenna path")
                .arg(
                    Arg::with_name("antenna")
                        .help("Antenna number, or 'off' to de-energize every path")
                        .required(true)
                        .validator(|v| {
                            if v.eq_ignore_ascii_case("off") || v.parse::<i64>().is_ok() {
                                Ok(())
                            } else {
                                Err("antenna must be a number or 'off'".into())
                            }
                        }),
                ),
        )
        .subcommand(
            SubCommand::with_name("config")
                .about("⚙️  Runtime configuration")
                .setting(AppSettings::SubcommandRequiredElseHelp)
                .subcommand(SubCommand::with_name("show").about("Show the stored configuration"))
                .subcommand(
                    SubCommand::with_name("bus")
                        .about("Update message bus settings")
                        .arg(Arg::with_name("enable").long("enable").conflicts_with("disable"))
                        .arg(Arg::with_name("disable").long("disable"))
                        .arg(Arg::with_name("broker").long("broker").takes_value(true))
                        .arg(
                            Arg::with_name("broker-port")
                                .long("broker-port")
                                .takes_value(true)
                                .validator(|v| match v.parse::<u16>() {
                                    Ok(_) => Ok(()),
                                    Err(_) => Err("port must be 0-65535".into()),
                                }),
                        )
                        .arg(Arg::with_name("user").long("user").takes_value(true))
                        .arg(Arg::with_name("password").long("password").takes_value(true))
                        .arg(Arg::with_name("command-topic").long("command-topic").takes_value(true))
                        .arg(Arg::with_name("state-topic").long("state-topic").takes_value(true)),
                )
                .subcommand(
                    SubCommand::with_name("wifi")
                        .about("Update network credentials (applied after restart)")
                        .arg(Arg::with_name("ssid").required(true))
                        .arg(Arg::with_name("password").required(false)),
                )
                .subcommand(
                    SubCommand::with_name("gateway")
                        .about("Set the address probed by the link health check")
                        .arg(Arg::with_name("address").required(true)),
                ),
        )
        .subcommand(SubCommand::with_name("status").about("📊 Device status and recent events"))
        .subcommand(
            SubCommand::with_name("restart")
                .about("🔄 Restart the device")
                .arg(
                    Arg::with_name("confirm")
                        .long("confirm")
                        .help("Confirm the restart")
                        .required(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("firmware")
                .about("📦 Report the outcome of a firmware upload")
                .arg(
                    Arg::with_name("result")
                        .required(true)
                        .possible_values(&["ok", "failed"]),
                )
                .arg(Arg::with_name("message").long("message").takes_value(true)),
        )
        .subcommand(
            SubCommand::with_name("sim")
                .about("🧪 Simulator fault toggles")
                .arg(
                    Arg::with_name("action")
                        .required(true)
                        .possible_values(&[
                            "link-down",
                            "link-up",
                            "black-hole",
                            "forwarding",
                            "broker-offline",
                            "broker-online",
                            "inject",
                            "relays",
                            "published",
                        ]),
                )
                .arg(
                    Arg::with_name("payload")
                        .help("Payload for 'inject'")
                        .required_if("action", "inject"),
                )
                .arg(Arg::with_name("topic").long("topic").takes_value(true))
                .arg(Arg::with_name("retain").long("retain")),
        )
        .get_matches();

    let host = matches.value_of("host").unwrap_or(DEFAULT_HOST);
    let port = matches.value_of("port").unwrap_or(DEFAULT_PORT).parse::<u16>()?;
    let format = matches.value_of("format").unwrap_or("table");

    match matches.subcommand() {
        ("state", _) => {
            let response = send_request(host, port, request(ControlOp::GetState)).await?;
            print_antenna("Antenna", &response, format);
        }
        ("set", Some(sub)) => {
            let raw = sub.value_of("antenna").unwrap_or("0");
            let antenna = if raw.eq_ignore_ascii_case("off") {
                0
            } else {
                raw.parse::<i64>()?
            };
            let response =
                send_request(host, port, request(ControlOp::SetAntenna { antenna })).await?;
            print_antenna("Antenna set", &response, format);
        }
        ("config", Some(sub)) => handle_config(sub, host, port, format).await?,
        ("status", _) => {
            let response = send_request(host, port, request(ControlOp::Status)).await?;
            print_status(&response, format);
        }
        ("restart", Some(_)) => {
            let response = send_request(host, port, request(ControlOp::Restart)).await?;
            print_result("Restart", &response, format);
        }
        ("firmware", Some(sub)) => {
            let op = ControlOp::FirmwareUpdateResult {
                success: sub.value_of("result") == Some("ok"),
                message: sub.value_of("message").map(str::to_string),
            };
            let response = send_request(host, port, request(op)).await?;
            print_result("Firmware update", &response, format);
        }
        ("sim", Some(sub)) => handle_sim(sub, host, port, format).await?,
        _ => {
            println!("{}", "No command specified. Use --help for usage information.".yellow());
        }
    }

    Ok(())
}

async fn handle_config(
    matches: &ArgMatches<'_>,
    host: &str,
    port: u16,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let current = send_request(host, port, request(ControlOp::GetConfig)).await?;
    let response: ControlResponse = serde_json::from_str(&current)?;
    let mut config: Configuration = match response.config {
        Some(config) => config,
        None => {
            print_result("Configuration", &current, format);
            return Ok(());
        }
    };

    match matches.subcommand() {
        ("show", _) => {
            print_config(&config, &current, format);
            return Ok(());
        }
        ("bus", Some(sub)) => {
            if sub.is_present("enable") {
                config.mqtt.enabled = true;
            }
            if sub.is_present("disable") {
                config.mqtt.enabled = false;
            }
            if let Some(broker) = sub.value_of("broker") {
                config.mqtt.broker = broker.to_string();
            }
            if let Some(p) = sub.value_of("broker-port") {
                config.mqtt.port = p.parse()?;
            }
            if let Some(user) = sub.value_of("user") {
                config.mqtt.username = user.to_string();
            }
            if let Some(password) = sub.value_of("password") {
                config.mqtt.password = password.to_string();
            }
            if let Some(topic) = sub.value_of("command-topic") {
                config.mqtt.command_topic = topic.to_string();
            }
            if let Some(topic) = sub.value_of("state-topic") {
                config.mqtt.state_topic = topic.to_string();
            }
        }
        ("wifi", Some(sub)) => {
            config.wifi.ssid = sub.value_of("ssid").unwrap_or_default().to_string();
            config.wifi.password = sub.value_of("password").unwrap_or_default().to_string();
        }
        ("gateway", Some(sub)) => {
            config.gateway = sub.value_of("address").unwrap_or_default().to_string();
        }
        _ => {
            println!("{}", "Config subcommand required. Use 'antswitch config --help' for options.".yellow());
            return Ok(());
        }
    }

    let response = send_request(host, port, request(ControlOp::SetConfig { config })).await?;
    print_result("Configuration", &response, format);
    Ok(())
}

async fn handle_sim(
    matches: &ArgMatches<'_>,
    host: &str,
    port: u16,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let action = matches.value_of("action").unwrap_or("relays");
    let mut body = serde_json::json!({
        "id": request_id(),
        "sim": action.replace('-', "_"),
    });
    if action == "inject" {
        body["payload"] = serde_json::Value::from(matches.value_of("payload").unwrap_or_default());
        if let Some(topic) = matches.value_of("topic") {
            body["topic"] = serde_json::Value::from(topic);
        }
        body["retain"] = serde_json::Value::from(matches.is_present("retain"));
    }

    let response = send_command(host, port, body.to_string()).await?;
    match (format, action) {
        ("json", _) => println!("{}", response),
        (_, "relays") => print_relays(&response),
        (_, "published") => print_published(&response),
        _ => print_result("Simulator", &response, format),
    }
    Ok(())
}

// Helper functions

fn request(op: ControlOp) -> ControlRequest {
    ControlRequest { id: request_id(), op }
}

fn request_id() -> u32 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u32)
        .unwrap_or(1)
}

async fn send_request(
    host: &str,
    port: u16,
    request: ControlRequest,
) -> Result<String, Box<dyn std::error::Error>> {
    send_command(host, port, serde_json::to_string(&request)?).await
}

async fn send_command(host: &str, port: u16, command: String) -> Result<String, Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", host, port);
    let stream = match TcpStream::connect(&addr).await {
        Ok(stream) => stream,
        Err(e) => {
            eprintln!("{} Failed to connect to antenna switch at {}", "❌".red(), addr.bright_white());
            if e.kind() == std::io::ErrorKind::ConnectionRefused {
                eprintln!("{} Nothing is listening. Start the simulator with:", "💡".yellow());
                eprintln!("   {}", "cargo run --bin antswitch-sim".bright_cyan());
            } else {
                eprintln!("{} Network error: {}", "🔌".yellow(), e.to_string().bright_red());
            }
            return Err(e.into());
        }
    };

    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    match tokio::time::timeout(std::time::Duration::from_secs(RESPONSE_TIMEOUT_SECS), async {
        writer.write_all(command.as_bytes()).await?;
        writer.write_all(b"\n").await?;

        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "server closed connection",
            ));
        }
        Ok(line.trim_end().to_string())
    })
    .await
    {
        Ok(result) => Ok(result?),
        Err(_) => {
            eprintln!("{} No response after {} seconds", "⏰".yellow(), RESPONSE_TIMEOUT_SECS);
            Err("request timeout".into())
        }
    }
}

fn parse_response(response: &str) -> Option<ControlResponse> {
    serde_json::from_str(response).ok()
}

fn print_rejection(action: &str, parsed: &ControlResponse) {
    let message = parsed.message.as_deref().unwrap_or("request rejected");
    match parsed.status {
        ResponseStatus::InvalidRequest => {
            println!("{} {} invalid: {}", "❓".blue(), action.bright_white(), message.bright_red());
        }
        _ => {
            println!("{} {} failed: {}", "❌".red(), action.bright_white(), message.bright_red());
        }
    }
}

fn print_antenna(action: &str, response: &str, format: &str) {
    if format == "json" {
        println!("{}", response);
        return;
    }
    match parse_response(response) {
        Some(parsed) if parsed.is_success() => {
            let antenna = parsed.antenna.map(|a| a.to_string()).unwrap_or_default();
            println!("{} {}: {}", "✅".green(), action.bright_white(), antenna.bright_cyan());
        }
        Some(parsed) => print_rejection(action, &parsed),
        None => println!("{}", response),
    }
}

fn print_result(action: &str, response: &str, format: &str) {
    if format == "json" {
        println!("{}", response);
        return;
    }
    match parse_response(response) {
        Some(parsed) if parsed.is_success() => {
            let message = parsed.message.as_deref().unwrap_or("done");
            println!("{} {}: {}", "✅".green(), action.bright_white(), message.bright_cyan());
            if let Some(change) = parsed.change {
                if change.restart_required {
                    println!("{} Run {} to apply network changes", "💡".yellow(), "antswitch restart --confirm".bright_cyan());
                }
            }
        }
        Some(parsed) => print_rejection(action, &parsed),
        None => println!("{}", response),
    }
}

fn print_config(config: &Configuration, response: &str, format: &str) {
    if format == "json" {
        println!("{}", response);
        return;
    }
    let secret = |s: &str| if s.is_empty() { "(none)".dimmed() } else { "********".normal() };
    let bus = if config.mqtt.enabled { "ENABLED".bright_green() } else { "DISABLED".bright_red() };

    println!("\n{}", "⚙️  Configuration".bright_blue().bold());
    println!("{}", "═════════════════".bright_blue());
    println!("{:<16} {}", "WiFi SSID:".bright_white(), config.wifi.ssid);
    println!("{:<16} {}", "WiFi password:".bright_white(), secret(&config.wifi.password));
    println!("{:<16} {}", "Gateway:".bright_white(), config.gateway);
    println!("{:<16} {}", "Bus:".bright_white(), bus);
    println!("{:<16} {}:{}", "Broker:".bright_white(), config.mqtt.broker, config.mqtt.port);
    println!("{:<16} {}", "User:".bright_white(), config.mqtt.username);
    println!("{:<16} {}", "Password:".bright_white(), secret(&config.mqtt.password));
    println!("{:<16} {}", "Command topic:".bright_white(), config.mqtt.command_topic);
    println!("{:<16} {}", "State topic:".bright_white(), config.mqtt.state_topic);
}

fn print_status(response: &str, format: &str) {
    if format == "json" {
        println!("{}", response);
        return;
    }
    let parsed = match parse_response(response) {
        Some(parsed) => parsed,
        None => {
            println!("{} Failed to parse status", "❌".red());
            return;
        }
    };
    let status = match parsed.device.clone() {
        Some(status) => status,
        None => return print_rejection("Status", &parsed),
    };

    let link = if status.link_associated { "UP".bright_green() } else { "DOWN".bright_red() };
    let bus = format!("{:?}", status.bus_state);

    println!("\n{}", "📊 Antenna Switch Status".bright_blue().bold());
    println!("{}", "════════════════════════".bright_blue());
    println!("{:<20} {} of {}", "Antenna:".bright_white(), status.antenna.to_string().bright_cyan(), status.antenna_count);
    println!("{:<20} {}", "Link:".bright_white(), link);
    println!("{:<20} {}", "Bus:".bright_white(), bus);
    println!(
        "{:<20} {}/{}",
        "Probe failures:".bright_white(),
        status.health.consecutive_failures,
        status.health.failure_ceiling
    );
    println!("{:<20} {}s", "Uptime:".bright_white(), status.uptime_ms / 1000);
    println!(
        "{:<20} connects {} | failed {} | drops {} | commands {}",
        "Bus stats:".bright_white(),
        status.bus_stats.connects,
        status.bus_stats.failed_attempts,
        status.bus_stats.drops,
        status.bus_stats.commands_accepted
    );
    if status.storage_write_failures > 0 {
        println!("{:<20} {}", "Storage failures:".bright_white(), status.storage_write_failures.to_string().bright_red());
    }
    if status.restart_pending {
        println!("{}", "⚠️  Restart pending".yellow());
    }

    if !status.recent_events.is_empty() {
        println!("\n{}", "Recent events".bright_white().bold());
        for event in &status.recent_events {
            let kind = serde_json::to_string(&event.kind).unwrap_or_default();
            println!("  #{:<5} {:>8}ms  {}", event.id, event.timestamp_ms, kind.dimmed());
        }
    }
}

fn print_relays(response: &str) {
    let parsed: serde_json::Value = match serde_json::from_str(response) {
        Ok(value) => value,
        Err(_) => return println!("{}", response),
    };
    let antenna = serde_json::from_value::<AntennaSelection>(parsed["antenna"].clone())
        .map_or_else(|_| "?".to_string(), |selection| selection.to_string());
    println!("{} {}", "Antenna:".bright_white(), antenna.bright_cyan());
    if let Some(levels) = parsed["relays"].as_array() {
        for (i, level) in levels.iter().enumerate() {
            let level = level.as_str().unwrap_or("?");
            let shown = if level == "high" { level.bright_green() } else { level.dimmed() };
            println!("  relay {} {}", i + 1, shown);
        }
    }
}

fn print_published(response: &str) {
    let parsed: serde_json::Value = match serde_json::from_str(response) {
        Ok(value) => value,
        Err(_) => return println!("{}", response),
    };
    if let Some(messages) = parsed["published"].as_array() {
        for message in messages {
            let retain = if message["retain"].as_bool().unwrap_or(false) { " (retained)" } else { "" };
            println!(
                "  {} {}{}",
                message["topic"].as_str().unwrap_or("?").bright_white(),
                message["payload"].as_str().unwrap_or("").bright_cyan(),
                retain.dimmed()
            );
        }
    }
}
