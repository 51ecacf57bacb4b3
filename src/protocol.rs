//! Control-surface request/response types.
//!
//! Requests are single JSON objects, one per line on the simulator's TCP
//! transport:
//!
//! ```text
//! {"id":1,"op":"get_state"}                 -> {"id":1,"status":"success","antenna":2}
//! {"id":2,"op":"set_antenna","antenna":9}   -> {"id":2,"status":"success","antenna":0}
//! ```
//!
//! The core is transport-agnostic; [`dispatch`] maps a decoded request onto
//! the device operations.

use crate::config::{ConfigChange, Configuration};
use crate::device::{AntennaSwitch, DeviceStatus};
use crate::error::ControlError;
use crate::hal::{BusClient, Delay, KeyValueStore, NetworkLink, RelayOutputs, SystemControl};
use crate::selection::AntennaSelection;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

pub const MAX_REQUEST_SIZE: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlRequest {
    #[serde(default)]
    pub id: u32,
    #[serde(flatten)]
    pub op: ControlOp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ControlOp {
    GetState,
    SetAntenna {
        antenna: i64,
    },
    GetConfig,
    SetConfig {
        config: Configuration,
    },
    Status,
    Restart,
    FirmwareUpdateResult {
        success: bool,
        #[serde(default)]
        message: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Success,
    Rejected,
    InvalidRequest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlResponse {
    pub id: u32,
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub antenna: Option<AntennaSelection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Configuration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change: Option<ConfigChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ControlResponse {
    pub fn success(id: u32) -> Self {
        Self {
            id,
            status: ResponseStatus::Success,
            antenna: None,
            config: None,
            change: None,
            device: None,
            message: None,
        }
    }

    pub fn rejected(id: u32, message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Rejected,
            message: Some(message.into()),
            ..Self::success(id)
        }
    }

    pub fn invalid(id: u32, message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::InvalidRequest,
            message: Some(message.into()),
            ..Self::success(id)
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }
}

pub fn parse_request(line: &str) -> Result<ControlRequest, ControlError> {
    if line.len() > MAX_REQUEST_SIZE {
        return Err(ControlError::TooLarge(line.len()));
    }
    Ok(serde_json::from_str(line.trim())?)
}

/// One line taken off a control-surface stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestLine {
    Line(String),
    /// Longer than [`MAX_REQUEST_SIZE`]. The rest of the line was discarded.
    TooLarge,
}

/// Reads the next request line without buffering more than
/// [`MAX_REQUEST_SIZE`] bytes of it. Returns `None` at end of stream.
pub async fn read_request_line<R>(reader: &mut R) -> std::io::Result<Option<RequestLine>>
where
    R: AsyncBufRead + Unpin,
{
    // Room for a "\r\n" terminator.
    let limit = MAX_REQUEST_SIZE as u64 + 2;
    let mut buf = Vec::new();

    let read = (&mut *reader).take(limit).read_until(b'\n', &mut buf).await?;
    if read == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&b'\n') || (read as u64) < limit {
        return Ok(Some(RequestLine::Line(String::from_utf8_lossy(&buf).into_owned())));
    }

    loop {
        buf.clear();
        let read = (&mut *reader).take(limit).read_until(b'\n', &mut buf).await?;
        if read == 0 || buf.last() == Some(&b'\n') {
            break;
        }
    }
    Ok(Some(RequestLine::TooLarge))
}

/// Applies one request to the device and builds its response.
pub fn dispatch<O, D, S, C, L, R>(
    device: &mut AntennaSwitch<O, D, S, C, L, R>,
    request: ControlRequest,
) -> ControlResponse
where
    O: RelayOutputs,
    D: Delay,
    S: KeyValueStore,
    C: BusClient,
    L: NetworkLink,
    R: SystemControl,
{
    let id = request.id;
    match request.op {
        ControlOp::GetState => ControlResponse {
            antenna: Some(device.get_state()),
            ..ControlResponse::success(id)
        },
        ControlOp::SetAntenna { antenna } => ControlResponse {
            antenna: Some(device.set_antenna(antenna)),
            ..ControlResponse::success(id)
        },
        ControlOp::GetConfig => ControlResponse {
            config: Some(device.get_configuration().clone()),
            ..ControlResponse::success(id)
        },
        ControlOp::SetConfig { config } => match device.set_configuration(config) {
            Ok(change) => ControlResponse {
                change: Some(change),
                message: change
                    .restart_required
                    .then(|| "network settings apply after restart".to_string()),
                ..ControlResponse::success(id)
            },
            Err(e) => ControlResponse::rejected(id, ControlError::from(e).to_string()),
        },
        ControlOp::Status => ControlResponse {
            device: Some(device.status()),
            ..ControlResponse::success(id)
        },
        ControlOp::Restart => {
            device.restart();
            ControlResponse {
                message: Some("restarting".to_string()),
                ..ControlResponse::success(id)
            }
        }
        ControlOp::FirmwareUpdateResult { success, message } => {
            if success {
                device.firmware_update_finished(Ok(()));
                ControlResponse {
                    message: Some("update applied, restarting".to_string()),
                    ..ControlResponse::success(id)
                }
            } else {
                let reason = message.unwrap_or_else(|| "update failed".to_string());
                device.firmware_update_finished(Err(reason.clone()));
                ControlResponse::rejected(id, reason)
            }
        }
    }
}

/// Parses and dispatches one line; malformed input yields an
/// `invalid_request` response with id 0.
pub fn handle_line<O, D, S, C, L, R>(
    device: &mut AntennaSwitch<O, D, S, C, L, R>,
    line: &str,
) -> ControlResponse
where
    O: RelayOutputs,
    D: Delay,
    S: KeyValueStore,
    C: BusClient,
    L: NetworkLink,
    R: SystemControl,
{
    match parse_request(line) {
        Ok(request) => dispatch(device, request),
        Err(e) => ControlResponse::invalid(0, e.to_string()),
    }
}
