//! Inbound queue messages from the demodulator front end.
//!
//! A message is a (type, arg1, payload) triple. Channel messages (types >= 0 and -1, -3, -5,
//! -6) start with the `aa 55` marker and a 2-byte queue id; UI commands (-2) carry plain text.

use core::fmt;

use serde::Deserialize;

use p25_core::Nac;

/// Marker in front of every channel message
pub const QMSG_PREFIX: [u8; 2] = [0xaa, 0x55];

pub const MTYPE_TIMEOUT: i32 = -1;
pub const MTYPE_COMMAND: i32 = -2;
pub const MTYPE_CALL_INFO: i32 = -3;
pub const MTYPE_NXDN: i32 = -5;
pub const MTYPE_TDMA_CC: i32 = -6;

/// NAC reported by the front end when none could be decoded
pub const NAC_INVALID: u16 = 0xffff;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMsg {
    pub mtype: i32,
    pub arg1: i64,
    pub payload: Vec<u8>,
}

fn with_prefix(queue_id: u16, body: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(body.len() + 4);
    payload.extend_from_slice(&QMSG_PREFIX);
    payload.extend_from_slice(&queue_id.to_be_bytes());
    payload.extend_from_slice(body);
    payload
}

impl QueueMsg {
    pub fn timeout(queue_id: u16) -> Self {
        QueueMsg { mtype: MTYPE_TIMEOUT, arg1: 0, payload: with_prefix(queue_id, &[]) }
    }

    pub fn command(text: &str, arg1: i64) -> Self {
        QueueMsg { mtype: MTYPE_COMMAND, arg1, payload: text.as_bytes().to_vec() }
    }

    /// Data unit `duid` received with `nac`, followed by the raw message bytes
    pub fn data_unit(queue_id: u16, duid: u8, nac: Nac, body: &[u8]) -> Self {
        let mut inner = nac.to_be_bytes().to_vec();
        inner.extend_from_slice(body);
        QueueMsg { mtype: duid as i32, arg1: 0, payload: with_prefix(queue_id, &inner) }
    }

    pub fn tdma(queue_id: u16, nac: Nac, blk: &[u8]) -> Self {
        let mut inner = nac.to_be_bytes().to_vec();
        inner.push(0);
        inner.extend_from_slice(blk);
        QueueMsg { mtype: MTYPE_TDMA_CC, arg1: 0, payload: with_prefix(queue_id, &inner) }
    }

    pub fn call_info(queue_id: u16, json: &str) -> Self {
        QueueMsg { mtype: MTYPE_CALL_INFO, arg1: 0, payload: with_prefix(queue_id, json.as_bytes()) }
    }

    pub fn nxdn(queue_id: u16, kind: u8, lich: u8, cac: &[u8]) -> Self {
        let mut inner = vec![kind, lich];
        inner.extend_from_slice(cac);
        QueueMsg { mtype: MTYPE_NXDN, arg1: 0, payload: with_prefix(queue_id, &inner) }
    }

    /// Parses one line of a recorded message stream: `<type> <arg1> <payload>`.
    /// The payload is hex for channel messages and plain text for commands.
    /// Returns `Ok(None)` for blank lines and `#` comments.
    pub fn from_line(line: &str) -> Result<Option<Self>, QmsgErr> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }
        let mut parts = line.splitn(3, char::is_whitespace);
        let mtype = parts.next().and_then(|s| s.parse::<i32>().ok()).ok_or(QmsgErr::BadLine { field: "type" })?;
        let arg1 = parts.next().and_then(|s| s.parse::<i64>().ok()).ok_or(QmsgErr::BadLine { field: "arg1" })?;
        let rest = parts.next().unwrap_or("").trim();
        let payload = if mtype == MTYPE_COMMAND { rest.as_bytes().to_vec() } else { decode_hex(rest)? };
        Ok(Some(QueueMsg { mtype, arg1, payload }))
    }

    pub fn parse(&self) -> Result<InboundMsg, QmsgErr> {
        let carries_prefix = self.mtype >= 0 || matches!(self.mtype, MTYPE_TIMEOUT | MTYPE_CALL_INFO | MTYPE_NXDN | MTYPE_TDMA_CC);
        let has_prefix = self.payload.starts_with(&QMSG_PREFIX);

        if !carries_prefix {
            if has_prefix {
                return Err(QmsgErr::UnexpectedPrefix { mtype: self.mtype });
            }
            if self.mtype == MTYPE_COMMAND {
                let text = std::str::from_utf8(&self.payload)?.trim();
                let (name, data) = match text.split_once(char::is_whitespace) {
                    Some((name, data)) => (name, Some(data.trim().to_string())),
                    None => (text, None),
                };
                return Ok(InboundMsg::Command { name: name.to_string(), data, arg: self.arg1 });
            }
            return Ok(InboundMsg::Unknown { mtype: self.mtype });
        }

        if !has_prefix {
            return Err(QmsgErr::MissingPrefix { mtype: self.mtype });
        }
        let [_, _, q0, q1, body @ ..] = self.payload.as_slice() else {
            return Err(QmsgErr::Truncated { mtype: self.mtype, needed: 4, found: self.payload.len() });
        };
        let queue_id = u16::from_be_bytes([*q0, *q1]);
        let truncated = |needed: usize| QmsgErr::Truncated { mtype: self.mtype, needed: needed + 4, found: self.payload.len() };

        Ok(match self.mtype {
            MTYPE_TIMEOUT => InboundMsg::Timeout { queue_id },
            MTYPE_CALL_INFO => InboundMsg::CallInfo { queue_id, info: serde_json::from_slice(body)? },
            MTYPE_TDMA_CC => {
                let [n0, n1, _, blk @ ..] = body else {
                    return Err(truncated(3));
                };
                InboundMsg::Tdma { queue_id, nac: u16::from_be_bytes([*n0, *n1]), blk: blk.to_vec() }
            }
            MTYPE_NXDN => {
                let [kind, lich, cac @ ..] = body else {
                    return Err(truncated(2));
                };
                InboundMsg::Nxdn { queue_id, kind: *kind, lich: *lich, cac: cac.to_vec() }
            }
            duid if duid >= 0 => {
                let [n0, n1, rest @ ..] = body else {
                    return Err(truncated(2));
                };
                InboundMsg::DataUnit { queue_id, nac: u16::from_be_bytes([*n0, *n1]), duid, body: rest.to_vec() }
            }
            mtype => InboundMsg::Unknown { mtype },
        })
    }
}

fn decode_hex(s: &str) -> Result<Vec<u8>, QmsgErr> {
    let digits: Vec<u8> = s.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return Err(QmsgErr::BadLine { field: "payload" });
    }
    digits
        .chunks(2)
        .map(|pair| {
            let hi = (pair[0] as char).to_digit(16);
            let lo = (pair[1] as char).to_digit(16);
            match (hi, lo) {
                (Some(hi), Some(lo)) => Ok((hi * 16 + lo) as u8),
                _ => Err(QmsgErr::BadLine { field: "payload" }),
            }
        })
        .collect()
}

/// Call signalling side channel, sent alongside voice
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CallInfo {
    pub nac: Nac,
    pub srcaddr: Option<u32>,
    pub grpaddr: Option<u32>,
    pub algid: Option<u8>,
    pub alg: Option<String>,
    pub keyid: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMsg {
    /// Voice or trunking data unit with its NAC
    DataUnit { queue_id: u16, nac: Nac, duid: i32, body: Vec<u8> },
    CallInfo { queue_id: u16, info: CallInfo },
    /// UI command, `data` holds anything after the first word
    Command { name: String, data: Option<String>, arg: i64 },
    Timeout { queue_id: u16 },
    Nxdn { queue_id: u16, kind: u8, lich: u8, cac: Vec<u8> },
    Tdma { queue_id: u16, nac: Nac, blk: Vec<u8> },
    Unknown { mtype: i32 },
}

#[derive(Debug)]
pub enum QmsgErr {
    Truncated { mtype: i32, needed: usize, found: usize },
    MissingPrefix { mtype: i32 },
    UnexpectedPrefix { mtype: i32 },
    Json(serde_json::Error),
    Utf8(std::str::Utf8Error),
    /// Recorded stream line could not be split into type, arg1 and payload
    BadLine { field: &'static str },
}

impl fmt::Display for QmsgErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QmsgErr::Truncated { mtype, needed, found } => {
                write!(f, "message type {} truncated: need {} bytes, got {}", mtype, needed, found)
            }
            QmsgErr::MissingPrefix { mtype } => write!(f, "message type {} without aa55 prefix", mtype),
            QmsgErr::UnexpectedPrefix { mtype } => write!(f, "message type {} must not carry aa55 prefix", mtype),
            QmsgErr::Json(e) => write!(f, "call info json: {}", e),
            QmsgErr::Utf8(e) => write!(f, "command text: {}", e),
            QmsgErr::BadLine { field } => write!(f, "bad message line: invalid {}", field),
        }
    }
}

impl std::error::Error for QmsgErr {}

impl From<serde_json::Error> for QmsgErr {
    fn from(e: serde_json::Error) -> Self {
        QmsgErr::Json(e)
    }
}

impl From<std::str::Utf8Error> for QmsgErr {
    fn from(e: std::str::Utf8Error) -> Self {
        QmsgErr::Utf8(e)
    }
}
