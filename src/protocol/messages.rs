// ABOUTME: Snapcast wire message payload types
// ABOUTME: Base header plus the JSON and binary payload shapes carried by each message type

use serde::{Deserialize, Serialize};

/// Seconds/microseconds pair in server time, matching the wire `tv_t` layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Timestamp {
    pub sec: i32,
    pub usec: i32,
}

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp { sec: 0, usec: 0 };

    pub fn from_micros(us: i64) -> Self {
        Self {
            sec: (us.div_euclid(1_000_000)) as i32,
            usec: (us.rem_euclid(1_000_000)) as i32,
        }
    }

    pub fn as_micros(&self) -> i64 {
        self.sec as i64 * 1_000_000 + self.usec as i64
    }
}

/// Message type tags carried in the base header. Mirrors Snapcast's own numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Hello,
    ServerSettings,
    WireChunk,
    CodecHeader,
    Time,
}

impl MessageType {
    pub fn from_u16(v: u16) -> Option<Self> {
        match v {
            1 => Some(MessageType::Hello),
            2 => Some(MessageType::ServerSettings),
            3 => Some(MessageType::WireChunk),
            4 => Some(MessageType::CodecHeader),
            5 => Some(MessageType::Time),
            _ => None,
        }
    }

    pub fn as_u16(self) -> u16 {
        match self {
            MessageType::Hello => 1,
            MessageType::ServerSettings => 2,
            MessageType::WireChunk => 3,
            MessageType::CodecHeader => 4,
            MessageType::Time => 5,
        }
    }
}

/// Fixed-size frame header preceding every Snapcast payload. All integer fields little-endian.
#[derive(Debug, Clone, Copy)]
pub struct BaseMessage {
    pub msg_type: u16,
    pub id: u16,
    pub refers_to: u16,
    pub sent: Timestamp,
    pub received: Timestamp,
    pub size: u32,
}

pub const BASE_MESSAGE_SIZE: usize = 2 + 2 + 2 + 8 + 8 + 4;

/// HELLO payload (JSON). The client identifies itself by MAC address as both `mac` and `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloPayload {
    pub mac: String,
    pub hostname: String,
    pub version: String,
    pub client_name: String,
    #[serde(rename = "OS")]
    pub os: String,
    pub arch: String,
    pub instance: u32,
    pub id: String,
    #[serde(rename = "protocolVersion")]
    pub protocol_version: u32,
}

impl HelloPayload {
    pub fn new(mac: String, client_name: String, instance: u32) -> Self {
        Self {
            id: mac.clone(),
            mac,
            hostname: client_name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            client_name,
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            instance,
            protocol_version: 2,
        }
    }
}

/// Supported Snapcast audio codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    None,
    Pcm,
    Opus,
}

impl Codec {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "" | "none" => Some(Codec::None),
            "pcm" => Some(Codec::Pcm),
            "opus" => Some(Codec::Opus),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Codec::None => "none",
            Codec::Pcm => "pcm",
            Codec::Opus => "opus",
        }
    }
}

/// SERVER_SETTINGS JSON payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettingsPayload {
    #[serde(rename = "bufferMs")]
    pub buffer_ms: i64,
    pub latency: i64,
    pub muted: bool,
    pub volume: u8,
}

/// Snapshot of the session's active audio settings, mutated only by the protocol client and
/// consumed by the scheduler via a single-slot mailbox.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapcastSettings {
    pub buffer_ms: i64,
    pub chunk_duration_ms: f64,
    pub codec: Codec,
    pub sample_rate: u32,
    pub channels: u8,
    pub bits_per_sample: u8,
    pub muted: bool,
    pub volume: u8,
}

impl Default for SnapcastSettings {
    fn default() -> Self {
        Self {
            buffer_ms: 1000,
            chunk_duration_ms: 0.0,
            codec: Codec::None,
            sample_rate: 48000,
            channels: 2,
            bits_per_sample: 16,
            muted: false,
            volume: 100,
        }
    }
}
