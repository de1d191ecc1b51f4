// ABOUTME: Crate-wide error type
// ABOUTME: Covers transport, protocol, decode and configuration failures

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("unknown codec: {0}")]
    UnknownCodec(String),

    #[error("unsupported message type: {0}")]
    UnsupportedMessageType(u16),

    #[error("decode failed: {0}")]
    DecodeFailed(String),

    #[error("allocation failed: {0}")]
    AllocFailed(String),

    #[error("clock not synchronized")]
    NotSynchronized,

    #[error("configuration rejected: {0}")]
    ConfigRejected(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("output error: {0}")]
    Output(String),
}
