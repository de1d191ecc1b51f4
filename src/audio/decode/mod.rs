// ABOUTME: Decoder shim turning wire chunks into PCM chunks
// ABOUTME: PCM passthrough and Opus decode share one trait so the protocol client stays codec-agnostic

pub mod opus;
pub mod pcm;

use crate::audio::chunk::PcmChunk;
use crate::audio::format::AudioFormat;
use crate::error::Error;

/// Decodes one wire chunk's payload into a `PcmChunk`. Implementations own their own scratch
/// buffers and are reconfigured whenever a new CODEC_HEADER arrives.
pub trait Decoder: Send {
    fn decode(&mut self, timestamp_us: i64, payload: &[u8]) -> Result<PcmChunk, Error>;

    fn format(&self) -> AudioFormat;
}

pub use opus::OpusDecoder;
pub use pcm::PcmDecoder;
