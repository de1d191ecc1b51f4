// ABOUTME: PCM passthrough decoder
// ABOUTME: Copies wire bytes into a PCM chunk unchanged, preserving the timestamp

use bytes::Bytes;

use crate::audio::chunk::PcmChunk;
use crate::audio::decode::Decoder;
use crate::audio::format::AudioFormat;
use crate::error::Error;

pub struct PcmDecoder {
    format: AudioFormat,
}

impl PcmDecoder {
    pub fn new(format: AudioFormat) -> Self {
        Self { format }
    }
}

impl Decoder for PcmDecoder {
    fn decode(&mut self, timestamp_us: i64, payload: &[u8]) -> Result<PcmChunk, Error> {
        Ok(PcmChunk::single(timestamp_us, Bytes::copy_from_slice(payload)))
    }

    fn format(&self) -> AudioFormat {
        self.format
    }
}
