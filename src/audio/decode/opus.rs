// ABOUTME: Opus decoder shim backed by libopus bindings
// ABOUTME: Grows its scratch buffer on BufferTooSmall instead of failing the chunk

use audiopus::coder::Decoder as OpusCoder;
use audiopus::{Channels, ErrorCode, SampleRate};
use bytes::Bytes;

use crate::audio::chunk::PcmChunk;
use crate::audio::decode::Decoder;
use crate::audio::format::AudioFormat;
use crate::error::Error;

/// 2.5ms frame at 48kHz; grows by doubling up to a full 20ms frame (960 samples) and beyond if
/// the stream ever demands it.
const INITIAL_SAMPLES_PER_CHANNEL: usize = 120;

fn sample_rate_from_hz(hz: u32) -> Result<SampleRate, Error> {
    match hz {
        8000 => Ok(SampleRate::Hz8000),
        12000 => Ok(SampleRate::Hz12000),
        16000 => Ok(SampleRate::Hz16000),
        24000 => Ok(SampleRate::Hz24000),
        48000 => Ok(SampleRate::Hz48000),
        other => Err(Error::ConfigRejected(format!(
            "opus does not support sample rate {other}Hz"
        ))),
    }
}

fn channels_from_count(channels: u8) -> Result<Channels, Error> {
    match channels {
        1 => Ok(Channels::Mono),
        2 => Ok(Channels::Stereo),
        other => Err(Error::ConfigRejected(format!(
            "opus does not support {other} channels"
        ))),
    }
}

/// Holds an Opus decoder state configured from the most recent CODEC_HEADER's rate and channel
/// count. Retries into a bigger scratch buffer on `BufferTooSmall` instead of dropping the chunk.
pub struct OpusDecoder {
    decoder: OpusCoder,
    format: AudioFormat,
    buffer: Vec<i16>,
}

impl OpusDecoder {
    pub fn new(format: AudioFormat) -> Result<Self, Error> {
        let sample_rate = sample_rate_from_hz(format.sample_rate)?;
        let channels = channels_from_count(format.channels)?;
        let decoder = OpusCoder::new(sample_rate, channels)
            .map_err(|e| Error::DecodeFailed(format!("opus decoder init failed: {e}")))?;
        Ok(Self {
            decoder,
            format,
            buffer: vec![0i16; INITIAL_SAMPLES_PER_CHANNEL * format.channels as usize],
        })
    }
}

impl Decoder for OpusDecoder {
    fn decode(&mut self, timestamp_us: i64, payload: &[u8]) -> Result<PcmChunk, Error> {
        loop {
            match self.decoder.decode(Some(payload), &mut self.buffer, false) {
                Ok(samples_per_channel) => {
                    let total_samples = samples_per_channel * self.format.channels as usize;
                    let mut bytes = Vec::with_capacity(total_samples * 2);
                    for sample in &self.buffer[..total_samples] {
                        bytes.extend_from_slice(&sample.to_le_bytes());
                    }
                    return Ok(PcmChunk::single(timestamp_us, Bytes::from(bytes)));
                }
                Err(audiopus::Error::Opus(ErrorCode::BufferTooSmall)) => {
                    let new_len = self.buffer.len() * 2;
                    log::debug!(
                        "opus decode buffer too small at {} samples, growing to {}",
                        self.buffer.len(),
                        new_len
                    );
                    self.buffer.resize(new_len, 0);
                }
                Err(e) => {
                    return Err(Error::DecodeFailed(format!("opus decode failed: {e}")));
                }
            }
        }
    }

    fn format(&self) -> AudioFormat {
        self.format
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audiopus::coder::Encoder as OpusEncoder;
    use audiopus::Application;

    fn encode_frame(samples_per_channel: usize) -> Vec<u8> {
        let mut encoder =
            OpusEncoder::new(SampleRate::Hz48000, Channels::Stereo, Application::Audio).unwrap();
        let pcm = vec![0i16; samples_per_channel * 2];
        let mut packet = vec![0u8; 4000];
        let len = encoder.encode(&pcm, &mut packet).unwrap();
        packet.truncate(len);
        packet
    }

    #[test]
    fn decode_grows_buffer_past_initial_capacity_for_a_full_frame() {
        let format = AudioFormat {
            sample_rate: 48000,
            channels: 2,
            bits_per_sample: 16,
        };
        let mut decoder = OpusDecoder::new(format).unwrap();
        let initial_len = decoder.buffer.len();
        assert_eq!(initial_len, INITIAL_SAMPLES_PER_CHANNEL * 2);

        // A standard 20ms stereo frame at 48kHz decodes to 960 samples per channel, well past
        // the 120-samples-per-channel buffer started with, forcing at least one BufferTooSmall
        // retry before the decode succeeds.
        let packet = encode_frame(960);
        let chunk = decoder.decode(0, &packet).unwrap();

        assert!(decoder.buffer.len() > initial_len);
        assert_eq!(chunk.len(), 960 * 2 * 2);
    }
}
