// ABOUTME: cpal-based audio output implementation
// ABOUTME: Cross-platform sink; trim is realized as sample-rate-ratio resampling since consumer
// ABOUTME: sound cards expose no hardware clock divider to select directly

use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};

use crate::audio::format::AudioFormat;
use crate::audio::output::{AudioOutput, Trim};
use crate::error::Error;

/// cpal delivers f32 samples in [-1.0, 1.0]; PCM chunks arrive as little-endian i16.
fn i16_bytes_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / i16::MAX as f32)
        .collect()
}

/// Linear resampling by `ratio`: ratio > 1 emits fewer output frames for the same input (the
/// sink "runs faster"), ratio < 1 emits more (the sink "runs slower"). Operates per-frame so
/// channel interleaving is preserved.
fn resample(samples: &[f32], channels: usize, ratio: f64) -> Vec<f32> {
    if ratio == 1.0 || channels == 0 {
        return samples.to_vec();
    }
    let frame_count = samples.len() / channels;
    if frame_count < 2 {
        return samples.to_vec();
    }
    let out_frames = ((frame_count as f64) / ratio).round().max(1.0) as usize;
    let mut out = Vec::with_capacity(out_frames * channels);
    for out_i in 0..out_frames {
        let src_pos = out_i as f64 * ratio;
        let src_i = src_pos.floor() as usize;
        let frac = src_pos - src_i as f64;
        let i0 = src_i.min(frame_count - 1);
        let i1 = (src_i + 1).min(frame_count - 1);
        for ch in 0..channels {
            let a = samples[i0 * channels + ch];
            let b = samples[i1 * channels + ch];
            out.push(a + (b - a) * frac as f32);
        }
    }
    out
}

pub struct CpalOutput {
    format: AudioFormat,
    stream: Option<Stream>,
    sample_tx: Option<SyncSender<Arc<[f32]>>>,
    sample_rx_for_rebuild: Option<Receiver<Arc<[f32]>>>,
    device: Device,
    trim: Trim,
    dac_latency_us: i64,
    started_at: Arc<Mutex<Option<Instant>>>,
}

const SAMPLE_QUEUE_DEPTH: usize = 10;

impl CpalOutput {
    pub fn new(format: AudioFormat) -> Result<Self, Error> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Output("no output device available".to_string()))?;

        if let Ok(def) = device.default_output_config() {
            if def.sample_rate().0 != format.sample_rate || def.channels() != format.channels as u16 {
                log::warn!(
                    "requested {}Hz/{}ch; device default is {}Hz/{}ch (OS may resample)",
                    format.sample_rate,
                    format.channels,
                    def.sample_rate().0,
                    def.channels()
                );
            }
        }

        let (tx, rx) = sync_channel(SAMPLE_QUEUE_DEPTH);

        Ok(Self {
            format,
            stream: None,
            sample_tx: Some(tx),
            sample_rx_for_rebuild: Some(rx),
            device,
            trim: Trim::Nominal,
            dac_latency_us: 0,
            started_at: Arc::new(Mutex::new(None)),
        })
    }

    fn build_stream(&mut self) -> Result<(), Error> {
        let config = StreamConfig {
            channels: self.format.channels as u16,
            sample_rate: cpal::SampleRate(self.format.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let rx = self
            .sample_rx_for_rebuild
            .take()
            .ok_or_else(|| Error::Output("cpal stream already built".to_string()))?;
        let rx = Arc::new(Mutex::new(rx));
        let mut current: Option<Arc<[f32]>> = None;
        let mut pos = 0usize;

        let stream = self
            .device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for out in data.iter_mut() {
                        if current.is_none() || pos >= current.as_ref().unwrap().len() {
                            if let Ok(rx) = rx.lock() {
                                if let Ok(buf) = rx.try_recv() {
                                    current = Some(buf);
                                    pos = 0;
                                }
                            }
                        }
                        *out = match &current {
                            Some(buf) if pos < buf.len() => {
                                let s = buf[pos];
                                pos += 1;
                                s
                            }
                            _ => 0.0,
                        };
                    }
                },
                |err| log::error!("audio stream error: {err}"),
                None,
            )
            .map_err(|e| Error::Output(e.to_string()))?;

        self.stream = Some(stream);
        Ok(())
    }

    fn send_samples(&self, samples: Vec<f32>, timeout: Duration) -> Result<usize, Error> {
        let tx = self
            .sample_tx
            .as_ref()
            .ok_or_else(|| Error::Output("sink not configured".to_string()))?;
        let buf: Arc<[f32]> = samples.into();
        let deadline = Instant::now() + timeout;
        loop {
            match tx.try_send(Arc::clone(&buf)) {
                Ok(()) => return Ok(buf.len()),
                Err(TrySendError::Full(_)) => {
                    if Instant::now() >= deadline {
                        return Err(Error::Output("write timed out, sink queue full".to_string()));
                    }
                    std::thread::sleep(Duration::from_millis(1));
                }
                Err(TrySendError::Disconnected(_)) => {
                    return Err(Error::Output("sink stream gone".to_string()));
                }
            }
        }
    }
}

impl AudioOutput for CpalOutput {
    fn configure(&mut self, format: AudioFormat) -> Result<(), Error> {
        self.stop()?;
        let (tx, rx) = sync_channel(SAMPLE_QUEUE_DEPTH);
        self.sample_tx = Some(tx);
        self.sample_rx_for_rebuild = Some(rx);
        self.format = format;
        self.trim = Trim::Nominal;
        self.build_stream()
    }

    fn start(&mut self) -> Result<(), Error> {
        if self.stream.is_none() {
            self.build_stream()?;
        }
        self.stream
            .as_ref()
            .ok_or_else(|| Error::Output("sink not configured".to_string()))?
            .play()
            .map_err(|e| Error::Output(e.to_string()))?;
        *self.started_at.lock().unwrap() = Some(Instant::now());
        Ok(())
    }

    fn stop(&mut self) -> Result<(), Error> {
        if let Some(stream) = &self.stream {
            stream.pause().map_err(|e| Error::Output(e.to_string()))?;
        }
        *self.started_at.lock().unwrap() = None;
        Ok(())
    }

    fn prime(&mut self, bytes: &[u8]) -> Result<usize, Error> {
        if self.stream.is_none() {
            self.build_stream()?;
        }
        let samples = i16_bytes_to_f32(bytes);
        let n = samples.len();
        self.send_samples(samples, Duration::from_millis(50))?;
        Ok(n * 2)
    }

    fn write(&mut self, bytes: &[u8], timeout: Duration) -> Result<usize, Error> {
        let samples = i16_bytes_to_f32(bytes);
        let resampled = resample(&samples, self.format.channels as usize, self.trim.ratio());
        self.send_samples(resampled, timeout)?;
        Ok(bytes.len())
    }

    fn trim(&mut self, trim: Trim) -> Result<(), Error> {
        if trim == self.trim {
            return Ok(());
        }
        self.trim = trim;
        Ok(())
    }

    fn dac_latency_us(&self) -> i64 {
        self.dac_latency_us
    }

    fn format(&self) -> AudioFormat {
        self.format
    }
}
