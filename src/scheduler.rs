// ABOUTME: Playback scheduler — Idle/Resyncing/Locked state machine
// ABOUTME: Hard-syncs cold starts and soft-syncs steady-state playback via audio-clock trim

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::watch;

use crate::audio::buffer::ChunkConsumer;
use crate::audio::chunk::PcmChunk;
use crate::audio::format::AudioFormat;
use crate::audio::output::{AudioOutput, Trim};
use crate::error::Error;
use crate::protocol::messages::SnapcastSettings;
use crate::sync::median::MedianFilter;
use crate::sync::ClockEstimator;

pub const SHORT_BUFFER_LEN: usize = 11;
pub const MAX_OFFSET_US: i64 = 50;
pub const HARD_RESYNC_THRESHOLD_US: i64 = 3000;
const QUEUE_POLL_TIMEOUT: Duration = Duration::from_millis(200);
const IDLE_SLEEP: Duration = Duration::from_millis(20);
const SINK_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Resyncing,
    Locked,
}

/// Consumes from the chunk buffer and drives the audio sink. Runs on a dedicated `std::thread`
/// rather than a tokio task: the concrete sink (`CpalOutput`) is `!Send` once its stream is
/// built, so it can never cross an `.await` point.
pub struct Scheduler<S: AudioOutput> {
    consumer: ChunkConsumer,
    settings_rx: watch::Receiver<SnapcastSettings>,
    clock: Arc<ClockEstimator>,
    sink: S,
    short_filter: MedianFilter,
    state: State,
    current_trim: Trim,
    settings: Option<SnapcastSettings>,
    running: Arc<AtomicBool>,
}

impl<S: AudioOutput + 'static> Scheduler<S> {
    pub fn new(
        consumer: ChunkConsumer,
        settings_rx: watch::Receiver<SnapcastSettings>,
        clock: Arc<ClockEstimator>,
        sink: S,
    ) -> Self {
        Self {
            consumer,
            settings_rx,
            clock,
            sink,
            short_filter: MedianFilter::new(SHORT_BUFFER_LEN),
            state: State::Idle,
            current_trim: Trim::Nominal,
            settings: None,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Spawn the scheduler loop on its own thread. Returns a handle plus a shutdown switch.
    pub fn spawn(self) -> (JoinHandle<()>, Arc<AtomicBool>) {
        let running = Arc::clone(&self.running);
        let handle = std::thread::spawn(move || self.run());
        (handle, running)
    }

    pub fn run(mut self) {
        while self.running.load(Ordering::Relaxed) {
            self.poll_settings();
            match self.state {
                State::Idle => std::thread::sleep(IDLE_SLEEP),
                State::Resyncing => self.resync_step(),
                State::Locked => self.locked_step(),
            }
        }
    }

    fn poll_settings(&mut self) {
        if self.settings_rx.has_changed().unwrap_or(false) {
            let new_settings = *self.settings_rx.borrow_and_update();
            self.apply_settings_change(new_settings);
        }
    }

    fn apply_settings_change(&mut self, settings: SnapcastSettings) {
        log::info!(
            "settings changed: codec={:?} rate={} channels={} bits={}",
            settings.codec,
            settings.sample_rate,
            settings.channels,
            settings.bits_per_sample
        );
        let _ = self.sink.stop();
        let format = AudioFormat {
            sample_rate: settings.sample_rate,
            channels: settings.channels,
            bits_per_sample: settings.bits_per_sample,
        };
        if let Err(e) = self.sink.configure(format) {
            log::error!("failed to reconfigure sink: {e}");
        }
        let _ = self.sink.trim(Trim::Nominal);
        self.current_trim = Trim::Nominal;
        self.short_filter.reset();
        self.settings = Some(settings);
        self.state = State::Resyncing;
    }

    /// `age = server_now - chunk_timestamp - buffer_ms + dac_latency_us`.
    fn compute_age(&self, chunk_timestamp_us: i64) -> Result<i64, Error> {
        let settings = self.settings.ok_or(Error::NotSynchronized)?;
        let server_now = self.clock.server_now()?;
        Ok(server_now - chunk_timestamp_us - settings.buffer_ms * 1000 + self.sink.dac_latency_us())
    }

    fn resync_step(&mut self) {
        let chunk = match self.consumer.pop(QUEUE_POLL_TIMEOUT) {
            Some(c) => c,
            None => return,
        };

        let age = match self.compute_age(chunk.timestamp_us) {
            Ok(age) => age,
            Err(Error::NotSynchronized) => {
                std::thread::sleep(Duration::from_millis(10));
                return;
            }
            Err(e) => {
                log::warn!("resync: failed to compute age: {e}");
                return;
            }
        };

        if age >= 0 {
            // Already late.
            return;
        }

        self.hard_sync(chunk, age);
    }

    fn hard_sync(&mut self, chunk: PcmChunk, age: i64) {
        let wait = Duration::from_micros((-age) as u64);
        let armed_at = std::time::Instant::now();
        let deadline = armed_at + wait;
        if let Some(first) = chunk.fragments.first() {
            if let Err(e) = self.sink.prime(first) {
                log::warn!("hard sync: prime failed: {e}");
            }
        }
        let now = std::time::Instant::now();
        if now < deadline {
            std::thread::sleep(deadline - now);
        }
        let actual_wait = armed_at.elapsed();
        if let Err(e) = self.sink.start() {
            log::error!("hard sync: sink start failed: {e}");
            return;
        }
        log::debug!(
            "hard sync armed for {}us, actual wake after {}us",
            wait.as_micros(),
            actual_wait.as_micros()
        );

        for fragment in chunk.fragments.iter().skip(1) {
            let mut offset = 0;
            while offset < fragment.len() {
                match self.sink.write(&fragment[offset..], SINK_WRITE_TIMEOUT) {
                    Ok(written) if written > 0 => offset += written,
                    Ok(_) => break,
                    Err(e) => {
                        log::warn!("hard sync: flush write failed: {e}");
                        break;
                    }
                }
            }
        }

        self.state = State::Locked;
    }

    fn locked_step(&mut self) {
        let chunk = match self.consumer.pop(QUEUE_POLL_TIMEOUT) {
            Some(c) => c,
            None => return,
        };

        let age = match self.compute_age(chunk.timestamp_us) {
            Ok(age) => age,
            Err(_) => {
                std::thread::sleep(Duration::from_millis(10));
                return;
            }
        };

        let chunk_duration_us = self
            .settings
            .map(|s| (s.chunk_duration_ms * 1000.0) as i64)
            .unwrap_or(0);
        let age_expected = -chunk_duration_us;
        let residual = age - age_expected;
        let median = self.short_filter.insert(residual);
        let is_full = self.short_filter.is_full();

        // Until the short filter has filled back up after a hard sync, a single noisy sample
        // could trip the hard-resync threshold and undo the sync that just happened; only check
        // it once the median has enough samples behind it to be trustworthy.
        if is_full && median.abs() > HARD_RESYNC_THRESHOLD_US {
            log::info!("soft sync residual {median}us exceeds hard-resync threshold, resyncing");
            self.short_filter.reset();
            self.state = State::Resyncing;
            return;
        }

        let avg = if is_full { median } else { residual };

        let direction: i8 = if avg < -MAX_OFFSET_US {
            -1
        } else if avg > MAX_OFFSET_US {
            1
        } else {
            0
        };
        let trim = Trim::from_direction(direction);
        if trim != self.current_trim {
            if let Err(e) = self.sink.trim(trim) {
                log::warn!("trim failed: {e}");
            } else {
                self.current_trim = trim;
            }
        }

        for fragment in &chunk.fragments {
            let mut offset = 0;
            while offset < fragment.len() {
                match self.sink.write(&fragment[offset..], SINK_WRITE_TIMEOUT) {
                    Ok(written) if written > 0 => offset += written,
                    Ok(_) => break,
                    Err(e) => {
                        log::warn!("locked write failed: {e}");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::buffer::ChunkBuffer;
    use crate::protocol::messages::Codec;
    use bytes::Bytes;
    use std::sync::Mutex as StdMutex;

    struct FakeSink {
        format: AudioFormat,
        trim: Trim,
        started: bool,
        written: Arc<StdMutex<Vec<u8>>>,
    }

    impl FakeSink {
        fn new() -> Self {
            Self {
                format: AudioFormat {
                    sample_rate: 44100,
                    channels: 2,
                    bits_per_sample: 16,
                },
                trim: Trim::Nominal,
                started: false,
                written: Arc::new(StdMutex::new(Vec::new())),
            }
        }
    }

    impl AudioOutput for FakeSink {
        fn configure(&mut self, format: AudioFormat) -> Result<(), Error> {
            self.format = format;
            Ok(())
        }
        fn start(&mut self) -> Result<(), Error> {
            self.started = true;
            Ok(())
        }
        fn stop(&mut self) -> Result<(), Error> {
            self.started = false;
            Ok(())
        }
        fn prime(&mut self, bytes: &[u8]) -> Result<usize, Error> {
            self.written.lock().unwrap().extend_from_slice(bytes);
            Ok(bytes.len())
        }
        fn write(&mut self, bytes: &[u8], _timeout: Duration) -> Result<usize, Error> {
            self.written.lock().unwrap().extend_from_slice(bytes);
            Ok(bytes.len())
        }
        fn trim(&mut self, trim: Trim) -> Result<(), Error> {
            self.trim = trim;
            Ok(())
        }
        fn dac_latency_us(&self) -> i64 {
            0
        }
        fn format(&self) -> AudioFormat {
            self.format
        }
    }

    fn settings() -> SnapcastSettings {
        SnapcastSettings {
            buffer_ms: 0,
            chunk_duration_ms: 20.0,
            codec: Codec::Pcm,
            sample_rate: 44100,
            channels: 2,
            bits_per_sample: 16,
            muted: false,
            volume: 100,
        }
    }

    #[test]
    fn settings_change_enters_resyncing_and_resets_trim() {
        let buffer = ChunkBuffer::new(4);
        let (_tx, rx) = watch::channel(SnapcastSettings::default());
        let clock = Arc::new(ClockEstimator::with_window(3));
        let mut scheduler = Scheduler::new(buffer.consumer(), rx, clock, FakeSink::new());
        scheduler.apply_settings_change(settings());
        assert_eq!(scheduler.state, State::Resyncing);
        assert_eq!(scheduler.current_trim, Trim::Nominal);
    }

    #[test]
    fn hard_sync_primes_first_fragment_then_starts_and_flushes_rest() {
        let buffer = ChunkBuffer::new(4);
        let (_tx, rx) = watch::channel(SnapcastSettings::default());
        let clock = Arc::new(ClockEstimator::with_window(3));
        let mut scheduler = Scheduler::new(buffer.consumer(), rx, clock, FakeSink::new());
        scheduler.apply_settings_change(settings());

        let chunk = PcmChunk {
            timestamp_us: 0,
            fragments: vec![Bytes::from_static(&[1, 2]), Bytes::from_static(&[3, 4])],
        };
        scheduler.hard_sync(chunk, -1000);

        assert_eq!(scheduler.state, State::Locked);
        assert!(scheduler.sink.started);
        assert_eq!(&scheduler.sink.written.lock().unwrap()[..], &[1, 2, 3, 4]);
    }

    #[test]
    fn trim_is_idempotent_when_direction_unchanged() {
        let buffer = ChunkBuffer::new(4);
        let (_tx, rx) = watch::channel(SnapcastSettings::default());
        let clock = Arc::new(ClockEstimator::with_window(3));
        let mut scheduler = Scheduler::new(buffer.consumer(), rx, clock, FakeSink::new());
        assert_eq!(scheduler.current_trim, Trim::Nominal);
        let trim = Trim::from_direction(0);
        assert_eq!(trim, scheduler.current_trim);
    }
}
