// ABOUTME: TCP protocol client implementing the Snapcast session state machine
// ABOUTME: HELLO handshake, CODEC_HEADER/WIRE_CHUNK/SERVER_SETTINGS/TIME dispatch, TIME probing

use std::sync::Arc;
use std::time::{Duration, Instant};

use byteorder::{LittleEndian, ReadBytesExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::sleep;

use crate::audio::buffer::ChunkProducer;
use crate::audio::decode::{Decoder, OpusDecoder, PcmDecoder};
use crate::audio::format::AudioFormat;
use crate::discovery::Discovery;
use crate::error::Error;
use crate::hal::AudioHal;
use crate::protocol::codec::{
    decode_base_message, decode_codec_header, decode_hello, decode_server_settings, decode_time,
    encode_base_message, encode_hello, encode_time, message_type_of,
};
use crate::protocol::messages::{
    BaseMessage, Codec, HelloPayload, MessageType, SnapcastSettings, Timestamp,
    BASE_MESSAGE_SIZE,
};
use crate::sync::clock::gettimeofday_us;
use crate::sync::ClockEstimator;

const RECONNECT_BACKOFF: Duration = Duration::from_secs(4);
const FAST_PROBE_INTERVAL: Duration = Duration::from_millis(50);
const SLOW_PROBE_INTERVAL: Duration = Duration::from_secs(1);
const STALE_SYNC_THRESHOLD: Duration = Duration::from_secs(60);

/// One long-lived Snapcast TCP session: resolve server, HELLO, then dispatch until the socket
/// fails, at which point the caller (`run`) backs off 4s and reconnects.
pub struct ProtocolClient {
    discovery: Box<dyn Discovery>,
    client_id: String,
    client_name: String,
    clock: Arc<ClockEstimator>,
    settings_tx: watch::Sender<SnapcastSettings>,
    chunk_producer: ChunkProducer,
    hal: Box<dyn AudioHal>,
    next_msg_id: u16,
}

impl ProtocolClient {
    pub fn new(
        discovery: Box<dyn Discovery>,
        client_id: String,
        client_name: String,
        clock: Arc<ClockEstimator>,
        settings_tx: watch::Sender<SnapcastSettings>,
        chunk_producer: ChunkProducer,
        hal: Box<dyn AudioHal>,
    ) -> Self {
        Self {
            discovery,
            client_id,
            client_name,
            clock,
            settings_tx,
            chunk_producer,
            hal,
            next_msg_id: 0,
        }
    }

    /// Runs forever: on any transport-level error, closes the session, backs off 4s, and
    /// reconnects from HELLO.
    pub async fn run(mut self) {
        loop {
            match self.run_session().await {
                Ok(()) => log::info!("session ended cleanly"),
                Err(e) => log::warn!("session ended: {e}"),
            }
            self.clock.reset();
            log::info!("reconnecting in {}s", RECONNECT_BACKOFF.as_secs());
            sleep(RECONNECT_BACKOFF).await;
        }
    }

    async fn run_session(&mut self) -> Result<(), Error> {
        let (host, port) = self.discovery.resolve_server()?;
        log::info!("connecting to {host}:{port}");
        let mut stream = TcpStream::connect((host.as_str(), port))
            .await
            .map_err(Error::Transport)?;

        self.send_hello(&mut stream).await?;

        let mut decoder: Option<Box<dyn Decoder>> = None;
        let mut settings = SnapcastSettings::default();
        let mut header_received = false;
        let mut last_time_sync = Instant::now();
        let mut probe_interval = FAST_PROBE_INTERVAL;
        let mut next_probe = tokio::time::Instant::now();

        loop {
            tokio::select! {
                base = Self::read_base_message(&mut stream) => {
                    let base = base?;
                    let payload = Self::read_payload(&mut stream, base.size).await?;
                    self.dispatch(
                        base,
                        &payload,
                        &mut decoder,
                        &mut settings,
                        &mut header_received,
                        &mut last_time_sync,
                    )?;
                }
                _ = sleep_until_instant(next_probe) => {
                    self.send_time_probe(&mut stream).await?;
                    if last_time_sync.elapsed() > STALE_SYNC_THRESHOLD {
                        log::warn!("no TIME sync in {}s, resetting estimator", STALE_SYNC_THRESHOLD.as_secs());
                        self.clock.reset();
                        probe_interval = FAST_PROBE_INTERVAL;
                    } else {
                        probe_interval = if self.clock.is_ready() {
                            SLOW_PROBE_INTERVAL
                        } else {
                            FAST_PROBE_INTERVAL
                        };
                    }
                    next_probe = tokio::time::Instant::now() + probe_interval;
                }
            }
        }
    }

    fn dispatch(
        &mut self,
        base: BaseMessage,
        payload: &[u8],
        decoder: &mut Option<Box<dyn Decoder>>,
        settings: &mut SnapcastSettings,
        header_received: &mut bool,
        last_time_sync: &mut Instant,
    ) -> Result<(), Error> {
        match message_type_of(&base) {
            Ok(MessageType::CodecHeader) => {
                let header = decode_codec_header(payload)?;
                let format = parse_codec_format(header.codec, &header.data)?;
                settings.codec = header.codec;
                settings.sample_rate = format.sample_rate;
                settings.channels = format.channels;
                settings.bits_per_sample = format.bits_per_sample;

                *decoder = Some(build_decoder(header.codec, format)?);
                *header_received = true;
                let _ = self.settings_tx.send(*settings);
                log::info!(
                    "codec header: {} {}Hz {}ch {}bit",
                    header.codec.as_str(),
                    format.sample_rate,
                    format.channels,
                    format.bits_per_sample
                );
                Ok(())
            }
            Ok(MessageType::WireChunk) => {
                if !*header_received {
                    log::warn!("wire chunk before codec header, dropping");
                    return Ok(());
                }
                let chunk_payload = crate::protocol::codec::decode_wire_chunk(payload)?;
                let Some(decoder) = decoder.as_mut() else {
                    return Ok(());
                };
                match decoder.decode(chunk_payload.timestamp.as_micros(), &chunk_payload.data) {
                    Ok(pcm) => {
                        let duration_ms = decoder.format().chunk_duration_ms(pcm.len());
                        if (duration_ms - settings.chunk_duration_ms).abs() > f64::EPSILON {
                            settings.chunk_duration_ms = duration_ms;
                            let _ = self.settings_tx.send(*settings);
                        }
                        self.chunk_producer.push(pcm);
                    }
                    Err(e) => {
                        log::warn!("decode failed, dropping chunk: {e}");
                    }
                }
                Ok(())
            }
            Ok(MessageType::ServerSettings) => {
                let payload = decode_server_settings(payload)?;
                settings.buffer_ms = payload.buffer_ms;
                settings.muted = payload.muted;
                settings.volume = payload.volume;
                if let Err(e) = self.hal.set_mute(payload.muted) {
                    log::warn!("hal set_mute failed: {e}");
                }
                if let Err(e) = self.hal.set_volume(payload.volume) {
                    log::warn!("hal set_volume failed: {e}");
                }
                let _ = self.settings_tx.send(*settings);
                Ok(())
            }
            Ok(MessageType::Time) => {
                let latency = decode_time(payload)?;
                let c2s_minus_s2c = latency.as_micros()
                    - (base.received.as_micros() - base.sent.as_micros());
                let sample = c2s_minus_s2c / 2;
                self.clock.insert_latency(sample);
                *last_time_sync = Instant::now();
                Ok(())
            }
            Ok(MessageType::Hello) => Ok(()),
            Err(e) => {
                log::warn!("unsupported message type {}: {e}", base.msg_type);
                Ok(())
            }
        }
    }

    async fn send_hello(&mut self, stream: &mut TcpStream) -> Result<(), Error> {
        let hello = HelloPayload::new(self.client_id.clone(), self.client_name.clone(), 0);
        let payload = encode_hello(&hello)?;
        self.send_message(stream, MessageType::Hello, &payload).await
    }

    async fn send_time_probe(&mut self, stream: &mut TcpStream) -> Result<(), Error> {
        let payload = encode_time(&Timestamp::ZERO)?;
        self.send_message(stream, MessageType::Time, &payload).await
    }

    async fn send_message(
        &mut self,
        stream: &mut TcpStream,
        msg_type: MessageType,
        payload: &[u8],
    ) -> Result<(), Error> {
        let base = BaseMessage {
            msg_type: msg_type.as_u16(),
            id: self.next_msg_id,
            refers_to: 0,
            sent: Timestamp::from_micros(gettimeofday_us()),
            received: Timestamp::ZERO,
            size: payload.len() as u32,
        };
        self.next_msg_id = self.next_msg_id.wrapping_add(1);
        let header_bytes = encode_base_message(&base)?;
        stream.write_all(&header_bytes).await.map_err(Error::Transport)?;
        stream.write_all(payload).await.map_err(Error::Transport)?;
        Ok(())
    }

    async fn read_base_message(stream: &mut TcpStream) -> Result<BaseMessage, Error> {
        let mut buf = [0u8; BASE_MESSAGE_SIZE];
        stream.read_exact(&mut buf).await.map_err(Error::Transport)?;
        let mut base = decode_base_message(&buf)?;
        base.received = Timestamp::from_micros(gettimeofday_us());
        Ok(base)
    }

    async fn read_payload(stream: &mut TcpStream, size: u32) -> Result<Vec<u8>, Error> {
        let mut buf = vec![0u8; size as usize];
        stream.read_exact(&mut buf).await.map_err(Error::Transport)?;
        Ok(buf)
    }
}

async fn sleep_until_instant(instant: tokio::time::Instant) {
    tokio::time::sleep_until(instant).await
}

fn build_decoder(codec: Codec, format: AudioFormat) -> Result<Box<dyn Decoder>, Error> {
    match codec {
        Codec::Pcm | Codec::None => Ok(Box::new(PcmDecoder::new(format))),
        Codec::Opus => Ok(Box::new(OpusDecoder::new(format)?)),
    }
}

/// Extracts sample rate / channels / bit depth from the CODEC_HEADER payload bytes. PCM headers
/// carry a WAV-style fmt chunk at fixed byte offsets; Opus headers carry a 12-byte record with
/// `rate` (u32) at offset 4, `bits` (u16) at offset 8, and `channels` (u16) at offset 10.
fn parse_codec_format(codec: Codec, data: &[u8]) -> Result<AudioFormat, Error> {
    match codec {
        Codec::Pcm | Codec::None => {
            if data.len() < 36 {
                return Err(Error::MalformedFrame(
                    "pcm codec header shorter than a WAV fmt chunk".to_string(),
                ));
            }
            let mut channels_field = &data[22..24];
            let channels = channels_field.read_u16::<LittleEndian>().map_err(Error::Transport)? as u8;
            let mut rate_field = &data[24..28];
            let sample_rate = rate_field.read_u32::<LittleEndian>().map_err(Error::Transport)?;
            let mut bits_field = &data[34..36];
            let bits_per_sample = bits_field.read_u16::<LittleEndian>().map_err(Error::Transport)? as u8;
            Ok(AudioFormat {
                sample_rate,
                channels,
                bits_per_sample,
            })
        }
        Codec::Opus => {
            if data.len() < 12 {
                return Err(Error::MalformedFrame(
                    "opus codec header shorter than the rate/bits/channels record".to_string(),
                ));
            }
            let mut rate_field = &data[4..8];
            let sample_rate = rate_field.read_u32::<LittleEndian>().map_err(Error::Transport)?;
            let mut bits_field = &data[8..10];
            let bits_per_sample = bits_field.read_u16::<LittleEndian>().map_err(Error::Transport)? as u8;
            let mut channels_field = &data[10..12];
            let channels = channels_field.read_u16::<LittleEndian>().map_err(Error::Transport)? as u8;
            Ok(AudioFormat {
                sample_rate,
                channels,
                bits_per_sample,
            })
        }
    }
}
