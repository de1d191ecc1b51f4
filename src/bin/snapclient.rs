// ABOUTME: snapclient binary — wires config, discovery, protocol client and scheduler together
// ABOUTME: tokio runtime for the network session, a dedicated thread for playback

use std::sync::Arc;

use tokio::sync::watch;

use snapcast_client::audio::buffer::ChunkBuffer;
use snapcast_client::audio::output::CpalOutput;
use snapcast_client::config::Config;
use snapcast_client::discovery::{Discovery, StaticDiscovery};
use snapcast_client::hal::LoggingAudioHal;
use snapcast_client::protocol::messages::SnapcastSettings;
use snapcast_client::protocol::ProtocolClient;
use snapcast_client::scheduler::Scheduler;
use snapcast_client::sync::ClockEstimator;

#[tokio::main]
async fn main() {
    let config = Config::from_args_and_env();
    config.init_logging();

    log::info!(
        "snapclient starting: id={} name={}",
        config.client_id,
        config.client_name
    );

    let discovery: Box<dyn Discovery> = match &config.host {
        Some(host) => Box::new(StaticDiscovery::new(host.clone(), config.port)),
        None => {
            log::error!("no --host configured and no mDNS discovery implementation available");
            std::process::exit(1);
        }
    };

    let clock = Arc::new(ClockEstimator::new());
    let (settings_tx, settings_rx) = watch::channel(SnapcastSettings::default());
    let chunk_buffer = ChunkBuffer::new(config.buffer_capacity);

    let initial_sink = match CpalOutput::new(snapcast_client::audio::format::AudioFormat {
        sample_rate: 48000,
        channels: 2,
        bits_per_sample: 16,
    }) {
        Ok(sink) => sink,
        Err(e) => {
            log::error!("failed to open audio output: {e}");
            std::process::exit(1);
        }
    };

    let scheduler = Scheduler::new(
        chunk_buffer.consumer(),
        settings_rx,
        Arc::clone(&clock),
        initial_sink,
    );
    let (scheduler_handle, _scheduler_running) = scheduler.spawn();

    let client = ProtocolClient::new(
        discovery,
        config.client_id.clone(),
        config.client_name.clone(),
        clock,
        settings_tx,
        chunk_buffer.producer(),
        Box::new(LoggingAudioHal),
    );

    let protocol_task = tokio::spawn(client.run());

    let _ = protocol_task.await;
    let _ = scheduler_handle.join();
}
