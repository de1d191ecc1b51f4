// ABOUTME: Audio-HAL collaborator seam
// ABOUTME: Mute/volume hooks invoked by the protocol task on SERVER_SETTINGS

use crate::error::Error;

/// Hardware mute/volume control. Codec-chip initialization and the concrete control path are
/// out of scope; this is the abstract contract the protocol client drives on SERVER_SETTINGS.
pub trait AudioHal: Send {
    fn set_mute(&mut self, muted: bool) -> Result<(), Error>;
    fn set_volume(&mut self, volume: u8) -> Result<(), Error>;
}

/// No-op HAL for platforms (or tests) with no hardware volume/mute path; logs the requested
/// state instead of applying it.
#[derive(Debug, Default)]
pub struct LoggingAudioHal;

impl AudioHal for LoggingAudioHal {
    fn set_mute(&mut self, muted: bool) -> Result<(), Error> {
        log::info!("audio hal: set_mute({muted})");
        Ok(())
    }

    fn set_volume(&mut self, volume: u8) -> Result<(), Error> {
        log::info!("audio hal: set_volume({volume})");
        Ok(())
    }
}
