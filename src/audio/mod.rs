// ABOUTME: Audio data model, bounded chunk queue, decoders, and output sink
// ABOUTME: Everything downstream of the wire protocol up to the hardware sink

pub mod buffer;
pub mod chunk;
pub mod decode;
pub mod format;
pub mod output;

pub use buffer::ChunkBuffer;
pub use chunk::PcmChunk;
pub use format::AudioFormat;
