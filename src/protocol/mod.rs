// ABOUTME: Snapcast wire protocol: message shapes, frame codec, and the TCP session client

pub mod client;
pub mod codec;
pub mod messages;

pub use client::ProtocolClient;
