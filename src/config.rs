// ABOUTME: Startup configuration: CLI flags layered over environment variable overrides
// ABOUTME: Every flag doubles as an env var so the client can run unattended on embedded targets

use clap::Parser;

use crate::audio::buffer::DEFAULT_CAPACITY;

#[derive(Debug, Parser)]
#[command(name = "snapclient", version, about = "Time-synchronized Snapcast playback client")]
pub struct Args {
    /// Snapcast server hostname or IP. Leave unset to use the configured discovery collaborator.
    #[arg(long, env = "SNAPCLIENT_HOST")]
    pub host: Option<String>,

    /// Snapcast server TCP port.
    #[arg(long, env = "SNAPCLIENT_PORT", default_value_t = 1704)]
    pub port: u16,

    /// Human-readable client name sent in HELLO.
    #[arg(long, env = "SNAPCLIENT_NAME", default_value = "snapclient")]
    pub client_name: String,

    /// Client MAC/instance id sent in HELLO as both `mac` and `id`.
    #[arg(long, env = "SNAPCLIENT_ID")]
    pub client_id: Option<String>,

    /// Chunk buffer capacity, in chunks.
    #[arg(long, env = "SNAPCLIENT_BUFFER_CAPACITY", default_value_t = DEFAULT_CAPACITY)]
    pub buffer_capacity: usize,

    /// Log verbosity passed through to env_logger if RUST_LOG is unset.
    #[arg(long, env = "SNAPCLIENT_LOG", default_value = "info")]
    pub log_level: String,
}

/// Resolved runtime configuration. Separate from `Args` so defaults/derivations
/// (e.g. a generated client id) are computed once, not re-derived on every read.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: Option<String>,
    pub port: u16,
    pub client_name: String,
    pub client_id: String,
    pub buffer_capacity: usize,
    pub log_level: String,
}

impl Config {
    pub fn from_args_and_env() -> Self {
        let args = Args::parse();
        Self::from_args(args)
    }

    pub fn from_args(args: Args) -> Self {
        let client_id = args
            .client_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        Self {
            host: args.host,
            port: args.port,
            client_name: args.client_name,
            client_id,
            buffer_capacity: args.buffer_capacity,
            log_level: args.log_level,
        }
    }

    pub fn init_logging(&self) {
        if std::env::var("RUST_LOG").is_err() {
            std::env::set_var("RUST_LOG", &self.log_level);
        }
        env_logger::init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_client_id_is_generated_not_empty() {
        let args = Args {
            host: None,
            port: 1704,
            client_name: "test".to_string(),
            client_id: None,
            buffer_capacity: DEFAULT_CAPACITY,
            log_level: "info".to_string(),
        };
        let config = Config::from_args(args);
        assert!(!config.client_id.is_empty());
    }

    #[test]
    fn explicit_client_id_is_preserved() {
        let args = Args {
            host: Some("snapserver.local".to_string()),
            port: 1704,
            client_name: "kitchen".to_string(),
            client_id: Some("aa:bb:cc:dd:ee:ff".to_string()),
            buffer_capacity: DEFAULT_CAPACITY,
            log_level: "info".to_string(),
        };
        let config = Config::from_args(args);
        assert_eq!(config.client_id, "aa:bb:cc:dd:ee:ff");
    }
}
