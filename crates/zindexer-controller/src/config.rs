use std::net::SocketAddr;
use std::time::Duration;

use zindexer_buffer::BufferConfig;
use zindexer_queue::DispatcherConfig;

/// Controller configuration, loaded from environment variables with sane
/// defaults — the teacher's lightweight ad hoc config style
/// (`agentic_server.rs` reads `DATABASE_URL` the same way) rather than a
/// structured config-loading framework.
#[derive(Debug, Clone)]
pub struct Config {
    pub enable_buffer: bool,
    pub buffer: BufferConfig,
    pub dispatcher: DispatcherConfig,
    pub worker_count: usize,
    pub status_addr: SocketAddr,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enable_buffer: true,
            buffer: BufferConfig::default(),
            dispatcher: DispatcherConfig::default(),
            worker_count: 4,
            status_addr: "127.0.0.1:3300".parse().unwrap(),
        }
    }
}

impl Config {
    /// Reads `ZINDEXER_*` env vars, falling back to [`Config::default`]
    /// for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let enable_buffer = env_bool("ZINDEXER_ENABLE_BUFFER", defaults.enable_buffer);
        let sync_time_period = env_secs("ZINDEXER_SYNC_TIME_PERIOD_SECS", defaults.buffer.sync_time_period);
        let sync_block_threshold = std::env::var("ZINDEXER_SYNC_BLOCK_THRESHOLD")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .or(defaults.buffer.sync_block_threshold);
        let retry_timeout = env_secs("ZINDEXER_RETRY_TIMEOUT_SECS", defaults.dispatcher.retry_timeout);
        let worker_count = std::env::var("ZINDEXER_WORKER_COUNT")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults.worker_count);
        let status_addr = std::env::var("ZINDEXER_STATUS_ADDR")
            .ok()
            .and_then(|v| v.parse::<SocketAddr>().ok())
            .unwrap_or(defaults.status_addr);

        Self {
            enable_buffer,
            buffer: BufferConfig { sync_time_period, sync_block_threshold },
            dispatcher: DispatcherConfig { retry_timeout },
            worker_count,
            status_addr,
        }
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key).ok().and_then(|v| v.parse::<bool>().ok()).unwrap_or(default)
}

fn env_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}
