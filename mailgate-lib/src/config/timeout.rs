use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing configuration for the dispatcher and the session driver
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Length of one idle tick in seconds
    /// A session waits this long for input before counting an idle tick
    /// Default: 60
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    /// Idle ticks a POP3 session may accumulate before it is closed
    /// Default: 5
    #[serde(default = "default_pop3_idle_ticks")]
    pub pop3_idle_ticks: u32,
    /// Idle ticks an IMAP session may accumulate before it is closed
    /// Default: 30
    #[serde(default = "default_imap_idle_ticks")]
    pub imap_idle_ticks: u32,
    /// TLS handshake timeout in seconds
    /// Default: 15
    #[serde(default = "default_tls_handshake_secs")]
    pub tls_handshake_secs: u64,
    /// Upper bound of one dispatcher wait on the listening sockets in seconds
    /// Default: 10
    #[serde(default = "default_accept_poll_secs")]
    pub accept_poll_secs: u64,
    /// Interval between live-worker checks while draining, in milliseconds
    /// Default: 1000
    #[serde(default = "default_drain_poll_millis")]
    pub drain_poll_millis: u64,
    /// Number of live-worker checks before shutdown is forced
    /// Default: 10
    #[serde(default = "default_drain_polls")]
    pub drain_polls: u32,
    /// Longest accepted input line in bytes
    /// Default: 65536
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,
}

impl TimeoutConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }

    pub fn tls_handshake(&self) -> Duration {
        Duration::from_secs(self.tls_handshake_secs)
    }

    pub fn accept_poll(&self) -> Duration {
        Duration::from_secs(self.accept_poll_secs)
    }

    pub fn drain_poll(&self) -> Duration {
        Duration::from_millis(self.drain_poll_millis)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
            pop3_idle_ticks: default_pop3_idle_ticks(),
            imap_idle_ticks: default_imap_idle_ticks(),
            tls_handshake_secs: default_tls_handshake_secs(),
            accept_poll_secs: default_accept_poll_secs(),
            drain_poll_millis: default_drain_poll_millis(),
            drain_polls: default_drain_polls(),
            max_line_bytes: default_max_line_bytes(),
        }
    }
}

fn default_tick_secs() -> u64 {
    60
}

fn default_pop3_idle_ticks() -> u32 {
    5
}

fn default_imap_idle_ticks() -> u32 {
    30
}

fn default_tls_handshake_secs() -> u64 {
    15
}

fn default_accept_poll_secs() -> u64 {
    10
}

fn default_drain_poll_millis() -> u64 {
    1000
}

fn default_drain_polls() -> u32 {
    10
}

fn default_max_line_bytes() -> usize {
    64 * 1024
}
