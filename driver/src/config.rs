//! Driver timing and retry configuration.

use heapless::Vec;
use serde::{Deserialize, Serialize};

/// Maximum number of candidate rates tried by baud-rate discovery
pub const MAX_BAUD_CANDIDATES: usize = 8;

/// Candidate rates, most likely first
pub const DEFAULT_BAUD_CANDIDATES: [u32; 6] = [115_200, 9_600, 57_600, 74_880, 38_400, 19_200];

/// Configuration for the AT driver
///
/// All durations are in milliseconds. Every field has a default matching the
/// ESP8266 AT firmware's observed timing, so a JSON document only needs the
/// fields it overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Rate the UART is assumed to run at before discovery
    pub initial_baud: u32,
    /// Upper bound for a single transmit
    pub tx_timeout_ms: u32,
    /// Sleep between receive polls when nothing new arrived
    pub poll_interval_ms: u32,
    /// Extra drain after a terminal marker in multi-line waits
    pub grace_ms: u32,
    /// Silence that ends a multi-line wait once bytes have arrived.
    ///
    /// Replies with a mid-message pause longer than this get truncated.
    /// `None` disables the heuristic.
    pub quiet_period_ms: Option<u32>,
    /// Plain `OK` acknowledgements
    pub ok_timeout_ms: u32,
    /// `>` prompt after a send request
    pub prompt_timeout_ms: u32,
    /// `SEND OK` after the payload
    pub send_timeout_ms: u32,
    /// `CONNECT` after a connection start
    pub connect_timeout_ms: u32,
    /// Generic acknowledgement when `CONNECT` never showed up
    pub connect_fallback_timeout_ms: u32,
    /// One access point join attempt
    pub join_timeout_ms: u32,
    /// Join attempts before giving up
    pub join_attempts: u8,
    /// Pause between join attempts
    pub join_retry_delay_ms: u32,
    /// Silence required on both sides of the `+++` escape
    pub transparent_guard_ms: u32,
    /// `ready` banner after a module reset
    pub reset_timeout_ms: u32,
    /// Send a bare `AT` before joining and abort if it goes unanswered
    pub probe_before_join: bool,
    /// Rates tried in order by baud-rate discovery
    pub baud_candidates: Vec<u32, MAX_BAUD_CANDIDATES>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            initial_baud: 115_200,
            tx_timeout_ms: 1000,
            poll_interval_ms: 1,
            grace_ms: 20,
            quiet_period_ms: Some(200),
            ok_timeout_ms: 1000,
            prompt_timeout_ms: 2000,
            send_timeout_ms: 3000,
            connect_timeout_ms: 10_000,
            connect_fallback_timeout_ms: 2000,
            join_timeout_ms: 25_000,
            join_attempts: 2,
            join_retry_delay_ms: 2000,
            transparent_guard_ms: 1000,
            reset_timeout_ms: 5000,
            probe_before_join: true,
            baud_candidates: Vec::from_slice(&DEFAULT_BAUD_CANDIDATES).unwrap_or_default(),
        }
    }
}
