#![no_std]

use alloc::{string::String, vec::Vec};
use serde::{Deserialize, Serialize};

extern crate alloc;

/// Everything the phase sequencer needs to bring the modem up and issue the
/// HTTP request. Loaded from `config.yml` at build time.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SequenceConfig {
    pub commands: CommandTable,
    pub timings: Timings,
    pub timeouts: Timeouts,
    pub recovery: Recovery,
    pub http: HttpRequest,
}

/// Literal AT command lines, sent in list order.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CommandTable {
    /// Sent while the radio is disabled
    pub bring_up: Vec<String>,
    /// Registration queries and bearer activation
    pub connect: Vec<String>,
    /// SSL and URL configuration, sent before `AT+SHCONN`
    pub http_setup: Vec<String>,
}

/// Fixed delays and poll intervals, all in milliseconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Timings {
    pub probe_interval_ms: u64,
    pub after_probe_ms: u64,
    pub radio_off_ms: u64,
    pub bring_up_step_ms: u64,
    pub ready_poll_ms: u64,
    pub after_ready_ms: u64,
    pub signal_poll_ms: u64,
    pub connect_step_ms: u64,
    pub ok_poll_ms: u64,
    pub request_poll_ms: u64,
    pub read_settle_ms: u64,
}

/// Matcher deadlines in milliseconds. `None` waits forever.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Timeouts {
    pub device_ms: Option<u64>,
    pub ready_ms: Option<u64>,
    pub signal_ms: Option<u64>,
    pub connect_ms: Option<u64>,
    pub request_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum TimeoutAction {
    /// Run the phase again
    Retry,
    /// Continue with the next phase
    Skip,
    #[default]
    Abort,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Recovery {
    pub on_timeout: TimeoutAction,
    /// Upper bound for [`TimeoutAction::Retry`], the run aborts after that
    pub max_retries: u8,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpRequest {
    /// Resource path passed to `AT+SHREQ`
    pub path: String,
    /// 1 - GET, 2 - PUT, 3 - POST, 4 - PATCH, 5 - HEAD
    pub method: u8,
    /// Number of body bytes read back with `AT+SHREAD`
    pub read_len: u64,
}
