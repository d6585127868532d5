//! AT command vocabulary used by the sequencer.
//!
//! Command names follow the SIM7070 Series AT Command Manual.

pub mod response;

use alloc::{format, string::String};

/// Sent before and after every command line
pub const LINE_TERMINATOR: &[u8] = b"\r\n";

/// Liveness probe
pub const AT: &str = "AT";
/// Minimum functionality, RF off
pub const RADIO_OFF: &str = "AT+CFUN=0";
/// Full functionality
pub const RADIO_ON: &str = "AT+CFUN=1";
pub const SIGNAL_QUALITY: &str = "AT+CSQ";
pub const HTTP_CONNECT: &str = "AT+SHCONN";
pub const HTTP_DISCONNECT: &str = "AT+SHDISC";

pub const OK: &str = "OK";
pub const SMS_READY: &str = "SMS Ready";
pub const SIGNAL_QUALITY_PREFIX: &str = "+CSQ:";
pub const HTTP_REQUEST_PREFIX: &str = "+SHREQ:";
pub const HTTP_READ_PREFIX: &str = "+SHREAD:";

/// Raw `+CSQ` rssi field while the signal is not known
pub const UNKNOWN_SIGNAL: &str = "99";

/// `AT+SHREQ="<path>",<method>`
pub fn http_request(path: &str, method: u8) -> String {
    format!("AT+SHREQ=\"{path}\",{method}")
}

/// `AT+SHREAD=<offset>,<len>`
pub fn http_read(offset: usize, len: usize) -> String {
    format!("AT+SHREAD={offset},{len}")
}
