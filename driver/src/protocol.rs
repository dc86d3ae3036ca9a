//! # AT Command Vocabulary
//!
//! This module holds the fixed command strings, the reply markers the driver
//! looks for, command formatting into fixed-capacity strings, and the
//! classification of access-point join replies.
//!
//! ## Line Format
//!
//! ```text
//! Command:  AT+CWJAP="ssid","password"\r\n
//! Reply:    WIFI CONNECTED\r\nWIFI GOT IP\r\n\r\nOK\r\n
//! Failure:  +CWJAP:3\r\n\r\nFAIL\r\n
//! ```
//!
//! Every command ends with CRLF except the `+++` transparent-mode escape,
//! which must arrive on its own between two silent guard windows.

use core::fmt::Write;

use heapless::String;
use serde::{Deserialize, Serialize};

use crate::traits::{AtError, AtResult};
use crate::MAX_COMMAND_LEN;

/// A formatted command line
pub type Command = String<MAX_COMMAND_LEN>;

/// Largest payload accepted by a single `AT+CIPSEND`
pub const MAX_SEND_LEN: usize = 2048;

/// Fixed command lines
pub mod cmd {
    pub const AT: &str = "AT\r\n";
    pub const RESET: &str = "AT+RST\r\n";
    pub const VERSION: &str = "AT+GMR\r\n";
    pub const STATION_MODE: &str = "AT+CWMODE=1\r\n";
    pub const QUIT_AP: &str = "AT+CWQAP\r\n";
    pub const SINGLE_CONNECTION: &str = "AT+CIPMUX=0\r\n";
    pub const TRANSPARENT_ON: &str = "AT+CIPMODE=1\r\n";
    pub const TRANSPARENT_OFF: &str = "AT+CIPMODE=0\r\n";
    pub const START_STREAM: &str = "AT+CIPSEND\r\n";
    pub const CLOSE: &str = "AT+CIPCLOSE\r\n";
    pub const LOCAL_IP: &str = "AT+CIFSR\r\n";
    /// Sent bare, no line ending
    pub const ESCAPE: &str = "+++";
}

/// Reply markers
pub mod marker {
    pub const OK: &str = "OK";
    pub const ERROR: &str = "ERROR";
    pub const FAIL: &str = "FAIL";
    pub const CONNECT: &str = "CONNECT";
    pub const SEND_OK: &str = "SEND OK";
    pub const SEND_FAIL: &str = "SEND FAIL";
    pub const PROMPT: &str = ">";
    pub const GOT_IP: &str = "WIFI GOT IP";
    pub const NO_CHANGE: &str = "no change";
    pub const READY: &str = "ready";
    /// Prefix of the coded join failure line, e.g. `+CWJAP:3`
    pub const JOIN_CODE: &str = "+CWJAP:";
    /// Prefix of the station address line in the `AT+CIFSR` reply
    pub const STATION_IP: &str = "+CIFSR:STAIP,\"";

    /// Markers that end a multi-line reply
    pub const TERMINAL: [&str; 3] = ["OK\r\n", "ERROR\r\n", "FAIL"];
}

/// Transport used by `AT+CIPSTART`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    Tcp,
    Udp,
    Ssl,
}

impl ConnectionKind {
    /// Name as written in the command
    pub const fn as_str(self) -> &'static str {
        match self {
            ConnectionKind::Tcp => "TCP",
            ConnectionKind::Udp => "UDP",
            ConnectionKind::Ssl => "SSL",
        }
    }
}

/// Why an access point join failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum JoinFailure {
    /// `+CWJAP:1`
    Timeout,
    /// `+CWJAP:2`
    WrongPassword,
    /// `+CWJAP:3`
    ApNotFound,
    /// `+CWJAP:4`
    ConnectFailed,
    /// A code this driver does not know
    Other(u8),
    /// `FAIL` or `ERROR` without a code line
    Unspecified,
    /// Nothing decisive arrived before the attempt deadline
    NoReply,
}

impl JoinFailure {
    /// Map a `+CWJAP:<code>` value
    pub const fn from_code(code: u8) -> Self {
        match code {
            1 => JoinFailure::Timeout,
            2 => JoinFailure::WrongPassword,
            3 => JoinFailure::ApNotFound,
            4 => JoinFailure::ConnectFailed,
            other => JoinFailure::Other(other),
        }
    }
}

impl core::fmt::Display for JoinFailure {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            JoinFailure::Timeout => f.write_str("connection timeout (1)"),
            JoinFailure::WrongPassword => f.write_str("wrong password (2)"),
            JoinFailure::ApNotFound => f.write_str("access point not found (3)"),
            JoinFailure::ConnectFailed => f.write_str("connection failed (4)"),
            JoinFailure::Other(code) => write!(f, "unknown failure code ({})", code),
            JoinFailure::Unspecified => f.write_str("failed without code"),
            JoinFailure::NoReply => f.write_str("no reply"),
        }
    }
}

/// Classified reply to `AT+CWJAP`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum JoinOutcome {
    Connected,
    Failed(JoinFailure),
}

/// Classify the text accumulated for one join attempt
///
/// An acquired address wins over everything else. Otherwise an explicit
/// failure (coded line, `FAIL` or `ERROR`) is a failure, and a bare `OK` is a
/// success. Returns `None` when the text holds none of these.
pub fn classify_join(text: &[u8]) -> Option<JoinOutcome> {
    if contains(text, marker::GOT_IP.as_bytes()) {
        return Some(JoinOutcome::Connected);
    }
    if let Some(code) = join_failure_code(text) {
        return Some(JoinOutcome::Failed(JoinFailure::from_code(code)));
    }
    if contains(text, marker::FAIL.as_bytes()) || contains(text, marker::ERROR.as_bytes()) {
        return Some(JoinOutcome::Failed(JoinFailure::Unspecified));
    }
    if contains(text, marker::OK.as_bytes()) {
        return Some(JoinOutcome::Connected);
    }
    None
}

/// Extract the digit from a `+CWJAP:<n>` failure line
///
/// The query form `+CWJAP:"ssid",...` carries a quote instead of a digit and
/// is not a failure line.
pub fn join_failure_code(text: &[u8]) -> Option<u8> {
    let prefix = marker::JOIN_CODE.as_bytes();
    let mut rest = text;
    while let Some(pos) = find(rest, prefix) {
        let after = &rest[pos + prefix.len()..];
        let digits = after.iter().take_while(|b| b.is_ascii_digit()).count();
        if digits > 0 {
            let code = after[..digits]
                .iter()
                .fold(0u8, |acc, d| acc.saturating_mul(10).saturating_add(d - b'0'));
            return Some(code);
        }
        rest = after;
    }
    None
}

/// Parse the station address from an `AT+CIFSR` reply
pub fn parse_station_ip(text: &[u8]) -> Option<String<16>> {
    let prefix = marker::STATION_IP.as_bytes();
    let start = find(text, prefix)? + prefix.len();
    let len = text[start..].iter().position(|&b| b == b'"')?;
    let ip = core::str::from_utf8(&text[start..start + len]).ok()?;
    let mut out = String::new();
    out.push_str(ip).ok()?;
    Some(out)
}

/// `AT+CIPSTART` for the given endpoint
///
/// The local port is only written for UDP, followed by mode `0` (remote peer
/// fixed).
pub fn start_connection(
    kind: ConnectionKind,
    remote: &str,
    remote_port: u16,
    local_port: Option<u16>,
) -> AtResult<Command> {
    let mut line = Command::new();
    write!(line, "AT+CIPSTART=\"{}\",\"", kind.as_str()).map_err(|_| AtError::CommandTooLong)?;
    push_escaped(&mut line, remote)?;
    write!(line, "\",{}", remote_port).map_err(|_| AtError::CommandTooLong)?;
    if let (ConnectionKind::Udp, Some(local)) = (kind, local_port) {
        write!(line, ",{},0", local).map_err(|_| AtError::CommandTooLong)?;
    }
    line.push_str("\r\n").map_err(|_| AtError::CommandTooLong)?;
    Ok(line)
}

/// `AT+CIPSEND=<len>`
pub fn send_request(len: usize) -> AtResult<Command> {
    let mut line = Command::new();
    write!(line, "AT+CIPSEND={}\r\n", len).map_err(|_| AtError::CommandTooLong)?;
    Ok(line)
}

/// `AT+CWJAP="<ssid>","<password>"`, both escaped
pub fn join_access_point(ssid: &str, password: &str) -> AtResult<Command> {
    let mut line = Command::new();
    line.push_str("AT+CWJAP=\"").map_err(|_| AtError::CommandTooLong)?;
    push_escaped(&mut line, ssid)?;
    line.push_str("\",\"").map_err(|_| AtError::CommandTooLong)?;
    push_escaped(&mut line, password)?;
    line.push_str("\"\r\n").map_err(|_| AtError::CommandTooLong)?;
    Ok(line)
}

/// Append `value` with `"`, `,` and `\` backslash-escaped
fn push_escaped(line: &mut Command, value: &str) -> AtResult<()> {
    for ch in value.chars() {
        if matches!(ch, '"' | ',' | '\\') {
            line.push('\\').map_err(|_| AtError::CommandTooLong)?;
        }
        line.push(ch).map_err(|_| AtError::CommandTooLong)?;
    }
    Ok(())
}

/// Position of the first occurrence of `needle` in `haystack`
pub fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Whether `needle` occurs contiguously in `haystack`
#[inline]
pub fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    find(haystack, needle).is_some()
}
