//! # ESP8266 AT Driver Core
//!
//! This crate turns a raw, half-duplex UART link to an ESP8266 running the AT
//! firmware into a command/response and data-transfer channel:
//!
//! - **Ring Buffer**: Lock-free SPSC byte store fed by the UART RX interrupt
//! - **Transport / Matcher**: Send one command, wait for a terminator pattern
//! - **Flows**: Station join, connection setup, payload send, transparent mode,
//!   baud-rate discovery
//!
//! ## Architecture
//!
//! ```text
//! UART RX ISR ──push──► RingBuffer ──pop──► Matcher ──► Reply
//!                                             ▲
//! Caller ──► Flow ──► send_command ──► UART TX │
//!                 └──── wait_for ──────────────┘
//! ```
//!
//! ## Interrupt Wiring
//!
//! The ring buffer lives in a `static` shared with the receive interrupt. The
//! handler only pushes the received byte and re-arms reception:
//!
//! ```rust,ignore
//! static RX: RingBuffer = RingBuffer::new();
//!
//! fn uart_rx_complete(byte: u8) {
//!     RX.push(byte);
//!     // re-arm the single-byte receive here
//! }
//!
//! let mut esp = Esp8266::new(uart, clock, RxSource::Interrupt(&RX), DriverConfig::default());
//! esp.initialize()?;
//! esp.connect_station("home", "secret")?;
//! ```

#![cfg_attr(not(any(test, feature = "std")), no_std)]

// This must go first so the macros are visible to the other modules.
#[macro_use]
mod fmt;

pub mod buffer;
pub mod config;
pub mod driver;
pub mod matcher;
pub mod protocol;
pub mod traits;

// Re-export main types for convenience
pub use buffer::{RingBuffer, RX_BUFFER_SIZE};
pub use config::DriverConfig;
pub use driver::Esp8266;
pub use matcher::{Reply, RxSource, WaitMode, WaitOutcome};
pub use protocol::{ConnectionKind, JoinFailure, JoinOutcome};
pub use traits::{AtError, AtResult, AtUart, Clock};

/// Library version, reported by the host probe tool
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Longest formatted AT command line, including the trailing CRLF
pub const MAX_COMMAND_LEN: usize = 192;
