//! # Hardware Seams & Error Types
//!
//! The driver never touches peripheral registers. It consumes two small
//! capabilities from the board layer:
//!
//! - [`AtUart`]: transmit bytes, read the next received byte without
//!   blocking, and change the line rate
//! - [`Clock`]: a wrapping millisecond counter and a blocking sleep
//!
//! ## Design Rationale
//!
//! 1. **Testability**: Simulated modems implement the same traits as the real
//!    UART, so every flow can be exercised on the host
//! 2. **Portability**: Any HAL that can move bytes fits behind `AtUart`
//! 3. **Error Kinds**: Transport errors are reduced to
//!    [`embedded_io::ErrorKind`] so [`AtError`] stays `Copy`

use core::fmt;

use embedded_io::ErrorKind;

use crate::protocol::JoinFailure;

/// Errors reported by the driver and its flows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AtError {
    /// No expected pattern arrived before the deadline
    Timeout,
    /// The UART reported a failure while transmitting or receiving
    Transport(ErrorKind),
    /// The module answered `ERROR` or `FAIL`
    Rejected,
    /// The `>` prompt never arrived, the payload was not sent
    NoPrompt,
    /// The module answered `SEND FAIL` after the payload
    SendFailed,
    /// Access point association failed on every attempt
    Join(JoinFailure),
    /// A formatted command did not fit the command buffer
    CommandTooLong,
    /// Payload length outside what a single send accepts
    InvalidPayloadLength,
    /// Command-mode operation attempted while in transparent mode
    TransparentMode,
    /// Raw passthrough attempted outside transparent mode
    NotTransparent,
}

impl AtError {
    /// Wrap a UART error by its kind
    pub fn transport<E: embedded_io::Error>(err: E) -> Self {
        AtError::Transport(err.kind())
    }
}

impl fmt::Display for AtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AtError::Timeout => f.write_str("timed out waiting for response"),
            AtError::Transport(kind) => write!(f, "uart transport error: {:?}", kind),
            AtError::Rejected => f.write_str("module rejected the command"),
            AtError::NoPrompt => f.write_str("send prompt not received"),
            AtError::SendFailed => f.write_str("module reported SEND FAIL"),
            AtError::Join(failure) => write!(f, "access point join failed: {}", failure),
            AtError::CommandTooLong => f.write_str("command exceeds buffer"),
            AtError::InvalidPayloadLength => f.write_str("payload length out of range"),
            AtError::TransparentMode => f.write_str("link is in transparent mode"),
            AtError::NotTransparent => f.write_str("link is not in transparent mode"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for AtError {}

/// Result type alias for driver operations
pub type AtResult<T> = Result<T, AtError>;

/// Byte-level UART capability consumed by the driver
///
/// # Receive Path
///
/// With [`RxSource::Interrupt`](crate::RxSource::Interrupt) the board's RX
/// interrupt pushes into the shared ring buffer and `read_byte` is only used
/// to flush stale input. With [`RxSource::Polled`](crate::RxSource::Polled)
/// every response byte comes through `read_byte`.
pub trait AtUart: embedded_io::ErrorType {
    /// Transmit all of `bytes`, giving up after `timeout_ms`
    fn transmit(&mut self, bytes: &[u8], timeout_ms: u32) -> Result<(), Self::Error>;

    /// Return the next received byte if one is ready, without blocking
    fn read_byte(&mut self) -> Result<Option<u8>, Self::Error>;

    /// Reconfigure the line rate
    ///
    /// Only called between complete command/response cycles.
    fn set_baud_rate(&mut self, baud: u32) -> Result<(), Self::Error>;

    /// Arm the single-byte receive interrupt
    ///
    /// Called once from [`Esp8266::initialize`](crate::Esp8266::initialize).
    /// The interrupt handler is responsible for re-arming after each byte.
    fn start_receive(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Monotonic millisecond clock
///
/// `now_ms` wraps at `u32::MAX`; the driver only ever compares with
/// `wrapping_sub`.
pub trait Clock {
    /// Milliseconds since an arbitrary epoch
    fn now_ms(&self) -> u32;

    /// Block for at least `ms` milliseconds
    fn sleep_ms(&mut self, ms: u32);

    /// Milliseconds elapsed since `start`
    fn elapsed_since(&self, start: u32) -> u32 {
        self.now_ms().wrapping_sub(start)
    }
}

impl<T: Clock + ?Sized> Clock for &mut T {
    fn now_ms(&self) -> u32 {
        (**self).now_ms()
    }

    fn sleep_ms(&mut self, ms: u32) {
        (**self).sleep_ms(ms)
    }
}
