//! # Response Matcher
//!
//! Accumulates received bytes and tests them against the patterns a command
//! step is waiting for, under an overall deadline.
//!
//! ## Receive Sources
//!
//! ```text
//! RxSource::Interrupt(&RingBuffer) ── pop() ──┐
//!                                             ├──► accumulator ──► pattern test
//! RxSource::Polled ── AtUart::read_byte() ────┘
//! ```
//!
//! Both sources feed the same loop, so buffered and buffer-less boards share
//! one matching implementation.
//!
//! ## Wait Modes
//!
//! - [`WaitMode::Simple`]: return the instant a pattern has been seen.
//! - [`WaitMode::MultiLine`]: after a pattern or a terminal marker
//!   (`OK\r\n`, `ERROR\r\n`, `FAIL`) drain for a short grace window to pick up
//!   trailing lines. A silence of `quiet_period_ms` after the first byte also
//!   ends the wait. Replies that pause longer than that mid-message are cut
//!   short; the period is configurable for that reason.

use heapless::Vec;

use crate::buffer::{RingBuffer, RX_BUFFER_SIZE};
use crate::config::DriverConfig;
use crate::protocol::{self, marker};
use crate::traits::{AtError, AtUart, Clock};

/// Where received bytes come from
#[derive(Debug, Clone, Copy)]
pub enum RxSource<'r, const N: usize = RX_BUFFER_SIZE> {
    /// Filled by the UART receive interrupt
    Interrupt(&'r RingBuffer<N>),
    /// Read directly from the UART, no interrupt involved
    Polled,
}

/// How a wait decides it is done
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WaitMode {
    Simple,
    MultiLine,
}

/// Why a wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WaitOutcome {
    /// The pattern at this index of the requested list was seen
    Matched(usize),
    /// A terminal marker ended a multi-line reply without a requested pattern
    Terminated,
    /// Silence after at least one byte ended a multi-line reply
    Quiet,
    /// The deadline passed
    TimedOut,
}

/// Outcome of one wait plus everything accumulated during it
#[derive(Debug, Clone)]
pub struct Reply<const N: usize = RX_BUFFER_SIZE> {
    pub outcome: WaitOutcome,
    text: Vec<u8, N>,
}

impl<const N: usize> Reply<N> {
    /// True unless the wait timed out
    pub fn is_found(&self) -> bool {
        self.outcome != WaitOutcome::TimedOut
    }

    /// Index of the matched pattern, if any
    pub fn matched(&self) -> Option<usize> {
        match self.outcome {
            WaitOutcome::Matched(index) => Some(index),
            _ => None,
        }
    }

    /// Raw accumulated bytes
    pub fn bytes(&self) -> &[u8] {
        &self.text
    }

    /// Accumulated text up to the first invalid UTF-8 sequence
    pub fn as_str(&self) -> &str {
        match core::str::from_utf8(&self.text) {
            Ok(text) => text,
            Err(e) => core::str::from_utf8(&self.text[..e.valid_up_to()]).unwrap_or_default(),
        }
    }

    /// Whether `needle` occurs anywhere in the accumulated text
    pub fn contains(&self, needle: &str) -> bool {
        protocol::contains(&self.text, needle.as_bytes())
    }

    /// Take over a follow-up wait: its bytes are appended (up to capacity)
    /// and its outcome replaces this one
    pub(crate) fn append(&mut self, next: Reply<N>) {
        for &byte in next.text.iter() {
            if self.text.push(byte).is_err() {
                break;
            }
        }
        self.outcome = next.outcome;
    }
}

/// Upper bound on bytes thrown away by one polled flush
const fn discard_limit(n: usize) -> usize {
    4 * n
}

/// One wait over borrowed driver state
///
/// Built per call by the driver; holds no state of its own between calls.
pub struct Matcher<'a, 'r, U, C, const N: usize> {
    pub uart: &'a mut U,
    pub clock: &'a mut C,
    pub source: &'a RxSource<'r, N>,
    pub config: &'a DriverConfig,
}

impl<'a, 'r, U, C, const N: usize> Matcher<'a, 'r, U, C, N>
where
    U: AtUart,
    C: Clock,
{
    /// Next received byte from the configured source
    fn next_byte(&mut self) -> Option<u8> {
        match self.source {
            RxSource::Interrupt(ring) => ring.pop(),
            RxSource::Polled => match self.uart.read_byte() {
                Ok(byte) => byte,
                Err(e) => {
                    warn!("uart receive failed: {}", AtError::transport(e));
                    None
                }
            },
        }
    }

    /// Throw away everything currently pending
    pub fn discard_pending(&mut self) {
        match self.source {
            RxSource::Interrupt(ring) => ring.discard_pending(),
            RxSource::Polled => {
                let mut dropped = 0;
                while dropped < discard_limit(N) && self.next_byte().is_some() {
                    dropped += 1;
                }
                if dropped > 0 {
                    trace!("discarded {} stale bytes", dropped);
                }
            }
        }
    }

    /// Move pending bytes into `dst`, returns the count
    pub fn read_into(&mut self, dst: &mut [u8]) -> usize {
        match self.source {
            RxSource::Interrupt(ring) => ring.drain_into(dst),
            RxSource::Polled => {
                let mut count = 0;
                while count < dst.len() {
                    match self.next_byte() {
                        Some(byte) => {
                            dst[count] = byte;
                            count += 1;
                        }
                        None => break,
                    }
                }
                count
            }
        }
    }

    /// Drain whatever is pending into `acc`, dropping bytes past capacity
    fn drain_into_accumulator(&mut self, acc: &mut Vec<u8, N>) {
        while let Some(byte) = self.next_byte() {
            let _ = acc.push(byte);
        }
    }

    /// Wait until one of `patterns` appears, or the deadline passes
    ///
    /// Patterns are tested after every accepted byte, so a match always ends
    /// at the newest byte and only the accumulator's tail is compared.
    pub fn wait_for_any(&mut self, patterns: &[&str], timeout_ms: u32, mode: WaitMode) -> Reply<N> {
        let mut acc: Vec<u8, N> = Vec::new();

        if let Some(index) = patterns.iter().position(|p| p.is_empty()) {
            return Reply { outcome: WaitOutcome::Matched(index), text: acc };
        }

        let poll = self.config.poll_interval_ms.max(1);
        let start = self.clock.now_ms();
        let mut last_rx = start;
        let mut received_any = false;

        loop {
            let mut got_new = false;

            while let Some(byte) = self.next_byte() {
                got_new = true;
                received_any = true;
                last_rx = self.clock.now_ms();

                if acc.push(byte).is_err() {
                    // Accumulator full: keep draining, the byte is lost
                    continue;
                }

                if let Some(index) = patterns.iter().position(|p| acc.ends_with(p.as_bytes())) {
                    return self.conclude(acc, WaitOutcome::Matched(index), mode);
                }

                if mode == WaitMode::MultiLine
                    && marker::TERMINAL.iter().any(|m| acc.ends_with(m.as_bytes()))
                {
                    return self.conclude(acc, WaitOutcome::Terminated, mode);
                }
            }

            if self.clock.elapsed_since(start) >= timeout_ms {
                if acc.is_empty() {
                    warn!("timeout after {} ms, no response", timeout_ms);
                } else {
                    warn!(
                        "timeout after {} ms, partial response: {}",
                        timeout_ms,
                        text_of(&acc)
                    );
                }
                return Reply { outcome: WaitOutcome::TimedOut, text: acc };
            }

            if mode == WaitMode::MultiLine && received_any && !got_new {
                if let Some(quiet) = self.config.quiet_period_ms {
                    if self.clock.elapsed_since(last_rx) >= quiet {
                        return self.conclude(acc, WaitOutcome::Quiet, mode);
                    }
                }
            }

            if !got_new {
                self.clock.sleep_ms(poll);
            }
        }
    }

    /// Apply the multi-line grace drain and build the reply
    fn conclude(&mut self, mut acc: Vec<u8, N>, outcome: WaitOutcome, mode: WaitMode) -> Reply<N> {
        if mode == WaitMode::MultiLine && outcome != WaitOutcome::Quiet {
            self.clock.sleep_ms(self.config.grace_ms);
            self.drain_into_accumulator(&mut acc);
        }
        debug!("<- {}", text_of(&acc));
        Reply { outcome, text: acc }
    }
}

/// Printable view of accumulated bytes
fn text_of(bytes: &[u8]) -> &str {
    core::str::from_utf8(bytes).unwrap_or("<non-utf8>")
}
