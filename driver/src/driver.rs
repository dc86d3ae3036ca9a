//! # ESP8266 Driver
//!
//! [`Esp8266`] owns the UART, the clock, the receive source and the
//! configuration, and runs every AT flow on top of them.
//!
//! ## Step Pattern
//!
//! ```text
//! clear pending input ──► send command ──► wait for pattern ──► branch
//! ```
//!
//! Steps run strictly one after another on the caller's stack; the next
//! command is never sent before the previous wait has concluded.
//!
//! ## Failure Policy
//!
//! | Flow             | Step failure                 | Action            |
//! |------------------|------------------------------|-------------------|
//! | start_connection | `AT+CIPMUX=0` not confirmed  | abort             |
//! | send_payload     | no `>` prompt                | abort, no payload |
//! | connect_station  | `AT+CWMODE=1` not confirmed  | warn, continue    |
//! | connect_station  | `AT+CWQAP`                   | ignored           |
//! | connect_station  | join attempt or its transmit | retry (bounded)   |
//! | discover_baud    | no `OK` at a rate            | next candidate    |

use heapless::String;

use crate::buffer::RX_BUFFER_SIZE;
use crate::config::DriverConfig;
use crate::matcher::{Matcher, Reply, RxSource, WaitMode, WaitOutcome};
use crate::protocol::{self, cmd, marker, ConnectionKind, JoinFailure, JoinOutcome, MAX_SEND_LEN};
use crate::traits::{AtError, AtResult, AtUart, Clock};

/// Driver for an ESP8266 running the AT firmware
///
/// # Example
///
/// ```rust,ignore
/// static RX: RingBuffer = RingBuffer::new();
///
/// let mut esp = Esp8266::new(uart, clock, RxSource::Interrupt(&RX), DriverConfig::default());
/// esp.initialize()?;
/// esp.connect_station("lab", "hunter2")?;
/// esp.start_connection(ConnectionKind::Tcp, "192.168.1.10", 8080, None)?;
/// esp.send_payload(b"ch0=1.234\n")?;
/// ```
pub struct Esp8266<'r, U, C, const N: usize = RX_BUFFER_SIZE> {
    uart: U,
    clock: C,
    source: RxSource<'r, N>,
    config: DriverConfig,
    /// Rate the UART is currently configured for
    baud_rate: u32,
    /// Set once the `>` prompt of a streaming send has been seen
    transparent: bool,
}

impl<'r, U, C, const N: usize> Esp8266<'r, U, C, N>
where
    U: AtUart,
    C: Clock,
{
    /// Create a driver; no I/O happens until [`initialize`](Self::initialize)
    pub fn new(uart: U, clock: C, source: RxSource<'r, N>, config: DriverConfig) -> Self {
        let baud_rate = config.initial_baud;
        Self {
            uart,
            clock,
            source,
            config,
            baud_rate,
            transparent: false,
        }
    }

    /// Active configuration
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Rate the UART is currently set to
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    /// Whether the link is in transparent (passthrough) mode
    pub fn is_transparent(&self) -> bool {
        self.transparent
    }

    fn matcher(&mut self) -> Matcher<'_, 'r, U, C, N> {
        Matcher {
            uart: &mut self.uart,
            clock: &mut self.clock,
            source: &self.source,
            config: &self.config,
        }
    }

    fn ensure_command_mode(&self) -> AtResult<()> {
        if self.transparent {
            return Err(AtError::TransparentMode);
        }
        Ok(())
    }

    /// Reset the receive path and arm reception
    ///
    /// With [`RxSource::Interrupt`] the ring buffer is fully reset, which
    /// rewrites the producer's index: call this before the RX interrupt (or
    /// whatever pushes into the ring) is running.
    pub fn initialize(&mut self) -> AtResult<()> {
        match self.source {
            RxSource::Interrupt(ring) => ring.clear(),
            RxSource::Polled => self.matcher().discard_pending(),
        }
        self.uart.start_receive().map_err(AtError::transport)?;
        self.transparent = false;
        info!(
            "esp8266 driver initialized at {} baud, {} byte receive buffer",
            self.baud_rate,
            N
        );
        Ok(())
    }

    /// Discard all pending received bytes
    pub fn clear_buffer(&mut self) {
        self.matcher().discard_pending();
    }

    /// Transmit a command line verbatim
    pub fn send_command(&mut self, command: &str) -> AtResult<()> {
        self.ensure_command_mode()?;
        debug!("-> {}", command.trim_end());
        self.transmit(command.as_bytes())
    }

    /// Transmit bytes with a timeout scaled to their time on the wire
    fn transmit(&mut self, bytes: &[u8]) -> AtResult<()> {
        // 10 bit times per byte (start + 8 data + stop)
        let wire_ms = (bytes.len() as u64 * 10_000) / u64::from(self.baud_rate.max(1));
        let timeout = self
            .config
            .tx_timeout_ms
            .saturating_add(u32::try_from(wire_ms).unwrap_or(u32::MAX));
        self.uart.transmit(bytes, timeout).map_err(|e| {
            let err = AtError::transport(e);
            warn!("uart transmit failed: {}", err);
            err
        })
    }

    /// Wait for `pattern` in freshly received bytes
    pub fn wait_for(&mut self, pattern: &str, timeout_ms: u32) -> Reply<N> {
        self.matcher().wait_for_any(&[pattern], timeout_ms, WaitMode::Simple)
    }

    /// Wait for the first of several patterns
    pub fn wait_for_any(&mut self, patterns: &[&str], timeout_ms: u32, mode: WaitMode) -> Reply<N> {
        self.matcher().wait_for_any(patterns, timeout_ms, mode)
    }

    /// Clear, send, wait: one command step
    fn exchange(
        &mut self,
        command: &str,
        patterns: &[&str],
        timeout_ms: u32,
        mode: WaitMode,
    ) -> AtResult<Reply<N>> {
        self.ensure_command_mode()?;
        self.clear_buffer();
        self.send_command(command)?;
        Ok(self.wait_for_any(patterns, timeout_ms, mode))
    }

    /// Send a command and wait for `OK`
    ///
    /// An `ERROR` reply ends the wait early as [`AtError::Rejected`].
    pub fn send_and_wait_ok(&mut self, command: &str, timeout_ms: u32) -> AtResult<Reply<N>> {
        let reply = self.exchange(command, &[marker::OK, marker::ERROR], timeout_ms, WaitMode::Simple)?;
        match reply.matched() {
            Some(0) => Ok(reply),
            Some(_) => Err(AtError::Rejected),
            None => Err(AtError::Timeout),
        }
    }

    /// Send a command and collect its multi-line reply
    pub fn query(&mut self, command: &str, timeout_ms: u32) -> AtResult<Reply<N>> {
        let reply = self.exchange(command, &[], timeout_ms, WaitMode::MultiLine)?;
        let outcome = reply.outcome;
        match outcome {
            WaitOutcome::TimedOut => Err(AtError::Timeout),
            _ if reply.contains(marker::ERROR) || reply.contains(marker::FAIL) => {
                Err(AtError::Rejected)
            }
            _ => Ok(reply),
        }
    }

    /// Copy pending received bytes into `dst`, returns the count
    pub fn get_buffered_text(&mut self, dst: &mut [u8]) -> usize {
        self.matcher().read_into(dst)
    }

    /// Restart the module and wait for its `ready` banner
    pub fn reset(&mut self) -> AtResult<()> {
        self.transparent = false;
        let reply = self.exchange(cmd::RESET, &[marker::READY], self.config.reset_timeout_ms, WaitMode::Simple)?;
        if !reply.is_found() {
            return Err(AtError::Timeout);
        }
        info!("module restarted");
        Ok(())
    }

    /// Open the single transport session
    ///
    /// `local_port` is only used for UDP.
    pub fn start_connection(
        &mut self,
        kind: ConnectionKind,
        remote: &str,
        remote_port: u16,
        local_port: Option<u16>,
    ) -> AtResult<()> {
        let line = protocol::start_connection(kind, remote, remote_port, local_port)?;

        if let Err(e) = self.send_and_wait_ok(cmd::SINGLE_CONNECTION, self.config.ok_timeout_ms) {
            warn!("single connection mode not confirmed: {}", e);
            return Err(e);
        }

        let reply = self.exchange(
            &line,
            &[marker::CONNECT, marker::ERROR],
            self.config.connect_timeout_ms,
            WaitMode::Simple,
        )?;
        match reply.matched() {
            Some(0) => {
                info!("{} connection to {}:{} established", kind.as_str(), remote, remote_port);
                Ok(())
            }
            Some(_) => {
                warn!("connection to {}:{} refused", remote, remote_port);
                Err(AtError::Rejected)
            }
            None if reply.contains(marker::OK) => Ok(()),
            None => {
                let fallback = self.wait_for(marker::OK, self.config.connect_fallback_timeout_ms);
                if fallback.is_found() {
                    info!("connection acknowledged without CONNECT marker");
                    Ok(())
                } else {
                    Err(AtError::Timeout)
                }
            }
        }
    }

    /// Close the transport session
    pub fn close_connection(&mut self) -> AtResult<()> {
        self.send_and_wait_ok(cmd::CLOSE, self.config.ok_timeout_ms)?;
        Ok(())
    }

    /// Send one payload over the open session
    ///
    /// The payload is written only after the `>` prompt has been seen.
    pub fn send_payload(&mut self, payload: &[u8]) -> AtResult<()> {
        self.ensure_command_mode()?;
        if payload.is_empty() || payload.len() > MAX_SEND_LEN {
            return Err(AtError::InvalidPayloadLength);
        }

        let line = protocol::send_request(payload.len())?;
        let prompt = self.exchange(
            &line,
            &[marker::PROMPT, marker::ERROR],
            self.config.prompt_timeout_ms,
            WaitMode::Simple,
        )?;
        match prompt.matched() {
            Some(0) => {}
            Some(_) => {
                warn!("send request rejected, payload not sent");
                return Err(AtError::Rejected);
            }
            None => {
                warn!("no send prompt, payload not sent");
                return Err(AtError::NoPrompt);
            }
        }

        debug!("-> {} payload bytes", payload.len());
        self.transmit(payload)?;

        let done = self.wait_for_any(
            &[marker::SEND_OK, marker::SEND_FAIL, marker::ERROR],
            self.config.send_timeout_ms,
            WaitMode::Simple,
        );
        match done.matched() {
            Some(0) => Ok(()),
            Some(1) => Err(AtError::SendFailed),
            Some(_) => Err(AtError::Rejected),
            None => Err(AtError::Timeout),
        }
    }

    /// Enter or leave transparent (passthrough) mode
    pub fn set_transparent_mode(&mut self, enable: bool) -> AtResult<()> {
        if enable {
            self.enter_transparent()
        } else {
            self.exit_transparent()
        }
    }

    fn enter_transparent(&mut self) -> AtResult<()> {
        if self.transparent {
            return Ok(());
        }
        self.send_and_wait_ok(cmd::TRANSPARENT_ON, self.config.ok_timeout_ms)?;

        let prompt = self.exchange(
            cmd::START_STREAM,
            &[marker::PROMPT],
            self.config.prompt_timeout_ms,
            WaitMode::Simple,
        )?;
        if !prompt.is_found() {
            warn!("no stream prompt, staying in command mode");
            return Err(AtError::NoPrompt);
        }

        self.transparent = true;
        info!("transparent mode on");
        Ok(())
    }

    fn exit_transparent(&mut self) -> AtResult<()> {
        // Anything sent inside a guard window is taken as data
        let guard = self.config.transparent_guard_ms;
        self.clock.sleep_ms(guard);
        self.transmit(cmd::ESCAPE.as_bytes())?;
        self.clock.sleep_ms(guard);
        self.transparent = false;

        self.send_and_wait_ok(cmd::TRANSPARENT_OFF, self.config.ok_timeout_ms)?;
        info!("transparent mode off");
        Ok(())
    }

    /// Write raw bytes while in transparent mode
    pub fn write_raw(&mut self, data: &[u8]) -> AtResult<()> {
        if !self.transparent {
            return Err(AtError::NotTransparent);
        }
        self.transmit(data)
    }

    /// Join an access point in station mode
    ///
    /// Tries `join_attempts` times with `join_retry_delay_ms` between tries.
    /// A UART error during an attempt counts as a failed attempt. The error
    /// of the last attempt is returned.
    pub fn connect_station(&mut self, ssid: &str, password: &str) -> AtResult<()> {
        let line = protocol::join_access_point(ssid, password)?;

        if self.config.probe_before_join {
            if let Err(e) = self.send_and_wait_ok(cmd::AT, self.config.ok_timeout_ms) {
                warn!("module not responding: {}", e);
                return Err(e);
            }
        }

        match self.exchange(
            cmd::STATION_MODE,
            &[marker::OK, marker::NO_CHANGE],
            self.config.ok_timeout_ms,
            WaitMode::Simple,
        ) {
            Ok(reply) if reply.is_found() => debug!("station mode set"),
            Ok(_) => warn!("station mode not confirmed, continuing"),
            Err(e) => warn!("station mode not confirmed ({}), continuing", e),
        }

        // Drop any previous association; the outcome does not matter
        let _ = self.send_and_wait_ok(cmd::QUIT_AP, self.config.ok_timeout_ms);

        let attempts = self.config.join_attempts.max(1);
        let mut last_error = AtError::Join(JoinFailure::NoReply);
        for attempt in 1..=attempts {
            if attempt > 1 {
                self.clock.sleep_ms(self.config.join_retry_delay_ms);
            }
            info!("joining \"{}\" (attempt {}/{})", ssid, attempt, attempts);

            match self.join_attempt(&line) {
                Ok(JoinOutcome::Connected) => {
                    info!("joined \"{}\"", ssid);
                    return Ok(());
                }
                Ok(JoinOutcome::Failed(failure)) => {
                    warn!("join attempt {} failed: {}", attempt, failure);
                    last_error = AtError::Join(failure);
                }
                Err(e) => {
                    warn!("join attempt {} aborted: {}", attempt, e);
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    /// One `AT+CWJAP` exchange, classified
    ///
    /// A reply that goes quiet before anything decisive has arrived (the
    /// firmware pauses between `WIFI CONNECTED` and `WIFI GOT IP`) keeps the
    /// attempt listening until its deadline. Text from every continuation is
    /// classified together, so a line split by such a pause still counts.
    fn join_attempt(&mut self, line: &str) -> AtResult<JoinOutcome> {
        let timeout = self.config.join_timeout_ms;
        let start = self.clock.now_ms();
        let mut reply = self.exchange(line, &[marker::GOT_IP], timeout, WaitMode::MultiLine)?;

        loop {
            if let Some(outcome) = protocol::classify_join(reply.bytes()) {
                return Ok(outcome);
            }
            if reply.outcome == WaitOutcome::TimedOut {
                return Ok(JoinOutcome::Failed(JoinFailure::NoReply));
            }
            let remaining = timeout.saturating_sub(self.clock.elapsed_since(start));
            let more = self.wait_for_any(&[marker::GOT_IP], remaining, WaitMode::MultiLine);
            reply.append(more);
        }
    }

    /// Leave the current access point
    pub fn disconnect_station(&mut self) -> AtResult<()> {
        self.send_and_wait_ok(cmd::QUIT_AP, self.config.ok_timeout_ms)?;
        Ok(())
    }

    /// Station IP address reported by `AT+CIFSR`
    pub fn local_ip(&mut self) -> AtResult<String<16>> {
        let reply = self.query(cmd::LOCAL_IP, self.config.ok_timeout_ms)?;
        protocol::parse_station_ip(reply.bytes()).ok_or(AtError::Rejected)
    }

    /// Find the rate the module answers at
    ///
    /// Candidates are probed in configured order and the search stops at the
    /// first rate that gets an `OK`. When none answers the UART is put back to
    /// the rate it had before.
    pub fn discover_baud_rate(&mut self) -> Option<u32> {
        let original = self.baud_rate;
        let candidates = self.config.baud_candidates.clone();

        for &rate in candidates.iter() {
            if let Err(e) = self.uart.set_baud_rate(rate) {
                warn!("cannot switch uart to {} baud: {}", rate, AtError::transport(e));
                continue;
            }
            self.baud_rate = rate;
            debug!("probing {} baud", rate);

            match self.exchange(cmd::AT, &[marker::OK], self.config.ok_timeout_ms, WaitMode::Simple) {
                Ok(reply) if reply.is_found() && !reply.bytes().is_empty() => {
                    info!("module answers at {} baud", rate);
                    return Some(rate);
                }
                Ok(_) => {}
                Err(e) => warn!("probe at {} baud failed: {}", rate, e),
            }
        }

        warn!("no candidate rate answered, restoring {} baud", original);
        match self.uart.set_baud_rate(original) {
            Ok(()) => self.baud_rate = original,
            Err(e) => error!("cannot restore {} baud: {}", original, AtError::transport(e)),
        }
        None
    }
}
