//! Simulated ESP8266 for driver tests.
//!
//! A virtual millisecond clock drives everything: replies are scheduled at
//! `now + delay` when a command is transmitted and become readable once the
//! clock has advanced past that point. In ring-buffer mode the released bytes
//! are pushed into a leaked `RingBuffer`, standing in for the RX interrupt.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use embedded_io::{ErrorKind, ErrorType};
use esp8266_at::{AtUart, Clock, DriverConfig, Esp8266, RingBuffer, RxSource};

/// Scheduled replies: (delay in ms, bytes)
pub type Script = Vec<(u32, Vec<u8>)>;

type Responder = Box<dyn FnMut(&[u8], u32) -> Script>;

pub struct SimState {
    pub now: u32,
    /// Bytes not yet delivered, kept sorted by release time
    pending: Vec<(u32, u8)>,
    /// Every transmit: (time, bytes)
    pub tx_log: Vec<(u32, Vec<u8>)>,
    /// Every `set_baud_rate` call in order
    pub baud_log: Vec<u32>,
    pub baud: u32,
    /// Transmits starting with this prefix fail while the count is non-zero
    fail_tx: Option<(Vec<u8>, u32)>,
    ring: Option<&'static RingBuffer>,
    responder: Responder,
}

impl SimState {
    fn schedule(&mut self, delay: u32, bytes: &[u8]) {
        let at = self.now + delay;
        for &b in bytes {
            let pos = self.pending.partition_point(|(t, _)| *t <= at);
            self.pending.insert(pos, (at, b));
        }
        self.release_to_ring();
    }

    /// Interrupt stand-in: move every due byte into the ring
    fn release_to_ring(&mut self) {
        if let Some(ring) = self.ring {
            let due = self.pending.partition_point(|(t, _)| *t <= self.now);
            for (_, b) in self.pending.drain(..due) {
                ring.push(b);
            }
        }
    }

    fn take_due(&mut self) -> Option<u8> {
        match self.pending.first() {
            Some(&(t, b)) if t <= self.now => {
                self.pending.remove(0);
                Some(b)
            }
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct Sim {
    pub state: Rc<RefCell<SimState>>,
}

impl Sim {
    /// A modem that answers each transmit through `responder(bytes, baud)`
    pub fn new(responder: impl FnMut(&[u8], u32) -> Script + 'static) -> Self {
        Self {
            state: Rc::new(RefCell::new(SimState {
                now: 0,
                pending: Vec::new(),
                tx_log: Vec::new(),
                baud_log: Vec::new(),
                baud: 115_200,
                fail_tx: None,
                ring: None,
                responder: Box::new(responder),
            })),
        }
    }

    /// A modem that never answers
    pub fn silent() -> Self {
        Self::new(|_, _| Vec::new())
    }

    pub fn uart(&self) -> SimUart {
        SimUart { state: Rc::clone(&self.state) }
    }

    pub fn clock(&self) -> SimClock {
        SimClock { state: Rc::clone(&self.state) }
    }

    /// Driver reading directly from the simulated UART
    pub fn polled(&self, config: DriverConfig) -> Esp8266<'static, SimUart, SimClock> {
        Esp8266::new(self.uart(), self.clock(), RxSource::Polled, config)
    }

    /// Driver fed through a ring buffer by the simulated interrupt
    pub fn buffered(&self, config: DriverConfig) -> Esp8266<'static, SimUart, SimClock> {
        let ring: &'static RingBuffer = Box::leak(Box::new(RingBuffer::new()));
        self.state.borrow_mut().ring = Some(ring);
        Esp8266::new(self.uart(), self.clock(), RxSource::Interrupt(ring), config)
    }

    /// Deliver unsolicited bytes after `delay` ms
    pub fn inject(&self, delay: u32, bytes: &[u8]) {
        self.state.borrow_mut().schedule(delay, bytes);
    }

    /// Make the next `count` transmits starting with `prefix` fail
    pub fn fail_transmits(&self, prefix: &str, count: u32) {
        self.state.borrow_mut().fail_tx = Some((prefix.as_bytes().to_vec(), count));
    }

    pub fn now(&self) -> u32 {
        self.state.borrow().now
    }

    /// Transmitted chunks as text, in order
    pub fn tx_text(&self) -> Vec<String> {
        self.state
            .borrow()
            .tx_log
            .iter()
            .map(|(_, bytes)| String::from_utf8_lossy(bytes).into_owned())
            .collect()
    }

    /// Transmit times of chunks starting with `prefix`
    pub fn tx_times(&self, prefix: &str) -> Vec<u32> {
        self.state
            .borrow()
            .tx_log
            .iter()
            .filter(|(_, bytes)| bytes.starts_with(prefix.as_bytes()))
            .map(|(t, _)| *t)
            .collect()
    }

    pub fn baud_log(&self) -> Vec<u32> {
        self.state.borrow().baud_log.clone()
    }
}

pub struct SimUart {
    state: Rc<RefCell<SimState>>,
}

impl ErrorType for SimUart {
    type Error = ErrorKind;
}

impl AtUart for SimUart {
    fn transmit(&mut self, bytes: &[u8], _timeout_ms: u32) -> Result<(), Self::Error> {
        let st = &mut *self.state.borrow_mut();
        if let Some((prefix, remaining)) = st.fail_tx.as_mut() {
            if *remaining > 0 && bytes.starts_with(prefix.as_slice()) {
                *remaining -= 1;
                return Err(ErrorKind::TimedOut);
            }
        }
        st.tx_log.push((st.now, bytes.to_vec()));
        let script = (st.responder)(bytes, st.baud);
        for (delay, reply) in script {
            st.schedule(delay, &reply);
        }
        Ok(())
    }

    fn read_byte(&mut self) -> Result<Option<u8>, Self::Error> {
        Ok(self.state.borrow_mut().take_due())
    }

    fn set_baud_rate(&mut self, baud: u32) -> Result<(), Self::Error> {
        let mut st = self.state.borrow_mut();
        st.baud_log.push(baud);
        st.baud = baud;
        Ok(())
    }
}

pub struct SimClock {
    state: Rc<RefCell<SimState>>,
}

impl Clock for SimClock {
    fn now_ms(&self) -> u32 {
        self.state.borrow().now
    }

    fn sleep_ms(&mut self, ms: u32) {
        let mut st = self.state.borrow_mut();
        st.now += ms;
        st.release_to_ring();
    }
}

/// A single reply `delay` ms after the command
pub fn after(delay: u32, text: &str) -> Script {
    vec![(delay, text.as_bytes().to_vec())]
}

/// Lossy text of a transmitted chunk
pub fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Answers every command line with `OK`, raw payloads with nothing
pub fn ok_to_everything() -> impl FnMut(&[u8], u32) -> Script {
    |bytes: &[u8], _baud: u32| {
        if bytes.ends_with(b"\r\n") {
            after(5, "\r\nOK\r\n")
        } else {
            Vec::new()
        }
    }
}

/// Config with the probe disabled so tests only see the commands they drive
pub fn quiet_config() -> DriverConfig {
    DriverConfig { probe_before_join: false, ..DriverConfig::default() }
}
