//! Background receive thread.
//!
//! On a microcontroller the RX interrupt pushes each byte into the ring
//! buffer. On the host a thread blocks on the serial port instead and pushes
//! whatever arrives, which keeps the driver's single-producer contract.

use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use esp8266_at::RingBuffer;

use crate::error::HostResult;

/// Allocate a ring buffer that lives for the rest of the process
pub fn leak_ring() -> &'static RingBuffer {
    Box::leak(Box::new(RingBuffer::new()))
}

/// Producer thread feeding a ring buffer from a serial port
///
/// The port should be opened with a short read timeout so the stop flag is
/// checked regularly; `TimedOut` reads are not errors. Stops and joins when
/// dropped.
pub struct ReaderThread {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ReaderThread {
    pub fn spawn<R>(mut port: R, ring: &'static RingBuffer) -> HostResult<Self>
    where
        R: Read + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("esp8266-rx".into())
            .spawn(move || {
                let mut chunk = [0u8; 64];
                while !flag.load(Ordering::Relaxed) {
                    match port.read(&mut chunk) {
                        Ok(n) => {
                            for &b in &chunk[..n] {
                                ring.push(b);
                            }
                        }
                        Err(e) if e.kind() == io::ErrorKind::TimedOut => {}
                        Err(e) => {
                            log::error!("serial read failed, reader stopping: {}", e);
                            break;
                        }
                    }
                }
                log::debug!("reader thread exiting");
            })?;

        Ok(Self { stop, handle: Some(handle) })
    }

    /// Whether the thread is still receiving
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for ReaderThread {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("reader thread panicked");
            }
        }
    }
}
