//! Assembles a driver over a serial port.

use std::io::Read;

use esp8266_at::{AtUart, Clock, Esp8266, RingBuffer, RxSource};

use crate::clock::StdClock;
use crate::config::{HostConfig, RxMode};
use crate::error::HostResult;
use crate::reader::{leak_ring, ReaderThread};
use crate::serial::SerialUart;

pub type HostDriver = Esp8266<'static, SerialUart, StdClock>;

/// An initialized driver plus the reader thread feeding it, if any
pub struct Link {
    pub driver: HostDriver,
    reader: Option<ReaderThread>,
}

impl Link {
    /// Open the configured port and initialize the driver
    pub fn open(config: &HostConfig) -> HostResult<Self> {
        let uart = SerialUart::open(&config.port, config.baud)?;
        let name = uart.name().unwrap_or_else(|| config.port.clone());
        log::info!("{}: {:?} receive mode", name, config.rx_mode);

        match config.rx_mode {
            RxMode::Interrupt => {
                let port = uart.try_clone_port()?;
                let ring = leak_ring();
                let driver = Esp8266::new(
                    uart,
                    StdClock::new(),
                    RxSource::Interrupt(ring),
                    config.driver.clone(),
                );
                let (driver, reader) = start_buffered(driver, ring, port)?;
                Ok(Self { driver, reader: Some(reader) })
            }
            RxMode::Polled => {
                let mut driver =
                    Esp8266::new(uart, StdClock::new(), RxSource::Polled, config.driver.clone());
                driver.initialize()?;
                Ok(Self { driver, reader: None })
            }
        }
    }

    /// False once the reader thread has died on a port error
    pub fn is_receiving(&self) -> bool {
        self.reader.as_ref().map_or(true, ReaderThread::is_running)
    }
}

/// Initialize a ring-fed driver, then start the thread that feeds the ring
///
/// `initialize` resets the ring including the producer's index, so the
/// reader must not exist before it returns.
pub fn start_buffered<U, C, R>(
    mut driver: Esp8266<'static, U, C>,
    ring: &'static RingBuffer,
    port: R,
) -> HostResult<(Esp8266<'static, U, C>, ReaderThread)>
where
    U: AtUart,
    C: Clock,
    R: Read + Send + 'static,
{
    driver.initialize()?;
    let reader = ReaderThread::spawn(port, ring)?;
    Ok((driver, reader))
}
