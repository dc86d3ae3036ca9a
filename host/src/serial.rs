//! `AtUart` over a host serial port.

use std::io::{self, Read, Write};
use std::time::Duration;

use esp8266_at::AtUart;
use serialport::SerialPort;

use crate::error::HostResult;

/// Receive timeout used by polled reads and the reader thread
pub const READ_POLL: Duration = Duration::from_millis(10);

/// A serial port driven as the module's UART
pub struct SerialUart {
    port: Box<dyn SerialPort>,
}

impl SerialUart {
    /// Open `path` at `baud`, 8N1
    pub fn open(path: &str, baud: u32) -> HostResult<Self> {
        let port = serialport::new(path, baud).timeout(READ_POLL).open()?;
        log::info!("opened {} at {} baud", path, baud);
        Ok(Self { port })
    }

    /// Second handle on the same port for a reader thread
    pub fn try_clone_port(&self) -> HostResult<Box<dyn SerialPort>> {
        let mut port = self.port.try_clone()?;
        port.set_timeout(READ_POLL)?;
        Ok(port)
    }

    pub fn name(&self) -> Option<String> {
        self.port.name()
    }
}

impl embedded_io::ErrorType for SerialUart {
    type Error = io::Error;
}

impl AtUart for SerialUart {
    fn transmit(&mut self, bytes: &[u8], timeout_ms: u32) -> Result<(), Self::Error> {
        self.port
            .set_timeout(Duration::from_millis(u64::from(timeout_ms)))?;
        let result = self.port.write_all(bytes).and_then(|_| self.port.flush());
        self.port.set_timeout(READ_POLL)?;
        result
    }

    fn read_byte(&mut self) -> Result<Option<u8>, Self::Error> {
        if self.port.bytes_to_read()? == 0 {
            return Ok(None);
        }
        let mut byte = [0u8; 1];
        match self.port.read(&mut byte) {
            Ok(1) => Ok(Some(byte[0])),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn set_baud_rate(&mut self, baud: u32) -> Result<(), Self::Error> {
        self.port.set_baud_rate(baud)?;
        Ok(())
    }
}
