//! # ESP8266 AT Host Adapter
//!
//! Runs the `esp8266-at` driver on a desktop machine:
//!
//! - [`SerialUart`]: `AtUart` over a `serialport` handle
//! - [`ReaderThread`]: fills the ring buffer the way an RX interrupt would
//! - [`StdClock`]: `Clock` over `std::time::Instant`
//! - [`HostConfig`]: JSON configuration for the probe tool

pub mod clock;
pub mod config;
pub mod error;
pub mod link;
pub mod reader;
pub mod serial;

pub use clock::StdClock;
pub use config::{HostConfig, RemoteEndpoint, RxMode, WifiCredentials};
pub use error::{HostError, HostResult};
pub use link::{start_buffered, HostDriver, Link};
pub use reader::ReaderThread;
pub use serial::SerialUart;
