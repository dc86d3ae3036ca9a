//! # Receive Ring Buffer
//!
//! This module provides the lock-free, statically-allocated ring buffer that
//! decouples the UART receive interrupt from the polling command engine.
//!
//! ## Design
//!
//! 1. **Static Allocation**: Storage is a fixed array sized at compile time,
//!    so the buffer can live in a `static` shared with the interrupt handler.
//!
//! 2. **Single Producer / Single Consumer**: The RX interrupt is the only
//!    writer of `write_idx`, the polling caller is the only writer of
//!    `read_idx`. Each side reads the other's index only for comparison.
//!
//! 3. **Drop on Full**: A byte arriving while the buffer is full is discarded.
//!    Unread data is never overwritten.
//!
//! ## Memory Layout
//!
//! ```text
//! ┌──────────┬───────────────────────┬───────────────────────────┐
//! │ consumed │    readable data      │         writable          │
//! └──────────┴───────────────────────┴───────────────────────────┘
//!            ▲                       ▲
//!         read_idx               write_idx
//! ```
//!
//! One slot is always left unused so that `write_idx == read_idx` means empty,
//! which makes the usable capacity `N - 1` bytes.

use core::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

/// Default receive buffer size: 1KB holds the longest multi-line reply the
/// AT firmware produces for the commands this driver issues
pub const RX_BUFFER_SIZE: usize = 1024;

#[allow(clippy::declare_interior_mutable_const)]
const EMPTY_SLOT: AtomicU8 = AtomicU8::new(0);

/// Interrupt-fed byte ring buffer
///
/// # Thread Safety
///
/// Every field is atomic, so a shared `&'static RingBuffer` can be handed to
/// both the interrupt handler and the main loop. The index protocol is only
/// correct for one producer calling [`push`](Self::push) and one consumer
/// calling the reading methods.
///
/// # Example
///
/// ```rust
/// use esp8266_at::buffer::RingBuffer;
///
/// static RX: RingBuffer<8> = RingBuffer::new();
///
/// // Producer (interrupt context)
/// for &b in b"OK\r\n" {
///     RX.push(b);
/// }
///
/// // Consumer (polling context)
/// let mut line = [0u8; 8];
/// let n = RX.drain_into(&mut line);
/// assert_eq!(&line[..n], b"OK\r\n");
/// ```
pub struct RingBuffer<const N: usize = RX_BUFFER_SIZE> {
    /// Byte storage, one atomic cell per slot
    data: [AtomicU8; N],

    /// Write index (where the producer stores next)
    write_idx: AtomicUsize,

    /// Read index (where the consumer loads next)
    read_idx: AtomicUsize,
}

impl<const N: usize> RingBuffer<N> {
    /// Create a new empty buffer
    pub const fn new() -> Self {
        assert!(N >= 2, "ring buffer needs at least two slots");
        Self {
            data: [EMPTY_SLOT; N],
            write_idx: AtomicUsize::new(0),
            read_idx: AtomicUsize::new(0),
        }
    }

    /// Number of slots, including the one that is never filled
    #[inline]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of bytes waiting to be read
    #[inline]
    pub fn len(&self) -> usize {
        let write = self.write_idx.load(Ordering::Acquire);
        let read = self.read_idx.load(Ordering::Acquire);
        (write + N - read) % N
    }

    /// Check if the buffer is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.write_idx.load(Ordering::Acquire) == self.read_idx.load(Ordering::Acquire)
    }

    /// Check if the next push would be dropped
    #[inline]
    pub fn is_full(&self) -> bool {
        self.len() == N - 1
    }

    /// Store one received byte (producer side)
    ///
    /// Constant time and never blocks, so it is safe to call from the RX
    /// interrupt. When the buffer is full the byte is silently dropped.
    pub fn push(&self, byte: u8) {
        let write = self.write_idx.load(Ordering::Relaxed);
        let next = (write + 1) % N;

        // Acquire pairs with the consumer's Release on read_idx, so the slot
        // has been read before it is reused.
        if next == self.read_idx.load(Ordering::Acquire) {
            return;
        }

        self.data[write].store(byte, Ordering::Relaxed);
        self.write_idx.store(next, Ordering::Release);
    }

    /// Take the oldest byte (consumer side)
    pub fn pop(&self) -> Option<u8> {
        let read = self.read_idx.load(Ordering::Relaxed);
        if read == self.write_idx.load(Ordering::Acquire) {
            return None;
        }

        let byte = self.data[read].load(Ordering::Relaxed);
        self.read_idx.store((read + 1) % N, Ordering::Release);
        Some(byte)
    }

    /// Pop up to `dst.len()` bytes into `dst`
    ///
    /// No terminator is written; the return value is the number of bytes
    /// copied.
    pub fn drain_into(&self, dst: &mut [u8]) -> usize {
        let mut count = 0;
        while count < dst.len() {
            match self.pop() {
                Some(byte) => {
                    dst[count] = byte;
                    count += 1;
                }
                None => break,
            }
        }
        count
    }

    /// Discard everything currently buffered (consumer side)
    ///
    /// Only moves `read_idx`, so it may run while the interrupt is live.
    pub fn discard_pending(&self) {
        let write = self.write_idx.load(Ordering::Acquire);
        self.read_idx.store(write, Ordering::Release);
    }

    /// Reset both indices to zero and zero the storage
    ///
    /// Writes the producer's index too: the RX interrupt must not fire while
    /// this runs.
    pub fn clear(&self) {
        self.write_idx.store(0, Ordering::Release);
        self.read_idx.store(0, Ordering::Release);
        for slot in &self.data {
            slot.store(0, Ordering::Relaxed);
        }
    }
}

impl<const N: usize> core::fmt::Debug for RingBuffer<N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &N)
            .field("len", &self.len())
            .finish()
    }
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}
