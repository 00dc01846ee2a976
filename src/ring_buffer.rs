//! Fixed-capacity FIFO byte ring buffer (§4.1).
//!
//! Safe for one producer and one consumer (additional concurrent users are
//! supported too, serialized through the single mutex, just not required).
//! `write` never blocks by default — it accepts up to the free space and
//! counts anything beyond that as dropped. Timed variants block until data
//! or space appears, or a deadline passes, whichever comes first.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

struct Inner {
    queue: VecDeque<u8>,
    capacity: usize,
    bytes_dropped: u64,
}

pub struct RingBuffer<const N: usize = 8192> {
    inner: Mutex<Inner>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> RingBuffer<N> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::with_capacity(N),
                capacity: N,
                bytes_dropped: 0,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        N
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity()
    }

    /// Fill level in the `[0.0, 1.0]` range, used by backpressure watermarks.
    pub fn fill_ratio(&self) -> f64 {
        self.len() as f64 / self.capacity().max(1) as f64
    }

    pub fn bytes_dropped(&self) -> u64 {
        self.inner.lock().unwrap().bytes_dropped
    }

    /// Append up to free space; never blocks. Returns bytes accepted.
    /// Anything beyond capacity is counted in `bytes_dropped`, never silently
    /// discarded without record.
    pub fn write(&self, data: &[u8]) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let accepted = Self::push(&mut inner, data);
        if accepted > 0 {
            self.not_empty.notify_all();
        }
        accepted
    }

    /// Like `write`, but blocks until at least one byte of free space exists
    /// or `deadline` passes.
    pub fn write_timed(&self, data: &[u8], deadline: Instant) -> usize {
        let mut inner = self.inner.lock().unwrap();
        while inner.queue.len() >= inner.capacity {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let (guard, timeout_result) =
                self.not_full.wait_timeout(inner, deadline - now).unwrap();
            inner = guard;
            if timeout_result.timed_out() && inner.queue.len() >= inner.capacity {
                break;
            }
        }
        let accepted = Self::push(&mut inner, data);
        if accepted > 0 {
            self.not_empty.notify_all();
        }
        accepted
    }

    /// Drain up to `out.len()` bytes; never blocks. Returns bytes delivered.
    pub fn read(&self, out: &mut [u8]) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let delivered = Self::pop(&mut inner, out);
        if delivered > 0 {
            self.not_full.notify_all();
        }
        delivered
    }

    /// Like `read`, but blocks until at least one byte is available or
    /// `deadline` passes.
    pub fn read_timed(&self, out: &mut [u8], deadline: Instant) -> usize {
        let mut inner = self.inner.lock().unwrap();
        while inner.queue.is_empty() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let (guard, timeout_result) =
                self.not_empty.wait_timeout(inner, deadline - now).unwrap();
            inner = guard;
            if timeout_result.timed_out() && inner.queue.is_empty() {
                break;
            }
        }
        let delivered = Self::pop(&mut inner, out);
        if delivered > 0 {
            self.not_full.notify_all();
        }
        delivered
    }

    /// Wake every waiter without touching the queue; used on shutdown so
    /// blocked readers/writers exit their current iteration promptly.
    pub fn wake_all(&self) {
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    fn push(inner: &mut Inner, data: &[u8]) -> usize {
        let free = inner.capacity.saturating_sub(inner.queue.len());
        let accepted = free.min(data.len());
        inner.queue.extend(&data[..accepted]);
        let dropped = (data.len() - accepted) as u64;
        inner.bytes_dropped += dropped;
        accepted
    }

    fn pop(inner: &mut Inner, out: &mut [u8]) -> usize {
        let delivered = inner.queue.len().min(out.len());
        for slot in out.iter_mut().take(delivered) {
            *slot = inner.queue.pop_front().unwrap();
        }
        delivered
    }
}

/// Convenience: block with a relative timeout rather than an absolute deadline.
impl<const N: usize> RingBuffer<N> {
    pub fn write_wait(&self, data: &[u8], timeout: Duration) -> usize {
        self.write_timed(data, Instant::now() + timeout)
    }

    pub fn read_wait(&self, out: &mut [u8], timeout: Duration) -> usize {
        self.read_timed(out, Instant::now() + timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn write_then_read_preserves_order() {
        let rb: RingBuffer<16> = RingBuffer::new();
        assert_eq!(rb.write(b"hello"), 5);
        let mut out = [0u8; 5];
        assert_eq!(rb.read(&mut out), 5);
        assert_eq!(&out, b"hello");
    }

    #[test]
    fn write_beyond_capacity_drops_the_tail_and_counts_it() {
        let rb: RingBuffer<4> = RingBuffer::new();
        let accepted = rb.write(b"abcdef");
        assert_eq!(accepted, 4);
        assert_eq!(rb.bytes_dropped(), 2);
        let mut out = [0u8; 4];
        rb.read(&mut out);
        assert_eq!(&out, b"abcd");
    }

    #[test]
    fn read_on_empty_buffer_returns_zero_without_blocking() {
        let rb: RingBuffer<8> = RingBuffer::new();
        let mut out = [0u8; 4];
        assert_eq!(rb.read(&mut out), 0);
    }

    #[test]
    fn read_timed_wakes_on_producer_write() {
        let rb: Arc<RingBuffer<8>> = Arc::new(RingBuffer::new());
        let producer = Arc::clone(&rb);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            producer.write(b"hi");
        });
        let mut out = [0u8; 2];
        let delivered = rb.read_wait(&mut out, Duration::from_secs(2));
        handle.join().unwrap();
        assert_eq!(delivered, 2);
        assert_eq!(&out, b"hi");
    }

    #[test]
    fn read_timed_expires_when_nothing_arrives() {
        let rb: RingBuffer<8> = RingBuffer::new();
        let mut out = [0u8; 2];
        let delivered = rb.read_wait(&mut out, Duration::from_millis(20));
        assert_eq!(delivered, 0);
    }

    #[test]
    fn fill_ratio_reflects_occupancy() {
        let rb: RingBuffer<10> = RingBuffer::new();
        rb.write(&[0u8; 5]);
        assert!((rb.fill_ratio() - 0.5).abs() < 1e-9);
    }
}
