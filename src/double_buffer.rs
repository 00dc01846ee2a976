//! Enhanced double buffer (§3, §4.5.5).
//!
//! Two equal-sized halves: producers append to `sub`, the consumer drains
//! `main`. `switch_buffers` atomically exchanges the two roles. Watermarks
//! are expressed as a percentage of the *combined* capacity (`2 * half_size`)
//! and drive the backpressure hysteresis in `crate::pipeline::backpressure`.
//!
//! Dynamic resize is a SHOULD per the open-question decision recorded in
//! DESIGN.md: it is implemented and tested, but nothing in the CORE depends
//! on a resize having actually happened.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub const CRITICAL_WATERMARK: f64 = 0.95;
pub const HIGH_WATERMARK: f64 = 0.80;
pub const LOW_WATERMARK: f64 = 0.20;
pub const EMPTY_WATERMARK: f64 = 0.05;

const RESIZE_CHECK_INTERVAL: Duration = Duration::from_secs(30);

struct State {
    main: VecDeque<u8>,
    sub: VecDeque<u8>,
    half_size: usize,
    consecutive_overflows: u32,
    last_resize_check: Instant,
}

pub struct EnhancedDoubleBuffer {
    inner: Mutex<State>,
    min_size: usize,
    max_size: usize,
    growth_step: usize,
    shrink_step: usize,
}

/// Clock-free constructor helper: callers that can't call `Instant::now()`
/// (none in this crate, but kept symmetrical with the rest of the CORE)
/// should prefer `EnhancedDoubleBuffer::new`.
impl EnhancedDoubleBuffer {
    pub fn new(initial_size: usize, min_size: usize, max_size: usize) -> Self {
        Self::with_steps(initial_size, min_size, max_size, 1024, 512)
    }

    pub fn with_steps(
        initial_size: usize,
        min_size: usize,
        max_size: usize,
        growth_step: usize,
        shrink_step: usize,
    ) -> Self {
        Self {
            inner: Mutex::new(State {
                main: VecDeque::with_capacity(initial_size),
                sub: VecDeque::with_capacity(initial_size),
                half_size: initial_size,
                consecutive_overflows: 0,
                last_resize_check: Instant::now(),
            }),
            min_size,
            max_size,
            growth_step,
            shrink_step,
        }
    }

    pub fn half_size(&self) -> usize {
        self.inner.lock().unwrap().half_size
    }

    /// Append to `sub`, capped at `half_size`. Bytes beyond that are dropped
    /// and counted as an overflow (consecutive overflows drive growth).
    pub fn write(&self, data: &[u8]) -> usize {
        let mut st = self.inner.lock().unwrap();
        let free = st.half_size.saturating_sub(st.sub.len());
        let accepted = free.min(data.len());
        st.sub.extend(&data[..accepted]);
        if accepted < data.len() {
            st.consecutive_overflows = st.consecutive_overflows.saturating_add(1);
        } else {
            st.consecutive_overflows = 0;
        }
        accepted
    }

    /// Drain up to `out.len()` bytes from `main`.
    pub fn read(&self, out: &mut [u8]) -> usize {
        let mut st = self.inner.lock().unwrap();
        let delivered = st.main.len().min(out.len());
        for slot in out.iter_mut().take(delivered) {
            *slot = st.main.pop_front().unwrap();
        }
        delivered
    }

    pub fn main_len(&self) -> usize {
        self.inner.lock().unwrap().main.len()
    }

    pub fn sub_len(&self) -> usize {
        self.inner.lock().unwrap().sub.len()
    }

    /// Exchange `main` and `sub`. Any bytes still unread in `main` are
    /// prepended onto the data moving into the new `main` slot so that the
    /// consumer always sees a contiguous, in-order stream and the producer
    /// is handed a genuinely empty target, per the buffer's invariant.
    pub fn switch_buffers(&self) {
        let mut st = self.inner.lock().unwrap();
        if !st.main.is_empty() {
            let leftover = std::mem::take(&mut st.main);
            let mut combined = leftover;
            combined.append(&mut st.sub);
            st.sub = combined;
        }
        std::mem::swap(&mut st.main, &mut st.sub);
    }

    /// Combined fill ratio across both halves, against `2 * half_size`.
    pub fn fill_ratio(&self) -> f64 {
        let st = self.inner.lock().unwrap();
        let capacity = (2 * st.half_size).max(1) as f64;
        (st.main.len() + st.sub.len()) as f64 / capacity
    }

    /// Apply the growth/shrink rule if at least `RESIZE_CHECK_INTERVAL` has
    /// elapsed since the last check. `now` is supplied by the caller so the
    /// buffer itself never calls `Instant::now()`.
    pub fn maybe_resize(&self, now: Instant) -> Option<(usize, usize)> {
        let mut st = self.inner.lock().unwrap();
        if now.duration_since(st.last_resize_check) < RESIZE_CHECK_INTERVAL {
            return None;
        }
        st.last_resize_check = now;

        let capacity = (2 * st.half_size).max(1) as f64;
        let fill = (st.main.len() + st.sub.len()) as f64 / capacity;
        let before = st.half_size;

        if (fill > 0.85 || st.consecutive_overflows >= 3) && st.half_size < self.max_size {
            st.half_size = (st.half_size + self.growth_step).min(self.max_size);
        } else if fill < 0.15 && st.half_size > self.min_size {
            let shrunk = st.half_size.saturating_sub(self.shrink_step).max(self.min_size);
            // Never shrink below what's already buffered — truncate only the
            // slack, never in-flight data.
            let in_flight = st.main.len().max(st.sub.len());
            st.half_size = shrunk.max(in_flight);
        }

        if st.half_size == before {
            None
        } else {
            Some((before, st.half_size))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switch_buffers_preserves_order_and_empties_producer_side() {
        let buf = EnhancedDoubleBuffer::new(16, 4, 64);
        buf.write(b"abc");
        buf.switch_buffers();
        assert_eq!(buf.main_len(), 3);
        assert_eq!(buf.sub_len(), 0);
        let mut out = [0u8; 3];
        assert_eq!(buf.read(&mut out), 3);
        assert_eq!(&out, b"abc");
    }

    #[test]
    fn switch_with_unread_main_keeps_fifo_order() {
        let buf = EnhancedDoubleBuffer::new(16, 4, 64);
        buf.write(b"first");
        buf.switch_buffers(); // main = "first", sub = ""
        buf.write(b"second"); // sub = "second"
        buf.switch_buffers(); // leftover "first" unread in main gets merged ahead of "second"
        let mut out = [0u8; 11];
        let n = buf.read(&mut out);
        assert_eq!(n, 11);
        assert_eq!(&out, b"firstsecond");
    }

    #[test]
    fn write_beyond_half_size_is_capped_and_counted() {
        let buf = EnhancedDoubleBuffer::new(4, 2, 16);
        let accepted = buf.write(b"abcdef");
        assert_eq!(accepted, 4);
    }

    #[test]
    fn fill_ratio_is_relative_to_combined_capacity() {
        let buf = EnhancedDoubleBuffer::new(10, 2, 64);
        buf.write(&[0u8; 10]);
        // sub full (10), main empty (0) out of combined capacity 20 => 0.5
        assert!((buf.fill_ratio() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn grows_under_sustained_overflow() {
        let buf = EnhancedDoubleBuffer::new(4, 2, 64);
        let mut now = Instant::now();
        buf.write(b"abcdefgh"); // overflow #1
        buf.write(b"abcdefgh"); // overflow #2
        buf.write(b"abcdefgh"); // overflow #3
        now += Duration::from_secs(31);
        let resized = buf.maybe_resize(now);
        assert!(resized.is_some());
        assert!(buf.half_size() > 4);
    }

    #[test]
    fn shrinks_when_mostly_idle() {
        let buf = EnhancedDoubleBuffer::with_steps(2000, 512, 4000, 100, 100);
        let mut now = Instant::now();
        now += Duration::from_secs(31);
        let resized = buf.maybe_resize(now);
        assert!(resized.is_some());
        assert!(buf.half_size() < 2000);
        assert!(buf.half_size() >= 512);
    }

    #[test]
    fn does_not_resize_before_the_check_interval_elapses() {
        let buf = EnhancedDoubleBuffer::new(4, 2, 64);
        buf.write(b"abcdefgh");
        buf.write(b"abcdefgh");
        buf.write(b"abcdefgh");
        let resized = buf.maybe_resize(Instant::now());
        assert!(resized.is_none());
    }
}
