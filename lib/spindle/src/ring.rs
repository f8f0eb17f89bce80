use crate::sync;
use std::cmp::min;
use std::sync::{Mutex, MutexGuard};

/// A bounded circular byte queue with wrap-around read/write positions.
///
/// One byte of the backing storage is permanently reserved so that the full
/// and empty states remain distinguishable by position arithmetic alone. All
/// operations are all-or-nothing: they return the number of bytes actually
/// moved, which is either the requested amount or 0.
///
/// The struct itself carries no synchronization. The receive path wraps it in
/// a mutex whose guard doubles as the "single parser at a time" claim on the
/// session; the send path uses [`SharedRing`].
pub struct RingBuffer {
    buf: Box<[u8]>,
    capacity: usize,
    read_pos: usize,
    write_pos: usize,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> RingBuffer {
        assert!(capacity >= 2, "ring capacity must hold the reserved byte and data");

        RingBuffer {
            buf: vec![0u8; capacity].into_boxed_slice(),
            capacity,
            read_pos: 0,
            write_pos: 0,
        }
    }

    /// The number of readable bytes.
    #[inline]
    pub fn data_size(&self) -> usize {
        if self.write_pos >= self.read_pos {
            self.write_pos - self.read_pos
        } else {
            self.capacity - self.read_pos + self.write_pos
        }
    }

    /// The number of writable bytes.
    #[inline]
    pub fn free_size(&self) -> usize {
        self.capacity - 1 - self.data_size()
    }

    /// Length of the readable region up to the wrap point.
    #[inline]
    pub fn contiguous_read(&self) -> usize {
        if self.write_pos >= self.read_pos {
            self.write_pos - self.read_pos
        } else {
            self.capacity - self.read_pos
        }
    }

    #[inline]
    pub fn clear(&mut self) {
        self.read_pos = 0;
        self.write_pos = 0;
    }

    /// Copies `data` into the ring. Fails (returns 0) unless the whole slice fits.
    pub fn enqueue(&mut self, data: &[u8]) -> usize {
        let size = data.len();

        if size == 0 || self.free_size() < size {
            return 0;
        }

        let first = min(size, self.capacity - self.write_pos);
        self.buf[self.write_pos..self.write_pos + first].copy_from_slice(&data[..first]);

        if size > first {
            self.buf[..size - first].copy_from_slice(&data[first..]);
        }

        self.write_pos = (self.write_pos + size) % self.capacity;
        size
    }

    /// Copies `out.len()` bytes out of the ring and advances the read position.
    /// Fails (returns 0) unless that much data is available.
    pub fn dequeue(&mut self, out: &mut [u8]) -> usize {
        let size = self.peek(out);

        if size > 0 {
            self.read_pos = (self.read_pos + size) % self.capacity;
        }

        size
    }

    /// Copies `out.len()` bytes out of the ring without consuming them.
    /// Fails (returns 0) unless that much data is available.
    pub fn peek(&self, out: &mut [u8]) -> usize {
        let size = out.len();

        if size == 0 || self.data_size() < size {
            return 0;
        }

        let first = min(size, self.capacity - self.read_pos);
        out[..first].copy_from_slice(&self.buf[self.read_pos..self.read_pos + first]);

        if size > first {
            out[first..].copy_from_slice(&self.buf[..size - first]);
        }

        size
    }

    /// Advances the read position past `size` bytes. Fails (returns 0) unless
    /// that much data is available.
    pub fn consume(&mut self, size: usize) -> usize {
        if size == 0 || self.data_size() < size {
            return 0;
        }

        self.read_pos = (self.read_pos + size) % self.capacity;
        size
    }

    /// Advances the write position past `size` bytes after an external writer
    /// filled the region returned by `write_ptrs`. Fails (returns 0) unless
    /// that much space was free.
    pub fn move_write(&mut self, size: usize) -> usize {
        if size == 0 || self.free_size() < size {
            return 0;
        }

        self.write_pos = (self.write_pos + size) % self.capacity;
        size
    }

    /// Up to two contiguous spans covering the entire free region, in write
    /// order, for scatter-gather reads from a socket.
    pub fn write_ptrs(&mut self) -> (&mut [u8], &mut [u8]) {
        if self.write_pos >= self.read_pos {
            let first = if self.read_pos == 0 {
                self.capacity - self.write_pos - 1
            } else {
                self.capacity - self.write_pos
            };
            let second = if self.read_pos == 0 { 0 } else { self.read_pos - 1 };

            let (lo, hi) = self.buf.split_at_mut(self.write_pos);
            (&mut hi[..first], &mut lo[..second])
        } else {
            let first = self.read_pos - self.write_pos - 1;
            let (_, hi) = self.buf.split_at_mut(self.write_pos);
            let (span, rest) = hi.split_at_mut(first);
            (span, &mut rest[..0])
        }
    }

    /// Up to two contiguous spans covering the entire readable region, in
    /// read order, for scatter-gather writes to a socket.
    pub fn read_ptrs(&self) -> (&[u8], &[u8]) {
        if self.write_pos >= self.read_pos {
            (&self.buf[self.read_pos..self.write_pos], &self.buf[..0])
        } else {
            (&self.buf[self.read_pos..], &self.buf[..self.write_pos])
        }
    }
}

/// Multi-producer, single-consumer ring used on the send path. Every mutator
/// goes through one mutex; `send_view` hands out a guard so that the read
/// position, the data size and the read spans are always observed inside a
/// single critical section. Combining the independent getters to reconstruct
/// that view would race with producers.
pub struct SharedRing {
    inner: Mutex<RingBuffer>,
}

impl SharedRing {
    pub fn new(capacity: usize) -> SharedRing {
        SharedRing {
            inner: Mutex::new(RingBuffer::new(capacity)),
        }
    }

    /// Copies `data` into the ring. Fails (returns 0) unless the whole slice fits.
    #[inline]
    pub fn enqueue(&self, data: &[u8]) -> usize {
        sync::lock(&self.inner).enqueue(data)
    }

    #[inline]
    pub fn data_size(&self) -> usize {
        sync::lock(&self.inner).data_size()
    }

    #[inline]
    pub fn clear(&self) {
        sync::lock(&self.inner).clear()
    }

    /// Atomic bulk view over the readable region. The view holds the ring lock
    /// for its whole lifetime; producers block on `enqueue` until it drops.
    #[inline]
    pub fn send_view(&self) -> SendView<'_> {
        SendView {
            guard: sync::lock(&self.inner),
        }
    }
}

/// Consumer-side view of a [`SharedRing`], valid for one critical section.
pub struct SendView<'a> {
    guard: MutexGuard<'a, RingBuffer>,
}

impl<'a> SendView<'a> {
    #[inline]
    pub fn data_size(&self) -> usize {
        self.guard.data_size()
    }

    #[inline]
    pub fn contiguous_read(&self) -> usize {
        self.guard.contiguous_read()
    }

    #[inline]
    pub fn spans(&self) -> (&[u8], &[u8]) {
        self.guard.read_ptrs()
    }

    /// Advances the read position past bytes the consumer has written out.
    #[inline]
    pub fn consume(&mut self, size: usize) -> usize {
        self.guard.consume(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_enqueue_peek_dequeue_roundtrip() {
        let mut ring = RingBuffer::new(16);

        assert_eq!(ring.enqueue(b"hello"), 5);
        assert_eq!(ring.data_size(), 5);

        let mut peeked = [0u8; 5];
        assert_eq!(ring.peek(&mut peeked), 5);
        assert_eq!(&peeked, b"hello");
        assert_eq!(ring.data_size(), 5);

        let mut out = [0u8; 5];
        assert_eq!(ring.dequeue(&mut out), 5);
        assert_eq!(&out, b"hello");
        assert_eq!(ring.data_size(), 0);
    }

    #[test]
    fn test_all_or_nothing() {
        let mut ring = RingBuffer::new(8);

        // Usable capacity is 7; an 8 byte enqueue must fail without a partial write.
        assert_eq!(ring.enqueue(&[1u8; 8]), 0);
        assert_eq!(ring.data_size(), 0);

        assert_eq!(ring.enqueue(&[2u8; 4]), 4);

        let mut out = [0u8; 5];
        assert_eq!(ring.dequeue(&mut out), 0);
        assert_eq!(ring.data_size(), 4);
        assert_eq!(ring.peek(&mut out), 0);
        assert_eq!(ring.consume(5), 0);
        assert_eq!(ring.consume(4), 4);
    }

    #[test]
    fn test_exactly_full_and_exactly_empty() {
        let mut ring = RingBuffer::new(8);

        assert_eq!(ring.enqueue(&[9u8; 7]), 7);
        assert_eq!(ring.free_size(), 0);
        assert_eq!(ring.data_size(), 7);
        assert_eq!(ring.enqueue(&[9u8; 1]), 0);

        assert_eq!(ring.consume(7), 7);
        assert_eq!(ring.free_size(), 7);
        assert_eq!(ring.data_size(), 0);
    }

    #[test]
    fn test_wrap_around() {
        let mut ring = RingBuffer::new(8);

        assert_eq!(ring.enqueue(&[1, 2, 3, 4, 5, 6]), 6);
        let mut out = [0u8; 4];
        assert_eq!(ring.dequeue(&mut out), 4);

        // Write position wraps past the end of the backing storage.
        assert_eq!(ring.enqueue(&[7, 8, 9, 10]), 4);
        assert_eq!(ring.data_size(), 6);

        let mut all = [0u8; 6];
        assert_eq!(ring.dequeue(&mut all), 6);
        assert_eq!(&all, &[5, 6, 7, 8, 9, 10]);
    }

    #[test]
    fn test_write_ptrs_cover_free_region() {
        let mut ring = RingBuffer::new(8);

        assert_eq!(ring.enqueue(&[1, 2, 3, 4, 5]), 5);
        assert_eq!(ring.consume(3), 3);

        let free = ring.free_size();
        let (first, second) = ring.write_ptrs();
        assert_eq!(first.len() + second.len(), free);

        // Fill both spans externally, then publish the bytes.
        for b in first.iter_mut().chain(second.iter_mut()) {
            *b = 42;
        }
        assert_eq!(ring.move_write(free), free);
        assert_eq!(ring.free_size(), 0);

        let mut out = [0u8; 2];
        assert_eq!(ring.dequeue(&mut out), 2);
        assert_eq!(&out, &[4, 5]);

        let mut rest = vec![0u8; free];
        assert_eq!(ring.dequeue(&mut rest), free);
        assert!(rest.iter().all(|&b| b == 42));
    }

    #[test]
    fn test_read_ptrs_cover_data_region() {
        let mut ring = RingBuffer::new(8);

        assert_eq!(ring.enqueue(&[1, 2, 3, 4, 5, 6]), 6);
        assert_eq!(ring.consume(5), 5);
        assert_eq!(ring.enqueue(&[7, 8, 9]), 3);

        let (first, second) = ring.read_ptrs();
        assert_eq!(first, &[6, 7, 8][..]);
        assert_eq!(second, &[9][..]);
        assert_eq!(first.len(), ring.contiguous_read());
    }

    #[test]
    fn test_move_write_respects_free_space() {
        let mut ring = RingBuffer::new(8);

        assert_eq!(ring.move_write(7), 7);
        assert_eq!(ring.move_write(1), 0);
        assert_eq!(ring.data_size(), 7);
    }

    #[test]
    fn test_clear_resets_positions() {
        let mut ring = RingBuffer::new(8);

        ring.enqueue(&[1, 2, 3]);
        ring.clear();

        assert_eq!(ring.data_size(), 0);
        assert_eq!(ring.free_size(), 7);
    }

    #[test]
    fn test_send_view_consume() {
        let ring = SharedRing::new(16);

        assert_eq!(ring.enqueue(b"abcdef"), 6);

        let mut view = ring.send_view();
        assert_eq!(view.data_size(), 6);
        assert_eq!(view.contiguous_read(), 6);
        {
            let (first, second) = view.spans();
            assert_eq!(first, b"abcdef");
            assert!(second.is_empty());
        }
        assert_eq!(view.consume(4), 4);
        assert_eq!(view.data_size(), 2);
        drop(view);

        assert_eq!(ring.data_size(), 2);
    }

    #[test]
    fn test_shared_ring_concurrent_producers() {
        let ring = Arc::new(SharedRing::new(4096));
        let mut handles = Vec::new();

        for worker in 0..4u8 {
            let ring = ring.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    assert_eq!(ring.enqueue(&[worker; 8]), 8);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        // Every enqueue is all-or-nothing, so the total must be exact and each
        // 8 byte chunk must be uniform.
        assert_eq!(ring.data_size(), 4 * 100 * 8);

        let mut view = ring.send_view();
        let mut drained = Vec::new();
        {
            let (first, second) = view.spans();
            drained.extend_from_slice(first);
            drained.extend_from_slice(second);
        }
        let total = drained.len();
        assert_eq!(view.consume(total), total);

        for chunk in drained.chunks(8) {
            assert!(chunk.iter().all(|&b| b == chunk[0]));
        }
    }
}
