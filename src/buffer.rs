//! Owned byte buffers and pluggable allocation strategies.
//!
//! Every connection actor owns one read [`Buffer`]. Buffers are obtained from
//! a [`BufferAllocator`]; the [`PooledAllocator`] recycles released buffers
//! across connections through a lock-free queue, while the [`HeapAllocator`]
//! allocates on demand and frees on release.
//!
//! Releasing is tied to ownership: [`Buffer::release`] consumes the buffer
//! and dropping a buffer releases it, so a buffer can neither be used after
//! release nor returned to its pool twice.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use bytes::{Bytes, BytesMut};
use crossbeam::queue::ArrayQueue;

/// Default size in bytes of buffers handed out by the allocators.
pub const DEFAULT_BUFFER_SIZE: usize = 8 * 1024;

/// Default number of idle buffers retained by a [`PooledAllocator`].
pub const DEFAULT_POOL_CAPACITY: usize = 256;

/// Capability for obtaining [`Buffer`]s.
///
/// Implementations must be safe to share between connection tasks running on
/// different workers.
pub trait BufferAllocator: Send + Sync + 'static {
    /// Obtain a buffer with at least `capacity` bytes of spare capacity.
    fn allocate(&self, capacity: usize) -> Buffer;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

/// Selects a [`BufferAllocator`] implementation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AllocatorKind {
    /// Recycle released buffers through a shared pool.
    #[default]
    Pooled,
    /// Allocate a fresh heap buffer for every request.
    OnDemand,
}

impl AllocatorKind {
    /// Build the allocator described by this kind.
    ///
    /// `pool_capacity` bounds the number of idle buffers a pooled allocator
    /// keeps; it is ignored for [`AllocatorKind::OnDemand`].
    ///
    /// # Examples
    ///
    /// ```
    /// use framechain::buffer::AllocatorKind;
    ///
    /// let allocator = AllocatorKind::Pooled.build(4096, 8);
    /// assert_eq!(allocator.name(), "pooled");
    /// ```
    #[must_use]
    pub fn build(self, buffer_size: usize, pool_capacity: usize) -> Arc<dyn BufferAllocator> {
        match self {
            Self::Pooled => Arc::new(PooledAllocator::new(buffer_size, pool_capacity)),
            Self::OnDemand => Arc::new(HeapAllocator),
        }
    }
}

/// An owned, growable byte region.
///
/// Mutable access goes through [`Buffer::bytes_mut`].
pub struct Buffer {
    bytes: BytesMut,
    home: Option<Arc<Pool>>,
}

impl Buffer {
    /// Create a buffer that is freed on release.
    #[must_use]
    pub fn unpooled(capacity: usize) -> Self {
        Self {
            bytes: BytesMut::with_capacity(capacity),
            home: None,
        }
    }

    /// Number of filled bytes.
    #[must_use]
    pub fn len(&self) -> usize { self.bytes.len() }

    /// Returns `true` when no bytes are filled.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.bytes.is_empty() }

    /// Total capacity of the underlying storage.
    #[must_use]
    pub fn capacity(&self) -> usize { self.bytes.capacity() }

    /// Returns `true` if releasing this buffer returns it to a pool.
    #[must_use]
    pub fn is_pooled(&self) -> bool { self.home.is_some() }

    /// Mutable access to the underlying storage.
    pub fn bytes_mut(&mut self) -> &mut BytesMut { &mut self.bytes }

    /// Ensure at least `additional` bytes of spare capacity.
    pub fn reserve(&mut self, additional: usize) { self.bytes.reserve(additional); }

    /// Detach the filled bytes as an immutable [`Bytes`] value.
    ///
    /// The buffer keeps its remaining spare capacity and can be filled again.
    ///
    /// # Examples
    ///
    /// ```
    /// use framechain::buffer::Buffer;
    ///
    /// let mut buffer = Buffer::unpooled(16);
    /// buffer.bytes_mut().extend_from_slice(b"abc");
    /// assert_eq!(&buffer.split_filled()[..], b"abc");
    /// assert!(buffer.is_empty());
    /// ```
    pub fn split_filled(&mut self) -> Bytes { self.bytes.split().freeze() }

    /// Return the buffer to its pool, or free it.
    pub fn release(self) { drop(self); }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(pool) = self.home.take() {
            pool.recycle(std::mem::take(&mut self.bytes));
        }
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("len", &self.bytes.len())
            .field("capacity", &self.bytes.capacity())
            .field("pooled", &self.home.is_some())
            .finish()
    }
}

/// Allocator that creates a fresh heap buffer for every request.
#[derive(Clone, Copy, Debug, Default)]
pub struct HeapAllocator;

impl BufferAllocator for HeapAllocator {
    fn allocate(&self, capacity: usize) -> Buffer { Buffer::unpooled(capacity) }

    fn name(&self) -> &'static str { "on-demand" }
}

struct Pool {
    idle: ArrayQueue<BytesMut>,
    buffer_size: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Pool {
    fn recycle(&self, mut bytes: BytesMut) {
        bytes.clear();
        // Buffers that lost capacity to `split_filled` are not worth keeping.
        if bytes.capacity() < self.buffer_size {
            return;
        }
        // A full pool simply drops the surplus buffer.
        let _ = self.idle.push(bytes);
    }
}

/// Allocator recycling released buffers across connections.
///
/// Borrowing and returning are lock-free and safe from any number of workers.
#[derive(Clone)]
pub struct PooledAllocator {
    pool: Arc<Pool>,
}

impl PooledAllocator {
    /// Create a pool handing out buffers of `buffer_size` bytes and keeping at
    /// most `pool_capacity` idle buffers.
    #[must_use]
    pub fn new(buffer_size: usize, pool_capacity: usize) -> Self {
        Self {
            pool: Arc::new(Pool {
                idle: ArrayQueue::new(pool_capacity.max(1)),
                buffer_size: buffer_size.max(1),
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
            }),
        }
    }

    /// Number of idle buffers currently held by the pool.
    #[must_use]
    pub fn idle(&self) -> usize { self.pool.idle.len() }

    /// Number of allocations served from the pool.
    #[must_use]
    pub fn hits(&self) -> u64 { self.pool.hits.load(Ordering::Relaxed) }

    /// Number of allocations that had to create a new buffer.
    #[must_use]
    pub fn misses(&self) -> u64 { self.pool.misses.load(Ordering::Relaxed) }
}

impl fmt::Debug for PooledAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledAllocator")
            .field("buffer_size", &self.pool.buffer_size)
            .field("idle", &self.idle())
            .field("hits", &self.hits())
            .field("misses", &self.misses())
            .finish()
    }
}

impl BufferAllocator for PooledAllocator {
    fn allocate(&self, capacity: usize) -> Buffer {
        let bytes = if let Some(mut bytes) = self.pool.idle.pop() {
            self.pool.hits.fetch_add(1, Ordering::Relaxed);
            bytes.reserve(capacity);
            bytes
        } else {
            self.pool.misses.fetch_add(1, Ordering::Relaxed);
            BytesMut::with_capacity(capacity.max(self.pool.buffer_size))
        };
        Buffer {
            bytes,
            home: Some(Arc::clone(&self.pool)),
        }
    }

    fn name(&self) -> &'static str { "pooled" }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use rstest::rstest;

    use super::*;

    #[test]
    fn released_buffer_is_reused() {
        let allocator = PooledAllocator::new(64, 4);
        let buffer = allocator.allocate(64);
        assert!(buffer.is_pooled());
        buffer.release();
        assert_eq!(allocator.idle(), 1);

        let again = allocator.allocate(32);
        assert_eq!(allocator.hits(), 1);
        assert_eq!(allocator.misses(), 1);
        assert!(again.capacity() >= 64);
    }

    #[test]
    fn recycled_buffers_come_back_empty() {
        let allocator = PooledAllocator::new(16, 2);
        let mut buffer = allocator.allocate(16);
        buffer.bytes_mut().extend_from_slice(b"stale");
        drop(buffer);

        let buffer = allocator.allocate(16);
        assert!(buffer.is_empty());
    }

    #[test]
    fn shrunken_buffer_is_discarded() {
        let allocator = PooledAllocator::new(16, 2);
        let mut buffer = allocator.allocate(16);
        buffer.bytes_mut().extend_from_slice(&[7; 16]);
        let filled = buffer.split_filled();
        assert_eq!(filled.len(), 16);
        buffer.release();
        assert_eq!(allocator.idle(), 0);
    }

    #[test]
    fn full_pool_drops_surplus() {
        let allocator = PooledAllocator::new(8, 1);
        let first = allocator.allocate(8);
        let second = allocator.allocate(8);
        first.release();
        second.release();
        assert_eq!(allocator.idle(), 1);
    }

    #[test]
    fn concurrent_borrow_and_return() {
        let allocator = PooledAllocator::new(32, 8);
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let allocator = allocator.clone();
                thread::spawn(move || {
                    for i in 0..500_u32 {
                        let mut buffer = allocator.allocate(32);
                        buffer.bytes_mut().extend_from_slice(&i.to_le_bytes());
                        assert_eq!(buffer.len(), 4);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().expect("worker panicked");
        }
        assert_eq!(allocator.hits() + allocator.misses(), 2000);
        assert!(allocator.idle() <= 8);
    }

    #[rstest]
    #[case(AllocatorKind::Pooled, "pooled", true)]
    #[case(AllocatorKind::OnDemand, "on-demand", false)]
    fn kind_builds_matching_allocator(
        #[case] kind: AllocatorKind,
        #[case] name: &str,
        #[case] pooled: bool,
    ) {
        let allocator = kind.build(128, 4);
        assert_eq!(allocator.name(), name);
        let buffer = allocator.allocate(128);
        assert_eq!(buffer.is_pooled(), pooled);
        assert!(buffer.capacity() >= 128);
    }
}
