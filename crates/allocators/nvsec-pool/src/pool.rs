use log::{debug, trace, warn};
use nvsec_core::AllocationProbe;
use nvsec_core::Placement;
use nvsec_core::util::{Rng, Size};
use rand::Rng as _;
use std::collections::BTreeSet;
use std::ptr::null_mut;
use thiserror::Error;

/// How a [`Pool`] picks the next free chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementStrategy {
    /// Always the lowest free chunk. A reclaimed chunk is handed out again right away.
    FirstFit,
    /// The first free chunk at or after the previous allocation, wrapping around.
    NextFit,
    /// A uniformly random free chunk, seeded for reproducibility.
    Randomized(u64),
}

/// Pool configuration.
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    /// Total pool size. Must be a non-zero multiple of `chunk_size`.
    pub size: Size,
    /// Size of every chunk handed out by the pool
    pub chunk_size: Size,
    /// Chunk selection strategy
    pub strategy: PlacementStrategy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: Size::MB(4),
            chunk_size: Size::KB(4),
            strategy: PlacementStrategy::NextFit,
        }
    }
}

/// Errors that can occur during pool operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Mapping the pool failed
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Every chunk of the pool is in use
    #[error("Pool out of chunks")]
    OutOfChunks,
    /// Pool size is zero, overflows `usize` or is not a multiple of the chunk size
    #[error("Invalid pool config: size {size} with chunk size {chunk_size}")]
    InvalidConfig {
        /// Requested pool size
        size: Size,
        /// Requested chunk size
        chunk_size: Size,
    },
    /// The chunk was not handed out by this pool
    #[error("Chunk at offset 0x{0:x} does not belong to this pool")]
    ForeignChunk(usize),
}

/// A chunk handed out by a [`Pool`].
///
/// Holding a `Chunk` means owning the memory behind it until it is passed back to
/// [`Pool::free`] or [`AllocationProbe::reclaim`]. Chunks are not `Clone`.
#[derive(Debug, PartialEq, Eq)]
pub struct Chunk {
    ptr: *mut u8,
    offset: usize,
    len: usize,
}

unsafe impl Send for Chunk {}

impl Chunk {
    /// Pointer to the first byte of the chunk.
    pub fn ptr(&self) -> *mut u8 {
        self.ptr
    }

    /// Offset from the pool base in bytes.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Chunk length in bytes.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.len
    }
}

impl Placement for Chunk {
    fn offset(&self) -> u64 {
        self.offset as u64
    }
}

/// Memory pool of fixed-size chunks backed by an anonymous mapping.
///
/// Implements [`AllocationProbe`]: every attempt takes one chunk, every reclaimed
/// chunk is zeroed and returned to the free set.
pub struct Pool {
    base: *mut u8,
    len: usize,
    chunk_size: usize,
    strategy: PlacementStrategy,
    free: BTreeSet<usize>,
    cursor: usize,
    rng: Option<Rng>,
}

unsafe impl Send for Pool {}

impl Pool {
    /// Maps a new pool.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for an empty pool, a size that does not fit
    /// into `usize` or is not a multiple of the chunk size, and an I/O error if `mmap` fails.
    pub fn mmap(config: PoolConfig) -> Result<Self, Error> {
        let invalid = Error::InvalidConfig {
            size: config.size,
            chunk_size: config.chunk_size,
        };
        let (Some(len), Some(chunk_size)) =
            (config.size.checked_bytes(), config.chunk_size.checked_bytes())
        else {
            return Err(invalid);
        };
        if len == 0 || chunk_size == 0 || !len.is_multiple_of(chunk_size) {
            return Err(invalid);
        }
        let p = unsafe {
            libc::mmap(
                null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if p == libc::MAP_FAILED {
            return Err(std::io::Error::last_os_error().into());
        }
        let rng = match config.strategy {
            PlacementStrategy::Randomized(seed) => Some(Rng::from_seed(seed)),
            _ => None,
        };
        debug!(
            "Mapped pool of {} at {:p} with {} chunks of {}",
            config.size,
            p,
            len / chunk_size,
            config.chunk_size
        );
        Ok(Pool {
            base: p as *mut u8,
            len,
            chunk_size,
            strategy: config.strategy,
            free: (0..len / chunk_size).collect(),
            cursor: 0,
            rng,
        })
    }

    /// Total number of chunks.
    pub fn chunks(&self) -> usize {
        self.len / self.chunk_size
    }

    /// Number of chunks currently free.
    pub fn free_chunks(&self) -> usize {
        self.free.len()
    }

    /// Pointer to the first byte of the pool.
    pub fn base(&self) -> *mut u8 {
        self.base
    }

    /// Returns an allocated chunk to the pool.
    ///
    /// The chunk is zeroed before it becomes available again.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ForeignChunk`] if the chunk was not handed out by this pool.
    pub fn free(&mut self, chunk: Chunk) -> Result<(), Error> {
        let index = chunk.offset / self.chunk_size;
        if chunk.offset >= self.len
            || chunk.len != self.chunk_size
            || chunk.ptr != unsafe { self.base.add(chunk.offset) }
            || self.free.contains(&index)
        {
            return Err(Error::ForeignChunk(chunk.offset));
        }
        unsafe { std::ptr::write_bytes(chunk.ptr, 0, chunk.len) };
        self.free.insert(index);
        Ok(())
    }

    fn next_index(&mut self) -> Option<usize> {
        match self.strategy {
            PlacementStrategy::FirstFit => self.free.first().copied(),
            PlacementStrategy::NextFit => self
                .free
                .range(self.cursor..)
                .next()
                .or_else(|| self.free.first())
                .copied(),
            PlacementStrategy::Randomized(_) => {
                if self.free.is_empty() {
                    return None;
                }
                let rng = self.rng.as_mut()?;
                let nth = rng.random_range(0..self.free.len());
                self.free.iter().nth(nth).copied()
            }
        }
    }
}

impl AllocationProbe for Pool {
    type Allocation = Chunk;
    type Error = Error;

    fn allocate(&mut self) -> Result<Chunk, Error> {
        let index = self.next_index().ok_or(Error::OutOfChunks)?;
        self.free.remove(&index);
        self.cursor = index + 1;
        let offset = index * self.chunk_size;
        trace!("Pool chunk {} at offset 0x{:x}", index, offset);
        Ok(Chunk {
            ptr: unsafe { self.base.add(offset) },
            offset,
            len: self.chunk_size,
        })
    }

    fn reclaim(&mut self, rejected: Chunk) -> Result<(), Error> {
        self.free(rejected)
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        let r = unsafe { libc::munmap(self.base as *mut libc::c_void, self.len) };
        if r != 0 {
            warn!(
                "munmap({:p}, {}): {}",
                self.base,
                self.len,
                std::io::Error::last_os_error()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nvsec_core::util::PAGE_SIZE;
    use nvsec_core::{PageField, SecureAllocConfig, SecureAllocError, secure_alloc_with};
    use nvsec_core::diagnostics::NoReporter;

    fn pool(size: Size, strategy: PlacementStrategy) -> Result<Pool, Error> {
        Pool::mmap(PoolConfig {
            size,
            chunk_size: Size::KB(4),
            strategy,
        })
    }

    fn quiet(max_attempts: usize) -> SecureAllocConfig {
        SecureAllocConfig::default()
            .with_diagnostics(false)
            .with_max_attempts(max_attempts)
    }

    #[test]
    fn test_next_fit_offsets() -> anyhow::Result<()> {
        let mut pool = pool(Size::KB(16), PlacementStrategy::NextFit)?;
        assert_eq!(pool.chunks(), 4);
        let a = pool.allocate()?;
        let b = pool.allocate()?;
        assert_eq!((a.offset(), b.offset()), (0, PAGE_SIZE));
        pool.free(a)?;
        // cursor continues after b before wrapping
        assert_eq!(pool.allocate()?.offset(), 2 * PAGE_SIZE);
        assert_eq!(pool.allocate()?.offset(), 3 * PAGE_SIZE);
        assert_eq!(pool.allocate()?.offset(), 0);
        assert!(matches!(pool.allocate(), Err(Error::OutOfChunks)));
        Ok(())
    }

    #[test]
    fn test_chunk_memory_is_usable() -> anyhow::Result<()> {
        let mut pool = pool(Size::KB(8), PlacementStrategy::FirstFit)?;
        let chunk = pool.allocate()?;
        unsafe {
            std::ptr::write_bytes(chunk.ptr(), 0xAA, chunk.len());
            assert_eq!(*chunk.ptr().add(chunk.len() - 1), 0xAA);
        }
        let ptr = chunk.ptr();
        pool.free(chunk)?;
        assert_eq!(unsafe { *ptr }, 0, "freed chunks are zeroed");
        Ok(())
    }

    #[test]
    fn test_secure_alloc_next_fit() -> anyhow::Result<()> {
        let mut pool = pool(Size::MB(1), PlacementStrategy::NextFit)?;
        let field = PageField::from_range(150, 160)?;
        let accepted = secure_alloc_with(&mut pool, &field, &quiet(1000), &NoReporter)?;
        // chunk i sits at page i
        assert_eq!(accepted.attempts, 151);
        assert_eq!(accepted.reclaimed, 150);
        assert_eq!(accepted.offset(), 150 * 4096);
        assert_eq!(pool.free_chunks(), pool.chunks() - 1);
        pool.free(accepted.into_inner())?;
        assert_eq!(pool.free_chunks(), pool.chunks());
        Ok(())
    }

    #[test]
    fn test_secure_alloc_first_fit_exhausts() -> anyhow::Result<()> {
        let mut pool = pool(Size::KB(64), PlacementStrategy::FirstFit)?;
        let field = PageField::from_range(1, 2)?;
        let err = secure_alloc_with(&mut pool, &field, &quiet(100), &NoReporter).unwrap_err();
        assert!(matches!(err, SecureAllocError::Exhausted { attempts: 100 }));
        assert_eq!(pool.free_chunks(), pool.chunks(), "rejected chunks must not leak");
        Ok(())
    }

    #[test]
    fn test_secure_alloc_randomized() -> anyhow::Result<()> {
        let mut pool = pool(Size::MB(2), PlacementStrategy::Randomized(0x42))?;
        let field = PageField::random(&mut Rng::from_seed(7), 64)?;
        let mut chunks = vec![];
        for _ in 0..32 {
            let accepted = secure_alloc_with(&mut pool, &field, &quiet(100_000), &NoReporter)?;
            assert!(field.is_secure(accepted.offset()));
            chunks.push(accepted.into_inner());
        }
        assert_eq!(pool.free_chunks(), pool.chunks() - 32);
        for chunk in chunks {
            pool.free(chunk)?;
        }
        assert_eq!(pool.free_chunks(), pool.chunks());
        Ok(())
    }

    #[test]
    fn test_randomized_is_reproducible() -> anyhow::Result<()> {
        let mut a = pool(Size::KB(256), PlacementStrategy::Randomized(3))?;
        let mut b = pool(Size::KB(256), PlacementStrategy::Randomized(3))?;
        for _ in 0..16 {
            assert_eq!(a.allocate()?.offset(), b.allocate()?.offset());
        }
        Ok(())
    }

    #[test]
    fn test_out_of_chunks_is_probe_error() -> anyhow::Result<()> {
        let mut pool = pool(Size::KB(8), PlacementStrategy::NextFit)?;
        let held = [pool.allocate()?, pool.allocate()?];
        let field = PageField::default();
        let err = secure_alloc_with(&mut pool, &field, &quiet(10), &NoReporter).unwrap_err();
        assert!(matches!(err, SecureAllocError::Probe(Error::OutOfChunks)));
        for chunk in held {
            pool.free(chunk)?;
        }
        Ok(())
    }

    #[test]
    fn test_foreign_chunk() -> anyhow::Result<()> {
        let mut a = pool(Size::KB(8), PlacementStrategy::FirstFit)?;
        let mut b = pool(Size::KB(8), PlacementStrategy::FirstFit)?;
        let chunk = a.allocate()?;
        assert!(matches!(b.free(chunk), Err(Error::ForeignChunk(0))));
        Ok(())
    }

    #[test]
    fn test_invalid_config() {
        let err = Pool::mmap(PoolConfig {
            size: Size::KB(10),
            chunk_size: Size::KB(4),
            strategy: PlacementStrategy::FirstFit,
        });
        assert!(matches!(err, Err(Error::InvalidConfig { .. })));
        assert!(pool(Size::B(0), PlacementStrategy::FirstFit).is_err());
    }

    #[test]
    fn test_oversized_config() {
        let err = pool(Size::GB(1 << 40), PlacementStrategy::FirstFit);
        assert!(matches!(err, Err(Error::InvalidConfig { .. })));
        let err = Pool::mmap(PoolConfig {
            size: Size::MB(4),
            chunk_size: Size::MB(usize::MAX),
            strategy: PlacementStrategy::NextFit,
        });
        assert!(matches!(err, Err(Error::InvalidConfig { .. })));
    }
}
