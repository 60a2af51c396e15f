use crate::alloc::{Bitmap, State};
use crate::geometry::Geometry;

use log::{debug, warn};
use thiserror::Error;

/// Index of a user block, from 0 to `total_blocks() - 1`.
pub type BlockId = usize;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
    #[error("invalid block id: {0}")]
    InvalidBlockId(BlockId),
    #[error("block already allocated: {0}")]
    BlockAlreadyAllocated(BlockId),
    #[error("out of space: no free blocks available")]
    OutOfSpace,
    #[error("buffer too small: need {expected} bytes, got {actual}")]
    BufferTooSmall { expected: usize, actual: usize },
    #[error("invalid store image: {0}")]
    InvalidImage(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// A fixed number of fixed-size blocks plus a bitmap recording which of them are in
/// use.
///
/// The last slot of the geometry backs the bitmap itself. Its bit is set for the
/// whole life of the store and it is never addressable, so callers see
/// `block_count - 1` blocks numbered from 0.
///
/// Reads and writes do not look at occupancy. Like a raw device, any valid block can
/// be read or written whether or not it has been allocated; callers that want
/// exclusivity allocate or request the block first.
#[derive(Debug, Clone)]
pub struct BlockStore {
    geometry: Geometry,
    /// One buffer per user block, all `geometry.block_size()` bytes.
    blocks: Vec<Box<[u8]>>,
    /// Bit `i` is set iff block `i` is in use. Sized to the full geometry so the
    /// reserved slot has a bit of its own.
    occupancy: Bitmap,
}

impl Default for BlockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockStore {
    /// Creates a store with the default geometry: 255 usable 256 byte blocks.
    pub fn new() -> Self {
        Self::with_geometry(Geometry::default())
    }

    /// Creates a store with every user block free and zero filled.
    pub fn with_geometry(geometry: Geometry) -> Self {
        let blocks = (0..geometry.user_blocks())
            .map(|_| vec![0; geometry.block_size()].into_boxed_slice())
            .collect();
        // Geometry guarantees at least two blocks.
        let mut occupancy = Bitmap::zeroed(geometry.block_count());
        occupancy.set(geometry.reserved_block());

        Self {
            geometry,
            blocks,
            occupancy,
        }
    }

    /// Reassembles a store from parts read off an image. The reserved bit is forced
    /// on whatever the image said.
    pub(crate) fn from_parts(
        geometry: Geometry,
        blocks: Vec<Box<[u8]>>,
        mut occupancy: Bitmap,
    ) -> Self {
        debug_assert_eq!(blocks.len(), geometry.user_blocks());
        debug_assert_eq!(occupancy.bit_count(), geometry.block_count());
        occupancy.set(geometry.reserved_block());
        Self {
            geometry,
            blocks,
            occupancy,
        }
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub(crate) fn blocks(&self) -> &[Box<[u8]>] {
        &self.blocks
    }

    pub(crate) fn occupancy(&self) -> &Bitmap {
        &self.occupancy
    }

    /// Marks the lowest numbered free block as used and returns it.
    pub fn allocate(&mut self) -> Result<BlockId> {
        // The reserved bit is always set, so ffz only ever lands on a user block.
        let id = self.occupancy.ffz().ok_or(StoreError::OutOfSpace)?;
        self.occupancy.set(id);
        debug!("allocated block {}", id);
        Ok(id)
    }

    /// Marks a specific block as used. Fails without changing anything if the block
    /// is out of range or already in use.
    pub fn request(&mut self, id: BlockId) -> Result<()> {
        if let Err(e) = self.check_id(id) {
            warn!("request for block {} rejected, invalid id", id);
            return Err(e);
        }
        if self.occupancy.test(id) {
            warn!("request for block {} rejected, already allocated", id);
            return Err(StoreError::BlockAlreadyAllocated(id));
        }
        self.occupancy.set(id);
        debug!("requested block {}", id);
        Ok(())
    }

    /// Marks a block as free. Releasing a free block does nothing, and so does
    /// releasing an id outside the user range.
    pub fn release(&mut self, id: BlockId) {
        if self.check_id(id).is_err() {
            warn!("ignoring release of invalid block {}", id);
            return;
        }
        self.occupancy.reset(id);
        debug!("released block {}", id);
    }

    /// Returns true if `id` is a user block that is currently in use.
    pub fn is_allocated(&self, id: BlockId) -> bool {
        self.check_id(id).is_ok() && self.occupancy.get(id) == State::Used
    }

    /// Iterates over the ids of blocks in use, lowest first.
    pub fn allocated(&self) -> impl Iterator<Item = BlockId> + '_ {
        let reserved = self.geometry.reserved_block();
        self.occupancy.iter_set().filter(move |&id| id != reserved)
    }

    /// Blocks currently in use, not counting the reserved bitmap block.
    pub fn used_blocks(&self) -> usize {
        self.occupancy.total_set() - 1
    }

    pub fn free_blocks(&self) -> usize {
        self.total_blocks() - self.used_blocks()
    }

    /// Blocks available to callers. Constant for a given geometry.
    pub fn total_blocks(&self) -> usize {
        self.geometry.user_blocks()
    }

    /// Copies block `id` into the front of `buf` and returns the number of bytes
    /// copied, which is always one block.
    pub fn read(&self, id: BlockId, buf: &mut [u8]) -> Result<usize> {
        let block = self.block(id)?;
        let dest = Self::fit(buf.len(), block.len())?;
        buf[..dest].copy_from_slice(block);
        Ok(dest)
    }

    /// Copies one block's worth of bytes from the front of `buf` into block `id` and
    /// returns the number of bytes copied.
    pub fn write(&mut self, id: BlockId, buf: &[u8]) -> Result<usize> {
        let block = self.block_mut(id)?;
        let src = Self::fit(buf.len(), block.len())?;
        block.copy_from_slice(&buf[..src]);
        Ok(src)
    }

    fn check_id(&self, id: BlockId) -> Result<()> {
        if id >= self.geometry.user_blocks() {
            return Err(StoreError::InvalidBlockId(id));
        }
        Ok(())
    }

    fn block(&self, id: BlockId) -> Result<&[u8]> {
        self.blocks
            .get(id)
            .map(|b| &b[..])
            .ok_or(StoreError::InvalidBlockId(id))
    }

    fn block_mut(&mut self, id: BlockId) -> Result<&mut [u8]> {
        self.blocks
            .get_mut(id)
            .map(|b| &mut b[..])
            .ok_or(StoreError::InvalidBlockId(id))
    }

    fn fit(actual: usize, expected: usize) -> Result<usize> {
        if actual < expected {
            return Err(StoreError::BufferTooSmall { expected, actual });
        }
        Ok(expected)
    }
}
