use crate::sb::IMAGE_HEADER_LEN;
use crate::store::{Result, StoreError};

/// Bytes per block in the default geometry.
pub const BLOCK_SIZE: usize = 256;
/// Blocks in the default geometry, including the one reserved for the bitmap.
pub const BLOCK_COUNT: usize = 256;

/// Shape of a block store: how many blocks it holds and how large each one is.
///
/// The last block is reserved for the occupancy bitmap, so a geometry of `n` blocks
/// exposes `n - 1` blocks to callers. A `Geometry` can only be obtained through
/// [`Geometry::default`] or [`GeometryBuilder::build`], both of which guarantee:
///
/// * at least one user block besides the reserved one,
/// * a block large enough to hold the image header,
/// * a block large enough to hold the whole bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    block_size: usize,
    block_count: usize,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            block_size: BLOCK_SIZE,
            block_count: BLOCK_COUNT,
        }
    }
}

impl Geometry {
    pub fn builder() -> GeometryBuilder {
        GeometryBuilder::default()
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Total blocks, reserved one included.
    pub fn block_count(&self) -> usize {
        self.block_count
    }

    /// Blocks addressable by callers.
    pub fn user_blocks(&self) -> usize {
        self.block_count - 1
    }

    /// Index of the slot backing the bitmap.
    pub fn reserved_block(&self) -> usize {
        self.block_count - 1
    }

    /// Bytes taken by the encoded bitmap.
    pub fn bitmap_len(&self) -> usize {
        (self.block_count + 7) / 8
    }

    /// Size in bytes of a serialized image: one header block followed by every slot.
    pub fn image_len(&self) -> usize {
        (self.block_count + 1) * self.block_size
    }

    fn validate(self) -> Result<Self> {
        if self.block_count < 2 {
            return Err(StoreError::InvalidGeometry(format!(
                "block count must be at least 2, got {}",
                self.block_count
            )));
        }
        // The image header stores both values as u32.
        if u32::try_from(self.block_size).is_err() || u32::try_from(self.block_count).is_err() {
            return Err(StoreError::InvalidGeometry(
                "geometry exceeds the image format limits".to_string(),
            ));
        }
        if self.block_size < IMAGE_HEADER_LEN {
            return Err(StoreError::InvalidGeometry(format!(
                "block size must be at least {} bytes, got {}",
                IMAGE_HEADER_LEN, self.block_size
            )));
        }
        if self.bitmap_len() > self.block_size {
            return Err(StoreError::InvalidGeometry(format!(
                "a bitmap of {} blocks does not fit in a {} byte block",
                self.block_count, self.block_size
            )));
        }
        Ok(self)
    }
}

/// Builds a validated [`Geometry`], starting from the defaults.
#[derive(Debug, Clone)]
pub struct GeometryBuilder {
    block_size: usize,
    block_count: usize,
}

impl Default for GeometryBuilder {
    fn default() -> Self {
        Self {
            block_size: BLOCK_SIZE,
            block_count: BLOCK_COUNT,
        }
    }
}

impl GeometryBuilder {
    /// Sets the size of every block in bytes.
    pub fn with_block_size(mut self, bytes: usize) -> Self {
        self.block_size = bytes;
        self
    }

    /// Sets the total number of blocks, including the reserved bitmap block.
    pub fn with_block_count(mut self, blocks: usize) -> Self {
        self.block_count = blocks;
        self
    }

    pub fn build(self) -> Result<Geometry> {
        Geometry {
            block_size: self.block_size,
            block_count: self.block_count,
        }
        .validate()
    }
}
