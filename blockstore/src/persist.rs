//! Saving a store to, and loading it from, block devices and image files.
//!
//! # Layout
//!
//! An image is `block_count + 1` device blocks of `block_size` bytes:
//!
//! ```text
//! =====================================================================
//! | ImageHeader | user block 0 | ... | user block n - 2 | Bitmap      |
//! =====================================================================
//!   device 0      device 1             device n - 1       device n
//! ```
//!
//! The header and bitmap blocks are zero padded. The bitmap lands in the device block
//! matching the reserved slot, so the image mirrors the in-memory arrangement.
use std::fs::{File, OpenOptions};
use std::io::Read;
use std::path::Path;

use log::debug;

use crate::alloc::Bitmap;
use crate::geometry::Geometry;
use crate::io::{BlockStorage, FileBlockEmulator, FileBlockEmulatorBuilder};
use crate::sb::{ImageHeader, IMAGE_HEADER_LEN};
use crate::store::{BlockStore, Result, StoreError};

const HEADER_BLOCK: usize = 0;

impl BlockStore {
    /// Writes the whole store onto `dev` and syncs it. Returns the bytes written.
    ///
    /// The device must use this store's block size and hold at least
    /// `block_count + 1` blocks.
    pub fn save_to<D: BlockStorage>(&self, dev: &mut D) -> Result<usize> {
        let geometry = *self.geometry();
        check_device(dev, &geometry)?;

        let header = ImageHeader::new(&geometry);
        dev.write_block(HEADER_BLOCK, &header.serialize(geometry.block_size()))?;

        for (id, block) in self.blocks().iter().enumerate() {
            dev.write_block(id + 1, block)?;
        }

        let mut bitmap_block = vec![0; geometry.block_size()];
        let bitmap = self.occupancy().to_bytes();
        bitmap_block[..bitmap.len()].copy_from_slice(&bitmap);
        dev.write_block(bitmap_device_block(&geometry), &bitmap_block)?;
        dev.sync_disk()?;

        debug!(
            "saved store of {} x {} byte blocks, {} in use",
            geometry.block_count(),
            geometry.block_size(),
            self.used_blocks()
        );
        Ok(geometry.image_len())
    }

    /// Reads a store back from a device written by [`BlockStore::save_to`].
    pub fn load_from<D: BlockStorage>(dev: &mut D) -> Result<Self> {
        let mut buf = vec![0; dev.block_size()];
        dev.read_block(HEADER_BLOCK, &mut buf)?;
        let geometry = ImageHeader::parse(&buf)?.geometry()?;
        check_device(dev, &geometry)?;

        let mut blocks = Vec::with_capacity(geometry.user_blocks());
        for id in 0..geometry.user_blocks() {
            dev.read_block(id + 1, &mut buf)?;
            blocks.push(buf.clone().into_boxed_slice());
        }

        dev.read_block(bitmap_device_block(&geometry), &mut buf)?;
        let occupancy = Bitmap::from_bytes(geometry.block_count(), &buf)
            .ok_or_else(|| StoreError::InvalidImage("bitmap block too short".to_string()))?;

        let store = Self::from_parts(geometry, blocks, occupancy);
        debug!(
            "loaded store of {} x {} byte blocks, {} in use",
            geometry.block_count(),
            geometry.block_size(),
            store.used_blocks()
        );
        Ok(store)
    }

    /// Writes the store to an image file at `path`, replacing any existing file.
    /// Returns the bytes written.
    pub fn serialize<P: AsRef<Path>>(&self, path: P) -> Result<usize> {
        let geometry = self.geometry();
        let fd = File::create(path.as_ref())?;
        let mut dev = FileBlockEmulatorBuilder::from(fd)
            .with_block_size(geometry.block_size())
            .with_block_count(geometry.block_count() + 1)
            // Every block is written below.
            .clear_medium(false)
            .build()?;
        self.save_to(&mut dev)
    }

    /// Opens the image file at `path` and rebuilds the store it holds.
    pub fn deserialize<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut fd = OpenOptions::new().read(true).open(path.as_ref())?;

        let mut raw_header = [0; IMAGE_HEADER_LEN];
        fd.read_exact(&mut raw_header).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => {
                StoreError::InvalidImage("truncated image header".to_string())
            }
            _ => StoreError::Io(e),
        })?;
        let geometry = ImageHeader::parse(&raw_header)?.geometry()?;

        let len = fd.metadata()?.len();
        if len != geometry.image_len() as u64 {
            return Err(StoreError::InvalidImage(format!(
                "expected {} bytes, file holds {}",
                geometry.image_len(),
                len
            )));
        }

        let mut dev: FileBlockEmulator = FileBlockEmulatorBuilder::from(fd)
            .with_block_size(geometry.block_size())
            .with_block_count(geometry.block_count() + 1)
            // Don't reset the image being read.
            .clear_medium(false)
            .build()?;
        Self::load_from(&mut dev)
    }
}

/// Device block holding the bitmap, one past the reserved slot to make room for the
/// header.
fn bitmap_device_block(geometry: &Geometry) -> usize {
    geometry.reserved_block() + 1
}

fn check_device<D: BlockStorage>(dev: &D, geometry: &Geometry) -> Result<()> {
    if dev.block_size() != geometry.block_size() {
        return Err(StoreError::InvalidGeometry(format!(
            "device blocks are {} bytes, store blocks are {}",
            dev.block_size(),
            geometry.block_size()
        )));
    }
    if dev.block_count() < geometry.block_count() + 1 {
        return Err(StoreError::InvalidGeometry(format!(
            "device holds {} blocks, image needs {}",
            dev.block_count(),
            geometry.block_count() + 1
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_geometry() -> Geometry {
        Geometry::builder()
            .with_block_size(32)
            .with_block_count(10)
            .build()
            .unwrap()
    }

    fn create_test_device(geometry: &Geometry) -> FileBlockEmulator {
        FileBlockEmulatorBuilder::from(tempfile::tempfile().unwrap())
            .with_block_size(geometry.block_size())
            .with_block_count(geometry.block_count() + 1)
            .build()
            .expect("Could not initialize disk emulator.")
    }

    #[test]
    fn can_save_and_load_through_a_device() {
        let geometry = small_geometry();
        let mut store = BlockStore::with_geometry(geometry);
        store.request(3).unwrap();
        store.write(3, &[0x33; 32]).unwrap();
        // Data in a free block is kept too.
        store.write(8, &[0x88; 32]).unwrap();

        let mut dev = create_test_device(&geometry);
        assert_eq!(store.save_to(&mut dev).unwrap(), 11 * 32);

        let loaded = BlockStore::load_from(&mut dev).unwrap();
        assert_eq!(loaded.geometry(), &geometry);
        assert_eq!(loaded.allocated().collect::<Vec<_>>(), vec![3]);
        let mut buf = [0; 32];
        loaded.read(8, &mut buf).unwrap();
        assert_eq!(buf, [0x88; 32]);
    }

    #[test]
    fn bitmap_is_stored_in_last_device_block() {
        let geometry = small_geometry();
        let mut store = BlockStore::with_geometry(geometry);
        store.request(0).unwrap();
        store.request(8).unwrap();

        let mut dev = create_test_device(&geometry);
        store.save_to(&mut dev).unwrap();

        let mut buf = [0; 32];
        dev.read_block(10, &mut buf).unwrap();
        // Bits 0, 8 and the reserved bit 9.
        assert_eq!(&buf[..2], &[0b0000_0001, 0b0000_0011]);
        assert!(buf[2..].iter().all(|&b| b == 0));
    }

    #[test]
    fn device_with_wrong_block_size_is_rejected() {
        let store = BlockStore::with_geometry(small_geometry());
        let mut dev = FileBlockEmulatorBuilder::from(tempfile::tempfile().unwrap())
            .with_block_size(64)
            .with_block_count(11)
            .build()
            .unwrap();

        assert!(matches!(
            store.save_to(&mut dev),
            Err(StoreError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn device_too_small_is_rejected() {
        let geometry = small_geometry();
        let store = BlockStore::with_geometry(geometry);
        let mut dev = FileBlockEmulatorBuilder::from(tempfile::tempfile().unwrap())
            .with_block_size(32)
            .with_block_count(10)
            .build()
            .unwrap();

        assert!(matches!(
            store.save_to(&mut dev),
            Err(StoreError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn blank_device_is_not_an_image() {
        let mut dev = create_test_device(&small_geometry());

        assert!(matches!(
            BlockStore::load_from(&mut dev),
            Err(StoreError::InvalidImage(_))
        ));
    }

    #[test]
    fn reserved_bit_is_restored_even_if_cleared_on_disk() {
        let geometry = small_geometry();
        let store = BlockStore::with_geometry(geometry);
        let mut dev = create_test_device(&geometry);
        store.save_to(&mut dev).unwrap();
        dev.write_block(10, &[0; 32]).unwrap();

        let loaded = BlockStore::load_from(&mut dev).unwrap();
        assert_eq!(loaded.used_blocks(), 0);
        assert_eq!(loaded.free_blocks(), 9);
    }
}
