use super::block::{BlockNumber, BlockStorage};
use std::fs::File;
use std::io::prelude::*;
use std::io::{BufWriter, ErrorKind, SeekFrom};

/// Emulates block disk/flash storage in userspace using a file as block storage.
/// Store images are written through this type.
pub struct FileBlockEmulator {
    /// The file is treated as a fixed-size run of `block_count` blocks.
    fd: File,
    block_size: usize,
    /// The total number of blocks available in the file store.
    block_count: usize,
}

impl FileBlockEmulator {
    /// Returns ownership of the underlying file descriptor to the caller.
    pub fn into_file(self) -> File {
        self.fd
    }

    fn check_range(&self, blocknr: BlockNumber) -> std::io::Result<()> {
        if blocknr >= self.block_count {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                "block out of range",
            ));
        }
        Ok(())
    }

    fn offset(&self, blocknr: BlockNumber) -> u64 {
        (blocknr * self.block_size) as u64
    }
}

impl BlockStorage for FileBlockEmulator {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn block_count(&self) -> usize {
        self.block_count
    }

    fn read_block(&mut self, blocknr: BlockNumber, buf: &mut [u8]) -> std::io::Result<()> {
        self.check_range(blocknr)?;
        if buf.len() < self.block_size {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                "buffer does not contain enough space to read block",
            ));
        }
        let offset = self.offset(blocknr);
        self.fd.seek(SeekFrom::Start(offset))?;
        self.fd.read_exact(&mut buf[..self.block_size])
    }

    /// This method truncates writes that exceed the total block size.
    fn write_block(&mut self, blocknr: BlockNumber, buf: &[u8]) -> std::io::Result<()> {
        self.check_range(blocknr)?;
        let offset = self.offset(blocknr);
        self.fd.seek(SeekFrom::Start(offset))?;

        let max = self.block_size.min(buf.len());
        self.fd.write_all(&buf[..max])
    }

    fn sync_disk(&mut self) -> std::io::Result<()> {
        self.fd.sync_all()
    }
}

pub struct FileBlockEmulatorBuilder {
    fd: File,
    block_size: usize,
    block_count: usize,
    clear_medium: bool,
}

impl From<File> for FileBlockEmulatorBuilder {
    fn from(fd: File) -> Self {
        FileBlockEmulatorBuilder {
            fd,
            block_size: crate::BLOCK_SIZE,
            // A better default here might be the size of the file rounded down
            // to the nearest block.
            block_count: 0,
            clear_medium: true,
        }
    }
}

impl FileBlockEmulatorBuilder {
    /// Sets the size of each block in bytes.
    pub fn with_block_size(mut self, bytes: usize) -> Self {
        self.block_size = bytes;
        self
    }

    /// Sets the number of desired blocks in the block store device.
    pub fn with_block_count(mut self, blocks: usize) -> Self {
        self.block_count = blocks;
        self
    }

    /// Whether `build` zeroes every block first. Disable it to open a medium that
    /// already holds data.
    pub fn clear_medium(mut self, clear: bool) -> Self {
        self.clear_medium = clear;
        self
    }

    /// This builder assumes ownership of the file descriptor used and, unless told
    /// otherwise, does destructive things to prepare the file for use. Ownership of
    /// the file is transferred to the emulator meaning this builder can only be used
    /// to create one emulator.
    pub fn build(mut self) -> std::io::Result<FileBlockEmulator> {
        if self.block_size == 0 || self.block_count == 0 {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                "emulated disk needs a non-zero block size and count",
            ));
        }
        if self.clear_medium {
            self.zero_blocks()?;
        }
        Ok(FileBlockEmulator {
            fd: self.fd,
            block_size: self.block_size,
            block_count: self.block_count,
        })
    }

    fn zero_blocks(&mut self) -> std::io::Result<()> {
        self.fd.seek(SeekFrom::Start(0))?;
        let zeros = vec![0x00; self.block_size];
        let mut bfd = BufWriter::new(&self.fd);
        // Zero out the "disk" block, buffering each write to prevent excessive writes.
        for _ in 0..self.block_count {
            bfd.write_all(&zeros)?;
        }
        bfd.flush()
    }
}
