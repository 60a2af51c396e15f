use zerocopy::byteorder::{LittleEndian, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::geometry::Geometry;
use crate::store::{Result, StoreError};

const IMAGE_MAGIC: u32 = u32::from_le_bytes(*b"BSTR");
const IMAGE_VERSION: u32 = 1;

/// Encoded size of [`ImageHeader`].
pub(crate) const IMAGE_HEADER_LEN: usize = std::mem::size_of::<ImageHeader>();

/// The first block of a serialized store, identifying the image and recording the
/// geometry needed to read the rest of it back.
///
/// All fields are little endian regardless of host.
#[repr(C)]
#[derive(AsBytes, FromZeroes, FromBytes, Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ImageHeader {
    /// The bytes "BSTR".
    magic: U32<LittleEndian>,
    /// Layout revision, currently 1.
    version: U32<LittleEndian>,
    /// Bytes per block.
    block_size: U32<LittleEndian>,
    /// Blocks in the store, reserved bitmap block included.
    block_count: U32<LittleEndian>,
}

impl ImageHeader {
    pub(crate) fn new(geometry: &Geometry) -> Self {
        // Geometry validation keeps both values within u32.
        Self {
            magic: U32::new(IMAGE_MAGIC),
            version: U32::new(IMAGE_VERSION),
            block_size: U32::new(geometry.block_size() as u32),
            block_count: U32::new(geometry.block_count() as u32),
        }
    }

    /// Reads a header from the front of `buf`, checking the magic and version.
    pub(crate) fn parse(buf: &[u8]) -> Result<Self> {
        let header = Self::read_from_prefix(buf)
            .ok_or_else(|| StoreError::InvalidImage("truncated image header".to_string()))?;

        if header.magic.get() != IMAGE_MAGIC {
            return Err(StoreError::InvalidImage(format!(
                "bad magic {:#010x}",
                header.magic.get()
            )));
        }
        if header.version.get() != IMAGE_VERSION {
            return Err(StoreError::InvalidImage(format!(
                "unsupported image version {}",
                header.version.get()
            )));
        }
        Ok(header)
    }

    /// The geometry recorded in the header, validated like any other.
    pub(crate) fn geometry(&self) -> Result<Geometry> {
        Geometry::builder()
            .with_block_size(self.block_size.get() as usize)
            .with_block_count(self.block_count.get() as usize)
            .build()
            .map_err(|e| StoreError::InvalidImage(e.to_string()))
    }

    /// Serializes the header into a zero padded block of `block_size` bytes.
    pub(crate) fn serialize(&self, block_size: usize) -> Vec<u8> {
        let mut block = vec![0; block_size.max(IMAGE_HEADER_LEN)];
        block[..IMAGE_HEADER_LEN].copy_from_slice(self.as_bytes());
        block
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_sixteen_bytes() {
        assert_eq!(IMAGE_HEADER_LEN, 16);
    }

    #[test]
    fn can_encode_and_decode_headers() {
        let geo = Geometry::builder()
            .with_block_size(64)
            .with_block_count(32)
            .build()
            .unwrap();
        let encoded = ImageHeader::new(&geo).serialize(geo.block_size());

        assert_eq!(encoded.len(), 64);
        assert_eq!(&encoded[0..4], b"BSTR");
        assert_eq!(&encoded[8..12], &64_u32.to_le_bytes());

        let parsed = ImageHeader::parse(&encoded).unwrap();
        assert_eq!(parsed, ImageHeader::new(&geo));
        assert_eq!(parsed.geometry().unwrap(), geo);
    }

    #[test]
    fn parsing_buffer_with_invalid_magic_fails() {
        let zero_buffer_with_right_size = vec![0; 256];
        let result = ImageHeader::parse(&zero_buffer_with_right_size);
        assert!(matches!(result, Err(StoreError::InvalidImage(_))));
    }

    #[test]
    fn parsing_truncated_buffer_fails() {
        let encoded = ImageHeader::new(&Geometry::default()).serialize(256);
        let result = ImageHeader::parse(&encoded[..10]);
        assert!(matches!(result, Err(StoreError::InvalidImage(_))));
    }

    #[test]
    fn parsing_unknown_version_fails() {
        let mut encoded = ImageHeader::new(&Geometry::default()).serialize(256);
        encoded[4] = 9;
        let result = ImageHeader::parse(&encoded);
        assert!(matches!(result, Err(StoreError::InvalidImage(_))));
    }

    #[test]
    fn recorded_geometry_is_validated() {
        let mut encoded = ImageHeader::new(&Geometry::default()).serialize(256);
        // Claim a single block store.
        encoded[12..16].copy_from_slice(&1_u32.to_le_bytes());

        let header = ImageHeader::parse(&encoded).unwrap();
        assert!(matches!(header.geometry(), Err(StoreError::InvalidImage(_))));
    }
}
