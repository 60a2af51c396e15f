//! A fixed-capacity block store: a fixed number of equally sized blocks, each
//! addressable by index, with a bitmap tracking which of them are in use.
//!
//! ```
//! use blockstore::{BlockStore, BLOCK_SIZE};
//!
//! let mut store = BlockStore::new();
//! let id = store.allocate().unwrap();
//! store.write(id, &[0x42; BLOCK_SIZE]).unwrap();
//!
//! let mut buf = [0; BLOCK_SIZE];
//! store.read(id, &mut buf).unwrap();
//! assert_eq!(buf, [0x42; BLOCK_SIZE]);
//! assert_eq!(store.used_blocks() + store.free_blocks(), store.total_blocks());
//! ```
mod alloc;
mod geometry;
pub mod io;
mod persist;
mod sb;
mod store;

pub use crate::alloc::{Bitmap, State};
pub use crate::geometry::{Geometry, GeometryBuilder, BLOCK_COUNT, BLOCK_SIZE};
pub use crate::store::{BlockId, BlockStore, Result, StoreError};
