use blockstore::io::FileBlockEmulatorBuilder;
use blockstore::{BlockStore, Geometry};

pub fn main() {
    let geometry = Geometry::builder()
        .with_block_size(64)
        .with_block_count(16)
        .build()
        .expect("valid geometry");

    let tmp = tempfile::tempfile().unwrap();
    let mut dev = FileBlockEmulatorBuilder::from(tmp)
        .with_block_size(geometry.block_size())
        .with_block_count(geometry.block_count() + 1)
        .build()
        .expect("Could not initialize disk emulator.");

    // Save a store onto the emulated disk and read it back.
    let mut store = BlockStore::with_geometry(geometry);
    store.request(7).unwrap();
    let written = store.save_to(&mut dev).expect("should save");

    let loaded = BlockStore::load_from(&mut dev).expect("should load");
    println!(
        "wrote {} bytes, reloaded store has blocks {:?} in use",
        written,
        loaded.allocated().collect::<Vec<_>>()
    );
}
