use blockstore::{BlockStore, BLOCK_SIZE};

pub fn main() {
    let mut store = BlockStore::new();
    let id = store.allocate().expect("fresh store has free blocks");

    let mut greeting = [0; BLOCK_SIZE];
    greeting[..5].copy_from_slice(b"hello");
    store.write(id, &greeting).unwrap();

    let mut buf = [0; BLOCK_SIZE];
    store.read(id, &mut buf).unwrap();
    println!(
        "block {}: {} ({} of {} blocks in use)",
        id,
        String::from_utf8_lossy(&buf[..5]),
        store.used_blocks(),
        store.total_blocks()
    );
}
