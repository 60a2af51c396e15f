//! bsctl
//!
//! Inspects and edits block store image files.

mod logging;

use blockstore::{BlockId, BlockStore, Geometry, BLOCK_COUNT, BLOCK_SIZE};
use clap::{Parser, Subcommand};
use log::info;
use std::error::Error;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "bsctl")]
#[command(about = "Inspect and edit block store images")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a new, empty image
    Format {
        image: PathBuf,
        /// Bytes per block
        #[arg(long, default_value_t = BLOCK_SIZE)]
        block_size: usize,
        /// Blocks in the store, including the reserved bitmap block
        #[arg(long, default_value_t = BLOCK_COUNT)]
        block_count: usize,
    },
    /// Print geometry and block counts
    Info { image: PathBuf },
    /// Allocate the lowest free block and print its id
    Alloc { image: PathBuf },
    /// Allocate a specific block
    Request { image: PathBuf, id: BlockId },
    /// Free a block
    Release { image: PathBuf, id: BlockId },
    /// Copy up to one block from a file into a block, zero padding short input
    Write {
        image: PathBuf,
        id: BlockId,
        input: PathBuf,
    },
    /// Hex dump a block
    Read { image: PathBuf, id: BlockId },
}

fn main() {
    if let Err(e) = logging::init() {
        eprintln!("bsctl: could not set up logging: {}", e);
    }
    let args = Args::parse();
    match run(args.command) {
        Ok(output) => print!("{}", output),
        Err(e) => {
            eprintln!("bsctl: {}", e);
            std::process::exit(1);
        }
    }
}

/// Executes one command and returns what it prints.
fn run(command: Command) -> Result<String, Box<dyn Error>> {
    let output = match command {
        Command::Format {
            image,
            block_size,
            block_count,
        } => {
            let geometry = Geometry::builder()
                .with_block_size(block_size)
                .with_block_count(block_count)
                .build()?;
            let written = BlockStore::with_geometry(geometry).serialize(&image)?;
            info!("formatted {:?}", image);
            format!("wrote {} bytes\n", written)
        }
        Command::Info { image } => {
            let store = open(&image)?;
            let geometry = store.geometry();
            format!(
                "block size:  {}\nblock count: {}\ntotal:       {}\nused:        {}\nfree:        {}\n",
                geometry.block_size(),
                geometry.block_count(),
                store.total_blocks(),
                store.used_blocks(),
                store.free_blocks()
            )
        }
        Command::Alloc { image } => {
            let mut store = open(&image)?;
            let id = store.allocate()?;
            store.serialize(&image)?;
            format!("{}\n", id)
        }
        Command::Request { image, id } => {
            let mut store = open(&image)?;
            store.request(id)?;
            store.serialize(&image)?;
            String::new()
        }
        Command::Release { image, id } => {
            let mut store = open(&image)?;
            store.release(id);
            store.serialize(&image)?;
            String::new()
        }
        Command::Write { image, id, input } => {
            let mut store = open(&image)?;
            let data = std::fs::read(&input)?;
            let mut block = vec![0; store.geometry().block_size()];
            let len = data.len().min(block.len());
            block[..len].copy_from_slice(&data[..len]);
            let copied = store.write(id, &block)?;
            store.serialize(&image)?;
            format!("wrote {} bytes to block {}\n", copied, id)
        }
        Command::Read { image, id } => {
            let store = open(&image)?;
            let mut block = vec![0; store.geometry().block_size()];
            store.read(id, &mut block)?;
            hex_dump(&block)
        }
    };
    Ok(output)
}

fn open(image: &Path) -> blockstore::Result<BlockStore> {
    info!("opening {:?}", image);
    BlockStore::deserialize(image)
}

fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::new();
    for (row, chunk) in bytes.chunks(16).enumerate() {
        out.push_str(&format!("{:08x}:", row * 16));
        for byte in chunk {
            out.push_str(&format!(" {:02x}", byte));
        }
        out.push('\n');
    }
    out
}
