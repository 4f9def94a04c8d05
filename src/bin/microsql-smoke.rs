use std::path::PathBuf;

use clap::Parser;
use log::{error, info};

use microsql::index::{IndexManager, IndexScan};
use microsql::record::{RecordFileManager, RecordFileScan, ScanDirection, ScanPredicate};
use microsql::{AttrType, CompOp, Config, Error, PageNum, RecordId, Result};

const RECORD_FILE: &str = "smoke.rf";
const INDEX_NAME: &str = "smoke";
const RECORD_SIZE: usize = 16;

#[derive(Debug, Parser, PartialEq)]
#[clap(author, version, about = "Exercise the record heap and B+tree on disk", long_about = None)]
struct Args {
    #[clap(short = 'd', long, help = "Directory for the scratch files")]
    dir: PathBuf,
    #[clap(short = 'r', long, default_value_t = 1000, help = "Records to insert")]
    records: u32,
    #[clap(short = 'k', long, default_value_t = 1000, help = "Index keys to insert")]
    keys: u32,
    #[clap(long, help = "Frames per buffer pool")]
    pool_size: Option<usize>,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    if let Err(e) = run(&args) {
        error!("smoke test failed: {}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    std::fs::create_dir_all(&args.dir)?;
    let mut config = Config::new(&args.dir);
    if let Some(pool_size) = args.pool_size {
        config = config.with_buffer_pool_size(pool_size);
    }

    let rfm = RecordFileManager::new(config.clone());
    let im = IndexManager::new(config);

    remove_if_present(rfm.destroy_file(RECORD_FILE))?;
    remove_if_present(im.destroy_index(INDEX_NAME, 0))?;

    rfm.create_file(RECORD_FILE, RECORD_SIZE)?;
    im.create_index(INDEX_NAME, 0, AttrType::Int, 4)?;

    let mut records = rfm.open_file(RECORD_FILE)?;
    let mut index = im.open_index(INDEX_NAME, 0)?;

    for id in 0..args.records.max(args.keys) {
        let mut data = [0u8; RECORD_SIZE];
        data[..4].copy_from_slice(&(id as i32).to_le_bytes());
        data[4..].copy_from_slice(format!("row{:09}", id).as_bytes());

        let rid = if id < args.records {
            records.insert_rec(&data)?
        } else {
            RecordId::new(PageNum::new(u64::from(id)), 0)
        };
        if id < args.keys {
            index.insert_entry(&data[..4], rid)?;
        }
    }
    info!(
        "inserted {} records on {} pages, {} keys into a height {} index",
        args.records,
        records.num_pages(),
        args.keys,
        index.height()
    );

    let half = (args.records / 2) as i32;
    let upper = ScanPredicate::new(AttrType::Int, 4, 0, CompOp::Ge, half.to_le_bytes().to_vec());
    let matched = RecordFileScan::open(&records, upper, ScanDirection::Backward)?
        .collect::<Result<Vec<_>>>()?
        .len();
    info!("record scan: {} records with id >= {}", matched, half);

    let below = (args.keys / 2) as i32;
    let hits = IndexScan::open(&index, CompOp::Lt, &below.to_le_bytes())?
        .collect::<Result<Vec<_>>>()?
        .len();
    info!("index scan: {} keys below {}", hits, below);

    for id in (0..args.keys).step_by(2) {
        let key = (id as i32).to_le_bytes();
        for rid in index.search(&key)? {
            index.delete_entry(&key, rid)?;
        }
    }
    index.check_invariants()?;
    info!(
        "deleted every other key: height {}, {} nodes",
        index.height(),
        index.num_pages()
    );

    info!("record file buffer: {}", records.buffer().stats().snapshot());
    info!("index buffer: {}", index.buffer().stats().snapshot());

    im.close_index(index)?;
    rfm.close_file(records)?;
    Ok(())
}

/// Treat a missing file as already removed.
fn remove_if_present(result: Result<()>) -> Result<()> {
    match result {
        Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
