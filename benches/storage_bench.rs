use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use tempfile::TempDir;

use microsql::index::IndexManager;
use microsql::record::{RecordFileManager, RecordFileScan, ScanDirection, ScanPredicate};
use microsql::{AttrType, CompOp, Config, PageNum, RecordId};

const ROWS: u32 = 5_000;
const RECORD_SIZE: usize = 64;

fn row(id: u32) -> [u8; RECORD_SIZE] {
    let mut data = [0u8; RECORD_SIZE];
    data[..4].copy_from_slice(&(id as i32).to_le_bytes());
    data
}

/// A permutation of `0..n` (for n coprime with 7919) so inserts land all over the tree.
fn scrambled(n: u32) -> impl Iterator<Item = u32> {
    (0..n).map(move |i| (i * 7919) % n)
}

fn bench_record_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("record");
    group.throughput(Throughput::Elements(u64::from(ROWS)));

    group.bench_function("insert", |b| {
        b.iter_batched(
            || {
                let dir = TempDir::new().unwrap();
                let rfm = RecordFileManager::new(Config::new(dir.path()));
                rfm.create_file("bench", RECORD_SIZE).unwrap();
                (dir, rfm)
            },
            |(_dir, rfm)| {
                let mut rf = rfm.open_file("bench").unwrap();
                for id in 0..ROWS {
                    black_box(rf.insert_rec(&row(id)).unwrap());
                }
                rfm.close_file(rf).unwrap();
            },
            BatchSize::PerIteration,
        );
    });

    let dir = TempDir::new().unwrap();
    let rfm = RecordFileManager::new(Config::new(dir.path()));
    rfm.create_file("scan", RECORD_SIZE).unwrap();
    let mut rf = rfm.open_file("scan").unwrap();
    for id in 0..ROWS {
        rf.insert_rec(&row(id)).unwrap();
    }

    group.bench_function("scan_ge", |b| {
        let bound = ((ROWS / 2) as i32).to_le_bytes().to_vec();
        b.iter(|| {
            let predicate = ScanPredicate::new(AttrType::Int, 4, 0, CompOp::Ge, bound.clone());
            let scan = RecordFileScan::open(&rf, predicate, ScanDirection::Forward).unwrap();
            black_box(scan.count())
        });
    });
    group.finish();
}

fn bench_index(c: &mut Criterion) {
    let mut group = c.benchmark_group("index");
    group.throughput(Throughput::Elements(u64::from(ROWS)));

    group.bench_function("insert_scrambled", |b| {
        b.iter_batched(
            || {
                let dir = TempDir::new().unwrap();
                let im = IndexManager::new(Config::new(dir.path()));
                im.create_index("bench", 0, AttrType::Int, 4).unwrap();
                (dir, im)
            },
            |(_dir, im)| {
                let mut index = im.open_index("bench", 0).unwrap();
                for key in scrambled(ROWS) {
                    let rid = RecordId::new(PageNum::new(2 + u64::from(key / 60)), key % 60);
                    index.insert_entry(&(key as i32).to_le_bytes(), rid).unwrap();
                }
                im.close_index(index).unwrap();
            },
            BatchSize::PerIteration,
        );
    });

    let dir = TempDir::new().unwrap();
    let im = IndexManager::new(Config::new(dir.path()));
    im.create_index("lookup", 0, AttrType::Int, 4).unwrap();
    let mut index = im.open_index("lookup", 0).unwrap();
    for key in scrambled(ROWS) {
        index
            .insert_entry(&(key as i32).to_le_bytes(), RecordId::new(PageNum::new(2), key))
            .unwrap();
    }

    group.bench_function("point_search", |b| {
        b.iter(|| {
            for key in (0..ROWS).step_by(7) {
                black_box(index.search(&(key as i32).to_le_bytes()).unwrap());
            }
        });
    });
    group.finish();
}

criterion_group!(benches, bench_record_insert, bench_index);
criterion_main!(benches);
