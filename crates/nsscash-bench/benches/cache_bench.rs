//! Benchmarks: serializing account databases and looking records up
//! through the mapped cache.

use std::io::Write;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use nsscash_bench::{synthetic_groups, synthetic_passwds};
use nsscash_core::file::CacheFile;
use nsscash_core::group::serialize_groups;
use nsscash_core::passwd::{serialize_passwds, ENTRY_HEADER_SIZE};
use nsscash_core::search::{search, SearchKey};

fn bench_serialize(c: &mut Criterion) {
    let pws = synthetic_passwds(10_000);
    c.bench_function("serialize_passwds_10k", |b| {
        b.iter(|| serialize_passwds(black_box(&pws)).unwrap())
    });

    let grs = synthetic_groups(10_000);
    c.bench_function("serialize_groups_10k", |b| {
        b.iter(|| serialize_groups(black_box(&grs)).unwrap())
    });
}

fn bench_lookup(c: &mut Criterion) {
    let pws = synthetic_passwds(10_000);
    let bytes = serialize_passwds(&pws).unwrap();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&bytes).unwrap();
    file.flush().unwrap();

    let cache = CacheFile::open(file.path()).unwrap();
    c.bench_function("lookup_by_id_10k", |b| {
        b.iter(|| search(&cache, black_box(&SearchKey::Id(1000 + 7777)), 0).unwrap())
    });
    c.bench_function("lookup_by_name_10k", |b| {
        b.iter(|| {
            search(
                &cache,
                black_box(&SearchKey::Name(b"user007777")),
                ENTRY_HEADER_SIZE,
            )
            .unwrap()
        })
    });

    let path = file.path().to_path_buf();
    c.bench_function("map_search_unmap_10k", |b| {
        b.iter(|| {
            let cache = CacheFile::open(&path).unwrap();
            search(&cache, &SearchKey::Id(1000 + 42), 0).unwrap()
        })
    });
}

criterion_group!(benches, bench_serialize, bench_lookup);
criterion_main!(benches);
