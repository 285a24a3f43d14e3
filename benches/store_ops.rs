//! Benchmarks for metadata store operations.
//!
//! These benchmarks compare the SQLite and JSON document backends for the
//! calls the provisioning workflow makes: latest-image lookup, clone
//! creation and filtered clone listing, at several registry sizes.

use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dbclone::model::{CloneFilter, NewClone, NewImage};
use dbclone::store::{FileStore, MetadataStore, SqliteStore};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

fn open(backend: &str, dir: &Path) -> Box<dyn MetadataStore> {
    match backend {
        "sqlite" => Box::new(
            SqliteStore::open(&dir.join("registry.db"), Duration::from_secs(10))
                .expect("open sqlite store"),
        ),
        _ => {
            let store = FileStore::new(&dir.join("store"));
            store.initialize().expect("initialize file store");
            Box::new(store)
        }
    }
}

/// Registry with `images` images spread over ten databases and one clone
/// per image.
fn populated(backend: &str, dir: &Path, images: usize) -> Box<dyn MetadataStore> {
    let store = open(backend, dir);
    let host = store
        .create_host("HOSTA", "10.0.0.1", "hosta.corp.local")
        .expect("create host");
    for i in 0..images {
        let image = store
            .register_image(&NewImage {
                image_name: format!("DB{}_{}", i % 10, i),
                image_location: format!("D:\\images\\DB{}_{}.vhdx", i % 10, i),
                size_mb: 1024,
                database_name: format!("DB{}", i % 10),
                database_timestamp: None,
                created_on: Utc.timestamp_opt(i as i64, 0).unwrap(),
            })
            .expect("register image");
        store
            .create_clone(&NewClone {
                image_id: image.image_id,
                host_id: host.host_id,
                clone_location: format!("C:\\clone\\clone{}.vhdx", i),
                access_path: format!("C:\\clone\\clone{}_x", i),
                sql_instance: "HOSTA".to_string(),
                database_name: format!("clone{}", i),
                is_enabled: i % 2 == 0,
            })
            .expect("create clone");
    }
    store
}

fn bench_latest_image(c: &mut Criterion) {
    let mut group = c.benchmark_group("latest_image");

    for backend in ["sqlite", "file"] {
        for images in [10, 100, 500] {
            let temp = TempDir::new().unwrap();
            let store = populated(backend, temp.path(), images);
            group.bench_with_input(
                BenchmarkId::new(backend, images),
                &store,
                |b, store| b.iter(|| store.latest_image_for_database(black_box("DB3"))),
            );
        }
    }

    group.finish();
}

fn bench_list_clones(c: &mut Criterion) {
    let mut group = c.benchmark_group("list_clones");
    let filter = CloneFilter {
        enabled_only: true,
        ..CloneFilter::default()
    };

    for backend in ["sqlite", "file"] {
        for images in [10, 100, 500] {
            let temp = TempDir::new().unwrap();
            let store = populated(backend, temp.path(), images);
            group.bench_with_input(
                BenchmarkId::new(backend, images),
                &store,
                |b, store| b.iter(|| store.list_clones(black_box(&filter))),
            );
        }
    }

    group.finish();
}

fn bench_create_clone(c: &mut Criterion) {
    let mut group = c.benchmark_group("create_clone");
    group.sample_size(20);

    for backend in ["sqlite", "file"] {
        let temp = TempDir::new().unwrap();
        let store = populated(backend, temp.path(), 10);
        let mut next = 0u64;
        group.bench_function(backend, |b| {
            b.iter(|| {
                next += 1;
                store
                    .create_clone(&NewClone {
                        image_id: 1,
                        host_id: 1,
                        clone_location: format!("E:\\bench\\{}.vhdx", next),
                        access_path: format!("E:\\bench\\{}_x", next),
                        sql_instance: "HOSTA".to_string(),
                        database_name: format!("bench{}", next),
                        is_enabled: true,
                    })
                    .expect("create clone")
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_latest_image, bench_list_clones, bench_create_clone);
criterion_main!(benches);
