//! Benchmarks for the change tracker's scan and the snapshot digest.
//!
//! Performance-critical paths:
//! - `scan_surfaces`: walk of every tracked root on each poll
//! - `digest`: SHA-256 of captured configuration files

#![allow(missing_docs)]

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use ephemera_kernel::isolation::{Surface, UserFolder};
use ephemera_kernel::snapshot::manifest::digest;
use ephemera_kernel::tracker::scan_surfaces;
use std::fs;
use std::path::Path;

fn populate(root: &Path, count: usize) -> Vec<Surface> {
    UserFolder::ALL
        .iter()
        .map(|&folder| {
            let tracked = folder.under(root);
            for i in 0..count / UserFolder::ALL.len() {
                let subdir = tracked.join(format!("dir{}", i % 10));
                fs::create_dir_all(&subdir).unwrap();
                fs::write(subdir.join(format!("file{i}.txt")), format!("content {i}")).unwrap();
            }
            Surface {
                folder,
                writable: tracked.clone(),
                tracked,
            }
        })
        .collect()
}

fn bench_scan_surfaces(c: &mut Criterion) {
    let mut group = c.benchmark_group("tracker/scan_surfaces");

    for count in [60usize, 600, 6000] {
        let temp_dir = tempfile::tempdir().unwrap();
        let surfaces = populate(temp_dir.path(), count);

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{count}_files")),
            &surfaces,
            |b, surfaces| b.iter(|| scan_surfaces(black_box(surfaces))),
        );
    }

    group.finish();
}

fn bench_unchanged_comparison(c: &mut Criterion) {
    let temp_dir = tempfile::tempdir().unwrap();
    let surfaces = populate(temp_dir.path(), 600);
    let previous = scan_surfaces(&surfaces);

    // One poll with nothing changed: scan plus equality check.
    c.bench_function("tracker/poll_unchanged_600", |b| {
        b.iter(|| black_box(scan_surfaces(&surfaces) == previous));
    });
}

fn bench_digest(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot/digest");

    for size in [1024usize, 65536, 1_048_576] {
        let data = vec![0u8; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{size}_bytes")),
            &data,
            |b, data| b.iter(|| digest(black_box(data))),
        );
    }

    group.finish();
}

criterion_group!(benches, bench_scan_surfaces, bench_unchanged_comparison, bench_digest);
criterion_main!(benches);
