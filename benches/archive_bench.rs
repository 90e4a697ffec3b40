//! Benchmarks for archive creation.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use logs_collector::utils::compress::create_archive;
use std::fs;
use tempfile::TempDir;

/// Benchmark tar.gz creation with different file counts
fn bench_archive_file_counts(c: &mut Criterion) {
    let mut group = c.benchmark_group("archive_file_counts");

    let file_counts = vec![10, 100, 500];
    let file_size = 10 * 1024; // 10KB per file

    for count in file_counts {
        let temp_dir = TempDir::new().unwrap();
        let output_dir = TempDir::new().unwrap();

        for i in 0..count {
            let file_path = temp_dir.path().join(format!("service_{}.log", i));
            let line = format!("{} INFO request handled\n", i);
            fs::write(&file_path, line.repeat(file_size / line.len())).unwrap();
        }

        let archive_path = output_dir.path().join("output.tar.gz");

        group.throughput(Throughput::Bytes((count * file_size) as u64));
        group.bench_with_input(
            BenchmarkId::new("create_archive", format!("{}_files", count)),
            &(temp_dir.path(), &archive_path),
            |b, (source, dest)| {
                b.iter(|| {
                    create_archive(black_box(source), "bench-logs", black_box(dest)).unwrap();
                    fs::remove_file(dest).ok();
                });
            },
        );
    }

    group.finish();
}

/// Benchmark a deep mirrored tree like `files/` produces
fn bench_archive_nested_tree(c: &mut Criterion) {
    let temp_dir = TempDir::new().unwrap();
    let output_dir = TempDir::new().unwrap();

    for depth in 0..8 {
        let dir = (0..=depth).fold(temp_dir.path().join("files"), |path, level| path.join(format!("level{}", level)));
        fs::create_dir_all(&dir).unwrap();
        for i in 0..10 {
            fs::write(dir.join(format!("{}.log", i)), vec![b'x'; 4096]).unwrap();
        }
    }
    let archive_path = output_dir.path().join("nested.tar.gz");

    c.bench_function("archive_nested_tree", |b| {
        b.iter(|| {
            create_archive(black_box(temp_dir.path()), "bench-logs", black_box(&archive_path)).unwrap();
            fs::remove_file(&archive_path).ok();
        });
    });
}

criterion_group!(benches, bench_archive_file_counts, bench_archive_nested_tree);
criterion_main!(benches);
