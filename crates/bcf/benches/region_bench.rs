//! Benchmarks for BCF storage components.
//!
//! Run with: cargo bench --package bcf-store
//!
//! ## Benchmark Categories
//!
//! - **Region Compression**: Solid and scattered cell sets
//! - **Writer**: Full add/spill/finalize path
//! - **Reader**: Partition decode and cell expansion

use bcf_store::partition::CellGroup;
use bcf_store::{
    BoundedWriter, CompressorConfig, LocalPos, RegionCompressor, StreamReader, WriterConfig,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tempfile::TempDir;

const NO_STATES: &[(&str, &str)] = &[];

/// Solid cube of `side`³ cells.
fn solid_cube(side: i16) -> CellGroup {
    let cells = (0..side)
        .flat_map(|x| (0..side).flat_map(move |y| (0..side).map(move |z| LocalPos::new(x, y, z))))
        .collect();
    CellGroup {
        descriptor_id: 0,
        cells,
    }
}

/// Roughly one cell in three of a `side`³ box, chosen deterministically.
fn scattered(side: i16) -> CellGroup {
    let cells = solid_cube(side)
        .cells
        .into_iter()
        .filter(|p| (p.x as i32 * 31 + p.y as i32 * 17 + p.z as i32 * 7) % 3 == 0)
        .collect();
    CellGroup {
        descriptor_id: 0,
        cells,
    }
}

// ============================================================================
// Region Compression Benchmarks
// ============================================================================

fn bench_compress_solid(c: &mut Criterion) {
    let mut group = c.benchmark_group("compress_solid");
    let compressor = RegionCompressor::default();

    for side in [8i16, 16, 32, 64].iter() {
        let cells = solid_cube(*side);
        group.throughput(Throughput::Elements(cells.cells.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(side), &cells, |b, cells| {
            b.iter(|| compressor.compress_group(black_box(cells)))
        });
    }

    group.finish();
}

fn bench_compress_scattered(c: &mut Criterion) {
    let mut group = c.benchmark_group("compress_scattered");

    for side in [8i16, 16, 32].iter() {
        let cells = scattered(*side);
        group.throughput(Throughput::Elements(cells.cells.len() as u64));
        group.bench_with_input(BenchmarkId::new("dense", side), &cells, |b, cells| {
            let compressor = RegionCompressor::default();
            b.iter(|| compressor.compress_group(black_box(cells)))
        });
        group.bench_with_input(BenchmarkId::new("hash", side), &cells, |b, cells| {
            let compressor =
                RegionCompressor::new(CompressorConfig::default().with_dense_volume_limit(0));
            b.iter(|| compressor.compress_group(black_box(cells)))
        });
    }

    group.finish();
}

fn bench_compress_many_descriptors(c: &mut Criterion) {
    let groups: Vec<CellGroup> = (0..16u32)
        .map(|id| {
            let mut group = scattered(24);
            group.descriptor_id = id;
            group
                .cells
                .iter_mut()
                .for_each(|p| p.x += (id as i16) * 24);
            group
        })
        .collect();
    let compressor = RegionCompressor::default();

    c.bench_function("compress_16_descriptors", |b| {
        b.iter(|| compressor.compress(black_box(&groups)))
    });
}

// ============================================================================
// Writer / Reader Benchmarks
// ============================================================================

fn write_terrain(path: &std::path::Path, config: WriterConfig, extent: i32) {
    let mut writer = BoundedWriter::create(path, config).unwrap();
    for x in 0..extent {
        for z in 0..extent {
            let surface = 4 + (x * 3 + z * 5) % 6;
            for y in 0..surface {
                let name = if y + 1 == surface { "grass" } else { "stone" };
                writer.add_cell(x, y, z, name, NO_STATES, None).unwrap();
            }
        }
    }
    writer.finalize().unwrap();
}

fn bench_writer_end_to_end(c: &mut Criterion) {
    let mut group = c.benchmark_group("writer_terrain");
    group.sample_size(10);

    for limit in [5_000usize, 1_000_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(limit), limit, |b, &limit| {
            b.iter_batched(
                || TempDir::new().unwrap(),
                |dir| {
                    let config = WriterConfig::default()
                        .with_spill_root(dir.path())
                        .with_max_resident_cells(limit);
                    write_terrain(&dir.path().join("bench.bcf"), config, 200);
                },
                criterion::BatchSize::LargeInput,
            )
        });
    }

    group.finish();
}

fn bench_reader_cells(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bench.bcf");
    write_terrain(
        &path,
        WriterConfig::default().with_spill_root(dir.path()),
        200,
    );

    c.bench_function("reader_all_cells", |b| {
        b.iter(|| {
            let mut reader = StreamReader::open(&path).unwrap();
            let mut total = 0usize;
            for partition in 0..reader.partition_count() {
                total += reader.cells(partition).unwrap().len();
            }
            black_box(total)
        })
    });
}

criterion_group!(
    benches,
    // Region compression
    bench_compress_solid,
    bench_compress_scattered,
    bench_compress_many_descriptors,
    // Writer / reader
    bench_writer_end_to_end,
    bench_reader_cells,
);
criterion_main!(benches);
