//! Criterion benchmarks for telegram encoding and position scanning.
//!
//! The control loop encodes one drive telegram and scans one response
//! buffer per tick, so both paths sit on the teleoperation hot path.
//!
//! Run with:
//! ```bash
//! cargo bench --package teleop-core --bench telegram_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use teleop_core::position::scan_position;
use teleop_core::telegram::{DriveTelegram, NeckTelegram};

fn bench_encode(c: &mut Criterion) {
    let telegrams: &[(&str, DriveTelegram)] = &[
        ("stop", DriveTelegram::STOP),
        ("forward_full", DriveTelegram { left: 100, right: 100 }),
        ("pivot", DriveTelegram { left: 100, right: -100 }),
    ];

    let mut group = c.benchmark_group("drive_encode");
    for (name, telegram) in telegrams {
        group.bench_with_input(BenchmarkId::new("telegram", name), telegram, |b, t| {
            b.iter(|| black_box(t).encode())
        });
    }
    group.finish();

    c.bench_function("neck_encode", |b| {
        b.iter(|| black_box(NeckTelegram::Left).encode())
    });
}

fn bench_scan_position(c: &mut Criterion) {
    // Worst realistic case: the report sits at the end of a chunk of
    // accumulated chatter from the servo firmware.
    let mut noisy = b"servo boot ok\r\nstatus: nominal\r\n".repeat(8);
    noisy.extend_from_slice(b"pos: 117\n");

    let buffers: &[(&str, Vec<u8>)] = &[
        ("immediate", b"pos: 90\n".to_vec()),
        ("noisy_prefix", noisy),
        ("no_match", b"status: nominal\r\n".repeat(16)),
    ];

    let mut group = c.benchmark_group("scan_position");
    for (name, buf) in buffers {
        group.bench_with_input(BenchmarkId::new("buffer", name), buf, |b, buf| {
            b.iter(|| scan_position(black_box(buf)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_encode, bench_scan_position);
criterion_main!(benches);
