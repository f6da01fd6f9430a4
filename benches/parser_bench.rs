//! Benchmarks for the cluster line parser.

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use cluster_spots::band::classify;
use cluster_spots::parser::{parse_line, parse_spot};

/// Sample spot lines for benchmarking.
const SAMPLE_SPOTS: &[&str] = &[
    "DX de K1ABC:     14025.0  W1XYZ        CQ CQ DX                       1234Z",
    "DX de EA5WU-#:    7018.3  RW1M         CW 19 dB 18 WPM CQ             2259Z",
    "DX de DL1ABC:    28074.0  PY2XYZ       FT8 -12 dB                     0815Z",
    "DX de G4ABC:      3795.0  VK9DX        up 5, QRT soon                 2130Z",
    "DX de JA1XYZ:   144300.0  JA2ABC       SSB                            0102Z",
    "DX de N2XYZ:     50313.0  CE3ABC       FT8 QRT                        1800Z",
];

fn bench_parse_spot(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_spot");

    group.throughput(Throughput::Elements(1));
    group.bench_function("single", |b| {
        b.iter(|| parse_spot(black_box(SAMPLE_SPOTS[0])))
    });

    group.throughput(Throughput::Elements(SAMPLE_SPOTS.len() as u64));
    group.bench_function("batch", |b| {
        b.iter(|| {
            for line in SAMPLE_SPOTS {
                let _ = parse_spot(black_box(line));
            }
        })
    });

    group.finish();
}

fn bench_classify(c: &mut Criterion) {
    let mut group = c.benchmark_group("classify");

    group.bench_function("hf", |b| b.iter(|| classify(black_box(14025.0))));
    group.bench_function("microwave", |b| b.iter(|| classify(black_box(10_368_100.0))));

    group.finish();
}

fn bench_parse_line(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_line");

    // Mix of spots, prompts and chatter
    let mixed_lines: Vec<&str> = vec![
        SAMPLE_SPOTS[0],
        "Welcome to the DX cluster",
        SAMPLE_SPOTS[1],
        "W1AW de GB7DJK >",
        SAMPLE_SPOTS[2],
        "login: ",
        "To ALL de K1ABC: anyone on 6m?",
    ];

    group.throughput(Throughput::Elements(mixed_lines.len() as u64));
    group.bench_function("mixed_input", |b| {
        b.iter(|| {
            for line in &mixed_lines {
                let _ = parse_line(black_box(line));
            }
        })
    });

    group.finish();
}

criterion_group!(benches, bench_parse_spot, bench_classify, bench_parse_line);
criterion_main!(benches);
