//! Criterion benchmarks for the board engine.
//!
//! Measures dealing a fresh layout and the worst-case flood fill (a board with
//! no mines, opened from one corner) for every preset.
//!
//! Run with:
//! ```bash
//! cargo bench --package mines-core --bench board_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mines_core::{Board, BoardSize, DuelMessage};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn bench_reset(c: &mut Criterion) {
    let mut group = c.benchmark_group("reset");
    for size in BoardSize::ALL {
        group.bench_with_input(BenchmarkId::from_parameter(size.name()), &size, |b, &size| {
            let mut board = Board::new(size);
            let mut rng = StdRng::seed_from_u64(1);
            b.iter(|| board.reset_with_rng(black_box(size), &mut rng));
        });
    }
    group.finish();
}

fn bench_flood_fill(c: &mut Criterion) {
    let mut group = c.benchmark_group("flood_fill");
    for size in BoardSize::ALL {
        let empty = "0".repeat(size.total_cells());
        group.bench_with_input(BenchmarkId::from_parameter(size.name()), &empty, |b, text| {
            let mut board = Board::new(size);
            b.iter(|| {
                board.load_from_text(text).expect("valid text");
                black_box(board.open(0))
            });
        });
    }
    group.finish();
}

fn bench_parse_board_message(c: &mut Criterion) {
    let text = Board::new(BoardSize::Large).serialize();
    c.bench_function("parse_large_board_message", |b| {
        b.iter(|| DuelMessage::parse(black_box(&text)))
    });
}

criterion_group!(benches, bench_reset, bench_flood_fill, bench_parse_board_message);
criterion_main!(benches);
