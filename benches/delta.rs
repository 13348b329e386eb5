// benches/delta.rs
use chrono::{Duration, TimeZone, Utc};
use criterion::{criterion_group, criterion_main, Criterion, black_box};

use rankwatch::{
    delta::apply_batch,
    model::{Batch, BatchRow},
    source::site::parse_ranking,
    store::Tables,
};

const SUBJECTS: i64 = 2_000;

fn synthetic_batch(step: i64) -> Batch {
    let t0 = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
    let rows = (0..SUBJECTS)
        .map(|i| BatchRow::new(format!("Player {i}"), "Guild", 1_000 + i * step))
        .collect();
    Batch::new("Auroria", t0 + Duration::minutes(step * 5), rows)
}

fn synthetic_page() -> String {
    let mut doc = String::from("<html><body><table><tr><th>Jogador</th><th>RAW no período</th></tr>");
    for i in 0..SUBJECTS {
        doc.push_str(&format!("<tr><td>Player {i}</td><td>{}</td></tr>", 1_000 + i * 7));
    }
    doc.push_str("</table></body></html>");
    doc
}

fn bench_delta(c: &mut Criterion) {
    let first = synthetic_batch(1);
    let second = synthetic_batch(2);
    let now = second.batch_time;

    let mut seeded = Tables::default();
    apply_batch(&mut seeded, &first, first.batch_time);

    c.bench_function("apply_batch_new_keys", |b| {
        b.iter(|| {
            let mut t = Tables::default();
            let out = apply_batch(&mut t, black_box(&first), now);
            black_box(out.new_keys)
        })
    });

    c.bench_function("apply_batch_changes", |b| {
        b.iter(|| {
            let mut t = seeded.clone();
            let out = apply_batch(&mut t, black_box(&second), now);
            black_box(out.written())
        })
    });

    let doc = synthetic_page();
    c.bench_function("parse_ranking", |b| {
        b.iter(|| {
            let rows = parse_ranking(black_box(&doc), "Guild").unwrap();
            black_box(rows.len())
        })
    });
}

criterion_group!(benches, bench_delta);
criterion_main!(benches);
