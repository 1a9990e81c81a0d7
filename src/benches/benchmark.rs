use criterion::{Criterion, criterion_group, criterion_main};
use evtx_table::{IndexSettings, RawRecord, RecordIndex, TableAdapter};
use std::hint::black_box;

fn records(count: u64) -> Vec<RawRecord> {
    let payload = include_str!("../../samples/security_event_4624.xml");
    (0..count)
        .rev()
        .map(|id| RawRecord::new(id, format!("2019-02-04 14:13:{:02}.000000 UTC", id % 60), payload))
        .collect()
}

fn read_table(index: &RecordIndex) {
    let table = TableAdapter::new(index);
    for row in 0..table.row_count() {
        for column in 0..table.column_count() {
            black_box(table.cell_value(row, column).ok());
        }
    }
}

fn criterion_benchmark(c: &mut Criterion) {
    let raw = records(10_000);

    c.bench_function("load 10000 records", |b| {
        b.iter(|| RecordIndex::load(black_box(raw.clone())))
    });

    c.bench_function("read all cells of 10000 records", |b| {
        b.iter(|| read_table(&RecordIndex::load(raw.clone())))
    });

    c.bench_function("prefetch 10000 records", |b| {
        b.iter(|| {
            RecordIndex::load_with_settings(raw.clone(), IndexSettings::new().num_threads(0))
                .parse_all()
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
