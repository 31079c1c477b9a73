use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pats_client::models::Counts;
use pats_client::wire::normalize_nonfinite;

/// Build a counts-style body: `sensors` trap-eye sensors with `days` rows
/// each. The first row of every series carries the NaN placeholders the
/// real server emits.
fn counts_body(sensors: usize, days: usize) -> String {
    let mut trapeye = Vec::with_capacity(sensors);
    for s in 0..sensors {
        let mut absolute = Vec::with_capacity(days);
        let mut new_counts = Vec::with_capacity(days);
        for d in 0..days {
            let diff = if d == 0 { "NaN" } else { "0.0" };
            absolute.push(format!(
                r#"{{"3": {}.0, "24": {}.0, "ta_diff": {diff}, "wv_diff": {diff}, "date": "202407{:02}"}}"#,
                d % 7,
                d % 5,
                d + 1
            ));
            new_counts.push(format!(
                r#"{{"3": {diff}, "24": {diff}, "date": "202407{:02}"}}"#,
                d + 1
            ));
        }
        trapeye.push(format!(
            r#"{{"absolute_count": [{}], "new_counts": [{}], "post_id": {}, "row_id": 34}}"#,
            absolute.join(","),
            new_counts.join(","),
            s
        ));
    }
    format!(r#"{{"c": [], "trapeye": [{}]}}"#, trapeye.join(","))
}

fn bench_normalize(c: &mut Criterion) {
    let dirty = counts_body(50, 28);
    let clean = dirty.replace("NaN", "0.0");

    let mut group = c.benchmark_group("normalize_nonfinite");

    group.bench_function("dirty_body", |b| {
        b.iter(|| normalize_nonfinite(black_box(&dirty)));
    });

    // Clean bodies should only cost the token scan.
    group.bench_function("clean_body", |b| {
        b.iter(|| normalize_nonfinite(black_box(&clean)));
    });

    group.finish();
}

fn bench_parse(c: &mut Criterion) {
    let dirty = counts_body(50, 28);

    c.bench_function("normalize_and_parse_counts", |b| {
        b.iter(|| {
            let body = normalize_nonfinite(black_box(&dirty));
            let counts: Counts = serde_json::from_str(&body).unwrap();
            assert_eq!(counts.trapeye.len(), 50);
        });
    });
}

criterion_group!(benches, bench_normalize, bench_parse);
criterion_main!(benches);
