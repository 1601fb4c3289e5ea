use chainrun_draws::parse_str;
use criterion::{criterion_group, criterion_main, Criterion};

fn synthetic_output(draws: usize, params: usize) -> String {
    let mut text = String::from("# model = synthetic\n#   num_samples = 1000\nlp__,accept_stat__");
    for p in 1..=params {
        text.push_str(&format!(",beta.{p}"));
    }
    text.push('\n');
    text.push_str("# Adaptation terminated\n");
    for d in 0..draws {
        text.push_str(&format!("{},{}", -(d as f64), 0.9));
        for p in 0..params {
            text.push_str(&format!(",{}", (d * params + p) as f64 * 1e-3));
        }
        text.push('\n');
    }
    text.push_str("#  Elapsed Time: 0.1 seconds (Total)\n");
    text
}

fn bench_parse(c: &mut Criterion) {
    let text = synthetic_output(1_000, 50);
    c.bench_function("parse_1000x50", |b| b.iter(|| parse_str(&text).unwrap()));
}

criterion_group!(benches, bench_parse);
criterion_main!(benches);
