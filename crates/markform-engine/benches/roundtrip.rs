use criterion::{Criterion, criterion_group, criterion_main};
use markform_engine::{RoleFilter, SerializeOptions, list_issues, parse, serialize, validate};
mod common;

fn bench_parse_and_serialize(c: &mut Criterion) {
    let mut group = c.benchmark_group("roundtrip");
    group.sample_size(10);

    let content = common::generate_form(20, 12);
    group.bench_function("parse", |b| {
        b.iter(|| std::hint::black_box(parse(std::hint::black_box(&content))));
    });

    let form = parse(&content).expect("benchmark form parses");
    group.bench_function("serialize", |b| {
        b.iter(|| {
            std::hint::black_box(serialize(
                std::hint::black_box(&form),
                SerializeOptions::default(),
            ))
        });
    });

    group.bench_function("validate_and_issues", |b| {
        b.iter(|| {
            let issues = validate(std::hint::black_box(&form));
            let outstanding = list_issues(&form, &RoleFilter::All);
            std::hint::black_box((issues, outstanding));
        });
    });

    group.finish();
}

criterion_group!(benches, bench_parse_and_serialize);
criterion_main!(benches);
