mod common;

use criterion::{Criterion, black_box, criterion_group, criterion_main};

fn bench_interpreter(c: &mut Criterion) {
    for (label, case) in common::workloads() {
        let session = common::parsed_session(&case);

        c.bench_function(&format!("interpreter_compile_{label}"), |b| {
            b.iter(|| {
                let mut session = session.clone();
                session.compile().expect("compile");
                black_box(session);
            })
        });

        c.bench_function(&format!("interpreter_total_{label}"), |b| {
            b.iter(|| {
                let mut session = session.clone();
                let output = session.run().expect("run");
                black_box(output);
            })
        });
    }
}

criterion_group!(benches, bench_interpreter);
criterion_main!(benches);
