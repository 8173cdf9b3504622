//! Benchmarks for chain building and snapshot checksums.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use uuid::Uuid;

use contestflow::chain::{build_chain, StageSpec};
use contestflow::core::{ContestStageType, StageType};
use contestflow::snapshot::ProcedureTemplateSnapshot;
use contestflow::testing::fixtures;

fn contest_specs() -> Vec<StageSpec<ContestStageType>> {
    // Reversed so the builder has to sort.
    ContestStageType::ALL
        .iter()
        .rev()
        .zip((1..=5u32).rev())
        .map(|(stage_type, order)| StageSpec::new(*stage_type, order, format!("exec-{order}")))
        .collect()
}

fn chain_benchmark(c: &mut Criterion) {
    let specs = contest_specs();
    let owner = Uuid::new_v4();

    c.bench_function("build_chain_5", |b| {
        b.iter(|| build_chain(black_box(owner), black_box(&specs)))
    });

    let chain = build_chain(owner, &specs).unwrap_or_else(|err| panic!("{err}"));
    c.bench_function("walk_chain_5", |b| {
        b.iter(|| {
            let mut cursor = chain.first().map(|stage| stage.id);
            let mut steps = 0;
            while let Some(id) = cursor {
                cursor = chain.next_stage_id(black_box(id));
                steps += 1;
            }
            steps
        })
    });
}

fn snapshot_benchmark(c: &mut Criterion) {
    let (procedure, contests) = fixtures::template_tree().unwrap_or_else(|err| panic!("{err}"));
    let tree = ProcedureTemplateSnapshot::capture(&procedure, &contests);

    c.bench_function("snapshot_checksum", |b| b.iter(|| black_box(&tree).checksum()));
}

criterion_group!(benches, chain_benchmark, snapshot_benchmark);
criterion_main!(benches);
