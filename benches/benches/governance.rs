use agora_governance::{
    AccessControl, BlockContext, GovernorConfig, GovernorEngine, OptionKind, TimelockQueue,
    VotesToken, WeightSnapshotStore, OPEN_ROLE,
};
use agora_types::{Address, U256};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

fn bench_checkpoints(c: &mut Criterion) {
    let mut group = c.benchmark_group("checkpoints");
    let account = Address::from_name("whale");
    let mut store = WeightSnapshotStore::new();
    for block in 0..10_000u64 {
        store
            .record_change(account, U256::from(block * 3), block * 2)
            .unwrap();
    }

    group.bench_function("weight_at_10k", |b| {
        b.iter(|| black_box(store.weight_at(&account, black_box(12_345))))
    });

    group.bench_function("record_change_same_block", |b| {
        b.iter_batched(
            || store.clone(),
            |mut store| {
                store
                    .record_change(account, U256::ONE, 19_998)
                    .unwrap();
                black_box(store)
            },
            BatchSize::LargeInput,
        )
    });

    group.finish();
}

fn bench_voting(c: &mut Criterion) {
    let mut group = c.benchmark_group("voting");
    let voters: Vec<Address> = (0..500)
        .map(|i| Address::from_name(&format!("voter_{i}")))
        .collect();

    let mut token = VotesToken::new();
    for voter in &voters {
        token.mint(*voter, U256::from(1_000u64), 1).unwrap();
        token.delegate(*voter, *voter, 1).unwrap();
    }

    group.bench_function("cast_500_votes", |b| {
        b.iter_batched(
            || {
                let governor_addr = Address::from_name("governor");
                let roles = AccessControl::with_members(governor_addr, &[governor_addr], &[OPEN_ROLE]);
                let timelock = TimelockQueue::new(Address::from_name("timelock"), roles, 1);
                let mut governor =
                    GovernorEngine::new(governor_addr, GovernorConfig::default(), timelock).unwrap();
                let id = governor
                    .propose_with_options(
                        voters[0],
                        &[Address::from_name("target")],
                        &[U256::ZERO],
                        &[vec![1, 2, 3]],
                        "bench",
                        OptionKind::Single,
                        &BlockContext::new(2, 24),
                        &token,
                    )
                    .unwrap();
                (governor, id)
            },
            |(mut governor, id)| {
                let ctx = BlockContext::new(3, 36);
                for (i, voter) in voters.iter().enumerate() {
                    governor
                        .cast_vote(&id, *voter, (i % 2) as u32, &ctx, &token)
                        .unwrap();
                }
                black_box(governor.option_votes(&id).unwrap())
            },
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

criterion_group!(benches, bench_checkpoints, bench_voting);
criterion_main!(benches);
