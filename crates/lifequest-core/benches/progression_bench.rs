use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lifequest_core::{
    apply_quest_effect, recompute_locked_zones, LevelCurve, LockedZones, PlayerInfo, QuestEffect,
    ZoneRules,
};

fn bench_progression(c: &mut Criterion) {
    let rules = ZoneRules::standard();
    let mut player = PlayerInfo::new("Bench", "bench@example.com");
    for flag in ["HomeworkFound", "EmpathyGiven", "MentorSupport"] {
        player.completed_quests.insert(flag.to_string());
    }

    c.bench_function("apply 1k effects cascading", |b| {
        b.iter(|| {
            let mut p = player.clone();
            for i in 0..1_000u64 {
                p = apply_quest_effect(&p, &QuestEffect::xp(i % 50), LevelCurve::Cascading);
            }
            black_box(p)
        })
    });

    c.bench_function("recompute locked zones", |b| {
        let locked = LockedZones::initial(&rules);
        b.iter(|| black_box(recompute_locked_zones(&player.completed_quests, &locked, &rules)))
    });
}

criterion_group!(benches, bench_progression);
criterion_main!(benches);
