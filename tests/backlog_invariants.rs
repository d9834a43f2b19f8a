//! Property-style checks on backlog selection and persistence.

use ada_harness::backlog::{
    is_stuck, select_next, validate, Backlog, BacklogStore, Feature, FeatureStatus,
};
use tempfile::TempDir;

fn backlog_with(features: Vec<Feature>) -> Backlog {
    let mut b = Backlog::new("props", "/tmp/props");
    b.features = features;
    b
}

/// Deterministic little generator so the sweep covers varied shapes without
/// pulling in a property-testing framework.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    fn pick(&mut self, bound: u64) -> u64 {
        self.next() % bound.max(1)
    }
}

fn random_backlog(seed: u64) -> Backlog {
    let mut rng = Lcg(seed);
    let n = 2 + rng.pick(8) as usize;
    let mut features = Vec::new();
    for i in 0..n {
        let mut f = Feature::new(format!("f{i}"), format!("Feature {i}"))
            .with_priority(rng.pick(10) as i32);
        // Depend only on earlier features, so the graph stays acyclic.
        for j in 0..i {
            if rng.pick(4) == 0 {
                f.depends_on.push(format!("f{j}"));
            }
        }
        f.status = match rng.pick(4) {
            0 => FeatureStatus::Pending,
            1 => FeatureStatus::InProgress,
            2 => FeatureStatus::Completed,
            _ => FeatureStatus::Blocked,
        };
        features.push(f);
    }
    backlog_with(features)
}

#[test]
fn select_next_never_returns_feature_with_unmet_dependencies() {
    for seed in 0..200 {
        let backlog = random_backlog(seed);
        if let Some(selected) = select_next(&backlog) {
            assert!(
                matches!(
                    selected.status,
                    FeatureStatus::Pending | FeatureStatus::InProgress
                ),
                "seed {seed}: selected a {:?} feature",
                selected.status
            );
            for dep in &selected.depends_on {
                assert_eq!(
                    backlog.feature(dep).unwrap().status,
                    FeatureStatus::Completed,
                    "seed {seed}: dependency {dep} not completed"
                );
            }
        }
    }
}

#[test]
fn select_next_is_a_total_order_over_runnable_features() {
    for seed in 0..200 {
        let backlog = random_backlog(seed);
        let Some(selected) = select_next(&backlog) else {
            continue;
        };

        let completed: Vec<&str> = backlog
            .features
            .iter()
            .filter(|f| f.status == FeatureStatus::Completed)
            .map(|f| f.id.as_str())
            .collect();
        let runnable: Vec<&Feature> = backlog
            .features
            .iter()
            .filter(|f| {
                matches!(f.status, FeatureStatus::Pending | FeatureStatus::InProgress)
                    && f.depends_on.iter().all(|d| completed.contains(&d.as_str()))
            })
            .collect();

        // The winner dominates every other runnable feature under the
        // (in-progress, priority, insertion) order.
        let rank = |f: &Feature, index: usize| {
            (f.status != FeatureStatus::InProgress, -(f.priority as i64), index)
        };
        let selected_index = backlog
            .features
            .iter()
            .position(|f| f.id == selected.id)
            .unwrap();
        for other in &runnable {
            let other_index = backlog
                .features
                .iter()
                .position(|f| f.id == other.id)
                .unwrap();
            assert!(
                rank(selected, selected_index) <= rank(other, other_index),
                "seed {seed}: {} should not beat {}",
                other.id,
                selected.id
            );
        }
    }
}

#[test]
fn persisted_backlog_round_trips_exactly() {
    for seed in 0..50 {
        let backlog = random_backlog(seed);
        let temp = TempDir::new().unwrap();
        let store = BacklogStore::new(temp.path().join("feature-list.json"));
        store.save(&backlog).unwrap();
        let reloaded = store.load().unwrap();
        assert_eq!(reloaded, backlog, "seed {seed}");

        // Saving the reload produces identical bytes.
        let first = std::fs::read(store.path()).unwrap();
        store.save(&reloaded).unwrap();
        let second = std::fs::read(store.path()).unwrap();
        assert_eq!(first, second, "seed {seed}");
    }
}

#[test]
fn sessions_spent_is_monotone_under_mutation_sequences() {
    let temp = TempDir::new().unwrap();
    let store = BacklogStore::new(temp.path().join("feature-list.json"));
    let mut backlog = backlog_with(vec![Feature::new("a", "A")]);
    let mut rng = Lcg(7);
    let mut last = 0;

    for _ in 0..50 {
        match rng.pick(3) {
            0 => store.mark_started(&mut backlog, "a").unwrap(),
            1 => store
                .update_feature(&mut backlog, "a", |f| f.implementation_notes.push("n".into()))
                .unwrap(),
            _ => store
                .update_feature(&mut backlog, "a", |f| {
                    // Hostile mutator tries to rewind the counter.
                    f.sessions_spent = f.sessions_spent.saturating_sub(1)
                })
                .unwrap(),
        }
        let spent = backlog.feature("a").unwrap().sessions_spent;
        assert!(spent >= last, "sessions_spent decreased: {last} -> {spent}");
        last = spent;
    }
}

#[test]
fn completed_features_cannot_regress() {
    let temp = TempDir::new().unwrap();
    let store = BacklogStore::new(temp.path().join("feature-list.json"));
    let mut backlog = backlog_with(vec![Feature::new("a", "A")]);
    store.mark_completed(&mut backlog, "a", None).unwrap();

    assert!(store.mark_started(&mut backlog, "a").is_err());
    assert!(store
        .mark_blocked(&mut backlog, "a", "nope".into())
        .is_err());
    assert!(store
        .update_feature(&mut backlog, "a", |f| f.status = FeatureStatus::Pending)
        .is_err());
    assert_eq!(
        backlog.feature("a").unwrap().status,
        FeatureStatus::Completed
    );
}

#[test]
fn stuck_detection_distinguishes_done_from_wedged() {
    // All completed: not stuck.
    let mut done = backlog_with(vec![Feature::new("a", "A")]);
    done.feature_mut("a").unwrap().status = FeatureStatus::Completed;
    assert!(!is_stuck(&done));

    // Pending behind a blocked dependency: stuck.
    let mut wedged = backlog_with(vec![
        Feature::new("a", "A"),
        Feature::new("b", "B").with_depends_on(vec!["a".to_string()]),
    ]);
    wedged.feature_mut("a").unwrap().status = FeatureStatus::Blocked;
    assert!(is_stuck(&wedged));

    // Everything blocked outright: drained, not stuck.
    let mut all_blocked = backlog_with(vec![Feature::new("a", "A")]);
    all_blocked.feature_mut("a").unwrap().status = FeatureStatus::Blocked;
    assert!(!is_stuck(&all_blocked));

    // Plain runnable backlog: not stuck.
    let open = backlog_with(vec![Feature::new("a", "A")]);
    assert!(!is_stuck(&open));
}

#[test]
fn validation_matches_select_next_assumptions() {
    // validate() accepting a backlog implies select_next() terminates and
    // never panics on it.
    for seed in 0..100 {
        let backlog = random_backlog(seed);
        validate(&backlog).unwrap();
        let _ = select_next(&backlog);
    }
}
