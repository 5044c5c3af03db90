use clouvel_memory::MatchConfig;
use clouvel_memory::MatchLevel;
use clouvel_memory::MatchQuery;
use clouvel_memory::MemoryLifecycleManager;
use clouvel_memory::MemoryStore;
use clouvel_memory::NewMemory;
use clouvel_memory::ReinforcementTracker;
use clouvel_memory::TieredMatcher;
use clouvel_memory::factory::open_project_store;
use clouvel_memory::normalize;
use pretty_assertions::assert_eq;

fn tags(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn seed(store: &MemoryStore) -> (i64, i64, i64) {
    let not_a_function = store
        .create(NewMemory {
            project_name: "shop".to_string(),
            error_signature: "TypeError: <PATH> is not a function".to_string(),
            error_category: "type_error".to_string(),
            tags: tags(&["react", "ssr"]),
            libraries: tags(&["next"]),
            root_cause: "handler imported as default but exported by name".to_string(),
            prevention_rule: "use named imports for route handlers".to_string(),
            ..NewMemory::default()
        })
        .unwrap();
    let hydration = store
        .create(NewMemory {
            project_name: "shop".to_string(),
            error_signature: "Warning: Text content did not match".to_string(),
            error_category: "render".to_string(),
            tags: tags(&["react"]),
            root_cause: "hydration mismatch from Date.now during render".to_string(),
            prevention_rule: "compute time dependent values in an effect".to_string(),
            ..NewMemory::default()
        })
        .unwrap();
    let pool = store
        .create(NewMemory {
            project_name: "billing".to_string(),
            error_signature: "PoolTimeout at <PATH>:<LINE>".to_string(),
            error_category: "database".to_string(),
            libraries: tags(&["sqlalchemy"]),
            root_cause: "connection pool exhausted by leaked sessions".to_string(),
            prevention_rule: "always close sessions in a finally block".to_string(),
            ..NewMemory::default()
        })
        .unwrap();
    (not_a_function, hydration, pool)
}

#[test]
fn recurring_error_is_found_reinforced_and_promoted() {
    let repo = tempfile::tempdir().unwrap();
    let store = open_project_store(repo.path()).unwrap();
    let (id, _, _) = seed(&store);

    let matcher = TieredMatcher::new(&store);
    let outcome = matcher
        .find_matches(&MatchQuery::new("TypeError: /src/app.js is not a function"))
        .unwrap();
    assert_eq!(outcome.levels_evaluated, vec![MatchLevel::ExactSignature]);
    assert_eq!(outcome.candidates.len(), 1);
    assert_eq!(outcome.candidates[0].record.id, id);
    assert_eq!(outcome.candidates[0].level, MatchLevel::ExactSignature);

    ReinforcementTracker::new(&store).increment_hit(id).unwrap();
    assert_eq!(store.get(id).unwrap().hit_count, 1);

    let promoted = MemoryLifecycleManager::new(&store)
        .promote_for_sharing(id)
        .unwrap();
    assert_eq!(promoted.root_cause, "handler imported as default but exported by name");
    assert_eq!(promoted.prevention_rule, "use named imports for route handlers");
}

#[test]
fn worded_location_does_not_reach_the_colon_signature() {
    let store = MemoryStore::open_in_memory().unwrap();
    let id = store
        .create(NewMemory {
            error_signature: "TypeError: <PATH> is not a function".to_string(),
            tags: tags(&["frontend", "null-check"]),
            ..NewMemory::default()
        })
        .unwrap();

    // "at" survives normalization, so the signature differs from the stored
    // "TypeError: <PATH> ..." and level 1 cannot fire.
    let text = "TypeError at /src/app.js is not a function";
    assert_eq!(normalize(text), "TypeError at <PATH> is not a function");

    let matcher = TieredMatcher::new(&store);
    let outcome = matcher.find_matches(&MatchQuery::new(text)).unwrap();
    assert!(
        outcome
            .candidates
            .iter()
            .all(|c| c.level != MatchLevel::ExactSignature)
    );

    // The record is still reachable through its tags.
    let query = MatchQuery {
        tags: tags(&["frontend"]),
        ..MatchQuery::new(text)
    };
    let outcome = matcher.find_matches(&query).unwrap();
    assert_eq!(outcome.candidates[0].record.id, id);
    assert_eq!(outcome.candidates[0].level, MatchLevel::TagOverlap);
}

#[test]
fn tags_are_consulted_when_signature_misses() {
    let store = MemoryStore::open_in_memory().unwrap();
    let (not_a_function, hydration, _) = seed(&store);

    let query = MatchQuery {
        tags: tags(&["React", "SSR"]),
        ..MatchQuery::new("ReferenceError: window is not defined")
    };
    let outcome = TieredMatcher::new(&store).find_matches(&query).unwrap();
    let ids: Vec<i64> = outcome.candidates.iter().map(|c| c.record.id).collect();
    assert_eq!(ids, vec![not_a_function, hydration]);
    assert!(
        outcome
            .candidates
            .iter()
            .all(|c| c.level == MatchLevel::TagOverlap)
    );
    assert_eq!(outcome.candidates[0].score, 2.0);
    assert_eq!(outcome.candidates[1].score, 1.0);
    // Two candidates already satisfy min_results, so no full-text pass.
    assert!(!outcome.levels_evaluated.contains(&MatchLevel::FullText));
}

#[test]
fn full_text_fills_in_when_nothing_else_matches() {
    let store = MemoryStore::open_in_memory().unwrap();
    let (_, hydration, _) = seed(&store);

    let outcome = TieredMatcher::new(&store)
        .find_matches(&MatchQuery::new("hydration mismatch on the product page"))
        .unwrap();
    assert_eq!(
        outcome.levels_evaluated,
        vec![MatchLevel::ExactSignature, MatchLevel::FullText]
    );
    assert!(!outcome.full_text_skipped);
    assert_eq!(outcome.candidates.len(), 1);
    assert_eq!(outcome.candidates[0].record.id, hydration);
    assert_eq!(outcome.candidates[0].level, MatchLevel::FullText);
}

#[test]
fn project_filter_and_archival_hide_records() {
    let store = MemoryStore::open_in_memory().unwrap();
    let (_, _, pool) = seed(&store);

    let query = MatchQuery {
        project_name: Some("shop".to_string()),
        ..MatchQuery::new("PoolTimeout at /app/db.py:88")
    };
    let matcher = TieredMatcher::new(&store);
    assert!(matcher.find_matches(&query).unwrap().candidates.is_empty());

    let unscoped = MatchQuery::new("PoolTimeout at /app/db.py:88");
    let found = matcher.find_matches(&unscoped).unwrap();
    assert_eq!(found.candidates[0].record.id, pool);

    MemoryLifecycleManager::new(&store).archive(pool).unwrap();
    assert!(matcher.find_matches(&unscoped).unwrap().candidates.is_empty());
}

#[test]
fn disabling_short_circuit_runs_every_level() {
    let store = MemoryStore::open_in_memory().unwrap();
    let (not_a_function, hydration, _) = seed(&store);

    let config = MatchConfig::default()
        .with_short_circuit(false)
        .with_min_results(5);
    let query = MatchQuery {
        tags: tags(&["react"]),
        ..MatchQuery::new("TypeError: /src/app.js is not a function")
    };
    let outcome = TieredMatcher::with_config(&store, config)
        .find_matches(&query)
        .unwrap();
    assert_eq!(
        outcome.levels_evaluated,
        vec![
            MatchLevel::ExactSignature,
            MatchLevel::TagOverlap,
            MatchLevel::FullText
        ]
    );
    let found: Vec<(i64, MatchLevel)> = outcome
        .candidates
        .iter()
        .map(|c| (c.record.id, c.level))
        .collect();
    // The exact hit keeps level 1 even though its tags also overlap.
    assert_eq!(
        found,
        vec![
            (not_a_function, MatchLevel::ExactSignature),
            (hydration, MatchLevel::TagOverlap)
        ]
    );
}
