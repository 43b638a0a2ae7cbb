//! Commitment store scenarios through the engine facade
//!
//! Covers the traffic-policy deliberation used to validate the rule
//! language: chained derivations, conjunctions, negated conclusions and
//! contradictions, suspension by entitlement, and idempotent updates.

use std::sync::Arc;

use ludics_engine::{
    CommitmentDraft, Contradiction, CsUpdate, EngineConfig, EraseSpec, InMemoryMoveLog,
    InferenceResult, LocusPath, LudicsEngine, LudicsEvent,
};

const DIALOGUE: &str = "traffic-policy";
const PRO: &str = "Proponent";
const OPP: &str = "Opponent";

fn engine() -> LudicsEngine {
    LudicsEngine::new(EngineConfig::default(), Arc::new(InMemoryMoveLog::new()))
}

async fn commit(engine: &LudicsEngine, owner: &str, facts: &[&str], rules: &[&str]) {
    let mut update = CsUpdate::default();
    for f in facts {
        update = update.add(CommitmentDraft::fact(f));
    }
    for r in rules {
        update = update.add(CommitmentDraft::rule(r));
    }
    engine.apply_to_cs(DIALOGUE, owner, update).await.unwrap();
}

fn derived(result: &InferenceResult) -> Vec<String> {
    let mut out: Vec<String> = result.derived_facts.iter().map(|f| f.label.clone()).collect();
    out.sort();
    out
}

// ── Derivation ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_chain_derives_every_consequence() {
    let engine = engine();
    commit(&engine, PRO, &["A"], &["A -> B", "B -> C"]).await;

    let result = engine.interact_ce(DIALOGUE, PRO).await;
    assert_eq!(derived(&result), vec!["B", "C"]);
    assert!(result.contradictions.is_empty());

    // Query-time only: nothing new is stored
    let listing = engine.list_cs(DIALOGUE, PRO).await;
    assert_eq!(listing.facts.len(), 1);
    assert_eq!(listing.rules.len(), 2);
}

#[tokio::test]
async fn test_traffic_policy_conjunction() {
    let engine = engine();
    commit(
        &engine,
        PRO,
        &["congestion_high", "public_transport_available"],
        &["congestion_high & public_transport_available -> reduce_car_use"],
    )
    .await;

    let result = engine.interact_ce(DIALOGUE, PRO).await;
    assert_eq!(derived(&result), vec!["reduce_car_use"]);
    assert_eq!(result.derived_facts[0].rule, "congestion_high & public_transport_available -> reduce_car_use");
}

#[tokio::test]
async fn test_alternative_rule_spellings() {
    let engine = engine();
    commit(
        &engine,
        PRO,
        &["rain", "cold"],
        &["rain and cold => stay_home", "stay_home → watch_film", "rain, cold ∧ stay_home -> tea"],
    )
    .await;

    let result = engine.interact_ce(DIALOGUE, PRO).await;
    assert_eq!(derived(&result), vec!["stay_home", "tea", "watch_film"]);
    assert!(result.malformed_rules.is_empty());
}

#[tokio::test]
async fn test_circular_rules_terminate() {
    let engine = engine();
    commit(&engine, PRO, &["A"], &["A -> B", "B -> A"]).await;

    let result = engine.interact_ce(DIALOGUE, PRO).await;
    assert_eq!(derived(&result), vec!["B"]);
}

#[tokio::test]
async fn test_malformed_rule_is_reported_not_fatal() {
    let engine = engine();
    commit(&engine, PRO, &["A"], &["A -> B", "no arrow here", "-> C"]).await;

    let result = engine.interact_ce(DIALOGUE, PRO).await;
    assert_eq!(derived(&result), vec!["B"]);
    assert_eq!(result.malformed_rules.len(), 2);
}

// ── Contradictions ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_derived_negation_contradicts_fact() {
    let engine = engine();
    commit(
        &engine,
        OPP,
        &["traffic_good", "accident_reported"],
        &["accident_reported -> not traffic_good"],
    )
    .await;

    let result = engine.interact_ce(DIALOGUE, OPP).await;
    assert_eq!(derived(&result), vec!["not traffic_good"]);
    assert_eq!(
        result.contradictions,
        vec![Contradiction {
            a: "traffic_good".to_string(),
            b: "not traffic_good".to_string(),
        }]
    );
}

#[tokio::test]
async fn test_negated_fact_spellings_contradict() {
    for negated in ["not C", "¬C", "!C"] {
        let engine = engine();
        commit(&engine, PRO, &["A", negated], &["A -> B", "B -> C"]).await;

        let result = engine.interact_ce(DIALOGUE, PRO).await;
        assert_eq!(result.contradictions.len(), 1, "fact {negated:?}");
        assert_eq!(result.contradictions[0].a, "C");
        assert_eq!(result.contradictions[0].b, "not C");
    }
}

#[tokio::test]
async fn test_stores_are_per_owner() {
    let engine = engine();
    commit(&engine, PRO, &["C"], &[]).await;
    commit(&engine, OPP, &["not C"], &[]).await;

    assert!(engine.interact_ce(DIALOGUE, PRO).await.contradictions.is_empty());
    assert!(engine.interact_ce(DIALOGUE, OPP).await.contradictions.is_empty());
}

// ── Entitlement ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_suspended_rule_stops_derivation() {
    let engine = engine();
    commit(&engine, PRO, &["A"], &["A -> B", "B -> C"]).await;

    assert_eq!(engine.set_entitlement(PRO, "B -> C", false).await, 1);
    let result = engine.interact_ce(DIALOGUE, PRO).await;
    assert_eq!(derived(&result), vec!["B"]);

    // Suspension keeps the element
    assert_eq!(engine.list_cs(DIALOGUE, PRO).await.rules.len(), 2);

    assert_eq!(engine.set_entitlement(PRO, "  B -> C ", true).await, 1);
    let result = engine.interact_ce(DIALOGUE, PRO).await;
    assert_eq!(derived(&result), vec!["B", "C"]);
}

#[tokio::test]
async fn test_suspended_premise_withdraws_conclusion() {
    let engine = engine();
    commit(&engine, PRO, &["A"], &["A -> B"]).await;
    assert_eq!(derived(&engine.interact_ce(DIALOGUE, PRO).await), vec!["B"]);

    assert_eq!(engine.set_entitlement(PRO, "A", false).await, 1);
    let result = engine.interact_ce(DIALOGUE, PRO).await;
    assert!(result.derived_facts.is_empty());
    assert!(result.contradictions.is_empty());
    assert_eq!(engine.list_cs(DIALOGUE, PRO).await.facts.len(), 1);
}

#[tokio::test]
async fn test_suspended_fact_removes_contradiction() {
    let engine = engine();
    commit(&engine, PRO, &["C", "not C"], &[]).await;
    assert_eq!(engine.interact_ce(DIALOGUE, PRO).await.contradictions.len(), 1);

    engine.set_entitlement(PRO, "not C", false).await;
    assert!(engine.interact_ce(DIALOGUE, PRO).await.contradictions.is_empty());
}

#[tokio::test]
async fn test_unknown_label_matches_nothing() {
    let engine = engine();
    commit(&engine, PRO, &["A"], &[]).await;
    assert_eq!(engine.set_entitlement(PRO, "missing", false).await, 0);
    assert_eq!(engine.set_entitlement(OPP, "A", false).await, 0);
}

// ── Updates ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_update_replaces_element_in_one_call() {
    let engine = engine();
    let mut rx = engine.subscribe();
    commit(&engine, PRO, &["speed_limit_50"], &[]).await;

    let applied = engine
        .apply_to_cs(
            DIALOGUE,
            PRO,
            CsUpdate::default()
                .erase(EraseSpec::Label("speed_limit_50".to_string()))
                .add(CommitmentDraft::fact("speed_limit_30")),
        )
        .await
        .unwrap();
    assert_eq!(applied.erased, 1);
    assert_eq!(applied.added.len(), 1);

    let listing = engine.list_cs(DIALOGUE, PRO).await;
    let labels: Vec<&str> = listing.facts.iter().map(|f| f.label.as_str()).collect();
    assert_eq!(labels, vec!["speed_limit_30"]);

    let mut updates = 0;
    while let Ok(event) = rx.try_recv() {
        if matches!(event, LudicsEvent::CsUpdated { .. }) {
            updates += 1;
        }
    }
    assert_eq!(updates, 2);
}

#[tokio::test]
async fn test_repeated_add_is_idempotent() {
    let engine = engine();
    let at = LocusPath::parse("0.2").unwrap();
    let update = CsUpdate::default().add(CommitmentDraft::fact("A").at(at.clone()));

    let first = engine.apply_to_cs(DIALOGUE, PRO, update.clone()).await.unwrap();
    let second = engine.apply_to_cs(DIALOGUE, PRO, update).await.unwrap();
    assert_eq!(first.added.len(), 1);
    assert!(second.added.is_empty());
    assert_eq!(second.duplicates, 1);

    let listing = engine.list_cs(DIALOGUE, PRO).await;
    assert_eq!(listing.facts.len(), 1);
    assert_eq!(listing.facts[0].base_locus, at);
    assert!(engine.store().get_locus(DIALOGUE, &at).await.is_none());
}

#[tokio::test]
async fn test_erase_by_locus() {
    let engine = engine();
    let at = LocusPath::parse("0.3").unwrap();
    engine
        .apply_to_cs(
            DIALOGUE,
            PRO,
            CsUpdate::default()
                .add(CommitmentDraft::fact("A").at(at.clone()))
                .add(CommitmentDraft::fact("B")),
        )
        .await
        .unwrap();

    let applied = engine
        .apply_to_cs(DIALOGUE, PRO, CsUpdate::default().erase(EraseSpec::Locus(at)))
        .await
        .unwrap();
    assert_eq!(applied.erased, 1);
    assert_eq!(engine.list_cs(DIALOGUE, PRO).await.facts[0].label, "B");
}
