//! End-to-end properties of compilation, appends and traversal
//!
//! Exercises the engine facade the way a deliberation service would:
//! compile a move log, play the resulting designs, and check the recorded
//! traces. Hand-built designs cover the act-level invariants: additive
//! exclusivity, alternation, visibility, convergence and divergence.

use std::sync::Arc;

use chrono::{Duration, Utc};
use ludics_engine::state::ActMeta;
use ludics_engine::stepper::EndorsementBasis;
use ludics_engine::{
    ActDraft, AppendOptions, CommitmentDraft, CompositionMode, CsUpdate, Design, DialogueMove, EngineConfig, InMemoryMoveLog,
    LocusPath, LudicsEngine, LudicsError, LudicsEvent, Participant, Phase, Polarity, StepOptions,
    TraversalReason, TraversalStatus,
};

const DIALOGUE: &str = "delib-1";

fn p(s: &str) -> LocusPath {
    LocusPath::parse(s).unwrap()
}

fn engine_with(moves: Vec<DialogueMove>) -> LudicsEngine {
    LudicsEngine::new(
        EngineConfig::default(),
        Arc::new(InMemoryMoveLog::from_moves(moves)),
    )
}

fn empty_engine() -> LudicsEngine {
    engine_with(Vec::new())
}

/// Moves spaced one second apart so log order is unambiguous
fn timed(moves: Vec<DialogueMove>) -> Vec<DialogueMove> {
    let base = Utc::now();
    moves
        .into_iter()
        .enumerate()
        .map(|(i, m)| m.at(base + Duration::seconds(i as i64)))
        .collect()
}

fn claim_and_challenge() -> Vec<DialogueMove> {
    timed(vec![
        DialogueMove::new(DIALOGUE, "ASSERT")
            .with_target("claim", "c1")
            .with_actor("alice")
            .with_text("Traffic is bad")
            .terminal(),
        DialogueMove::new(DIALOGUE, "WHY")
            .with_target("claim", "c1")
            .with_actor("bob")
            .with_text("Why?"),
    ])
}

/// Empty Proponent/Opponent pair registered in the store
async fn design_pair(engine: &LudicsEngine) -> (Design, Design) {
    engine.store().ensure_root(DIALOGUE).await;
    let pro = Design::new(DIALOGUE, Participant::Proponent);
    let opp = Design::new(DIALOGUE, Participant::Opponent);
    engine.store().put_design(pro.clone()).await;
    engine.store().put_design(opp.clone()).await;
    (pro, opp)
}

async fn append(engine: &LudicsEngine, design: &Design, drafts: Vec<ActDraft>) {
    engine
        .append_acts(&design.id, drafts, &AppendOptions::default())
        .await
        .unwrap();
}

// ── Property: compilation is idempotent ─────────────────────────────────

#[tokio::test]
async fn test_recompile_yields_same_shape_with_fresh_ids() {
    let engine = engine_with(claim_and_challenge());

    let first = engine.compile_from_moves(DIALOGUE).await.unwrap();
    let second = engine.compile_from_moves(DIALOGUE).await.unwrap();

    assert_eq!(first.scopes.len(), second.scopes.len());
    assert_eq!(first.designs.len(), 2);
    assert_eq!(second.designs.len(), 2);
    assert_ne!(first.designs, second.designs);
    for (a, b) in first.scopes.iter().zip(&second.scopes) {
        assert_eq!(a.scope, b.scope);
        assert_eq!(a.move_count, b.move_count);
        assert_eq!(a.act_count, b.act_count);
    }

    // Only the latest designs survive
    let designs = engine.store().list_designs(DIALOGUE).await;
    assert_eq!(designs.len(), 2);
    assert!(designs.iter().all(|d| second.designs.contains(&d.id)));

    let pro = &second.scopes[0].proponent_design_id;
    let acts = engine.store().list_acts(pro).await.unwrap();
    assert_eq!(acts.len(), 2, "claim plus closing daimon");
    assert!(acts[1].is_daimon());
}

#[tokio::test]
async fn test_concurrent_compiles_leave_one_design_set() {
    let engine = engine_with(claim_and_challenge());

    let (a, b) = tokio::join!(
        engine.compile_from_moves(DIALOGUE),
        engine.compile_from_moves(DIALOGUE)
    );
    a.unwrap();
    let b = b.unwrap();

    let designs = engine.store().list_designs(DIALOGUE).await;
    assert_eq!(designs.len(), 2);
    assert!(designs.iter().all(|d| b.designs.contains(&d.id)));
    assert_eq!(engine.compile_lock().active_keys(), 0);
}

// ── Property: alternation is enforced when configured ───────────────────

#[tokio::test]
async fn test_compile_with_alternation_skips_same_polarity_runs() {
    let moves = timed(vec![
        DialogueMove::new(DIALOGUE, "ASSERT")
            .with_target("claim", "c1")
            .with_text("first"),
        DialogueMove::new(DIALOGUE, "ASSERT")
            .with_target("claim", "c2")
            .with_text("second"),
        DialogueMove::new(DIALOGUE, "WHY")
            .with_target("claim", "c1")
            .with_text("why first?"),
    ]);
    let config = EngineConfig {
        enforce_alternation: true,
        ..EngineConfig::default()
    };
    let engine = LudicsEngine::new(config, Arc::new(InMemoryMoveLog::from_moves(moves)));

    let outcome = engine.compile_from_moves(DIALOGUE).await.unwrap();
    assert_eq!(outcome.skipped_alternation.len(), 1);

    for design_id in &outcome.designs {
        let acts = engine.store().list_acts(design_id).await.unwrap();
        let polarities: Vec<Polarity> = acts.iter().filter_map(|a| a.polarity()).collect();
        for w in polarities.windows(2) {
            assert_ne!(w[0], w[1], "adjacent acts share a polarity in {design_id}");
        }
    }
}

#[tokio::test]
async fn test_append_rejects_same_polarity_when_alternating() {
    let engine = empty_engine();
    let (pro, _) = design_pair(&engine).await;
    let options = AppendOptions::default().alternating(true);

    engine
        .append_acts(&pro.id, vec![ActDraft::positive(p("0.1"), "a")], &options)
        .await
        .unwrap();
    let err = engine
        .append_acts(&pro.id, vec![ActDraft::positive(p("0.2"), "b")], &options)
        .await
        .unwrap_err();
    assert!(matches!(err, LudicsError::Alternation { polarity: Polarity::Positive, .. }));

    // A daimon in between breaks the run
    engine
        .append_acts(
            &pro.id,
            vec![ActDraft::daimon("END"), ActDraft::positive(p("0.2"), "b")],
            &options,
        )
        .await
        .unwrap();
}

// ── Property: additive loci resolve to one child ────────────────────────

#[tokio::test]
async fn test_additive_locus_accepts_one_child() {
    let engine = empty_engine();
    let (pro, opp) = design_pair(&engine).await;

    append(
        &engine,
        &pro,
        vec![
            ActDraft::positive(p("0.1"), "choose")
                .with_ramification(["1", "2"])
                .additive(true),
            ActDraft::positive(p("0.1.1"), "left"),
        ],
    )
    .await;

    // Same child again is fine, from either design
    append(&engine, &opp, vec![ActDraft::negative(p("0.1.1"), "ok")]).await;

    let before = engine.store().list_acts(&pro.id).await.unwrap().len();
    let err = engine
        .append_acts(
            &pro.id,
            vec![
                ActDraft::positive(p("0.3"), "unrelated"),
                ActDraft::positive(p("0.1.2"), "right"),
            ],
            &AppendOptions::default(),
        )
        .await
        .unwrap_err();
    match err {
        LudicsError::AdditiveReuse { parent, existing, attempted, .. } => {
            assert_eq!(parent, "0.1");
            assert_eq!(existing, "0.1.1");
            assert_eq!(attempted, "0.1.2");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    // The rejected batch wrote nothing
    let after = engine.store().list_acts(&pro.id).await.unwrap().len();
    assert_eq!(before, after);
    assert!(engine.store().get_locus(DIALOGUE, &p("0.3")).await.is_none());
}

#[tokio::test]
async fn test_commitment_locus_does_not_claim_additive_child() {
    let engine = empty_engine();
    let (pro, _opp) = design_pair(&engine).await;
    append(
        &engine,
        &pro,
        vec![
            ActDraft::positive(p("0.1"), "choose").additive(true),
            ActDraft::positive(p("0.1.1"), "left"),
        ],
    )
    .await;

    engine
        .apply_to_cs(
            DIALOGUE,
            "Proponent",
            CsUpdate::default().add(CommitmentDraft::fact("right_lane").at(p("0.1.2"))),
        )
        .await
        .unwrap();
    assert!(engine.store().get_locus(DIALOGUE, &p("0.1.2")).await.is_none());

    append(&engine, &pro, vec![ActDraft::positive(p("0.1.1"), "left again")]).await;
    assert_eq!(engine.store().list_acts(&pro.id).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_unrooted_locus_never_reaches_the_tree() {
    let engine = empty_engine();
    let (pro, _opp) = design_pair(&engine).await;

    let mut raw = serde_json::to_value(ActDraft::positive(p("0.1"), "stray")).unwrap();
    raw["body"]["locus"] = serde_json::json!("7.3");
    assert!(serde_json::from_value::<ActDraft>(raw).is_err());
    assert!(LocusPath::parse("7.3").is_err());

    let out = engine
        .append_acts(&pro.id, vec![ActDraft::positive(p("0.7.3"), "nested")], &AppendOptions::default())
        .await
        .unwrap();
    assert_eq!(out.created_loci, vec![p("0.7"), p("0.7.3")]);
    let loci: Vec<String> = engine
        .store()
        .list_loci(DIALOGUE)
        .await
        .into_iter()
        .map(|l| l.path.to_string())
        .collect();
    assert_eq!(loci, vec!["0", "0.7", "0.7.3"]);
}

#[tokio::test]
async fn test_additive_choice_carries_across_traces() {
    let engine = empty_engine();
    let (pro, opp) = design_pair(&engine).await;
    let loose = AppendOptions::default().additive_once(false);

    engine
        .append_acts(
            &pro.id,
            vec![
                ActDraft::positive(p("0.1"), "choose").additive(true),
                ActDraft::positive(p("0.1.1"), "left"),
                ActDraft::positive(p("0.1.2"), "right"),
            ],
            &loose,
        )
        .await
        .unwrap();
    engine
        .append_acts(
            &opp.id,
            vec![
                ActDraft::negative(p("0.1"), "which?"),
                ActDraft::negative(p("0.1.1"), "left?"),
                ActDraft::negative(p("0.1.2"), "right?"),
            ],
            &loose,
        )
        .await
        .unwrap();

    // First run only explores the right branch
    let first = engine
        .step_interaction(
            &StepOptions::new(DIALOGUE)
                .pair(&pro.id, &opp.id)
                .phase(Phase::FocusP)
                .focus_at(p("0.1.2")),
        )
        .await
        .unwrap();
    assert_eq!(first.pairs.len(), 1);
    assert_eq!(first.used_additive.get("0.1").map(String::as_str), Some("2"));

    // The recorded choice forbids the left branch afterwards
    let second = engine
        .step_interaction(&StepOptions::new(DIALOGUE).pair(&pro.id, &opp.id).phase(Phase::FocusP))
        .await
        .unwrap();
    assert_eq!(second.status, TraversalStatus::Divergent);
    assert_eq!(second.reason, Some(TraversalReason::AdditiveViolation));
    assert_eq!(second.pairs.len(), 1);
    assert_eq!(second.pairs[0].locus_path, p("0.1"));
}

// ── Property: justifications must be visible ────────────────────────────

#[tokio::test]
async fn test_visibility_names_offending_act() {
    let engine = empty_engine();
    let (pro, _) = design_pair(&engine).await;

    let outcome = engine
        .append_acts(
            &pro.id,
            vec![
                ActDraft::positive(p("0.1"), "early").justified_by(p("0.5")),
                ActDraft::positive(p("0.5"), "late"),
            ],
            &AppendOptions::default(),
        )
        .await
        .unwrap();

    match engine.validate_visibility(&pro.id).await.unwrap_err() {
        LudicsError::Visibility { act_id, justified_by, .. } => {
            assert_eq!(act_id, outcome.appended[0]);
            assert_eq!(justified_by, "0.5");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_compiled_designs_are_visible() {
    let engine = engine_with(claim_and_challenge());
    let outcome = engine.compile_from_moves(DIALOGUE).await.unwrap();
    assert!(outcome.visibility_violations.is_empty());
    for design_id in &outcome.designs {
        engine.validate_visibility(design_id).await.unwrap();
    }
}

// ── Property: convergence and endorsement ───────────────────────────────

#[tokio::test]
async fn test_claim_then_daimon_against_ack_converges() {
    let engine = empty_engine();
    let (pro, opp) = design_pair(&engine).await;
    append(
        &engine,
        &pro,
        vec![ActDraft::positive(LocusPath::root(), "claim"), ActDraft::daimon("END")],
    )
    .await;
    append(&engine, &opp, vec![ActDraft::negative(LocusPath::root(), "ack")]).await;

    let result = engine
        .step_interaction(&StepOptions::new(DIALOGUE).pair(&pro.id, &opp.id))
        .await
        .unwrap();

    assert_eq!(result.status, TraversalStatus::Convergent);
    assert_eq!(result.reason, None);
    assert_eq!(result.pairs.len(), 1);
    let endorsement = result.endorsement.unwrap();
    assert_eq!(endorsement.participant, Participant::Opponent);
    assert_eq!(endorsement.basis, EndorsementBasis::Acknowledgment);
    assert_eq!(endorsement.locus_path, LocusPath::root());

    let report = engine.check_orthogonal(DIALOGUE, &pro.id, &opp.id).await.unwrap();
    assert!(report.orthogonal);
}

#[tokio::test]
async fn test_compiled_dialogue_converges_on_terminal_assert() {
    let engine = engine_with(claim_and_challenge());
    let mut rx = engine.subscribe();
    let outcome = engine.compile_from_moves(DIALOGUE).await.unwrap();

    let result = engine.step_interaction(&StepOptions::new(DIALOGUE)).await.unwrap();
    assert_eq!(result.status, TraversalStatus::Convergent);
    assert_eq!(result.pos_design_id, outcome.scopes[0].proponent_design_id);
    assert_eq!(result.pairs.len(), 1);
    assert_eq!(result.pairs[0].locus_path, p("0.1"));
    let endorsement = result.endorsement.clone().unwrap();
    assert_eq!(endorsement.participant, Participant::Proponent);
    assert_eq!(endorsement.basis, EndorsementBasis::Daimon);

    assert_eq!(result.expression_pairs.len(), 1);
    assert_eq!(result.expression_pairs[0].positive, "Traffic is bad");
    assert_eq!(result.expression_pairs[0].negative, "Why?");

    // Trace persisted and announced
    let traces = engine.store().list_traces(DIALOGUE).await;
    assert_eq!(traces.len(), 1);
    assert_eq!(traces[0].id, result.trace_id);

    let mut saw_traversal = false;
    while let Ok(event) = rx.try_recv() {
        if let LudicsEvent::Traversal { trace_id, pair_count, .. } = event {
            assert_eq!(trace_id, result.trace_id);
            assert_eq!(pair_count, 1);
            saw_traversal = true;
        }
    }
    assert!(saw_traversal);
}

#[tokio::test]
async fn test_acknowledgment_marker_in_meta() {
    let engine = empty_engine();
    let (pro, opp) = design_pair(&engine).await;
    append(
        &engine,
        &pro,
        vec![ActDraft::positive(p("0.1"), "claim"), ActDraft::daimon("END")],
    )
    .await;
    append(
        &engine,
        &opp,
        vec![ActDraft::negative(p("0.1"), "fine by me").with_meta(ActMeta {
            ack: true,
            ..ActMeta::default()
        })],
    )
    .await;

    let result = engine
        .step_interaction(&StepOptions::new(DIALOGUE).pair(&pro.id, &opp.id))
        .await
        .unwrap();
    let endorsement = result.endorsement.unwrap();
    assert_eq!(endorsement.participant, Participant::Opponent);
    assert_eq!(endorsement.locus_path, p("0.1"));
}

// ── Property: divergence on a missing dual ──────────────────────────────

#[tokio::test]
async fn test_missing_dual_diverges() {
    let engine = empty_engine();
    let (pro, opp) = design_pair(&engine).await;
    append(&engine, &pro, vec![ActDraft::positive(p("0.1"), "claim")]).await;
    append(&engine, &opp, vec![ActDraft::negative(p("0.2"), "elsewhere")]).await;

    let result = engine
        .step_interaction(&StepOptions::new(DIALOGUE).pair(&pro.id, &opp.id))
        .await
        .unwrap();
    assert_eq!(result.status, TraversalStatus::Divergent);
    assert_eq!(result.reason, Some(TraversalReason::IncoherentMove));
    assert!(result.pairs.is_empty());
    assert!(result.endorsement.is_none());

    let report = engine.check_orthogonal(DIALOGUE, &pro.id, &opp.id).await.unwrap();
    assert!(!report.orthogonal);
}

#[tokio::test]
async fn test_virtual_negative_and_draw() {
    let engine = empty_engine();
    let (pro, opp) = design_pair(&engine).await;
    append(&engine, &pro, vec![ActDraft::positive(p("0.1"), "claim")]).await;

    let virtual_run = engine
        .step_interaction(
            &StepOptions::new(DIALOGUE)
                .pair(&pro.id, &opp.id)
                .virtual_negative(p("0.1")),
        )
        .await
        .unwrap();
    assert_eq!(virtual_run.pairs.len(), 1);
    assert!(virtual_run.pairs[0].synthetic);
    assert_eq!(virtual_run.pairs[0].neg_act_id, "virtual:0.1");
    assert_eq!(virtual_run.status, TraversalStatus::Stuck);
    assert_eq!(virtual_run.reason, Some(TraversalReason::NoResponse));

    let draw = engine
        .step_interaction(&StepOptions::new(DIALOGUE).pair(&pro.id, &opp.id).draw_at(p("0.1")))
        .await
        .unwrap();
    assert_eq!(draw.status, TraversalStatus::Divergent);
    assert_eq!(draw.reason, Some(TraversalReason::ConsensusDraw));
}

#[tokio::test]
async fn test_zero_fuel_is_unfinished() {
    let engine = empty_engine();
    let (pro, opp) = design_pair(&engine).await;
    append(&engine, &pro, vec![ActDraft::positive(p("0.1"), "claim")]).await;

    let result = engine
        .step_interaction(&StepOptions::new(DIALOGUE).pair(&pro.id, &opp.id).fuel(0))
        .await
        .unwrap();
    assert!(result.is_unfinished());
    assert_eq!(result.reason, None);
}

// ── Property: composition modes ─────────────────────────────────────────

async fn colliding_pair(engine: &LudicsEngine) -> (Design, Design) {
    let (pro, opp) = design_pair(engine).await;
    append(
        engine,
        &pro,
        vec![
            ActDraft::positive(LocusPath::root(), "claim").with_ramification(["1"]),
            ActDraft::daimon("END"),
        ],
    )
    .await;
    append(
        engine,
        &opp,
        vec![
            ActDraft::negative(LocusPath::root(), "hm"),
            ActDraft::positive(LocusPath::root(), "counter").with_ramification(["1", "2"]),
        ],
    )
    .await;
    (pro, opp)
}

#[tokio::test]
async fn test_partial_composition_refuses_collisions() {
    let engine = empty_engine();
    let (pro, opp) = colliding_pair(&engine).await;

    let collisions = engine.detect_collisions(&pro.id, &opp.id).await.unwrap();
    assert_eq!(collisions.len(), 1);
    assert_eq!(collisions[0].overlap, vec!["1"]);

    let result = engine
        .step_interaction(
            &StepOptions::new(DIALOGUE)
                .pair(&pro.id, &opp.id)
                .composition(CompositionMode::Partial),
        )
        .await
        .unwrap();
    assert_eq!(result.status, TraversalStatus::Divergent);
    assert_eq!(result.reason, Some(TraversalReason::DirCollision));
    assert!(result.pairs.is_empty());
    assert_eq!(result.collisions, collisions);
}

#[tokio::test]
async fn test_spiritual_composition_reports_and_plays() {
    let engine = empty_engine();
    let (pro, opp) = colliding_pair(&engine).await;

    let result = engine
        .step_interaction(
            &StepOptions::new(DIALOGUE)
                .pair(&pro.id, &opp.id)
                .composition(CompositionMode::Spiritual),
        )
        .await
        .unwrap();
    assert_eq!(result.collisions.len(), 1);
    assert_eq!(result.status, TraversalStatus::Convergent);

    let assoc = engine
        .step_interaction(&StepOptions::new(DIALOGUE).pair(&pro.id, &opp.id))
        .await
        .unwrap();
    assert!(assoc.collisions.is_empty());
}

// ── Property: stale design ids resolve to the current pair ──────────────

#[tokio::test]
async fn test_stale_ids_fall_back_to_current_pair() {
    let engine = engine_with(claim_and_challenge());
    let old = engine.compile_from_moves(DIALOGUE).await.unwrap();
    let new = engine.compile_from_moves(DIALOGUE).await.unwrap();

    let result = engine
        .step_interaction(&StepOptions::new(DIALOGUE).pair(
            &old.scopes[0].proponent_design_id,
            &old.scopes[0].opponent_design_id,
        ))
        .await
        .unwrap();
    assert_eq!(result.pos_design_id, new.scopes[0].proponent_design_id);
    assert_eq!(result.neg_design_id, new.scopes[0].opponent_design_id);
}

#[tokio::test]
async fn test_step_without_designs_fails() {
    let engine = empty_engine();
    let err = engine
        .step_interaction(&StepOptions::new(DIALOGUE))
        .await
        .unwrap_err();
    assert!(matches!(err, LudicsError::NoSuchDesign { .. }));
}
