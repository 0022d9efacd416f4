use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use punchline::pipeline::{
    run, run_pipeline, run_pipeline_with_trace_file, ModelChoices, PipelineError,
    PipelineRequest, RunOptions, RunStatus,
};
use punchline::plansearch::callers as ps;
use punchline::scoring::callers as sc;
use punchline::scoring::{FunninessScore, FunninessVerdict, NoveltyScore, PerceivedSource, WebCheck};
use punchline::search::FixedSearchGateway;
use punchline::ScriptedChatGateway;
use tempfile::tempdir;

const JUDGE_GOOD: &str = r#"{"originality": 7, "coherence": 8, "setup_effectiveness": 7, "punchline_impact": 8, "brevity": 9, "overall_funniness": 8, "rationale": "Tight and surprising."}"#;
const JUDGE_OK: &str = r#"{"originality": 5, "coherence": 6, "setup_effectiveness": 5, "punchline_impact": 5, "brevity": 7, "overall_funniness": 5, "rationale": "Serviceable."}"#;

/// Scripted coffee run: every plan gets a distinct joke, every refinement
/// differs from its original, and the judge prefers refined jokes.
fn coffee_gateway() -> ScriptedChatGateway {
    let plans = Arc::new(AtomicUsize::new(0));
    let jokes = Arc::new(AtomicUsize::new(0));
    let refines = Arc::new(AtomicUsize::new(0));

    ScriptedChatGateway::new()
        .on(ps::OBSERVATIONS, |req| {
            if req.user_text().contains("<initial_observations>") {
                "derived one\nderived two\nderived three".to_string()
            } else {
                "beans\ncrema\ndecaf\nbarista".to_string()
            }
        })
        .on(ps::PLAN, move |_| {
            format!("plan {}", plans.fetch_add(1, Ordering::SeqCst))
        })
        .on(ps::JOKE, move |_| {
            format!("original joke {}", jokes.fetch_add(1, Ordering::SeqCst))
        })
        .reply(ps::CRITIQUE, "The punchline arrives too early.")
        .on(ps::REFINE, move |_| {
            format!("refined joke {}", refines.fetch_add(1, Ordering::SeqCst))
        })
        .reply(sc::NOVELTY, "0.8")
        .on(sc::FUNNINESS, |req| {
            if req.user_text().contains("refined joke") {
                JUDGE_GOOD.to_string()
            } else {
                JUDGE_OK.to_string()
            }
        })
}

fn coffee_request() -> PipelineRequest {
    let mut req = PipelineRequest::new("coffee", ModelChoices::uniform("openai/gpt-4o-mini"));
    req.plansearch.num_first_order_obs = 3;
    req
}

#[tokio::test]
async fn coffee_run_ranks_fused_scores() {
    let gateway = coffee_gateway();
    let search = FixedSearchGateway::hits(0);

    let session = run_pipeline(&gateway, Some(&search), RunOptions::default(), coffee_request())
        .await
        .unwrap();

    assert_eq!(session.status, RunStatus::Completed);
    // 3 seed + 6 combinations * 2 derived.
    assert_eq!(session.observations.len(), 15);
    assert_eq!(session.plans.len(), 5);
    assert_eq!(session.candidates.len(), 10);

    assert_eq!(session.results.len(), 3);
    let ranks: Vec<usize> = session.results.iter().map(|r| r.rank).collect();
    assert_eq!(ranks, vec![1, 2, 3]);
    // Refined jokes win; ties keep candidate order.
    let ids: Vec<usize> = session.results.iter().map(|r| r.candidate.id).collect();
    assert_eq!(ids, vec![1, 3, 5]);

    for result in &session.results {
        assert!(result.candidate.refined);
        assert_eq!(result.novelty.web_found_penalty, 0.0);
        assert_eq!(result.novelty.web_hits(), Some(0));
        assert_eq!(result.novelty.perceived_source, PerceivedSource::Model);
        assert!((result.novelty.final_score - 0.8).abs() < 1e-9);
        assert_eq!(result.funniness.overall_funniness, 8);
        assert!((result.combined_score - 0.8).abs() < 1e-9);
    }

    assert_eq!(search.queries().len(), 10);
    assert!(search.queries().contains(&"refined joke 0".to_string()));

    // 1 seed + 6 deepen + 5 plans + 5 jokes + 5 critiques + 5 refines + 10 novelty + 10 judge.
    assert_eq!(gateway.call_count(), 47);
    assert_eq!(session.usage.completion_calls, 47);
    assert_eq!(session.usage.failed_completion_calls, 0);
    assert_eq!(session.usage.search_calls, 10);

    assert_eq!(session.summary.observation_sets, 7);
    assert_eq!(session.summary.plans, 5);
    assert_eq!(session.summary.novelty_checks, 10);
    assert_eq!(session.summary.evaluations, 10);
    assert!(session
        .trace
        .entries
        .iter()
        .all(|e| e.run_id == session.id));
    assert!(gateway
        .requests()
        .iter()
        .all(|r| r.attribution.run_id == Some(session.id)));
}

#[tokio::test]
async fn empty_seed_makes_no_further_calls() {
    let gateway = coffee_gateway().reply(ps::OBSERVATIONS, "\n  \n");
    let search = FixedSearchGateway::hits(0);

    let session = run_pipeline(&gateway, Some(&search), RunOptions::default(), coffee_request())
        .await
        .unwrap();

    assert_eq!(session.status, RunStatus::NoObservations);
    assert!(session.results.is_empty());
    assert!(session.candidates.is_empty());
    assert_eq!(gateway.call_count(), 1);
    assert!(search.queries().is_empty());
}

#[tokio::test]
async fn malformed_request_makes_no_calls() {
    let gateway = coffee_gateway();

    let mut req = coffee_request();
    req.topic = "  ".into();
    let err = run_pipeline(&gateway, None, RunOptions::default(), req)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidRequest(_)));

    let err = run(&gateway, None, "coffee", ModelChoices::uniform("m/x"), 0)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidRequest(_)));

    assert_eq!(gateway.call_count(), 0);
}

#[tokio::test]
async fn absent_judgements_are_excluded_from_results() {
    let gateway = coffee_gateway().on(sc::FUNNINESS, |req| {
        if req.user_text().contains("refined joke") {
            "The judge rambles instead of returning JSON.".to_string()
        } else {
            JUDGE_OK.to_string()
        }
    });

    let mut req = coffee_request();
    req.num_top_jokes = 10;
    let session = run_pipeline(&gateway, None, RunOptions::default(), req)
        .await
        .unwrap();

    assert_eq!(session.results.len(), 5);
    assert!(session.results.iter().all(|r| !r.candidate.refined));

    let absent = session
        .scores
        .iter()
        .filter(|s| matches!(s.funniness, Some(FunninessVerdict::Absent(_))))
        .count();
    assert_eq!(absent, 5);
}

#[tokio::test]
async fn failing_judge_yields_empty_results_not_an_error() {
    let gateway = coffee_gateway().fail(sc::FUNNINESS);

    let session = run_pipeline(&gateway, None, RunOptions::default(), coffee_request())
        .await
        .unwrap();

    assert_eq!(session.status, RunStatus::Completed);
    assert!(session.results.is_empty());
    assert_eq!(session.usage.failed_completion_calls, 10);
}

#[tokio::test]
async fn search_failures_and_timeouts_are_penalised_differently() {
    let failing = FixedSearchGateway::failing();
    let session = run_pipeline(
        &coffee_gateway(),
        Some(&failing),
        RunOptions::default(),
        coffee_request(),
    )
    .await
    .unwrap();
    let novelty = &session.results[0].novelty;
    assert_eq!(novelty.web_check, WebCheck::Failed);
    assert!((novelty.web_found_penalty - 0.2).abs() < 1e-9);
    assert!((novelty.final_score - (0.8 - 0.7 * 0.2)).abs() < 1e-9);

    let slow = FixedSearchGateway::timing_out();
    let session = run_pipeline(
        &coffee_gateway(),
        Some(&slow),
        RunOptions::default(),
        coffee_request(),
    )
    .await
    .unwrap();
    let novelty = &session.results[0].novelty;
    assert_eq!(novelty.web_check, WebCheck::Unavailable);
    assert_eq!(novelty.web_found_penalty, 0.0);
}

#[tokio::test]
async fn widely_found_jokes_lose_novelty() {
    let search = FixedSearchGateway::hits(5);
    let session = run_pipeline(
        &coffee_gateway(),
        Some(&search),
        RunOptions::default(),
        coffee_request(),
    )
    .await
    .unwrap();

    let novelty = &session.results[0].novelty;
    assert_eq!(novelty.web_hits(), Some(5));
    assert_eq!(novelty.web_found_penalty, 1.0);
    assert!((novelty.final_score - 0.1).abs() < 1e-9);
}

#[tokio::test]
async fn optional_roles_fall_back() {
    let gateway = coffee_gateway();
    let mut req = coffee_request();
    req.models.critique = None;
    req.models.novelty = None;

    let session = run_pipeline(&gateway, None, RunOptions::default(), req)
        .await
        .unwrap();

    assert_eq!(gateway.calls_for(ps::CRITIQUE), 0);
    assert_eq!(gateway.calls_for(sc::NOVELTY), 0);
    assert_eq!(session.candidates.len(), 5);
    let novelty = &session.results[0].novelty;
    assert_eq!(novelty.web_check, WebCheck::NoSearch);
    assert_eq!(novelty.perceived_source, PerceivedSource::Default);
    assert_eq!(novelty.perceived_novelty, 0.5);
}

#[tokio::test]
async fn custom_combiner_changes_the_order() {
    let gateway = coffee_gateway();
    let prefer_plain = |_: &NoveltyScore, f: &FunninessScore| -(f.overall_funniness as f64);
    let options = RunOptions {
        combiner: Some(&prefer_plain),
        ..RunOptions::default()
    };

    let session = run_pipeline(&gateway, None, options, coffee_request())
        .await
        .unwrap();

    let ids: Vec<usize> = session.results.iter().map(|r| r.candidate.id).collect();
    assert_eq!(ids, vec![0, 2, 4]);
}

#[tokio::test]
async fn cancellation_returns_what_was_fully_scored() {
    let cancel = Arc::new(AtomicBool::new(false));
    let trip = cancel.clone();
    let gateway = coffee_gateway().on(sc::FUNNINESS, move |_| {
        trip.store(true, Ordering::SeqCst);
        JUDGE_GOOD.to_string()
    });
    let options = RunOptions {
        cancel: Some(cancel.as_ref()),
        ..RunOptions::default()
    };

    let session = run_pipeline(&gateway, None, options, coffee_request())
        .await
        .unwrap();

    assert_eq!(session.status, RunStatus::Cancelled);
    assert_eq!(session.candidates.len(), 10);
    assert_eq!(session.results.len(), 1);
    assert_eq!(session.results[0].candidate.id, 0);
    assert_eq!(gateway.calls_for(sc::FUNNINESS), 1);
    assert_eq!(gateway.calls_for(sc::NOVELTY), 1);
}

#[tokio::test]
async fn trace_file_mirrors_in_memory_trace() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("trace.jsonl");
    let gateway = coffee_gateway();

    let session = run_pipeline_with_trace_file(
        &gateway,
        None,
        RunOptions::default(),
        Some(path.clone()),
        coffee_request(),
    )
    .await
    .unwrap();

    let raw = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<serde_json::Value> = raw
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), session.trace.entries.len());
    assert_eq!(lines[0]["stage"], "observations");
    assert_eq!(lines[0]["index"], 0);
    assert_eq!(
        lines.last().unwrap()["stage"],
        serde_json::Value::from("evaluation")
    );
}

#[tokio::test]
async fn invalid_request_leaves_no_trace_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("trace.jsonl");
    let mut req = coffee_request();
    req.num_top_jokes = 0;

    let err = run_pipeline_with_trace_file(
        &coffee_gateway(),
        None,
        RunOptions::default(),
        Some(path.clone()),
        req,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, PipelineError::InvalidRequest(_)));
    assert!(!path.exists());
}

#[tokio::test]
async fn session_round_trips_through_json() {
    let session = run_pipeline(
        &coffee_gateway(),
        None,
        RunOptions::default(),
        coffee_request(),
    )
    .await
    .unwrap();

    let json = serde_json::to_string(&session).unwrap();
    let back: punchline::PipelineSession = serde_json::from_str(&json).unwrap();
    assert_eq!(back.id, session.id);
    let ids = |s: &punchline::PipelineSession| -> Vec<usize> {
        s.results.iter().map(|r| r.candidate.id).collect()
    };
    assert_eq!(ids(&back), ids(&session));
    assert_eq!(back.status, session.status);
    assert_eq!(back.trace.entries.len(), session.trace.entries.len());
}

#[tokio::test]
async fn custom_bias_instructions_reach_the_judge() {
    let gateway = coffee_gateway();
    let mut req = coffee_request();
    req.plansearch.max_plans_to_develop = 1;
    req.bias_instructions = Some("Ignore puns entirely when scoring.".into());

    run_pipeline(&gateway, None, RunOptions::default(), req)
        .await
        .unwrap();

    let judged: Vec<_> = gateway
        .requests()
        .into_iter()
        .filter(|r| r.attribution.caller == sc::FUNNINESS)
        .collect();
    assert_eq!(judged.len(), 2);
    for req in judged {
        let system = &req.messages[0].content;
        assert!(system.contains("Ignore puns entirely when scoring."));
        assert!(!system.contains(punchline::prompts::DEFAULT_BIAS_INSTRUCTIONS));
        assert!(req.json_mode);
    }
}
