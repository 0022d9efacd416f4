use std::sync::Arc;
use std::time::Duration;

use punchline::gateway::openrouter::OpenRouterAdapter;
use punchline::gateway::{GatewayConfig, ProviderGateway, TallyUsageSink};
use punchline::pipeline::{run_pipeline, ModelChoices, PipelineRequest, RunOptions, RunStatus};
use punchline::scoring::WebCheck;
use punchline::search::BraveSearchAdapter;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Answers chat completions by stage, recognised from the output budget and
/// the tags in the user message.
struct StageResponder;

impl StageResponder {
    fn content(body: &Value) -> String {
        let user = body["messages"]
            .as_array()
            .and_then(|msgs| msgs.iter().find(|m| m["role"] == "user"))
            .and_then(|m| m["content"].as_str())
            .unwrap_or_default();

        match body["max_tokens"].as_u64() {
            Some(300) if user.contains("<initial_observations>") => {
                "Espresso is tiny but intense\nDecaf is coffee in witness protection".into()
            }
            Some(300) => "Baristas misspell names\nCoffee is legally a personality".into(),
            Some(150) if user.contains("<joke>") => "The twist is telegraphed.".into(),
            Some(150) => "Observational: treat decaf as a disguise.".into(),
            Some(200) if user.contains("<critique>") => {
                "Decaf isn't coffee. It's coffee in witness protection.".into()
            }
            Some(200) => "Decaf is just coffee hiding from the law.".into(),
            Some(10) => "0.9".into(),
            Some(400) => json!({
                "originality": 7,
                "coherence": 8,
                "setup_effectiveness": 6,
                "punchline_impact": 7,
                "brevity": 9,
                "overall_funniness": 7,
                "rationale": "Clean misdirection."
            })
            .to_string(),
            _ => String::new(),
        }
    }
}

impl Respond for StageResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap_or(Value::Null);
        ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": { "content": Self::content(&body) },
                "finish_reason": "stop"
            }],
            "usage": { "prompt_tokens": 40, "completion_tokens": 12 }
        }))
    }
}

#[tokio::test]
async fn full_run_over_http_fuses_web_and_model_signals() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(StageResponder)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/web/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "web": { "results": [
                { "title": "Decaf jokes", "url": "https://jokes.example/decaf", "description": "..." }
            ]}
        })))
        .mount(&server)
        .await;

    let usage = Arc::new(TallyUsageSink::new());
    let adapter =
        OpenRouterAdapter::with_config("sk-test", server.uri(), Duration::from_secs(5), None, None)
            .unwrap();
    let gateway = ProviderGateway::with_config(adapter, usage.clone(), GatewayConfig::default());
    let search =
        BraveSearchAdapter::with_config("brave-test", server.uri(), Duration::from_secs(5))
            .unwrap();

    let mut req = PipelineRequest::new("coffee", ModelChoices::uniform("openai/gpt-4o-mini"));
    req.plansearch.num_first_order_obs = 2;
    req.plansearch.max_plans_to_develop = 2;
    req.call_timeout_secs = Some(10);

    let session = run_pipeline(&gateway, Some(&search), RunOptions::default(), req)
        .await
        .unwrap();

    assert_eq!(session.status, RunStatus::Completed);
    // 2 plans, each with an original and a refined joke.
    assert_eq!(session.candidates.len(), 4);
    assert_eq!(session.results.len(), 3);

    for result in &session.results {
        assert_eq!(result.novelty.web_check, WebCheck::Searched { hits: 1 });
        assert_eq!(result.novelty.web_found_penalty, 0.5);
        assert!((result.novelty.final_score - (0.9 - 0.7 * 0.5)).abs() < 1e-9);
        assert_eq!(result.funniness.overall_funniness, 7);
    }
    // Equal scores keep candidate order.
    let ids: Vec<usize> = session.results.iter().map(|r| r.candidate.id).collect();
    assert_eq!(ids, vec![0, 1, 2]);

    // 1 seed + 3 deepen + 2 plans + 2 jokes + 2 critiques + 2 refines + 4 novelty + 4 judge.
    assert_eq!(session.usage.completion_calls, 20);
    assert_eq!(session.usage.search_calls, 4);
    assert_eq!(session.usage.input_tokens, 20 * 40);
    assert!(session.usage.cost_nanodollars > 0);

    let totals = usage.totals();
    assert_eq!(totals.calls, 20);
    assert_eq!(totals.failed_calls, 0);
    assert_eq!(totals.cost_nanodollars, session.usage.cost_nanodollars);

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 24);
}

#[tokio::test]
async fn provider_outage_degrades_to_no_observations() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "error": { "message": "overloaded" }
        })))
        .mount(&server)
        .await;

    let adapter =
        OpenRouterAdapter::with_config("sk-test", server.uri(), Duration::from_secs(5), None, None)
            .unwrap();
    let gateway = ProviderGateway::with_config(
        adapter,
        Arc::new(TallyUsageSink::new()),
        GatewayConfig::default(),
    );

    let req = PipelineRequest::new("coffee", ModelChoices::uniform("openai/gpt-4o-mini"));
    let session = run_pipeline(&gateway, None, RunOptions::default(), req)
        .await
        .unwrap();

    assert_eq!(session.status, RunStatus::NoObservations);
    assert!(session.results.is_empty());
    assert_eq!(session.usage.failed_completion_calls, 1);
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}
