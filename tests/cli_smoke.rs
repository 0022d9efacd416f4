use std::process::Command;

use punchline::pipeline::{run_pipeline, ModelChoices, PipelineRequest, RunOptions};
use punchline::plansearch::callers as ps;
use punchline::scoring::callers as sc;
use punchline::ScriptedChatGateway;
use tempfile::tempdir;

const JUDGE: &str = r#"{"originality": 6, "coherence": 7, "setup_effectiveness": 6, "punchline_impact": 7, "brevity": 8, "overall_funniness": 7, "rationale": "Lands."}"#;

async fn scripted_session() -> punchline::PipelineSession {
    let gateway = ScriptedChatGateway::new()
        .reply(ps::OBSERVATIONS, "beans\ncrema")
        .reply(ps::PLAN, "Misdirection on the word grounds.")
        .reply(ps::JOKE, "My coffee got arrested. It was grounds for suspicion.")
        .reply(sc::NOVELTY, "0.6")
        .reply(sc::FUNNINESS, JUDGE);

    let mut models = ModelChoices::uniform("openai/gpt-4o-mini");
    models.critique = None;
    let mut req = PipelineRequest::new("coffee", models);
    req.plansearch.max_plans_to_develop = 1;

    run_pipeline(&gateway, None, RunOptions::default(), req)
        .await
        .unwrap()
}

#[tokio::test]
async fn cli_report_renders_session_markdown() {
    let dir = tempdir().unwrap();
    let session_path = dir.path().join("session.json");
    let out_path = dir.path().join("report.md");

    let session = scripted_session().await;
    std::fs::write(&session_path, serde_json::to_string_pretty(&session).unwrap()).unwrap();

    let status = Command::new(env!("CARGO_BIN_EXE_punchline"))
        .arg("report")
        .arg("--session")
        .arg(&session_path)
        .arg("--out")
        .arg(&out_path)
        .status()
        .unwrap();
    assert!(status.success());

    let markdown = std::fs::read_to_string(&out_path).unwrap();
    assert!(markdown.starts_with("# Jokes about coffee"));
    assert!(markdown.contains("## 1."));
    assert!(markdown.contains("> My coffee got arrested. It was grounds for suspicion."));
    assert!(markdown.contains("Funniness 7/10"));
    assert!(markdown.contains("not searched"));
    assert!(markdown.contains("[1st] beans"));
}

#[test]
fn cli_generate_rejects_blank_topic_before_credentials() {
    let dir = tempdir().unwrap();
    let out_path = dir.path().join("session.json");

    let output = Command::new(env!("CARGO_BIN_EXE_punchline"))
        .args(["generate", "--topic", "   "])
        .arg("--out")
        .arg(&out_path)
        .env_remove("OPENROUTER_API_KEY")
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("topic must not be empty"), "stderr: {stderr}");
    assert!(!out_path.exists());
}

#[test]
fn cli_generate_without_credentials_reports_unavailable() {
    let dir = tempdir().unwrap();
    let out_path = dir.path().join("session.json");

    let output = Command::new(env!("CARGO_BIN_EXE_punchline"))
        .args(["generate", "--topic", "coffee"])
        .arg("--out")
        .arg(&out_path)
        .env_remove("OPENROUTER_API_KEY")
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("OPENROUTER_API_KEY"), "stderr: {stderr}");
    assert!(!out_path.exists());
}
