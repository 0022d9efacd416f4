//! Rubric-based funniness judging.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::callers;
use crate::context::{RunContext, Sampling};
use crate::plansearch::CandidateJoke;
use crate::prompts::{extract_json, DEFAULT_BIAS_INSTRUCTIONS, FUNNINESS_JUDGE};
use crate::trace::TraceEvent;

const SAMPLING: Sampling = Sampling::new(0.3, 400).json();

const MIN_SCORE: i64 = 1;
const MAX_SCORE: i64 = 10;

/// Six rubric sub-scores (1..=10) plus the judge's rationale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunninessScore {
    pub originality: u8,
    pub coherence: u8,
    pub setup_effectiveness: u8,
    pub punchline_impact: u8,
    pub brevity: u8,
    pub overall_funniness: u8,
    pub rationale: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbsentReason {
    /// The judge call failed or returned nothing.
    Unavailable,
    /// Not JSON, or missing/mistyped fields.
    Unparseable(String),
    /// A rubric score outside 1..=10.
    OutOfRange(String),
}

/// Outcome of judging one joke. Never partially populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunninessVerdict {
    Scored(FunninessScore),
    Absent(AbsentReason),
}

impl FunninessVerdict {
    pub fn is_scored(&self) -> bool {
        matches!(self, FunninessVerdict::Scored(_))
    }

    pub fn score(&self) -> Option<&FunninessScore> {
        match self {
            FunninessVerdict::Scored(score) => Some(score),
            FunninessVerdict::Absent(_) => None,
        }
    }
}

fn rubric_score(obj: &serde_json::Map<String, Value>, field: &str) -> Result<u8, AbsentReason> {
    let value = obj
        .get(field)
        .ok_or_else(|| AbsentReason::Unparseable(format!("missing field {field}")))?;

    let number = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        _ => None,
    }
    .ok_or_else(|| AbsentReason::Unparseable(format!("{field} is not an integer: {value}")))?;

    if !(MIN_SCORE..=MAX_SCORE).contains(&number) {
        return Err(AbsentReason::OutOfRange(format!("{field}={number}")));
    }
    Ok(number as u8)
}

/// Parse a judge response. Prose around a single JSON object is tolerated;
/// every rubric field and the rationale must be present.
pub fn parse_judge_response(raw: &str) -> Result<FunninessScore, AbsentReason> {
    let json = extract_json(raw);
    let value: Value = serde_json::from_str(json)
        .map_err(|e| AbsentReason::Unparseable(format!("invalid JSON: {e}")))?;
    let obj = value
        .as_object()
        .ok_or_else(|| AbsentReason::Unparseable("expected a JSON object".to_string()))?;

    let rationale = match obj.get("rationale") {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(other) => {
            return Err(AbsentReason::Unparseable(format!(
                "rationale is not a string: {other}"
            )))
        }
        None => return Err(AbsentReason::Unparseable("missing field rationale".to_string())),
    };

    Ok(FunninessScore {
        originality: rubric_score(obj, "originality")?,
        coherence: rubric_score(obj, "coherence")?,
        setup_effectiveness: rubric_score(obj, "setup_effectiveness")?,
        punchline_impact: rubric_score(obj, "punchline_impact")?,
        brevity: rubric_score(obj, "brevity")?,
        overall_funniness: rubric_score(obj, "overall_funniness")?,
        rationale,
    })
}

/// Judge one candidate against the rubric. `bias_instructions` replaces the
/// default paragraph telling the judge to ignore length and order.
pub async fn score(
    ctx: &RunContext<'_>,
    candidate: &CandidateJoke,
    judge_model: &str,
    bias_instructions: Option<&str>,
) -> FunninessVerdict {
    let bias = bias_instructions
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .unwrap_or(DEFAULT_BIAS_INSTRUCTIONS);
    let prompt = FUNNINESS_JUDGE.render(&[("joke", &candidate.text), ("bias_instructions", bias)]);

    let completion = ctx
        .complete(callers::FUNNINESS, judge_model, &prompt, SAMPLING)
        .await;

    let verdict = match completion.text.as_deref() {
        None => FunninessVerdict::Absent(AbsentReason::Unavailable),
        Some(raw) => match parse_judge_response(raw) {
            Ok(score) => FunninessVerdict::Scored(score),
            Err(reason) => {
                debug!(candidate_id = candidate.id, reason = ?reason, "judge response rejected");
                FunninessVerdict::Absent(reason)
            }
        },
    };

    ctx.record(TraceEvent::Evaluation {
        candidate_id: candidate.id,
        verdict: verdict.clone(),
        call: completion.call,
    });

    verdict
}
