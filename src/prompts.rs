//! Prompt templates for every completion the pipeline makes.
//!
//! Templates use `{name}` placeholders. Rendering is a single pass over the
//! template, so a substituted value that happens to contain `{...}` is never
//! expanded a second time.

use crate::gateway::Message;

/// Rendered prompt ready for the completion gateway.
#[derive(Debug, Clone)]
pub struct PromptInstance {
    pub template_slug: &'static str,
    pub system: String,
    pub user: String,
}

impl PromptInstance {
    pub fn to_messages(&self) -> Vec<Message> {
        vec![Message::system(&self.system), Message::user(&self.user)]
    }

    /// blake3 hex digest of the rendered system and user text.
    pub fn hash(&self) -> String {
        blake3::hash(format!("{}\n{}", self.system, self.user).as_bytes())
            .to_hex()
            .to_string()
    }
}

/// Escape the characters that could open or close a tag. Quotes are left
/// alone: values sit in element bodies, never in attributes.
fn escape_tag_chars(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Render one bullet per item, for observation lists inside a prompt.
pub fn bullet_list<S: AsRef<str>>(items: &[S]) -> String {
    items
        .iter()
        .map(|item| format!("- {}", item.as_ref().trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// A prompt template with placeholders.
#[derive(Debug, Clone, Copy)]
pub struct PromptTemplate {
    pub slug: &'static str,
    pub system: &'static str,
    pub user: &'static str,
}

impl PromptTemplate {
    /// Substitute `vars` into the template. Values have `<`, `>` and `&` escaped; unknown
    /// placeholders are left as written.
    pub fn render(&self, vars: &[(&str, &str)]) -> PromptInstance {
        PromptInstance {
            template_slug: self.slug,
            system: fill(self.system, vars).trim().to_string(),
            user: fill(self.user, vars).trim().to_string(),
        }
    }
}

fn fill(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after.find('}').and_then(|close| {
            let name = &after[..close];
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (close, escape_tag_chars(value.trim())))
        });
        match value {
            Some((close, value)) => {
                out.push_str(&value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

// =============================================================================
// Plan search prompts
// =============================================================================

pub const OBSERVATIONS_FIRST_ORDER: PromptTemplate = PromptTemplate {
    slug: "observations_first_order_v1",
    system: r#"You are a comedy writer's research partner. You brainstorm raw material for jokes. Write exactly one observation per line, with no numbering, headings, or commentary."#,
    user: r#"<topic>{topic}</topic>

For this topic, brainstorm a diverse list of associated concepts, facts, stereotypes, common sayings, potential ambiguities, and inherent comedic elements. Think about what makes the topic potentially funny (irony, absurdity, wordplay opportunities).

List each observation on a new line."#,
};

pub const OBSERVATIONS_SECOND_ORDER: PromptTemplate = PromptTemplate {
    slug: "observations_second_order_v1",
    system: r#"You are a comedy writer's research partner. You brainstorm raw material for jokes. Write exactly one observation per line, with no numbering, headings, or commentary."#,
    user: r#"<topic>{topic}</topic>
<initial_observations>
{observations}
</initial_observations>

Brainstorm several new, non-obvious, and potentially humorous derivative observations or concepts that build upon or combine these initial observations. Look for unique angles, contrasts, or absurdities related to the topic.

List each new observation on a new line."#,
};

pub const JOKE_PLAN: PromptTemplate = PromptTemplate {
    slug: "joke_plan_v1",
    system: r#"You are a comedy writer planning a joke before writing it. You name the comedic structure explicitly (setup-punchline, pun-based, observational, character-based, or another) and the core humorous mechanism. Be specific but concise."#,
    user: r#"<topic>{topic}</topic>
<observations>
{observations}
</observations>

Devise a high-level plan for a joke that incorporates every observation above. State the intended structure and the core humorous mechanism.
Example: "Plan: Set up a common scenario involving the topic, then introduce an unexpected twist based on the first observation for the punchline, aiming for surprise.""#,
};

pub const JOKE: PromptTemplate = PromptTemplate {
    slug: "joke_v1",
    system: r#"You are a comedy writer. Reply with the joke only."#,
    user: r#"<topic>{topic}</topic>
<plan>{plan}</plan>

Based on this plan, write a complete, funny joke. It should be well-structured and deliver a clear punchline. Focus on originality and cleverness."#,
};

pub const JOKE_REFINE: PromptTemplate = PromptTemplate {
    slug: "joke_refine_v1",
    system: r#"You are a comedy writer revising a joke after feedback. Reply with the new joke only."#,
    user: r#"<topic>{topic}</topic>
<plan>{plan}</plan>
<critique>{critique}</critique>

Based on the plan and addressing the critique of the previous attempt, write a new, improved, funny joke. Keep the core idea of the plan, make the joke coherent, and learn from the critique."#,
};

pub const JOKE_CRITIQUE: PromptTemplate = PromptTemplate {
    slug: "joke_critique_v1",
    system: r#"You are a comedy editor. You give specific, constructive, actionable criticism."#,
    user: r#"<plan>{plan}</plan>
<joke>{joke}</joke>

Critically evaluate this joke against its plan. Is it funny? Original? Does it implement the plan effectively?
Give specific feedback that a writer could act on, for example: "The setup is good, but the punchline is predictable. It could be funnier if it subverted expectations around [aspect of the plan].""#,
};

// =============================================================================
// Scoring prompts
// =============================================================================

pub const PERCEIVED_NOVELTY: PromptTemplate = PromptTemplate {
    slug: "perceived_novelty_v1",
    system: r#"You rate how original a joke feels. Output only a number between 0.0 and 1.0."#,
    user: r#"<joke>{joke}</joke>

Does this feel like a fresh, creative joke, or a common, recycled, or clichéd one?
Give a novelty score from 0.0 (very unoriginal, common) to 1.0 (highly original, fresh). Output only the numerical score, for example: 0.7"#,
};

/// Default bias-mitigation paragraph for the funniness judge.
pub const DEFAULT_BIAS_INSTRUCTIONS: &str = "IMPORTANT: Evaluate objectively. Do not let the length of the joke unduly influence your funniness score. A short joke can be funnier than a long one. Focus on cleverness and impact. The order of presentation should not affect your judgment if multiple jokes were being compared (though here you evaluate one).";

pub const FUNNINESS_JUDGE: PromptTemplate = PromptTemplate {
    slug: "funniness_judge_v1",
    system: r#"You are a discerning comedy critic. Evaluate the joke you are given against the rubric, thoughtfully and analytically.

Rubric (each criterion scored as an integer from 1 = very poor to 10 = excellent):
1. originality: Does the joke feel fresh rather than common or overused?
2. coherence: Is the joke easy to understand and logically sound within its comedic frame?
3. setup_effectiveness: Does the setup build anticipation or misdirection?
4. punchline_impact: Is the punchline surprising, witty, and satisfying?
5. brevity: Is the joke concise, without unnecessary words? Judge in context; brevity is often good, but not always.
6. overall_funniness: How funny is the joke overall?

Output only valid JSON:
{"originality": 1-10, "coherence": 1-10, "setup_effectiveness": 1-10, "punchline_impact": 1-10, "brevity": 1-10, "overall_funniness": 1-10, "rationale": "brief overall rationale for the funniness score"}

{bias_instructions}"#,
    user: r#"<joke>
{joke}
</joke>

Return your evaluation as a JSON object.
json:"#,
};

pub const PROMPTS: &[PromptTemplate] = &[
    OBSERVATIONS_FIRST_ORDER,
    OBSERVATIONS_SECOND_ORDER,
    JOKE_PLAN,
    JOKE,
    JOKE_REFINE,
    JOKE_CRITIQUE,
    PERCEIVED_NOVELTY,
    FUNNINESS_JUDGE,
];

pub fn prompt_by_slug(slug: &str) -> Option<PromptTemplate> {
    PROMPTS.iter().find(|t| t.slug == slug).copied()
}

// =============================================================================
// JSON extraction
// =============================================================================

/// Slice the first balanced `{...}` object out of a model response, tolerating
/// prose or code fences around it. Returns the trimmed input if none is found.
pub fn extract_json(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(start) = trimmed.find('{') else {
        return trimmed;
    };

    let remainder = &trimmed[start..];
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in remainder.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return &remainder[..=i];
                }
            }
            _ => {}
        }
    }

    trimmed
}

// =============================================================================
// TESTS
// =============================================================================
