//! Model pricing registry.
//!
//! Costs are in nanodollars (1e-9 USD) per token.

use std::collections::HashMap;
use std::sync::OnceLock;

/// Pricing information for a chat model.
#[derive(Debug, Clone, Copy)]
pub struct ModelPricing {
    /// Cost per input token in nanodollars.
    pub input_nanos_per_token: i64,
    /// Cost per output token in nanodollars.
    pub output_nanos_per_token: i64,
}

impl ModelPricing {
    const fn new(input: i64, output: i64) -> Self {
        Self {
            input_nanos_per_token: input,
            output_nanos_per_token: output,
        }
    }

    /// Calculate cost for a request.
    pub fn calculate_cost(&self, input_tokens: u32, output_tokens: u32) -> i64 {
        (input_tokens as i64) * self.input_nanos_per_token
            + (output_tokens as i64) * self.output_nanos_per_token
    }
}

// =============================================================================
// PRICING DATA
// =============================================================================

// OpenRouter pricing (verify periodically against OpenRouter model pages)
// GPT-4o-mini: $0.15/1M input, $0.60/1M output
// GPT-4o: $2.50/1M input, $10.00/1M output
// GPT-5-mini: $0.25/1M input, $2.00/1M output
// Claude 3.5 Haiku: $0.80/1M input, $4.00/1M output
// Claude 3.5 Sonnet: $3.00/1M input, $15.00/1M output

const GPT_4O_MINI: ModelPricing = ModelPricing::new(150, 600);
const GPT_4O: ModelPricing = ModelPricing::new(2_500, 10_000);
const GPT_5_MINI: ModelPricing = ModelPricing::new(250, 2_000);
const CLAUDE_35_HAIKU: ModelPricing = ModelPricing::new(800, 4_000);
const CLAUDE_35_SONNET: ModelPricing = ModelPricing::new(3_000, 15_000);

/// Used for any model missing from the registry.
const UNKNOWN_MODEL: ModelPricing = ModelPricing::new(1_000, 5_000);

static PRICING_MAP: OnceLock<HashMap<&'static str, ModelPricing>> = OnceLock::new();

fn init_pricing() -> HashMap<&'static str, ModelPricing> {
    let mut map = HashMap::new();

    map.insert("openai/gpt-4o-mini", GPT_4O_MINI);
    map.insert("openai/gpt-4o-mini-2024-07-18", GPT_4O_MINI);
    map.insert("openai/gpt-4o", GPT_4O);
    map.insert("openai/gpt-5-mini", GPT_5_MINI);
    map.insert("anthropic/claude-3-5-haiku", CLAUDE_35_HAIKU);
    map.insert("anthropic/claude-3-5-sonnet", CLAUDE_35_SONNET);

    map
}

/// Get pricing for a model.
pub fn get_pricing(model_id: &str) -> Option<ModelPricing> {
    PRICING_MAP.get_or_init(init_pricing).get(model_id).copied()
}

/// Calculate chat cost, using a mid-range default for unknown models.
pub fn chat_cost(model: &str, input_tokens: u32, output_tokens: u32) -> i64 {
    get_pricing(model)
        .unwrap_or(UNKNOWN_MODEL)
        .calculate_cost(input_tokens, output_tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_model_cost() {
        // 1K input * 150 + 1K output * 600
        assert_eq!(chat_cost("openai/gpt-4o-mini", 1_000, 1_000), 750_000);
    }

    #[test]
    fn unknown_model_falls_back() {
        assert!(get_pricing("acme/jester-1").is_none());
        assert_eq!(chat_cost("acme/jester-1", 10, 10), 60_000);
    }
}
