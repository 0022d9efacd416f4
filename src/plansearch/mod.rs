//! Plan search: expand a topic into observations, combine them into joke
//! plans, and instantiate (and optionally refine) jokes from those plans.

pub mod combinations;
pub mod critique;
pub mod jokes;
pub mod observations;
pub mod orchestrator;
pub mod plans;

use serde::{Deserialize, Serialize};

pub use combinations::combine;
pub use orchestrator::run_plansearch;

// =============================================================================
// Data model
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationOrder {
    /// Derived from the topic alone.
    First,
    /// Derived from a combination of earlier observations.
    Second,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub text: String,
    pub order: ObservationOrder,
}

impl Observation {
    pub fn new(text: impl Into<String>, order: ObservationOrder) -> Self {
        Self {
            text: text.into(),
            order,
        }
    }
}

/// An ordered subset of observations; its identity is the member tuple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObservationCombination {
    pub members: Vec<Observation>,
}

impl ObservationCombination {
    pub fn new(members: Vec<Observation>) -> Self {
        Self { members }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn texts(&self) -> Vec<String> {
        self.members.iter().map(|o| o.text.clone()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Position in the run's developed-plan list.
    pub id: usize,
    pub topic: String,
    pub text: String,
    pub combination: ObservationCombination,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Critique {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateJoke {
    /// Position in the run's candidate list; scores are keyed on it.
    pub id: usize,
    pub text: String,
    pub plan: Plan,
    pub refined: bool,
    /// The critique that produced this refinement.
    pub critique: Option<Critique>,
}

impl CandidateJoke {
    pub fn combination(&self) -> &ObservationCombination {
        &self.plan.combination
    }
}

// =============================================================================
// Configuration
// =============================================================================

fn default_num_first_order_obs() -> usize {
    5
}

fn default_num_second_order_obs_per_combo() -> usize {
    2
}

fn default_max_plans_to_develop() -> usize {
    5
}

fn default_true() -> bool {
    true
}

fn default_max_combination_size() -> usize {
    2
}

fn default_deepening_source_factor() -> f64 {
    1.5
}

/// Bounds for one plan search sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSearchConfig {
    #[serde(default = "default_num_first_order_obs")]
    pub num_first_order_obs: usize,
    #[serde(default = "default_num_second_order_obs_per_combo")]
    pub num_second_order_obs_per_combo: usize,
    #[serde(default = "default_max_plans_to_develop")]
    pub max_plans_to_develop: usize,
    #[serde(default = "default_true")]
    pub use_critique_refinement: bool,
    /// Largest combination size drawn from the seed observations.
    #[serde(default = "default_max_combination_size")]
    pub max_combination_size: usize,
    /// Deepening stops once `factor * max_plans_to_develop` sources exist.
    #[serde(default = "default_deepening_source_factor")]
    pub deepening_source_factor: f64,
}

impl Default for PlanSearchConfig {
    fn default() -> Self {
        Self {
            num_first_order_obs: default_num_first_order_obs(),
            num_second_order_obs_per_combo: default_num_second_order_obs_per_combo(),
            max_plans_to_develop: default_max_plans_to_develop(),
            use_critique_refinement: true,
            max_combination_size: default_max_combination_size(),
            deepening_source_factor: default_deepening_source_factor(),
        }
    }
}

impl PlanSearchConfig {
    /// Source count at which deepening stops.
    pub fn deepening_cap(&self) -> f64 {
        self.deepening_source_factor * self.max_plans_to_develop as f64
    }
}

/// Model ids for each plan search role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSearchModels {
    pub observation: String,
    pub plan: String,
    pub joke: String,
    /// Refinement is skipped without a critique model.
    pub critique: Option<String>,
}

// =============================================================================
// Outcome
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStatus {
    Completed,
    Cancelled,
    /// Seed expansion produced nothing; no further calls were made.
    NoSeedObservations,
}

#[derive(Debug, Clone)]
pub struct PlanSearchOutcome {
    pub status: SearchStatus,
    /// Append-only; first-order observations come first.
    pub observations: Vec<Observation>,
    pub plans: Vec<Plan>,
    pub candidates: Vec<CandidateJoke>,
    pub completion_calls: u64,
}

/// Caller tags for plan search completions.
pub mod callers {
    pub const OBSERVATIONS: &str = "plansearch::observations";
    pub const PLAN: &str = "plansearch::plan";
    pub const JOKE: &str = "plansearch::joke";
    pub const REFINE: &str = "plansearch::refine";
    pub const CRITIQUE: &str = "plansearch::critique";
}
