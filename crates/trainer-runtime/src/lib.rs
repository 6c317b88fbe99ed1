#![deny(warnings)]

//! Scenario runtime for the facility trainer.
//!
//! Holds the session state a presentation adapter renders: the [`TagStore`],
//! the [`AlarmRegistry`], and the [`ScenarioEngine`] that mutates both while
//! playing a scenario back on a virtual clock.

pub mod alarms;
pub mod engine;
pub mod scheduler;
pub mod tags;

pub use alarms::AlarmRegistry;
pub use engine::{
    ChoiceRecord, EngineObserver, Outcome, Phase, RunId, ScenarioEngine, ScenarioRun, Score,
    CAUTION_NOTE,
};
pub use scheduler::Scheduler;
pub use tags::{TagReading, TagStore};

use thiserror::Error;
use trainer_core::ValidationError;

/// Errors surfaced by the runtime to the presentation adapter.
#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    /// Bad or missing catalog data.
    #[error("configuration error: {0}")]
    Config(ValidationError),
    #[error("scenario {0} not found")]
    ScenarioNotFound(String),
    /// Scenario lacks timeline or decision data, or is internally inconsistent.
    #[error("malformed scenario: {0}")]
    MalformedScenario(ValidationError),
    /// A run is already in flight.
    #[error("scenario {active} is already running")]
    ConcurrentRun { active: String },
    #[error("option {option} is not offered by the current decision")]
    UnknownOption { option: String },
    /// The run's decisions are all answered; start a new run first.
    #[error("decision already resolved; start a new run")]
    AlreadyResolved,
    #[error("no decision is pending")]
    NoPendingDecision,
    /// Patch names a tag missing from the catalog (strict tag policy only).
    #[error("unknown tag {0}")]
    UnknownTag(String),
}

/// Build an engine from parsed catalogs in one step.
pub fn init_engine(
    tags: &trainer_core::TagCatalog,
    scenarios: trainer_core::ScenarioCatalog,
    policy: trainer_core::TagPolicy,
) -> Result<ScenarioEngine, EngineError> {
    let store = TagStore::seed(tags, policy)?;
    ScenarioEngine::new(scenarios, store)
}
