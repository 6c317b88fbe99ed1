//! Scenario engine: drives the tag store and alarm registry through a
//! scenario's timeline and scores the trainee's decisions.
//!
//! Phases run `Idle -> Running -> AwaitingDecision -> Resolved`, with `Error`
//! reachable on lookup or consistency failures. Step 0 of the timeline is
//! applied synchronously inside [`ScenarioEngine::start`]; later steps are
//! deferred on the virtual clock and fire from [`ScenarioEngine::tick`].

use crate::alarms::AlarmRegistry;
use crate::scheduler::Scheduler;
use crate::tags::TagStore;
use crate::EngineError;
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};
use trainer_core::{
    validate_scenario, validate_scenario_catalog, Alarm, DecisionPoint, Scenario,
    ScenarioCatalog, ScenarioId,
};

/// Remediation note given for an incorrect final decision.
pub const CAUTION_NOTE: &str = "Do not reset yet. Verify the vessel is liquid-free and the drain \
path is functional before any reset or restart attempt.";

/// Engine phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Phase {
    Idle,
    Running,
    AwaitingDecision,
    Resolved,
    Error,
}

impl Phase {
    /// A run is in flight and owns the tag store and alarm registry.
    pub fn is_active(self) -> bool {
        matches!(self, Phase::Running | Phase::AwaitingDecision)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Idle => "Idle",
            Phase::Running => "Running",
            Phase::AwaitingDecision => "Awaiting decision",
            Phase::Resolved => "Resolved",
            Phase::Error => "Error",
        };
        f.write_str(s)
    }
}

/// Run number, unique per engine instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RunId(pub u64);

/// Correct answers out of decisions answered so far.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Score {
    pub correct: usize,
    pub answered: usize,
}

/// A recorded trainee choice.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChoiceRecord {
    pub decision: usize,
    pub option: String,
    pub correct: bool,
}

/// The executing (or last executed) scenario run.
#[derive(Clone, Debug)]
pub struct ScenarioRun {
    pub id: RunId,
    /// Snapshot of the scenario taken at start.
    pub scenario: Scenario,
    /// Virtual clock reading when the run started.
    pub started_at_ms: u64,
    /// Timeline steps applied so far.
    pub steps_applied: usize,
    /// Index of the decision point presented last.
    pub decision_index: usize,
    /// Choices made in this run, in order.
    pub choices: Vec<ChoiceRecord>,
}

impl ScenarioRun {
    pub fn score(&self) -> Score {
        Score {
            correct: self.choices.iter().filter(|c| c.correct).count(),
            answered: self.choices.len(),
        }
    }
}

/// Result of scoring one choice.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Outcome {
    pub scenario: ScenarioId,
    /// Index of the scored decision point within the scenario.
    pub decision: usize,
    pub option_id: String,
    pub option_text: String,
    /// Consequence text of the chosen option.
    pub impact: String,
    /// Whether the choice matches the decision's best answer.
    pub is_correct: bool,
    /// "Correct" or "Not Recommended".
    pub verdict: &'static str,
    /// Filled only for a correct final decision, in catalog order.
    pub recovery_checklist: Vec<String>,
    /// Filled only for an incorrect final decision.
    pub caution: Option<String>,
    /// False when another decision point follows.
    pub resolved: bool,
    /// Running score including this choice.
    pub score: Score,
}

/// Rendering callback surface implemented by presentation adapters.
///
/// Callbacks run synchronously after each state mutation, on the caller's
/// thread. All methods default to no-ops.
pub trait EngineObserver {
    fn on_tags_changed(&mut self, _tags: &TagStore) {}
    fn on_alarms_changed(&mut self, _alarms: &[Alarm]) {}
    fn on_phase_changed(&mut self, _phase: Phase, _status: &str) {}
    fn on_decision_ready(&mut self, _decision: &DecisionPoint) {}
    /// Every scored choice, including intermediate ones.
    fn on_choice_scored(&mut self, _outcome: &Outcome) {}
    /// The run's final outcome.
    fn on_resolved(&mut self, _outcome: &Outcome) {}
    fn on_error(&mut self, _message: &str) {}
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct PendingStep {
    run: RunId,
    scenario: ScenarioId,
    step: usize,
}

/// One engine per session: owns the run, the tag store, and the alarm registry.
pub struct ScenarioEngine {
    catalog: ScenarioCatalog,
    tags: TagStore,
    alarms: AlarmRegistry,
    scheduler: Scheduler<PendingStep>,
    phase: Phase,
    run: Option<ScenarioRun>,
    last_error: Option<String>,
    runs_started: u64,
    observers: Vec<Box<dyn EngineObserver>>,
}

impl ScenarioEngine {
    /// Create an idle engine over a scenario catalog and seeded tag store.
    pub fn new(catalog: ScenarioCatalog, tags: TagStore) -> Result<Self, EngineError> {
        validate_scenario_catalog(&catalog).map_err(EngineError::Config)?;
        info!(scenarios = catalog.scenarios.len(), tags = tags.defs().len(), "engine ready");
        Ok(Self {
            catalog,
            tags,
            alarms: AlarmRegistry::new(),
            scheduler: Scheduler::new(),
            phase: Phase::Idle,
            run: None,
            last_error: None,
            runs_started: 0,
            observers: Vec::new(),
        })
    }

    pub fn add_observer(&mut self, observer: Box<dyn EngineObserver>) {
        self.observers.push(observer);
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn tags(&self) -> &TagStore {
        &self.tags
    }

    pub fn alarms(&self) -> &AlarmRegistry {
        &self.alarms
    }

    pub fn catalog(&self) -> &ScenarioCatalog {
        &self.catalog
    }

    pub fn run(&self) -> Option<&ScenarioRun> {
        self.run.as_ref()
    }

    pub fn now_ms(&self) -> u64 {
        self.scheduler.now_ms()
    }

    pub fn pending_firings(&self) -> usize {
        self.scheduler.pending_len()
    }

    /// Cause of the last failure, while in `Error`.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// The decision the trainee is being asked, if any.
    pub fn current_decision(&self) -> Option<&DecisionPoint> {
        if self.phase != Phase::AwaitingDecision {
            return None;
        }
        let run = self.run.as_ref()?;
        run.scenario.decision_points.get(run.decision_index)
    }

    /// Status pill text for the view.
    pub fn status_label(&self) -> String {
        match (self.phase, self.run.as_ref()) {
            (Phase::Idle, _) | (Phase::Error, _) => self.phase.to_string(),
            (phase, Some(run)) => format!("{phase}: {}", run.scenario.title),
            (phase, None) => phase.to_string(),
        }
    }

    /// Start a run of `scenario_id`.
    ///
    /// Rejected with [`EngineError::ConcurrentRun`] while another run is in
    /// flight; that run is left untouched. On success the first timeline step
    /// has already been applied and the first decision is pending.
    pub fn start(&mut self, scenario_id: &str) -> Result<(), EngineError> {
        if self.phase.is_active() {
            let active = self
                .run
                .as_ref()
                .map(|r| r.scenario.id.to_string())
                .unwrap_or_default();
            warn!(requested = scenario_id, active = %active, "start rejected: run in flight");
            return Err(EngineError::ConcurrentRun { active });
        }
        let scenario = match self.catalog.find(scenario_id) {
            Some(s) => s.clone(),
            None => return Err(self.fail(EngineError::ScenarioNotFound(scenario_id.to_string()))),
        };
        if let Err(e) = validate_scenario(&scenario) {
            return Err(self.fail(EngineError::MalformedScenario(e)));
        }

        self.alarms.clear_all();
        self.scheduler.clear();
        self.last_error = None;
        self.runs_started += 1;
        let run_id = RunId(self.runs_started);
        let started_at_ms = self.scheduler.now_ms();
        for (step, ev) in scenario.timeline.iter().enumerate().skip(1) {
            self.scheduler.schedule_at(
                started_at_ms.saturating_add(ev.delay_ms),
                PendingStep {
                    run: run_id,
                    scenario: scenario.id.clone(),
                    step,
                },
            );
        }
        info!(scenario = %scenario.id, run = run_id.0, steps = scenario.timeline.len(), "scenario started");
        self.run = Some(ScenarioRun {
            id: run_id,
            scenario,
            started_at_ms,
            steps_applied: 0,
            decision_index: 0,
            choices: Vec::new(),
        });
        self.set_phase(Phase::Running);
        self.notify_alarms();

        self.apply_step(0)?;
        self.present_decision(0);
        Ok(())
    }

    /// Advance virtual time and apply due timeline steps of the current run.
    ///
    /// Returns the number of steps applied. Firings scheduled by a run that is
    /// no longer current, or that come due after the run left
    /// `Running`/`AwaitingDecision`, are dropped.
    pub fn tick(&mut self, delta_ms: u64) -> Result<usize, EngineError> {
        let due = self.scheduler.advance_by(delta_ms);
        let mut applied = 0;
        for pending in due {
            if !self.owns(&pending) {
                debug!(run = pending.run.0, step = pending.step, "stale firing suppressed");
                continue;
            }
            self.apply_step(pending.step)?;
            applied += 1;
        }
        Ok(applied)
    }

    /// Advance to the last pending firing and apply everything due.
    pub fn advance_to_end(&mut self) -> Result<usize, EngineError> {
        match self.scheduler.last_due_ms() {
            Some(at) => {
                let delta = at.saturating_sub(self.scheduler.now_ms());
                self.tick(delta)
            }
            None => Ok(0),
        }
    }

    /// Score the trainee's choice for the pending decision.
    ///
    /// The run resolves after its last decision point; a second `choose`
    /// before a new `start` fails with [`EngineError::AlreadyResolved`]. An
    /// unknown option is rejected and the decision stays pending.
    pub fn choose(&mut self, option_id: &str) -> Result<Outcome, EngineError> {
        match self.phase {
            Phase::AwaitingDecision => {}
            Phase::Resolved => return Err(EngineError::AlreadyResolved),
            _ => return Err(EngineError::NoPendingDecision),
        }
        let outcome = {
            let run = self.run.as_mut().ok_or(EngineError::NoPendingDecision)?;
            let decision = run.decision_index;
            let dp = run
                .scenario
                .decision_points
                .get(decision)
                .ok_or(EngineError::NoPendingDecision)?;
            let option = dp
                .option(option_id)
                .cloned()
                .ok_or_else(|| EngineError::UnknownOption {
                    option: option_id.to_string(),
                })?;
            let is_correct = dp.is_best(option_id);
            let last = decision + 1 >= run.scenario.decision_points.len();
            run.choices.push(ChoiceRecord {
                decision,
                option: option.id.clone(),
                correct: is_correct,
            });
            let (recovery_checklist, caution) = match (last, is_correct) {
                (true, true) => (run.scenario.recovery_checklist.clone(), None),
                (true, false) => (Vec::new(), Some(CAUTION_NOTE.to_string())),
                (false, _) => (Vec::new(), None),
            };
            Outcome {
                scenario: run.scenario.id.clone(),
                decision,
                option_id: option.id,
                option_text: option.text,
                impact: option.impact,
                is_correct,
                verdict: if is_correct { "Correct" } else { "Not Recommended" },
                recovery_checklist,
                caution,
                resolved: last,
                score: run.score(),
            }
        };
        info!(
            scenario = %outcome.scenario,
            decision = outcome.decision,
            option = %outcome.option_id,
            correct = outcome.is_correct,
            "decision scored"
        );
        for o in self.observers.iter_mut() {
            o.on_choice_scored(&outcome);
        }
        if outcome.resolved {
            self.scheduler.clear();
            self.set_phase(Phase::Resolved);
            for o in self.observers.iter_mut() {
                o.on_resolved(&outcome);
            }
        } else {
            self.present_decision(outcome.decision + 1);
        }
        Ok(outcome)
    }

    /// Abandon an in-flight run and return to `Idle`, dropping its pending firings.
    pub fn abandon(&mut self) -> bool {
        if !self.phase.is_active() {
            return false;
        }
        self.scheduler.clear();
        if let Some(run) = &self.run {
            info!(scenario = %run.scenario.id, run = run.id.0, "run abandoned");
        }
        self.run = None;
        self.set_phase(Phase::Idle);
        true
    }

    fn owns(&self, pending: &PendingStep) -> bool {
        self.phase.is_active()
            && self
                .run
                .as_ref()
                .is_some_and(|r| r.id == pending.run && r.scenario.id == pending.scenario)
    }

    fn apply_step(&mut self, step: usize) -> Result<(), EngineError> {
        let Some(event) = self
            .run
            .as_ref()
            .and_then(|r| r.scenario.timeline.get(step))
            .cloned()
        else {
            return Ok(());
        };
        if let Err(e) = self.tags.apply_patch(&event.signals) {
            return Err(self.fail(e));
        }
        let mut alarms_changed = false;
        for code in &event.clear_alarms {
            alarms_changed |= self.alarms.clear(code);
        }
        for alarm in &event.alarms {
            alarms_changed |= self.alarms.raise_alarm(alarm);
        }
        if let Some(run) = self.run.as_mut() {
            run.steps_applied += 1;
        }
        debug!(step, signals = event.signals.len(), alarms = self.alarms.len(), "timeline step applied");
        if !event.signals.is_empty() {
            self.notify_tags();
        }
        if alarms_changed {
            self.notify_alarms();
        }
        Ok(())
    }

    fn present_decision(&mut self, index: usize) {
        let Some(run) = self.run.as_mut() else {
            return;
        };
        let Some(dp) = run.scenario.decision_points.get(index).cloned() else {
            return;
        };
        run.decision_index = index;
        self.set_phase(Phase::AwaitingDecision);
        for o in self.observers.iter_mut() {
            o.on_decision_ready(&dp);
        }
    }

    /// Enter `Error`, drop pending firings, and report `err` to observers.
    fn fail(&mut self, err: EngineError) -> EngineError {
        let message = err.to_string();
        warn!(error = %message, "scenario engine error");
        self.scheduler.clear();
        self.last_error = Some(message.clone());
        self.set_phase(Phase::Error);
        for o in self.observers.iter_mut() {
            o.on_error(&message);
        }
        err
    }

    fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
        let status = self.status_label();
        for o in self.observers.iter_mut() {
            o.on_phase_changed(phase, &status);
        }
    }

    fn notify_tags(&mut self) {
        for o in self.observers.iter_mut() {
            o.on_tags_changed(&self.tags);
        }
    }

    fn notify_alarms(&mut self) {
        for o in self.observers.iter_mut() {
            o.on_alarms_changed(self.alarms.list());
        }
    }
}
