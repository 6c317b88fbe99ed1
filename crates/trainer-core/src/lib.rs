#![deny(warnings)]

//! Core domain models and invariants for the facility trainer.
//!
//! This crate defines the serializable catalog types (tags, alarms, scenarios)
//! consumed by the scenario engine, validation helpers that guard the
//! invariants the engine relies on, and the pure tag value formatter used by
//! every presentation adapter.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

/// Unique identifier for an instrumentation tag, e.g. "PT_C101".
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagId(pub String);

impl TagId {
    /// Wrap a raw tag name.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw tag name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for TagId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier for a training scenario, e.g. "SCN_C101_LSHH_TRIP".
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScenarioId(pub String);

impl ScenarioId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Display unit of a tag.
///
/// Known units get a fixed rendering; anything else is carried through
/// verbatim and rendered as the raw value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Unit {
    /// Dimensionless on/off state (switches, trips).
    State,
    /// Inches of water column.
    InWg,
    /// Pounds per square inch, gauge.
    Psig,
    /// Degrees Fahrenheit.
    Fahrenheit,
    /// Unit not known to the formatter.
    Other(String),
}

impl From<String> for Unit {
    fn from(s: String) -> Self {
        match s.as_str() {
            "state" => Unit::State,
            "inWG" => Unit::InWg,
            "psig" => Unit::Psig,
            "F" => Unit::Fahrenheit,
            _ => Unit::Other(s),
        }
    }
}

impl From<&str> for Unit {
    fn from(s: &str) -> Self {
        Unit::from(s.to_string())
    }
}

impl From<Unit> for String {
    fn from(u: Unit) -> Self {
        match u {
            Unit::State => "state".into(),
            Unit::InWg => "inWG".into(),
            Unit::Psig => "psig".into(),
            Unit::Fahrenheit => "F".into(),
            Unit::Other(s) => s,
        }
    }
}

/// Current value of a tag: a numeric reading or a discrete state.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    /// Discrete on/off value.
    State(bool),
    /// Numeric reading in the tag's unit.
    Number(f64),
}

impl TagValue {
    /// Whether the value counts as "on" for state display.
    ///
    /// Numbers are active when non-zero, so `1` on a switch tag reads ACTIVE.
    pub fn is_active(&self) -> bool {
        match *self {
            TagValue::State(b) => b,
            TagValue::Number(n) => n != 0.0 && !n.is_nan(),
        }
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::State(b) => write!(f, "{b}"),
            TagValue::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<bool> for TagValue {
    fn from(b: bool) -> Self {
        TagValue::State(b)
    }
}

impl From<f64> for TagValue {
    fn from(n: f64) -> Self {
        TagValue::Number(n)
    }
}

/// Fixed-point rendering with ties rounded away from zero, so 2.25 at one
/// decimal reads 2.3 and -2.5 at none reads -3.
fn to_fixed(n: f64, digits: usize) -> String {
    let scale = 10f64.powi(digits as i32);
    let rounded = ((n.abs() * scale).round() / scale).copysign(n);
    format!("{rounded:.digits$}")
}

/// Render a tag value for display in its unit.
///
/// State units show ACTIVE/NORMAL. Numeric units use a fixed precision
/// (inWG: 1 decimal; psig and F: none). Everything else is the raw value.
pub fn format_value(value: &TagValue, unit: &Unit) -> String {
    match (unit, value) {
        (Unit::State, v) => {
            if v.is_active() {
                "ACTIVE".to_string()
            } else {
                "NORMAL".to_string()
            }
        }
        (Unit::InWg, TagValue::Number(n)) => format!("{} inWG", to_fixed(*n, 1)),
        (Unit::Psig, TagValue::Number(n)) => format!("{} psig", to_fixed(*n, 0)),
        (Unit::Fahrenheit, TagValue::Number(n)) => format!("{} °F", to_fixed(*n, 0)),
        (_, v) => v.to_string(),
    }
}

/// A tag definition from the tag catalog.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TagDef {
    /// Tag identifier.
    pub tag: TagId,
    /// Human-readable name, e.g. "C-101 Suction Pressure".
    pub name: String,
    /// Display unit.
    pub unit: Unit,
    /// Value the tag holds before any scenario runs.
    #[serde(default)]
    pub seed: Option<TagValue>,
}

impl TagDef {
    /// Seed value, or a unit-appropriate zero when the catalog omits it.
    pub fn initial_value(&self) -> TagValue {
        match (&self.seed, &self.unit) {
            (Some(v), _) => *v,
            (None, Unit::State) => TagValue::State(false),
            (None, _) => TagValue::Number(0.0),
        }
    }
}

/// How the tag store treats patch entries for tags missing from the catalog.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagPolicy {
    /// Store unknown tags alongside catalog tags.
    #[default]
    Tolerant,
    /// Reject the whole patch if any tag is unknown.
    Strict,
}

/// Tag catalog document: `{ "tags": [...] }`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TagCatalog {
    pub tags: Vec<TagDef>,
}

/// Alarm severity. Ordering is LOW < MED < HIGH.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    #[default]
    Med,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "LOW",
            Severity::Med => "MED",
            Severity::High => "HIGH",
        };
        f.write_str(s)
    }
}

/// An active-fault indicator, also used as the definition a timeline step raises.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alarm {
    /// Alarm code, unique within the active set.
    pub code: String,
    /// Operator-facing description.
    pub text: String,
    /// Severity; defaults to MED when omitted.
    #[serde(default)]
    pub severity: Severity,
}

impl Alarm {
    pub fn new(code: impl Into<String>, text: impl Into<String>, severity: Severity) -> Self {
        Self {
            code: code.into(),
            text: text.into(),
            severity,
        }
    }
}

/// Mapping from tag identifier to new value, applied as one unit.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignalPatch(pub BTreeMap<TagId, TagValue>);

impl SignalPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, tag: impl Into<String>, value: impl Into<TagValue>) -> Self {
        self.0.insert(TagId(tag.into()), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TagId, &TagValue)> {
        self.0.iter()
    }
}

/// One scheduled step of a scenario timeline.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEvent {
    /// Delay from scenario start in milliseconds.
    pub delay_ms: u64,
    /// Tag values to write when the step fires.
    #[serde(default)]
    pub signals: SignalPatch,
    /// Alarms to raise when the step fires.
    #[serde(default)]
    pub alarms: Vec<Alarm>,
    /// Alarm codes to clear when the step fires (before raising).
    #[serde(default)]
    pub clear_alarms: Vec<String>,
}

/// One selectable answer of a decision point.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionOption {
    /// Option identifier, e.g. "A".
    pub id: String,
    /// Answer text shown to the trainee.
    pub text: String,
    /// Consequence text shown after the option is picked.
    #[serde(default)]
    pub impact: String,
}

/// A trainee-facing choice with exactly one best option.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionPoint {
    pub question: String,
    pub options: Vec<DecisionOption>,
    /// Identifier of the correct option.
    pub best_answer: String,
}

impl DecisionPoint {
    pub fn option(&self, id: &str) -> Option<&DecisionOption> {
        self.options.iter().find(|o| o.id == id)
    }

    pub fn is_best(&self, id: &str) -> bool {
        self.best_answer == id
    }
}

/// A scripted training scenario.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub id: ScenarioId,
    pub title: String,
    /// Ordered timeline; step 0 fires synchronously on start.
    #[serde(default)]
    pub timeline: Vec<TimelineEvent>,
    /// Ordered decision points, presented one at a time.
    #[serde(default)]
    pub decision_points: Vec<DecisionPoint>,
    /// Remediation steps shown after a correct final decision.
    #[serde(default)]
    pub recovery_checklist: Vec<String>,
}

/// Scenario catalog document: `{ "scenarios": [...] }`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioCatalog {
    pub scenarios: Vec<Scenario>,
}

impl ScenarioCatalog {
    pub fn find(&self, id: &str) -> Option<&Scenario> {
        self.scenarios.iter().find(|s| s.id.as_str() == id)
    }
}

/// Validation errors for catalog invariants.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// A catalog document has no entries.
    #[error("{0} catalog is empty")]
    EmptyCatalog(&'static str),
    /// An identifier is blank.
    #[error("{0} has an empty identifier")]
    EmptyId(&'static str),
    /// The same identifier appears twice.
    #[error("duplicate identifier: {0}")]
    DuplicateId(String),
    /// A seed or patch number is NaN or infinite.
    #[error("non-finite value for tag {0}")]
    NonFinite(String),
    /// Scenario has no timeline events.
    #[error("scenario {0} has no timeline events")]
    EmptyTimeline(String),
    /// Scenario has no decision points.
    #[error("scenario {0} has no decision points")]
    NoDecisionPoints(String),
    /// Timeline delays must be non-decreasing.
    #[error("scenario {scenario}: timeline step {step} fires before the step preceding it")]
    DecreasingDelay { scenario: String, step: usize },
    /// Decision point lists the same option id twice.
    #[error("scenario {scenario}: decision {decision} repeats option {option}")]
    DuplicateOption {
        scenario: String,
        decision: usize,
        option: String,
    },
    /// Best answer does not name one of the options.
    #[error("scenario {scenario}: decision {decision} best answer {best} matches no option")]
    BestAnswerMissing {
        scenario: String,
        decision: usize,
        best: String,
    },
}

/// Validate a tag catalog: non-empty, unique non-blank ids, finite seeds.
pub fn validate_tag_catalog(catalog: &TagCatalog) -> Result<(), ValidationError> {
    if catalog.tags.is_empty() {
        return Err(ValidationError::EmptyCatalog("tag"));
    }
    let mut seen: BTreeSet<&TagId> = BTreeSet::new();
    for def in &catalog.tags {
        if def.tag.0.trim().is_empty() {
            return Err(ValidationError::EmptyId("tag"));
        }
        if !seen.insert(&def.tag) {
            return Err(ValidationError::DuplicateId(def.tag.0.clone()));
        }
        if let Some(TagValue::Number(n)) = def.seed {
            if !n.is_finite() {
                return Err(ValidationError::NonFinite(def.tag.0.clone()));
            }
        }
    }
    Ok(())
}

/// Validate one scenario before it is run.
pub fn validate_scenario(scn: &Scenario) -> Result<(), ValidationError> {
    let id = scn.id.0.clone();
    if id.trim().is_empty() {
        return Err(ValidationError::EmptyId("scenario"));
    }
    if scn.timeline.is_empty() {
        return Err(ValidationError::EmptyTimeline(id));
    }
    if scn.decision_points.is_empty() {
        return Err(ValidationError::NoDecisionPoints(id));
    }
    for (step, pair) in scn.timeline.windows(2).enumerate() {
        if pair[1].delay_ms < pair[0].delay_ms {
            return Err(ValidationError::DecreasingDelay {
                scenario: id,
                step: step + 1,
            });
        }
    }
    for ev in &scn.timeline {
        for (tag, v) in ev.signals.iter() {
            if let TagValue::Number(n) = v {
                if !n.is_finite() {
                    return Err(ValidationError::NonFinite(tag.0.clone()));
                }
            }
        }
    }
    for (decision, dp) in scn.decision_points.iter().enumerate() {
        let mut ids: BTreeSet<&str> = BTreeSet::new();
        for opt in &dp.options {
            if !ids.insert(opt.id.as_str()) {
                return Err(ValidationError::DuplicateOption {
                    scenario: id,
                    decision,
                    option: opt.id.clone(),
                });
            }
        }
        if !ids.contains(dp.best_answer.as_str()) {
            return Err(ValidationError::BestAnswerMissing {
                scenario: id,
                decision,
                best: dp.best_answer.clone(),
            });
        }
    }
    Ok(())
}

/// Validate the scenario catalog shape: non-empty with unique ids.
///
/// Individual scenarios are validated when they are started, so one broken
/// scenario does not take the whole catalog down.
pub fn validate_scenario_catalog(catalog: &ScenarioCatalog) -> Result<(), ValidationError> {
    if catalog.scenarios.is_empty() {
        return Err(ValidationError::EmptyCatalog("scenario"));
    }
    let mut seen: BTreeSet<&ScenarioId> = BTreeSet::new();
    for s in &catalog.scenarios {
        if !seen.insert(&s.id) {
            return Err(ValidationError::DuplicateId(s.id.0.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn scenario() -> Scenario {
        Scenario {
            id: ScenarioId::new("SCN_TEST"),
            title: "Test".to_string(),
            timeline: vec![
                TimelineEvent {
                    delay_ms: 0,
                    signals: SignalPatch::new().with("LSHH_C101", 1.0),
                    alarms: vec![Alarm::new("C101_LSHH", "High-high", Severity::High)],
                    clear_alarms: vec![],
                },
                TimelineEvent {
                    delay_ms: 2000,
                    ..Default::default()
                },
            ],
            decision_points: vec![DecisionPoint {
                question: "What now?".to_string(),
                options: vec![
                    DecisionOption {
                        id: "A".into(),
                        text: "Reset".into(),
                        impact: "Bad".into(),
                    },
                    DecisionOption {
                        id: "B".into(),
                        text: "Drain".into(),
                        impact: "Good".into(),
                    },
                ],
                best_answer: "B".to_string(),
            }],
            recovery_checklist: vec!["Drain".into()],
        }
    }

    #[test]
    fn formats_known_units() {
        assert_eq!(format_value(&TagValue::State(true), &Unit::State), "ACTIVE");
        assert_eq!(format_value(&TagValue::State(false), &Unit::State), "NORMAL");
        assert_eq!(format_value(&TagValue::Number(2.74), &Unit::InWg), "2.7 inWG");
        assert_eq!(format_value(&TagValue::Number(470.0), &Unit::Psig), "470 psig");
        assert_eq!(format_value(&TagValue::Number(120.4), &Unit::Fahrenheit), "120 °F");
    }

    #[test]
    fn half_way_values_round_away_from_zero() {
        assert_eq!(format_value(&TagValue::Number(2.25), &Unit::InWg), "2.3 inWG");
        assert_eq!(format_value(&TagValue::Number(470.5), &Unit::Psig), "471 psig");
        assert_eq!(format_value(&TagValue::Number(120.5), &Unit::Fahrenheit), "121 °F");
        assert_eq!(format_value(&TagValue::Number(-2.5), &Unit::Psig), "-3 psig");
        assert_eq!(format_value(&TagValue::Number(-0.25), &Unit::InWg), "-0.3 inWG");
    }

    #[test]
    fn numeric_state_reads_as_active() {
        assert_eq!(format_value(&TagValue::Number(1.0), &Unit::State), "ACTIVE");
        assert_eq!(format_value(&TagValue::Number(0.0), &Unit::State), "NORMAL");
    }

    #[test]
    fn unknown_unit_renders_raw_value() {
        let unit = Unit::from("rpm");
        assert_eq!(unit, Unit::Other("rpm".into()));
        assert_eq!(format_value(&TagValue::Number(3600.0), &unit), "3600");
        assert_eq!(format_value(&TagValue::Number(2.74), &unit), "2.74");
        assert_eq!(format_value(&TagValue::State(true), &Unit::Psig), "true");
    }

    #[test]
    fn tag_catalog_parses_mixed_seeds() {
        let json = r#"{"tags":[
            {"tag":"PT_C101","name":"Suction","unit":"inWG","seed":2.7},
            {"tag":"LSHH_C101","name":"Level HH","unit":"state","seed":0},
            {"tag":"XV_1","name":"Valve","unit":"state"}
        ]}"#;
        let cat: TagCatalog = serde_json::from_str(json).unwrap();
        validate_tag_catalog(&cat).unwrap();
        assert_eq!(cat.tags[0].unit, Unit::InWg);
        assert_eq!(cat.tags[0].initial_value(), TagValue::Number(2.7));
        assert_eq!(cat.tags[1].initial_value(), TagValue::Number(0.0));
        assert_eq!(cat.tags[2].initial_value(), TagValue::State(false));
    }

    #[test]
    fn tag_catalog_rejects_empty_and_duplicates() {
        assert_eq!(
            validate_tag_catalog(&TagCatalog::default()),
            Err(ValidationError::EmptyCatalog("tag"))
        );
        let def = TagDef {
            tag: TagId::new("PT_C101"),
            name: "Suction".into(),
            unit: Unit::InWg,
            seed: None,
        };
        let cat = TagCatalog {
            tags: vec![def.clone(), def],
        };
        assert_eq!(
            validate_tag_catalog(&cat),
            Err(ValidationError::DuplicateId("PT_C101".into()))
        );
    }

    #[test]
    fn scenario_document_uses_camel_case() {
        let json = r#"{
            "id":"SCN_X","title":"X",
            "timeline":[{"delayMs":0,"signals":{"A":1},"alarms":[{"code":"C","text":"t","severity":"HIGH"}]},
                        {"delayMs":500,"signals":{},"clearAlarms":["C"]}],
            "decisionPoints":[{"question":"q","options":[{"id":"A","text":"a","impact":"i"}],"bestAnswer":"A"}],
            "recoveryChecklist":["one","two"]
        }"#;
        let scn: Scenario = serde_json::from_str(json).unwrap();
        validate_scenario(&scn).unwrap();
        assert_eq!(scn.timeline[1].delay_ms, 500);
        assert_eq!(scn.timeline[1].clear_alarms, vec!["C".to_string()]);
        assert_eq!(scn.timeline[0].alarms[0].severity, Severity::High);
        assert_eq!(scn.decision_points[0].best_answer, "A");
        assert_eq!(scn.recovery_checklist.len(), 2);
    }

    #[test]
    fn severity_defaults_to_med() {
        let a: Alarm = serde_json::from_str(r#"{"code":"X","text":"y"}"#).unwrap();
        assert_eq!(a.severity, Severity::Med);
        assert!(Severity::High > Severity::Med && Severity::Med > Severity::Low);
    }

    #[test]
    fn scenario_requires_timeline_and_decision() {
        let mut s = scenario();
        s.timeline.clear();
        assert!(matches!(
            validate_scenario(&s),
            Err(ValidationError::EmptyTimeline(_))
        ));
        let mut s = scenario();
        s.decision_points.clear();
        assert!(matches!(
            validate_scenario(&s),
            Err(ValidationError::NoDecisionPoints(_))
        ));
    }

    #[test]
    fn scenario_rejects_bad_best_answer_and_order() {
        let mut s = scenario();
        s.decision_points[0].best_answer = "Z".into();
        assert!(matches!(
            validate_scenario(&s),
            Err(ValidationError::BestAnswerMissing { .. })
        ));

        let mut s = scenario();
        s.timeline[1].delay_ms = 0;
        s.timeline[0].delay_ms = 10;
        assert_eq!(
            validate_scenario(&s),
            Err(ValidationError::DecreasingDelay {
                scenario: "SCN_TEST".into(),
                step: 1
            })
        );

        let mut s = scenario();
        let dup = s.decision_points[0].options[0].clone();
        s.decision_points[0].options.push(dup);
        assert!(matches!(
            validate_scenario(&s),
            Err(ValidationError::DuplicateOption { .. })
        ));
    }

    #[test]
    fn catalog_lookup_and_duplicates() {
        let cat = ScenarioCatalog {
            scenarios: vec![scenario()],
        };
        validate_scenario_catalog(&cat).unwrap();
        assert!(cat.find("SCN_TEST").is_some());
        assert!(cat.find("SCN_NONE").is_none());

        let dup = ScenarioCatalog {
            scenarios: vec![scenario(), scenario()],
        };
        assert!(matches!(
            validate_scenario_catalog(&dup),
            Err(ValidationError::DuplicateId(_))
        ));
    }

    proptest! {
        #[test]
        fn psig_and_fahrenheit_have_no_decimals(v in -10_000.0f64..10_000.0) {
            let p = format_value(&TagValue::Number(v), &Unit::Psig);
            let f = format_value(&TagValue::Number(v), &Unit::Fahrenheit);
            prop_assert!(p.ends_with(" psig"));
            prop_assert!(!p.contains('.'));
            prop_assert!(!f.contains('.'));
        }

        #[test]
        fn inwg_has_one_decimal(v in -1_000.0f64..1_000.0) {
            let s = format_value(&TagValue::Number(v), &Unit::InWg);
            let number = s.trim_end_matches(" inWG");
            let decimals = number.split('.').nth(1).map(str::len);
            prop_assert_eq!(decimals, Some(1));
        }
    }
}
