//! Core domain types for procsim
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Process** | A named, ordered sequence of steps |
//! | **Step** | One unit of work with declared inputs and optional conditions |
//! | **Oracle** | The external LLM service that simulates, imports and proposes |
//! | **Run** | One simulated execution, stored in the Baseline or Optimized slot |
//! | **Reference metrics** | Baseline metric names forced onto a later Optimized run |
//!
//! Serialized field names are camelCase; the persisted snapshot uses the
//! same shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_PROCESS_NAME;

/// Generate a fresh unique identifier for steps and results.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Placeholder stored when a step declares no inputs.
pub const NO_INPUTS: &str = "None";

// ============================================
// Process definition
// ============================================

/// A single step in a process. Identity is `id`; position in the
/// containing sequence is the execution order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessStep {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Free-text inputs ("None" when the step has none)
    #[serde(default = "default_inputs")]
    pub inputs: String,
    /// Optional free-text conditions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<String>,
}

fn default_inputs() -> String {
    NO_INPUTS.to_string()
}

impl ProcessStep {
    /// Create a step with a fresh id.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            description: description.into(),
            inputs: NO_INPUTS.to_string(),
            conditions: None,
        }
    }

    pub fn with_inputs(mut self, inputs: impl Into<String>) -> Self {
        self.inputs = inputs.into();
        self
    }

    pub fn with_conditions(mut self, conditions: impl Into<String>) -> Self {
        self.conditions = Some(conditions.into());
        self
    }
}

/// Partial update applied to a step by id. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct StepPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub inputs: Option<String>,
    /// `Some(None)` clears the conditions
    pub conditions: Option<Option<String>>,
}

impl StepPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.inputs.is_none()
            && self.conditions.is_none()
    }

    pub(crate) fn apply(self, step: &mut ProcessStep) {
        if let Some(name) = self.name {
            step.name = name;
        }
        if let Some(description) = self.description {
            step.description = description;
        }
        if let Some(inputs) = self.inputs {
            step.inputs = inputs;
        }
        if let Some(conditions) = self.conditions {
            step.conditions = conditions.filter(|c| !c.trim().is_empty());
        }
    }
}

/// A named, ordered list of steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessDefinition {
    pub name: String,
    pub steps: Vec<ProcessStep>,
}

impl Default for ProcessDefinition {
    fn default() -> Self {
        Self {
            name: DEFAULT_PROCESS_NAME.to_string(),
            steps: Vec::new(),
        }
    }
}

// ============================================
// Simulation results
// ============================================

/// Metric category reported by the oracle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricCategory {
    Efficiency,
    Waste,
    Yield,
    Throughput,
    Other,
}

impl MetricCategory {
    pub const ALL: [MetricCategory; 5] = [
        MetricCategory::Efficiency,
        MetricCategory::Waste,
        MetricCategory::Yield,
        MetricCategory::Throughput,
        MetricCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricCategory::Efficiency => "efficiency",
            MetricCategory::Waste => "waste",
            MetricCategory::Yield => "yield",
            MetricCategory::Throughput => "throughput",
            MetricCategory::Other => "other",
        }
    }

    /// Whether a lower value is the better outcome for this category.
    pub fn lower_is_better(&self) -> bool {
        matches!(self, MetricCategory::Waste)
    }
}

impl std::str::FromStr for MetricCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "efficiency" => Ok(MetricCategory::Efficiency),
            "waste" => Ok(MetricCategory::Waste),
            "yield" => Ok(MetricCategory::Yield),
            "throughput" => Ok(MetricCategory::Throughput),
            "other" => Ok(MetricCategory::Other),
            _ => Err(format!("unknown metric category: {}", s)),
        }
    }
}

/// One measured quantity of a run. `name` joins runs for comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationMetric {
    pub name: String,
    pub value: f64,
    pub unit: String,
    pub category: MetricCategory,
}

/// Outcome status of a simulated step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Success,
    Warning,
    Failure,
}

impl LogStatus {
    pub const ALL: [LogStatus; 3] = [LogStatus::Success, LogStatus::Warning, LogStatus::Failure];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogStatus::Success => "success",
            LogStatus::Warning => "warning",
            LogStatus::Failure => "failure",
        }
    }
}

impl std::str::FromStr for LogStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "success" => Ok(LogStatus::Success),
            "warning" => Ok(LogStatus::Warning),
            "failure" => Ok(LogStatus::Failure),
            _ => Err(format!("unknown log status: {}", s)),
        }
    }
}

/// One entry of the simulated execution trace.
///
/// `step_id` is whatever the oracle reported; it is not checked against the
/// current step list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationLog {
    pub step_id: String,
    pub step_name: String,
    pub outcome: String,
    pub details: String,
    pub status: LogStatus,
}

/// Which slot a run occupies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunType {
    Baseline,
    Optimized,
}

impl RunType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunType::Baseline => "BASELINE",
            RunType::Optimized => "OPTIMIZED",
        }
    }
}

impl std::fmt::Display for RunType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A complete simulated run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub run_type: RunType,
    pub metrics: Vec<SimulationMetric>,
    pub logs: Vec<SimulationLog>,
    pub summary: String,
    pub assumptions: Vec<String>,
}

impl SimulationResult {
    /// Metric names in report order
    pub fn metric_names(&self) -> Vec<String> {
        self.metrics.iter().map(|m| m.name.clone()).collect()
    }

    pub fn metric(&self, name: &str) -> Option<&SimulationMetric> {
        self.metrics.iter().find(|m| m.name == name)
    }
}

// ============================================
// Conversation
// ============================================

/// Who authored a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Model,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Model => "model",
        }
    }
}

/// One transcript entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub role: ChatRole,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposed_process: Option<Vec<ProcessStep>>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_optimization_proposal: bool,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            text: text.into(),
            proposed_process: None,
            is_optimization_proposal: false,
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Model,
            ..Self::user(text)
        }
    }

    pub fn proposal(text: impl Into<String>, steps: Vec<ProcessStep>) -> Self {
        Self {
            role: ChatRole::Model,
            text: text.into(),
            proposed_process: Some(steps),
            is_optimization_proposal: true,
        }
    }
}

// ============================================
// Snapshot
// ============================================

/// Everything the store persists, serialized as one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default = "default_process_name")]
    pub process_name: String,
    #[serde(default)]
    pub steps: Vec<ProcessStep>,
    #[serde(default)]
    pub baseline_result: Option<SimulationResult>,
    #[serde(default)]
    pub optimized_result: Option<SimulationResult>,
    #[serde(default)]
    pub chat_history: Vec<ChatMessage>,
}

fn default_process_name() -> String {
    DEFAULT_PROCESS_NAME.to_string()
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::named(DEFAULT_PROCESS_NAME)
    }
}

impl Snapshot {
    /// Empty snapshot with the given process name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            process_name: name.into(),
            steps: Vec::new(),
            baseline_result: None,
            optimized_result: None,
            chat_history: Vec::new(),
        }
    }

    pub fn definition(&self) -> ProcessDefinition {
        ProcessDefinition {
            name: self.process_name.clone(),
            steps: self.steps.clone(),
        }
    }

    pub fn result(&self, run_type: RunType) -> Option<&SimulationResult> {
        match run_type {
            RunType::Baseline => self.baseline_result.as_ref(),
            RunType::Optimized => self.optimized_result.as_ref(),
        }
    }

    /// Store a run in its slot, replacing any previous run of that type.
    pub fn set_result(&mut self, result: SimulationResult) {
        match result.run_type {
            RunType::Baseline => self.baseline_result = Some(result),
            RunType::Optimized => self.optimized_result = Some(result),
        }
    }

    /// The most recent run of either type (later timestamp wins; optimized
    /// wins a tie).
    pub fn latest_result(&self) -> Option<&SimulationResult> {
        match (&self.baseline_result, &self.optimized_result) {
            (Some(b), Some(o)) => Some(if b.timestamp > o.timestamp { b } else { o }),
            (Some(b), None) => Some(b),
            (None, Some(o)) => Some(o),
            (None, None) => None,
        }
    }

    /// The last proposal in the transcript, if any
    pub fn latest_proposal(&self) -> Option<&[ProcessStep]> {
        self.chat_history
            .iter()
            .rev()
            .filter(|m| m.is_optimization_proposal)
            .find_map(|m| m.proposed_process.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn result(run_type: RunType, at: DateTime<Utc>) -> SimulationResult {
        SimulationResult {
            id: new_id(),
            timestamp: at,
            run_type,
            metrics: vec![],
            logs: vec![],
            summary: String::new(),
            assumptions: vec![],
        }
    }

    #[test]
    fn test_run_type_serializes_uppercase() {
        let json = serde_json::to_string(&RunType::Optimized).unwrap();
        assert_eq!(json, "\"OPTIMIZED\"");
    }

    #[test]
    fn test_step_serializes_camel_case_without_empty_conditions() {
        let step = ProcessStep {
            id: "1".to_string(),
            name: "Cut".to_string(),
            description: "Cut sheet".to_string(),
            inputs: "Steel".to_string(),
            conditions: None,
        };
        let value = serde_json::to_value(&step).unwrap();
        assert_eq!(value["inputs"], "Steel");
        assert!(value.get("conditions").is_none());
    }

    #[test]
    fn test_step_without_inputs_loads_as_none() {
        let snapshot: Snapshot = serde_json::from_str(
            r#"{"processName": "P", "steps": [{"id": "1", "name": "Cut", "description": "Cut sheet"}]}"#,
        )
        .unwrap();
        assert_eq!(snapshot.process_name, "P");
        assert_eq!(snapshot.steps[0].inputs, NO_INPUTS);
        assert_eq!(snapshot.steps[0].conditions, None);
    }

    #[test]
    fn test_snapshot_missing_fields_default() {
        let snapshot: Snapshot = serde_json::from_str(r#"{"steps": []}"#).unwrap();
        assert_eq!(snapshot.process_name, "My Process");
        assert!(snapshot.baseline_result.is_none());
        assert!(snapshot.chat_history.is_empty());
    }

    #[test]
    fn test_latest_result_most_recent_wins() {
        let now = Utc::now();
        let mut snapshot = Snapshot::default();
        assert!(snapshot.latest_result().is_none());

        snapshot.set_result(result(RunType::Optimized, now - Duration::minutes(5)));
        snapshot.set_result(result(RunType::Baseline, now));
        assert_eq!(
            snapshot.latest_result().map(|r| r.run_type),
            Some(RunType::Baseline)
        );

        snapshot.set_result(result(RunType::Optimized, now + Duration::minutes(1)));
        assert_eq!(
            snapshot.latest_result().map(|r| r.run_type),
            Some(RunType::Optimized)
        );
    }

    #[test]
    fn test_latest_proposal_skips_plain_replies() {
        let mut snapshot = Snapshot::default();
        snapshot
            .chat_history
            .push(ChatMessage::proposal("first", vec![ProcessStep::new("A", "a")]));
        snapshot.chat_history.push(ChatMessage::model("just text"));

        let proposal = snapshot.latest_proposal().unwrap();
        assert_eq!(proposal.len(), 1);
        assert_eq!(proposal[0].name, "A");
    }

    #[test]
    fn test_category_parse_is_case_insensitive() {
        assert_eq!("Waste".parse::<MetricCategory>(), Ok(MetricCategory::Waste));
        assert!("speed".parse::<MetricCategory>().is_err());
    }
}
