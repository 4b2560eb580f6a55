//! Validation of oracle payloads.
//!
//! The oracle is untrusted: every structured answer is parsed into an
//! [`OraclePayload`] variant with explicit field checks. Anything that does
//! not conform becomes [`Error::MalformedResponse`] here, before it can reach
//! the typed data model.

use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::types::{
    new_id, LogStatus, MetricCategory, ProcessStep, SimulationLog, SimulationMetric, NO_INPUTS,
};

/// Which schema a payload is expected to follow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Simulation,
    Steps,
    Proposal,
}

impl PayloadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadKind::Simulation => "simulation",
            PayloadKind::Steps => "step list",
            PayloadKind::Proposal => "optimization proposal",
        }
    }
}

/// Simulation output before it is stamped with id, time and run type
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationPayload {
    pub metrics: Vec<SimulationMetric>,
    pub logs: Vec<SimulationLog>,
    pub summary: String,
    pub assumptions: Vec<String>,
}

impl SimulationPayload {
    /// Reject the payload unless every reference name is reported.
    pub fn ensure_metrics(&self, required: &[String]) -> Result<()> {
        let reported: HashSet<&str> = self.metrics.iter().map(|m| m.name.as_str()).collect();
        let missing: Vec<&str> = required
            .iter()
            .map(String::as_str)
            .filter(|name| !reported.contains(name))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::MalformedResponse(format!(
                "simulation is missing reference metrics: {}",
                missing.join(", ")
            )))
        }
    }
}

/// Arguments of a `propose_process_update` invocation
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationProposal {
    pub steps: Vec<ProcessStep>,
    pub rationale: String,
}

/// A validated oracle payload
#[derive(Debug, Clone, PartialEq)]
pub enum OraclePayload {
    Simulation(SimulationPayload),
    Steps(Vec<ProcessStep>),
    Proposal(OptimizationProposal),
}

impl OraclePayload {
    /// Validate `value` against the schema for `kind`.
    pub fn parse(kind: PayloadKind, value: &Value) -> Result<Self> {
        match kind {
            PayloadKind::Simulation => parse_simulation(value).map(OraclePayload::Simulation),
            PayloadKind::Steps => parse_step_list(value).map(OraclePayload::Steps),
            PayloadKind::Proposal => parse_proposal(value).map(OraclePayload::Proposal),
        }
    }

    /// Parse raw oracle text as JSON, then validate it.
    pub fn parse_text(kind: PayloadKind, raw: &str) -> Result<Self> {
        let value = parse_json_text(raw, kind)?;
        Self::parse(kind, &value)
    }

    pub fn kind(&self) -> PayloadKind {
        match self {
            OraclePayload::Simulation(_) => PayloadKind::Simulation,
            OraclePayload::Steps(_) => PayloadKind::Steps,
            OraclePayload::Proposal(_) => PayloadKind::Proposal,
        }
    }

    pub fn into_simulation(self) -> Result<SimulationPayload> {
        match self {
            OraclePayload::Simulation(p) => Ok(p),
            other => Err(unexpected(PayloadKind::Simulation, other.kind())),
        }
    }

    pub fn into_steps(self) -> Result<Vec<ProcessStep>> {
        match self {
            OraclePayload::Steps(s) => Ok(s),
            other => Err(unexpected(PayloadKind::Steps, other.kind())),
        }
    }

    pub fn into_proposal(self) -> Result<OptimizationProposal> {
        match self {
            OraclePayload::Proposal(p) => Ok(p),
            other => Err(unexpected(PayloadKind::Proposal, other.kind())),
        }
    }
}

fn unexpected(expected: PayloadKind, got: PayloadKind) -> Error {
    Error::MalformedResponse(format!(
        "expected {} payload, got {}",
        expected.as_str(),
        got.as_str()
    ))
}

/// Parse oracle text as JSON, tolerating markdown fences or prose around it.
pub fn parse_json_text(raw: &str, kind: PayloadKind) -> Result<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(raw.trim()) {
        return Ok(value);
    }

    let extracted = extract_json(raw).ok_or_else(|| {
        Error::MalformedResponse(format!("{} response is not JSON", kind.as_str()))
    })?;
    serde_json::from_str::<Value>(extracted).map_err(|e| {
        Error::MalformedResponse(format!("{} response is not valid JSON: {}", kind.as_str(), e))
    })
}

/// Outermost `{...}` or `[...]` span, whichever opens first
fn extract_json(raw: &str) -> Option<&str> {
    let start = raw.find(['{', '['])?;
    let close = if raw[start..].starts_with('{') { '}' } else { ']' };
    let end = raw.rfind(close)?;
    (end > start).then(|| &raw[start..=end])
}

// ============================================
// Field helpers
// ============================================

fn as_object<'a>(value: &'a Value, context: &str) -> Result<&'a Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| Error::MalformedResponse(format!("{context} must be a JSON object")))
}

fn require_field<'a>(obj: &'a Map<String, Value>, field: &str, context: &str) -> Result<&'a Value> {
    match obj.get(field) {
        Some(Value::Null) | None => Err(Error::MalformedResponse(format!(
            "{context} is missing required field `{field}`"
        ))),
        Some(value) => Ok(value),
    }
}

fn require_str(obj: &Map<String, Value>, field: &str, context: &str) -> Result<String> {
    require_field(obj, field, context)?
        .as_str()
        .map(ToString::to_string)
        .ok_or_else(|| {
            Error::MalformedResponse(format!("{context} field `{field}` must be a string"))
        })
}

fn require_array<'a>(obj: &'a Map<String, Value>, field: &str, context: &str) -> Result<&'a [Value]> {
    require_field(obj, field, context)?
        .as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| {
            Error::MalformedResponse(format!("{context} field `{field}` must be an array"))
        })
}

/// Numbers, or strings holding a number
fn require_number(obj: &Map<String, Value>, field: &str, context: &str) -> Result<f64> {
    let value = require_field(obj, field, context)?;
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse::<f64>().ok()))
        .filter(|n| n.is_finite())
        .ok_or_else(|| {
            Error::MalformedResponse(format!("{context} field `{field}` must be a number"))
        })
}

/// Optional scalar rendered as text; blank counts as absent
fn optional_text(obj: &Map<String, Value>, field: &str) -> Option<String> {
    let text = match obj.get(field)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

// ============================================
// Simulation
// ============================================

fn parse_simulation(value: &Value) -> Result<SimulationPayload> {
    let obj = as_object(value, "simulation")?;

    let metrics = require_array(obj, "metrics", "simulation")?
        .iter()
        .enumerate()
        .map(|(i, m)| parse_metric(m, i))
        .collect::<Result<Vec<_>>>()?;

    let logs = require_array(obj, "logs", "simulation")?
        .iter()
        .enumerate()
        .map(|(i, l)| parse_log(l, i))
        .collect::<Result<Vec<_>>>()?;

    let summary = require_str(obj, "summary", "simulation")?;

    let assumptions = require_array(obj, "assumptions", "simulation")?
        .iter()
        .map(|a| {
            a.as_str().map(ToString::to_string).ok_or_else(|| {
                Error::MalformedResponse("simulation assumptions must be strings".to_string())
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(SimulationPayload {
        metrics,
        logs,
        summary,
        assumptions,
    })
}

fn parse_metric(value: &Value, index: usize) -> Result<SimulationMetric> {
    let context = format!("metric #{index}");
    let obj = as_object(value, &context)?;

    let name = require_str(obj, "name", &context)?;
    if name.trim().is_empty() {
        return Err(Error::MalformedResponse(format!("{context} has an empty name")));
    }
    let category = require_str(obj, "category", &context)?
        .parse::<MetricCategory>()
        .map_err(|e| Error::MalformedResponse(format!("{context}: {e}")))?;

    Ok(SimulationMetric {
        name: name.trim().to_string(),
        value: require_number(obj, "value", &context)?,
        unit: require_str(obj, "unit", &context)?,
        category,
    })
}

fn parse_log(value: &Value, index: usize) -> Result<SimulationLog> {
    let context = format!("log #{index}");
    let obj = as_object(value, &context)?;

    let step_id = optional_text(obj, "stepId").ok_or_else(|| {
        Error::MalformedResponse(format!("{context} is missing required field `stepId`"))
    })?;
    let status = require_str(obj, "status", &context)?
        .parse::<LogStatus>()
        .map_err(|e| Error::MalformedResponse(format!("{context}: {e}")))?;

    Ok(SimulationLog {
        step_id,
        step_name: require_str(obj, "stepName", &context)?,
        outcome: require_str(obj, "outcome", &context)?,
        details: require_str(obj, "details", &context)?,
        status,
    })
}

// ============================================
// Steps
// ============================================

/// Accepts a bare array or an object wrapping it under `steps`
fn parse_step_list(value: &Value) -> Result<Vec<ProcessStep>> {
    let items = match value {
        Value::Array(items) => items.as_slice(),
        Value::Object(obj) => require_array(obj, "steps", "step list")?,
        _ => {
            return Err(Error::MalformedResponse(
                "step list must be a JSON array".to_string(),
            ))
        }
    };

    items
        .iter()
        .enumerate()
        .map(|(i, s)| parse_step(s, i))
        .collect()
}

/// Parse one step. A missing id is left empty for the caller to fill.
fn parse_step(value: &Value, index: usize) -> Result<ProcessStep> {
    let context = format!("step #{index}");
    let obj = as_object(value, &context)?;

    Ok(ProcessStep {
        id: optional_text(obj, "id").unwrap_or_default(),
        name: require_str(obj, "name", &context)?,
        description: require_str(obj, "description", &context)?,
        inputs: optional_text(obj, "inputs").unwrap_or_else(|| NO_INPUTS.to_string()),
        conditions: optional_text(obj, "conditions"),
    })
}

fn parse_proposal(value: &Value) -> Result<OptimizationProposal> {
    let obj = as_object(value, "proposal")?;

    let steps = require_array(obj, "steps", "proposal")?
        .iter()
        .enumerate()
        .map(|(i, s)| parse_step(s, i))
        .collect::<Result<Vec<_>>>()?;

    Ok(OptimizationProposal {
        steps,
        rationale: optional_text(obj, "rationale").unwrap_or_default(),
    })
}

/// Give every step with an empty or repeated id a fresh one.
///
/// The first occurrence of an id keeps it.
pub fn assign_unique_ids(steps: &mut [ProcessStep]) {
    let mut seen = HashSet::with_capacity(steps.len());
    for step in steps.iter_mut() {
        if step.id.is_empty() || !seen.insert(step.id.clone()) {
            let fresh = new_id();
            tracing::debug!(old = %step.id, new = %fresh, "Reassigned step id");
            seen.insert(fresh.clone());
            step.id = fresh;
        }
    }
}
