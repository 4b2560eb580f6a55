//! Simulation request builder.
//!
//! Shapes the simulation prompt, asks the oracle for a schema-conforming
//! answer and turns it into a [`SimulationResult`]. The numbers themselves are
//! whatever the oracle reasons out; only the shape is guaranteed.

use chrono::Utc;

use crate::error::{Error, Result};
use crate::oracle::schema::simulation_schema;
use crate::oracle::{require_credential, OracleClient, OraclePayload, OracleRequest, PayloadKind};
use crate::types::{new_id, ProcessStep, RunType, SimulationResult};

const SYSTEM_PROMPT: &str = "You are an expert industrial process engineer and a discrete-event \
simulation engine. Given a process definition, simulate one realistic execution of it, step by \
step, and report quantitative results. Be concrete: use plausible numbers and units, flag \
bottlenecks and risks in the step logs, and state every assumption you make.";

/// Simulate a process run through the oracle.
///
/// When `reference_metric_names` is non-empty the result must report every
/// one of them (extra metrics are allowed); otherwise the response is
/// rejected as malformed.
pub fn simulate(
    oracle: &dyn OracleClient,
    process_name: &str,
    steps: &[ProcessStep],
    run_type: RunType,
    reference_metric_names: &[String],
) -> Result<SimulationResult> {
    require_credential(oracle)?;

    if steps.is_empty() {
        return Err(Error::InvalidInput(
            "cannot simulate a process without steps".to_string(),
        ));
    }

    let mut request = OracleRequest::structured(
        build_prompt(process_name, steps, run_type, reference_metric_names),
        simulation_schema(),
    );
    request.system_instruction = Some(SYSTEM_PROMPT.to_string());

    tracing::info!(
        process = process_name,
        steps = steps.len(),
        run_type = %run_type,
        reference_metrics = reference_metric_names.len(),
        "Requesting simulation"
    );

    let reply = oracle.generate(&request)?;
    let raw = reply.trimmed_text().ok_or_else(|| {
        Error::MalformedResponse("simulation response contained no data".to_string())
    })?;

    let payload = OraclePayload::parse_text(PayloadKind::Simulation, raw)?.into_simulation()?;
    payload.ensure_metrics(reference_metric_names)?;

    let result = SimulationResult {
        id: new_id(),
        timestamp: Utc::now(),
        run_type,
        metrics: payload.metrics,
        logs: payload.logs,
        summary: payload.summary,
        assumptions: payload.assumptions,
    };

    tracing::info!(
        result_id = %result.id,
        metrics = result.metrics.len(),
        logs = result.logs.len(),
        "Simulation accepted"
    );

    Ok(result)
}

/// Render the step list the way every oracle prompt shows it.
pub(crate) fn render_steps(steps: &[ProcessStep]) -> String {
    let mut out = String::new();
    for (i, step) in steps.iter().enumerate() {
        out.push_str(&format!("{}. {} (id: {})\n", i + 1, step.name, step.id));
        out.push_str(&format!("   Description: {}\n", step.description));
        out.push_str(&format!("   Inputs: {}\n", step.inputs));
        if let Some(conditions) = &step.conditions {
            out.push_str(&format!("   Conditions: {}\n", conditions));
        }
    }
    out
}

fn build_prompt(
    process_name: &str,
    steps: &[ProcessStep],
    run_type: RunType,
    reference_metric_names: &[String],
) -> String {
    let metric_instruction = if reference_metric_names.is_empty() {
        "Choose the standard key performance indicators for this kind of process \
         (for example cycle time, throughput, yield, scrap or waste, utilization)."
            .to_string()
    } else {
        format!(
            "You MUST report metrics under exactly these names so the run can be compared \
             with an earlier one: {}. You may add further metrics, but every listed name \
             must appear verbatim.",
            reference_metric_names
                .iter()
                .map(|n| format!("\"{n}\""))
                .collect::<Vec<_>>()
                .join(", ")
        )
    };

    let run_note = match run_type {
        RunType::Baseline => "This is the BASELINE run of the process as currently defined.",
        RunType::Optimized => "This is an OPTIMIZED run of a revised version of the process.",
    };

    format!(
        "Simulate the execution of the process \"{process_name}\".\n{run_note}\n\n\
         Steps, in execution order:\n{}\n\
         Report:\n\
         - metrics: each with name, numeric value, unit and a category \
         (efficiency, waste, yield, throughput or other).\n\
         - logs: one entry per executed step with stepId, stepName, outcome, details and a \
         status (success, warning or failure).\n\
         - summary: a short narrative of the run.\n\
         - assumptions: every assumption the simulation relies on.\n\n\
         {metric_instruction}\n\nReturn only JSON.",
        render_steps(steps)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::OracleReply;
    use std::sync::Mutex;

    struct ScriptedOracle {
        credential: bool,
        reply: OracleReply,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedOracle {
        fn replying(text: &str) -> Self {
            Self {
                credential: true,
                reply: OracleReply::text(text),
                prompts: Mutex::new(vec![]),
            }
        }
    }

    impl OracleClient for ScriptedOracle {
        fn has_credential(&self) -> bool {
            self.credential
        }

        fn generate(&self, request: &OracleRequest) -> Result<OracleReply> {
            self.prompts
                .lock()
                .unwrap()
                .push(request.turns[0].text.clone());
            Ok(self.reply.clone())
        }
    }

    fn steps() -> Vec<ProcessStep> {
        vec![ProcessStep {
            id: "1".to_string(),
            name: "Cut".to_string(),
            description: "Cut sheet".to_string(),
            inputs: "Steel".to_string(),
            conditions: Some("Blade sharp".to_string()),
        }]
    }

    const REPLY: &str = r#"{
        "metrics": [{"name": "Yield", "value": 95, "unit": "%", "category": "yield"}],
        "logs": [{"stepId": "1", "stepName": "Cut", "outcome": "Cut", "details": "", "status": "success"}],
        "summary": "ok",
        "assumptions": []
    }"#;

    #[test]
    fn test_no_credential_makes_no_request() {
        let oracle = ScriptedOracle {
            credential: false,
            ..ScriptedOracle::replying(REPLY)
        };
        let err = simulate(&oracle, "P", &steps(), RunType::Baseline, &[]).unwrap_err();
        assert!(matches!(err, Error::OracleUnavailable));
        assert!(oracle.prompts.lock().unwrap().is_empty());
    }

    #[test]
    fn test_result_is_stamped_with_run_type() {
        let oracle = ScriptedOracle::replying(REPLY);
        let result = simulate(&oracle, "P", &steps(), RunType::Optimized, &[]).unwrap();
        assert_eq!(result.run_type, RunType::Optimized);
        assert!(!result.id.is_empty());
        assert_eq!(result.metrics[0].name, "Yield");
    }

    #[test]
    fn test_prompt_embeds_steps_and_free_metric_choice() {
        let oracle = ScriptedOracle::replying(REPLY);
        simulate(&oracle, "Stamping", &steps(), RunType::Baseline, &[]).unwrap();

        let prompts = oracle.prompts.lock().unwrap();
        assert!(prompts[0].contains("\"Stamping\""));
        assert!(prompts[0].contains("1. Cut (id: 1)"));
        assert!(prompts[0].contains("Inputs: Steel"));
        assert!(prompts[0].contains("Conditions: Blade sharp"));
        assert!(prompts[0].contains("standard key performance indicators"));
    }

    #[test]
    fn test_prompt_requires_reference_names() {
        let oracle = ScriptedOracle::replying(REPLY);
        simulate(
            &oracle,
            "P",
            &steps(),
            RunType::Optimized,
            &["Yield".to_string()],
        )
        .unwrap();

        let prompts = oracle.prompts.lock().unwrap();
        assert!(prompts[0].contains("MUST report metrics under exactly these names"));
        assert!(prompts[0].contains("\"Yield\""));
    }

    #[test]
    fn test_missing_reference_metric_is_malformed() {
        let oracle = ScriptedOracle::replying(REPLY);
        let err = simulate(
            &oracle,
            "P",
            &steps(),
            RunType::Optimized,
            &["Yield".to_string(), "Cycle Time".to_string()],
        )
        .unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
    }

    #[test]
    fn test_empty_reply_is_malformed() {
        let oracle = ScriptedOracle {
            reply: OracleReply::default(),
            ..ScriptedOracle::replying("")
        };
        let err = simulate(&oracle, "P", &steps(), RunType::Baseline, &[]).unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
    }

    #[test]
    fn test_empty_steps_rejected_before_request() {
        let oracle = ScriptedOracle::replying(REPLY);
        let err = simulate(&oracle, "P", &[], RunType::Baseline, &[]).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(oracle.prompts.lock().unwrap().is_empty());
    }
}
