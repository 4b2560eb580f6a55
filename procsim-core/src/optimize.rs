//! Conversational optimization adapter.
//!
//! Forwards the chat to the oracle with the current process and latest
//! simulation as context, and exposes one capability the oracle may invoke:
//! proposing a full replacement step list.

use crate::error::{Error, Result};
use crate::oracle::payload::assign_unique_ids;
use crate::oracle::schema::{propose_update_declaration, PROPOSE_UPDATE_FN};
use crate::oracle::{
    require_credential, OracleClient, OraclePayload, OracleRequest, PayloadKind, Turn, TurnRole,
};
use crate::simulate::render_steps;
use crate::types::{ChatMessage, ChatRole, ProcessDefinition, ProcessStep, SimulationResult};

/// Reply used when the oracle returns neither text nor a proposal
pub const FALLBACK_REPLY: &str = "I'm sorry, I couldn't come up with a response. Could you rephrase?";

/// Reply recorded when the oracle could not be reached or answered garbage
pub const CONNECTION_PROBLEM_REPLY: &str = "Sorry, I ran into a problem reaching the simulation \
service. Please check your API key and network connection, then try again.";

const SYSTEM_PROMPT: &str = "You are a process optimization consultant embedded in a process \
simulation tool. Answer questions about the user's process and its simulation results. When the \
user asks you to improve, optimize or restructure the process, call propose_process_update with \
the complete revised step list and a rationale instead of describing the changes in prose.";

/// What the oracle answered
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationReply {
    /// Plain answer
    Text(String),
    /// The oracle invoked `propose_process_update`
    Proposal {
        /// Confirmation shown to the user, embedding the rationale
        text: String,
        steps: Vec<ProcessStep>,
        rationale: String,
    },
}

impl ConversationReply {
    pub fn text(&self) -> &str {
        match self {
            ConversationReply::Text(text) => text,
            ConversationReply::Proposal { text, .. } => text,
        }
    }

    /// The transcript entry for this reply
    pub fn into_message(self) -> ChatMessage {
        match self {
            ConversationReply::Text(text) => ChatMessage::model(text),
            ConversationReply::Proposal { text, steps, .. } => ChatMessage::proposal(text, steps),
        }
    }
}

/// Fixed confirmation text for a proposal
pub fn proposal_message(rationale: &str) -> String {
    let rationale = rationale.trim();
    if rationale.is_empty() {
        "I've drafted an updated process. Review the proposed steps and apply them to \
         replace your current process."
            .to_string()
    } else {
        format!(
            "I've drafted an updated process.\n\n{rationale}\n\nReview the proposed steps and \
             apply them to replace your current process."
        )
    }
}

/// Send a message to the oracle with the current process context.
///
/// `history` is the transcript before `new_message`. Fails with
/// `OracleUnavailable` without contacting the oracle when no key is set.
pub fn converse(
    oracle: &dyn OracleClient,
    history: &[ChatMessage],
    new_message: &str,
    process: &ProcessDefinition,
    latest_simulation: Option<&SimulationResult>,
) -> Result<ConversationReply> {
    require_credential(oracle)?;

    let request = OracleRequest {
        system_instruction: Some(format!(
            "{SYSTEM_PROMPT}\n\n{}",
            build_context(process, latest_simulation)
        )),
        turns: build_turns(history, new_message),
        response_schema: None,
        functions: vec![propose_update_declaration()],
    };

    tracing::info!(
        history = history.len(),
        has_simulation = latest_simulation.is_some(),
        "Sending chat message"
    );

    let reply = oracle.generate(&request)?;

    if let Some(call) = reply
        .function_calls
        .iter()
        .find(|c| c.name == PROPOSE_UPDATE_FN)
    {
        let mut proposal =
            OraclePayload::parse(PayloadKind::Proposal, &call.args)?.into_proposal()?;
        assign_unique_ids(&mut proposal.steps);
        tracing::info!(steps = proposal.steps.len(), "Oracle proposed a process update");
        return Ok(ConversationReply::Proposal {
            text: proposal_message(&proposal.rationale),
            steps: proposal.steps,
            rationale: proposal.rationale,
        });
    }

    if let Some(unknown) = reply.function_calls.first() {
        tracing::warn!(name = %unknown.name, "Ignoring call to unknown function");
    }

    Ok(ConversationReply::Text(
        reply
            .trimmed_text()
            .map(ToString::to_string)
            .unwrap_or_else(|| FALLBACK_REPLY.to_string()),
    ))
}

fn build_context(process: &ProcessDefinition, latest: Option<&SimulationResult>) -> String {
    let mut context = format!(
        "Current process: \"{}\"\nSteps:\n{}",
        process.name,
        if process.steps.is_empty() {
            "(no steps defined)\n".to_string()
        } else {
            render_steps(&process.steps)
        }
    );

    match latest {
        Some(result) => {
            context.push_str(&format!(
                "\nLatest simulation ({} run at {}):\n",
                result.run_type,
                result.timestamp.to_rfc3339()
            ));
            for metric in &result.metrics {
                context.push_str(&format!(
                    "- {}: {} {} ({})\n",
                    metric.name,
                    metric.value,
                    metric.unit,
                    metric.category.as_str()
                ));
            }
            if !result.summary.is_empty() {
                context.push_str(&format!("Summary: {}\n", result.summary));
            }
        }
        None => context.push_str("\nNo simulation has been run yet.\n"),
    }

    context
}

/// Prior transcript as alternating turns, then the new message.
///
/// Consecutive messages from the same role are merged so the turns strictly
/// alternate, as the providers require.
fn build_turns(history: &[ChatMessage], new_message: &str) -> Vec<Turn> {
    let mut turns: Vec<Turn> = Vec::with_capacity(history.len() + 1);
    let entries = history
        .iter()
        .map(|m| (m.role, m.text.as_str()))
        .chain(std::iter::once((ChatRole::User, new_message)));

    for (role, text) in entries {
        let turn = match role {
            ChatRole::User => Turn::user(text),
            ChatRole::Model => Turn::model(text),
        };
        let same_role = turns.last().is_some_and(|last| last.role == turn.role);
        match turns.last_mut() {
            Some(last) if same_role => {
                last.text.push_str("\n\n");
                last.text.push_str(&turn.text);
            }
            _ => turns.push(turn),
        }
    }

    // Conversations must open with a user turn
    if turns.first().is_some_and(|t| t.role == TurnRole::Model) {
        turns.remove(0);
    }

    turns
}

/// Reply to record when a conversation attempt failed.
///
/// Oracle failures become a synthetic assistant message; anything else
/// (missing key, local errors) is returned to the caller.
pub fn fold_failure(error: Error) -> Result<ConversationReply> {
    if error.is_oracle_failure() {
        tracing::warn!(error = %error, "Chat request failed, recording apology");
        Ok(ConversationReply::Text(CONNECTION_PROBLEM_REPLY.to_string()))
    } else {
        Err(error)
    }
}
