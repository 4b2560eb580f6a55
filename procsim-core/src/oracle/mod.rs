//! Oracle boundary: the external LLM service.
//!
//! Every exchange is one [`OracleRequest`] in, one [`OracleReply`] out. The
//! reply is raw; [`payload`] validates it into typed data before anything
//! reaches the domain model.

mod http;
pub mod payload;
pub mod schema;

use serde_json::Value;

use crate::config::OracleConfig;
use crate::error::Result;

pub use http::HttpOracleClient;
pub use payload::{OptimizationProposal, OraclePayload, PayloadKind, SimulationPayload};

/// Role of a conversation turn sent to the oracle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRole {
    User,
    Model,
}

/// One turn of the conversation sent to the oracle
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Model,
            text: text.into(),
        }
    }
}

/// A capability the oracle may invoke instead of answering in text
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    /// Parameter schema (uppercase type names, see [`schema`])
    pub parameters: Value,
}

/// A capability invocation returned by the oracle
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    pub args: Value,
}

/// One request to the oracle
#[derive(Debug, Clone, Default)]
pub struct OracleRequest {
    pub system_instruction: Option<String>,
    pub turns: Vec<Turn>,
    /// When set, the oracle must answer with JSON matching this schema
    pub response_schema: Option<Value>,
    pub functions: Vec<FunctionDeclaration>,
}

impl OracleRequest {
    /// Single-prompt request expecting structured output
    pub fn structured(prompt: impl Into<String>, schema: Value) -> Self {
        Self {
            system_instruction: None,
            turns: vec![Turn::user(prompt)],
            response_schema: Some(schema),
            functions: Vec::new(),
        }
    }
}

/// Raw oracle reply, normalized across providers
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OracleReply {
    pub text: Option<String>,
    pub function_calls: Vec<FunctionCall>,
}

impl OracleReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            function_calls: Vec::new(),
        }
    }

    pub fn call(name: impl Into<String>, args: Value) -> Self {
        Self {
            text: None,
            function_calls: vec![FunctionCall {
                name: name.into(),
                args,
            }],
        }
    }

    /// Text with surrounding whitespace removed; `None` if blank
    pub fn trimmed_text(&self) -> Option<&str> {
        self.text.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }
}

/// Request/response interface to the oracle.
///
/// Callers check [`OracleClient::has_credential`] before building a request
/// so that a missing key never produces network traffic.
pub trait OracleClient: Send + Sync {
    fn has_credential(&self) -> bool;

    fn generate(&self, request: &OracleRequest) -> Result<OracleReply>;
}

/// Fail with `OracleUnavailable` when no key is configured.
pub(crate) fn require_credential(client: &dyn OracleClient) -> Result<()> {
    if client.has_credential() {
        Ok(())
    } else {
        Err(crate::Error::OracleUnavailable)
    }
}

/// Create the default HTTP-backed oracle client.
///
/// `stored_key` is the key persisted by the process store; the configured
/// key (config file or env var) takes precedence.
pub fn create_oracle_client(
    config: &OracleConfig,
    stored_key: Option<String>,
) -> Result<Box<dyn OracleClient>> {
    let api_key = config.configured_api_key().or(stored_key);
    Ok(Box::new(HttpOracleClient::new(config, api_key)?))
}
