//! HTTP-backed oracle client (Gemini and OpenAI).

use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Value};

use super::schema::to_json_schema;
use super::{FunctionCall, OracleClient, OracleReply, OracleRequest, TurnRole};
use crate::config::{OracleConfig, OracleProvider};
use crate::error::{Error, Result};

/// Longest error body quoted back in a transport error
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Key used to wrap non-object schemas for providers that require an object root
const WRAPPED_ROOT_KEY: &str = "result";

pub struct HttpOracleClient {
    model: String,
    provider: OracleProvider,
    endpoint: String,
    api_key: Option<String>,
    runtime: tokio::runtime::Runtime,
    http: reqwest::Client,
}

impl HttpOracleClient {
    pub fn new(config: &OracleConfig, api_key: Option<String>) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Transport(format!("failed to build tokio runtime: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| Error::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            model: config.model().to_string(),
            provider: config.provider,
            endpoint: config.endpoint().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            runtime,
            http,
        })
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or(Error::OracleUnavailable)
    }

    /// POST a JSON body and return the parsed JSON response.
    async fn post_json(&self, url: String, headers: HeaderMap, body: &Value) -> Result<Value> {
        let provider = provider_name(self.provider);
        let resp = self
            .http
            .post(url)
            .headers(headers)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("{provider} request failed: {e}")))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| Error::Transport(format!("{provider} read body failed: {e}")))?;
        if !status.is_success() {
            return Err(Error::Transport(format!(
                "{provider} returned {}: {}",
                status.as_u16(),
                truncate(&text, MAX_ERROR_BODY_CHARS)
            )));
        }
        serde_json::from_str(&text).map_err(|e| {
            Error::MalformedResponse(format!("{provider} response is not JSON: {e}"))
        })
    }

    async fn generate_gemini(&self, request: &OracleRequest) -> Result<OracleReply> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.endpoint,
            urlencoding::encode(&self.model)
        );
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-goog-api-key",
            HeaderValue::from_str(self.api_key()?)
                .map_err(|e| Error::Config(format!("invalid gemini api key header: {e}")))?,
        );

        let body = gemini_body(request);
        let json = self.post_json(url, headers, &body).await?;
        parse_gemini_reply(&json)
    }

    async fn generate_openai(&self, request: &OracleRequest) -> Result<OracleReply> {
        let url = format!("{}/v1/chat/completions", self.endpoint);
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key()?))
                .map_err(|e| Error::Config(format!("invalid auth header: {e}")))?,
        );

        let (body, wrapped) = openai_body(&self.model, request);
        let json = self.post_json(url, headers, &body).await?;
        parse_openai_reply(&json, wrapped)
    }
}

impl OracleClient for HttpOracleClient {
    fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    fn generate(&self, request: &OracleRequest) -> Result<OracleReply> {
        let started = Instant::now();
        let reply = self.runtime.block_on(async {
            match self.provider {
                OracleProvider::Gemini => self.generate_gemini(request).await,
                OracleProvider::OpenAI => self.generate_openai(request).await,
            }
        });

        match &reply {
            Ok(r) => tracing::debug!(
                provider = provider_name(self.provider),
                model = %self.model,
                elapsed_ms = started.elapsed().as_millis() as u64,
                function_calls = r.function_calls.len(),
                "Oracle replied"
            ),
            Err(e) => tracing::warn!(
                provider = provider_name(self.provider),
                model = %self.model,
                elapsed_ms = started.elapsed().as_millis() as u64,
                error = %e,
                "Oracle request failed"
            ),
        }
        reply
    }
}

fn provider_name(provider: OracleProvider) -> &'static str {
    match provider {
        OracleProvider::Gemini => "gemini",
        OracleProvider::OpenAI => "openai",
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

// ============================================
// Gemini wire format
// ============================================

fn gemini_body(request: &OracleRequest) -> Value {
    let contents: Vec<Value> = request
        .turns
        .iter()
        .map(|turn| {
            let role = match turn.role {
                TurnRole::User => "user",
                TurnRole::Model => "model",
            };
            json!({ "role": role, "parts": [{ "text": turn.text }] })
        })
        .collect();

    let mut body = json!({ "contents": contents });

    if let Some(system) = &request.system_instruction {
        body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
    }
    if let Some(schema) = &request.response_schema {
        body["generationConfig"] = json!({
            "responseMimeType": "application/json",
            "responseSchema": schema,
        });
    }
    if !request.functions.is_empty() {
        let declarations: Vec<Value> = request
            .functions
            .iter()
            .map(|f| {
                json!({
                    "name": f.name,
                    "description": f.description,
                    "parameters": f.parameters,
                })
            })
            .collect();
        body["tools"] = json!([{ "functionDeclarations": declarations }]);
    }

    body
}

fn parse_gemini_reply(json: &Value) -> Result<OracleReply> {
    let Some(parts) = json
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(Value::as_array)
    else {
        // Blocked or empty candidates: no text and no call
        return Ok(OracleReply::default());
    };

    let mut text = String::new();
    let mut function_calls = Vec::new();
    for part in parts {
        if let Some(t) = part.get("text").and_then(Value::as_str) {
            text.push_str(t);
        }
        if let Some(call) = part.get("functionCall") {
            let name = call.get("name").and_then(Value::as_str).ok_or_else(|| {
                Error::MalformedResponse("gemini functionCall missing name".to_string())
            })?;
            function_calls.push(FunctionCall {
                name: name.to_string(),
                args: call.get("args").cloned().unwrap_or_else(|| json!({})),
            });
        }
    }

    Ok(OracleReply {
        text: (!text.is_empty()).then_some(text),
        function_calls,
    })
}

// ============================================
// OpenAI wire format
// ============================================

/// Returns the body and whether the response schema root was wrapped.
fn openai_body(model: &str, request: &OracleRequest) -> (Value, bool) {
    let mut messages = Vec::with_capacity(request.turns.len() + 1);
    if let Some(system) = &request.system_instruction {
        messages.push(json!({ "role": "system", "content": system }));
    }
    for turn in &request.turns {
        let role = match turn.role {
            TurnRole::User => "user",
            TurnRole::Model => "assistant",
        };
        messages.push(json!({ "role": role, "content": turn.text }));
    }

    let mut body = json!({ "model": model, "messages": messages });
    let mut wrapped = false;

    if let Some(schema) = &request.response_schema {
        let mut schema = to_json_schema(schema);
        if schema.get("type").and_then(Value::as_str) != Some("object") {
            schema = json!({
                "type": "object",
                "properties": { WRAPPED_ROOT_KEY: schema },
                "required": [WRAPPED_ROOT_KEY],
                "additionalProperties": false,
            });
            wrapped = true;
        }
        body["response_format"] = json!({
            "type": "json_schema",
            "json_schema": { "name": "response", "schema": schema },
        });
    }
    if !request.functions.is_empty() {
        let tools: Vec<Value> = request
            .functions
            .iter()
            .map(|f| {
                json!({
                    "type": "function",
                    "function": {
                        "name": f.name,
                        "description": f.description,
                        "parameters": to_json_schema(&f.parameters),
                    }
                })
            })
            .collect();
        body["tools"] = json!(tools);
    }

    (body, wrapped)
}

fn parse_openai_reply(json: &Value, wrapped: bool) -> Result<OracleReply> {
    let message = json
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|arr| arr.first())
        .and_then(|v| v.get("message"))
        .ok_or_else(|| {
            Error::MalformedResponse("openai response missing choices[0].message".to_string())
        })?;

    let mut text = message
        .get("content")
        .and_then(Value::as_str)
        .map(ToString::to_string);

    if wrapped {
        if let Some(raw) = &text {
            let inner = serde_json::from_str::<Value>(raw)
                .ok()
                .and_then(|mut v| v.get_mut(WRAPPED_ROOT_KEY).map(Value::take));
            if let Some(inner) = inner {
                text = Some(inner.to_string());
            }
        }
    }

    let mut function_calls = Vec::new();
    for call in message
        .get("tool_calls")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        let function = call.get("function").ok_or_else(|| {
            Error::MalformedResponse("openai tool call missing function".to_string())
        })?;
        let name = function.get("name").and_then(Value::as_str).ok_or_else(|| {
            Error::MalformedResponse("openai tool call missing name".to_string())
        })?;
        let args = match function.get("arguments") {
            Some(Value::String(raw)) => serde_json::from_str(raw).map_err(|e| {
                Error::MalformedResponse(format!("openai tool arguments are not JSON: {e}"))
            })?,
            Some(other) => other.clone(),
            None => json!({}),
        };
        function_calls.push(FunctionCall {
            name: name.to_string(),
            args,
        });
    }

    Ok(OracleReply {
        text,
        function_calls,
    })
}
