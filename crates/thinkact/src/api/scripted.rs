//! A [`ModelClient`] that replays a fixed transcript.
//!
//! Each call to [`complete`](ModelClient::complete) pops the next scripted
//! turn. Turns are either a response or an error, so retry and escalation
//! paths can be driven deterministically. Every request is kept for later
//! inspection.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Deserialize;

use super::model::{ModelClient, ModelRequest, ModelResponse};
use crate::ToolCall;
use crate::error::ModelError;

/// One scripted model turn.
#[derive(Debug, Clone)]
pub enum ScriptedTurn {
    Respond(ModelResponse),
    Fail(ModelError),
}

/// Replays queued [`ScriptedTurn`]s in order.
///
/// When the script runs out, every further call fails with a
/// `ScriptExhausted` error (not retryable).
#[derive(Debug, Default)]
pub struct ScriptedModelClient {
    turns: Mutex<VecDeque<ScriptedTurn>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModelClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful response (builder pattern).
    pub fn respond(self, response: ModelResponse) -> Self {
        self.push(ScriptedTurn::Respond(response));
        self
    }

    /// Queue a failure (builder pattern).
    pub fn fail(self, error: ModelError) -> Self {
        self.push(ScriptedTurn::Fail(error));
        self
    }

    /// Queue a turn on a shared client.
    pub fn push(&self, turn: ScriptedTurn) {
        self.turns
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(turn);
    }

    /// Number of turns not yet replayed.
    pub fn remaining(&self) -> usize {
        self.turns.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// All requests received so far, oldest first.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Number of `complete` calls received so far.
    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Build a client from a JSON transcript.
    ///
    /// ```json
    /// {"turns": [
    ///   {"text": "looking", "tool_calls": [{"name": "search", "arguments": {"q": "x"}}]},
    ///   {"error": {"kind": "IoError", "message": "connection reset"}}
    /// ]}
    /// ```
    pub fn from_transcript_json(json: &str) -> Result<Self, String> {
        let transcript: Transcript =
            serde_json::from_str(json).map_err(|e| format!("invalid transcript: {e}"))?;
        let client = Self::new();
        for (turn_index, turn) in transcript.turns.into_iter().enumerate() {
            client.push(turn.into_scripted(turn_index));
        }
        Ok(client)
    }

    /// Load a JSON transcript from disk.
    pub fn from_transcript_file(path: impl AsRef<Path>) -> Result<Self, String> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read transcript {}: {e}", path.display()))?;
        Self::from_transcript_json(&json)
    }
}

impl ModelClient for ScriptedModelClient {
    fn complete<'a>(
        &'a self,
        request: &'a ModelRequest,
    ) -> BoxFuture<'a, Result<ModelResponse, ModelError>> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());
        let next = self
            .turns
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        async move {
            match next {
                Some(ScriptedTurn::Respond(response)) => Ok(response),
                Some(ScriptedTurn::Fail(error)) => Err(error),
                None => Err(ModelError::new(
                    "ScriptExhausted",
                    "scripted model has no turns left",
                )),
            }
        }
        .boxed()
    }
}

// ── Transcript format ──────────────────────────────────────────────

#[derive(Deserialize)]
struct Transcript {
    turns: Vec<TranscriptTurn>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TranscriptTurn {
    Error {
        error: TranscriptError,
    },
    Response {
        #[serde(default)]
        text: String,
        #[serde(default)]
        tool_calls: Vec<TranscriptCall>,
        #[serde(default)]
        input_tokens: usize,
        #[serde(default)]
        output_tokens: usize,
    },
}

#[derive(Deserialize)]
struct TranscriptError {
    #[serde(default = "default_error_kind")]
    kind: String,
    message: String,
    #[serde(default)]
    response_body: Option<String>,
}

fn default_error_kind() -> String {
    "ModelError".into()
}

#[derive(Deserialize)]
struct TranscriptCall {
    #[serde(default)]
    id: Option<String>,
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

impl TranscriptTurn {
    fn into_scripted(self, turn_index: usize) -> ScriptedTurn {
        match self {
            TranscriptTurn::Error { error } => {
                let mut e = ModelError::new(error.kind, error.message);
                e.response_body = error.response_body;
                ScriptedTurn::Fail(e)
            }
            TranscriptTurn::Response {
                text,
                tool_calls,
                input_tokens,
                output_tokens,
            } => {
                let calls = tool_calls
                    .into_iter()
                    .enumerate()
                    .map(|(i, call)| {
                        let arguments = match call.arguments {
                            serde_json::Value::Null => "{}".to_string(),
                            serde_json::Value::String(s) => s,
                            other => other.to_string(),
                        };
                        ToolCall::function(
                            call.id.unwrap_or_else(|| format!("script-{turn_index}-{i}")),
                            call.name,
                            arguments,
                        )
                    })
                    .collect();
                ScriptedTurn::Respond(ModelResponse {
                    text,
                    tool_calls: calls,
                    input_tokens,
                    output_tokens,
                })
            }
        }
    }
}
