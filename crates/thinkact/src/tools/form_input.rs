//! Model-callable tool that asks a human to fill in a form.
//!
//! The model calls the tool with a form description. The act dispatcher
//! flips it into [`InputState::AwaitingUserInput`], registers it with the
//! pending-form registry, and waits on the form wait pool until a frontend
//! calls [`FormInputTool::submit`], the wait times out, or the plan is
//! interrupted.

use std::sync::Mutex;

use schemars::JsonSchema;
use serde::Deserialize;

use super::args::normalize_arguments;
use super::core::{FormInput, InputState, Tool, ToolFuture};
use crate::ToolDef;

/// One input field of a form.
#[derive(Deserialize, JsonSchema, Debug, Clone)]
pub struct FormField {
    /// Field label shown to the user.
    pub label: String,
    /// Optional pre-filled value.
    #[serde(default)]
    pub value: Option<String>,
}

/// Arguments for the form-input tool.
#[derive(Deserialize, JsonSchema, Debug, Clone, Default)]
pub struct FormArgs {
    /// What the user is asked to provide.
    #[serde(default)]
    pub description: String,
    /// Fields to fill in.
    #[serde(default)]
    pub inputs: Vec<FormField>,
}

#[derive(Debug)]
struct FormSession {
    state: InputState,
    form: serde_json::Value,
    submitted: Option<serde_json::Value>,
}

/// Stateful human-input tool.
///
/// ```ignore
/// let form = Arc::new(FormInputTool::new("default"));
/// let tools = ToolRegistry::new().with_shared(form.clone());
///
/// // Later, from the frontend:
/// form.submit(serde_json::json!({"email": "a@b.c"}));
/// ```
pub struct FormInputTool {
    name: String,
    session: Mutex<FormSession>,
}

impl FormInputTool {
    pub fn new(group: &str) -> Self {
        Self {
            name: format!("{group}-form-input"),
            session: Mutex::new(FormSession {
                state: InputState::Idle,
                form: serde_json::Value::Null,
                submitted: None,
            }),
        }
    }

    /// Submit the user's answers. Accepted while the form is awaiting input,
    /// and also after a timeout so late answers are not lost. Returns whether
    /// the submission was accepted.
    pub fn submit(&self, values: serde_json::Value) -> bool {
        let mut session = self.session.lock().unwrap_or_else(|e| e.into_inner());
        match session.state {
            InputState::AwaitingUserInput | InputState::InputTimeout => {
                session.submitted = Some(values);
                session.state = InputState::InputReceived;
                true
            }
            InputState::Idle | InputState::InputReceived => false,
        }
    }
}

impl Tool for FormInputTool {
    fn definition(&self) -> ToolDef {
        ToolDef::new(
            &self.name,
            "Ask the user to fill in a form and wait for their answers. Use this \
             when you need information only the user can provide.",
            crate::json_schema_for::<FormArgs>(),
        )
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        let result = self.begin(arguments);
        Box::pin(async move { result })
    }

    fn as_form_input(&self) -> Option<&dyn FormInput> {
        Some(self)
    }

    fn state_string(&self) -> Option<String> {
        let session = self.session.lock().unwrap_or_else(|e| e.into_inner());
        match session.state {
            InputState::Idle => None,
            _ => Some(render_state(&session)),
        }
    }

    fn cleanup(&self, _plan_id: &str) {
        let mut session = self.session.lock().unwrap_or_else(|e| e.into_inner());
        session.state = InputState::Idle;
        session.form = serde_json::Value::Null;
        session.submitted = None;
    }
}

impl FormInput for FormInputTool {
    fn begin(&self, arguments: &str) -> String {
        let normalized = normalize_arguments(arguments);
        let form: serde_json::Value = serde_json::from_str(&normalized)
            .unwrap_or_else(|_| serde_json::json!({ "description": arguments }));
        let description = serde_json::from_value::<FormArgs>(form.clone())
            .map(|a| a.description)
            .unwrap_or_default();

        let mut session = self.session.lock().unwrap_or_else(|e| e.into_inner());
        session.form = form;
        session.submitted = None;
        session.state = InputState::AwaitingUserInput;

        if description.is_empty() {
            "Waiting for user input".to_string()
        } else {
            format!("Waiting for user input: {description}")
        }
    }

    fn input_state(&self) -> InputState {
        self.session.lock().unwrap_or_else(|e| e.into_inner()).state
    }

    fn handle_input_timeout(&self) {
        let mut session = self.session.lock().unwrap_or_else(|e| e.into_inner());
        if session.state == InputState::AwaitingUserInput {
            session.state = InputState::InputTimeout;
        }
    }

    fn form_state(&self) -> String {
        let session = self.session.lock().unwrap_or_else(|e| e.into_inner());
        render_state(&session)
    }
}

fn render_state(session: &FormSession) -> String {
    let state = match session.state {
        InputState::Idle => "idle",
        InputState::AwaitingUserInput => "awaiting_user_input",
        InputState::InputReceived => "input_received",
        InputState::InputTimeout => "input_timeout",
    };
    serde_json::json!({
        "state": state,
        "form": session.form,
        "submitted": session.submitted,
    })
    .to_string()
}
