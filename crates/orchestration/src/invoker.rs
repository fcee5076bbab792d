//! External tool boundary.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use serde_json::Value as JsonValue;
use thiserror::Error;

/// Failure of one external tool call.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    /// The collaborator rejected the request.
    #[error("tool rejected action '{action}': {message}")]
    Rejected { action: String, message: String },

    /// The collaborator could not be reached.
    #[error("tool unavailable for action '{action}': {message}")]
    Unavailable { action: String, message: String },

    /// The call did not return within the step's timeout budget.
    #[error("action '{action}' timed out after {timeout_ms}ms")]
    Timeout { action: String, timeout_ms: u64 },
}

/// One named action against an external collaborator.
///
/// Implementations are handed a JSON-serializable parameter map and return
/// the collaborator's data on success. Tool contracts vary per deployment,
/// which is why the payloads stay generic JSON here while everything else in
/// the pipeline is typed.
pub trait ToolInvoker: Send + Sync {
    fn invoke(&self, action: &str, params: &JsonValue) -> Result<JsonValue, ToolError>;
}

impl<T> ToolInvoker for Arc<T>
where
    T: ToolInvoker + ?Sized,
{
    fn invoke(&self, action: &str, params: &JsonValue) -> Result<JsonValue, ToolError> {
        (**self).invoke(action, params)
    }
}

/// Recorded invocation, for inspection in tests.
#[derive(Debug, Clone)]
pub struct RecordedInvocation {
    pub action: String,
    pub params: JsonValue,
}

/// In-memory invoker for tests/dev.
///
/// Succeeds with an acknowledgement payload unless the action name was
/// registered as failing.
#[derive(Debug, Default)]
pub struct RecordingToolInvoker {
    invocations: Mutex<Vec<RecordedInvocation>>,
    failing_actions: Mutex<HashSet<String>>,
}

impl RecordingToolInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Make every future call to `action` fail.
    pub fn fail_action(&self, action: impl Into<String>) {
        if let Ok(mut set) = self.failing_actions.lock() {
            set.insert(action.into());
        }
    }

    pub fn invocations(&self) -> Vec<RecordedInvocation> {
        self.invocations.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn invoked_actions(&self) -> Vec<String> {
        self.invocations()
            .into_iter()
            .map(|i| i.action)
            .collect()
    }
}

impl ToolInvoker for RecordingToolInvoker {
    fn invoke(&self, action: &str, params: &JsonValue) -> Result<JsonValue, ToolError> {
        if let Ok(mut log) = self.invocations.lock() {
            log.push(RecordedInvocation {
                action: action.to_string(),
                params: params.clone(),
            });
        }

        let failing = self
            .failing_actions
            .lock()
            .map(|set| set.contains(action))
            .unwrap_or(false);

        if failing {
            return Err(ToolError::Unavailable {
                action: action.to_string(),
                message: "configured to fail".to_string(),
            });
        }

        Ok(serde_json::json!({ "acknowledged": true, "action": action }))
    }
}
