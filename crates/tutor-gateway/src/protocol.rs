//! JSON bodies exchanged over the HTTP API

use serde::{Deserialize, Serialize};
use tutor_core::{Label, RunOutcome};

/// Agent name reported in every answer
pub const AGENT_NAME: &str = "tutor";

/// `POST /api/v1/ask` request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskRequest {
    pub query: String,
}

/// `POST /api/v1/ask` success body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskResponse {
    pub agent: String,
    pub label: Label,
    pub response: String,
    pub model_used: String,
    pub fell_back: bool,
}

impl From<RunOutcome> for AskResponse {
    fn from(outcome: RunOutcome) -> Self {
        Self {
            agent: AGENT_NAME.to_string(),
            label: outcome.label,
            response: outcome.response,
            model_used: outcome.model,
            fell_back: outcome.fell_back,
        }
    }
}

/// Error body for any failed request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<Label>,
}

/// One configured branch, as shown by `GET /`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchInfo {
    pub label: Label,
    pub backend: String,
    pub model: String,
}

/// `GET /` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub message: String,
    pub version: String,
    pub classifier: String,
    pub fallback: Label,
    pub branches: Vec<BranchInfo>,
    pub history_enabled: bool,
    pub uptime_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<usize>,
}
