// 🏷️ Smart Split - Free-text rules interpreted into item assignments
// The rule text is opaque to us; a language model maps it onto structured
// assignments, which are validated before anything touches session state

use crate::engine::{Assignment, Participant, ReceiptItem};
use serde_json::{json, Value};
use thiserror::Error;

pub use crate::stt::OPENAI_BASE_URL;

const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";

const MODEL: &str = "gpt-4o";
const TEMPERATURE: f64 = 0.1;

#[derive(Debug, Error)]
pub enum SmartSplitError {
    #[error("smart split processing failed: {0}")]
    Service(String),

    #[error("no valid assignments generated")]
    NoAssignments,

    #[error("smart split request failed: {0}")]
    Http(#[from] reqwest::Error),
}

pub struct SmartSplitClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl SmartSplitClient {
    pub fn new(api_key: &str) -> Self {
        Self::with_base_url(api_key, OPENAI_BASE_URL)
    }

    pub fn with_base_url(api_key: &str, base_url: &str) -> Self {
        SmartSplitClient {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Interpret a free-text splitting rule against the current items and
    /// participants. Index validity is checked later by the session when
    /// the assignments are applied.
    pub async fn apply_rule(
        &self,
        items: &[ReceiptItem],
        participants: &[Participant],
        rule: &str,
    ) -> Result<Vec<Assignment>, SmartSplitError> {
        let body = request_body(items, participants, rule);

        let response = self
            .http
            .post(format!("{}{}", self.base_url, CHAT_COMPLETIONS_PATH))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(SmartSplitError::Service(format!(
                "status {}: {}",
                status,
                text.chars().take(500).collect::<String>()
            )));
        }

        let parsed: Value = response
            .json()
            .await
            .map_err(|e| SmartSplitError::Service(format!("malformed response: {}", e)))?;

        parse_assignments(&parsed)
    }
}

fn request_body(items: &[ReceiptItem], participants: &[Participant], rule: &str) -> Value {
    let roster = participants
        .iter()
        .map(|p| format!("{}: {}", p.id, p.name))
        .collect::<Vec<_>>()
        .join(", ");
    let item_list = items
        .iter()
        .enumerate()
        .map(|(index, item)| format!("{}: {} - PKR {}", index, item.text, item.price))
        .collect::<Vec<_>>()
        .join(", ");

    let system_prompt = format!(
        "You are a smart expense splitting assistant. Apply the given rule to \
         split receipt items among participants.\n\n\
         Rules:\n\
         - If an item should be shared equally, set is_shared to true and include all participant IDs\n\
         - If an item is for a specific person, set is_shared to false and include only their ID\n\
         - Use common sense based on item descriptions and the rule provided\n\n\
         Participants: {}\n\
         Items: {}",
        roster, item_list
    );

    json!({
        "model": MODEL,
        "messages": [
            { "role": "system", "content": system_prompt },
            { "role": "user", "content": format!("Apply this rule: \"{}\"", rule) },
        ],
        "functions": [{
            "name": "applyRule",
            "description": "Apply a splitting rule to receipt items",
            "parameters": {
                "type": "object",
                "properties": {
                    "assignments": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "item_index": { "type": "number" },
                                "is_shared": { "type": "boolean" },
                                "assigned_to": { "type": "array", "items": { "type": "string" } },
                            },
                            "required": ["item_index", "is_shared", "assigned_to"],
                        },
                    },
                },
                "required": ["assignments"],
            },
        }],
        "function_call": { "name": "applyRule" },
        "temperature": TEMPERATURE,
    })
}

/// Pull the assignment list out of the function-call arguments. The model
/// is non-deterministic, so every layer of the shape is checked.
fn parse_assignments(response: &Value) -> Result<Vec<Assignment>, SmartSplitError> {
    let arguments = response
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("function_call"))
        .and_then(|f| f.get("arguments"))
        .and_then(|a| a.as_str())
        .ok_or(SmartSplitError::NoAssignments)?;

    let arguments: Value = serde_json::from_str(arguments)
        .map_err(|e| SmartSplitError::Service(format!("unparsable arguments: {}", e)))?;

    let assignments = arguments
        .get("assignments")
        .cloned()
        .ok_or(SmartSplitError::NoAssignments)?;

    serde_json::from_value(assignments)
        .map_err(|e| SmartSplitError::Service(format!("invalid assignment shape: {}", e)))
}

// ============================================================================
// TESTS
// ============================================================================
