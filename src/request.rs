use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ChatError;
use crate::tool::{ToolCallFragment, ToolSpec};

/// Message role in the conversation history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One turn of conversation history. Append-only within a generation; the
/// core never reorders or mutates turns it has been given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRef>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatTurn {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    /// An assistant turn carrying the raw tool-call references the model
    /// issued, recorded in history before the tool results.
    #[must_use]
    pub fn assistant_tool_calls(calls: &[ToolCallFragment]) -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            tool_calls: Some(calls.iter().map(ToolCallRef::from_fragment).collect()),
            tool_call_id: None,
        }
    }

    /// A tool-role turn answering one tool call.
    #[must_use]
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

/// A tool-call reference as it appears on an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRef {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: ToolCallFunctionRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallFunctionRef {
    pub name: String,
    pub arguments: String,
}

impl ToolCallRef {
    #[must_use]
    pub fn from_fragment(fragment: &ToolCallFragment) -> Self {
        Self {
            id: fragment.id.clone(),
            kind: "function".to_string(),
            function: ToolCallFunctionRef {
                name: fragment.name.clone(),
                arguments: fragment.arguments.clone(),
            },
        }
    }
}

/// Everything needed to issue one generation, constructed fresh per
/// conversation and reused (minus `documents`) for tool-driven
/// continuations.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub model: String,
    pub system_prompt: String,
    pub api_key: String,
    pub api_url: String,
    pub tools: Vec<ToolSpec>,
    pub documents: Vec<Value>,
}

// ---------------------------------------------------------------------------
// Wire body
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatTurn],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolSchema<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    documents: Option<&'a [Value]>,
}

#[derive(Serialize)]
struct ToolSchema<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: ToolFunctionSchema<'a>,
}

#[derive(Serialize)]
struct ToolFunctionSchema<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

/// Serialize the streaming request body.
///
/// `tools` is omitted when the registry is empty; `documents` is attached
/// only on the initial turn of a conversation (`include_documents`). An
/// encoding failure propagates as `InvalidRequest` rather than sending a
/// degenerate body upstream.
pub(crate) fn chat_completion_body(
    request: &GenerationRequest,
    messages: &[ChatTurn],
    include_documents: bool,
) -> Result<Vec<u8>, ChatError> {
    let tools = if request.tools.is_empty() {
        None
    } else {
        Some(
            request
                .tools
                .iter()
                .map(|tool| ToolSchema {
                    kind: "function",
                    function: ToolFunctionSchema {
                        name: &tool.name,
                        description: &tool.description,
                        parameters: &tool.parameters,
                    },
                })
                .collect(),
        )
    };

    let documents = if include_documents && !request.documents.is_empty() {
        Some(request.documents.as_slice())
    } else {
        None
    };

    let body = ChatCompletionBody {
        model: &request.model,
        messages,
        stream: true,
        tools,
        documents,
    };

    serde_json::to_vec(&body)
        .map_err(|err| ChatError::InvalidRequest(format!("Failed to encode request body: {err}")))
}
