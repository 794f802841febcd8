//! Tool-related type definitions.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A tool the caller offers to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    /// Namespaced tool name
    pub name: String,
    /// Description of what the tool does
    pub description: String,
    /// JSON schema for the tool's input parameters
    pub input_schema: Value,
}

impl Tool {
    /// Create a new tool declaration
    pub fn new<S: Into<String>>(name: S, description: S, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// Extra information attached to a finished tool call
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ToolCallMetadata {
    /// Description of the declared tool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Input schema of the declared tool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
    /// Diagnostic captured when the arguments could not be parsed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,
}

/// A finished tool call proposed by the model.
///
/// Only the tool-call accumulator creates these. `arguments` is always an
/// object; unparseable vendor output leaves it empty and records a
/// `parse_error` in the metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Identifier unique within the turn
    pub id: String,
    /// Name of the tool to call
    pub name: String,
    /// Input parameters for the tool
    pub arguments: Map<String, Value>,
    /// Optional metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ToolCallMetadata>,
}

impl ToolCall {
    /// The captured argument parse error, if any
    pub fn parse_error(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|meta| meta.parse_error.as_deref())
    }
}

/// Result of a tool call, supplied by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Identifier of the tool call this answers
    pub id: String,
    /// Free-form result content
    pub content: String,
}

impl ToolResult {
    /// Create a tool result
    pub fn new<S: Into<String>>(id: S, content: S) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
        }
    }
}
