use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::AgentError;

/// Static description of a registered tool, shown to the reasoning engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl ToolDescriptor {
    /// Descriptor for a tool taking exactly one required string parameter.
    pub fn single_text_input(
        name: impl Into<String>,
        description: impl Into<String>,
        parameter: &str,
        parameter_description: &str,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    parameter: { "type": "string", "description": parameter_description }
                },
                "required": [parameter],
                "additionalProperties": false
            }),
        }
    }

    pub fn required_parameters(&self) -> Vec<&str> {
        self.input_schema
            .get("required")
            .and_then(Value::as_array)
            .map(|required| required.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

/// Record of the single tool call made during one turn. Never persisted.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolInvocation {
    pub tool_name: String,
    pub input: Value,
    pub outcome: Result<String, AgentError>,
}

impl ToolInvocation {
    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }
}
