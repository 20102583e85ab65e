use std::sync::Arc;

use async_trait::async_trait;
use kopi_core::domain::tool::ToolDescriptor;
use kopi_core::errors::AgentError;
use serde_json::{Map, Value};

use crate::retrieval::QuestionAnswerer;

pub mod calculator;
pub mod knowledge;

pub use calculator::CalculatorTool;
pub use knowledge::QuestionTool;

pub const CALCULATOR: &str = "calculator";
pub const PRODUCT_INFORMATION: &str = "zus_product_information";
pub const OUTLET_DATABASE: &str = "zus_outlet_database";

#[async_trait]
pub trait Tool: Send + Sync {
    fn descriptor(&self) -> &ToolDescriptor;

    /// Runs the tool on a payload that already satisfies its input schema.
    async fn invoke(&self, input: &Map<String, Value>) -> Result<String, AgentError>;
}

/// The closed set of tools the reasoning engine may request.
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn standard(
        products: Arc<dyn QuestionAnswerer>,
        outlets: Arc<dyn QuestionAnswerer>,
    ) -> Self {
        Self {
            tools: vec![
                Arc::new(CalculatorTool::new()),
                Arc::new(QuestionTool::product_information(products)),
                Arc::new(QuestionTool::outlet_database(outlets)),
            ],
        }
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|tool| tool.descriptor().clone()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|tool| tool.descriptor().name.as_str()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    fn lookup(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|tool| tool.descriptor().name == name)
    }

    /// Resolves the tool and checks the payload against its schema.
    pub fn prepare(
        &self,
        name: &str,
        payload: &Value,
    ) -> Result<(Arc<dyn Tool>, Map<String, Value>), AgentError> {
        let tool = self.lookup(name).ok_or_else(|| AgentError::UnknownTool(name.to_string()))?;
        let input = validate_payload(tool.descriptor(), payload)?;
        Ok((Arc::clone(tool), input))
    }

    pub async fn dispatch(&self, name: &str, payload: &Value) -> Result<String, AgentError> {
        let (tool, input) = self.prepare(name, payload)?;
        tool.invoke(&input).await
    }
}

/// Checks a payload against the JSON-Schema subset used by tool descriptors:
/// an object of string properties with a `required` list and no extra keys.
pub fn validate_payload(
    descriptor: &ToolDescriptor,
    payload: &Value,
) -> Result<Map<String, Value>, AgentError> {
    let name = &descriptor.name;
    let schema = &descriptor.input_schema;
    let properties = schema.get("properties").and_then(Value::as_object);
    let required = descriptor.required_parameters();

    let input = match payload {
        Value::Object(map) => map.clone(),
        Value::String(text) if required.len() == 1 => {
            let mut map = Map::new();
            map.insert(required[0].to_string(), Value::String(text.clone()));
            map
        }
        Value::Null if required.is_empty() => Map::new(),
        other => {
            return Err(AgentError::validation(format!(
                "arguments for `{name}` must be a JSON object, got {}",
                json_type(other)
            )))
        }
    };

    let closed = schema.get("additionalProperties").and_then(Value::as_bool) == Some(false);
    if closed {
        if let Some(unknown) = input
            .keys()
            .find(|key| properties.map(|props| !props.contains_key(*key)).unwrap_or(true))
        {
            return Err(AgentError::validation(format!(
                "unexpected argument `{unknown}` for `{name}`"
            )));
        }
    }

    for key in &required {
        if !input.contains_key(*key) {
            return Err(AgentError::validation(format!("missing argument `{key}` for `{name}`")));
        }
    }

    for (key, value) in &input {
        let declared_type = properties
            .and_then(|props| props.get(key))
            .and_then(|property| property.get("type"))
            .and_then(Value::as_str);
        if declared_type == Some("string") {
            match value {
                Value::String(text) if text.trim().is_empty() && required.contains(&key.as_str()) => {
                    return Err(AgentError::validation(format!(
                        "argument `{key}` for `{name}` must not be blank"
                    )))
                }
                Value::String(_) => {}
                other => {
                    return Err(AgentError::validation(format!(
                        "argument `{key}` for `{name}` must be a string, got {}",
                        json_type(other)
                    )))
                }
            }
        }
    }

    Ok(input)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use kopi_core::domain::tool::ToolDescriptor;
    use kopi_core::errors::AgentError;
    use serde_json::json;

    use super::{validate_payload, ToolRegistry, CALCULATOR, OUTLET_DATABASE, PRODUCT_INFORMATION};
    use crate::retrieval::{Answer, QuestionAnswerer};

    struct EchoAnswerer(&'static str);

    #[async_trait]
    impl QuestionAnswerer for EchoAnswerer {
        async fn answer(&self, question: &str) -> Result<Answer, AgentError> {
            Ok(Answer { answer: format!("{}: {question}", self.0), context: String::new() })
        }
    }

    fn registry() -> ToolRegistry {
        ToolRegistry::standard(Arc::new(EchoAnswerer("products")), Arc::new(EchoAnswerer("outlets")))
    }

    #[test]
    fn registry_is_exactly_the_three_tools() {
        let registry = registry();

        assert_eq!(registry.names(), vec![CALCULATOR, PRODUCT_INFORMATION, OUTLET_DATABASE]);
        assert_eq!(registry.len(), 3);
        assert!(!registry.contains("weather"));
        assert!(registry
            .descriptors()
            .iter()
            .all(|descriptor| descriptor.input_schema["additionalProperties"] == false));
    }

    #[tokio::test]
    async fn dispatch_routes_to_each_backend() {
        let registry = registry();

        assert_eq!(
            registry.dispatch(CALCULATOR, &json!({"expression": "6*7"})).await,
            Ok("Result: 42".to_string())
        );
        assert_eq!(
            registry.dispatch(PRODUCT_INFORMATION, &json!({"query": "tumblers"})).await,
            Ok("products: tumblers".to_string())
        );
        assert_eq!(
            registry.dispatch(OUTLET_DATABASE, &json!("outlets in SS2")).await,
            Ok("outlets: outlets in SS2".to_string()),
            "bare string payload is wrapped for single-parameter tools"
        );
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_by_name() {
        let result = registry().dispatch("weather", &json!({"city": "KL"})).await;
        assert_eq!(result, Err(AgentError::UnknownTool("weather".to_string())));
    }

    #[test]
    fn schema_violations_are_validation_errors() {
        let descriptor =
            ToolDescriptor::single_text_input("calculator", "math", "expression", "expr");

        let cases = [
            (json!({}), "missing argument `expression`"),
            (json!({"expression": 5}), "must be a string, got number"),
            (json!({"expression": "   "}), "must not be blank"),
            (json!({"expression": "1+1", "mode": "fast"}), "unexpected argument `mode`"),
            (json!([1, 2]), "must be a JSON object, got array"),
        ];

        for (payload, expected) in cases {
            match validate_payload(&descriptor, &payload) {
                Err(AgentError::Validation(message)) => {
                    assert!(message.contains(expected), "`{message}` should contain `{expected}`")
                }
                other => panic!("expected validation error for {payload}, got {other:?}"),
            }
        }
    }
}
