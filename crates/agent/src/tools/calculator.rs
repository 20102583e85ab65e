use async_trait::async_trait;
use kopi_core::calculator::{evaluate, format_number};
use kopi_core::domain::tool::ToolDescriptor;
use kopi_core::errors::AgentError;
use serde_json::{Map, Value};

use super::{Tool, CALCULATOR};

pub struct CalculatorTool {
    descriptor: ToolDescriptor,
}

impl CalculatorTool {
    pub fn new() -> Self {
        Self {
            descriptor: ToolDescriptor::single_text_input(
                CALCULATOR,
                "Evaluates an arithmetic expression. Use it for any math question.",
                "expression",
                "An arithmetic expression using numbers, + - * / ^ and parentheses, e.g. '(12 + 8) * 3'.",
            ),
        }
    }
}

impl Default for CalculatorTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for CalculatorTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, input: &Map<String, Value>) -> Result<String, AgentError> {
        let expression = input
            .get("expression")
            .and_then(Value::as_str)
            .ok_or_else(|| AgentError::validation("calculator requires an `expression` string"))?;

        let value = evaluate(expression)?;
        Ok(format!("Result: {}", format_number(value)))
    }
}

#[cfg(test)]
mod tests {
    use kopi_core::errors::AgentError;
    use serde_json::{json, Map, Value};

    use super::CalculatorTool;
    use crate::tools::Tool;

    fn input(expression: &str) -> Map<String, Value> {
        match json!({ "expression": expression }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn renders_result_line() {
        let tool = CalculatorTool::new();

        assert_eq!(tool.invoke(&input("2 + 3 * 4")).await, Ok("Result: 14".to_string()));
        assert_eq!(tool.invoke(&input("7 / 2")).await, Ok("Result: 3.5".to_string()));
    }

    #[tokio::test]
    async fn division_by_zero_is_a_tool_failure() {
        let tool = CalculatorTool::new();

        let error = tool.invoke(&input("1/0")).await.expect_err("must fail");

        assert!(matches!(error, AgentError::ToolExecution { ref tool, .. } if tool == "calculator"));
    }

    #[tokio::test]
    async fn code_injection_is_a_validation_failure() {
        let tool = CalculatorTool::new();

        let error = tool.invoke(&input("__import__('os').system('ls')")).await.expect_err("reject");

        assert!(matches!(error, AgentError::Validation(_)));
    }
}
