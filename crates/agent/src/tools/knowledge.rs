use std::sync::Arc;

use async_trait::async_trait;
use kopi_core::domain::tool::ToolDescriptor;
use kopi_core::errors::AgentError;
use serde_json::{Map, Value};

use super::{Tool, OUTLET_DATABASE, PRODUCT_INFORMATION};
use crate::retrieval::QuestionAnswerer;

/// A tool that forwards a natural-language `query` to a [`QuestionAnswerer`]
/// and returns its synthesized answer.
pub struct QuestionTool {
    descriptor: ToolDescriptor,
    backend: Arc<dyn QuestionAnswerer>,
}

impl QuestionTool {
    pub fn product_information(backend: Arc<dyn QuestionAnswerer>) -> Self {
        Self {
            descriptor: ToolDescriptor::single_text_input(
                PRODUCT_INFORMATION,
                "Answers questions about ZUS Coffee drinkware products such as cups, mugs and tumblers, including prices, materials and capacity.",
                "query",
                "The user's product question in natural language.",
            ),
            backend,
        }
    }

    pub fn outlet_database(backend: Arc<dyn QuestionAnswerer>) -> Self {
        Self {
            descriptor: ToolDescriptor::single_text_input(
                OUTLET_DATABASE,
                "Answers questions about ZUS Coffee outlets in Kuala Lumpur and Selangor, including locations, addresses, opening status and operating hours.",
                "query",
                "The user's outlet question in natural language.",
            ),
            backend,
        }
    }
}

#[async_trait]
impl Tool for QuestionTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, input: &Map<String, Value>) -> Result<String, AgentError> {
        let query = input.get("query").and_then(Value::as_str).ok_or_else(|| {
            AgentError::validation(format!("{} requires a `query` string", self.descriptor.name))
        })?;

        let answer = self.backend.answer(query).await?;
        Ok(answer.answer)
    }
}
