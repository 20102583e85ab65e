use kopi_core::domain::tool::ToolDescriptor;
use kopi_core::errors::AgentError;
use serde::Serialize;
use tera::{Context, Tera};

pub const BRAND: &str = "ZUS Coffee";

const SYSTEM_TEMPLATE: &str = r#"You are a friendly and helpful assistant for {{ brand }}. You answer questions about {{ brand }} drinkware products and outlets, and you can do arithmetic.

You have access to the following tools:
{% for tool in tools -%}
- {{ tool.name }}: {{ tool.description }} Argument `{{ tool.parameter }}`: {{ tool.parameter_description }}
{% endfor %}
Rules:
1. To use a tool, reply with ONLY this JSON object and nothing else:
   {"tool_call": {"name": "<tool name>", "arguments": {"<argument>": "<value>"}}}
2. If no tool is needed, reply with a plain natural-language answer.
3. Use at most one tool per user message. After you receive a tool result, answer the user in natural language and DO NOT call any other tool.
4. If a tool result reports an error, politely tell the user what went wrong and do not make up an answer.
5. Use the conversation history to understand follow-up questions."#;

const PRODUCT_ANSWER_TEMPLATE: &str = r#"You are an assistant for {{ brand }}. Answer the user's question based ONLY on the following context about drinkware products. If the context does not contain the answer, say that you do not have that information.

<context>
{{ context }}
</context>

Question: {{ question }}

Answer:"#;

const OUTLET_SQL_TEMPLATE: &str = r#"You translate questions about {{ brand }} outlets into a single SQLite query.

Table `outlets`:
- name TEXT: outlet name, e.g. 'ZUS Coffee SS2'
- address TEXT: full street address
- city TEXT: e.g. 'Kuala Lumpur', 'Petaling Jaya', 'Shah Alam'
- state TEXT: either 'Kuala Lumpur' or 'Selangor'
- status TEXT: either 'Open' or 'Closed'
- operating_hours TEXT: e.g. '8:00 AM - 10:00 PM Daily'

Rules:
- Write exactly one read-only SELECT statement over `outlets`. Never modify data.
- Use LIKE with % wildcards for partial names, areas or addresses.
- Add LIMIT {{ max_rows }} unless the question asks for a count.
- Reply with the SQL only, no explanation.

Question: {{ question }}

SQL:"#;

const OUTLET_ANSWER_TEMPLATE: &str = r#"You are an assistant for {{ brand }}. A database query about outlets was run for the user's question.

Question: {{ question }}
SQL: {{ sql }}
Rows (JSON): {{ rows }}

Answer the question concisely using only these rows. If there are no rows, say that no matching outlets were found.

Answer:"#;

#[derive(Serialize)]
struct PromptTool<'a> {
    name: &'a str,
    description: &'a str,
    parameter: &'a str,
    parameter_description: &'a str,
}

fn brand_context() -> Context {
    let mut context = Context::new();
    context.insert("brand", BRAND);
    context
}

/// Renders the system instruction describing every registered tool.
pub fn render_system_prompt(descriptors: &[ToolDescriptor]) -> Result<String, tera::Error> {
    let tools: Vec<PromptTool<'_>> = descriptors
        .iter()
        .map(|descriptor| {
            let parameter = descriptor.required_parameters().first().copied().unwrap_or("input");
            let parameter_description = descriptor.input_schema["properties"][parameter]
                ["description"]
                .as_str()
                .unwrap_or_default();
            PromptTool {
                name: &descriptor.name,
                description: &descriptor.description,
                parameter,
                parameter_description,
            }
        })
        .collect();

    let mut context = brand_context();
    context.insert("tools", &tools);
    Tera::one_off(SYSTEM_TEMPLATE, &context, false)
}

pub fn render_product_answer(question: &str, context_text: &str) -> Result<String, tera::Error> {
    let mut context = brand_context();
    context.insert("question", question);
    context.insert("context", context_text);
    Tera::one_off(PRODUCT_ANSWER_TEMPLATE, &context, false)
}

pub fn render_outlet_sql(question: &str, max_rows: usize) -> Result<String, tera::Error> {
    let mut context = brand_context();
    context.insert("question", question);
    context.insert("max_rows", &max_rows);
    Tera::one_off(OUTLET_SQL_TEMPLATE, &context, false)
}

pub fn render_outlet_answer(question: &str, sql: &str, rows: &str) -> Result<String, tera::Error> {
    let mut context = brand_context();
    context.insert("question", question);
    context.insert("sql", sql);
    context.insert("rows", rows);
    Tera::one_off(OUTLET_ANSWER_TEMPLATE, &context, false)
}

/// Message handed back to the engine after the turn's single tool call.
pub fn tool_result_message(tool: &str, outcome: &Result<String, AgentError>) -> String {
    match outcome {
        Ok(output) => format!(
            "Tool `{tool}` returned:\n{output}\n\nUsing this result, answer my previous message in natural language. Do not call another tool."
        ),
        Err(error) => format!(
            "Tool `{tool}` failed: {error}\n\nPolitely explain to me that this request could not be completed. Do not call another tool."
        ),
    }
}
