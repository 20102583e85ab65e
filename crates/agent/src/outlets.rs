use std::sync::Arc;

use async_trait::async_trait;
use kopi_core::errors::AgentError;
use kopi_db::repositories::{OutletRepository, MAX_READ_ROWS};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::llm::{ChatMessage, LlmClient};
use crate::prompt::{render_outlet_answer, render_outlet_sql};
use crate::retrieval::{Answer, QuestionAnswerer};
use crate::tools::OUTLET_DATABASE;

const FORBIDDEN_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "REPLACE", "UPSERT", "DROP", "ALTER", "CREATE", "TRUNCATE",
    "ATTACH", "DETACH", "PRAGMA", "VACUUM", "REINDEX", "ANALYZE", "GRANT", "REVOKE",
];

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SqlRejection {
    #[error("no SQL statement was produced")]
    Empty,
    #[error("only a single statement is allowed")]
    MultipleStatements,
    #[error("only SELECT queries are allowed")]
    NotASelect,
    #[error("keyword `{0}` is not allowed in a read-only query")]
    ForbiddenKeyword(String),
}

/// Vets generated SQL before it reaches the database.
pub struct SqlGuard;

impl SqlGuard {
    /// Returns the cleaned statement when it is a single read-only query.
    pub fn vet(raw: &str) -> Result<String, SqlRejection> {
        let statement = clean_statement(raw);
        if statement.is_empty() {
            return Err(SqlRejection::Empty);
        }

        let unquoted = blank_string_literals(&statement);
        if unquoted.contains(';') {
            return Err(SqlRejection::MultipleStatements);
        }

        let upper = unquoted.to_ascii_uppercase();
        let mut words = upper
            .split(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_'))
            .filter(|word| !word.is_empty());

        match words.next() {
            Some("SELECT") | Some("WITH") => {}
            _ => return Err(SqlRejection::NotASelect),
        }

        if let Some(keyword) = words.find(|word| FORBIDDEN_KEYWORDS.contains(word)) {
            return Err(SqlRejection::ForbiddenKeyword(keyword.to_string()));
        }

        Ok(statement)
    }
}

fn clean_statement(raw: &str) -> String {
    let mut text = raw.trim();
    if let Some(open) = text.find("```") {
        let after_open = &text[open + 3..];
        let body_start = after_open.find('\n').map(|index| index + 1).unwrap_or(0);
        let body = &after_open[body_start..];
        text = body.find("```").map(|close| &body[..close]).unwrap_or(body);
    }

    let text = text.trim();
    let text = text
        .strip_prefix("SQL:")
        .or_else(|| text.strip_prefix("sql:"))
        .unwrap_or(text)
        .trim();

    let text = strip_line_comments(text);
    text.trim().trim_end_matches(|ch: char| ch == ';' || ch.is_whitespace()).to_string()
}

/// Drops `--` comments that sit outside string literals.
fn strip_line_comments(sql: &str) -> String {
    let mut output = String::with_capacity(sql.len());
    let mut in_literal = false;
    let mut chars = sql.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\'' {
            in_literal = !in_literal;
        } else if !in_literal && ch == '-' && chars.peek() == Some(&'-') {
            while chars.peek().is_some_and(|next| *next != '\n') {
                chars.next();
            }
            continue;
        }
        output.push(ch);
    }
    output
}

/// Replaces the contents of single-quoted literals so keywords inside string
/// values (`LIKE '%Update%'`) do not trip the guard.
fn blank_string_literals(sql: &str) -> String {
    let mut output = String::with_capacity(sql.len());
    let mut in_literal = false;
    for ch in sql.chars() {
        if ch == '\'' {
            in_literal = !in_literal;
            output.push(ch);
        } else if in_literal {
            output.push(' ');
        } else {
            output.push(ch);
        }
    }
    output
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OutletAnswer {
    pub sql: String,
    pub answer: String,
    pub rows: usize,
}

/// Answers outlet questions by generating SQL, vetting it with [`SqlGuard`],
/// running it read-only and summarising the rows.
pub struct OutletDirectory {
    repository: Arc<dyn OutletRepository>,
    llm: Arc<dyn LlmClient>,
    max_rows: usize,
}

impl OutletDirectory {
    pub fn new(repository: Arc<dyn OutletRepository>, llm: Arc<dyn LlmClient>) -> Self {
        Self { repository, llm, max_rows: MAX_READ_ROWS }
    }

    pub async fn answer_with_sql(&self, question: &str) -> Result<OutletAnswer, AgentError> {
        let sql_prompt = render_outlet_sql(question, self.max_rows).map_err(tool_error)?;
        let generated =
            self.llm.chat(&[ChatMessage::user(sql_prompt)]).await.map_err(tool_error)?;

        let sql = SqlGuard::vet(&generated).map_err(|rejection| {
            AgentError::tool(OUTLET_DATABASE, format!("generated query was rejected: {rejection}"))
        })?;

        let rows = self.repository.run_read_only(&sql, self.max_rows).await.map_err(|error| {
            AgentError::tool(OUTLET_DATABASE, format!("outlet query failed: {error}"))
        })?;
        debug!(
            event_name = "agent.outlets.query_executed",
            rows = rows.len(),
            "outlet query executed"
        );

        let rows_json = serde_json::to_string(&rows).map_err(tool_error)?;
        let answer_prompt = render_outlet_answer(question, &sql, &rows_json).map_err(tool_error)?;
        let answer =
            self.llm.chat(&[ChatMessage::user(answer_prompt)]).await.map_err(tool_error)?;

        Ok(OutletAnswer { sql, answer: answer.trim().to_string(), rows: rows.len() })
    }
}

fn tool_error(error: impl std::fmt::Display) -> AgentError {
    AgentError::tool(OUTLET_DATABASE, error.to_string())
}

#[async_trait]
impl QuestionAnswerer for OutletDirectory {
    async fn answer(&self, question: &str) -> Result<Answer, AgentError> {
        let outcome = self.answer_with_sql(question).await?;
        Ok(Answer { answer: outcome.answer, context: outcome.sql })
    }
}
