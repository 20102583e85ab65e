use std::sync::Arc;
use std::time::{Duration, Instant};

use kopi_core::config::AppConfig;
use kopi_core::domain::message::{Message, Role};
use kopi_core::domain::tool::ToolInvocation;
use kopi_core::errors::AgentError;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::guardrails::{Denial, GuardrailDecision, GuardrailPolicy};
use crate::llm::{ChatMessage, LlmClient};
use crate::prompt::{render_system_prompt, tool_result_message};
use crate::reasoning::{parse_reply, ReasoningReply};
use crate::tools::ToolRegistry;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    Start,
    Reasoning1,
    DirectAnswer,
    ToolSelected,
    ToolExecuting,
    ToolOk,
    ToolFailed,
    Reasoning2,
    Done,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TurnReport {
    pub correlation_id: String,
    pub reply: Message,
    pub invocation: Option<ToolInvocation>,
    pub transitions: Vec<TurnState>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RuntimeSettings {
    pub reasoning_timeout: Duration,
    pub tool_timeout: Duration,
}

impl RuntimeSettings {
    /// The reasoning deadline covers every retry the client may attempt plus
    /// its backoff, so the client's own error wins over a bare timeout.
    ///
    /// Retrieval-backed tools make up to two engine calls of their own, so
    /// the tool deadline never drops below two reasoning deadlines;
    /// `agent.tool_timeout_secs` only raises it.
    pub fn from_config(config: &AppConfig) -> Self {
        let attempts = u64::from(config.llm.max_retries) + 1;
        let backoff_ms = 250 * (2u64.saturating_pow(config.llm.max_retries) - 1);
        let reasoning_timeout = Duration::from_secs(config.llm.timeout_secs * attempts)
            + Duration::from_millis(backoff_ms)
            + Duration::from_secs(5);
        let tool_timeout =
            Duration::from_secs(config.agent.tool_timeout_secs).max(reasoning_timeout * 2);

        Self { reasoning_timeout, tool_timeout }
    }
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Stateless per-turn orchestrator: holds only immutable collaborators, so one
/// instance is shared across concurrent turns.
pub struct AgentRuntime {
    llm: Arc<dyn LlmClient>,
    registry: Arc<ToolRegistry>,
    guardrails: GuardrailPolicy,
    system_prompt: String,
    settings: RuntimeSettings,
}

impl AgentRuntime {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        registry: Arc<ToolRegistry>,
        guardrails: GuardrailPolicy,
        settings: RuntimeSettings,
    ) -> Result<Self, AgentError> {
        let system_prompt = render_system_prompt(&registry.descriptors())
            .map_err(|error| AgentError::validation(format!("system prompt: {error}")))?;
        Ok(Self { llm, registry, guardrails, system_prompt, settings })
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub async fn respond(&self, history: &[Message], new_message: &str) -> Result<Message, AgentError> {
        let correlation_id = Uuid::new_v4().to_string();
        self.respond_with_report(history, new_message, &correlation_id)
            .await
            .map(|report| report.reply)
    }

    pub async fn respond_with_report(
        &self,
        history: &[Message],
        new_message: &str,
        correlation_id: &str,
    ) -> Result<TurnReport, AgentError> {
        let started = Instant::now();
        let mut transitions = vec![TurnState::Start];

        if let Err(error) = self.guardrails.check_message(new_message) {
            warn!(
                event_name = "agent.turn.rejected",
                correlation_id = %correlation_id,
                error_class = error.error_class(),
                "turn rejected before reasoning"
            );
            return Err(error);
        }

        info!(
            event_name = "agent.turn.started",
            correlation_id = %correlation_id,
            history_len = history.len(),
            message_chars = new_message.chars().count(),
            "turn started"
        );

        let mut messages = self.compose(history, new_message);

        transitions.push(TurnState::Reasoning1);
        let (tool_name, payload) = match self.reason(&messages, correlation_id).await? {
            ReasoningReply::DirectAnswer(text) => {
                transitions.extend([TurnState::DirectAnswer, TurnState::Done]);
                return Ok(self.finish(correlation_id, text, None, transitions, started));
            }
            ReasoningReply::ToolRequest { name, payload } => (name, payload),
        };

        transitions.push(TurnState::ToolSelected);
        info!(
            event_name = "agent.turn.tool_selected",
            correlation_id = %correlation_id,
            tool = %tool_name,
            "tool selected"
        );

        if let GuardrailDecision::Deny(Denial { reason_code, user_message, fallback_path }) =
            self.guardrails.evaluate_tool_request(&tool_name)
        {
            warn!(
                event_name = "agent.turn.tool_denied",
                correlation_id = %correlation_id,
                tool = %tool_name,
                reason_code,
                fallback_path,
                "tool request denied"
            );
            let invocation = ToolInvocation {
                tool_name: tool_name.clone(),
                input: payload,
                outcome: Err(AgentError::UnknownTool(tool_name)),
            };
            transitions.extend([TurnState::ToolFailed, TurnState::Done]);
            return Ok(self.finish(correlation_id, user_message, Some(invocation), transitions, started));
        }

        transitions.push(TurnState::ToolExecuting);
        let outcome = self.execute_tool(&tool_name, &payload, correlation_id).await;
        transitions.push(if outcome.is_ok() { TurnState::ToolOk } else { TurnState::ToolFailed });

        messages.push(ChatMessage::assistant(tool_call_envelope(&tool_name, &payload)));
        messages.push(ChatMessage::user(tool_result_message(&tool_name, &outcome)));
        let invocation = ToolInvocation { tool_name: tool_name.clone(), input: payload, outcome };

        transitions.push(TurnState::Reasoning2);
        let answer = match self.reason(&messages, correlation_id).await? {
            ReasoningReply::DirectAnswer(text) => text,
            ReasoningReply::ToolRequest { name: second, .. } => {
                let rejection = AgentError::MultiHopRejected { first: tool_name, second };
                let Denial { reason_code, user_message, fallback_path } =
                    self.guardrails.deny_follow_up();
                warn!(
                    event_name = "agent.turn.multi_hop_rejected",
                    correlation_id = %correlation_id,
                    error = %rejection,
                    reason_code,
                    fallback_path,
                    "second tool request rejected"
                );
                user_message
            }
        };

        transitions.push(TurnState::Done);
        Ok(self.finish(correlation_id, answer, Some(invocation), transitions, started))
    }

    fn compose(&self, history: &[Message], new_message: &str) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(self.system_prompt.clone()));
        messages.extend(history.iter().map(|message| match message.role() {
            Role::User => ChatMessage::user(message.content()),
            Role::Assistant => ChatMessage::assistant(message.content()),
        }));
        messages.push(ChatMessage::user(new_message));
        messages
    }

    async fn reason(
        &self,
        messages: &[ChatMessage],
        correlation_id: &str,
    ) -> Result<ReasoningReply, AgentError> {
        let timeout = self.settings.reasoning_timeout;
        let raw = match tokio::time::timeout(timeout, self.llm.chat(messages)).await {
            Ok(result) => result.map_err(AgentError::from),
            Err(_) => Err(AgentError::upstream(format!(
                "no reply from reasoning engine within {}ms",
                timeout.as_millis()
            ))),
        };

        match raw {
            Ok(raw) => parse_reply(&raw),
            Err(error) => {
                warn!(
                    event_name = "agent.turn.upstream_unavailable",
                    correlation_id = %correlation_id,
                    error = %error,
                    "reasoning engine call failed"
                );
                Err(error)
            }
        }
    }

    /// Runs the tool on its own task so a panic or a hang is contained.
    async fn execute_tool(
        &self,
        name: &str,
        payload: &Value,
        correlation_id: &str,
    ) -> Result<String, AgentError> {
        let started = Instant::now();
        let (tool, input) = self.registry.prepare(name, payload)?;

        let mut handle = tokio::spawn(async move { tool.invoke(&input).await });
        let outcome = match tokio::time::timeout(self.settings.tool_timeout, &mut handle).await {
            Ok(Ok(result)) => result.map_err(|error| contain(name, error)),
            Ok(Err(join_error)) if join_error.is_panic() => {
                Err(AgentError::tool(name, "tool panicked while running"))
            }
            Ok(Err(_)) => Err(AgentError::tool(name, "tool task was cancelled")),
            Err(_) => {
                handle.abort();
                Err(AgentError::tool(
                    name,
                    format!("timed out after {}ms", self.settings.tool_timeout.as_millis()),
                ))
            }
        };

        match &outcome {
            Ok(output) => info!(
                event_name = "agent.turn.tool_ok",
                correlation_id = %correlation_id,
                tool = %name,
                output_chars = output.chars().count(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "tool completed"
            ),
            Err(error) => warn!(
                event_name = "agent.turn.tool_failed",
                correlation_id = %correlation_id,
                tool = %name,
                error_class = error.error_class(),
                error = %error,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "tool failed"
            ),
        }

        outcome
    }

    fn finish(
        &self,
        correlation_id: &str,
        answer: String,
        invocation: Option<ToolInvocation>,
        transitions: Vec<TurnState>,
        started: Instant,
    ) -> TurnReport {
        info!(
            event_name = "agent.turn.completed",
            correlation_id = %correlation_id,
            tool = invocation.as_ref().map(|call| call.tool_name.as_str()).unwrap_or("none"),
            answer_chars = answer.chars().count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "turn completed"
        );

        TurnReport {
            correlation_id: correlation_id.to_string(),
            reply: Message::assistant(answer),
            invocation,
            transitions,
        }
    }
}

fn tool_call_envelope(name: &str, payload: &Value) -> String {
    serde_json::json!({ "tool_call": { "name": name, "arguments": payload } }).to_string()
}

/// Keeps a tool's own failure inside the turn. A backend that reports its
/// engine as unreachable is a tool failure here, not a reasoning outage.
fn contain(tool: &str, error: AgentError) -> AgentError {
    if error.is_contained() || matches!(error, AgentError::Validation(_)) {
        error
    } else {
        AgentError::tool(tool, error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use kopi_core::domain::message::{Message, Role};
    use kopi_core::errors::AgentError;

    use super::{AgentRuntime, RuntimeSettings, TurnState};
    use crate::guardrails::{GuardrailPolicy, MULTI_HOP_MESSAGE, UNKNOWN_TOOL_MESSAGE};
    use crate::llm::{ChatRole, LlmError};
    use crate::retrieval::{Answer, QuestionAnswerer};
    use crate::testing::ScriptedLlm;
    use crate::tools::ToolRegistry;

    enum Backend {
        Echo,
        Failing,
        EngineDown,
        Panicking,
        Slow,
    }

    #[async_trait]
    impl QuestionAnswerer for Backend {
        async fn answer(&self, question: &str) -> Result<Answer, AgentError> {
            match self {
                Self::Echo => Ok(Answer { answer: format!("found: {question}"), context: String::new() }),
                Self::Failing => Err(AgentError::tool("zus_product_information", "index unreachable")),
                Self::EngineDown => Err(AgentError::upstream("HTTP 503")),
                Self::Panicking => panic!("backend exploded"),
                Self::Slow => {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(Answer { answer: "too late".to_string(), context: String::new() })
                }
            }
        }
    }

    fn settings() -> RuntimeSettings {
        RuntimeSettings {
            reasoning_timeout: Duration::from_secs(2),
            tool_timeout: Duration::from_millis(100),
        }
    }

    fn runtime_with(llm: Arc<ScriptedLlm>, products: Backend) -> AgentRuntime {
        let registry = ToolRegistry::standard(Arc::new(products), Arc::new(Backend::Echo));
        AgentRuntime::new(llm, Arc::new(registry), GuardrailPolicy::default(), settings())
            .expect("runtime")
    }

    fn runtime(llm: Arc<ScriptedLlm>) -> AgentRuntime {
        runtime_with(llm, Backend::Echo)
    }

    fn tool_call(name: &str, arguments: serde_json::Value) -> String {
        serde_json::json!({ "tool_call": { "name": name, "arguments": arguments } }).to_string()
    }

    #[tokio::test]
    async fn first_turn_direct_answer_returns_one_assistant_message() {
        let llm = Arc::new(ScriptedLlm::new(["Hi! How can I help you today?"]));
        let runtime = runtime(llm.clone());

        let report = runtime.respond_with_report(&[], "hello", "turn-1").await.expect("respond");

        assert_eq!(report.reply.role(), Role::Assistant);
        assert_eq!(report.reply.content(), "Hi! How can I help you today?");
        assert!(report.invocation.is_none());
        assert_eq!(
            report.transitions,
            vec![TurnState::Start, TurnState::Reasoning1, TurnState::DirectAnswer, TurnState::Done]
        );

        let requests = llm.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].len(), 2);
        assert_eq!(requests[0][0].role, ChatRole::System);
        assert!(requests[0][0].content.contains("zus_outlet_database"));
        assert_eq!(requests[0][1].content, "hello");
    }

    #[tokio::test]
    async fn history_is_round_tripped_in_order_and_left_untouched() {
        let llm = Arc::new(ScriptedLlm::new(["Your first question was 2+2, and the answer was 4."]));
        let runtime = runtime(llm.clone());
        let history = vec![Message::user("what is 2+2"), Message::assistant("2 + 2 = 4")];
        let snapshot = history.clone();

        let reply = runtime
            .respond(&history, "what was the answer to my first question")
            .await
            .expect("respond");

        assert!(reply.content().contains('4'));
        assert_eq!(history, snapshot);

        let sent = &llm.requests()[0];
        let contents: Vec<(ChatRole, &str)> =
            sent.iter().skip(1).map(|message| (message.role, message.content.as_str())).collect();
        assert_eq!(
            contents,
            vec![
                (ChatRole::User, "what is 2+2"),
                (ChatRole::Assistant, "2 + 2 = 4"),
                (ChatRole::User, "what was the answer to my first question"),
            ]
        );
    }

    #[tokio::test]
    async fn tool_turn_runs_one_tool_then_synthesizes() {
        let llm = Arc::new(ScriptedLlm::new([
            tool_call("calculator", serde_json::json!({"expression": "2+2"})),
            "2 + 2 equals 4.".to_string(),
        ]));
        let runtime = runtime(llm.clone());

        let report = runtime.respond_with_report(&[], "what is 2+2?", "turn-2").await.expect("respond");

        assert_eq!(report.reply.content(), "2 + 2 equals 4.");
        let invocation = report.invocation.expect("invocation");
        assert_eq!(invocation.tool_name, "calculator");
        assert_eq!(invocation.outcome, Ok("Result: 4".to_string()));
        assert_eq!(
            report.transitions,
            vec![
                TurnState::Start,
                TurnState::Reasoning1,
                TurnState::ToolSelected,
                TurnState::ToolExecuting,
                TurnState::ToolOk,
                TurnState::Reasoning2,
                TurnState::Done,
            ]
        );

        let second = &llm.requests()[1];
        let last = second.last().expect("tool result message");
        assert_eq!(last.role, ChatRole::User);
        assert!(last.content.contains("Result: 4"));
        assert!(second[second.len() - 2].content.contains("\"tool_call\""));
    }

    #[tokio::test]
    async fn failing_backend_degrades_to_an_apology() {
        let llm = Arc::new(ScriptedLlm::new([
            tool_call("zus_product_information", serde_json::json!({"query": "tumbler price"})),
            "Sorry, I couldn't look up product details right now.".to_string(),
        ]));
        let runtime = runtime_with(llm.clone(), Backend::Failing);

        let report =
            runtime.respond_with_report(&[], "how much is the tumbler?", "turn-3").await.expect("respond");

        assert_eq!(report.reply.content(), "Sorry, I couldn't look up product details right now.");
        assert!(report.transitions.contains(&TurnState::ToolFailed));
        assert!(!report.invocation.expect("invocation").succeeded());
        assert!(llm.requests()[1].last().expect("result").content.contains("index unreachable"));
    }

    #[tokio::test]
    async fn backend_engine_outage_stays_inside_the_turn() {
        let llm = Arc::new(ScriptedLlm::new([
            tool_call("zus_product_information", serde_json::json!({"query": "mugs"})),
            "Sorry, product details are unavailable right now.".to_string(),
        ]));
        let runtime = runtime_with(llm, Backend::EngineDown);

        let report = runtime.respond_with_report(&[], "mugs?", "turn-3b").await.expect("respond");

        assert!(matches!(
            report.invocation.expect("invocation").outcome,
            Err(AgentError::ToolExecution { ref tool, ref message })
                if tool == "zus_product_information" && message.contains("HTTP 503")
        ));
        assert_eq!(report.reply.content(), "Sorry, product details are unavailable right now.");
    }

    #[tokio::test]
    async fn panicking_backend_is_contained() {
        let llm = Arc::new(ScriptedLlm::new([
            tool_call("zus_product_information", serde_json::json!({"query": "mugs"})),
            "Sorry, something went wrong.".to_string(),
        ]));
        let runtime = runtime_with(llm, Backend::Panicking);

        let report = runtime.respond_with_report(&[], "mugs?", "turn-4").await.expect("respond");

        let invocation = report.invocation.expect("invocation");
        assert!(matches!(
            invocation.outcome,
            Err(AgentError::ToolExecution { ref message, .. }) if message.contains("panicked")
        ));
        assert_eq!(report.reply.content(), "Sorry, something went wrong.");
    }

    #[tokio::test]
    async fn hung_backend_times_out() {
        let llm = Arc::new(ScriptedLlm::new([
            tool_call("zus_product_information", serde_json::json!({"query": "mugs"})),
            "Sorry, that took too long.".to_string(),
        ]));
        let runtime = runtime_with(llm, Backend::Slow);

        let report = runtime.respond_with_report(&[], "mugs?", "turn-5").await.expect("respond");

        assert!(matches!(
            report.invocation.expect("invocation").outcome,
            Err(AgentError::ToolExecution { ref message, .. }) if message.contains("timed out")
        ));
    }

    #[tokio::test]
    async fn unknown_tool_falls_back_without_second_call() {
        let llm = Arc::new(ScriptedLlm::new([tool_call("weather", serde_json::json!({"city": "KL"}))]));
        let runtime = runtime(llm.clone());

        let report = runtime.respond_with_report(&[], "weather in KL?", "turn-6").await.expect("respond");

        assert_eq!(report.reply.content(), UNKNOWN_TOOL_MESSAGE);
        assert_eq!(
            report.invocation.expect("invocation").outcome,
            Err(AgentError::UnknownTool("weather".to_string()))
        );
        assert_eq!(llm.call_count(), 1);
        assert_eq!(report.transitions.last(), Some(&TurnState::Done));
    }

    #[tokio::test]
    async fn second_tool_request_is_rejected_with_fallback() {
        let llm = Arc::new(ScriptedLlm::new([
            tool_call("calculator", serde_json::json!({"expression": "3*5"})),
            tool_call("zus_outlet_database", serde_json::json!({"query": "outlets in SS2"})),
        ]));
        let runtime = runtime(llm.clone());

        let report = runtime
            .respond_with_report(&[], "3*5 and outlets in SS2?", "turn-7")
            .await
            .expect("respond");

        assert_eq!(report.reply.content(), MULTI_HOP_MESSAGE);
        assert_eq!(llm.call_count(), 2);
        let invocation = report.invocation.expect("first invocation kept");
        assert_eq!(invocation.tool_name, "calculator");
        assert_eq!(invocation.outcome, Ok("Result: 15".to_string()));
    }

    #[tokio::test]
    async fn schema_violation_is_fed_back_to_the_engine() {
        let llm = Arc::new(ScriptedLlm::new([
            tool_call("calculator", serde_json::json!({"expr": "1+1"})),
            "Sorry, I couldn't run that calculation.".to_string(),
        ]));
        let runtime = runtime(llm.clone());

        let report = runtime.respond_with_report(&[], "1+1", "turn-8").await.expect("respond");

        assert!(matches!(
            report.invocation.expect("invocation").outcome,
            Err(AgentError::Validation(_))
        ));
        assert_eq!(report.reply.content(), "Sorry, I couldn't run that calculation.");
        assert!(llm.requests()[1].last().expect("result").content.contains("unexpected argument `expr`"));
    }

    #[tokio::test]
    async fn blank_message_is_rejected_before_reasoning() {
        let llm = Arc::new(ScriptedLlm::new(["unused"]));
        let runtime = runtime(llm.clone());

        let result = runtime.respond(&[], "   ").await;

        assert!(matches!(result, Err(AgentError::Validation(_))));
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn unreachable_engine_is_surfaced_as_upstream_unavailable() {
        let llm = Arc::new(ScriptedLlm::with_results([Err(LlmError::Status {
            status: 503,
            body: "overloaded".to_string(),
        })]));
        let runtime = runtime(llm);

        let result = runtime.respond(&[], "hello").await;

        assert!(matches!(result, Err(AgentError::UpstreamUnavailable(_))));
    }

    #[tokio::test]
    async fn slow_engine_hits_reasoning_deadline() {
        let llm = Arc::new(ScriptedLlm::new(["late"]).delayed(Duration::from_millis(500)));
        let registry = ToolRegistry::standard(Arc::new(Backend::Echo), Arc::new(Backend::Echo));
        let runtime = AgentRuntime::new(
            llm,
            Arc::new(registry),
            GuardrailPolicy::default(),
            RuntimeSettings {
                reasoning_timeout: Duration::from_millis(20),
                tool_timeout: Duration::from_secs(1),
            },
        )
        .expect("runtime");

        let result = runtime.respond(&[], "hello").await;

        assert!(matches!(result, Err(AgentError::UpstreamUnavailable(ref message)) if message.contains("within")));
    }

    #[tokio::test]
    async fn concurrent_turns_share_one_runtime() {
        let llm = Arc::new(ScriptedLlm::new(["first", "second"]));
        let runtime = Arc::new(runtime(llm.clone()));

        let a = tokio::spawn({
            let runtime = Arc::clone(&runtime);
            async move { runtime.respond(&[], "one").await }
        });
        let b = tokio::spawn({
            let runtime = Arc::clone(&runtime);
            async move { runtime.respond(&[], "two").await }
        });

        let mut replies = vec![
            a.await.expect("join").expect("respond").content().to_string(),
            b.await.expect("join").expect("respond").content().to_string(),
        ];
        replies.sort();

        assert_eq!(replies, vec!["first", "second"]);
        assert_eq!(llm.call_count(), 2);
    }

    #[test]
    fn deadlines_cover_client_retries() {
        let mut config = kopi_core::config::AppConfig::default();
        config.llm.timeout_secs = 10;
        config.llm.max_retries = 2;
        config.agent.tool_timeout_secs = 30;

        let settings = RuntimeSettings::from_config(&config);

        assert_eq!(settings.reasoning_timeout, Duration::from_millis(30_000 + 750 + 5_000));
        assert_eq!(settings.tool_timeout, Duration::from_millis(2 * 35_750));
    }

    #[test]
    fn tool_deadline_outlasts_two_engine_calls_with_retries() {
        let settings = RuntimeSettings::default();
        assert!(settings.tool_timeout >= settings.reasoning_timeout * 2);

        let mut config = kopi_core::config::AppConfig::default();
        config.llm.timeout_secs = 5;
        config.llm.max_retries = 0;
        config.agent.tool_timeout_secs = 120;

        let settings = RuntimeSettings::from_config(&config);

        assert_eq!(settings.reasoning_timeout, Duration::from_secs(10));
        assert_eq!(settings.tool_timeout, Duration::from_secs(120));
    }
}
