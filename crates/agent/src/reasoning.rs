use kopi_core::errors::AgentError;
use serde_json::{Map, Value};

/// What the reasoning engine decided for one step of a turn.
#[derive(Clone, Debug, PartialEq)]
pub enum ReasoningReply {
    DirectAnswer(String),
    ToolRequest { name: String, payload: Value },
}

/// Interprets raw engine output.
///
/// A JSON object with a `tool_call` or `final_answer` key becomes the matching
/// variant, even when wrapped in a code fence or surrounded by prose. Any other
/// non-empty text is a direct answer.
pub fn parse_reply(raw: &str) -> Result<ReasoningReply, AgentError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AgentError::upstream("reasoning engine returned an empty reply"));
    }

    let Some(envelope) = extract_json_object(trimmed) else {
        return Ok(ReasoningReply::DirectAnswer(trimmed.to_string()));
    };

    if let Some(call) = envelope.get("tool_call") {
        return Ok(tool_request(call));
    }

    match envelope.get("final_answer") {
        Some(Value::String(answer)) if !answer.trim().is_empty() => {
            Ok(ReasoningReply::DirectAnswer(answer.trim().to_string()))
        }
        _ => Ok(ReasoningReply::DirectAnswer(trimmed.to_string())),
    }
}

fn tool_request(call: &Value) -> ReasoningReply {
    let name = call.get("name").and_then(Value::as_str).unwrap_or_default().trim().to_string();

    let payload = match call.get("arguments") {
        // Some engines send arguments as a JSON-encoded string.
        Some(Value::String(encoded)) => serde_json::from_str::<Value>(encoded)
            .ok()
            .filter(Value::is_object)
            .unwrap_or_else(|| Value::String(encoded.clone())),
        Some(other) => other.clone(),
        None => Value::Object(Map::new()),
    };

    ReasoningReply::ToolRequest { name, payload }
}

fn extract_json_object(text: &str) -> Option<Map<String, Value>> {
    let candidate = fenced_block(text).unwrap_or(text).trim();

    if let Ok(Value::Object(object)) = serde_json::from_str::<Value>(candidate) {
        return Some(object);
    }

    let start = candidate.find('{')?;
    let end = candidate.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&candidate[start..=end]) {
        Ok(Value::Object(object))
            if object.contains_key("tool_call") || object.contains_key("final_answer") =>
        {
            Some(object)
        }
        _ => None,
    }
}

fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_open = &text[open + 3..];
    let body_start = after_open.find('\n').map(|index| index + 1).unwrap_or(0);
    let body = &after_open[body_start..];
    let close = body.find("```")?;
    Some(&body[..close])
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{parse_reply, ReasoningReply};
    use kopi_core::errors::AgentError;

    #[test]
    fn plain_text_is_a_direct_answer() {
        let reply = parse_reply("  Hello! How can I help you today?\n").expect("parse");
        assert_eq!(reply, ReasoningReply::DirectAnswer("Hello! How can I help you today?".into()));
    }

    #[test]
    fn tool_call_envelope_becomes_tool_request() {
        let reply = parse_reply(
            r#"{"tool_call": {"name": "calculator", "arguments": {"expression": "2+2"}}}"#,
        )
        .expect("parse");

        assert_eq!(
            reply,
            ReasoningReply::ToolRequest {
                name: "calculator".into(),
                payload: json!({"expression": "2+2"}),
            }
        );
    }

    #[test]
    fn fenced_and_prose_wrapped_envelopes_are_recognised() {
        let fenced = "```json\n{\"tool_call\": {\"name\": \"zus_outlet_database\", \"arguments\": {\"query\": \"outlets in SS2\"}}}\n```";
        let prose = "Sure, let me check. {\"tool_call\": {\"name\": \"calculator\", \"arguments\": {\"expression\": \"1+1\"}}} One moment.";

        assert!(matches!(
            parse_reply(fenced).expect("fenced"),
            ReasoningReply::ToolRequest { ref name, .. } if name == "zus_outlet_database"
        ));
        assert!(matches!(
            parse_reply(prose).expect("prose"),
            ReasoningReply::ToolRequest { ref name, .. } if name == "calculator"
        ));
    }

    #[test]
    fn string_encoded_arguments_are_decoded() {
        let reply = parse_reply(
            r#"{"tool_call": {"name": "calculator", "arguments": "{\"expression\": \"3*3\"}"}}"#,
        )
        .expect("parse");

        assert_eq!(
            reply,
            ReasoningReply::ToolRequest {
                name: "calculator".into(),
                payload: json!({"expression": "3*3"}),
            }
        );
    }

    #[test]
    fn bare_string_arguments_are_kept_for_the_registry() {
        let reply =
            parse_reply(r#"{"tool_call": {"name": "calculator", "arguments": "7 / 2"}}"#).expect("parse");

        assert_eq!(
            reply,
            ReasoningReply::ToolRequest { name: "calculator".into(), payload: json!("7 / 2") }
        );
    }

    #[test]
    fn final_answer_envelope_is_unwrapped() {
        let reply = parse_reply(r#"{"final_answer": "The result is 4."}"#).expect("parse");
        assert_eq!(reply, ReasoningReply::DirectAnswer("The result is 4.".into()));
    }

    #[test]
    fn unrelated_json_in_prose_stays_a_direct_answer() {
        let text = "Our mug sizes are listed as {\"small\": 350} in the catalog.";
        assert_eq!(parse_reply(text).expect("parse"), ReasoningReply::DirectAnswer(text.into()));
    }

    #[test]
    fn empty_reply_means_the_engine_misbehaved() {
        assert!(matches!(parse_reply("   "), Err(AgentError::UpstreamUnavailable(_))));
    }
}
