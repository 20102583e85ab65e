use kopi_core::errors::AgentError;

pub const UNKNOWN_TOOL_MESSAGE: &str = "Sorry, I can't help with that request. I can do calculations and answer questions about ZUS Coffee drinkware products and outlets.";
pub const MULTI_HOP_MESSAGE: &str = "Sorry, I can only look up one thing per question. Could you ask the second part separately?";

/// A refused tool request and the templated reply that ends the turn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Denial {
    pub reason_code: &'static str,
    pub user_message: String,
    pub fallback_path: &'static str,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow,
    Deny(Denial),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuardrailPolicy {
    pub max_message_chars: usize,
    pub allowed_tools: Vec<String>,
}

impl Default for GuardrailPolicy {
    fn default() -> Self {
        Self {
            max_message_chars: 4_000,
            allowed_tools: vec![
                crate::tools::CALCULATOR.to_string(),
                crate::tools::PRODUCT_INFORMATION.to_string(),
                crate::tools::OUTLET_DATABASE.to_string(),
            ],
        }
    }
}

impl GuardrailPolicy {
    pub fn new(max_message_chars: usize, allowed_tools: Vec<String>) -> Self {
        Self { max_message_chars, allowed_tools }
    }

    /// Rejects input that must never be forwarded to the reasoning engine.
    pub fn check_message(&self, message: &str) -> Result<(), AgentError> {
        if message.trim().is_empty() {
            return Err(AgentError::validation("message must not be empty"));
        }

        let length = message.chars().count();
        if length > self.max_message_chars {
            return Err(AgentError::validation(format!(
                "message is {length} characters long; the limit is {}",
                self.max_message_chars
            )));
        }

        Ok(())
    }

    /// Decides whether the first tool request of a turn may run.
    pub fn evaluate_tool_request(&self, tool: &str) -> GuardrailDecision {
        if self.allowed_tools.iter().any(|allowed| allowed == tool) {
            return GuardrailDecision::Allow;
        }

        GuardrailDecision::Deny(Denial {
            reason_code: "unknown_tool",
            user_message: UNKNOWN_TOOL_MESSAGE.to_string(),
            fallback_path: "capabilities_overview",
        })
    }

    /// A turn runs at most one tool, so any further request is refused.
    pub fn deny_follow_up(&self) -> Denial {
        Denial {
            reason_code: "multi_hop_disallowed",
            user_message: MULTI_HOP_MESSAGE.to_string(),
            fallback_path: "ask_separately",
        }
    }
}

#[cfg(test)]
mod tests {
    use kopi_core::errors::AgentError;

    use super::{Denial, GuardrailDecision, GuardrailPolicy};

    #[test]
    fn registered_tool_allow() {
        let policy = GuardrailPolicy::default();
        assert_eq!(policy.evaluate_tool_request("calculator"), GuardrailDecision::Allow);
    }

    #[test]
    fn unknown_tool_denial() {
        let policy = GuardrailPolicy::default();

        let GuardrailDecision::Deny(Denial { reason_code, user_message, fallback_path }) =
            policy.evaluate_tool_request("weather_lookup")
        else {
            panic!("unknown tools must be denied");
        };

        assert_eq!(reason_code, "unknown_tool");
        assert!(user_message.contains("can't help with that"));
        assert_eq!(fallback_path, "capabilities_overview");
    }

    #[test]
    fn follow_up_tool_request_denial() {
        let denial = GuardrailPolicy::default().deny_follow_up();

        assert_eq!(denial.reason_code, "multi_hop_disallowed");
        assert_eq!(denial.fallback_path, "ask_separately");
        assert!(denial.user_message.contains("one thing per question"));
    }

    #[test]
    fn blank_and_oversized_messages_are_rejected() {
        let policy = GuardrailPolicy::new(10, Vec::new());

        assert!(matches!(policy.check_message(" \n\t "), Err(AgentError::Validation(_))));
        assert!(matches!(policy.check_message("12345678901"), Err(AgentError::Validation(_))));
        assert_eq!(policy.check_message("hello"), Ok(()));
    }
}
