use kopi_core::calculator::{evaluate, format_number};
use kopi_core::errors::AgentError;

use crate::commands::CommandResult;

pub fn run(expression: &str) -> CommandResult {
    match evaluate(expression) {
        Ok(value) => {
            CommandResult::success("calc", format!("{} = {}", expression.trim(), format_number(value)))
        }
        Err(error) => {
            let error = AgentError::from(error);
            let exit_code = if matches!(error, AgentError::Validation(_)) { 2 } else { 7 };
            CommandResult::failure("calc", error.error_class(), error.to_string(), exit_code)
        }
    }
}
