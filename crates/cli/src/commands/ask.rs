use std::sync::Arc;

use kopi_agent::{Assistant, HttpLlmClient};
use kopi_core::errors::AgentError;

use crate::commands::{async_runtime, load_config, open_database, CommandResult};

/// Runs one conversational turn with an empty history against the configured engine.
pub fn run(message: &str) -> CommandResult {
    let result = load_config().and_then(|config| {
        async_runtime()?.block_on(async {
            let pool = open_database(&config).await?;
            let llm = HttpLlmClient::from_config(&config.llm)
                .map_err(|error| ("llm_config", error.to_string(), 2))?;
            let assistant = Assistant::assemble(&config, pool.clone(), Arc::new(llm))
                .await
                .map_err(|error| (error.error_class(), error.to_string(), 6))?;

            let reply = assistant
                .runtime
                .respond(&[], message)
                .await
                .map_err(|error| (error.error_class(), error.to_string(), exit_code_for(&error)));

            pool.close().await;
            reply
        })
    });

    match result {
        Ok(reply) => CommandResult::success("ask", reply.content()),
        Err(failure) => CommandResult::from_step("ask", failure),
    }
}

fn exit_code_for(error: &AgentError) -> u8 {
    match error {
        AgentError::Validation(_) => 2,
        AgentError::UpstreamUnavailable(_) => 8,
        _ => 7,
    }
}
