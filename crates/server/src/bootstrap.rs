use std::sync::Arc;

use kopi_agent::{AssemblyError, Assistant, HttpLlmClient, LlmClient, LlmError};
use kopi_core::config::{AppConfig, ConfigError, LoadOptions};
use kopi_db::{connect_from_config, migrations, DbPool};
use thiserror::Error;
use tracing::info;

use crate::gateway::AppState;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("reasoning engine client could not be configured: {0}")]
    LlmClient(#[source] LlmError),
    #[error(transparent)]
    Assembly(#[from] AssemblyError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

/// Returns only once the knowledge index is complete, so the gateway never
/// binds in front of a partial index.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool =
        connect_from_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let llm = HttpLlmClient::from_config(&config.llm).map_err(BootstrapError::LlmClient)?;
    info!(
        event_name = "system.bootstrap.llm_configured",
        correlation_id = "bootstrap",
        model = %llm.model(),
        endpoint = %llm.endpoint(),
        "reasoning engine client configured"
    );

    let state = assemble(&config, db_pool.clone(), Arc::new(llm)).await?;

    Ok(Application { config, db_pool, state })
}

pub async fn assemble(
    config: &AppConfig,
    db_pool: DbPool,
    llm: Arc<dyn LlmClient>,
) -> Result<AppState, BootstrapError> {
    let assistant = Assistant::assemble(config, db_pool.clone(), llm).await?;

    Ok(AppState {
        runtime: assistant.runtime,
        products: assistant.products,
        outlets: assistant.outlets,
        db_pool,
    })
}

#[cfg(test)]
mod tests {
    use kopi_agent::AssemblyError;
    use kopi_core::config::{ConfigOverrides, LoadOptions};

    use crate::bootstrap::{bootstrap, BootstrapError};
    use crate::testing::seeded_state;

    #[tokio::test]
    async fn bootstrap_refuses_to_start_without_product_documents() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        let error = result.err().expect("empty database must fail bootstrap");
        assert!(matches!(error, BootstrapError::Assembly(AssemblyError::EmptyKnowledgeBase)));
        assert!(error.to_string().contains("kopi seed"));
    }

    #[tokio::test]
    async fn assembled_state_exposes_three_tools_and_a_built_index() {
        let state = seeded_state(&[]).await;

        assert_eq!(
            state.runtime.registry().names(),
            vec!["calculator", "zus_product_information", "zus_outlet_database"]
        );
        assert!(state.products.len() >= 6, "every product document yields at least one passage");
        assert!(state.runtime.system_prompt().contains("zus_product_information"));
    }
}
