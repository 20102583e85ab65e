use std::sync::Arc;

use kopi_core::config::AppConfig;
use kopi_core::errors::AgentError;
use kopi_db::repositories::{
    ProductDocumentRepository, RepositoryError, SqlOutletRepository, SqlProductDocumentRepository,
};
use kopi_db::DbPool;
use thiserror::Error;
use tracing::info;

use crate::guardrails::GuardrailPolicy;
use crate::llm::LlmClient;
use crate::outlets::OutletDirectory;
use crate::retrieval::{HashingEmbedder, ProductKnowledgeBase};
use crate::runtime::{AgentRuntime, RuntimeSettings};
use crate::tools::ToolRegistry;

#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("could not load product documents: {0}")]
    Repository(#[source] RepositoryError),
    #[error("no product documents found; run `kopi seed` first")]
    EmptyKnowledgeBase,
    #[error("knowledge index could not be built: {0}")]
    KnowledgeIndex(#[source] AgentError),
    #[error("agent runtime could not be initialized: {0}")]
    Runtime(#[source] AgentError),
}

impl AssemblyError {
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Repository(_) => "db_query",
            Self::EmptyKnowledgeBase => "knowledge_base_empty",
            Self::KnowledgeIndex(_) => "knowledge_index",
            Self::Runtime(_) => "runtime_init",
        }
    }
}

/// The fully wired assistant: the runtime plus the two retrieval backends it
/// dispatches to, which are also reachable directly for diagnostics.
pub struct Assistant {
    pub runtime: Arc<AgentRuntime>,
    pub products: Arc<ProductKnowledgeBase>,
    pub outlets: Arc<OutletDirectory>,
}

impl Assistant {
    /// Builds the knowledge index from the stored product documents before
    /// anything else, so a returned assistant never serves a partial index.
    pub async fn assemble(
        config: &AppConfig,
        db_pool: DbPool,
        llm: Arc<dyn LlmClient>,
    ) -> Result<Self, AssemblyError> {
        let documents = SqlProductDocumentRepository::new(db_pool.clone())
            .list()
            .await
            .map_err(AssemblyError::Repository)?;
        if documents.is_empty() {
            return Err(AssemblyError::EmptyKnowledgeBase);
        }

        let embedder = Arc::new(HashingEmbedder::new(config.retrieval.embedding_dims));
        let products = Arc::new(
            ProductKnowledgeBase::build(&documents, embedder, Arc::clone(&llm), &config.retrieval)
                .map_err(AssemblyError::KnowledgeIndex)?,
        );
        info!(
            event_name = "agent.assembly.knowledge_index_ready",
            correlation_id = "bootstrap",
            documents = documents.len(),
            passages = products.len(),
            "knowledge index ready"
        );

        let outlet_repository = Arc::new(SqlOutletRepository::new(db_pool));
        let outlets = Arc::new(OutletDirectory::new(outlet_repository, Arc::clone(&llm)));

        let registry = ToolRegistry::standard(products.clone(), outlets.clone());
        let allowed_tools = registry.names().into_iter().map(str::to_string).collect();
        let guardrails = GuardrailPolicy::new(config.agent.max_message_chars, allowed_tools);
        let runtime = AgentRuntime::new(
            llm,
            Arc::new(registry),
            guardrails,
            RuntimeSettings::from_config(config),
        )
        .map_err(AssemblyError::Runtime)?;

        Ok(Self { runtime: Arc::new(runtime), products, outlets })
    }
}
