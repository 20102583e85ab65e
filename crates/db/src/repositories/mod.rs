use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use kopi_core::domain::outlet::Outlet;
use kopi_core::domain::product::ProductDocument;

pub mod outlet;
pub mod product;

pub use outlet::{SqlOutletRepository, MAX_READ_ROWS};
pub use product::SqlProductDocumentRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// A row returned by an ad-hoc read query, keyed by column name.
pub type JsonRow = Map<String, Value>;

#[async_trait]
pub trait OutletRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<Outlet>, RepositoryError>;
    async fn upsert(&self, outlet: &Outlet) -> Result<(), RepositoryError>;
    async fn count(&self) -> Result<i64, RepositoryError>;

    /// Executes an already-vetted SELECT with writes disabled on the
    /// connection, returning at most `max_rows` rows.
    async fn run_read_only(
        &self,
        sql: &str,
        max_rows: usize,
    ) -> Result<Vec<JsonRow>, RepositoryError>;
}

#[async_trait]
pub trait ProductDocumentRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<ProductDocument>, RepositoryError>;
    async fn upsert(&self, document: &ProductDocument) -> Result<(), RepositoryError>;
}
