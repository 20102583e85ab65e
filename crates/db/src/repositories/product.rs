use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use kopi_core::domain::product::ProductDocument;

use super::{ProductDocumentRepository, RepositoryError};
use crate::DbPool;

pub struct SqlProductDocumentRepository {
    pool: DbPool,
}

impl SqlProductDocumentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ProductDocumentRepository for SqlProductDocumentRepository {
    async fn list(&self) -> Result<Vec<ProductDocument>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT slug, name, price, body FROM product_documents ORDER BY slug",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(document_from_row).collect()
    }

    async fn upsert(&self, document: &ProductDocument) -> Result<(), RepositoryError> {
        if document.slug.trim().is_empty() {
            return Err(RepositoryError::Decode("product document slug must not be empty".into()));
        }

        sqlx::query(
            "INSERT INTO product_documents (slug, name, price, body, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(slug) DO UPDATE SET
                name = excluded.name,
                price = excluded.price,
                body = excluded.body,
                updated_at = excluded.updated_at",
        )
        .bind(&document.slug)
        .bind(&document.name)
        .bind(&document.price)
        .bind(&document.body)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn document_from_row(row: &SqliteRow) -> Result<ProductDocument, RepositoryError> {
    Ok(ProductDocument {
        slug: row.try_get("slug")?,
        name: row.try_get("name")?,
        price: row.try_get("price")?,
        body: row.try_get("body")?,
    })
}

#[cfg(test)]
mod tests {
    use kopi_core::domain::product::ProductDocument;

    use super::SqlProductDocumentRepository;
    use crate::migrations::run_pending;
    use crate::repositories::{ProductDocumentRepository, RepositoryError};
    use crate::connect_with_settings;

    async fn repo() -> SqlProductDocumentRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("migrations");
        SqlProductDocumentRepository::new(pool)
    }

    fn tumbler(price: &str) -> ProductDocument {
        ProductDocument {
            slug: "all-day-cup".to_string(),
            name: "ZUS All Day Cup 500ml".to_string(),
            price: price.to_string(),
            body: "Double-walled stainless steel tumbler.".to_string(),
        }
    }

    #[tokio::test]
    async fn upsert_keeps_only_the_latest_version() {
        let repo = repo().await;

        repo.upsert(&tumbler("RM 79.00")).await.expect("insert");
        repo.upsert(&tumbler("RM 55.00")).await.expect("update");

        assert_eq!(repo.list().await.expect("list"), vec![tumbler("RM 55.00")]);
    }

    #[tokio::test]
    async fn blank_slug_is_rejected() {
        let repo = repo().await;

        let mut blank = tumbler("RM 1.00");
        blank.slug = "  ".to_string();
        assert!(matches!(repo.upsert(&blank).await, Err(RepositoryError::Decode(_))));
    }
}
