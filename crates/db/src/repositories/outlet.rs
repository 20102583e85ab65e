use serde_json::{Number, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, TypeInfo, ValueRef};

use kopi_core::domain::outlet::Outlet;

use super::{JsonRow, OutletRepository, RepositoryError};
use crate::DbPool;

pub const MAX_READ_ROWS: usize = 50;

pub struct SqlOutletRepository {
    pool: DbPool,
}

impl SqlOutletRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl OutletRepository for SqlOutletRepository {
    async fn list(&self) -> Result<Vec<Outlet>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT name, address, city, state, status, operating_hours
             FROM outlets
             ORDER BY state, city, name",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(outlet_from_row).collect()
    }

    async fn upsert(&self, outlet: &Outlet) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO outlets (name, address, city, state, status, operating_hours)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(name) DO UPDATE SET
                address = excluded.address,
                city = excluded.city,
                state = excluded.state,
                status = excluded.status,
                operating_hours = excluded.operating_hours",
        )
        .bind(&outlet.name)
        .bind(&outlet.address)
        .bind(&outlet.city)
        .bind(&outlet.state)
        .bind(&outlet.status)
        .bind(&outlet.operating_hours)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn count(&self) -> Result<i64, RepositoryError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM outlets")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn run_read_only(
        &self,
        sql: &str,
        max_rows: usize,
    ) -> Result<Vec<JsonRow>, RepositoryError> {
        let statement = sql.trim().trim_end_matches(';').trim_end();
        let capped = format!("SELECT * FROM (\n{statement}\n) LIMIT {}", max_rows.max(1));

        // The pool's release hook turns `query_only` back off, including when
        // this future is dropped mid-query.
        let mut conn = self.pool.acquire().await?;
        sqlx::query("PRAGMA query_only = ON").execute(&mut *conn).await?;
        let rows = sqlx::query(&capped).fetch_all(&mut *conn).await?;

        rows.iter().map(json_row).collect()
    }
}

fn outlet_from_row(row: &SqliteRow) -> Result<Outlet, RepositoryError> {
    Ok(Outlet {
        name: row.try_get("name")?,
        address: row.try_get("address")?,
        city: row.try_get("city")?,
        state: row.try_get("state")?,
        status: row.try_get("status")?,
        operating_hours: row
            .try_get::<Option<String>, _>("operating_hours")?
            .unwrap_or_default(),
    })
}

fn json_row(row: &SqliteRow) -> Result<JsonRow, RepositoryError> {
    let mut object = JsonRow::new();
    for column in row.columns() {
        let index = column.ordinal();
        let raw = row.try_get_raw(index)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            let type_name = raw.type_info().name().to_ascii_uppercase();
            match type_name.as_str() {
                "INTEGER" | "INT" | "BIGINT" | "BOOLEAN" => {
                    Value::from(row.try_get::<i64, _>(index)?)
                }
                "REAL" | "NUMERIC" => {
                    let number = row.try_get::<f64, _>(index)?;
                    Number::from_f64(number).map(Value::Number).ok_or_else(|| {
                        RepositoryError::Decode(format!(
                            "column `{}` holds a non-finite number",
                            column.name()
                        ))
                    })?
                }
                "BLOB" => {
                    let bytes = row.try_get::<Vec<u8>, _>(index)?;
                    Value::String(format!("<{} bytes>", bytes.len()))
                }
                _ => Value::String(row.try_get::<String, _>(index)?),
            }
        };
        object.insert(column.name().to_string(), value);
    }
    Ok(object)
}
