use std::str::FromStr;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::Row;
use tracing::warn;

use poolcalc_core::domain::estimate::EstimateId;
use poolcalc_core::sync::{RemoteError, RemoteEstimateRow, RemoteEstimateStore};

use super::{decode, parse_timestamp, timestamp, RepositoryError};
use crate::DbPool;

/// Shared `estimates` table standing in for the cloud collection.
pub struct SqlRemoteEstimateStore {
    pool: DbPool,
}

impl SqlRemoteEstimateStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: &EstimateId) -> Result<Option<RemoteEstimateRow>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, client_name, data, total, status, created_by, updated_by,
                    created_at, updated_at
             FROM estimates WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_estimate).transpose()
    }

    pub async fn count(&self) -> Result<i64, RepositoryError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM estimates").fetch_one(&self.pool).await?;
        decode(row.try_get("count"))
    }

    async fn save(&self, row: &RemoteEstimateRow) -> Result<(), RepositoryError> {
        let data = serde_json::to_string(&row.data)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;

        sqlx::query(
            "INSERT INTO estimates (id, name, client_name, data, total, status, created_by,
                                    updated_by, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 client_name = excluded.client_name,
                 data = excluded.data,
                 total = excluded.total,
                 status = excluded.status,
                 updated_by = excluded.updated_by,
                 updated_at = excluded.updated_at",
        )
        .bind(&row.id)
        .bind(&row.name)
        .bind(&row.client_name)
        .bind(data)
        .bind(row.total.to_string())
        .bind(&row.status)
        .bind(&row.created_by)
        .bind(&row.updated_by)
        .bind(timestamp(row.created_at))
        .bind(timestamp(row.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<RemoteEstimateRow>, RepositoryError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(
            "SELECT id, name, client_name, data, total, status, created_by, updated_by,
                    created_at, updated_at
             FROM estimates
             ORDER BY created_at DESC
             LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut estimates = Vec::with_capacity(rows.len());
        for row in &rows {
            match row_to_estimate(row) {
                Ok(estimate) => estimates.push(estimate),
                Err(error) => warn!(
                    event_name = "db.remote_estimates.row_skipped",
                    error = %error,
                    "skipping undecodable remote estimate"
                ),
            }
        }
        Ok(estimates)
    }

    async fn remove(&self, id: &EstimateId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM estimates WHERE id = ?").bind(&id.0).execute(&self.pool).await?;
        Ok(())
    }
}

fn row_to_estimate(row: &sqlx::sqlite::SqliteRow) -> Result<RemoteEstimateRow, RepositoryError> {
    let data_raw: String = decode(row.try_get("data"))?;
    let total_raw: String = decode(row.try_get("total"))?;
    let created_at_raw: String = decode(row.try_get("created_at"))?;
    let updated_at_raw: String = decode(row.try_get("updated_at"))?;

    // A corrupt document still yields a row; the reconciler falls back to columns.
    let data = serde_json::from_str(&data_raw).unwrap_or(Value::Null);
    let total = Decimal::from_str(&total_raw)
        .map_err(|error| RepositoryError::Decode(format!("invalid total `{total_raw}`: {error}")))?;

    Ok(RemoteEstimateRow {
        id: decode(row.try_get("id"))?,
        name: decode(row.try_get("name"))?,
        client_name: decode(row.try_get("client_name"))?,
        data,
        total,
        status: decode(row.try_get("status"))?,
        created_by: decode(row.try_get("created_by"))?,
        updated_by: decode(row.try_get("updated_by"))?,
        created_at: parse_timestamp(&created_at_raw)?,
        updated_at: parse_timestamp(&updated_at_raw)?,
    })
}

#[async_trait]
impl RemoteEstimateStore for SqlRemoteEstimateStore {
    async fn upsert(&self, row: RemoteEstimateRow) -> Result<(), RemoteError> {
        Ok(self.save(&row).await?)
    }

    async fn fetch_recent(&self, limit: usize) -> Result<Vec<RemoteEstimateRow>, RemoteError> {
        Ok(self.list_recent(limit).await?)
    }

    async fn delete(&self, id: &EstimateId) -> Result<(), RemoteError> {
        Ok(self.remove(id).await?)
    }
}
