//! Database queries for the grant store.

use toolgate_core::db::unix_timestamp;
use toolgate_core::permissions::PermissionRecord;

use super::db::{Database, DatabaseError};
use super::models::{PermissionRow, TrustedServerRow};

impl Database {
    // =========================================================================
    // Permission records
    // =========================================================================

    /// Insert or replace the record for its key.
    pub async fn upsert_permission(&self, record: &PermissionRecord) -> Result<(), DatabaseError> {
        sqlx::query(
            r"
            INSERT INTO permission_records
                (provider_id, operation, decision, scope, risk_level, granted_at, expires_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (provider_id, operation) DO UPDATE SET
                decision = excluded.decision,
                scope = excluded.scope,
                risk_level = excluded.risk_level,
                granted_at = excluded.granted_at,
                expires_at = excluded.expires_at
            ",
        )
        .bind(record.provider_id.as_str())
        .bind(record.operation.as_str())
        .bind(record.decision.as_str())
        .bind(record.scope.as_str())
        .bind(record.risk_level.as_str())
        .bind(record.granted_at)
        .bind(record.expires_at)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Get the record for a key.
    pub async fn get_permission(
        &self,
        provider_id: &str,
        operation: &str,
    ) -> Result<Option<PermissionRecord>, DatabaseError> {
        sqlx::query_as::<_, PermissionRow>(
            "SELECT * FROM permission_records WHERE provider_id = ? AND operation = ?",
        )
        .bind(provider_id)
        .bind(operation)
        .fetch_optional(self.pool())
        .await?
        .map(PermissionRecord::try_from)
        .transpose()
    }

    /// List all records, ordered by key.
    pub async fn list_permissions(&self) -> Result<Vec<PermissionRecord>, DatabaseError> {
        sqlx::query_as::<_, PermissionRow>(
            "SELECT * FROM permission_records ORDER BY provider_id, operation",
        )
        .fetch_all(self.pool())
        .await?
        .into_iter()
        .map(PermissionRecord::try_from)
        .collect()
    }

    /// Delete the record for a key. Returns whether a row was removed.
    pub async fn delete_permission(
        &self,
        provider_id: &str,
        operation: &str,
    ) -> Result<bool, DatabaseError> {
        let result =
            sqlx::query("DELETE FROM permission_records WHERE provider_id = ? AND operation = ?")
                .bind(provider_id)
                .bind(operation)
                .execute(self.pool())
                .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete `allow` records whose expiry is at or before `now`.
    ///
    /// Denials are kept regardless of expiry.
    pub async fn delete_expired_permissions(&self, now: i64) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            r"
            DELETE FROM permission_records
            WHERE decision = 'allow' AND expires_at IS NOT NULL AND expires_at <= ?
            ",
        )
        .bind(now)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected())
    }

    /// Delete every record.
    pub async fn clear_permissions(&self) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM permission_records")
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected())
    }

    // =========================================================================
    // Trusted providers
    // =========================================================================

    /// Trust a provider. Returns `false` if it was already trusted.
    pub async fn add_trusted_server(&self, provider_id: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "INSERT INTO trusted_servers (provider_id, added_at) VALUES (?, ?) ON CONFLICT DO NOTHING",
        )
        .bind(provider_id)
        .bind(unix_timestamp())
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Stop trusting a provider. Returns whether it was trusted.
    pub async fn remove_trusted_server(&self, provider_id: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM trusted_servers WHERE provider_id = ?")
            .bind(provider_id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// List trusted providers, ordered by id.
    pub async fn list_trusted_servers(&self) -> Result<Vec<TrustedServerRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, TrustedServerRow>(
            "SELECT * FROM trusted_servers ORDER BY provider_id",
        )
        .fetch_all(self.pool())
        .await?;

        Ok(rows)
    }
}
