//! Database rows for the grant store.

use serde::{Deserialize, Serialize};

use toolgate_core::permissions::PermissionRecord;

use super::db::DatabaseError;

/// Permission record row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PermissionRow {
    pub provider_id: String,
    pub operation: String,
    pub decision: String,
    pub scope: String,
    pub risk_level: String,
    pub granted_at: i64,
    pub expires_at: Option<i64>,
}

impl TryFrom<PermissionRow> for PermissionRecord {
    type Error = DatabaseError;

    fn try_from(row: PermissionRow) -> Result<Self, Self::Error> {
        let corrupt = |e: toolgate_core::Error| {
            DatabaseError::Corrupt(format!("{}/{}: {e}", row.provider_id, row.operation))
        };
        Ok(Self {
            decision: row.decision.parse().map_err(corrupt)?,
            scope: row.scope.parse().map_err(corrupt)?,
            risk_level: row.risk_level.parse().map_err(corrupt)?,
            granted_at: row.granted_at,
            expires_at: row.expires_at,
            provider_id: row.provider_id,
            operation: row.operation,
        })
    }
}

/// Trusted provider row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TrustedServerRow {
    pub provider_id: String,
    pub added_at: i64,
}
