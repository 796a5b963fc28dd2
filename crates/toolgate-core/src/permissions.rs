//! Permission data model.
//!
//! Types shared by the gateway, its persistence layer and the risk assessor:
//! risk and auto-approve levels, the `(provider, operation)` key, stored
//! permission records and the process-wide policy settings.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Lifetime of an `always` grant (30 days).
pub const ALWAYS_GRANT_TTL_SECS: i64 = 30 * 24 * 60 * 60;

/// Default time an escalated request waits for the operator.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Risk level computed for a tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Position in the `none < low < medium < high` ordering.
    pub const fn rank(self) -> u8 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(Error::InvalidLevel(other.to_string())),
        }
    }
}

/// Highest risk level that is approved without asking the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AutoApproveLevel {
    /// Never auto-approve; every uncached call escalates.
    None,
    #[default]
    Low,
    Medium,
    High,
}

impl AutoApproveLevel {
    pub const fn rank(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
        }
    }

    /// Whether a call of the given risk is approved under this threshold.
    ///
    /// `None` never approves, whatever the risk.
    pub const fn permits(self, risk: RiskLevel) -> bool {
        !matches!(self, Self::None) && self.rank() >= risk.rank()
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for AutoApproveLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AutoApproveLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(Error::InvalidLevel(other.to_string())),
        }
    }
}

/// Stored decision for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
        }
    }
}

impl FromStr for Decision {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allow" => Ok(Self::Allow),
            "deny" => Ok(Self::Deny),
            other => Err(Error::InvalidLevel(other.to_string())),
        }
    }
}

/// How long a stored record lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrantScope {
    /// Valid while the key is in the in-memory session set.
    Session,
    /// Valid for [`ALWAYS_GRANT_TTL_SECS`] after the grant was stored.
    Always,
}

impl GrantScope {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::Always => "always",
        }
    }
}

impl FromStr for GrantScope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "session" => Ok(Self::Session),
            "always" => Ok(Self::Always),
            other => Err(Error::InvalidLevel(other.to_string())),
        }
    }
}

/// Scope chosen by the operator when approving an escalated call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalScope {
    /// Approve this call only; nothing is stored.
    #[default]
    Once,
    Session,
    Always,
}

impl ApprovalScope {
    /// The record scope to persist, if any.
    pub const fn grant_scope(self) -> Option<GrantScope> {
        match self {
            Self::Once => None,
            Self::Session => Some(GrantScope::Session),
            Self::Always => Some(GrantScope::Always),
        }
    }
}

/// Composite `(provider, operation)` key.
///
/// Kept as two fields so identifiers containing separators never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PermissionKey {
    pub provider_id: String,
    pub operation: String,
}

impl PermissionKey {
    pub fn new(provider_id: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            operation: operation.into(),
        }
    }
}

impl fmt::Display for PermissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider_id, self.operation)
    }
}

/// A stored decision for one `(provider, operation)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRecord {
    pub provider_id: String,
    pub operation: String,
    pub decision: Decision,
    pub scope: GrantScope,
    pub risk_level: RiskLevel,
    /// Unix timestamp (seconds) when the record was stored.
    pub granted_at: i64,
    /// Unix timestamp (seconds) after which an `allow` is no longer honored.
    pub expires_at: Option<i64>,
}

impl PermissionRecord {
    /// Build a record stored at `now`. `always` records expire 30 days later.
    pub fn new(
        key: &PermissionKey,
        decision: Decision,
        scope: GrantScope,
        risk_level: RiskLevel,
        now: i64,
    ) -> Self {
        let expires_at = match scope {
            GrantScope::Session => None,
            GrantScope::Always => Some(now + ALWAYS_GRANT_TTL_SECS),
        };
        Self {
            provider_id: key.provider_id.clone(),
            operation: key.operation.clone(),
            decision,
            scope,
            risk_level,
            granted_at: now,
            expires_at,
        }
    }

    /// An `allow` record.
    pub fn allow(key: &PermissionKey, scope: GrantScope, risk_level: RiskLevel, now: i64) -> Self {
        Self::new(key, Decision::Allow, scope, risk_level, now)
    }

    pub fn key(&self) -> PermissionKey {
        PermissionKey::new(&self.provider_id, &self.operation)
    }

    /// Whether the expiry (if any) has passed at `now`.
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|expires| now >= expires)
    }
}

/// Process-wide authorization policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionSettings {
    pub auto_approve_level: AutoApproveLevel,
    /// Seconds an escalated request waits before resolving as denied.
    pub request_timeout_secs: u64,
    pub require_approval_for_file_access: bool,
    pub require_approval_for_network_access: bool,
    pub require_approval_for_system_commands: bool,
    pub trusted_servers: BTreeSet<String>,
}

impl Default for PermissionSettings {
    fn default() -> Self {
        Self {
            auto_approve_level: AutoApproveLevel::default(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            require_approval_for_file_access: true,
            require_approval_for_network_access: true,
            require_approval_for_system_commands: true,
            trusted_servers: BTreeSet::new(),
        }
    }
}

impl PermissionSettings {
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn is_trusted(&self, provider_id: &str) -> bool {
        self.trusted_servers.contains(provider_id)
    }
}

/// Partial settings update; `None` fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsUpdate {
    pub auto_approve_level: Option<AutoApproveLevel>,
    pub request_timeout_secs: Option<u64>,
    pub require_approval_for_file_access: Option<bool>,
    pub require_approval_for_network_access: Option<bool>,
    pub require_approval_for_system_commands: Option<bool>,
    pub trusted_servers: Option<BTreeSet<String>>,
}

impl SettingsUpdate {
    /// Merge this update into `settings`.
    pub fn apply_to(self, settings: &mut PermissionSettings) {
        if let Some(level) = self.auto_approve_level {
            settings.auto_approve_level = level;
        }
        if let Some(secs) = self.request_timeout_secs {
            settings.request_timeout_secs = secs;
        }
        if let Some(v) = self.require_approval_for_file_access {
            settings.require_approval_for_file_access = v;
        }
        if let Some(v) = self.require_approval_for_network_access {
            settings.require_approval_for_network_access = v;
        }
        if let Some(v) = self.require_approval_for_system_commands {
            settings.require_approval_for_system_commands = v;
        }
        if let Some(servers) = self.trusted_servers {
            settings.trusted_servers = servers;
        }
    }
}
