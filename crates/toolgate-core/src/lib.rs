//! toolgate core library
//!
//! Pure logic shared by the gateway runtime and its operator binary:
//! - Permission data model and policy settings
//! - Keyword risk assessment
//! - Structural security validation and log redaction of call arguments
//! - Configuration resolution, tracing setup, `SQLite` helpers

pub mod config;
pub mod db;
pub mod error;
pub mod permissions;
pub mod redact;
pub mod risk;
pub mod security;
pub mod tracing_init;

pub use config::Config;
pub use error::{Error, Result};
pub use permissions::{
    ApprovalScope, AutoApproveLevel, Decision, GrantScope, PermissionKey, PermissionRecord,
    PermissionSettings, RiskLevel, SettingsUpdate,
};
pub use risk::RiskAssessment;
pub use security::{SecurityViolation, ValidationPolicy};
