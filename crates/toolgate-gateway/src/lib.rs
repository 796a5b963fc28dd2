//! toolgate gateway
//!
//! Runtime side of the tool-call gateway:
//! - Permission gateway with cached grants and operator escalation
//! - Per-channel call log and rate limiting
//! - Request validation middleware and security incident monitor
//! - `SQLite` persistence of durable grants and trusted providers

pub mod calls;
pub mod monitor;
pub mod permission;
pub mod storage;
pub mod validator;

pub use calls::CallLog;
pub use monitor::{MemoryMonitor, SecurityIncident, SecurityMonitor, TracingMonitor};
pub use permission::{ApprovalResult, GatewayEvent, PendingApproval, PermissionGateway, PermissionRequest};
pub use validator::{RequestError, RequestValidator, ValidatedHandler};
