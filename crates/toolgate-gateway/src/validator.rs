//! Request validation middleware.
//!
//! [`RequestValidator::wrap`] turns an async handler into a
//! [`ValidatedHandler`] that, per invocation, records the call, enforces the
//! channel rate limit, runs structural security checks, validates the
//! argument tuple against an optional schema and only then calls through.

use std::future::Future;
use std::sync::Arc;

use serde_json::{Value, json};
use tracing::debug;

use toolgate_core::config::{DEFAULT_RATE_LIMIT_PER_MINUTE, ValidationConfig};
use toolgate_core::security::{SecurityViolation, ValidationPolicy};

use crate::calls::CallLog;
use crate::monitor::{IncidentKind, SecurityIncident, SecurityMonitor};

/// Argument tuple did not match the expected shape.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct SchemaError {
    pub message: String,
}

impl SchemaError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Failure of a validated call.
#[derive(Debug, thiserror::Error)]
pub enum RequestError<E> {
    #[error("Rate limit exceeded on {channel} ({limit} calls per minute)")]
    RateLimited { channel: String, limit: u32 },

    #[error("Security check failed: {0}")]
    SecurityRejected(SecurityViolation),

    #[error("Invalid arguments: {0}")]
    ValidationFailed(SchemaError),

    /// The wrapped handler's own error, unchanged.
    #[error(transparent)]
    Handler(E),
}

impl<E> RequestError<E> {
    /// Whether the call was stopped before reaching the handler.
    pub const fn is_rejection(&self) -> bool {
        !matches!(self, Self::Handler(_))
    }

    pub fn into_handler_error(self) -> Option<E> {
        match self {
            Self::Handler(e) => Some(e),
            _ => None,
        }
    }
}

/// Validates an argument tuple.
pub trait ArgsSchema: Send + Sync {
    fn validate(&self, args: &[Value]) -> Result<(), SchemaError>;
}

impl<F> ArgsSchema for F
where
    F: Fn(&[Value]) -> Result<(), SchemaError> + Send + Sync,
{
    fn validate(&self, args: &[Value]) -> Result<(), SchemaError> {
        self(args)
    }
}

/// Expected JSON type of one positional argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    String,
    Number,
    Integer,
    Bool,
    Object,
    Array,
    Any,
}

impl ArgKind {
    fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Bool => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
            Self::Any => true,
        }
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Bool => "boolean",
            Self::Object => "object",
            Self::Array => "array",
            Self::Any => "any",
        }
    }
}

const fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Positional schema: required arguments followed by optional ones.
///
/// Optional positions also accept `null`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TupleSchema {
    required: Vec<ArgKind>,
    optional: Vec<ArgKind>,
}

impl TupleSchema {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn arg(mut self, kind: ArgKind) -> Self {
        self.required.push(kind);
        self
    }

    #[must_use]
    pub fn optional(mut self, kind: ArgKind) -> Self {
        self.optional.push(kind);
        self
    }
}

impl ArgsSchema for TupleSchema {
    fn validate(&self, args: &[Value]) -> Result<(), SchemaError> {
        let min = self.required.len();
        let max = min + self.optional.len();
        if args.len() < min {
            return Err(SchemaError::new(format!(
                "expected at least {min} arguments, got {}",
                args.len()
            )));
        }
        if args.len() > max {
            return Err(SchemaError::new(format!(
                "expected at most {max} arguments, got {}",
                args.len()
            )));
        }

        for (i, arg) in args.iter().enumerate() {
            let (kind, optional) = if i < min {
                (self.required[i], false)
            } else {
                (self.optional[i - min], true)
            };
            if optional && arg.is_null() {
                continue;
            }
            if !kind.matches(arg) {
                return Err(SchemaError::new(format!(
                    "argument {i}: expected {}, got {}",
                    kind.as_str(),
                    type_name(arg)
                )));
            }
        }
        Ok(())
    }
}

/// Shared admission pipeline for wrapped handlers.
#[derive(Clone)]
pub struct RequestValidator {
    calls: Arc<CallLog>,
    monitor: Arc<dyn SecurityMonitor>,
    policy: Arc<ValidationPolicy>,
    default_rate_limit: u32,
}

impl RequestValidator {
    pub fn new(calls: Arc<CallLog>, monitor: Arc<dyn SecurityMonitor>) -> Self {
        Self {
            calls,
            monitor,
            policy: Arc::new(ValidationPolicy::default()),
            default_rate_limit: DEFAULT_RATE_LIMIT_PER_MINUTE,
        }
    }

    pub fn from_config(
        config: &ValidationConfig,
        calls: Arc<CallLog>,
        monitor: Arc<dyn SecurityMonitor>,
    ) -> Self {
        Self {
            calls,
            monitor,
            policy: Arc::new(config.policy()),
            default_rate_limit: config.rate_limit_per_minute,
        }
    }

    pub const fn calls(&self) -> &Arc<CallLog> {
        &self.calls
    }

    /// Wrap `handler` for `channel` with the default rate limit and no schema.
    pub fn wrap<F>(&self, channel: impl Into<String>, handler: F) -> ValidatedHandler<F> {
        ValidatedHandler {
            validator: self.clone(),
            channel: channel.into(),
            handler,
            schema: None,
            rate_limit: self.default_rate_limit,
        }
    }

    /// Run every check for one call. Nothing after a failed step runs.
    async fn admit<E>(
        &self,
        channel: &str,
        args: &[Value],
        schema: Option<&dyn ArgsSchema>,
        rate_limit: u32,
    ) -> Result<(), RequestError<E>> {
        self.calls.record(channel, args).await;

        if self.calls.is_rate_limited(channel, rate_limit).await {
            self.report(
                IncidentKind::RateLimitExceeded,
                channel,
                json!({ "limit_per_minute": rate_limit }),
            );
            return Err(RequestError::RateLimited {
                channel: channel.to_string(),
                limit: rate_limit,
            });
        }

        if let Err(violation) = self.policy.validate_args(channel, args) {
            let kind = match violation {
                SecurityViolation::PathTraversal => IncidentKind::PathTraversal,
                SecurityViolation::CommandInjection | SecurityViolation::ScriptInjection => {
                    IncidentKind::InjectionAttempt
                }
                SecurityViolation::LengthExceeded { .. }
                | SecurityViolation::DepthExceeded { .. } => IncidentKind::ValidationFailed,
            };
            self.report(
                kind,
                channel,
                json!({ "type": violation.kind(), "message": violation.to_string() }),
            );
            return Err(RequestError::SecurityRejected(violation));
        }

        if let Some(schema) = schema {
            if let Err(e) = schema.validate(args) {
                self.report(
                    IncidentKind::ValidationFailed,
                    channel,
                    json!({ "type": "schema", "message": e.message }),
                );
                return Err(RequestError::ValidationFailed(e));
            }
        }

        debug!(channel, "Call admitted");
        Ok(())
    }

    fn report(&self, kind: IncidentKind, channel: &str, details: Value) {
        self.monitor
            .log_incident(SecurityIncident::new(kind, channel, details));
    }
}

/// A handler behind the validation pipeline.
pub struct ValidatedHandler<F> {
    validator: RequestValidator,
    channel: String,
    handler: F,
    schema: Option<Arc<dyn ArgsSchema>>,
    rate_limit: u32,
}

impl<F> ValidatedHandler<F> {
    #[must_use]
    pub fn with_schema(mut self, schema: impl ArgsSchema + 'static) -> Self {
        self.schema = Some(Arc::new(schema));
        self
    }

    #[must_use]
    pub const fn with_rate_limit(mut self, per_minute: u32) -> Self {
        self.rate_limit = per_minute;
        self
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Validate `args` and, if admitted, invoke the handler.
    pub async fn call<Fut, T, E>(&self, args: Vec<Value>) -> Result<T, RequestError<E>>
    where
        F: Fn(Vec<Value>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.validator
            .admit::<E>(
                &self.channel,
                &args,
                self.schema.as_deref(),
                self.rate_limit,
            )
            .await?;
        (self.handler)(args).await.map_err(RequestError::Handler)
    }
}
