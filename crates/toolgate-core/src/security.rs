//! Structural security validation of call arguments.
//!
//! Every argument is walked recursively. Strings are checked for length,
//! path traversal, shell injection and script injection; arrays and objects
//! are checked for size and nesting depth. Object keys are validated like any
//! other string.
//!
//! Command-injection checks are channel dependent. Rules, first match wins:
//!
//! 1. the assistant message channel skips the check for strings that look
//!    like code or prose;
//! 2. channels whose name contains `settings` or `config` skip the check;
//! 3. channels whose name contains `execute`, `run`, `shell`, `command` or
//!    `process` always apply it;
//! 4. any other channel applies it to strings shorter than 100 characters.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const MAX_DEPTH: usize = 10;
pub const MAX_STRING_LEN: usize = 10_000;
pub const MAX_COLLECTION_LEN: usize = 1_000;

/// Channel carrying free-form assistant messages.
pub const DEFAULT_ASSISTANT_CHANNEL: &str = "llm:sendMessage";

/// Assistant strings longer than this are treated as prose.
const PROSE_MIN_LEN: usize = 500;

/// On unclassified channels only strings shorter than this are checked for
/// shell injection.
const SHORT_STRING_LEN: usize = 100;

const EXEMPT_CHANNEL_PARTS: &[&str] = &["settings", "config"];
const EXEC_CHANNEL_PARTS: &[&str] = &["execute", "run", "shell", "command", "process"];

#[allow(clippy::expect_used)]
static COMMAND_INJECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^\s*[;&|`])|(?:[;&|`]\s*$)|\$\(|\$\{|`[^`]*`").expect("static regex is valid")
});

#[allow(clippy::expect_used)]
static SCRIPT_INJECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<script|\bjavascript:|\bdata:").expect("static regex is valid")
});

#[allow(clippy::expect_used)]
static CODE_KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:function|const|let|var|import|export|class|def|return|fn|impl|pub|async|await)\b",
    )
    .expect("static regex is valid")
});

/// Why a value was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SecurityViolation {
    #[error("value exceeds length limit ({actual} > {limit})")]
    LengthExceeded { actual: usize, limit: usize },

    #[error("value nested deeper than {limit} levels")]
    DepthExceeded { limit: usize },

    #[error("path traversal sequence detected")]
    PathTraversal,

    #[error("command injection pattern detected")]
    CommandInjection,

    #[error("script injection pattern detected")]
    ScriptInjection,
}

impl SecurityViolation {
    /// Short machine-readable name, used as the incident subtype.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::LengthExceeded { .. } => "length_exceeded",
            Self::DepthExceeded { .. } => "depth_exceeded",
            Self::PathTraversal => "path_traversal",
            Self::CommandInjection => "command_injection",
            Self::ScriptInjection => "script_injection",
        }
    }
}

/// Limits and channel policy for structural validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationPolicy {
    pub max_depth: usize,
    pub max_string_len: usize,
    pub max_collection_len: usize,
    pub assistant_channel: String,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            max_depth: MAX_DEPTH,
            max_string_len: MAX_STRING_LEN,
            max_collection_len: MAX_COLLECTION_LEN,
            assistant_channel: DEFAULT_ASSISTANT_CHANNEL.to_string(),
        }
    }
}

impl ValidationPolicy {
    /// Validate every argument of a call on `channel`.
    pub fn validate_args(&self, channel: &str, args: &[Value]) -> Result<(), SecurityViolation> {
        args.iter()
            .try_for_each(|arg| self.validate_value(channel, arg, 0))
    }

    /// Validate a single value found at nesting `depth`.
    pub fn validate_value(
        &self,
        channel: &str,
        value: &Value,
        depth: usize,
    ) -> Result<(), SecurityViolation> {
        if depth > self.max_depth {
            return Err(SecurityViolation::DepthExceeded {
                limit: self.max_depth,
            });
        }

        match value {
            Value::String(s) => self.check_string(channel, s),
            Value::Array(items) => {
                self.check_size(items.len())?;
                items
                    .iter()
                    .try_for_each(|item| self.validate_value(channel, item, depth + 1))
            }
            Value::Object(map) => {
                self.check_size(map.len())?;
                map.iter().try_for_each(|(k, v)| {
                    self.check_string(channel, k)?;
                    self.validate_value(channel, v, depth + 1)
                })
            }
            Value::Null | Value::Bool(_) | Value::Number(_) => Ok(()),
        }
    }

    /// Whether shell-injection patterns are checked for `s` on `channel`.
    pub fn command_check_applies(&self, channel: &str, s: &str) -> bool {
        if channel == self.assistant_channel && looks_like_code_or_prose(s) {
            return false;
        }
        let lower = channel.to_lowercase();
        if EXEMPT_CHANNEL_PARTS.iter().any(|p| lower.contains(p)) {
            return false;
        }
        if EXEC_CHANNEL_PARTS.iter().any(|p| lower.contains(p)) {
            return true;
        }
        s.chars().count() < SHORT_STRING_LEN
    }

    const fn check_size(&self, len: usize) -> Result<(), SecurityViolation> {
        if len > self.max_collection_len {
            return Err(SecurityViolation::LengthExceeded {
                actual: len,
                limit: self.max_collection_len,
            });
        }
        Ok(())
    }

    fn check_string(&self, channel: &str, s: &str) -> Result<(), SecurityViolation> {
        let len = s.chars().count();
        if len > self.max_string_len {
            return Err(SecurityViolation::LengthExceeded {
                actual: len,
                limit: self.max_string_len,
            });
        }
        if s.contains("../") || s.contains("..\\") {
            return Err(SecurityViolation::PathTraversal);
        }
        if self.command_check_applies(channel, s) && COMMAND_INJECTION_RE.is_match(s) {
            return Err(SecurityViolation::CommandInjection);
        }
        if SCRIPT_INJECTION_RE.is_match(s) {
            return Err(SecurityViolation::ScriptInjection);
        }
        Ok(())
    }
}

fn looks_like_code_or_prose(s: &str) -> bool {
    s.contains("```") || s.chars().count() > PROSE_MIN_LEN || CODE_KEYWORD_RE.is_match(s)
}
