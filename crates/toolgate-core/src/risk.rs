//! Keyword-driven risk assessment for tool calls.
//!
//! Scoring is additive over independent indicator categories. Each category
//! inspects the lower-cased operation name and description, and/or the
//! lower-cased JSON rendering of the arguments. Settings toggles raise the
//! weight of file, network and command indicators.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::permissions::{PermissionSettings, RiskLevel};

const FILE_KEYWORDS: &[&str] = &["file", "read", "write"];
const NETWORK_KEYWORDS: &[&str] = &["fetch", "request", "search", "network", "http", "url"];
const NETWORK_ARG_KEYWORDS: &[&str] = &["http", "url"];
const COMMAND_KEYWORDS: &[&str] = &["exec", "command", "shell"];
const MUTATION_KEYWORDS: &[&str] = &["delete", "remove", "modify", "update"];
const SENSITIVE_ARG_KEYWORDS: &[&str] = &["password", "token", "key", "secret"];

const HIGH_THRESHOLD: u32 = 4;
const MEDIUM_THRESHOLD: u32 = 2;

pub const REASON_FILE: &str = "File system access";
pub const REASON_NETWORK: &str = "Network access";
pub const REASON_COMMAND: &str = "System command execution";
pub const REASON_MUTATION: &str = "Data modification";
pub const REASON_SENSITIVE: &str = "Sensitive data access";
pub const REASON_GENERAL: &str = "General tool execution";

/// Outcome of [`assess`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub score: u32,
    pub reasons: Vec<String>,
}

/// Assess the risk of calling `operation` with `args`.
pub fn assess(
    operation: &str,
    description: &str,
    args: &Value,
    settings: &PermissionSettings,
) -> RiskAssessment {
    let name = operation.to_lowercase();
    let desc = description.to_lowercase();
    let args_text = serde_json::to_string(args)
        .unwrap_or_default()
        .to_lowercase();

    let in_meta = |keywords: &[&str]| {
        keywords
            .iter()
            .any(|k| name.contains(k) || desc.contains(k))
    };
    let in_args = |keywords: &[&str]| keywords.iter().any(|k| args_text.contains(k));
    let weighted = |toggle: bool, on: u32, off: u32| if toggle { on } else { off };

    let mut score = 0;
    let mut reasons = Vec::new();

    if in_meta(FILE_KEYWORDS) || args_text.contains("path") {
        score += weighted(settings.require_approval_for_file_access, 2, 1);
        reasons.push(REASON_FILE.to_string());
    }

    if in_meta(NETWORK_KEYWORDS) || in_args(NETWORK_ARG_KEYWORDS) {
        score += weighted(settings.require_approval_for_network_access, 2, 1);
        reasons.push(REASON_NETWORK.to_string());
    }

    if in_meta(COMMAND_KEYWORDS) {
        score += weighted(settings.require_approval_for_system_commands, 3, 2);
        reasons.push(REASON_COMMAND.to_string());
    }

    if in_meta(MUTATION_KEYWORDS) {
        score += 2;
        reasons.push(REASON_MUTATION.to_string());
    }

    if in_args(SENSITIVE_ARG_KEYWORDS) {
        score += 3;
        reasons.push(REASON_SENSITIVE.to_string());
    }

    if reasons.is_empty() {
        reasons.push(REASON_GENERAL.to_string());
    }

    RiskAssessment {
        level: level_for(score),
        score,
        reasons,
    }
}

const fn level_for(score: u32) -> RiskLevel {
    if score >= HIGH_THRESHOLD {
        RiskLevel::High
    } else if score >= MEDIUM_THRESHOLD {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}
