//! Command risk scoring.
//!
//! A fixed, ordered table of patterns, each carrying a severity. The overall
//! severity of a command is the maximum over all matching rules; a command is
//! unsafe exactly when that maximum is `Critical`. This layer is independent
//! of the configurable deny-pattern list: either one can block a command.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use warden_contracts::action::Severity;

struct RiskRule {
    id: &'static str,
    description: &'static str,
    pattern: Regex,
    severity: Severity,
}

fn rule(id: &'static str, description: &'static str, pattern: &str, severity: Severity) -> RiskRule {
    RiskRule {
        id,
        description,
        // Patterns are compile-time constants covered by the tests below.
        pattern: Regex::new(pattern).expect("built-in risk pattern must compile"),
        severity,
    }
}

static RISK_RULES: LazyLock<Vec<RiskRule>> = LazyLock::new(|| {
    vec![
        rule(
            "pipe-to-shell",
            "pipes output into a shell interpreter",
            r"(?i)\|\s*(sudo\s+)?(ba|z|k|da|fi)?sh\b",
            Severity::Critical,
        ),
        rule(
            "decode-and-execute",
            "decodes a payload and feeds it onward",
            r"(?i)base64\s+(-d|--decode)\b.*\|",
            Severity::Critical,
        ),
        rule(
            "device-redirect",
            "redirects output into a block device",
            r"(?i)>\s*/dev/(sd|hd|nvme|xvd|vd|disk|mmcblk)",
            Severity::Critical,
        ),
        rule(
            "system-path-redirect",
            "redirects output into a system path",
            r"(?i)>\s*/(etc|boot|sys|proc|usr|bin|sbin|lib)(/|\s|$)",
            Severity::Critical,
        ),
        rule(
            "root-permission-change",
            "changes permissions or ownership on the filesystem root",
            r"(?i)\b(chmod|chown|chgrp)\b[^;&|]*\s/(\*)?(\s|$)",
            Severity::Critical,
        ),
        rule(
            "recursive-root-delete",
            "recursively deletes the root, home, or everything",
            r"(?i)\brm\s+(-[a-z]*\s+)*-[a-z]*[rf][a-z]*\s+(-[a-z]+\s+)*(/|~|\*|\$HOME)(\s|$|/\*?)",
            Severity::Critical,
        ),
        rule(
            "batch-destructive",
            "feeds a listing into a destructive batch operation",
            r"(?i)\bxargs\b[^;&]*\b(rm|shred|dd|chmod|chown|mv)\b",
            Severity::Critical,
        ),
        rule(
            "filesystem-format",
            "creates or wipes a filesystem",
            r"(?i)\b(mkfs(\.[a-z0-9]+)?|wipefs|fdisk|parted)\b",
            Severity::Critical,
        ),
        rule(
            "fork-bomb",
            "defines a self-replicating shell function",
            r":\(\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;\s*:",
            Severity::Critical,
        ),
        rule(
            "command-substitution",
            "uses command substitution",
            r"\$\(|`",
            Severity::High,
        ),
        rule(
            "inline-interpreter",
            "executes inline code through an interpreter flag",
            r"(?i)\b(python[0-9.]*|perl|ruby|node|php|(ba|z|k|da)?sh)\s+(-[a-z]*\s+)*-(c|e)\b",
            Severity::High,
        ),
        rule(
            "eval",
            "evaluates a constructed string",
            r"(?i)(^|[;&|\s])eval\s",
            Severity::High,
        ),
        rule(
            "privilege-escalation",
            "runs with elevated privileges",
            r"(?i)(^|[;&|\s])(sudo|doas|su)\s",
            Severity::High,
        ),
        rule(
            "raw-disk-copy",
            "copies raw blocks with dd",
            r"(?i)\bdd\s+[^;&|]*\b(if|of)=",
            Severity::High,
        ),
        rule(
            "find-delete",
            "deletes files found by a search",
            r"(?i)\bfind\b[^;&|]*\s(-delete|-exec\s+rm)\b",
            Severity::High,
        ),
        rule(
            "force-push",
            "rewrites remote history",
            r"(?i)\bgit\s+push\b[^;&|]*(\s--force\b|\s-f\b)",
            Severity::High,
        ),
        rule(
            "git-hard-reset",
            "discards local changes",
            r"(?i)\bgit\s+(reset\s+--hard|clean\s+-[a-z]*f)",
            Severity::Medium,
        ),
        rule(
            "network-transfer",
            "transfers data over the network",
            r"(?i)\b(curl|wget|nc|ncat|scp|rsync|ssh|ftp)\b",
            Severity::Medium,
        ),
        rule(
            "delete",
            "deletes files",
            r"(?i)(^|[;&|\s])(rm|rmdir|shred|unlink)\s",
            Severity::Medium,
        ),
        rule(
            "process-kill",
            "terminates processes",
            r"(?i)\b(kill|killall|pkill)\b",
            Severity::Medium,
        ),
        rule(
            "package-install",
            "installs packages",
            r"(?i)\b(npm|pnpm|yarn|pip3?|cargo|gem|apt(-get)?|brew)\s+(install|add)\b",
            Severity::Medium,
        ),
        rule(
            "file-redirect",
            "writes output to a file",
            r">\s*[^\s&]",
            Severity::Low,
        ),
    ]
});

/// One matched row of the risk table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RiskFinding {
    pub rule_id: &'static str,
    pub description: &'static str,
    pub severity: Severity,
}

/// The risk analysis of a single command string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandRisk {
    /// Maximum severity over all findings; `Low` when nothing matched.
    pub severity: Severity,
    pub findings: Vec<RiskFinding>,
}

impl CommandRisk {
    /// Unsafe commands are hard-blocked regardless of approval.
    pub fn is_unsafe(&self) -> bool {
        self.severity == Severity::Critical
    }

    /// Comma-separated descriptions of the findings at the top severity.
    pub fn summary(&self) -> String {
        self.findings
            .iter()
            .filter(|f| f.severity == self.severity)
            .map(|f| f.description)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Score `command` against the risk table.
pub fn analyze_command(command: &str) -> CommandRisk {
    let findings: Vec<RiskFinding> = RISK_RULES
        .iter()
        .filter(|r| r.pattern.is_match(command))
        .map(|r| RiskFinding {
            rule_id: r.id,
            description: r.description,
            severity: r.severity,
        })
        .collect();

    let severity = findings
        .iter()
        .map(|f| f.severity)
        .max()
        .unwrap_or(Severity::Low);

    CommandRisk { severity, findings }
}
