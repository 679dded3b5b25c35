//! Default-deny permission engine.
//!
//! `PermissionPolicy` wraps a loaded `PermissionsConfig` with its deny
//! patterns compiled once. Each check answers one gate:
//!
//! 1. Paths: resolved against the canonical workspace root, symlinks
//!    dereferenced, then matched against `allowed_paths` when set.
//! 2. Writes: blocked unless `write_file` is on; never inside `.warden/`.
//! 3. Commands: blocked unless `run_command` is on, then deny patterns, then
//!    the built-in risk table. Either of the last two blocks on its own.
//! 4. Network: blocked unless `network_access` is on; an `allowed_domains`
//!    list replaces the deny-list check.

use std::{
    net::{Ipv4Addr, Ipv6Addr},
    path::{Path, PathBuf},
};

use regex::{Regex, RegexBuilder};
use tracing::{debug, warn};
use url::{Host, Url};

use warden_contracts::{message::ToolCall, tool::ToolName};
use warden_security::{analyze_command, canonical_root, is_within, resolve_path, resolve_within};

use crate::config::{PermissionsConfig, CONFIG_DIR};

/// Shell operators that disqualify a command from the allow-list exemption.
const CHAINING_OPERATORS: &[&str] = &[";", "&&", "||", "|", "`", "$(", ">", "<", "\n"];

/// Hosts no fetch may reach unless an explicit `allowed_domains` entry says so.
const BLOCKED_HOSTNAMES: &[&str] = &[
    "localhost",
    "metadata",
    "metadata.google.internal",
    "metadata.azure.internal",
    "instance-data",
];

/// Outcome of a command or network gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny { reason: String },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Decision::Allow => None,
            Decision::Deny { reason } => Some(reason.as_str()),
        }
    }

    fn deny(reason: impl Into<String>) -> Self {
        Decision::Deny {
            reason: reason.into(),
        }
    }
}

#[derive(Debug)]
pub struct PermissionPolicy {
    config: PermissionsConfig,
    deny: Vec<Regex>,
}

impl PermissionPolicy {
    /// Compile the deny patterns of `config`. Malformed patterns are skipped
    /// with a warning; they never abort the session.
    pub fn new(config: PermissionsConfig) -> Self {
        let deny = config
            .deny_patterns
            .iter()
            .filter_map(|source| {
                match RegexBuilder::new(source).case_insensitive(true).build() {
                    Ok(re) => Some(re),
                    Err(e) => {
                        warn!(pattern = %source, error = %e, "skipping malformed deny pattern");
                        None
                    }
                }
            })
            .collect();
        Self { config, deny }
    }

    pub fn config(&self) -> &PermissionsConfig {
        &self.config
    }

    pub fn workspace_root(&self) -> &Path {
        &self.config.workspace_root
    }

    // ── Paths ────────────────────────────────────────────────────────────────

    /// Resolve `target` and confirm it stays inside the workspace and, when
    /// `allowed_paths` is set, inside one of its entries.
    pub fn check_path(&self, target: &str) -> Result<PathBuf, String> {
        let root = &self.config.workspace_root;
        let resolved = resolve_within(root, target)?;

        if self.config.allowed_paths.is_empty() {
            return Ok(resolved);
        }

        let permitted = self.config.allowed_paths.iter().any(|entry| {
            resolve_path(root, entry)
                .map(|base| is_within(&resolved, &base))
                .unwrap_or(false)
        });
        if !permitted {
            debug!(path = %resolved.display(), "path outside allowed_paths");
            return Err(format!("Path '{target}' is not in the allowed paths"));
        }
        Ok(resolved)
    }

    /// The resolved `allowed_paths` entries that stay inside the workspace.
    /// Empty when the whole workspace is allowed.
    pub fn allowed_roots(&self) -> Vec<PathBuf> {
        let root = &self.config.workspace_root;
        self.config
            .allowed_paths
            .iter()
            .filter_map(|entry| match resolve_within(root, entry) {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!(entry = %entry, error = %e, "ignoring allowed_paths entry");
                    None
                }
            })
            .collect()
    }

    /// `check_path` plus the write gates.
    pub fn check_write_path(&self, target: &str) -> Result<PathBuf, String> {
        if !self.config.write_file {
            return Err("File writing is disabled by policy".to_string());
        }
        let resolved = self.check_path(target)?;

        let protected = canonical_root(&self.config.workspace_root)?.join(CONFIG_DIR);
        if is_within(&resolved, &protected) {
            warn!(path = %resolved.display(), "write into agent configuration refused");
            return Err(format!(
                "Writing inside the agent configuration directory '{CONFIG_DIR}/' is not permitted"
            ));
        }
        Ok(resolved)
    }

    // ── Commands ─────────────────────────────────────────────────────────────

    pub fn is_command_allowed(&self, command: &str) -> Decision {
        if !self.config.run_command {
            return Decision::deny("Command execution is disabled by policy");
        }

        let command = command.trim();
        if command.is_empty() {
            return Decision::deny("Command is empty");
        }

        if let Some(re) = self.deny.iter().find(|re| re.is_match(command)) {
            warn!(command, pattern = %re.as_str(), "command matched deny pattern");
            return Decision::deny(format!(
                "Command matches deny pattern '{}'",
                re.as_str()
            ));
        }

        let risk = analyze_command(command);
        if risk.is_unsafe() {
            warn!(command, findings = %risk.summary(), "command blocked by risk analysis");
            return Decision::deny(format!(
                "Command blocked by safety analysis: {}",
                risk.summary()
            ));
        }

        debug!(command, severity = %risk.severity, "command allowed");
        Decision::Allow
    }

    /// Exact match or whole-token prefix of an allow-listed command. Commands
    /// that chain, substitute, or redirect are never exempt.
    pub fn is_allowlisted(&self, command: &str) -> bool {
        let command = command.trim();
        if CHAINING_OPERATORS.iter().any(|op| command.contains(op)) {
            return false;
        }
        self.config.allowlisted_commands.iter().any(|entry| {
            let entry = entry.trim();
            !entry.is_empty()
                && (command == entry
                    || command
                        .strip_prefix(entry)
                        .is_some_and(|rest| rest.starts_with(char::is_whitespace)))
        })
    }

    // ── Network ──────────────────────────────────────────────────────────────

    /// Parse and gate a URL for `fetch_url`.
    pub fn check_url(&self, raw: &str) -> Result<Url, String> {
        if !self.config.network_access {
            return Err("Network access is disabled by policy".to_string());
        }

        let url = Url::parse(raw).map_err(|e| format!("Invalid URL '{raw}': {e}"))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(format!("Unsupported URL scheme '{}'", url.scheme()));
        }
        let host = url
            .host()
            .ok_or_else(|| format!("URL '{raw}' has no host"))?;

        if !self.config.allowed_domains.is_empty() {
            let name = host.to_string().to_ascii_lowercase();
            let listed = self.config.allowed_domains.iter().any(|d| {
                let d = d.trim().trim_start_matches('.').to_ascii_lowercase();
                name == d || name.ends_with(&format!(".{d}"))
            });
            return if listed {
                Ok(url)
            } else {
                Err(format!("Domain '{name}' is not in the allowed domains"))
            };
        }

        if is_blocked_host(&host) {
            warn!(url = %raw, "fetch to internal host refused");
            return Err(format!("Host '{host}' is blocked"));
        }
        if let Some(re) = self.deny.iter().find(|re| re.is_match(raw)) {
            return Err(format!("URL matches deny pattern '{}'", re.as_str()));
        }
        Ok(url)
    }

    // ── Approval ─────────────────────────────────────────────────────────────

    /// Whether policy alone asks the operator before `tool` runs.
    pub fn requires_approval(&self, tool: ToolName, call: &ToolCall) -> bool {
        match tool {
            ToolName::WriteFile | ToolName::ReplaceInFile => self.config.require_diff_approval,
            ToolName::RunCommand => {
                self.config.require_approval_for_commands
                    && !self.is_allowlisted(call.str_arg("command").unwrap_or_default())
            }
            ToolName::GitCommit | ToolName::DelegateTask => true,
            _ => false,
        }
    }
}

fn is_blocked_host(host: &Host<&str>) -> bool {
    match host {
        Host::Domain(name) => {
            let name = name.to_ascii_lowercase();
            BLOCKED_HOSTNAMES.contains(&name.as_str()) || name.ends_with(".localhost")
        }
        Host::Ipv4(ip) => is_internal_v4(ip),
        Host::Ipv6(ip) => is_internal_v6(ip),
    }
}

fn is_internal_v4(ip: &Ipv4Addr) -> bool {
    ip.is_loopback() || ip.is_link_local() || ip.is_unspecified() || ip.is_private()
}

fn is_internal_v6(ip: &Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_internal_v4(&v4);
    }
    // fe80::/10 link-local, fc00::/7 unique local.
    let first = ip.segments()[0];
    ip.is_loopback() || ip.is_unspecified() || (first & 0xffc0) == 0xfe80 || (first & 0xfe00) == 0xfc00
}
