//! WARDEN command-line front end.
//!
//! Usage:
//!   warden init
//!   warden check-command "cargo test -- --nocapture"
//!   warden scan page.html --source https://example.com
//!   warden replay --script session.json --task "fix the build" --yes
//!   warden compare .warden/traces/a.json .warden/traces/b.json

mod console;
mod settings;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use warden_contracts::error::{WardenError, WardenResult};
use warden_core::{Orchestrator, Provider, ScriptedProvider, TurnStatus};
use warden_policy::{PermissionPolicy, PermissionsConfig, CONFIG_DIR};
use warden_security::{analyze_command, guard};
use warden_tools::WorkspaceTools;
use warden_tracker::{compare, load_trace, write_trace, ExecutionTracker, JsonlRunLog};

use crate::{console::ConsoleApprovals, settings::Settings};

// ── CLI definition ────────────────────────────────────────────────────────────

/// WARDEN: a sandboxed, policy-gated coding agent runtime.
#[derive(Parser)]
#[command(
    name = "warden",
    about = "Policy-gated agent runtime",
    long_about = "Runs agent sessions behind a default-deny permission policy,\n\
                  checks commands and untrusted content, and compares execution traces."
)]
struct Cli {
    /// Workspace root the agent is confined to.
    #[arg(long, short = 'w', global = true, default_value = ".")]
    workspace: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write default permissions.toml and config.toml under .warden/.
    Init {
        /// Overwrite existing files.
        #[arg(long)]
        force: bool,
    },
    /// Report whether the permission policy would run a command.
    CheckCommand {
        command: String,
    },
    /// Scan a file for prompt injection and exfiltration patterns.
    Scan {
        file: PathBuf,
        /// Label used in the untrusted-content banner.
        #[arg(long)]
        source: Option<String>,
    },
    /// Drive one turn with a scripted provider and record its trace.
    Replay {
        /// JSON array of provider responses.
        #[arg(long)]
        script: PathBuf,
        /// The user message that starts the turn.
        #[arg(long, default_value = "Replay the recorded session.")]
        task: String,
        /// Approve every prompt without asking.
        #[arg(long)]
        yes: bool,
        /// Where the trace is written. Defaults to .warden/traces.
        #[arg(long)]
        trace_dir: Option<PathBuf>,
    },
    /// Compare two trace files for deterministic equivalence.
    Compare {
        left: PathBuf,
        right: PathBuf,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Set RUST_LOG=debug for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();
    let workspace = cli.workspace.as_path();

    let result = match cli.command {
        Command::Init { force } => init(workspace, force),
        Command::CheckCommand { command } => check_command(workspace, &command),
        Command::Scan { file, source } => scan(&file, source.as_deref()),
        Command::Replay {
            script,
            task,
            yes,
            trace_dir,
        } => replay(workspace, &script, &task, yes, trace_dir).await,
        Command::Compare { left, right } => compare_traces(&left, &right),
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("warden: {e}");
            std::process::exit(2);
        }
    }
}

// ── Subcommands ───────────────────────────────────────────────────────────────
//
// Each returns Ok(false) for a negative verdict (command denied, threats
// found, traces diverged) so the exit code can carry it.

fn init(workspace: &Path, force: bool) -> WardenResult<bool> {
    let permissions = PermissionsConfig::file_path(workspace);
    if force || !permissions.exists() {
        let path = PermissionsConfig::for_workspace(workspace).save()?;
        println!("wrote {}", path.display());
    } else {
        println!("kept {}", permissions.display());
    }

    let settings = Settings::file_path(workspace);
    if force || !settings.exists() {
        let path = Settings::default().save(workspace)?;
        println!("wrote {}", path.display());
    } else {
        println!("kept {}", settings.display());
    }
    Ok(true)
}

fn check_command(workspace: &Path, command: &str) -> WardenResult<bool> {
    let policy = PermissionPolicy::new(PermissionsConfig::load_or_default(workspace)?);
    let risk = analyze_command(command);

    println!("command:  {command}");
    println!("severity: {}", risk.severity);
    for finding in &risk.findings {
        println!("  - [{}] {} ({})", finding.severity, finding.description, finding.rule_id);
    }

    let decision = policy.is_command_allowed(command);
    match decision.reason() {
        None => {
            let prompt = policy.config().require_approval_for_commands && !policy.is_allowlisted(command);
            println!("verdict:  allowed{}", if prompt { " (asks for approval)" } else { "" });
            Ok(true)
        }
        Some(reason) => {
            println!("verdict:  denied: {reason}");
            Ok(false)
        }
    }
}

fn scan(file: &Path, source: Option<&str>) -> WardenResult<bool> {
    let text = std::fs::read_to_string(file).map_err(|e| WardenError::Io {
        reason: format!("failed to read '{}': {e}", file.display()),
    })?;
    let label = source
        .map(str::to_string)
        .unwrap_or_else(|| file.display().to_string());
    let guarded = guard(&text, &label);

    if guarded.is_clean() {
        println!("no threats found in {label}");
        return Ok(true);
    }
    for threat in &guarded.threats {
        println!(
            "{} [{}] {} at byte {}: {:?}",
            threat.kind, threat.severity, threat.pattern, threat.position, threat.matched_text
        );
    }
    println!("\n{}", guarded.content);
    Ok(false)
}

async fn replay(
    workspace: &Path,
    script: &Path,
    task: &str,
    yes: bool,
    trace_dir: Option<PathBuf>,
) -> WardenResult<bool> {
    let settings = Settings::load_or_default(workspace)?;
    let policy = Arc::new(PermissionPolicy::new(PermissionsConfig::load_or_default(workspace)?));
    let provider = Arc::new(ScriptedProvider::from_file(script)?);

    let tracker = Arc::new(ExecutionTracker::new(provider.name(), provider.model()));
    let run_log = Arc::new(JsonlRunLog::new(
        workspace
            .join(CONFIG_DIR)
            .join("logs")
            .join(format!("{}.jsonl", tracker.run_id())),
    ));

    let (events_tx, mut events_rx) = tokio::sync::mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            if let Ok(line) = serde_json::to_string(&event) {
                eprintln!("[event] {line}");
            }
        }
    });

    let mut agent = Orchestrator::new(
        provider,
        Arc::new(ConsoleApprovals::new(yes)),
        Arc::new(WorkspaceTools::new(settings.tools)),
        policy,
        settings.agent,
    )
    .with_observer(tracker.clone())
    .with_run_log(run_log)
    .with_event_sink(events_tx);

    info!(run_id = %tracker.run_id(), script = %script.display(), "replay starting");
    let outcome = agent.run_turn(task).await;

    // Dropping the agent closes the event channel so the printer finishes.
    drop(agent);
    let _ = printer.await;

    let trace = tracker.finalize();
    let dir = trace_dir.unwrap_or_else(|| workspace.join(CONFIG_DIR).join("traces"));
    match write_trace(&dir, &trace) {
        Ok(path) => println!("trace: {}", path.display()),
        Err(e) => warn!(error = %e, "trace not written"),
    }

    let outcome = outcome?;
    println!(
        "status: {} after {} iteration(s), {} tool call(s)",
        match outcome.status {
            TurnStatus::Done => "done",
            TurnStatus::BudgetExhausted => "budget exhausted",
        },
        outcome.iterations,
        outcome.tool_calls
    );
    Ok(outcome.status == TurnStatus::Done)
}

fn compare_traces(left: &Path, right: &Path) -> WardenResult<bool> {
    let a = load_trace(left)?;
    let b = load_trace(right)?;
    let result = compare(&a, &b);
    println!("{result}");
    if let Some(d) = &result.divergence {
        println!(
            "  left:  {}\n  right: {}",
            d.left_fingerprint.as_deref().unwrap_or("(ended)"),
            d.right_fingerprint.as_deref().unwrap_or("(ended)")
        );
    }
    Ok(result.is_equivalent())
}
