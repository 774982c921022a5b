//! Operator CLI for the warden agent daemon.

mod client;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use owo_colors::{OwoColorize, Stream::Stdout};
use serde::Serialize;
use serde_json::json;
use warden_common::api::{
    Ack, AddEntryRequest, CommandRequest, OverrideRequest, PatternRequest, SetEnabledRequest,
};
use warden_common::{
    AuditEntry, Decision, DEFAULT_AGENT_URL, ExecutionRecord, ExecutionSummary, OverrideRule,
    PolicyChange, PolicyEntry, PolicySnapshot, PolicySummary, RiskScore, SessionSummary, paths,
};

use crate::client::AgentClient;

/// warden agent control tool.
///
/// Inspects and edits the command policy of a running agent daemon,
/// reviews the audit trail and reports session status. Policy edits are
/// refused unless the daemon holds an authenticated controller session.
#[derive(Parser, Debug)]
#[command(name = "warden-ctl", version, about)]
struct Cli {
    /// Base URL of the agent daemon
    #[arg(long, env = "WARDEN_AGENT_URL", default_value = DEFAULT_AGENT_URL)]
    agent_url: String,

    /// Print raw JSON instead of formatted output
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show session, policy and execution status
    Status,
    /// Ask the policy engine whether a command would be allowed
    Check {
        /// Full command line (quote it or pass after --)
        #[arg(required = true, num_args = 1.., trailing_var_arg = true)]
        command: Vec<String>,
    },
    /// Compute the advisory risk score of a command
    Score {
        #[arg(required = true, num_args = 1.., trailing_var_arg = true)]
        command: Vec<String>,
    },
    /// Add or update an allow-list entry
    Allow {
        /// Glob matched against the command's first token
        pattern: String,
        /// Risk level 1-10 (out-of-range values are clamped)
        #[arg(long, default_value_t = 5, allow_negative_numbers = true)]
        risk: i64,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Remove an allow-list entry
    Remove { pattern: String },
    /// Add an override that forces a verdict for a pattern
    Override {
        pattern: String,
        /// Force-allow instead of force-deny
        #[arg(long, conflicts_with = "deny")]
        allow: bool,
        /// Force-deny (default)
        #[arg(long)]
        deny: bool,
        #[arg(long, default_value = "")]
        reason: String,
    },
    /// Remove an override
    RemoveOverride { pattern: String },
    /// Block a command pattern outright
    Block { pattern: String },
    /// Remove a blocked command pattern
    Unblock { pattern: String },
    /// Enable policy enforcement
    Enable,
    /// Disable policy enforcement (every non-empty command is allowed)
    Disable,
    /// Dump allow-list, overrides, blocked commands and limits
    List,
    /// Show recent audit entries
    Audit {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Show recent policy changes
    PolicyLog {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Show recent executions
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = AgentClient::new(&cli.agent_url);
    run(&client, cli.command, cli.json)
}

fn run(client: &AgentClient, command: Commands, json_output: bool) -> Result<()> {
    match command {
        Commands::Status => {
            let session: SessionSummary = client.get(paths::SESSION_STATUS)?;
            let policy: PolicySummary = client.get(paths::POLICY_SUMMARY)?;
            let exec: ExecutionSummary = client.get(paths::EXEC_SUMMARY)?;
            if json_output {
                return print_json(&json!({
                    "session": session,
                    "policy": policy,
                    "execution": exec,
                }));
            }
            render_status(&session, &policy, &exec);
        }
        Commands::Check { command } => {
            let decision: Decision =
                client.post(paths::POLICY_AUTHORIZE, &command_body(&command))?;
            if json_output {
                return print_json(&decision);
            }
            render_decision(&decision);
        }
        Commands::Score { command } => {
            let score: RiskScore =
                client.post(paths::POLICY_SCORE, &command_body(&command))?;
            if json_output {
                return print_json(&score);
            }
            println!(
                "  risk {}/10 ({}) = base {} + composition {}",
                score.risk,
                score.level.as_str(),
                score.base_risk,
                score.bonus
            );
        }
        Commands::Allow {
            pattern,
            risk,
            description,
        } => {
            let entry: PolicyEntry = client.post(
                paths::POLICY_ENTRIES,
                &AddEntryRequest {
                    pattern,
                    risk_level: risk,
                    description,
                },
            )?;
            if json_output {
                return print_json(&entry);
            }
            success(&format!("allowed '{}' at risk {}", entry.pattern, entry.risk_level));
        }
        Commands::Remove { pattern } => {
            let entry: PolicyEntry =
                client.post(paths::POLICY_ENTRIES_REMOVE, &PatternRequest { pattern })?;
            if json_output {
                return print_json(&entry);
            }
            success(&format!("removed '{}'", entry.pattern));
        }
        Commands::Override {
            pattern,
            allow,
            deny: _,
            reason,
        } => {
            let rule: OverrideRule = client.post(
                paths::POLICY_OVERRIDES,
                &OverrideRequest {
                    pattern,
                    allowed: allow,
                    reason,
                },
            )?;
            if json_output {
                return print_json(&rule);
            }
            let verdict = if rule.allowed { "allow" } else { "deny" };
            success(&format!("override '{}' → {verdict}", rule.pattern));
        }
        Commands::RemoveOverride { pattern } => {
            let rule: OverrideRule =
                client.post(paths::POLICY_OVERRIDES_REMOVE, &PatternRequest { pattern })?;
            if json_output {
                return print_json(&rule);
            }
            success(&format!("removed override '{}'", rule.pattern));
        }
        Commands::Block { pattern } => {
            let ack: Ack = client.post(
                paths::POLICY_BLOCKED,
                &PatternRequest {
                    pattern: pattern.clone(),
                },
            )?;
            if json_output {
                return print_json(&ack);
            }
            if ack.changed {
                success(&format!("blocked '{pattern}'"));
            } else {
                println!("  '{pattern}' was already blocked");
            }
        }
        Commands::Unblock { pattern } => {
            let ack: Ack =
                client.post(
                paths::POLICY_BLOCKED_REMOVE,
                &PatternRequest {
                    pattern: pattern.clone(),
                },
            )?;
            if json_output {
                return print_json(&ack);
            }
            success(&format!("unblocked '{pattern}'"));
        }
        Commands::Enable | Commands::Disable => {
            let enabled = matches!(command, Commands::Enable);
            let summary: PolicySummary =
                client.post(paths::POLICY_ENABLED, &SetEnabledRequest { enabled })?;
            if json_output {
                return print_json(&summary);
            }
            if summary.enabled != enabled {
                bail!("agent did not apply the change");
            }
            success(if enabled {
                "policy enforcement enabled"
            } else {
                "policy enforcement disabled"
            });
        }
        Commands::List => {
            let snapshot: PolicySnapshot = client.get(paths::POLICY_ENTRIES)?;
            if json_output {
                return print_json(&snapshot);
            }
            render_snapshot(&snapshot);
        }
        Commands::Audit { limit } => {
            let entries: Vec<AuditEntry> = client.get_limited(paths::AUDIT_LOG, limit)?;
            if json_output {
                return print_json(&entries);
            }
            for entry in &entries {
                let details: Vec<String> =
                    entry.details.iter().map(|(k, v)| format!("{k}={v}")).collect();
                println!(
                    "  {}  {:<14} {}",
                    entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    entry.action,
                    details.join(" ")
                );
            }
        }
        Commands::PolicyLog { limit } => {
            let changes: Vec<PolicyChange> = client.get_limited(paths::POLICY_LOG, limit)?;
            if json_output {
                return print_json(&changes);
            }
            for change in &changes {
                println!(
                    "  {}  {:<12} {:<16} {}",
                    change.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    change.action,
                    change.pattern,
                    change.detail
                );
            }
        }
        Commands::History { limit } => {
            let records: Vec<ExecutionRecord> = client.get_limited(paths::EXEC_HISTORY, limit)?;
            if json_output {
                return print_json(&records);
            }
            for record in &records {
                println!(
                    "  {}  rc={:<4} {:>7.2}s  {}",
                    record.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    record.return_code,
                    record.elapsed_seconds,
                    record.command
                );
            }
        }
    }
    Ok(())
}

fn command_body(words: &[String]) -> CommandRequest {
    CommandRequest {
        command: words.join(" "),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn success(msg: &str) {
    println!("  {} {msg}", "✓".if_supports_color(Stdout, |t| t.green()));
}

fn render_decision(decision: &Decision) {
    if decision.allowed {
        println!(
            "  {} allowed (risk {}): {}",
            "✓".if_supports_color(Stdout, |t| t.green()),
            decision.risk_level,
            decision.reason
        );
    } else {
        println!(
            "  {} denied (risk {}): {}",
            "✗".if_supports_color(Stdout, |t| t.red()),
            decision.risk_level,
            decision.reason
        );
    }
}

fn render_status(session: &SessionSummary, policy: &PolicySummary, exec: &ExecutionSummary) {
    let status = &session.status;
    println!("  {}", "Session".if_supports_color(Stdout, |t| t.bold()));
    println!("    state:      {:?}", status.state);
    if let (Some(host), Some(port)) = (&status.host, status.port) {
        println!("    peer:       {host}:{port}");
    }
    if let Some(channel) = &status.channel_id {
        println!("    channel:    {channel}");
    }
    println!("    reconnects: {}", status.reconnect_attempts);
    println!("    pending:    {}", status.pending_messages);

    println!("  {}", "Policy".if_supports_color(Stdout, |t| t.bold()));
    println!(
        "    enforcement: {}",
        if policy.enabled { "enabled" } else { "disabled" }
    );
    println!(
        "    entries: {}  overrides: {}  blocked: {}",
        policy.entry_count, policy.override_count, policy.blocked_count
    );
    println!(
        "    checks: {}  allowed: {}  denied: {}  dangerous: {}",
        policy.stats.checks,
        policy.stats.allowed,
        policy.stats.denied,
        policy.stats.dangerous_blocked
    );

    println!("  {}", "Execution".if_supports_color(Stdout, |t| t.bold()));
    println!("    cwd:     {}", exec.cwd);
    println!(
        "    runs: {}  ok: {}  failed: {}  timeouts: {}",
        exec.stats.executions, exec.stats.succeeded, exec.stats.failed, exec.stats.timeouts
    );
}

fn render_snapshot(snapshot: &PolicySnapshot) {
    println!(
        "  enforcement {}",
        if snapshot.enabled { "enabled" } else { "disabled" }
    );
    println!("  {}", "Allow-list".if_supports_color(Stdout, |t| t.bold()));
    for entry in &snapshot.entries {
        println!(
            "    {:<16} risk {:>2}  {}",
            entry.pattern, entry.risk_level, entry.description
        );
    }
    if !snapshot.overrides.is_empty() {
        println!("  {}", "Overrides".if_supports_color(Stdout, |t| t.bold()));
        for rule in &snapshot.overrides {
            let verdict = if rule.allowed { "allow" } else { "deny" };
            println!("    {:<16} {verdict:<5}  {}", rule.pattern, rule.reason);
        }
    }
    if !snapshot.blocked_commands.is_empty() {
        println!("  {}", "Blocked".if_supports_color(Stdout, |t| t.bold()));
        for pattern in &snapshot.blocked_commands {
            println!("    {pattern}");
        }
    }
    if !snapshot.allowed_paths.is_empty() {
        println!("  {}", "Allowed paths".if_supports_color(Stdout, |t| t.bold()));
        for path in &snapshot.allowed_paths {
            println!("    {path}");
        }
    }
    if !snapshot.resource_limits.is_empty() {
        println!("  {}", "Resource limits".if_supports_color(Stdout, |t| t.bold()));
        for (resource, max) in &snapshot.resource_limits {
            println!("    {resource:<16} {max}");
        }
    }
}
