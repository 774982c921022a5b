//! Authorization pipeline ordering and policy-table behaviour.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use warden_agent::AgentError;
use warden_common::{DecisionStage, Details, RiskLevel};

use crate::mocks::policy_engine;

#[test]
fn dangerous_wins_even_when_whitelisted() {
    let engine = policy_engine();
    engine.add("sudo", 1, "").unwrap();
    engine.add("shutdown", 1, "").unwrap();
    engine.add_override("sudo", true, "trusted").unwrap();

    let d = engine.authorize("sudo shutdown");
    assert!(!d.allowed);
    assert_eq!(d.stage, DecisionStage::DangerousPattern);

    engine.set_enabled(false);
    let d = engine.authorize("sudo shutdown");
    assert!(d.allowed);
    assert_eq!(d.reason, "disabled");
}

#[test]
fn reference_dangerous_commands_denied() {
    let engine = policy_engine();
    for cmd in [
        "shutdown /s",
        "sudo apt",
        "eval bad",
        "reboot",
        "rm -rf /",
        "chmod 777 /etc/passwd",
        "del /F file.txt",
        "rd /S /Q mydir",
    ] {
        assert!(!engine.authorize(cmd).allowed, "{cmd} must be denied");
    }
    let audit = engine.audit_log(100);
    assert_eq!(audit.len(), 8);
    assert!(audit.iter().all(|e| e.action == "block_command"));
}

#[test]
fn long_option_deletes_denied_with_rm_allow_listed() {
    let engine = policy_engine();
    engine.add("rm", 3, "remove files").unwrap();
    engine.add_override("rm", true, "cleanup job").unwrap();

    for cmd in [
        "rm --no-preserve-root -rf /",
        "rm --recursive --force /home",
        "rm --force --recursive build",
        "rm -f -R build",
        "rm --force /",
    ] {
        let d = engine.authorize(cmd);
        assert!(!d.allowed, "{cmd} must be denied");
        assert_eq!(d.stage, DecisionStage::DangerousPattern, "{cmd}");
    }

    let d = engine.authorize("rm --force old-report.txt");
    assert!(d.allowed);
    assert_eq!(d.stage, DecisionStage::Override);
}

#[test]
fn override_precedence_over_allow_list() {
    let engine = policy_engine();
    assert!(engine.authorize("ls -la").allowed);
    engine.add_override("ls", false, "maintenance").unwrap();
    assert!(!engine.authorize("ls -la").allowed);
    engine.remove_override("ls").unwrap();
    assert!(engine.authorize("ls -la").allowed);
    assert_eq!(engine.summary().override_count, 0);
}

#[test]
fn first_matching_override_wins() {
    let engine = policy_engine();
    engine.add_override("my*", false, "broad deny").unwrap();
    engine.add_override("myapp", true, "narrow allow").unwrap();
    let d = engine.authorize("myapp run");
    assert!(!d.allowed);
    assert_eq!(d.reason, "broad deny");
}

#[test]
fn glob_entries_match_first_token_only() {
    let engine = policy_engine();
    engine.add("myapp*", 3, "custom").unwrap();
    assert!(engine.authorize("myapp").allowed);
    assert!(engine.authorize("myapp_runner --flag").allowed);
    assert!(!engine.authorize("run myapp").allowed);
}

#[test]
fn authorize_is_deterministic() {
    let engine = policy_engine();
    for cmd in ["git status", "unknown_tool", "rm -rf /", "ls | wc -l"] {
        let first = engine.authorize(cmd);
        let second = engine.authorize(cmd);
        assert_eq!(first, second, "decision for {cmd} changed");
    }
}

#[test]
fn blocked_commands_crud() {
    let engine = policy_engine();
    assert!(matches!(
        engine.add_blocked_command(""),
        Err(AgentError::InvalidArgument(_))
    ));
    engine.add_blocked_command("git").unwrap();
    let d = engine.authorize("git push");
    assert_eq!(d.stage, DecisionStage::BlockedCommand);
    engine.remove_blocked_command("git").unwrap();
    assert!(engine.authorize("git push").allowed);
    assert!(matches!(
        engine.remove_blocked_command("git"),
        Err(AgentError::NotFound(_))
    ));
}

#[test]
fn score_risk_examples() {
    let engine = policy_engine();

    let s = engine.score_risk("ls | grep foo > out.txt").unwrap();
    assert!(s.bonus >= 2);
    assert!(s.risk <= 10);

    let s = engine.score_risk("git log && rm x; echo $(date)").unwrap();
    assert_eq!(s.base_risk, 4);
    assert_eq!(s.bonus, 3);
    assert_eq!(s.risk, 7);
    assert_eq!(s.level, RiskLevel::High);

    let s = engine.score_risk("mystery | thing").unwrap();
    assert_eq!(s.base_risk, 10);
    assert_eq!(s.risk, 10);
    assert_eq!(s.level, RiskLevel::Critical);
}

#[test]
fn block_dangerous_has_no_side_effects() {
    let engine = policy_engine();
    let check = engine.block_dangerous("sudo shutdown");
    assert!(check.dangerous);
    assert!(check.pattern.is_some());
    assert!(!engine.block_dangerous("ls -la").dangerous);
    assert!(!engine.block_dangerous("").dangerous);
    assert_eq!(engine.stats().checks, 0);
    assert!(engine.audit_log(10).is_empty());
}

#[test]
fn get_all_and_log() {
    let engine = policy_engine();
    engine.add("testapp", 2, "t").unwrap();
    engine.add_override("cat", false, "").unwrap();
    engine.add_blocked_command("nc").unwrap();
    engine.add_allowed_path("/srv").unwrap();
    engine.set_resource_limit("memory_mb", 512).unwrap();

    let all = engine.get_all();
    assert!(all.entries.iter().any(|e| e.pattern == "testapp"));
    assert_eq!(all.overrides.len(), 1);
    assert_eq!(all.blocked_commands, vec!["nc"]);
    assert_eq!(all.allowed_paths, vec!["/srv"]);
    assert_eq!(all.resource_limits.get("memory_mb"), Some(&512));

    let log = engine.get_log(100);
    let actions: Vec<_> = log.iter().map(|c| c.action.as_str()).collect();
    assert_eq!(actions, vec!["add", "add_override", "block", "allow_path", "limit"]);
}

#[test]
fn record_audit_validates_action() {
    let engine = policy_engine();
    let details = Details::from([("key".to_string(), "value".to_string())]);
    let entry = engine.record_audit("test_event", details).unwrap();
    assert_eq!(entry.action, "test_event");
    assert!(matches!(
        engine.record_audit("", Details::new()),
        Err(AgentError::InvalidArgument(_))
    ));
    assert_eq!(engine.summary().audit_count, 1);
}

#[test]
fn resources_without_limits_pass() {
    let engine = policy_engine();
    assert!(engine.check_resources(&BTreeMap::new()).allowed);
    let usage = BTreeMap::from([("cpu".to_string(), 99_u64)]);
    assert!(engine.check_resources(&usage).allowed);
}

/// Collects the `message` of every event emitted while installed.
struct MessageCapture(Arc<Mutex<Vec<String>>>);

impl<S: Subscriber> Layer<S> for MessageCapture {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        struct Message(String);
        impl Visit for Message {
            fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
                if field.name() == "message" {
                    self.0 = format!("{value:?}");
                }
            }
        }
        let mut message = Message(String::new());
        event.record(&mut message);
        self.0.lock().push(message.0);
    }
}

#[test]
fn every_table_mutation_is_logged() {
    let messages = Arc::new(Mutex::new(Vec::new()));
    let subscriber = tracing_subscriber::registry().with(MessageCapture(messages.clone()));

    tracing::subscriber::with_default(subscriber, || {
        let engine = policy_engine();
        engine.add("tool", 2, "").unwrap();
        engine.remove("tool").unwrap();
        engine.add_override("tool", false, "").unwrap();
        engine.remove_override("tool").unwrap();
        engine.add_blocked_command("nc").unwrap();
        engine.remove_blocked_command("nc").unwrap();
    });

    let messages = messages.lock();
    for expected in [
        "allow-list entry added",
        "allow-list entry removed",
        "override added",
        "override removed",
        "command pattern blocked",
        "command pattern unblocked",
    ] {
        assert!(
            messages.iter().any(|m| m == expected),
            "missing event {expected:?} in {messages:?}"
        );
    }
}
