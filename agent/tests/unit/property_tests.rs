//! Property-based tests for policy scoring and bounded-log invariants.
//!
//! Uses `proptest` to verify invariants across many random inputs.

use proptest::prelude::*;

use warden_agent::domain::BoundedLog;
use warden_agent::domain::policy::{glob_match, score};
use warden_agent::domain::session::generate_channel_id;
use warden_common::{MAX_RISK, MIN_RISK, RiskLevel, clamp_risk};

use crate::mocks::policy_engine;

// ============================================================================
// Risk arithmetic
// ============================================================================

proptest! {
    /// Clamping always lands inside 1..=10 and is the identity inside it.
    #[test]
    fn prop_clamp_risk_in_range(level in any::<i64>()) {
        let r = clamp_risk(level);
        prop_assert!((MIN_RISK..=MAX_RISK).contains(&r));
        if (1..=10).contains(&level) {
            prop_assert_eq!(i64::from(r), level);
        }
    }

    /// Composite score never exceeds the maximum and never drops below base.
    #[test]
    fn prop_score_bounded(base in 1u8..=10, command in "[a-z |>;&$()`]{0,40}") {
        let s = score(base, &command);
        prop_assert!(s.risk <= MAX_RISK);
        prop_assert!(s.risk >= base);
        prop_assert_eq!(s.level, RiskLevel::from_score(s.risk));
    }
}

// ============================================================================
// Glob matching
// ============================================================================

proptest! {
    /// `*` matches everything, a literal matches only itself.
    #[test]
    fn prop_glob_star_and_literal(text in "[a-zA-Z0-9_.-]{0,20}") {
        prop_assert!(glob_match("*", &text));
        prop_assert!(glob_match(&text, &text));
        let suffix = format!("{text}x");
        prop_assert!(!glob_match(&text, &suffix));
    }

    /// A prefix followed by `*` matches any extension of the prefix.
    #[test]
    fn prop_glob_prefix(prefix in "[a-z]{1,8}", rest in "[a-z0-9]{0,8}") {
        let pattern = format!("{prefix}*");
        let text = format!("{prefix}{rest}");
        prop_assert!(glob_match(&pattern, &text));
    }
}

// ============================================================================
// Authorization determinism
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Without configuration changes in between, a command always gets the
    /// same verdict, reason and risk.
    #[test]
    fn prop_authorize_deterministic(command in "[a-z]{1,8}( -[a-z]{1,3})?( /[a-z]{0,6})?") {
        let engine = policy_engine();
        let first = engine.authorize(&command);
        let second = engine.authorize(&command);
        prop_assert_eq!(first, second);
    }
}

// ============================================================================
// Bounded log
// ============================================================================

proptest! {
    /// Length never exceeds capacity and the newest item always survives.
    #[test]
    fn prop_bounded_log_cap(cap in 1usize..20, pushes in 0usize..60) {
        let mut log = BoundedLog::new(cap);
        for i in 0..pushes {
            log.push(i);
            prop_assert!(log.len() <= cap);
        }
        prop_assert_eq!(log.len(), pushes.min(cap));
        if pushes > 0 {
            prop_assert_eq!(log.recent(1), vec![pushes - 1]);
        }
    }
}

#[test]
fn test_channel_id_uniqueness_batch() {
    let ids: std::collections::HashSet<_> = (0..100).map(|_| generate_channel_id()).collect();
    assert_eq!(ids.len(), 100, "duplicate channel IDs generated");
}
