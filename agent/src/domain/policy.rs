//! Pure command-classification logic: dangerous-pattern detection, glob
//! matching over a command's first token, and risk scoring.

use std::path::Path;
use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};
use warden_common::{MAX_RISK, ResourceCheck, ResourceViolation, RiskLevel, RiskScore};

// ── Dangerous patterns ───────────────────────────────────────────────────────

/// A categorically destructive command shape.
pub struct DangerousPattern {
    pub source: &'static str,
    pub category: &'static str,
    regex: Regex,
}

const DANGEROUS_SOURCES: &[(&str, &str)] = &[
    (r"\brm\b[^;&|]*\s(-[a-z]*r[a-z]*|--recursive)\b", "recursive delete"),
    (r"\brm\s+(--?[a-z-]+\s+)*/\*?\s*$", "root delete"),
    (r"\brm\b[^;&|]*\s--no-preserve-root\b", "root delete"),
    (r"\bsudo\b", "privilege escalation"),
    (r"\bsu\s+(-|root\b)", "privilege escalation"),
    (r"\bdoas\b", "privilege escalation"),
    (r"\beval\b", "code evaluation"),
    (r"\bshutdown\b", "shutdown"),
    (r"\breboot\b", "reboot"),
    (r"\bhalt\b", "shutdown"),
    (r"\bpoweroff\b", "shutdown"),
    (r"\binit\s+[06]\b", "shutdown"),
    (r"\bchmod\s+(-[a-z]+\s+)*[0-7]?777\b", "permission change"),
    (r"\bchmod\s+-[a-z]*r[a-z]*\s", "permission change"),
    (r"\bchown\s+-[a-z]*r[a-z]*\s", "permission change"),
    (r"\bmkfs(\.[a-z0-9]+)?\b", "filesystem format"),
    (r"\bdd\s+.*\bof=/dev/", "raw device write"),
    (r">\s*/dev/(sd|nvme|hd|disk)", "raw device write"),
    (r":\(\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;\s*:", "fork bomb"),
    (r"\bdel\s+(/[a-z]\s+)*/[fsq]\b", "windows delete"),
    (r"\b(rd|rmdir)\s+(/[a-z]\s+)*/s\b", "windows directory delete"),
    (r"\bformat\s+[a-z]:", "windows format"),
];

/// Fixed, case-insensitive blocklist; not configurable at runtime.
#[allow(clippy::expect_used)]
pub static DANGEROUS_PATTERNS: LazyLock<Vec<DangerousPattern>> = LazyLock::new(|| {
    DANGEROUS_SOURCES
        .iter()
        .map(|&(source, category)| DangerousPattern {
            source,
            category,
            regex: RegexBuilder::new(source)
                .case_insensitive(true)
                .build()
                .expect("static dangerous pattern must compile"),
        })
        .collect()
});

/// Return the first dangerous pattern matching the full command text.
#[must_use]
pub fn find_dangerous(command: &str) -> Option<&'static DangerousPattern> {
    if command.trim().is_empty() {
        return None;
    }
    DANGEROUS_PATTERNS.iter().find(|p| p.regex.is_match(command))
}

// ── Matching ─────────────────────────────────────────────────────────────────

/// First whitespace-delimited token of a command line.
#[must_use]
pub fn first_token(command: &str) -> Option<&str> {
    command.split_whitespace().next()
}

/// Simple glob: `*` matches any run of characters, `?` exactly one.
/// Everything else matches literally.
#[must_use]
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|&c| c == '*')
}

/// Whether `pattern` matches the command's first token.
#[must_use]
pub fn matches_first_token(pattern: &str, command: &str) -> bool {
    first_token(command).is_some_and(|token| glob_match(pattern, token))
}

// ── Risk scoring ─────────────────────────────────────────────────────────────

/// Additive bonus for shell composition operators.
#[must_use]
pub fn composition_bonus(command: &str) -> u8 {
    let mut bonus = 0;
    if command.contains('|') {
        bonus += 1;
    }
    if command.contains('>') {
        bonus += 1;
    }
    if command.contains("&&") || command.contains(';') {
        bonus += 1;
    }
    if command.contains("$(") || command.contains('`') {
        bonus += 2;
    }
    bonus
}

/// Combine a base risk with the composition bonus, capped at `MAX_RISK`.
#[must_use]
pub fn score(base_risk: u8, command: &str) -> RiskScore {
    let bonus = composition_bonus(command);
    let risk = base_risk.saturating_add(bonus).min(MAX_RISK);
    RiskScore {
        risk,
        level: RiskLevel::from_score(risk),
        base_risk,
        bonus,
    }
}

// ── Defaults ─────────────────────────────────────────────────────────────────

/// Allow-list installed on a fresh engine: `(pattern, risk, description)`.
pub const DEFAULT_WHITELIST: &[(&str, u8, &str)] = &[
    ("ls", 1, "list directory"),
    ("dir", 1, "list directory"),
    ("pwd", 1, "print working directory"),
    ("echo", 1, "print text"),
    ("date", 1, "print date"),
    ("whoami", 1, "print user"),
    ("hostname", 1, "print host name"),
    ("uname", 1, "system information"),
    ("which", 1, "locate command"),
    ("wc", 1, "count lines"),
    ("cat", 2, "print file"),
    ("head", 2, "print file head"),
    ("tail", 2, "print file tail"),
    ("grep", 2, "search text"),
    ("find", 2, "search files"),
    ("sort", 2, "sort lines"),
    ("mkdir", 3, "create directory"),
    ("touch", 3, "create file"),
    ("git", 4, "version control"),
    ("cp", 5, "copy files"),
    ("npm", 5, "node package manager"),
    ("cargo", 5, "rust package manager"),
    ("pip", 5, "python package manager"),
    ("mv", 6, "move files"),
    ("python", 6, "python interpreter"),
    ("python3", 6, "python interpreter"),
    ("node", 6, "node interpreter"),
];

// ── Paths and resources ──────────────────────────────────────────────────────

/// Component-wise containment: `/tmp/safe` contains `/tmp/safe/f` but not
/// `/tmp/safer`.
#[must_use]
pub fn path_within(root: &str, path: &str) -> bool {
    Path::new(path).starts_with(Path::new(root))
}

/// Compare reported usage against configured limits. Resources without a
/// limit are ignored.
pub fn check_resources<'a>(
    limits: impl IntoIterator<Item = (&'a String, &'a u64)>,
    usage: &std::collections::BTreeMap<String, u64>,
) -> ResourceCheck {
    let violations: Vec<ResourceViolation> = limits
        .into_iter()
        .filter_map(|(name, &limit)| {
            usage
                .get(name)
                .filter(|&&actual| actual > limit)
                .map(|&actual| ResourceViolation {
                    resource: name.clone(),
                    limit,
                    actual,
                })
        })
        .collect();
    ResourceCheck {
        allowed: violations.is_empty(),
        violations,
    }
}
