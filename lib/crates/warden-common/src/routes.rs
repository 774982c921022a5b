/// HTTP paths served by the agent daemon.
///
/// Every route takes and returns JSON; responses are wrapped in
/// [`crate::Envelope`].
pub mod paths {
    /// Liveness probe (plain 200, no envelope).
    pub const HEALTH: &str = "/health";

    // Session surface
    pub const SESSION_ESTABLISH: &str = "/v1/session/establish";
    pub const SESSION_AUTHENTICATE: &str = "/v1/session/authenticate";
    pub const SESSION_HEARTBEAT: &str = "/v1/session/heartbeat";
    /// GET: heartbeat health check.
    pub const SESSION_HEALTH: &str = "/v1/session/health";
    pub const SESSION_DISCONNECT: &str = "/v1/session/disconnect";
    pub const SESSION_RECONNECT: &str = "/v1/session/reconnect";
    /// POST: enqueue. GET: drain (`?limit=`).
    pub const SESSION_MESSAGES: &str = "/v1/session/messages";
    pub const SESSION_STATUS: &str = "/v1/session/status";

    // Command surface
    pub const POLICY_AUTHORIZE: &str = "/v1/policy/authorize";
    pub const POLICY_SCORE: &str = "/v1/policy/score";
    /// Side-effect-free dangerous-pattern probe.
    pub const POLICY_DANGEROUS: &str = "/v1/policy/dangerous";
    /// GET: full table dump. POST: add/update an allow-list entry.
    pub const POLICY_ENTRIES: &str = "/v1/policy/entries";
    pub const POLICY_ENTRIES_REMOVE: &str = "/v1/policy/entries/remove";
    pub const POLICY_OVERRIDES: &str = "/v1/policy/overrides";
    pub const POLICY_OVERRIDES_REMOVE: &str = "/v1/policy/overrides/remove";
    pub const POLICY_BLOCKED: &str = "/v1/policy/blocked";
    pub const POLICY_BLOCKED_REMOVE: &str = "/v1/policy/blocked/remove";
    pub const POLICY_ENABLED: &str = "/v1/policy/enabled";
    pub const POLICY_PATHS: &str = "/v1/policy/paths";
    pub const POLICY_PATHS_REMOVE: &str = "/v1/policy/paths/remove";
    pub const POLICY_PATHS_CHECK: &str = "/v1/policy/paths/check";
    pub const POLICY_LIMITS: &str = "/v1/policy/limits";
    pub const POLICY_LIMITS_CHECK: &str = "/v1/policy/limits/check";
    pub const POLICY_LOG: &str = "/v1/policy/log";
    pub const POLICY_SUMMARY: &str = "/v1/policy/summary";
    pub const AUDIT_LOG: &str = "/v1/audit";

    // Execution surface
    pub const EXEC_CWD: &str = "/v1/exec/cwd";
    pub const EXEC_ENV: &str = "/v1/exec/env";
    pub const EXEC_HISTORY: &str = "/v1/exec/history";
    pub const EXEC_SUMMARY: &str = "/v1/exec/summary";

    // Process surface
    /// GET: list managed. Starting goes through `AGENT_PROCESS`.
    pub const PROCESSES: &str = "/v1/processes";
    /// `/{pid}` lookup; `/{pid}/stop`, `/{pid}/kill`, `/{pid}/monitor`,
    /// `/{pid}/unmonitor`, `/{pid}/usage` act on it.
    pub const PROCESS_BY_PID: &str = "/v1/processes/{pid}";
    pub const PROCESS_STOP: &str = "/v1/processes/{pid}/stop";
    pub const PROCESS_KILL: &str = "/v1/processes/{pid}/kill";
    pub const PROCESS_MONITOR: &str = "/v1/processes/{pid}/monitor";
    pub const PROCESS_UNMONITOR: &str = "/v1/processes/{pid}/unmonitor";
    pub const PROCESS_USAGE: &str = "/v1/processes/{pid}/usage";

    // Orchestrated surface (session check + authorization)
    pub const AGENT_COMMAND: &str = "/v1/agent/command";
    pub const AGENT_PROCESS: &str = "/v1/agent/process";
    pub const AGENT_CAPABILITY: &str = "/v1/agent/capability";
}

/// Default base URL for clients.
pub const DEFAULT_AGENT_URL: &str = "http://127.0.0.1:8790";

/// Fill the `{pid}` placeholder of a process route.
pub fn process_path(template: &str, pid: u32) -> String {
    template.replace("{pid}", &pid.to_string())
}

/// Join a base URL and a route path without doubling the slash.
pub fn endpoint(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}
