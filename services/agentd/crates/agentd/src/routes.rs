//! HTTP surface of the agent daemon.
//!
//! Every handler returns `(StatusCode, Json<Envelope<T>>)`. Expected
//! failures become an envelope with `ok=false` and an HTTP status derived
//! from the error kind; handlers never panic on bad input.
//!
//! Reads are open. Anything that changes policy, execution or process
//! state runs only inside an authenticated session, and commands are
//! only started through the orchestrated `/v1/agent/*` routes.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{FromRequest, Path, Query, Request, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;
use warden_agent::{AgentError, AgentResult, LocalAgent};
use warden_common::api::{
    Ack, AddEntryRequest, AuditRecordRequest, AuthenticateRequest, CapabilityRequest,
    CommandRequest, EnvVarRequest, EstablishRequest, ExecuteRequest, LimitQuery,
    OverrideRequest, PathRequest, PatternRequest, ResourceLimitRequest, ResourceUsageRequest,
    SendMessageRequest, SetEnabledRequest, StartProcessRequest, WorkingDirRequest,
};
use warden_common::{
    AuditEntry, AuthOutcome, CommandOutcome, DangerCheck, Decision, Details, Envelope, ErrorKind,
    Established, ExecutionRecord, ExecutionSummary, HeartbeatAck,
    HeartbeatHealth, ManagedProcess, MessageQueued, OverrideRule, PathCheck, PendingMessage,
    PolicyChange, PolicyEntry, PolicySnapshot, PolicySummary, Reconnected, ResourceCheck,
    ResourceUsage, RiskScore, SessionSummary, paths,
};

pub type SharedAgent = Arc<LocalAgent>;

type ApiResponse<T> = (StatusCode, Json<Envelope<T>>);

/// Default page size for list endpoints when `?limit=` is absent.
const DEFAULT_LIMIT: usize = 100;

// ===================================================================
// Envelope helpers
// ===================================================================

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorKind::Denied => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::NotConnected => StatusCode::CONFLICT,
        ErrorKind::PreconditionFailed => StatusCode::PRECONDITION_FAILED,
        ErrorKind::RetryExhausted => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn ok<T>(data: T) -> ApiResponse<T> {
    (StatusCode::OK, Json(Envelope::success(data)))
}

fn respond<T>(result: AgentResult<T>) -> ApiResponse<T> {
    match result {
        Ok(data) => ok(data),
        Err(e) => {
            let kind = e.kind();
            if kind == ErrorKind::Internal {
                tracing::error!(error = %e, "request failed");
            } else {
                tracing::debug!(error = %e, %kind, "request refused");
            }
            (status_for(kind), Json(Envelope::failure(kind, e.to_string())))
        }
    }
}

/// Run `op` only when the agent holds an authenticated session.
fn gated<T>(agent: &SharedAgent, op: impl FnOnce() -> AgentResult<T>) -> ApiResponse<T> {
    respond(agent.require_session().and_then(|()| op()))
}

fn limit(query: &LimitQuery) -> usize {
    query.limit.unwrap_or(DEFAULT_LIMIT)
}

/// `Json<T>` whose rejection is an `InvalidArgument` envelope instead of
/// axum's plain-text body.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = axum::extract::rejection::JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiResponse<()>;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err((
                StatusCode::BAD_REQUEST,
                Json(Envelope::failure(
                    ErrorKind::InvalidArgument,
                    rejection.body_text(),
                )),
            )),
        }
    }
}

// ===================================================================
// Router
// ===================================================================

/// Build the full router over a shared agent.
pub fn router(agent: SharedAgent) -> Router {
    Router::new()
        .route(paths::HEALTH, get(health))
        // Session
        .route(paths::SESSION_ESTABLISH, post(session_establish))
        .route(paths::SESSION_AUTHENTICATE, post(session_authenticate))
        .route(paths::SESSION_HEARTBEAT, post(session_heartbeat))
        .route(paths::SESSION_HEALTH, get(session_health))
        .route(paths::SESSION_DISCONNECT, post(session_disconnect))
        .route(paths::SESSION_RECONNECT, post(session_reconnect))
        .route(
            paths::SESSION_MESSAGES,
            post(session_send_message).get(session_drain_messages),
        )
        .route(paths::SESSION_STATUS, get(session_status))
        // Policy
        .route(paths::POLICY_AUTHORIZE, post(policy_authorize))
        .route(paths::POLICY_SCORE, post(policy_score))
        .route(paths::POLICY_DANGEROUS, post(policy_dangerous))
        .route(paths::POLICY_ENTRIES, get(policy_get_all).post(policy_add))
        .route(paths::POLICY_ENTRIES_REMOVE, post(policy_remove))
        .route(paths::POLICY_OVERRIDES, post(policy_add_override))
        .route(paths::POLICY_OVERRIDES_REMOVE, post(policy_remove_override))
        .route(paths::POLICY_BLOCKED, post(policy_block))
        .route(paths::POLICY_BLOCKED_REMOVE, post(policy_unblock))
        .route(paths::POLICY_ENABLED, post(policy_set_enabled))
        .route(paths::POLICY_PATHS, post(policy_allow_path))
        .route(paths::POLICY_PATHS_REMOVE, post(policy_remove_path))
        .route(paths::POLICY_PATHS_CHECK, post(policy_check_path))
        .route(paths::POLICY_LIMITS, post(policy_set_limit))
        .route(paths::POLICY_LIMITS_CHECK, post(policy_check_limits))
        .route(paths::POLICY_LOG, get(policy_log))
        .route(paths::POLICY_SUMMARY, get(policy_summary))
        .route(paths::AUDIT_LOG, get(audit_log).post(audit_record))
        // Execution
        .route(paths::EXEC_CWD, post(exec_set_cwd))
        .route(paths::EXEC_ENV, get(exec_get_env).post(exec_set_env))
        .route(paths::EXEC_HISTORY, get(exec_history))
        .route(paths::EXEC_SUMMARY, get(exec_summary))
        // Processes
        .route(paths::PROCESSES, get(process_list))
        .route(paths::PROCESS_BY_PID, get(process_get))
        .route(paths::PROCESS_STOP, post(process_stop))
        .route(paths::PROCESS_KILL, post(process_kill))
        .route(paths::PROCESS_MONITOR, post(process_monitor))
        .route(paths::PROCESS_UNMONITOR, post(process_unmonitor))
        .route(paths::PROCESS_USAGE, get(process_usage))
        // Orchestrated
        .route(paths::AGENT_COMMAND, post(agent_command))
        .route(paths::AGENT_PROCESS, post(agent_process))
        .route(paths::AGENT_CAPABILITY, post(agent_capability))
        .layer(TraceLayer::new_for_http())
        .with_state(agent)
}

/// Liveness probe for supervisors and load balancers.
async fn health() -> StatusCode {
    StatusCode::OK
}

// ===================================================================
// Session
// ===================================================================

async fn session_establish(
    State(agent): State<SharedAgent>,
    ApiJson(req): ApiJson<EstablishRequest>,
) -> ApiResponse<Established> {
    respond(agent.connection().establish(&req.host, req.port, &req.token))
}

async fn session_authenticate(
    State(agent): State<SharedAgent>,
    ApiJson(req): ApiJson<AuthenticateRequest>,
) -> ApiResponse<AuthOutcome> {
    respond(agent.connection().authenticate(&req.token))
}

async fn session_heartbeat(State(agent): State<SharedAgent>) -> ApiResponse<HeartbeatAck> {
    respond(agent.connection().send_heartbeat())
}

async fn session_health(State(agent): State<SharedAgent>) -> ApiResponse<HeartbeatHealth> {
    ok(agent.connection().check_heartbeat())
}

async fn session_disconnect(State(agent): State<SharedAgent>) -> ApiResponse<Ack> {
    ok(Ack {
        changed: agent.connection().disconnect(),
    })
}

async fn session_reconnect(State(agent): State<SharedAgent>) -> ApiResponse<Reconnected> {
    respond(agent.connection().reconnect())
}

async fn session_send_message(
    State(agent): State<SharedAgent>,
    ApiJson(req): ApiJson<SendMessageRequest>,
) -> ApiResponse<MessageQueued> {
    respond(agent.connection().send_message(&req.message_type, req.payload))
}

async fn session_drain_messages(
    State(agent): State<SharedAgent>,
    Query(query): Query<LimitQuery>,
) -> ApiResponse<Vec<PendingMessage>> {
    ok(agent.connection().drain_messages(limit(&query)))
}

async fn session_status(State(agent): State<SharedAgent>) -> ApiResponse<SessionSummary> {
    ok(agent.connection().summary())
}

// ===================================================================
// Policy
// ===================================================================

async fn policy_authorize(
    State(agent): State<SharedAgent>,
    ApiJson(req): ApiJson<CommandRequest>,
) -> ApiResponse<Decision> {
    // A refusal is a decision, not an error.
    ok(agent.policy().authorize(&req.command))
}

async fn policy_score(
    State(agent): State<SharedAgent>,
    ApiJson(req): ApiJson<CommandRequest>,
) -> ApiResponse<RiskScore> {
    respond(agent.policy().score_risk(&req.command))
}

async fn policy_dangerous(
    State(agent): State<SharedAgent>,
    ApiJson(req): ApiJson<CommandRequest>,
) -> ApiResponse<DangerCheck> {
    ok(agent.policy().block_dangerous(&req.command))
}

async fn policy_get_all(State(agent): State<SharedAgent>) -> ApiResponse<PolicySnapshot> {
    ok(agent.policy().get_all())
}

async fn policy_add(
    State(agent): State<SharedAgent>,
    ApiJson(req): ApiJson<AddEntryRequest>,
) -> ApiResponse<PolicyEntry> {
    gated(&agent, || {
        agent
            .policy()
            .add(&req.pattern, req.risk_level, &req.description)
    })
}

async fn policy_remove(
    State(agent): State<SharedAgent>,
    ApiJson(req): ApiJson<PatternRequest>,
) -> ApiResponse<PolicyEntry> {
    gated(&agent, || agent.policy().remove(&req.pattern))
}

async fn policy_add_override(
    State(agent): State<SharedAgent>,
    ApiJson(req): ApiJson<OverrideRequest>,
) -> ApiResponse<OverrideRule> {
    gated(&agent, || {
        agent
            .policy()
            .add_override(&req.pattern, req.allowed, &req.reason)
    })
}

async fn policy_remove_override(
    State(agent): State<SharedAgent>,
    ApiJson(req): ApiJson<PatternRequest>,
) -> ApiResponse<OverrideRule> {
    gated(&agent, || agent.policy().remove_override(&req.pattern))
}

async fn policy_block(
    State(agent): State<SharedAgent>,
    ApiJson(req): ApiJson<PatternRequest>,
) -> ApiResponse<Ack> {
    gated(&agent, || {
        agent
            .policy()
            .add_blocked_command(&req.pattern)
            .map(|changed| Ack { changed })
    })
}

async fn policy_unblock(
    State(agent): State<SharedAgent>,
    ApiJson(req): ApiJson<PatternRequest>,
) -> ApiResponse<Ack> {
    gated(&agent, || {
        agent
            .policy()
            .remove_blocked_command(&req.pattern)
            .map(|()| Ack { changed: true })
    })
}

async fn policy_set_enabled(
    State(agent): State<SharedAgent>,
    ApiJson(req): ApiJson<SetEnabledRequest>,
) -> ApiResponse<PolicySummary> {
    gated(&agent, || {
        agent.policy().set_enabled(req.enabled);
        Ok(agent.policy().summary())
    })
}

async fn policy_allow_path(
    State(agent): State<SharedAgent>,
    ApiJson(req): ApiJson<PathRequest>,
) -> ApiResponse<usize> {
    gated(&agent, || agent.policy().add_allowed_path(&req.path))
}

async fn policy_remove_path(
    State(agent): State<SharedAgent>,
    ApiJson(req): ApiJson<PathRequest>,
) -> ApiResponse<Ack> {
    gated(&agent, || {
        agent
            .policy()
            .remove_allowed_path(&req.path)
            .map(|()| Ack { changed: true })
    })
}

async fn policy_check_path(
    State(agent): State<SharedAgent>,
    ApiJson(req): ApiJson<PathRequest>,
) -> ApiResponse<PathCheck> {
    ok(agent.policy().check_path(&req.path))
}

async fn policy_set_limit(
    State(agent): State<SharedAgent>,
    ApiJson(req): ApiJson<ResourceLimitRequest>,
) -> ApiResponse<Ack> {
    gated(&agent, || {
        agent
            .policy()
            .set_resource_limit(&req.resource, req.max)
            .map(|()| Ack { changed: true })
    })
}

async fn policy_check_limits(
    State(agent): State<SharedAgent>,
    ApiJson(req): ApiJson<ResourceUsageRequest>,
) -> ApiResponse<ResourceCheck> {
    ok(agent.policy().check_resources(&req.usage))
}

async fn policy_log(
    State(agent): State<SharedAgent>,
    Query(query): Query<LimitQuery>,
) -> ApiResponse<Vec<PolicyChange>> {
    ok(agent.policy().get_log(limit(&query)))
}

async fn policy_summary(State(agent): State<SharedAgent>) -> ApiResponse<PolicySummary> {
    ok(agent.policy().summary())
}

async fn audit_log(
    State(agent): State<SharedAgent>,
    Query(query): Query<LimitQuery>,
) -> ApiResponse<Vec<AuditEntry>> {
    ok(agent.policy().audit_log(limit(&query)))
}

async fn audit_record(
    State(agent): State<SharedAgent>,
    ApiJson(req): ApiJson<AuditRecordRequest>,
) -> ApiResponse<AuditEntry> {
    gated(&agent, || agent.policy().record_audit(&req.action, req.details))
}

// ===================================================================
// Execution
// ===================================================================

async fn exec_set_cwd(
    State(agent): State<SharedAgent>,
    ApiJson(req): ApiJson<WorkingDirRequest>,
) -> ApiResponse<String> {
    gated(&agent, || {
        agent
            .executor()
            .set_working_directory(&req.path)
            .map(|p| p.display().to_string())
    })
}

async fn exec_get_env(State(agent): State<SharedAgent>) -> ApiResponse<BTreeMap<String, String>> {
    ok(agent.executor().get_environment())
}

async fn exec_set_env(
    State(agent): State<SharedAgent>,
    ApiJson(req): ApiJson<EnvVarRequest>,
) -> ApiResponse<Ack> {
    gated(&agent, || {
        agent
            .executor()
            .set_env_var(&req.key, &req.value)
            .map(|()| Ack { changed: true })
    })
}

async fn exec_history(
    State(agent): State<SharedAgent>,
    Query(query): Query<LimitQuery>,
) -> ApiResponse<Vec<ExecutionRecord>> {
    ok(agent.executor().get_history(limit(&query)))
}

async fn exec_summary(State(agent): State<SharedAgent>) -> ApiResponse<ExecutionSummary> {
    ok(agent.executor().summary())
}

// ===================================================================
// Processes
// ===================================================================

async fn process_list(State(agent): State<SharedAgent>) -> ApiResponse<Vec<ManagedProcess>> {
    ok(agent.supervisor().list_processes())
}

async fn process_get(
    State(agent): State<SharedAgent>,
    Path(pid): Path<u32>,
) -> ApiResponse<ManagedProcess> {
    respond(agent.supervisor().get_process(pid))
}

async fn process_stop(
    State(agent): State<SharedAgent>,
    Path(pid): Path<u32>,
) -> ApiResponse<ManagedProcess> {
    gated(&agent, || agent.supervisor().stop_process(pid))
}

async fn process_kill(
    State(agent): State<SharedAgent>,
    Path(pid): Path<u32>,
) -> ApiResponse<ManagedProcess> {
    gated(&agent, || agent.supervisor().kill_process(pid))
}

async fn process_monitor(
    State(agent): State<SharedAgent>,
    Path(pid): Path<u32>,
) -> ApiResponse<Ack> {
    gated(&agent, || agent.supervisor().monitor(pid).map(|changed| Ack { changed }))
}

async fn process_unmonitor(
    State(agent): State<SharedAgent>,
    Path(pid): Path<u32>,
) -> ApiResponse<Ack> {
    gated(&agent, || {
        agent
            .supervisor()
            .unmonitor(pid)
            .map(|()| Ack { changed: true })
    })
}

async fn process_usage(
    State(agent): State<SharedAgent>,
    Path(pid): Path<u32>,
) -> ApiResponse<ResourceUsage> {
    respond(agent.supervisor().get_resource_usage(pid))
}

// ===================================================================
// Orchestrated
// ===================================================================

async fn agent_command(
    State(agent): State<SharedAgent>,
    ApiJson(req): ApiJson<ExecuteRequest>,
) -> ApiResponse<CommandOutcome> {
    let result = agent
        .run_command(
            &req.command,
            req.timeout_secs.map(Duration::from_secs),
            &req.env,
            req.capture_stderr,
        )
        .await;
    if let Err(AgentError::Denied { reason, risk_level }) = &result {
        tracing::info!(command = %req.command, reason = %reason, risk_level, "command denied");
    }
    respond(result)
}

async fn agent_process(
    State(agent): State<SharedAgent>,
    ApiJson(req): ApiJson<StartProcessRequest>,
) -> ApiResponse<ManagedProcess> {
    respond(agent.start_process(&req.command, &req.name, &req.env))
}

async fn agent_capability(
    State(agent): State<SharedAgent>,
    ApiJson(req): ApiJson<CapabilityRequest>,
) -> ApiResponse<Details> {
    respond(agent.invoke_capability(&req.name, &req.action, &req.args))
}
