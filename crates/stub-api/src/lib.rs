//! In-process stand-in for the audit backend, used by the workspace test
//! suites. Serves the same four routes as the real service on a random
//! local port, with scripted data instead of real analysis.
//!
//! Each run carries a status script. Listing peeks at the current entry;
//! every status poll consumes one entry and then holds on the last, so a
//! test scripting `[RUNNING, COMPLETED]` sees exactly two polls from a
//! well-behaved watcher. All endpoints count their hits.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

type Shared = Arc<Mutex<StubState>>;

/// Scripted lifecycle of one run, registered before the test drives the
/// console against it.
#[derive(Debug, Clone)]
pub struct ScriptedRun {
    audit_id: i64,
    run_id: i64,
    input_url: String,
    normalized_url: String,
    created_at: Option<String>,
    statuses: Vec<String>,
    cursor: usize,
    polls: usize,
    fail_polls: usize,
    result_json: Option<String>,
    report_token: Option<String>,
    last_error: Option<String>,
}

impl ScriptedRun {
    pub fn new(run_id: i64, url: &str) -> Self {
        ScriptedRun {
            audit_id: run_id,
            run_id,
            input_url: url.to_string(),
            normalized_url: normalize(url),
            created_at: None,
            statuses: vec!["QUEUED".to_string()],
            cursor: 0,
            polls: 0,
            fail_polls: 0,
            result_json: None,
            report_token: None,
            last_error: None,
        }
    }

    pub fn audit_id(mut self, id: i64) -> Self {
        self.audit_id = id;
        self
    }

    /// Replace the status script. Must not be empty.
    pub fn statuses(mut self, statuses: &[&str]) -> Self {
        assert!(!statuses.is_empty(), "status script must not be empty");
        self.statuses = statuses.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn created_at(mut self, ts: &str) -> Self {
        self.created_at = Some(ts.to_string());
        self
    }

    /// Answer the first `n` status polls with a 500 before resuming the
    /// script. The script cursor does not move on a failed poll.
    pub fn fail_first_polls(mut self, n: usize) -> Self {
        self.fail_polls = n;
        self
    }

    pub fn result_json(mut self, raw: &str) -> Self {
        self.result_json = Some(raw.to_string());
        self
    }

    pub fn report_token(mut self, token: &str) -> Self {
        self.report_token = Some(token.to_string());
        self
    }

    pub fn last_error(mut self, message: &str) -> Self {
        self.last_error = Some(message.to_string());
        self
    }

    fn current(&self) -> &str {
        let idx = self.cursor.min(self.statuses.len() - 1);
        &self.statuses[idx]
    }

    fn is_terminal(&self) -> bool {
        matches!(self.current(), "COMPLETED" | "FAILED")
    }
}

#[derive(Debug, Default)]
struct StubState {
    runs: Vec<ScriptedRun>,
    reports: HashMap<String, Value>,
    report_failures: HashMap<String, (u16, String)>,
    hits: HashMap<&'static str, usize>,
    next_audit_id: i64,
    next_run_id: i64,
    create_script: Vec<String>,
    create_result_json: Option<String>,
    create_report_token: Option<String>,
    create_last_error: Option<String>,
    created_urls: Vec<String>,
    fail_next_create: Option<(u16, String)>,
    list_no_content: bool,
}

/// Handle to one running stub instance. Dropping it stops the server.
pub struct StubApi {
    addr: SocketAddr,
    state: Shared,
    server: JoinHandle<()>,
}

impl StubApi {
    /// Bind a random local port and start serving. Needs a running tokio
    /// runtime.
    pub async fn start() -> Self {
        let state: Shared = Arc::new(Mutex::new(StubState {
            next_audit_id: 100,
            next_run_id: 1000,
            create_script: vec!["QUEUED".to_string()],
            ..StubState::default()
        }));
        let app = Router::new()
            .route("/api/audits", get(list_audits).post(create_audit))
            .route("/api/audits/runs/{run_id}", get(run_status))
            .route("/api/reports/{token}", get(get_report))
            .with_state(state.clone());
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub port");
        let addr = listener.local_addr().expect("stub local addr");
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        StubApi {
            addr,
            state,
            server,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn script_run(&self, run: ScriptedRun) {
        self.lock().runs.push(run);
    }

    pub fn add_report(&self, token: &str, doc: Value) {
        self.lock().reports.insert(token.to_string(), doc);
    }

    /// Make one report endpoint answer with a fixed non-404 failure.
    pub fn fail_report(&self, token: &str, status: u16, body: &str) {
        self.lock()
            .report_failures
            .insert(token.to_string(), (status, body.to_string()));
    }

    pub fn fail_next_create(&self, status: u16, body: &str) {
        self.lock().fail_next_create = Some((status, body.to_string()));
    }

    pub fn set_list_no_content(&self, yes: bool) {
        self.lock().list_no_content = yes;
    }

    /// Status script given to runs created through POST /api/audits.
    pub fn set_create_script(&self, statuses: &[&str]) {
        assert!(!statuses.is_empty(), "status script must not be empty");
        self.lock().create_script = statuses.iter().map(|s| s.to_string()).collect();
    }

    pub fn set_create_result_json(&self, raw: &str) {
        self.lock().create_result_json = Some(raw.to_string());
    }

    /// Failure reason reported for runs created through POST once their
    /// script reaches FAILED.
    pub fn set_create_last_error(&self, message: &str) {
        self.lock().create_last_error = Some(message.to_string());
    }

    /// Attach a report token to runs created through POST, and register a
    /// sample report document under it.
    pub fn set_create_report_token(&self, token: &str) {
        let mut state = self.lock();
        state.create_report_token = Some(token.to_string());
        state
            .reports
            .entry(token.to_string())
            .or_insert_with(|| sample_report("example.com"));
    }

    /// Requests seen so far for `"create"`, `"list"`, `"status"` or
    /// `"report"`.
    pub fn hits(&self, endpoint: &str) -> usize {
        assert!(
            matches!(endpoint, "create" | "list" | "status" | "report"),
            "unknown endpoint label {endpoint:?}"
        );
        self.lock().hits.get(endpoint).copied().unwrap_or(0)
    }

    /// Status polls seen for one run, failed ones included.
    pub fn polls_for(&self, run_id: i64) -> usize {
        self.lock()
            .runs
            .iter()
            .find(|r| r.run_id == run_id)
            .map(|r| r.polls)
            .unwrap_or(0)
    }

    /// Raw `url` values received on POST /api/audits, in order.
    pub fn created_urls(&self) -> Vec<String> {
        self.lock().created_urls.clone()
    }

    /// Run id allocated for the most recent POST, if any.
    pub fn last_created_run_id(&self) -> Option<i64> {
        let state = self.lock();
        if state.created_urls.is_empty() {
            None
        } else {
            Some(state.next_run_id - 1)
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StubState> {
        self.state.lock().expect("stub state lock")
    }
}

impl Drop for StubApi {
    fn drop(&mut self) {
        self.server.abort();
    }
}

fn normalize(url: &str) -> String {
    if url.contains("://") {
        url.to_string()
    } else {
        format!("https://{url}/")
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

fn run_json(run: &ScriptedRun, full: bool) -> Value {
    let terminal = run.is_terminal();
    let mut doc = json!({
        "auditId": run.audit_id,
        "inputUrl": run.input_url,
        "normalizedUrl": run.normalized_url,
        "runId": run.run_id,
        "status": run.current(),
        "createdAt": run.created_at,
        "finishedAt": if terminal { Some(now_rfc3339()) } else { None },
        "resultJson": if terminal { run.result_json.clone() } else { None },
        "reportToken": if terminal { run.report_token.clone() } else { None },
    });
    if full {
        doc["lastError"] = if run.current() == "FAILED" {
            json!(run.last_error)
        } else {
            Value::Null
        };
        doc["startedAt"] = Value::Null;
    }
    doc
}

async fn create_audit(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    let mut state = state.lock().expect("stub state lock");
    *state.hits.entry("create").or_insert(0) += 1;
    if let Some((status, message)) = state.fail_next_create.take() {
        return failure(status, message);
    }
    let Some(url) = body.get("url").and_then(Value::as_str).map(str::to_string) else {
        return failure(400, "missing url".to_string());
    };
    state.created_urls.push(url.clone());
    let audit_id = state.next_audit_id;
    let run_id = state.next_run_id;
    state.next_audit_id += 1;
    state.next_run_id += 1;
    let mut run = ScriptedRun::new(run_id, &url).audit_id(audit_id);
    run.statuses = state.create_script.clone();
    run.created_at = Some(now_rfc3339());
    run.result_json = state.create_result_json.clone();
    run.report_token = state.create_report_token.clone();
    run.last_error = state.create_last_error.clone();
    let reply = json!({
        "auditId": audit_id,
        "runId": run_id,
        "status": run.current(),
        "normalizedUrl": run.normalized_url,
    });
    state.runs.push(run);
    Json(reply).into_response()
}

async fn list_audits(State(state): State<Shared>) -> Response {
    let mut state = state.lock().expect("stub state lock");
    *state.hits.entry("list").or_insert(0) += 1;
    if state.list_no_content {
        return StatusCode::NO_CONTENT.into_response();
    }
    let items: Vec<Value> = state.runs.iter().map(|r| run_json(r, false)).collect();
    Json(Value::Array(items)).into_response()
}

async fn run_status(State(state): State<Shared>, Path(run_id): Path<i64>) -> Response {
    let mut state = state.lock().expect("stub state lock");
    *state.hits.entry("status").or_insert(0) += 1;
    let Some(run) = state.runs.iter_mut().find(|r| r.run_id == run_id) else {
        return failure(404, format!("run {run_id} not found"));
    };
    run.polls += 1;
    if run.fail_polls > 0 {
        run.fail_polls -= 1;
        return failure(500, "stub: injected poll failure".to_string());
    }
    let doc = run_json(run, true);
    run.cursor = (run.cursor + 1).min(run.statuses.len() - 1);
    Json(doc).into_response()
}

async fn get_report(State(state): State<Shared>, Path(token): Path<String>) -> Response {
    let mut state = state.lock().expect("stub state lock");
    *state.hits.entry("report").or_insert(0) += 1;
    if let Some((status, body)) = state.report_failures.get(&token) {
        return failure(*status, body.clone());
    }
    match state.reports.get(&token) {
        Some(doc) => Json(doc.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

fn failure(status: u16, body: String) -> Response {
    let code = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (code, body).into_response()
}

/// A small but complete report document for tests.
pub fn sample_report(domain: &str) -> Value {
    json!({
        "generatedAt": "2025-08-25T10:00:00Z",
        "domain": domain,
        "url": format!("https://{domain}/"),
        "site": { "title": null, "logoUrl": null },
        "scores": {
            "global": 72,
            "byCategory": [
                { "key": "security", "label": "Security", "score": 58, "issues": 2 },
                { "key": "performance", "label": "Performance", "score": 81, "issues": 1 }
            ]
        },
        "summary": {
            "oneLiner": "Good potential: a few targeted fixes would help.",
            "priorities": [
                {
                    "severity": "critical",
                    "title": "Serve the site over HTTPS",
                    "impact": "Browsers flag the current pages as not secure.",
                    "effort": "M"
                }
            ]
        },
        "issues": [
            {
                "id": "https-missing",
                "categoryKey": "security",
                "module": "http",
                "severity": "critical",
                "title": "Serve the site over HTTPS",
                "impact": "Browsers flag the current pages as not secure.",
                "evidence": "final URL resolves to http://",
                "recommendation": "Install a certificate and redirect HTTP to HTTPS.",
                "effort": "M"
            },
            {
                "id": "hsts-missing",
                "categoryKey": "security",
                "module": "http",
                "severity": "important",
                "title": "Missing HSTS header",
                "impact": "Connections may be silently downgraded.",
                "recommendation": "Add a Strict-Transport-Security header.",
                "effort": "S"
            },
            {
                "id": "img-alt",
                "categoryKey": "performance",
                "module": "html",
                "severity": "info",
                "title": "Images without alt text",
                "impact": "Minor accessibility and indexing impact.",
                "recommendation": "Add alt attributes to content images.",
                "effort": "XS"
            }
        ],
        "tech": {
            "cms": null,
            "frontendFramework": { "name": "react", "confidence": 0.7 },
            "nextJs": {
                "isNext": true,
                "confidence": 0.9,
                "router": "app",
                "buildId": "abc123",
                "version": {
                    "exact": null,
                    "min": "13",
                    "max": null,
                    "guess": "14",
                    "guessConfidence": 0.6,
                    "method": "buildManifest"
                },
                "evidence": ["/_next/ assets", "__NEXT_DATA__"]
            }
        }
    })
}
