//! Structured JSON-lines logging.
//!
//! Every record goes to stdout and to a per-run directory
//! (`LOG_DIR/RUN_ID/{events,trace}.jsonl`). `LOG_LEVEL` sets the floor and
//! `LOG_DOMAINS` (comma list or `all`) filters by category.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};

use crate::outcome::{symbols, Outcome};

// =============================================================================
// Log Levels
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
}

impl Level {
    pub fn from_env() -> Self {
        match std::env::var("LOG_LEVEL").as_deref() {
            Ok("trace") => Level::Trace,
            Ok("debug") => Level::Debug,
            Ok("info") => Level::Info,
            Ok("warn") => Level::Warn,
            Ok("error") => Level::Error,
            Ok("fatal") => Level::Fatal,
            _ => Level::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

// =============================================================================
// Log Domains
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Road,    // Encoding, paging, rendering
    Session, // Per-user actions and gate contention
    Advisor, // Reasoning-service calls
    Ledger,  // Recommendation outcomes, resets
    System,  // Startup, shutdown
    Audit,   // Replay trail
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Road => "road",
            Domain::Session => "session",
            Domain::Advisor => "advisor",
            Domain::Ledger => "ledger",
            Domain::System => "system",
            Domain::Audit => "audit",
        }
    }

    pub fn is_enabled(&self) -> bool {
        match std::env::var("LOG_DOMAINS").as_deref() {
            Ok("all") | Err(_) => true,
            Ok(domains) => domains.split(',').any(|d| d.trim() == self.as_str()),
        }
    }
}

// =============================================================================
// Run context
// =============================================================================

static LOG_SEQ: AtomicU64 = AtomicU64::new(0);
static RUN_CONTEXT: OnceLock<RunContext> = OnceLock::new();

fn next_seq() -> u64 {
    LOG_SEQ.fetch_add(1, Ordering::SeqCst)
}

#[derive(Debug)]
struct RunContext {
    run_id: String,
    events: Option<Mutex<BufWriter<File>>>,
    trace: Option<Mutex<BufWriter<File>>>,
}

fn open_log(path: PathBuf) -> Option<Mutex<BufWriter<File>>> {
    match File::create(&path) {
        Ok(f) => Some(Mutex::new(BufWriter::new(f))),
        Err(err) => {
            eprintln!("[log] failed to create {}: {}", path.display(), err);
            None
        }
    }
}

fn ensure_run_context() -> &'static RunContext {
    RUN_CONTEXT.get_or_init(|| {
        let run_id = std::env::var("RUN_ID")
            .unwrap_or_else(|_| format!("r-{}-{}", ts_epoch_ms(), process::id()));
        let base = std::env::var("LOG_DIR").unwrap_or_else(|_| "out/runs".to_string());
        let mut run_dir = PathBuf::from(base);
        run_dir.push(&run_id);
        if let Err(err) = create_dir_all(&run_dir) {
            eprintln!("[log] failed to create run dir: {}", err);
        }

        let _ = std::fs::write(
            run_dir.join("manifest.json"),
            json!({
                "run_id": run_id,
                "ts": ts_now(),
                "pid": process::id(),
                "log_dir": run_dir.to_string_lossy(),
            })
            .to_string(),
        );

        RunContext {
            events: open_log(run_dir.join("events.jsonl")),
            trace: open_log(run_dir.join("trace.jsonl")),
            run_id,
        }
    })
}

fn sanitize_fields(mut fields: Map<String, Value>) -> Map<String, Value> {
    let redacted = Value::String("[REDACTED]".to_string());
    for key in ["authorization", "Authorization", "api_key"] {
        if fields.contains_key(key) {
            fields.insert(key.to_string(), redacted.clone());
        }
    }
    fields
}

fn split_fields(mut fields: Map<String, Value>) -> (Map<String, Value>, Map<String, Value>) {
    let mut top = Map::new();
    for key in ["user_id", "msg"] {
        if let Some(value) = fields.remove(key) {
            top.insert(key.to_string(), value);
        }
    }
    (top, fields)
}

fn write_line(writer: &Option<Mutex<BufWriter<File>>>, line: &str) {
    if let Some(Ok(mut w)) = writer.as_ref().map(|m| m.lock()) {
        let _ = writeln!(w, "{}", line);
        let _ = w.flush();
    }
}

// =============================================================================
// Core logging functions
// =============================================================================

/// RFC3339 timestamp with milliseconds
pub fn ts_now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

pub fn ts_epoch_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Emit a structured log entry
pub fn log(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    if level < Level::from_env() || !domain.is_enabled() {
        return;
    }
    emit_record(level, domain.as_str(), event, fields);
}

/// Info record tagged with a component name.
pub fn json_log(module: &str, mut fields: Map<String, Value>) {
    fields.insert("module".to_string(), Value::String(module.to_string()));
    emit_record(Level::Info, module, module, fields);
}

fn emit_record(level: Level, component: &str, event: &str, fields: Map<String, Value>) {
    let ctx = ensure_run_context();
    let fields = sanitize_fields(fields);
    let (mut top, data) = split_fields(fields);

    let msg = top.remove("msg").unwrap_or(Value::String(String::new()));
    let mut entry = Map::new();
    entry.insert("ts".to_string(), json!(ts_now()));
    entry.insert("run_id".to_string(), json!(ctx.run_id.clone()));
    entry.insert("seq".to_string(), json!(next_seq()));
    entry.insert("lvl".to_string(), json!(level.as_str().to_uppercase()));
    entry.insert("component".to_string(), json!(component));
    entry.insert("event".to_string(), json!(event));
    entry.insert("msg".to_string(), msg);
    for (k, v) in top {
        entry.insert(k, v);
    }
    entry.insert("data".to_string(), Value::Object(data));

    let line = Value::Object(entry).to_string();
    match level {
        Level::Trace | Level::Debug => write_line(&ctx.trace, &line),
        _ => write_line(&ctx.events, &line),
    }
    println!("{}", line);
}

// =============================================================================
// Domain helpers
// =============================================================================

/// Stable digest of a history, for replaying a render from the audit trail.
pub fn history_digest(history: &[Outcome]) -> String {
    hex::encode(Sha256::digest(symbols(history).as_bytes()))
}

pub fn log_outcome(user_id: i64, outcome: Outcome, history_len: usize, page: usize) {
    log(
        Level::Info,
        Domain::Session,
        "outcome",
        obj(&[
            ("user_id", json!(user_id)),
            ("outcome", v_str(outcome.as_str())),
            ("history_len", json!(history_len)),
            ("page", json!(page)),
        ]),
    );
}

pub fn log_reset(user_id: i64, cleared_rounds: usize) {
    log(
        Level::Info,
        Domain::Ledger,
        "reset",
        obj(&[("user_id", json!(user_id)), ("cleared_rounds", json!(cleared_rounds))]),
    );
}

pub fn log_busy(user_id: i64, action: &str) {
    log(
        Level::Warn,
        Domain::Session,
        "busy",
        obj(&[
            ("user_id", json!(user_id)),
            ("action", v_str(action)),
            ("msg", v_str("action rejected while another is in progress")),
        ]),
    );
}

pub fn log_recommendation(user_id: i64, side: Option<&str>, error: Option<&str>, elapsed_ms: f64) {
    let (level, event) = match side {
        Some(_) => (Level::Info, "recommendation"),
        None => (Level::Warn, "recommendation_failed"),
    };
    log(
        level,
        Domain::Advisor,
        event,
        obj(&[
            ("user_id", json!(user_id)),
            ("side", side.map(v_str).unwrap_or(Value::Null)),
            ("error", error.map(v_str).unwrap_or(Value::Null)),
            ("elapsed_ms", v_num(elapsed_ms)),
        ]),
    );
}

pub fn log_feedback(user_id: i64, recommendation: &str, feedback: &str, appended: Option<&str>) {
    log(
        Level::Info,
        Domain::Ledger,
        "feedback",
        obj(&[
            ("user_id", json!(user_id)),
            ("recommendation", v_str(recommendation)),
            ("feedback", v_str(feedback)),
            ("appended", appended.map(v_str).unwrap_or(Value::Null)),
        ]),
    );
}

pub fn log_render(user_id: i64, page: usize, total_pages: usize, highest_column: Option<usize>, elapsed_ms: f64) {
    log(
        Level::Debug,
        Domain::Road,
        "render",
        obj(&[
            ("user_id", json!(user_id)),
            ("page", json!(page)),
            ("total_pages", json!(total_pages)),
            ("highest_column", json!(highest_column)),
            ("elapsed_ms", v_num(elapsed_ms)),
        ]),
    );
}

/// Audit entry tying a render to the exact history it came from.
pub fn log_audit(user_id: i64, event_type: &str, history: &[Outcome], correct: usize) {
    log(
        Level::Info,
        Domain::Audit,
        event_type,
        obj(&[
            ("user_id", json!(user_id)),
            ("history_digest", v_str(&history_digest(history))),
            ("history_len", json!(history.len())),
            ("correct", json!(correct)),
        ]),
    );
}

// =============================================================================
// Field helpers
// =============================================================================

pub fn obj(pairs: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert((*k).to_string(), v.clone());
    }
    map
}

pub fn v_str(s: &str) -> Value {
    Value::String(s.to_string())
}

pub fn v_num(n: f64) -> Value {
    json!(n)
}
