//! Append-only, buffered audit trail for security-relevant events.
//!
//! Recording never blocks and never fails the caller. Entries are buffered
//! and written as newline-delimited JSON either when the buffer reaches the
//! flush threshold or after an idle window that restarts on every entry.
//! A failed write puts the batch back at the front of the buffer.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use stencil_commons::sanitize_error_message;
use stencil_config::audit::AuditConfig;

use super::errors::BoundaryViolation;

/// Outcome recorded for one pass through the input gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Success,
    SuccessCached,
    Failure,
}

/// The four event categories of the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    Validation {
        context: String,
        status: ValidationStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(default)]
        fields: Vec<String>,
    },
    BoundaryViolation {
        operation: String,
        reason: String,
        original: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        resolved: Option<String>,
        root: String,
    },
    SandboxViolation {
        operation: String,
        detail: String,
    },
    SecurityEvent {
        event: String,
        #[serde(default)]
        details: Value,
    },
}

impl AuditEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::BoundaryViolation { .. } => "boundary_violation",
            Self::SandboxViolation { .. } => "sandbox_violation",
            Self::SecurityEvent { .. } => "security_event",
        }
    }
}

/// A single line of the audit file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: AuditEvent,
}

impl AuditEntry {
    pub fn new(event: AuditEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}

/// Where flushed entries end up.
#[derive(Debug)]
enum AuditSink {
    File(PathBuf),
    Memory(Mutex<Vec<AuditEntry>>),
    Disabled,
}

#[derive(Debug, Clone)]
pub struct AuditLoggerOptions {
    pub flush_threshold: usize,
    pub flush_interval: Duration,
    pub mirror_to_console: bool,
}

impl Default for AuditLoggerOptions {
    fn default() -> Self {
        let config = AuditConfig::default();
        Self {
            flush_threshold: config.flush_threshold,
            flush_interval: config.flush_interval(),
            mirror_to_console: config.mirror_to_console,
        }
    }
}

impl AuditLoggerOptions {
    pub fn from_config(config: &AuditConfig) -> Self {
        Self {
            flush_threshold: config.flush_threshold.max(1),
            flush_interval: config.flush_interval(),
            mirror_to_console: config.mirror_to_console,
        }
    }
}

#[derive(Debug)]
struct AuditInner {
    sink: AuditSink,
    options: AuditLoggerOptions,
    buffer: Mutex<VecDeque<AuditEntry>>,
    pending_flush: Mutex<Option<JoinHandle<()>>>,
    in_flight: Mutex<Vec<JoinHandle<()>>>,
    write_lock: tokio::sync::Mutex<()>,
    written: AtomicUsize,
}

/// Cloneable handle to the audit trail. Clones share one buffer.
#[derive(Debug, Clone)]
pub struct AuditLogger {
    inner: Arc<AuditInner>,
}

impl AuditLogger {
    fn with_sink(sink: AuditSink, options: AuditLoggerOptions) -> Self {
        Self {
            inner: Arc::new(AuditInner {
                sink,
                options,
                buffer: Mutex::new(VecDeque::new()),
                pending_flush: Mutex::new(None),
                in_flight: Mutex::new(Vec::new()),
                write_lock: tokio::sync::Mutex::new(()),
                written: AtomicUsize::new(0),
            }),
        }
    }

    /// Audit trail appending to `log_path`.
    pub fn to_file(log_path: impl Into<PathBuf>, options: AuditLoggerOptions) -> Self {
        Self::with_sink(AuditSink::File(log_path.into()), options)
    }

    /// Audit trail whose flushed entries are kept in memory.
    pub fn in_memory(options: AuditLoggerOptions) -> Self {
        Self::with_sink(AuditSink::Memory(Mutex::new(Vec::new())), options)
    }

    /// Audit trail that drops everything. Console mirroring still applies.
    pub fn disabled() -> Self {
        Self::with_sink(AuditSink::Disabled, AuditLoggerOptions::default())
    }

    pub fn from_config(config: &AuditConfig) -> Self {
        let options = AuditLoggerOptions::from_config(config);
        if config.enabled {
            Self::to_file(config.log_path(), options)
        } else {
            Self::with_sink(AuditSink::Disabled, options)
        }
    }

    pub fn log_path(&self) -> Option<&Path> {
        match &self.inner.sink {
            AuditSink::File(path) => Some(path),
            _ => None,
        }
    }

    pub fn log_validation(
        &self,
        context: &str,
        status: ValidationStatus,
        error: Option<&str>,
        fields: Vec<String>,
    ) {
        self.record(AuditEvent::Validation {
            context: context.to_string(),
            status,
            error: error.map(sanitize_error_message),
            fields,
        });
    }

    pub fn log_boundary_violation(&self, violation: &BoundaryViolation) {
        self.record(AuditEvent::BoundaryViolation {
            operation: violation.operation.clone(),
            reason: violation.reason.to_string(),
            original: violation.original.clone(),
            resolved: violation
                .resolved
                .as_ref()
                .map(|path| path.display().to_string()),
            root: violation.root.display().to_string(),
        });
    }

    pub fn log_sandbox_violation(&self, operation: &str, detail: &str) {
        self.record(AuditEvent::SandboxViolation {
            operation: operation.to_string(),
            detail: sanitize_error_message(detail),
        });
    }

    pub fn log_security_event(&self, event: &str, details: Value) {
        self.record(AuditEvent::SecurityEvent {
            event: event.to_string(),
            details,
        });
    }

    /// Buffer one event. Never blocks on I/O.
    pub fn record(&self, event: AuditEvent) {
        let entry = AuditEntry::new(event);
        if self.inner.options.mirror_to_console {
            info!(
                target: "stencil::audit",
                kind = entry.event.kind(),
                entry = %serde_json::to_string(&entry).unwrap_or_default(),
                "audit"
            );
        }
        if matches!(self.inner.sink, AuditSink::Disabled) {
            return;
        }

        let ready = {
            let mut buffer = self.inner.buffer.lock();
            buffer.push_back(entry);
            if buffer.len() >= self.inner.options.flush_threshold {
                Some(buffer.drain(..).collect::<Vec<_>>())
            } else {
                None
            }
        };

        match ready {
            Some(batch) => {
                drop(self.cancel_pending());
                spawn_write(&self.inner, batch);
            }
            None => self.schedule_flush(),
        }
    }

    /// Entries waiting to be written.
    pub fn buffered_len(&self) -> usize {
        self.inner.buffer.lock().len()
    }

    /// Entries successfully written since construction.
    pub fn written_count(&self) -> usize {
        self.inner.written.load(Ordering::SeqCst)
    }

    /// Entries written to the in-memory sink. Empty for other sinks.
    pub fn memory_entries(&self) -> Vec<AuditEntry> {
        match &self.inner.sink {
            AuditSink::Memory(entries) => entries.lock().clone(),
            _ => Vec::new(),
        }
    }

    /// Write everything currently buffered.
    pub async fn flush(&self) {
        let batch: Vec<AuditEntry> = self.inner.buffer.lock().drain(..).collect();
        if batch.is_empty() {
            return;
        }
        write_or_requeue(&self.inner, batch).await;
    }

    /// Cancel the idle timer, wait for in-flight writes, then flush.
    pub async fn close(&self) {
        if let Some(timer) = self.cancel_pending()
            && let Err(err) = timer.await
            && !err.is_cancelled()
        {
            warn!(error = %err, "Audit flush timer did not complete");
        }
        loop {
            let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.inner.in_flight.lock());
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                if let Err(err) = handle.await {
                    warn!(error = %err, "Audit write task did not complete");
                }
            }
        }
        self.flush().await;
    }

    /// Stop the idle timer. Only the sleep is abortable: once the timer
    /// fires it hands its batch to a write task of its own.
    fn cancel_pending(&self) -> Option<JoinHandle<()>> {
        let handle = self.inner.pending_flush.lock().take()?;
        handle.abort();
        Some(handle)
    }

    fn schedule_flush(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            // No runtime: entries stay buffered until an explicit flush.
            return;
        };
        let inner = Arc::clone(&self.inner);
        let delay = self.inner.options.flush_interval;
        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            // No await between draining and handing off the batch.
            let batch: Vec<AuditEntry> = inner.buffer.lock().drain(..).collect();
            if !batch.is_empty() {
                spawn_write(&inner, batch);
            }
        });
        if let Some(previous) = self.inner.pending_flush.lock().replace(handle) {
            previous.abort();
        }
    }
}

fn spawn_write(inner: &Arc<AuditInner>, batch: Vec<AuditEntry>) {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        requeue(inner, batch);
        return;
    };
    let task_inner = Arc::clone(inner);
    let handle = runtime.spawn(async move {
        write_or_requeue(&task_inner, batch).await;
    });
    let mut in_flight = inner.in_flight.lock();
    in_flight.retain(|task| !task.is_finished());
    in_flight.push(handle);
}

async fn write_or_requeue(inner: &AuditInner, batch: Vec<AuditEntry>) {
    let count = batch.len();
    match write_batch(inner, &batch).await {
        Ok(()) => {
            inner.written.fetch_add(count, Ordering::SeqCst);
            debug!(count, "Flushed audit entries");
        }
        Err(err) => {
            warn!(
                error = %sanitize_error_message(&err.to_string()),
                count,
                "Failed to write audit entries; re-buffering"
            );
            requeue(inner, batch);
        }
    }
}

fn requeue(inner: &AuditInner, batch: Vec<AuditEntry>) {
    let mut buffer = inner.buffer.lock();
    for entry in batch.into_iter().rev() {
        buffer.push_front(entry);
    }
}

async fn write_batch(inner: &AuditInner, batch: &[AuditEntry]) -> std::io::Result<()> {
    let _guard = inner.write_lock.lock().await;
    match &inner.sink {
        AuditSink::Disabled => Ok(()),
        AuditSink::Memory(entries) => {
            entries.lock().extend(batch.iter().cloned());
            Ok(())
        }
        AuditSink::File(path) => {
            let mut payload = String::new();
            for entry in batch {
                let line = serde_json::to_string(entry).map_err(std::io::Error::other)?;
                payload.push_str(&line);
                payload.push('\n');
            }
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                tokio::fs::create_dir_all(parent).await?;
            }
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await?;
            file.write_all(payload.as_bytes()).await?;
            file.flush().await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options(threshold: usize) -> AuditLoggerOptions {
        AuditLoggerOptions {
            flush_threshold: threshold,
            flush_interval: Duration::from_millis(50),
            mirror_to_console: false,
        }
    }

    #[tokio::test]
    async fn threshold_drains_buffer_immediately() {
        let audit = AuditLogger::in_memory(options(3));
        for i in 0..3 {
            audit.log_security_event("tick", json!({ "i": i }));
        }
        assert_eq!(audit.buffered_len(), 0);

        audit.close().await;
        assert_eq!(audit.written_count(), 3);
        assert_eq!(audit.memory_entries().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_window_flushes_buffer() {
        let audit = AuditLogger::in_memory(options(100));
        audit.log_sandbox_violation("write", "absolute path");
        assert_eq!(audit.buffered_len(), 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(audit.buffered_len(), 0);
        assert_eq!(audit.written_count(), 1);
    }

    #[tokio::test]
    async fn failed_write_requeues_entries() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the parent directory should be.
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();
        let audit = AuditLogger::to_file(blocker.join("audit.log"), options(100));

        audit.log_validation("new:alice", ValidationStatus::Failure, Some("bad"), vec![]);
        audit.log_validation("new:alice", ValidationStatus::Success, None, vec![]);
        audit.flush().await;

        assert_eq!(audit.buffered_len(), 2);
        assert_eq!(audit.written_count(), 0);
    }

    fn event_names(audit: &AuditLogger) -> Vec<String> {
        audit
            .memory_entries()
            .into_iter()
            .filter_map(|entry| match entry.event {
                AuditEvent::SecurityEvent { event, .. } => Some(event),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn rescheduling_keeps_batch_of_fired_timer() {
        let audit = AuditLogger::in_memory(options(100));
        let guard = audit.inner.write_lock.lock().await;

        audit.log_security_event("first", Value::Null);
        tokio::time::sleep(Duration::from_millis(100)).await;
        // Timer fired and its write is parked on the lock.
        assert_eq!(audit.buffered_len(), 0);

        audit.log_security_event("second", Value::Null);
        drop(guard);
        audit.close().await;

        assert_eq!(event_names(&audit), vec!["first", "second"]);
        assert_eq!(audit.buffered_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn threshold_batch_waits_behind_in_flight_write() {
        let audit = AuditLogger::in_memory(options(2));
        let guard = audit.inner.write_lock.lock().await;

        audit.log_security_event("a", Value::Null);
        tokio::time::sleep(Duration::from_millis(100)).await;
        audit.log_security_event("b", Value::Null);
        audit.log_security_event("c", Value::Null);
        assert_eq!(audit.buffered_len(), 0);

        drop(guard);
        audit.close().await;
        assert_eq!(event_names(&audit), vec!["a", "b", "c"]);
        assert_eq!(audit.written_count(), 3);
    }

    #[tokio::test]
    async fn requeued_entries_keep_their_place() {
        let dir = tempfile::tempdir().unwrap();
        let parent = dir.path().join("logs");
        std::fs::write(&parent, "x").unwrap();
        let path = parent.join("audit.log");
        let audit = AuditLogger::to_file(&path, options(100));

        audit.log_security_event("one", Value::Null);
        audit.log_security_event("two", Value::Null);
        audit.flush().await;
        assert_eq!(audit.buffered_len(), 2);

        audit.log_security_event("three", Value::Null);
        std::fs::remove_file(&parent).unwrap();
        audit.close().await;

        let names: Vec<String> = std::fs::read_to_string(&path)
            .unwrap()
            .lines()
            .map(|line| {
                let entry: AuditEntry = serde_json::from_str(line).unwrap();
                match entry.event {
                    AuditEvent::SecurityEvent { event, .. } => event,
                    other => panic!("unexpected {other:?}"),
                }
            })
            .collect();
        assert_eq!(names, vec!["one", "two", "three"]);
        assert_eq!(audit.buffered_len(), 0);
    }

    #[tokio::test]
    async fn file_sink_writes_ndjson() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("audit.log");
        let audit = AuditLogger::to_file(&path, options(100));

        audit.log_validation(
            "new:alice",
            ValidationStatus::Failure,
            Some("cannot read /home/alice/secret"),
            vec!["project_directory".into()],
        );
        audit.log_security_event("setup_started", json!({ "project": "demo" }));
        audit.close().await;

        let content = std::fs::read_to_string(&path).unwrap();
        let entries: Vec<AuditEntry> = content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].event.kind(), "validation");
        assert!(!content.contains("/home/alice"));
        assert!(content.contains("\"type\":\"security_event\""));
    }

    #[tokio::test]
    async fn disabled_logger_drops_entries() {
        let audit = AuditLogger::disabled();
        audit.log_sandbox_violation("read", "nope");
        assert_eq!(audit.buffered_len(), 0);
        audit.close().await;
        assert_eq!(audit.written_count(), 0);
    }
}
