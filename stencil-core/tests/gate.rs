use pretty_assertions::assert_eq;
use serde_json::json;
use stencil_config::GateConfig;
use stencil_core::security::gate::POTENTIAL_ABUSE_EVENT;
use stencil_core::security::{
    AuditEvent, AuditLogger, AuditLoggerOptions, GateContext, GateError, InputGate,
    ValidationErrorKind, ValidationStatus,
};
use tempfile::TempDir;

fn gate(dir: &TempDir) -> (InputGate, AuditLogger) {
    let audit = AuditLogger::in_memory(AuditLoggerOptions {
        flush_threshold: 1_000,
        ..AuditLoggerOptions::default()
    });
    let gate = InputGate::new(&GateConfig::default(), audit.clone(), dir.path());
    (gate, audit)
}

fn statuses(audit: &AuditLogger) -> Vec<ValidationStatus> {
    audit
        .memory_entries()
        .into_iter()
        .filter_map(|entry| match entry.event {
            AuditEvent::Validation { status, .. } => Some(status),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn repeated_input_is_served_from_cache() {
    let dir = TempDir::new().unwrap();
    let (gate, audit) = gate(&dir);
    let context = GateContext::new("create").require(["project_name"]);
    let raw = json!({ "project_name": "my-app", "project_directory": "apps/my-app" });

    let first = gate.enforce(&raw, &context).unwrap();
    let entries = gate.cache_stats().entries;
    let second = gate.enforce(&raw, &context).unwrap();

    assert_eq!(first, second);
    assert_eq!(gate.cache_stats().entries, entries);
    assert_eq!(gate.cache_stats().hits, 1);
    assert_eq!(first.get_str("project_directory"), Some("apps/my-app"));

    audit.close().await;
    assert_eq!(
        statuses(&audit),
        vec![ValidationStatus::Success, ValidationStatus::SuccessCached]
    );
}

#[tokio::test]
async fn key_order_does_not_defeat_the_cache() {
    let dir = TempDir::new().unwrap();
    let (gate, _audit) = gate(&dir);
    let context = GateContext::new("create");
    gate.enforce(&json!({ "project_name": "a", "branch": "main" }), &context)
        .unwrap();
    gate.enforce(&json!({ "branch": "main", "project_name": "a" }), &context)
        .unwrap();
    assert_eq!(gate.cache_stats().entries, 1);
}

#[tokio::test]
async fn traversal_in_directory_is_rejected() {
    let dir = TempDir::new().unwrap();
    let (gate, audit) = gate(&dir);
    let err = gate
        .enforce(
            &json!({ "project_directory": "../../etc" }),
            &GateContext::new("create"),
        )
        .unwrap_err();
    assert!(err.has_kind(ValidationErrorKind::PathTraversal));
    assert_eq!(err.failures()[0].field, "project_directory");

    audit.close().await;
    assert_eq!(statuses(&audit), vec![ValidationStatus::Failure]);
}

#[tokio::test]
async fn all_failing_fields_are_reported_together() {
    let dir = TempDir::new().unwrap();
    let (gate, _audit) = gate(&dir);
    let err = gate
        .enforce(
            &json!({
                "project_name": "../bad",
                "branch": "feature..x",
                "repo": "http://127.0.0.1/repo.git",
            }),
            &GateContext::new("create"),
        )
        .unwrap_err();
    let mut fields: Vec<&str> = err
        .failures()
        .iter()
        .map(|failure| failure.field.as_str())
        .collect();
    fields.sort_unstable();
    assert_eq!(fields, vec!["branch", "project_name", "repo"]);
}

#[tokio::test]
async fn missing_required_fields_are_named() {
    let dir = TempDir::new().unwrap();
    let (gate, _audit) = gate(&dir);
    let err = gate
        .enforce(
            &json!({ "project_name": "  " }),
            &GateContext::new("create").require(["project_name", "template"]),
        )
        .unwrap_err();
    match err {
        GateError::MissingFields { fields, command } => {
            assert_eq!(command, "create");
            assert_eq!(fields, vec!["project_name", "template"]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn ten_failures_raise_exactly_one_abuse_event() {
    let dir = TempDir::new().unwrap();
    let (gate, audit) = gate(&dir);
    let context = GateContext::new("create").with_user("mallory");
    for attempt in 0..12 {
        let raw = json!({ "project_directory": format!("../escape-{attempt}") });
        assert!(gate.enforce(&raw, &context).is_err());
    }

    let snapshot = gate.abuse_snapshot("create", "mallory").unwrap();
    assert_eq!(snapshot.count, 12);
    assert_eq!(snapshot.recent_errors.len(), 5);

    audit.close().await;
    let alerts: Vec<_> = audit
        .memory_entries()
        .into_iter()
        .filter_map(|entry| match entry.event {
            AuditEvent::SecurityEvent { event, details } if event == POTENTIAL_ABUSE_EVENT => {
                Some(details)
            }
            _ => None,
        })
        .collect();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["context"], "create:mallory");
    assert_eq!(alerts[0]["failures"], 10);
}

#[tokio::test]
async fn success_resets_the_failure_streak() {
    let dir = TempDir::new().unwrap();
    let (gate, _audit) = gate(&dir);
    let context = GateContext::new("create");
    assert!(gate.enforce(&json!({ "branch": "feature..x" }), &context).is_err());
    assert!(gate.abuse_snapshot("create", "anonymous").is_some());
    gate.enforce(&json!({ "branch": "main" }), &context).unwrap();
    assert!(gate.abuse_snapshot("create", "anonymous").is_none());
}

#[tokio::test]
async fn unknown_fields_are_dropped() {
    let dir = TempDir::new().unwrap();
    let (gate, _audit) = gate(&dir);
    let validated = gate
        .enforce(
            &json!({ "project_name": "ok", "shell": "rm -rf /" }),
            &GateContext::new("create"),
        )
        .unwrap();
    assert!(validated.get("shell").is_none());
    assert_eq!(validated.len(), 1);
}
