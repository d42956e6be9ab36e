use assert_fs::TempDir;
use assert_fs::prelude::*;
use pretty_assertions::assert_eq;
use serde_json::json;
use stencil_config::SandboxConfig;
use stencil_core::security::{AuditEvent, AuditLogger, AuditLoggerOptions, TokioFilesystem};
use stencil_core::setup::{SETUP_COMPLETED_EVENT, SETUP_FAILED_EVENT};
use stencil_core::{
    ContextOptions, DeclarativeSetup, ExecutionContext, InputValue, SetupError, SetupRunner,
    ToolError, create_context,
};

const PLAN: &str = r#"
name = "node-starter"

[[steps]]
tool = "templates.copy_assets"
from = "files"
to = "."

[[steps]]
tool = "placeholders.replace_all"
target = "**/*.{md,json}"

[[steps]]
tool = "json.set"
file = "package.json"
key = "scripts.dev"
value = "vite"

[[steps]]
tool = "files.ensure_line"
file = ".gitignore"
line = "node_modules"

[[steps]]
tool = "templates.render_file"
src = "__scaffold__/LICENSE.tpl"
dest = "LICENSE"
data = { holder = "Ada", year = 2026 }

[[steps]]
tool = "log"
level = "info"
message = "scaffold ready"
"#;

fn context_for(dir: &TempDir) -> ExecutionContext {
    create_context(ContextOptions {
        project_name: "my-app".into(),
        project_directory: dir.path().to_path_buf(),
        inputs: [("author".to_string(), InputValue::from("Ada"))]
            .into_iter()
            .collect(),
        ..ContextOptions::default()
    })
    .unwrap()
}

fn security_events(audit: &AuditLogger) -> Vec<String> {
    audit
        .memory_entries()
        .into_iter()
        .filter_map(|entry| match entry.event {
            AuditEvent::SecurityEvent { event, .. } => Some(event),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn declarative_plan_scaffolds_project() {
    let dir = TempDir::new().unwrap();
    dir.child("__scaffold__/setup.toml").write_str(PLAN).unwrap();
    dir.child("__scaffold__/LICENSE.tpl")
        .write_str("Copyright {{ year }} {{ holder }}")
        .unwrap();
    dir.child("__scaffold__/files/README.md")
        .write_str("# {{PROJECT_NAME}}\nby {{AUTHOR}}\n")
        .unwrap();
    dir.child("__scaffold__/files/package.json")
        .write_str(r#"{ "name": "{{PROJECT_NAME}}" }"#)
        .unwrap();

    let plan = DeclarativeSetup::discover(
        &TokioFilesystem,
        &dir.path().join("__scaffold__"),
        "setup.toml",
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(plan.steps.len(), 6);

    let audit = AuditLogger::in_memory(AuditLoggerOptions::default());
    let runner = SetupRunner::new(audit.clone(), &SandboxConfig::default());
    runner.run(&context_for(&dir), &plan).await.unwrap();

    dir.child("README.md").assert("# my-app\nby Ada\n");
    dir.child(".gitignore").assert("node_modules\n");
    dir.child("LICENSE").assert("Copyright 2026 Ada");
    let package: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("package.json")).unwrap())
            .unwrap();
    assert_eq!(package, json!({ "name": "my-app", "scripts": { "dev": "vite" } }));

    // The assets area itself is never rewritten.
    dir.child("__scaffold__/files/README.md")
        .assert("# {{PROJECT_NAME}}\nby {{AUTHOR}}\n");

    audit.close().await;
    assert!(security_events(&audit).contains(&SETUP_COMPLETED_EVENT.to_string()));
}

#[tokio::test]
async fn json_plan_is_found_when_toml_is_absent() {
    let dir = TempDir::new().unwrap();
    dir.child("__scaffold__/setup.json")
        .write_str(r#"{ "name": "json-plan", "steps": [] }"#)
        .unwrap();
    let plan = DeclarativeSetup::discover(
        &TokioFilesystem,
        &dir.path().join("__scaffold__"),
        "setup.toml",
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(plan.name, "json-plan");

    let missing = DeclarativeSetup::discover(&TokioFilesystem, dir.path(), "setup.toml")
        .await
        .unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn escaping_step_aborts_the_plan() {
    let dir = TempDir::new().unwrap();
    let plan = DeclarativeSetup::from_json_str(
        &json!({
            "steps": [
                { "tool": "files.ensure_line", "file": "first.txt", "line": "1" },
                { "tool": "json.merge", "file": "../../outside.json", "value": { "a": 1 } },
                { "tool": "files.ensure_line", "file": "last.txt", "line": "3" }
            ]
        })
        .to_string(),
        "setup.json",
    )
    .unwrap();

    let audit = AuditLogger::in_memory(AuditLoggerOptions::default());
    let runner = SetupRunner::new(audit.clone(), &SandboxConfig::default());
    let err = runner.run(&context_for(&dir), &plan).await.unwrap_err();

    assert!(matches!(err, SetupError::Tool(ToolError::Boundary(_))));
    dir.child("first.txt").assert("1\n");
    assert!(!dir.path().join("last.txt").exists());

    audit.close().await;
    assert!(security_events(&audit).contains(&SETUP_FAILED_EVENT.to_string()));
}

#[tokio::test]
async fn non_string_path_in_plan_is_a_sandbox_error() {
    let dir = TempDir::new().unwrap();
    let plan = DeclarativeSetup::from_json_str(
        r#"{ "steps": [ { "tool": "files.ensure_line", "file": 7, "line": "x" } ] }"#,
        "setup.json",
    )
    .unwrap();
    let runner = SetupRunner::new(
        AuditLogger::in_memory(AuditLoggerOptions::default()),
        &SandboxConfig::default(),
    );
    let err = runner.run(&context_for(&dir), &plan).await.unwrap_err();
    assert!(matches!(err, SetupError::Tool(ToolError::Sandbox(_))));
}
