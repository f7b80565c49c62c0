//! End-to-end session invocations replayed from recorded fixtures
//!
//! No agent process is spawned. The recorded runtime replays the agent's output
//! and routes its permission prompts through the same broker and file channel
//! a real call would use.

mod common;

use claude_bridge::{history, Decision, InvocationState, SendRequest};
use common::{fixture, run, spawn_approver, Workspace};
use std::path::Path;

const LIST_FILES_SESSION: &str = "6f1c2b7e-3d4a-4c5b-9e8f-0a1b2c3d4e5f";

#[tokio::test]
async fn test_new_session_id_captured_and_forwarded() {
    let workspace = Workspace::new();
    let runtime = fixture("list_files.json");
    let invoker = workspace.invoker(runtime.clone());
    let cwd = workspace.project.path().to_string_lossy().into_owned();

    let (outcome, lines) = run(
        &invoker,
        SendRequest::new("list files").with_cwd(Some(cwd.clone())),
    )
    .await;

    assert!(outcome.is_success());
    assert_eq!(outcome.session_id.as_deref(), Some(LIST_FILES_SESSION));
    assert_eq!(lines.first().map(String::as_str), Some("[MESSAGE_START]"));
    assert_eq!(
        lines
            .iter()
            .filter(|l| l.starts_with("[SESSION_ID]"))
            .collect::<Vec<_>>(),
        vec![&format!("[SESSION_ID] {}", LIST_FILES_SESSION)]
    );
    assert!(!lines.iter().any(|l| l.starts_with("[RESUMING]")));
    assert!(lines.contains(&"[CONTENT] I'll list the files in the project.".to_string()));
    assert!(lines.contains(&"[SLASH_COMMANDS] [\"/clear\",\"/compact\",\"/review\"]".to_string()));
    assert_eq!(
        lines.last().unwrap(),
        &format!(r#"{{"success":true,"sessionId":"{}"}}"#, LIST_FILES_SESSION)
    );
    assert_eq!(lines[lines.len() - 2], "[MESSAGE_END]");

    let request = &runtime.requests().await[0];
    assert_eq!(request.cwd, workspace.project.path());
    assert_eq!(request.model, "sonnet");
    assert_eq!(request.max_turns, 100);
    assert_eq!(request.additional_directories, vec![workspace.project.path().to_path_buf()]);
    assert!(request.resume.is_none());
    assert!(request.credentials.is_some());

    // Glob is auto-allowed, so nothing touched the permission directory
    let decisions = runtime.decisions().await;
    assert!(decisions[0].decision.as_ref().is_some_and(Decision::is_allow));
    assert!(workspace.permission_files().is_empty());
}

#[tokio::test]
async fn test_raw_events_forwarded_verbatim() {
    let workspace = Workspace::new();
    let invoker = workspace.invoker(fixture("list_files.json"));

    let (_, lines) = run(&invoker, SendRequest::new("list files")).await;

    let messages: Vec<&str> = lines
        .iter()
        .filter_map(|l| l.strip_prefix("[MESSAGE] "))
        .collect();
    assert_eq!(messages.len(), 5);
    assert!(messages[0].starts_with(r#"{"type":"system","subtype":"init","session_id":"#));
    assert!(messages[4].starts_with(r#"{"type":"result","subtype":"success""#));
}

#[tokio::test]
async fn test_dangerous_bash_denied_without_round_trip() {
    let workspace = Workspace::new();
    let runtime = fixture("dangerous_bash.json");
    let invoker = workspace.invoker(runtime.clone());

    let (outcome, lines) = run(&invoker, SendRequest::new("show me the password file")).await;

    assert!(outcome.is_success());
    let decisions = runtime.decisions().await;
    assert_eq!(decisions.len(), 1);
    assert_eq!(
        decisions[0].decision,
        Some(Decision::deny("Access to dangerous path denied: /etc/passwd"))
    );
    assert!(workspace.permission_files().is_empty());
    assert!(lines.iter().any(|l| l.starts_with("[TOOL_USE] ")));
    assert!(lines.iter().any(|l| l.starts_with("[TOOL_RESULT] ")));
}

#[tokio::test]
async fn test_sandbox_write_is_rewritten_and_approved() {
    let workspace = Workspace::new();
    let runtime = fixture("edit_in_sandbox.json");
    let invoker = workspace.invoker(runtime.clone());
    let approver = spawn_approver(workspace.channel(), true, 1);

    let (outcome, _) = run(&invoker, SendRequest::new("write the answer")).await;
    let answered = approver.await.unwrap();

    assert!(outcome.is_success());
    let expected = workspace.project.path().join("src/lib.rs");
    assert_eq!(
        answered[0].inputs["file_path"],
        &*expected.to_string_lossy()
    );
    match &runtime.decisions().await[0].decision {
        Some(Decision::Allow { updated_input }) => {
            assert_eq!(updated_input["file_path"], &*expected.to_string_lossy());
        }
        other => panic!("Expected allow, got {:?}", other),
    }
    assert!(workspace.permission_files().is_empty());
}

#[tokio::test]
async fn test_non_default_mode_runs_unmediated() {
    let workspace = Workspace::new();
    let runtime = fixture("edit_in_sandbox.json");
    let invoker = workspace.invoker(runtime.clone());

    let request = SendRequest::new("write the answer")
        .with_permission_mode(Some("acceptEdits".to_string()));
    let (outcome, _) = run(&invoker, request).await;

    assert!(outcome.is_success());
    assert_eq!(runtime.decisions().await[0].decision, None);
    assert_eq!(runtime.requests().await[0].permission_mode, "acceptEdits");
}

#[tokio::test]
async fn test_missing_session_history() {
    let projects = tempfile::tempdir().unwrap();
    let err = history::read_session(projects.path(), Path::new("/home/user/proj"), "abc123")
        .await
        .unwrap_err();

    assert_eq!(
        claude_bridge::protocol::failure_line(&err.to_string()),
        r#"{"success":false,"error":"Session file not found"}"#
    );
}

#[tokio::test]
async fn test_blank_message_reports_failure() {
    let workspace = Workspace::new();
    let invoker = workspace.invoker(fixture("list_files.json"));

    let (outcome, lines) = run(&invoker, SendRequest::new("   ")).await;
    assert_eq!(outcome.state, InvocationState::Failed);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with(r#"{"success":false"#));
}
