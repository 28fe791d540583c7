//! Unit tests for remote execution.

use std::net::Ipv4Addr;

use camino::Utf8Path;
use rstest::{fixture, rstest};

use super::*;
use crate::test_support::ScriptedRunner;

const HOST: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);

#[fixture]
fn settings() -> RemoteSettings {
    RemoteSettings {
        ssh_bin: "ssh".to_owned(),
        scp_bin: "scp".to_owned(),
        user: "root".to_owned(),
        identity_file: "/keys/id_rsa".to_owned(),
        port: 22,
    }
}

#[rstest]
#[tokio::test]
async fn run_returns_stdout(settings: RemoteSettings) {
    let runner = ScriptedRunner::new();
    runner.push_output(Some(0), "ok\n", "");
    let executor = RemoteExecutor::new(settings, runner.clone());

    let output = executor
        .run(HOST, "uptime")
        .await
        .unwrap_or_else(|err| panic!("run should succeed: {err}"));

    assert_eq!(output, "ok\n");
    let invocations = runner.invocations();
    let call = invocations
        .first()
        .unwrap_or_else(|| panic!("ssh should have been invoked"));
    assert_eq!(call.program, "ssh");
    assert_eq!(
        call.command_string(),
        "ssh -p 22 -i /keys/id_rsa -o BatchMode=yes -o StrictHostKeyChecking=no \
         -o UserKnownHostsFile=/dev/null -o ConnectTimeout=10 -o LogLevel=ERROR \
         root@10.0.0.1 uptime"
    );
}

#[rstest]
#[tokio::test]
async fn failing_command_carries_stderr(settings: RemoteSettings) {
    let runner = ScriptedRunner::new();
    runner.push_failure(1, "boom\n");
    let executor = RemoteExecutor::new(settings, runner);

    let err = executor
        .run(HOST, "false")
        .await
        .err()
        .unwrap_or_else(|| panic!("non-zero exit should fail"));

    assert_eq!(err.stderr, "boom");
    assert_eq!(err.cause, "exited with status 1");
    assert!(err.to_string().contains("boom"), "error: {err}");
}

#[rstest]
#[tokio::test]
async fn spawn_failure_is_reported(settings: RemoteSettings) {
    let executor = RemoteExecutor::new(settings, ScriptedRunner::new());

    let err = executor
        .run(HOST, "true")
        .await
        .err()
        .unwrap_or_else(|| panic!("missing response should fail"));

    assert!(err.cause.contains("failed to spawn ssh"), "cause: {}", err.cause);
}

#[rstest]
#[tokio::test]
async fn call_writes_output(settings: RemoteSettings) {
    let runner = ScriptedRunner::new();
    runner.push_output(Some(0), "Reading package lists...\n", "");
    let executor = RemoteExecutor::new(settings, runner);
    let mut sink = Vec::new();

    executor
        .call(HOST, "apt-get update -qq", &mut sink)
        .await
        .unwrap_or_else(|err| panic!("call should succeed: {err}"));

    assert_eq!(String::from_utf8_lossy(&sink), "Reading package lists...\n");
}

#[rstest]
#[tokio::test]
async fn upload_copies_then_restricts_mode(settings: RemoteSettings) {
    let runner = ScriptedRunner::new();
    runner.push_success();
    runner.push_success();
    let executor = RemoteExecutor::new(settings, runner.clone());

    executor
        .upload(HOST, Utf8Path::new("/tmp/self-destruct.sh"), "self-destruct.sh")
        .await
        .unwrap_or_else(|err| panic!("upload should succeed: {err}"));

    let invocations = runner.invocations();
    assert_eq!(invocations.len(), 2);
    let copy = invocations
        .first()
        .unwrap_or_else(|| panic!("scp should run first"));
    assert_eq!(copy.program, "scp");
    assert!(copy.command_string().starts_with("scp -P 22 -i /keys/id_rsa"));
    assert_eq!(
        copy.last_arg().as_deref(),
        Some("root@10.0.0.1:self-destruct.sh")
    );
    assert_eq!(
        invocations.get(1).and_then(|call| call.last_arg()).as_deref(),
        Some("chmod 0750 self-destruct.sh")
    );
}

#[rstest]
#[tokio::test]
async fn failed_copy_skips_chmod(settings: RemoteSettings) {
    let runner = ScriptedRunner::new();
    runner.push_failure(1, "No such file");
    let executor = RemoteExecutor::new(settings, runner.clone());

    let result = executor
        .upload(HOST, Utf8Path::new("/missing.sh"), "missing.sh")
        .await;

    assert!(result.is_err());
    assert_eq!(runner.invocations().len(), 1);
}

#[rstest]
#[tokio::test]
async fn blank_identity_file_is_omitted(mut settings: RemoteSettings) {
    settings.identity_file = String::new();
    let runner = ScriptedRunner::new();
    runner.push_success();
    let executor = RemoteExecutor::new(settings, runner.clone());

    executor
        .run(HOST, "true")
        .await
        .unwrap_or_else(|err| panic!("run should succeed: {err}"));

    let command = runner
        .invocations()
        .first()
        .map(|call| call.command_string())
        .unwrap_or_default();
    assert!(!command.contains(" -i "), "command: {command}");
}
