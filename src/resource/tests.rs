//! Unit tests for resource reconciliation and teardown.

use std::io::Cursor;
use std::net::Ipv4Addr;
use std::time::Duration;

use rstest::rstest;
use tokio::net::TcpListener;

use super::*;
use crate::poll::PollPolicy;
use crate::provider::ResourceStatus;
use crate::remote::{RemoteExecutor, RemoteSettings};
use crate::test_support::{
    CountingProgress, ProviderCall, ProviderOperation, ScriptedProvider, ScriptedRunner,
    managed_resource,
};

const LOCALHOST: Ipv4Addr = Ipv4Addr::LOCALHOST;

fn fast_settings() -> PollSettings {
    let policy = PollPolicy::every(Duration::from_millis(2)).with_tick(Duration::from_millis(1));
    PollSettings {
        creation: policy,
        status: policy,
        reachability: policy,
        readiness: policy,
        connect_timeout: Duration::from_millis(200),
    }
}

async fn ssh_listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind((LOCALHOST, 0))
        .await
        .unwrap_or_else(|err| panic!("bind listener: {err}"));
    let port = listener
        .local_addr()
        .unwrap_or_else(|err| panic!("listener address: {err}"))
        .port();
    (listener, port)
}

fn executor(runner: &ScriptedRunner, port: u16) -> RemoteExecutor<ScriptedRunner> {
    RemoteExecutor::new(
        RemoteSettings {
            ssh_bin: "ssh".to_owned(),
            scp_bin: "scp".to_owned(),
            user: "root".to_owned(),
            identity_file: "/keys/id_rsa".to_owned(),
            port,
        },
        runner.clone(),
    )
}

fn is_create(call: &ProviderCall) -> bool {
    matches!(call, ProviderCall::CreateResource(_))
}

fn is_list(call: &ProviderCall) -> bool {
    matches!(call, ProviderCall::ListResources)
}

#[tokio::test]
async fn creates_absent_resource_exactly_once() {
    let (_listener, port) = ssh_listener().await;
    let provider = ScriptedProvider::new();
    provider.push_listing(Vec::new());
    provider.push_listing(Vec::new());
    provider.push_listing(vec![managed_resource(
        "created-resource",
        "burrow",
        ResourceStatus::Pending,
        None,
    )]);
    provider.push_listing(vec![managed_resource(
        "created-resource",
        "burrow",
        ResourceStatus::Active,
        Some(LOCALHOST),
    )]);
    let runner = ScriptedRunner::new();
    runner.push_output(Some(0), "locked\n...\n", "");
    runner.push_output(Some(0), "...\n", "");
    let executor = executor(&runner, port);

    let ready = ResourceReconciler::new(&provider, &executor, CountingProgress::new())
        .with_settings(fast_settings())
        .ensure("burrow", "key-1")
        .await
        .unwrap_or_else(|err| panic!("ensure should succeed: {err}"));

    assert_eq!(ready.address, LOCALHOST);
    assert_eq!(ready.resource.id, "created-resource");
    assert_eq!(provider.count(is_create), 1);
    let request = provider.calls().into_iter().find_map(|call| match call {
        ProviderCall::CreateResource(request) => Some(request),
        _ => None,
    });
    assert_eq!(
        request.map(|request| (request.name, request.credential_id, request.region)),
        Some(("burrow".to_owned(), "key-1".to_owned(), "ams3".to_owned()))
    );
    assert_eq!(runner.invocations().len(), 2);
    assert_eq!(
        runner.invocations().first().and_then(|call| call.last_arg()).as_deref(),
        Some(LOCK_CHECK_COMMAND)
    );
}

#[tokio::test]
async fn existing_resource_is_never_created() {
    let (_listener, port) = ssh_listener().await;
    let provider = ScriptedProvider::new();
    provider.push_listing(vec![managed_resource(
        "7",
        "burrow",
        ResourceStatus::Active,
        Some(LOCALHOST),
    )]);
    let runner = ScriptedRunner::new();
    runner.push_output(Some(0), "...\n", "");
    let executor = executor(&runner, port);

    let ready = ResourceReconciler::new(&provider, &executor, CountingProgress::new())
        .with_settings(fast_settings())
        .ensure("burrow", "key-1")
        .await
        .unwrap_or_else(|err| panic!("ensure should succeed: {err}"));

    assert_eq!(ready.resource.id, "7");
    assert_eq!(provider.count(is_create), 0);
}

#[tokio::test]
async fn active_on_third_status_query() {
    let (_listener, port) = ssh_listener().await;
    let provider = ScriptedProvider::new();
    let pending = managed_resource("7", "burrow", ResourceStatus::Pending, None);
    provider.push_listing(vec![pending.clone()]);
    provider.push_listing(vec![pending.clone()]);
    provider.push_listing(vec![pending]);
    provider.push_listing(vec![managed_resource(
        "7",
        "burrow",
        ResourceStatus::Active,
        Some(LOCALHOST),
    )]);
    let runner = ScriptedRunner::new();
    runner.push_output(Some(0), "...\n", "");
    let executor = executor(&runner, port);
    let progress = CountingProgress::new();

    ResourceReconciler::new(&provider, &executor, progress.clone())
        .with_settings(fast_settings())
        .ensure("burrow", "key-1")
        .await
        .unwrap_or_else(|err| panic!("ensure should succeed: {err}"));

    // One lookup by name, then three status queries.
    assert_eq!(provider.count(is_list), 4);
    let ticks = progress.ticks();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(progress.ticks(), ticks);
}

#[tokio::test]
async fn active_without_address_keeps_waiting() {
    let (_listener, port) = ssh_listener().await;
    let provider = ScriptedProvider::new();
    provider.push_listing(vec![managed_resource("7", "burrow", ResourceStatus::Active, None)]);
    provider.push_listing(vec![managed_resource("7", "burrow", ResourceStatus::Active, None)]);
    provider.push_listing(vec![managed_resource(
        "7",
        "burrow",
        ResourceStatus::Active,
        Some(LOCALHOST),
    )]);
    let runner = ScriptedRunner::new();
    runner.push_output(Some(0), "...\n", "");
    let executor = executor(&runner, port);

    let ready = ResourceReconciler::new(&provider, &executor, CountingProgress::new())
        .with_settings(fast_settings())
        .ensure("burrow", "key-1")
        .await
        .unwrap_or_else(|err| panic!("ensure should succeed: {err}"));

    assert_eq!(ready.address, LOCALHOST);
    assert_eq!(provider.count(is_list), 3);
}

#[tokio::test]
async fn status_wait_honours_timeout() {
    let provider = ScriptedProvider::new();
    provider.push_listing(vec![managed_resource("7", "burrow", ResourceStatus::Pending, None)]);
    let runner = ScriptedRunner::new();
    let executor = executor(&runner, 22);

    let err = ResourceReconciler::new(&provider, &executor, CountingProgress::new())
        .with_settings(fast_settings().with_timeout(Some(Duration::from_millis(15))))
        .ensure("burrow", "key-1")
        .await
        .err()
        .unwrap_or_else(|| panic!("pending resource should time out"));

    assert!(matches!(err, ReconcileError::Timeout(ref timeout) if timeout.action == "active status"));
    assert!(runner.invocations().is_empty());
}

#[tokio::test]
async fn creation_failure_is_propagated() {
    let provider = ScriptedProvider::new();
    provider.fail_on(
        ProviderOperation::CreateResource,
        ProviderError::Status {
            status: 422,
            body: "size unavailable".to_owned(),
        },
    );
    let runner = ScriptedRunner::new();
    let executor = executor(&runner, 22);

    let err = ResourceReconciler::new(&provider, &executor, CountingProgress::new())
        .with_settings(fast_settings())
        .ensure("burrow", "key-1")
        .await
        .err()
        .unwrap_or_else(|| panic!("creation failure should propagate"));

    assert!(err.to_string().contains("size unavailable"), "error: {err}");
}

#[tokio::test]
async fn failing_lock_check_surfaces_as_remote_error() {
    let (_listener, port) = ssh_listener().await;
    let provider = ScriptedProvider::new();
    provider.push_listing(vec![managed_resource(
        "7",
        "burrow",
        ResourceStatus::Active,
        Some(LOCALHOST),
    )]);
    let runner = ScriptedRunner::new();
    runner.push_failure(255, "Permission denied (publickey)");
    let executor = executor(&runner, port);

    let err = ResourceReconciler::new(&provider, &executor, CountingProgress::new())
        .with_settings(fast_settings())
        .ensure("burrow", "key-1")
        .await
        .err()
        .unwrap_or_else(|| panic!("ssh failure should abort readiness"));

    assert!(matches!(err, ReconcileError::Remote(_)), "error: {err:?}");
    assert!(err.to_string().contains("Permission denied"), "error: {err}");
    assert_eq!(runner.invocations().len(), 1);
    assert_eq!(provider.count(is_create), 0);
}

#[tokio::test]
async fn teardown_of_missing_resource_destroys_nothing() {
    let provider = ScriptedProvider::new();
    let mut input = Cursor::new(b"YES\n".to_vec());
    let mut output = Vec::new();

    let outcome = teardown(&provider, "burrow", &mut input, &mut output)
        .await
        .unwrap_or_else(|err| panic!("teardown should succeed: {err}"));

    assert_eq!(outcome, TeardownOutcome::NotFound);
    assert!(String::from_utf8_lossy(&output).contains("did not exist"));
    assert_eq!(
        provider.count(|call| matches!(call, ProviderCall::DestroyResource(_))),
        0
    );
}

#[rstest]
#[case("YES\n", true)]
#[case("  YES \r\n", true)]
#[case("yes\n", false)]
#[case("y\n", false)]
#[case("\n", false)]
#[case("", false)]
#[tokio::test]
async fn teardown_requires_exact_confirmation(#[case] answer: &str, #[case] destroyed: bool) {
    let provider = ScriptedProvider::new();
    provider.push_listing(vec![managed_resource(
        "7",
        "burrow",
        ResourceStatus::Active,
        Some(LOCALHOST),
    )]);
    let mut input = Cursor::new(answer.as_bytes().to_vec());
    let mut output = Vec::new();

    let outcome = teardown(&provider, "burrow", &mut input, &mut output)
        .await
        .unwrap_or_else(|err| panic!("teardown should succeed: {err}"));

    let destroys = provider.count(|call| matches!(call, ProviderCall::DestroyResource(_)));
    let printed = String::from_utf8_lossy(&output).into_owned();
    assert!(printed.contains("id=7 name=burrow"), "output: {printed}");
    assert!(printed.contains("Confirm with \"YES\": "), "output: {printed}");
    if destroyed {
        assert_eq!(outcome, TeardownOutcome::Destroyed { id: "7".to_owned() });
        assert_eq!(destroys, 1);
    } else {
        assert_eq!(outcome, TeardownOutcome::Aborted);
        assert_eq!(destroys, 0);
        assert!(printed.ends_with("Confirm with \"YES\": "), "output: {printed}");
        assert!(!printed.contains("Aborted"), "output: {printed}");
    }
}
