//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::env;
use std::ffi::OsString;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard as StdMutexGuard, PoisonError};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;

use crate::poll::Progress;
use crate::provider::{
    Credential, ManagedResource, PauseFuture, Provider, ProviderError, ProviderFuture,
    ResourceDefaults, ResourceRequest, ResourceStatus,
};
use crate::remote::{CommandOutput, CommandRunner, SpawnError};

/// Builds a resource record for scripted listings.
#[must_use]
pub fn managed_resource(
    id: &str,
    name: &str,
    status: ResourceStatus,
    address: Option<Ipv4Addr>,
) -> ManagedResource {
    ManagedResource {
        id: id.to_owned(),
        name: name.to_owned(),
        operating_system: "ubuntu-22-04-x64".to_owned(),
        address,
        region: "ams3".to_owned(),
        status,
    }
}

/// Provider operations that can be scripted to fail.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ProviderOperation {
    /// [`Provider::list_credentials`].
    ListCredentials,
    /// [`Provider::create_credential`].
    CreateCredential,
    /// [`Provider::replace_credential`].
    ReplaceCredential,
    /// [`Provider::list_resources`].
    ListResources,
    /// [`Provider::create_resource`].
    CreateResource,
    /// [`Provider::destroy_resource`].
    DestroyResource,
}

/// Records a single call made through [`ScriptedProvider`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ProviderCall {
    /// Key listing.
    ListCredentials,
    /// Key creation.
    CreateCredential {
        /// Key name.
        name: String,
        /// Key material.
        public_key: String,
    },
    /// Key replacement.
    ReplaceCredential {
        /// Replaced key identifier.
        id: String,
        /// Key name.
        name: String,
        /// Key material.
        public_key: String,
    },
    /// Resource listing.
    ListResources,
    /// Resource creation.
    CreateResource(ResourceRequest),
    /// Resource destruction.
    DestroyResource(String),
}

#[derive(Debug, Default)]
struct ProviderState {
    credentials: Vec<Credential>,
    listings: VecDeque<Vec<ManagedResource>>,
    last_listing: Vec<ManagedResource>,
    failures: HashMap<ProviderOperation, ProviderError>,
    calls: Vec<ProviderCall>,
}

/// In-memory provider that replays scripted listings and records calls.
///
/// Resource listings are served in FIFO order; once the queue is empty the
/// last listing keeps being returned. Created keys get the identifier
/// `created-key`, replaced keys keep theirs, and created resources get
/// `created-resource`.
#[derive(Clone, Debug)]
pub struct ScriptedProvider {
    state: Arc<StdMutex<ProviderState>>,
    defaults: ResourceDefaults,
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedProvider {
    /// Creates a provider with no keys and an empty resource listing.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::default(),
            defaults: ResourceDefaults {
                image: "ubuntu-22-04-x64".to_owned(),
                size: "s-1vcpu-1gb".to_owned(),
                region: "ams3".to_owned(),
            },
        }
    }

    fn state(&self) -> StdMutexGuard<'_, ProviderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets the keys returned by every key listing.
    pub fn set_credentials(&self, credentials: Vec<Credential>) {
        self.state().credentials = credentials;
    }

    /// Queues a resource listing.
    pub fn push_listing(&self, resources: Vec<ManagedResource>) {
        self.state().listings.push_back(resources);
    }

    /// Makes every call to `operation` fail with `error`.
    pub fn fail_on(&self, operation: ProviderOperation, error: ProviderError) {
        self.state().failures.insert(operation, error);
    }

    /// Returns a snapshot of all calls recorded so far.
    #[must_use]
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.state().calls.clone()
    }

    /// Counts recorded calls matching `predicate`.
    #[must_use]
    pub fn count(&self, predicate: impl Fn(&ProviderCall) -> bool) -> usize {
        self.state().calls.iter().filter(|call| predicate(call)).count()
    }

    fn record(&self, operation: ProviderOperation, call: ProviderCall) -> Result<(), ProviderError> {
        let mut state = self.state();
        state.calls.push(call);
        state.failures.get(&operation).cloned().map_or(Ok(()), Err)
    }

    fn next_listing(&self) -> Vec<ManagedResource> {
        let mut state = self.state();
        if let Some(listing) = state.listings.pop_front() {
            state.last_listing = listing;
        }
        state.last_listing.clone()
    }
}

impl Provider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn defaults(&self) -> &ResourceDefaults {
        &self.defaults
    }

    fn list_credentials(&self) -> ProviderFuture<'_, Vec<Credential>> {
        Box::pin(async move {
            self.record(ProviderOperation::ListCredentials, ProviderCall::ListCredentials)?;
            Ok(self.state().credentials.clone())
        })
    }

    fn create_credential<'a>(
        &'a self,
        name: &'a str,
        public_key: &'a str,
    ) -> ProviderFuture<'a, String> {
        Box::pin(async move {
            self.record(
                ProviderOperation::CreateCredential,
                ProviderCall::CreateCredential {
                    name: name.to_owned(),
                    public_key: public_key.to_owned(),
                },
            )?;
            Ok(String::from("created-key"))
        })
    }

    fn replace_credential<'a>(
        &'a self,
        id: &'a str,
        name: &'a str,
        public_key: &'a str,
    ) -> ProviderFuture<'a, String> {
        Box::pin(async move {
            self.record(
                ProviderOperation::ReplaceCredential,
                ProviderCall::ReplaceCredential {
                    id: id.to_owned(),
                    name: name.to_owned(),
                    public_key: public_key.to_owned(),
                },
            )?;
            Ok(id.to_owned())
        })
    }

    fn list_resources(&self) -> ProviderFuture<'_, Vec<ManagedResource>> {
        Box::pin(async move {
            self.record(ProviderOperation::ListResources, ProviderCall::ListResources)?;
            Ok(self.next_listing())
        })
    }

    fn create_resource<'a>(&'a self, request: &'a ResourceRequest) -> ProviderFuture<'a, String> {
        Box::pin(async move {
            self.record(
                ProviderOperation::CreateResource,
                ProviderCall::CreateResource(request.clone()),
            )?;
            Ok(String::from("created-resource"))
        })
    }

    fn destroy_resource<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            self.record(
                ProviderOperation::DestroyResource,
                ProviderCall::DestroyResource(id.to_owned()),
            )
        })
    }

    fn throttle_delay(&self) -> PauseFuture<'_> {
        Box::pin(async {})
    }
}

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Arc<StdMutex<VecDeque<CommandOutput>>>,
    invocations: Arc<StdMutex<Vec<CommandInvocation>>>,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }

    /// Returns the last argument, which is the remote command for `ssh`.
    #[must_use]
    pub fn last_arg(&self) -> Option<String> {
        self.args
            .last()
            .map(|arg| arg.to_string_lossy().into_owned())
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Pushes a successful exit status with empty output.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Pushes a failing exit code with stderr text.
    pub fn push_failure(&self, code: i32, stderr: impl Into<String>) {
        self.push_output(Some(code), "", stderr);
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(CommandOutput {
                code,
                stdout: stdout.into(),
                stderr: stderr.into(),
            });
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, SpawnError> {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(CommandInvocation {
                program: program.to_owned(),
                args: args.to_vec(),
            });
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .ok_or_else(|| SpawnError {
                program: program.to_owned(),
                message: String::from("no scripted response available"),
            })
    }
}

/// Progress sink that counts ticks and finishes.
#[derive(Clone, Debug, Default)]
pub struct CountingProgress {
    ticks: Arc<AtomicUsize>,
    finishes: Arc<AtomicUsize>,
}

impl CountingProgress {
    /// Creates a counter at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ticks observed so far.
    #[must_use]
    pub fn ticks(&self) -> usize {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Finished waits observed so far.
    #[must_use]
    pub fn finishes(&self) -> usize {
        self.finishes.load(Ordering::SeqCst)
    }
}

impl Progress for CountingProgress {
    fn tick(&self) {
        self.ticks.fetch_add(1, Ordering::SeqCst);
    }

    fn finish(&self) {
        self.finishes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Canned HTTP response served by [`serve_http`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CannedResponse {
    /// Status code.
    pub status: u16,
    /// Response body.
    pub body: String,
}

impl CannedResponse {
    /// Creates a response.
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Serves `responses` to sequential connections on a local port, one per
/// connection, and returns the base URL plus a handle yielding the raw
/// requests received.
///
/// # Panics
///
/// Panics when the listener cannot bind to a local port.
pub async fn serve_http(responses: Vec<CannedResponse>) -> (String, JoinHandle<Vec<String>>) {
    serve_http_with(|_| responses).await
}

/// Like [`serve_http`], but builds the responses from the server's base URL
/// so bodies can carry absolute links back to it.
///
/// # Panics
///
/// Panics when the listener cannot bind to a local port.
pub async fn serve_http_with<F>(build: F) -> (String, JoinHandle<Vec<String>>)
where
    F: FnOnce(&str) -> Vec<CannedResponse>,
{
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap_or_else(|err| panic!("bind test listener: {err}"));
    let address = listener
        .local_addr()
        .unwrap_or_else(|err| panic!("listener address: {err}"));
    let base_url = format!("http://{address}");
    let responses = build(&base_url);
    let handle = tokio::spawn(async move {
        let mut requests = Vec::with_capacity(responses.len());
        for response in responses {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            requests.push(read_request(&mut stream).await);
            let reply = format!(
                "HTTP/1.1 {} Canned\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                response.status,
                response.body.len(),
                response.body
            );
            stream.write_all(reply.as_bytes()).await.ok();
            stream.shutdown().await.ok();
        }
        requests
    });
    (base_url, handle)
}

async fn read_request(stream: &mut tokio::net::TcpStream) -> String {
    let mut received = Vec::new();
    let mut chunk = [0_u8; 4096];
    loop {
        let Ok(count) = stream.read(&mut chunk).await else {
            break;
        };
        if count == 0 {
            break;
        }
        received.extend(chunk.iter().take(count));
        let text = String::from_utf8_lossy(&received);
        if let Some((head, body)) = text.split_once("\r\n\r\n") {
            let expected = content_length(head);
            if body.len() >= expected {
                break;
            }
        }
    }
    String::from_utf8_lossy(&received).into_owned()
}

fn content_length(head: &str) -> usize {
    head.lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: Mutex<()> = Mutex::const_new(());

/// Guard that holds the env mutex and cleans up variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }

    /// Removes environment variables while holding the same global mutex.
    pub async fn clear_vars(keys: &[&str]) -> Self {
        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(keys.len());
        for key in keys {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::remove_var(key) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
