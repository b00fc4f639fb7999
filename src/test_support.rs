//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};

use crate::aws::{CommandError, CommandFuture, CommandOutput, CommandRunner};
use crate::cloud::{ClientFactory, CloudError, CloudFuture, CopyImageRequest, ImageClient};
use crate::image::{Image, ImageState};
use crate::progress::ProgressSink;

/// Account name used for clients returned by [`ClientFactory::source_client`].
pub const SOURCE_ACCOUNT: &str = "self";

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Arc<Mutex<VecDeque<CommandOutput>>>,
    invocations: Arc<Mutex<Vec<CommandInvocation>>>,
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

    /// Returns the value following `flag`, if present.
    #[must_use]
    pub fn flag_value(&self, flag: &str) -> Option<String> {
        self.args
            .iter()
            .skip_while(|arg| arg.to_string_lossy() != flag)
            .nth(1)
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
        locked(&self.invocations).clone()
    }

    /// Pushes a successful exit status with the given stdout.
    pub fn push_stdout(&self, stdout: impl Into<String>) {
        self.push_output(Some(0), stdout, "");
    }

    /// Pushes a successful exit status with empty output.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Pushes an AWS CLI service error with exit code 254.
    pub fn push_service_error(&self, code: &str, operation: &str, message: &str) {
        self.push_output(
            Some(254),
            "",
            format!("\nAn error occurred ({code}) when calling the {operation} operation: {message}\n"),
        );
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        locked(&self.responses).push_back(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
    }
}

impl CommandRunner for ScriptedRunner {
    fn run<'a>(&'a self, program: &'a str, args: &'a [OsString]) -> CommandFuture<'a> {
        locked(&self.invocations).push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
        });
        let response = locked(&self.responses)
            .pop_front()
            .ok_or_else(|| CommandError::Spawn {
                program: program.to_owned(),
                message: String::from("no scripted response available"),
            });
        Box::pin(async move { response })
    }
}

/// Progress sink that records every message for later assertions.
#[derive(Clone, Debug, Default)]
pub struct RecordingProgress {
    messages: Arc<Mutex<Vec<String>>>,
    panic_on: Arc<Mutex<Option<String>>>,
}

impl RecordingProgress {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of the recorded messages in emission order.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        locked(&self.messages).clone()
    }

    /// Makes every later message containing `needle` panic instead of
    /// being recorded.
    pub fn panic_on(&self, needle: &str) {
        *locked(&self.panic_on) = Some(needle.to_owned());
    }

    /// Returns `true` when any recorded message contains `needle`.
    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        locked(&self.messages)
            .iter()
            .any(|message| message.contains(needle))
    }
}

impl ProgressSink for RecordingProgress {
    fn say(&self, message: &str) {
        let trips = locked(&self.panic_on)
            .as_deref()
            .is_some_and(|needle| message.contains(needle));
        assert!(!trips, "scripted progress panic on {message:?}");
        locked(&self.messages).push(message.to_owned());
    }
}

/// Identifier given by [`ScriptedCloud`] to the copy of `source_image_id`
/// made in `account`.
#[must_use]
pub fn copied_image_id(account: &str, source_image_id: &str) -> String {
    format!("{source_image_id}-copy-{account}")
}

#[derive(Debug)]
struct CloudState {
    images: Vec<(String, Image)>,
    describe_failures: BTreeMap<String, CloudError>,
    state_scripts: BTreeMap<String, VecDeque<ImageState>>,
    copied_state: ImageState,
    copy_failures: BTreeMap<String, CloudError>,
    copy_panics: BTreeSet<String>,
    client_failures: BTreeSet<String>,
    client_panics: BTreeSet<String>,
    tag_script: VecDeque<Result<(), CloudError>>,
    copy_delay: Duration,
    copy_requests: Vec<(String, CopyImageRequest)>,
    tagged: Vec<(String, BTreeMap<String, String>)>,
    tag_calls: usize,
    describe_calls: BTreeMap<String, usize>,
    in_flight: usize,
    max_in_flight: usize,
}

impl Default for CloudState {
    fn default() -> Self {
        Self {
            images: Vec::new(),
            describe_failures: BTreeMap::new(),
            state_scripts: BTreeMap::new(),
            copied_state: ImageState::Available,
            copy_failures: BTreeMap::new(),
            copy_panics: BTreeSet::new(),
            client_failures: BTreeSet::new(),
            client_panics: BTreeSet::new(),
            tag_script: VecDeque::new(),
            copy_delay: Duration::ZERO,
            copy_requests: Vec::new(),
            tagged: Vec::new(),
            tag_calls: 0,
            describe_calls: BTreeMap::new(),
            in_flight: 0,
            max_in_flight: 0,
        }
    }
}

/// In-memory cloud implementing [`ClientFactory`] with scriptable failures.
///
/// Clones share state, so a test can keep one handle for assertions while
/// the replicator owns another.
#[derive(Clone, Debug, Default)]
pub struct ScriptedCloud {
    state: Arc<Mutex<CloudState>>,
}

impl ScriptedCloud {
    /// Creates an empty cloud.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a client acting in `account` within `region`.
    #[must_use]
    pub fn client(&self, account: &str, region: &str) -> ScriptedClient {
        ScriptedClient {
            account: account.to_owned(),
            region: region.to_owned(),
            cloud: self.clone(),
        }
    }

    /// Registers an image visible in `region`.
    pub fn add_image(&self, region: &str, image: Image) {
        locked(&self.state).images.push((region.to_owned(), image));
    }

    /// Makes every describe call for `image_id` fail with `err`.
    pub fn fail_describe(&self, image_id: &str, err: CloudError) {
        locked(&self.state)
            .describe_failures
            .insert(image_id.to_owned(), err);
    }

    /// Scripts the states reported for `image_id` on successive describe
    /// calls. The final state repeats once the script runs out.
    pub fn script_states(&self, image_id: &str, states: Vec<ImageState>) {
        locked(&self.state)
            .state_scripts
            .insert(image_id.to_owned(), states.into());
    }

    /// Sets the state newly copied images start in.
    pub fn copied_state(&self, state: ImageState) {
        locked(&self.state).copied_state = state;
    }

    /// Makes copies into `account` fail with `err`.
    pub fn fail_copy_for(&self, account: &str, err: CloudError) {
        locked(&self.state)
            .copy_failures
            .insert(account.to_owned(), err);
    }

    /// Makes copies into `account` panic.
    pub fn panic_copy_for(&self, account: &str) {
        locked(&self.state).copy_panics.insert(account.to_owned());
    }

    /// Makes client construction for `account` fail.
    pub fn fail_client_for(&self, account: &str) {
        locked(&self.state)
            .client_failures
            .insert(account.to_owned());
    }

    /// Makes client construction for `account` panic.
    pub fn panic_client_for(&self, account: &str) {
        locked(&self.state).client_panics.insert(account.to_owned());
    }

    /// Queues results for successive tag calls; calls succeed once the queue
    /// is empty.
    pub fn script_tags(&self, results: Vec<Result<(), CloudError>>) {
        locked(&self.state).tag_script.extend(results);
    }

    /// Delays every copy call, so concurrent copies overlap.
    pub fn with_copy_delay(&self, delay: Duration) {
        locked(&self.state).copy_delay = delay;
    }

    /// Number of copy submissions received.
    #[must_use]
    pub fn copy_calls(&self) -> usize {
        locked(&self.state).copy_requests.len()
    }

    /// Copy submissions received, paired with the target account.
    #[must_use]
    pub fn copy_requests(&self) -> Vec<(String, CopyImageRequest)> {
        locked(&self.state).copy_requests.clone()
    }

    /// Number of tag calls received, including failed ones.
    #[must_use]
    pub fn tag_calls(&self) -> usize {
        locked(&self.state).tag_calls
    }

    /// Tags successfully applied, keyed by image identifier.
    #[must_use]
    pub fn tagged(&self) -> Vec<(String, BTreeMap<String, String>)> {
        locked(&self.state).tagged.clone()
    }

    /// Number of describe calls received for `image_id`.
    #[must_use]
    pub fn describe_calls(&self, image_id: &str) -> usize {
        locked(&self.state)
            .describe_calls
            .get(image_id)
            .copied()
            .unwrap_or_default()
    }

    /// Highest number of copies observed in flight at once.
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        locked(&self.state).max_in_flight
    }

    fn begin_copy(&self, account: &str, region: &str, request: &CopyImageRequest) -> CopyStart {
        let mut state = locked(&self.state);
        state
            .copy_requests
            .push((account.to_owned(), request.clone()));
        if state.copy_panics.contains(account) {
            return CopyStart::Panic;
        }
        if let Some(err) = state.copy_failures.get(account) {
            return CopyStart::Fail(err.clone());
        }
        state.in_flight += 1;
        state.max_in_flight = state.max_in_flight.max(state.in_flight);
        let id = copied_image_id(account, &request.source_image_id);
        let mut image = Image::new(id.clone(), state.copied_state.clone());
        image.name.clone_from(&request.name);
        image.description.clone_from(&request.description);
        state.images.push((region.to_owned(), image));
        CopyStart::Started {
            id,
            delay: state.copy_delay,
        }
    }

    fn end_copy(&self) {
        let mut state = locked(&self.state);
        state.in_flight = state.in_flight.saturating_sub(1);
    }

    fn tag(&self, image_id: &str, tags: &BTreeMap<String, String>) -> Result<(), CloudError> {
        let mut state = locked(&self.state);
        state.tag_calls += 1;
        let result = state.tag_script.pop_front().unwrap_or(Ok(()));
        if result.is_ok() {
            state.tagged.push((image_id.to_owned(), tags.clone()));
        }
        result
    }

    fn describe(&self, region: &str, image_id: &str) -> Result<Vec<Image>, CloudError> {
        let mut state = locked(&self.state);
        *state
            .describe_calls
            .entry(image_id.to_owned())
            .or_default() += 1;
        if let Some(err) = state.describe_failures.get(image_id) {
            return Err(err.clone());
        }
        let scripted = state.state_scripts.get_mut(image_id).and_then(|script| {
            if script.len() > 1 {
                script.pop_front()
            } else {
                script.front().cloned()
            }
        });
        Ok(state
            .images
            .iter()
            .filter(|(image_region, image)| image_region == region && image.id == image_id)
            .map(|(_, image)| {
                let mut found = image.clone();
                if let Some(next) = &scripted {
                    found.state = next.clone();
                }
                found
            })
            .collect())
    }
}

enum CopyStart {
    Started { id: String, delay: Duration },
    Fail(CloudError),
    Panic,
}

impl ClientFactory for ScriptedCloud {
    type Client = ScriptedClient;

    fn source_client(&self, region: &str) -> Result<Self::Client, CloudError> {
        Ok(self.client(SOURCE_ACCOUNT, region))
    }

    fn target_client(&self, account: &str, region: &str) -> Result<Self::Client, CloudError> {
        let state = locked(&self.state);
        let panics = state.client_panics.contains(account);
        let refused = state.client_failures.contains(account);
        drop(state);
        assert!(!panics, "scripted client panic for {account}");
        if refused {
            return Err(CloudError::coded(
                "AccessDenied",
                format!("cannot assume role in {account}"),
            ));
        }
        Ok(self.client(account, region))
    }
}

/// Client returned by [`ScriptedCloud`], bound to one account and region.
#[derive(Clone, Debug)]
pub struct ScriptedClient {
    account: String,
    region: String,
    cloud: ScriptedCloud,
}

impl ImageClient for ScriptedClient {
    fn copy_image<'a>(&'a self, request: &'a CopyImageRequest) -> CloudFuture<'a, String> {
        Box::pin(async move {
            match self.cloud.begin_copy(&self.account, &self.region, request) {
                CopyStart::Panic => panic!("scripted copy panic for {}", self.account),
                CopyStart::Fail(err) => Err(err),
                CopyStart::Started { id, delay } => {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    self.cloud.end_copy();
                    Ok(id)
                }
            }
        })
    }

    fn create_tags<'a>(
        &'a self,
        image_id: &'a str,
        tags: &'a BTreeMap<String, String>,
    ) -> CloudFuture<'a, ()> {
        let result = self.cloud.tag(image_id, tags);
        Box::pin(async move { result })
    }

    fn describe_images<'a>(&'a self, image_id: &'a str) -> CloudFuture<'a, Vec<Image>> {
        let result = self.cloud.describe(&self.region, image_id);
        Box::pin(async move { result })
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: AsyncMutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
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
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in self.previous.iter().rev() {
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
