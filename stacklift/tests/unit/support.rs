//! Scripted in-memory fakes of the cloud clients

use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tracing_subscriber::fmt::MakeWriter;

use stacklift::cloud::control_plane::ControlPlane;
use stacklift::cloud::object_store::ObjectStore;
use stacklift::cloud::CloudConnector;
use stacklift::config::reader::StackSettings;
use stacklift::deploy::task::DeploymentTask;
use stacklift::deploy::waiter::{PollSettings, WaitSettings};
use stacklift::errors::DeployError;
use stacklift::models::outcome::ResourceChange;
use stacklift::models::stack::{
    ChangeSetDescription, ChangeSetRequest, ChangesetDesiredState, Export, StackDescription,
    StackEvent, StackEventPage, TemplateParameter,
};

pub const REGION: &str = "us-east-1";

pub fn stack_id(stack_name: &str) -> String {
    format!(
        "arn:aws:cloudformation:{}:000000000000:stack/{}/0001",
        REGION, stack_name
    )
}

fn stack_name_of(name_or_id: &str) -> String {
    match name_or_id.split_once(":stack/") {
        Some((_, rest)) => rest.split('/').next().unwrap_or(rest).to_string(),
        None => name_or_id.to_string(),
    }
}

pub fn event(event_id: &str, status: &str, logical_id: &str) -> StackEvent {
    StackEvent {
        event_id: event_id.to_string(),
        timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
        resource_status: status.to_string(),
        resource_type: "AWS::S3::Bucket".to_string(),
        logical_resource_id: logical_id.to_string(),
        resource_status_reason: None,
    }
}

/// Zero-delay polling so tests never sleep
pub fn fast_wait() -> WaitSettings {
    WaitSettings {
        change_set: PollSettings::new(Duration::ZERO, 10),
        stack_operation: PollSettings::new(Duration::ZERO, 10),
    }
}

pub fn settings(section: &str, stack_name: &str) -> StackSettings {
    StackSettings {
        section: section.to_string(),
        stack_name: stack_name.to_string(),
        region: REGION.to_string(),
        role_export: None,
        changeset_desired_state: ChangesetDesiredState::Completed,
        capabilities: vec!["CAPABILITY_IAM".to_string()],
        deploy_function: false,
        deploy_bucket_name: None,
        parameters: Default::default(),
    }
}

/// Write `{name}.yaml` into `dir` and return a task deploying it to stack `{name}-stack`
pub fn task(dir: &Path, name: &str, depends_on: &[&str]) -> DeploymentTask {
    let template_path = write_template(dir, name);
    DeploymentTask::new(name, template_path, settings(name, &format!("{}-stack", name)))
        .with_depends_on(depends_on.iter().map(|dep| dep.to_string()).collect())
        .with_wait(fast_wait())
}

pub fn write_template(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(format!("{}.yaml", name));
    std::fs::write(&path, template_body(name)).unwrap();
    path
}

pub fn template_body(name: &str) -> String {
    format!("Description: {}\nResources: {{}}\n", name)
}

/// How one stack behaves
#[derive(Debug, Clone, Default)]
pub struct StackScript {
    /// Status before anything is submitted; `None` means no stack
    pub initial_status: Option<String>,

    /// Change set (status, reason), one per describe; the last one repeats
    pub change_set: VecDeque<(String, Option<String>)>,

    pub changes: Vec<ResourceChange>,

    /// Stack statuses after execute or delete, one per describe; the last one repeats
    pub operation: VecDeque<Option<String>>,

    /// Events that already exist, newest first
    pub history: Vec<StackEvent>,

    /// One event appears per describe while the operation runs
    pub progress: VecDeque<StackEvent>,

    /// Message of a rejected create_change_set
    pub create_error: Option<String>,
}

impl StackScript {
    pub fn absent() -> Self {
        Self::default()
            .change_set_statuses(&["CREATE_PENDING", "CREATE_COMPLETE"])
            .operation_statuses(&[Some("CREATE_IN_PROGRESS"), Some("CREATE_COMPLETE")])
    }

    pub fn existing(status: &str) -> Self {
        Self {
            initial_status: Some(status.to_string()),
            ..Self::default()
        }
        .change_set_statuses(&["CREATE_COMPLETE"])
        .operation_statuses(&[Some("UPDATE_IN_PROGRESS"), Some("UPDATE_COMPLETE")])
    }

    pub fn change_set_statuses(mut self, statuses: &[&str]) -> Self {
        self.change_set = statuses
            .iter()
            .map(|status| (status.to_string(), None))
            .collect();
        self
    }

    pub fn change_set_failed(mut self, reason: &str) -> Self {
        self.change_set = VecDeque::from([
            ("CREATE_PENDING".to_string(), None),
            ("FAILED".to_string(), Some(reason.to_string())),
        ]);
        self
    }

    pub fn operation_statuses(mut self, statuses: &[Option<&str>]) -> Self {
        self.operation = statuses
            .iter()
            .map(|status| status.map(str::to_string))
            .collect();
        self
    }

    pub fn with_changes(mut self, changes: Vec<ResourceChange>) -> Self {
        self.changes = changes;
        self
    }

    pub fn with_history(mut self, history: Vec<StackEvent>) -> Self {
        self.history = history;
        self
    }

    pub fn with_progress(mut self, progress: Vec<StackEvent>) -> Self {
        self.progress = progress.into();
        self
    }

    pub fn create_fails(mut self, message: &str) -> Self {
        self.create_error = Some(message.to_string());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Initial,
    Submitted,
    Operating,
}

#[derive(Debug)]
struct StackState {
    script: StackScript,
    phase: Phase,
    /// Newest first
    events: Vec<StackEvent>,
}

impl StackState {
    fn exists(&self) -> bool {
        self.phase != Phase::Initial || self.script.initial_status.is_some()
    }
}

/// Pop the front unless it is the last entry
fn next_of<T: Clone>(queue: &mut VecDeque<T>) -> Option<T> {
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

/// One recorded control-plane call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub op: &'static str,
    pub stack: String,
}

/// Control plane driven by per-stack scripts
#[derive(Debug, Default)]
pub struct FakeControlPlane {
    stacks: Mutex<HashMap<String, StackState>>,
    declared: Mutex<HashMap<String, Vec<TemplateParameter>>>,
    exports: Mutex<Vec<Export>>,
    requests: Mutex<Vec<ChangeSetRequest>>,
    calls: Mutex<Vec<Call>>,
    page_size: Option<usize>,
}

impl FakeControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Split event listings into pages of `page_size`
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn script(&self, stack_name: &str, script: StackScript) {
        let events = script.history.clone();
        self.stacks.lock().unwrap().insert(
            stack_name.to_string(),
            StackState {
                script,
                phase: Phase::Initial,
                events,
            },
        );
    }

    /// Parameters reported by validate_template for a template body
    pub fn declare(&self, template_body: &str, parameters: &[(&str, bool)]) {
        self.declared.lock().unwrap().insert(
            template_body.to_string(),
            parameters
                .iter()
                .map(|(key, has_default)| TemplateParameter {
                    key: key.to_string(),
                    has_default: *has_default,
                })
                .collect(),
        );
    }

    pub fn export(&self, name: &str, value: &str) {
        self.exports.lock().unwrap().push(Export {
            name: name.to_string(),
            value: value.to_string(),
        });
    }

    pub fn push_event(&self, stack_name: &str, event: StackEvent) {
        if let Some(state) = self.stacks.lock().unwrap().get_mut(stack_name) {
            state.events.insert(0, event);
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Operations issued against one stack, in order
    pub fn calls_for(&self, stack_name: &str) -> Vec<&'static str> {
        self.calls()
            .into_iter()
            .filter(|call| call.stack == stack_name)
            .map(|call| call.op)
            .collect()
    }

    pub fn count(&self, stack_name: &str, op: &str) -> usize {
        self.calls_for(stack_name)
            .into_iter()
            .filter(|recorded| *recorded == op)
            .count()
    }

    pub fn requests(&self) -> Vec<ChangeSetRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn record(&self, op: &'static str, stack_name_or_id: &str) -> String {
        let stack = stack_name_of(stack_name_or_id);
        self.calls.lock().unwrap().push(Call {
            op,
            stack: stack.clone(),
        });
        stack
    }
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    async fn describe_stack(
        &self,
        stack_name_or_id: &str,
    ) -> Result<Option<StackDescription>, DeployError> {
        let name = self.record("describe_stack", stack_name_or_id);
        let mut stacks = self.stacks.lock().unwrap();
        let Some(state) = stacks.get_mut(&name) else {
            return Ok(None);
        };

        let status = match state.phase {
            Phase::Initial => state.script.initial_status.clone(),
            Phase::Submitted => state
                .script
                .initial_status
                .clone()
                .or_else(|| Some("REVIEW_IN_PROGRESS".to_string())),
            Phase::Operating => {
                if let Some(event) = state.script.progress.pop_front() {
                    state.events.insert(0, event);
                }
                next_of(&mut state.script.operation).flatten()
            }
        };

        Ok(status.map(|status| StackDescription {
            stack_id: stack_id(&name),
            stack_name: name.clone(),
            status,
        }))
    }

    async fn validate_template(
        &self,
        template_body: &str,
    ) -> Result<Vec<TemplateParameter>, DeployError> {
        self.calls.lock().unwrap().push(Call {
            op: "validate_template",
            stack: String::new(),
        });
        Ok(self
            .declared
            .lock()
            .unwrap()
            .get(template_body)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_change_set(&self, request: &ChangeSetRequest) -> Result<String, DeployError> {
        let name = self.record("create_change_set", &request.stack_name);
        self.requests.lock().unwrap().push(request.clone());

        let mut stacks = self.stacks.lock().unwrap();
        let state = stacks
            .get_mut(&name)
            .ok_or_else(|| DeployError::ControlPlaneError(format!("no script for {}", name)))?;

        if let Some(message) = &state.script.create_error {
            return Err(DeployError::ControlPlaneError(message.clone()));
        }
        if state.phase == Phase::Initial {
            state.phase = Phase::Submitted;
        }
        Ok(stack_id(&name))
    }

    async fn describe_change_set(
        &self,
        stack_name_or_id: &str,
        _change_set_name: &str,
    ) -> Result<ChangeSetDescription, DeployError> {
        let name = self.record("describe_change_set", stack_name_or_id);
        let mut stacks = self.stacks.lock().unwrap();
        let state = stacks
            .get_mut(&name)
            .ok_or_else(|| DeployError::ControlPlaneError(format!("no script for {}", name)))?;

        let (status, status_reason) = next_of(&mut state.script.change_set)
            .unwrap_or_else(|| ("CREATE_COMPLETE".to_string(), None));
        Ok(ChangeSetDescription {
            status,
            status_reason,
            changes: state.script.changes.clone(),
        })
    }

    async fn execute_change_set(
        &self,
        stack_name: &str,
        _change_set_name: &str,
    ) -> Result<(), DeployError> {
        let name = self.record("execute_change_set", stack_name);
        if let Some(state) = self.stacks.lock().unwrap().get_mut(&name) {
            state.phase = Phase::Operating;
        }
        Ok(())
    }

    async fn delete_stack(&self, stack_name: &str) -> Result<(), DeployError> {
        let name = self.record("delete_stack", stack_name);
        if let Some(state) = self.stacks.lock().unwrap().get_mut(&name) {
            state.phase = Phase::Operating;
        }
        Ok(())
    }

    async fn list_exports(&self) -> Result<Vec<Export>, DeployError> {
        self.calls.lock().unwrap().push(Call {
            op: "list_exports",
            stack: String::new(),
        });
        Ok(self.exports.lock().unwrap().clone())
    }

    async fn describe_stack_events(
        &self,
        stack_name_or_id: &str,
        next_token: Option<String>,
    ) -> Result<StackEventPage, DeployError> {
        let name = self.record("describe_stack_events", stack_name_or_id);
        let stacks = self.stacks.lock().unwrap();
        let Some(state) = stacks.get(&name).filter(|state| state.exists()) else {
            return Ok(StackEventPage::default());
        };

        let start = next_token
            .map(|token| token.parse::<usize>().unwrap())
            .unwrap_or(0);
        let end = match self.page_size {
            Some(size) => (start + size).min(state.events.len()),
            None => state.events.len(),
        };

        Ok(StackEventPage {
            events: state.events[start..end].to_vec(),
            next_token: (end < state.events.len()).then(|| end.to_string()),
        })
    }
}

/// Object store backed by a map
#[derive(Debug, Default)]
pub struct FakeObjectStore {
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
    uploads: Mutex<Vec<String>>,
}

impl FakeObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, bucket: &str, key: &str, body: Vec<u8>) {
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), body);
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// Keys written through upload_file or put_object, in order
    pub fn uploads(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, DeployError> {
        Ok(self.object(bucket, key).is_some())
    }

    async fn upload_file(&self, bucket: &str, key: &str, path: &Path) -> Result<(), DeployError> {
        let body = std::fs::read(path)?;
        self.put_object(bucket, key, body).await
    }

    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), DeployError> {
        self.insert(bucket, key, body);
        self.uploads.lock().unwrap().push(key.to_string());
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, DeployError> {
        self.object(bucket, key).ok_or_else(|| {
            DeployError::ObjectStoreError(format!("NoSuchKey: s3://{}/{}", bucket, key))
        })
    }
}

/// Hands out the same fakes for every region
#[derive(Debug, Default)]
pub struct FakeConnector {
    pub control_plane: Arc<FakeControlPlane>,
    pub object_store: Arc<FakeObjectStore>,
    regions: Mutex<Vec<String>>,
}

impl FakeConnector {
    pub fn new(control_plane: FakeControlPlane) -> Self {
        Self {
            control_plane: Arc::new(control_plane),
            object_store: Arc::new(FakeObjectStore::new()),
            regions: Mutex::new(Vec::new()),
        }
    }

    pub fn regions(&self) -> Vec<String> {
        self.regions.lock().unwrap().clone()
    }
}

#[async_trait]
impl CloudConnector for FakeConnector {
    async fn control_plane(&self, region: &str) -> Result<Arc<dyn ControlPlane>, DeployError> {
        self.regions.lock().unwrap().push(region.to_string());
        Ok(self.control_plane.clone())
    }

    async fn object_store(&self) -> Result<Arc<dyn ObjectStore>, DeployError> {
        Ok(self.object_store.clone())
    }
}

/// In-memory sink for a test-local tracing subscriber
#[derive(Debug, Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a plain-text subscriber for the current thread
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        colored::control::set_override(false);
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .without_time()
            .with_target(false)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.buffer.lock().unwrap())
            .lines()
            .map(str::to_string)
            .collect()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
