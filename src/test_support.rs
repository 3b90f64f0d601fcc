//! In-memory gateway and scripted interaction for controller tests.

use crate::error::{Result, SyncError};
use crate::git::{
    BranchOps, ChangeType, CommitOps, FileStatus, MergeOps, PullResult, PullStatus, PushResult,
    PushStatus, RemoteOps, RepoState, RepoStatus, RepositoryGateway, StatusOps, UserCredentials,
    WorktreeOps,
};
use crate::interaction::Interaction;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Gateway that records every call and answers from canned data.
pub(crate) struct FakeGateway {
    calls: Mutex<Vec<String>>,
    pub state: Mutex<RepoState>,
    pub status: Mutex<RepoStatus>,
    pub head_blobs: Mutex<HashMap<String, Vec<u8>>>,
    /// Incoming side of conflicted paths.
    pub incoming_blobs: Mutex<HashMap<String, Vec<u8>>>,
    pub working_files: Mutex<HashMap<String, Vec<u8>>>,
    pub push_results: Mutex<VecDeque<Result<PushResult>>>,
    pub pull_results: Mutex<VecDeque<Result<PullResult>>>,
    pub remote_url: Mutex<Option<String>>,
    pub credentials_seen: Mutex<Vec<UserCredentials>>,
    /// Name of an operation that fails with a repository state error.
    pub failing: Mutex<Option<&'static str>>,
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            state: Mutex::new(RepoState::Safe),
            status: Mutex::new(RepoStatus::default()),
            head_blobs: Mutex::new(HashMap::new()),
            incoming_blobs: Mutex::new(HashMap::new()),
            working_files: Mutex::new(HashMap::new()),
            push_results: Mutex::new(VecDeque::new()),
            pull_results: Mutex::new(VecDeque::new()),
            remote_url: Mutex::new(Some("https://git.example.com/team/repo.git".into())),
            credentials_seen: Mutex::new(Vec::new()),
            failing: Mutex::new(None),
        }
    }
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(self, state: RepoState) -> Self {
        *self.state.lock().unwrap() = state;
        self
    }

    pub fn with_head_blob(self, path: &str, content: &[u8]) -> Self {
        self.head_blobs
            .lock()
            .unwrap()
            .insert(path.to_string(), content.to_vec());
        self
    }

    pub fn with_incoming_blob(self, path: &str, content: &[u8]) -> Self {
        self.incoming_blobs
            .lock()
            .unwrap()
            .insert(path.to_string(), content.to_vec());
        self
    }

    pub fn failing_on(self, operation: &'static str) -> Self {
        *self.failing.lock().unwrap() = Some(operation);
        self
    }

    pub fn queue_push(&self, result: Result<PushResult>) {
        self.push_results.lock().unwrap().push_back(result);
    }

    pub fn queue_pull(&self, result: Result<PullResult>) {
        self.pull_results.lock().unwrap().push_back(result);
    }

    pub fn set_status(&self, status: RepoStatus) {
        *self.status.lock().unwrap() = status;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Recorded calls whose name starts with `prefix`.
    pub fn calls_to(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }

    fn record(&self, operation: &'static str, detail: impl AsRef<str>) -> Result<()> {
        let detail = detail.as_ref();
        let call = if detail.is_empty() {
            operation.to_string()
        } else {
            format!("{}:{}", operation, detail)
        };
        self.calls.lock().unwrap().push(call);

        if *self.failing.lock().unwrap() == Some(operation) {
            return Err(SyncError::state(format!("{} failed", operation)));
        }
        Ok(())
    }
}

pub(crate) fn push_result(status: PushStatus) -> PushResult {
    PushResult {
        status,
        message: None,
    }
}

pub(crate) fn pull_result(status: PullStatus, conflicts: &[&str]) -> PullResult {
    PullResult {
        status,
        conflicting_files: conflicts.iter().map(|s| s.to_string()).collect(),
        message: None,
    }
}

pub(crate) fn files(entries: &[(&str, ChangeType)]) -> Vec<FileStatus> {
    entries
        .iter()
        .map(|(path, change)| FileStatus::new(*change, *path))
        .collect()
}

impl StatusOps for FakeGateway {
    fn status(&self) -> Result<RepoStatus> {
        self.record("status", "")?;
        Ok(self.status.lock().unwrap().clone())
    }
}

impl CommitOps for FakeGateway {
    fn stage(&self, files: &[FileStatus]) -> Result<()> {
        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        self.record("stage", paths.join(","))
    }

    fn unstage(&self, paths: &[String]) -> Result<()> {
        self.record("unstage", paths.join(","))
    }

    fn commit(&self, message: &str) -> Result<git2::Oid> {
        self.record("commit", message)?;
        Ok(git2::Oid::zero())
    }
}

impl WorktreeOps for FakeGateway {
    fn restore_from_head(&self, paths: &[String]) -> Result<()> {
        self.record("restore", paths.join(","))
    }

    fn read_blob_at_head(&self, path: &str) -> Result<Vec<u8>> {
        self.record("read_blob", path)?;
        self.head_blobs
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| SyncError::BlobNotFound(path.to_string()))
    }

    fn read_incoming_blob(&self, path: &str) -> Result<Vec<u8>> {
        self.record("read_incoming_blob", path)?;
        self.incoming_blobs
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| SyncError::BlobNotFound(path.to_string()))
    }

    fn write_working_file(&self, path: &str, content: &[u8]) -> Result<()> {
        self.record("write", path)?;
        self.working_files
            .lock()
            .unwrap()
            .insert(path.to_string(), content.to_vec());
        Ok(())
    }

    fn remove_working_file(&self, path: &str) -> Result<()> {
        self.record("remove", path)?;
        self.working_files.lock().unwrap().remove(path);
        Ok(())
    }
}

impl RemoteOps for FakeGateway {
    fn push(&self, creds: &UserCredentials) -> Result<PushResult> {
        self.record("push", "")?;
        self.credentials_seen.lock().unwrap().push(creds.clone());
        self.push_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(push_result(PushStatus::Ok)))
    }

    fn pull(&self, creds: &UserCredentials) -> Result<PullResult> {
        self.record("pull", "")?;
        self.credentials_seen.lock().unwrap().push(creds.clone());
        self.pull_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(pull_result(PullStatus::Ok, &[])))
    }

    fn remote_host(&self) -> Result<String> {
        self.record("remote_host", "")?;
        match self.remote_url.lock().unwrap().as_deref() {
            Some(url) => Ok(url::Url::parse(url)
                .ok()
                .and_then(|u| u.host_str().map(String::from))
                .unwrap_or_else(|| url.to_string())),
            None => Err(SyncError::remote_not_configured("remote 'origin' not found")),
        }
    }

    fn set_remote_url(&self, url: &str) -> Result<()> {
        self.record("set_remote_url", url)?;
        *self.remote_url.lock().unwrap() = Some(url.to_string());
        Ok(())
    }
}

impl BranchOps for FakeGateway {
    fn list_branches(&self) -> Result<Vec<String>> {
        self.record("list_branches", "")?;
        Ok(vec!["main".to_string()])
    }

    fn create_branch(&self, name: &str) -> Result<()> {
        self.record("create_branch", name)
    }

    fn delete_branch(&self, name: &str) -> Result<()> {
        self.record("delete_branch", name)
    }

    fn current_branch(&self) -> Result<Option<String>> {
        Ok(Some("main".to_string()))
    }
}

impl MergeOps for FakeGateway {
    fn abort_merge(&self) -> Result<()> {
        self.record("abort_merge", "")
    }

    fn abort_rebase(&self) -> Result<()> {
        self.record("abort_rebase", "")
    }

    fn continue_rebase(&self) -> Result<bool> {
        self.record("continue_rebase", "")?;
        Ok(true)
    }
}

impl RepositoryGateway for FakeGateway {
    fn state(&self) -> Result<RepoState> {
        self.record("state", "")?;
        Ok(*self.state.lock().unwrap())
    }
}

/// Interaction that answers from a script and records what it was shown.
#[derive(Default)]
pub(crate) struct ScriptedInteraction {
    pub confirm_answer: usize,
    pub confirmations: Mutex<Vec<(String, String)>>,
    pub credentials: Mutex<VecDeque<Option<UserCredentials>>>,
    pub prompts: Mutex<Vec<(String, String)>>,
    pub warnings: Mutex<Vec<String>>,
    pub errors: Mutex<Vec<String>>,
    pub conflicts: Mutex<Vec<Vec<String>>>,
    pub remote_answers: Mutex<VecDeque<Option<String>>>,
}

impl ScriptedInteraction {
    pub fn declining() -> Self {
        Self {
            confirm_answer: 1,
            ..Self::default()
        }
    }

    pub fn answer_credentials(&self, creds: Option<UserCredentials>) {
        self.credentials.lock().unwrap().push_back(creds);
    }

    pub fn answer_remote(&self, url: Option<&str>) {
        self.remote_answers
            .lock()
            .unwrap()
            .push_back(url.map(String::from));
    }

    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}

impl Interaction for ScriptedInteraction {
    fn confirm(&self, title: &str, message: &str, _options: &[&str]) -> usize {
        self.confirmations
            .lock()
            .unwrap()
            .push((title.to_string(), message.to_string()));
        self.confirm_answer
    }

    fn prompt_credentials(&self, host: &str, message: &str) -> Option<UserCredentials> {
        self.prompts
            .lock()
            .unwrap()
            .push((host.to_string(), message.to_string()));
        self.credentials.lock().unwrap().pop_front().flatten()
    }

    fn show_warning(&self, message: &str) {
        self.warnings.lock().unwrap().push(message.to_string());
    }

    fn show_error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }

    fn show_pull_conflicts(&self, files: &[String]) {
        self.conflicts.lock().unwrap().push(files.to_vec());
    }

    fn configure_remote(&self) -> Option<String> {
        self.remote_answers.lock().unwrap().pop_front().flatten()
    }
}
