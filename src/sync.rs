//! Push and pull with credential retry.
//!
//! [`RemoteSyncController::execute`] announces `STARTED` right away, queues
//! the transfer on the shared [`OperationScheduler`] and announces
//! `FINISHED` exactly once when the attempt is over, whatever its outcome.
//!
//! An authentication failure asks the [`Interaction`] for new credentials
//! and retries until the transfer gets past authentication or the user
//! cancels. Credentials that worked are cached per host for the life of the
//! controller; nothing is written to disk.

use crate::error::{ErrorKind, Result};
use crate::events::{ChangeEvent, EventBus, GitOperation, PushPullEvent};
use crate::git::{PullResult, PullStatus, PushResult, PushStatus, RepositoryGateway, UserCredentials};
use crate::interaction::Interaction;
use crate::scheduler::OperationScheduler;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

pub const PUSH_IN_PROGRESS: &str = "Push in progress";
pub const PULL_IN_PROGRESS: &str = "Pull in progress";
pub const PUSH_SUCCESSFUL: &str = "Push successful";
pub const PUSH_UP_TO_DATE: &str = "Push: everything up to date";
pub const PUSH_REJECTED_NON_FAST_FORWARD: &str =
    "Push failed, please get your repository up to date(PULL)";
pub const PULL_SUCCESSFUL: &str = "Pull successful";
pub const PULL_UP_TO_DATE: &str = "Pull: already up to date";
pub const PULL_WITH_UNCOMMITTED_CHANGES: &str =
    "Pull failed: commit or discard your local changes first";
pub const PULL_REPOSITORY_HAS_CONFLICTS: &str =
    "Pull failed: resolve the conflicts in the repository first";

/// Remote transfer requested by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncCommand {
    Push,
    Pull,
}

impl SyncCommand {
    fn in_progress(self) -> &'static str {
        match self {
            SyncCommand::Push => PUSH_IN_PROGRESS,
            SyncCommand::Pull => PULL_IN_PROGRESS,
        }
    }
}

impl fmt::Display for SyncCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncCommand::Push => f.write_str("Push"),
            SyncCommand::Pull => f.write_str("Pull"),
        }
    }
}

struct Credentials {
    seed: Option<UserCredentials>,
    by_host: HashMap<String, UserCredentials>,
}

struct SyncState {
    gateway: Arc<dyn RepositoryGateway>,
    interaction: Arc<dyn Interaction>,
    progress: EventBus<PushPullEvent>,
    changes: EventBus<ChangeEvent>,
    credentials: Mutex<Credentials>,
}

/// Drives push and pull and turns their outcomes into user messages.
pub struct RemoteSyncController {
    scheduler: Arc<OperationScheduler>,
    state: Arc<SyncState>,
}

impl RemoteSyncController {
    pub fn new(
        gateway: Arc<dyn RepositoryGateway>,
        scheduler: Arc<OperationScheduler>,
        interaction: Arc<dyn Interaction>,
        changes: EventBus<ChangeEvent>,
    ) -> Self {
        Self {
            scheduler,
            state: Arc::new(SyncState {
                gateway,
                interaction,
                progress: EventBus::new(),
                changes,
                credentials: Mutex::new(Credentials {
                    seed: None,
                    by_host: HashMap::new(),
                }),
            }),
        }
    }

    /// Credentials tried first for hosts without cached ones.
    pub fn with_credentials(self, credentials: Option<UserCredentials>) -> Self {
        self.state.lock_credentials().seed = credentials;
        self
    }

    /// Bus carrying the STARTED / FINISHED events.
    pub fn progress(&self) -> &EventBus<PushPullEvent> {
        &self.state.progress
    }

    /// Start `command` in the background.
    pub fn execute(&self, command: SyncCommand) -> Result<()> {
        self.state
            .progress
            .emit(&PushPullEvent::started(command.in_progress()));

        let state = Arc::clone(&self.state);
        let label = command.to_string().to_lowercase();
        let queued = self.scheduler.schedule(label, move || state.run(command));
        if queued.is_err() {
            self.state.progress.emit(&PushPullEvent::finished(""));
        }
        queued
    }
}

impl SyncState {
    fn run(&self, command: SyncCommand) -> Result<()> {
        let outcome = self.attempt(command);
        let message = outcome.as_deref().unwrap_or_default().to_string();
        self.progress.emit(&PushPullEvent::finished(message));
        outcome.map(|_| ())
    }

    /// Run `command` until it gets past authentication or the user gives
    /// up. Returns the text for the FINISHED event.
    fn attempt(&self, command: SyncCommand) -> Result<String> {
        let mut host = self.gateway.remote_host().ok();
        let mut creds = self.credentials_for(host.as_deref());

        loop {
            let err = match self.transfer(command, &creds) {
                Ok(message) => {
                    if let Some(host) = host {
                        self.remember(host, creds);
                    }
                    return Ok(message);
                }
                Err(err) => err,
            };

            match err.kind() {
                ErrorKind::Authentication => {
                    let host_name = match &host {
                        Some(host) => host.clone(),
                        None => self.gateway.remote_host().unwrap_or_default(),
                    };
                    match self
                        .interaction
                        .prompt_credentials(&host_name, &login_message(&creds))
                    {
                        Some(new_creds) => {
                            info!(host = %host_name, "retrying with new credentials");
                            host = Some(host_name);
                            creds = new_creds;
                        }
                        None => {
                            self.interaction
                                .show_error(&format!("{} cancelled: {}", command, err));
                            return Err(err);
                        }
                    }
                }
                ErrorKind::Authorization => {
                    self.interaction.show_error(&format!(
                        "You have no rights to push in this repository {}",
                        creds.username
                    ));
                    return Err(err);
                }
                ErrorKind::RemoteNotConfigured => match self.interaction.configure_remote() {
                    Some(url) => {
                        if let Err(e) = self.gateway.set_remote_url(&url) {
                            self.interaction
                                .show_error(&format!("Could not use remote {}: {}", url, e));
                            return Err(e);
                        }
                        info!(%url, "remote configured");
                        host = self.gateway.remote_host().ok();
                        creds = self.credentials_for(host.as_deref());
                    }
                    None => {
                        self.interaction.show_error(&format!(
                            "{} failed: no remote repository is configured",
                            command
                        ));
                        return Err(err);
                    }
                },
                _ => {
                    self.interaction
                        .show_error(&format!("{} failed: {}", command, err));
                    return Err(err);
                }
            }
        }
    }

    fn transfer(&self, command: SyncCommand, creds: &UserCredentials) -> Result<String> {
        match command {
            SyncCommand::Push => Ok(self.classify_push(self.gateway.push(creds)?)),
            SyncCommand::Pull => Ok(self.classify_pull(self.gateway.pull(creds)?)),
        }
    }

    fn classify_push(&self, result: PushResult) -> String {
        info!(status = ?result.status, "push finished");
        match result.status {
            PushStatus::Ok => PUSH_SUCCESSFUL.to_string(),
            PushStatus::UpToDate => PUSH_UP_TO_DATE.to_string(),
            PushStatus::RejectedNonFastForward => {
                self.interaction.show_warning(PUSH_REJECTED_NON_FAST_FORWARD);
                String::new()
            }
            PushStatus::RejectedOtherReason(reason) => {
                self.interaction.show_warning(&reason);
                String::new()
            }
        }
    }

    fn classify_pull(&self, result: PullResult) -> String {
        info!(status = ?result.status, "pull finished");
        match result.status {
            PullStatus::Ok => {
                self.announce_merge_restart();
                PULL_SUCCESSFUL.to_string()
            }
            PullStatus::UpToDate => PULL_UP_TO_DATE.to_string(),
            PullStatus::UncommittedFiles => {
                self.interaction.show_warning(PULL_WITH_UNCOMMITTED_CHANGES);
                String::new()
            }
            PullStatus::Conflicts => {
                self.announce_merge_restart();
                self.interaction.show_pull_conflicts(&result.conflicting_files);
                String::new()
            }
            PullStatus::RepositoryHasConflicts => {
                self.interaction.show_warning(PULL_REPOSITORY_HAS_CONFLICTS);
                String::new()
            }
        }
    }

    fn announce_merge_restart(&self) {
        self.changes
            .emit(&ChangeEvent::repository_wide(GitOperation::MergeRestart));
    }

    fn credentials_for(&self, host: Option<&str>) -> UserCredentials {
        let cache = self.lock_credentials();
        host.and_then(|h| cache.by_host.get(h))
            .or(cache.seed.as_ref())
            .cloned()
            .unwrap_or_default()
    }

    fn remember(&self, host: String, creds: UserCredentials) {
        if creds.is_empty() {
            return;
        }
        self.lock_credentials().by_host.insert(host, creds);
    }

    fn lock_credentials(&self) -> std::sync::MutexGuard<'_, Credentials> {
        self.credentials.lock().unwrap_or_else(|poisoned| {
            warn!("credential cache lock was poisoned");
            poisoned.into_inner()
        })
    }
}

fn login_message(creds: &UserCredentials) -> String {
    if creds.username.is_empty() {
        "Invalid credentials".to_string()
    } else {
        format!("Invalid credentials for {}", creds.username)
    }
}
