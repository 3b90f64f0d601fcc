//! Stage, unstage, discard and conflict resolution commands.
//!
//! Every command is queued on the [`OperationScheduler`] and reports its
//! completion as a [`ChangeEvent`]. A command that fails is reported
//! through [`Interaction::show_error`] and produces no event.

use crate::error::{Result, SyncError};
use crate::events::{ChangeEvent, EventBus, GitOperation};
use crate::git::{ChangeType, FileStatus, RepoState, RepositoryGateway};
use crate::interaction::Interaction;
use crate::scheduler::OperationScheduler;
use std::sync::Arc;
use tracing::info;

/// File-level command accepted by [`CommandController::do_command`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileCommand {
    Stage,
    Unstage,
    Discard,
}

impl FileCommand {
    pub fn operation(self) -> GitOperation {
        match self {
            FileCommand::Stage => GitOperation::Stage,
            FileCommand::Unstage => GitOperation::Unstage,
            FileCommand::Discard => GitOperation::Discard,
        }
    }

    fn label(self) -> &'static str {
        match self {
            FileCommand::Stage => "stage",
            FileCommand::Unstage => "unstage",
            FileCommand::Discard => "discard",
        }
    }
}

/// Side of a conflict to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    Mine,
    Theirs,
}

impl ConflictResolution {
    fn action(self) -> &'static str {
        match self {
            ConflictResolution::Mine => "Resolve using \"Mine\"",
            ConflictResolution::Theirs => "Resolve using \"Theirs\"",
        }
    }

    fn side(self) -> &'static str {
        match self {
            ConflictResolution::Mine => "Mine",
            ConflictResolution::Theirs => "Theirs",
        }
    }

    /// Branch the side refers to while a rebase is in progress.
    fn rebase_branch(self) -> &'static str {
        match self {
            ConflictResolution::Mine => "the upstream branch",
            ConflictResolution::Theirs => "the working branch",
        }
    }
}

const CONFIRM_OPTIONS: [&str; 2] = ["Yes", "No"];
const PROCEED: usize = 0;

/// Parts of the controller that scheduled tasks carry with them.
#[derive(Clone)]
struct Executor {
    gateway: Arc<dyn RepositoryGateway>,
    interaction: Arc<dyn Interaction>,
    events: EventBus<ChangeEvent>,
}

/// Translates user intents on files into serialized gateway calls.
pub struct CommandController {
    scheduler: Arc<OperationScheduler>,
    exec: Executor,
}

impl CommandController {
    pub fn new(
        gateway: Arc<dyn RepositoryGateway>,
        scheduler: Arc<OperationScheduler>,
        interaction: Arc<dyn Interaction>,
        events: EventBus<ChangeEvent>,
    ) -> Self {
        Self {
            scheduler,
            exec: Executor {
                gateway,
                interaction,
                events,
            },
        }
    }

    /// Bus on which completed commands are announced.
    pub fn events(&self) -> &EventBus<ChangeEvent> {
        &self.exec.events
    }

    /// Queue `command` for `files`.
    ///
    /// The returned result only reports whether the command was queued.
    pub fn do_command(&self, files: &[FileStatus], command: FileCommand) -> Result<()> {
        let files = files.to_vec();
        self.submit(command.label(), move |exec| {
            match command {
                FileCommand::Stage => exec.gateway.stage(&files)?,
                FileCommand::Unstage => exec.gateway.unstage(&paths_of(&files))?,
                FileCommand::Discard => exec.discard(&files)?,
            }
            exec.emit(ChangeEvent::for_files(command.operation(), &files));
            Ok(())
        })
    }

    pub fn resolve_using_mine(&self, files: &[FileStatus]) -> Result<()> {
        self.resolve(files, ConflictResolution::Mine)
    }

    pub fn resolve_using_theirs(&self, files: &[FileStatus]) -> Result<()> {
        self.resolve(files, ConflictResolution::Theirs)
    }

    fn resolve(&self, files: &[FileStatus], resolution: ConflictResolution) -> Result<()> {
        let files = files.to_vec();
        let label = match resolution {
            ConflictResolution::Mine => "resolve using mine",
            ConflictResolution::Theirs => "resolve using theirs",
        };
        self.submit(label, move |exec| {
            if !exec.should_resolve(resolution)? {
                info!(?resolution, "conflict resolution declined");
                return Ok(());
            }
            match resolution {
                ConflictResolution::Mine => exec.discard(&files)?,
                ConflictResolution::Theirs => {
                    for file in &files {
                        exec.replace_with_incoming_content(&file.path)?;
                    }
                }
            }
            exec.gateway.stage(&files)?;
            exec.emit(ChangeEvent::for_files(GitOperation::Stage, &files));
            Ok(())
        })
    }

    /// Commit the index.
    pub fn commit(&self, message: &str) -> Result<()> {
        let message = message.to_string();
        self.submit("commit", move |exec| {
            let oid = exec.gateway.commit(&message)?;
            info!(%oid, "created commit");
            exec.emit(ChangeEvent::repository_wide(GitOperation::Commit));
            Ok(())
        })
    }

    /// Throw away the merge in progress.
    pub fn abort_merge(&self) -> Result<()> {
        self.submit("abort merge", |exec| {
            // everything tracked returns to HEAD; untracked files stay
            let status = exec.gateway.status()?;
            let mut affected = status.staged();
            affected.extend(
                status
                    .unstaged()
                    .into_iter()
                    .filter(|f| f.change_type != ChangeType::Add),
            );

            exec.gateway.abort_merge()?;
            exec.emit(ChangeEvent::for_files(GitOperation::AbortMerge, &affected));
            Ok(())
        })
    }

    pub fn abort_rebase(&self) -> Result<()> {
        self.submit("abort rebase", |exec| {
            exec.gateway.abort_rebase()?;
            exec.emit(ChangeEvent::repository_wide(GitOperation::AbortRebase));
            Ok(())
        })
    }

    pub fn continue_rebase(&self) -> Result<()> {
        self.submit("continue rebase", |exec| {
            if !exec.gateway.continue_rebase()? {
                exec.interaction
                    .show_warning("The rebase stopped on new conflicts. Resolve them and continue.");
            }
            exec.emit(ChangeEvent::repository_wide(GitOperation::ContinueRebase));
            Ok(())
        })
    }

    fn submit<F>(&self, label: &'static str, task: F) -> Result<()>
    where
        F: FnOnce(&Executor) -> Result<()> + Send + 'static,
    {
        let exec = self.exec.clone();
        self.scheduler.schedule(label, move || {
            task(&exec).inspect_err(|e| {
                exec.interaction
                    .show_error(&format!("Could not {}: {}", label, e));
            })
        })
    }
}

impl Executor {
    fn emit(&self, event: ChangeEvent) {
        self.events.emit(&event);
    }

    /// Unstage `files`, then restore their HEAD content. Submodules keep
    /// their working copy.
    fn discard(&self, files: &[FileStatus]) -> Result<()> {
        self.gateway.unstage(&paths_of(files))?;
        let restorable: Vec<String> = files
            .iter()
            .filter(|f| f.change_type != ChangeType::Submodule)
            .map(|f| f.path.clone())
            .collect();
        self.gateway.restore_from_head(&restorable)
    }

    /// Take the incoming side of a conflict; a side that deleted the file
    /// removes it.
    fn replace_with_incoming_content(&self, path: &str) -> Result<()> {
        match self.gateway.read_incoming_blob(path) {
            Ok(content) => self.gateway.write_working_file(path, &content),
            Err(SyncError::BlobNotFound(_)) => self.gateway.remove_working_file(path),
            Err(e) => Err(e),
        }
    }

    /// During a merge-backend rebase the sides are swapped, so the user has
    /// to agree before anything is touched.
    fn should_resolve(&self, resolution: ConflictResolution) -> Result<bool> {
        if self.gateway.state()? != RepoState::RebasingMerge {
            return Ok(true);
        }
        let message = format!(
            "While rebasing, \"{}\" refers to {}. Do you want to continue?",
            resolution.side(),
            resolution.rebase_branch()
        );
        let choice = self
            .interaction
            .confirm(resolution.action(), &message, &CONFIRM_OPTIONS);
        Ok(choice == PROCEED)
    }
}

fn paths_of(files: &[FileStatus]) -> Vec<String> {
    files.iter().map(|f| f.path.clone()).collect()
}
