//! One opened repository with its controllers and views.

use std::path::Path;
use std::sync::{Arc, Weak};

use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::controller::CommandController;
use crate::error::Result;
use crate::events::{ChangeEvent, EventBus, GitOperation, PushPullEvent};
use crate::git::{GitRepo, RepositoryGateway};
use crate::interaction::Interaction;
use crate::model::{FileStatusModel, View};
use crate::scheduler::OperationScheduler;
use crate::sync::RemoteSyncController;

/// Wires a repository to a scheduler, both controllers and the staged and
/// unstaged views.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use stage_sync::prelude::*;
/// # struct Quiet;
/// # impl Interaction for Quiet {
/// #     fn confirm(&self, _: &str, _: &str, _: &[&str]) -> usize { 0 }
/// #     fn prompt_credentials(&self, _: &str, _: &str) -> Option<UserCredentials> { None }
/// #     fn show_warning(&self, _: &str) {}
/// # }
///
/// let session = Session::open("./my-repo", &SyncConfig::default(), Arc::new(Quiet))?;
/// let files = session.unstaged().entries();
/// session.commands().do_command(&files, FileCommand::Stage)?;
/// session.flush()?;
/// assert!(session.unstaged().is_empty());
/// # Ok::<(), stage_sync::error::SyncError>(())
/// ```
pub struct Session {
    repo: Arc<GitRepo>,
    scheduler: Arc<OperationScheduler>,
    changes: EventBus<ChangeEvent>,
    commands: CommandController,
    sync: RemoteSyncController,
    staged: Arc<FileStatusModel>,
    unstaged: Arc<FileStatusModel>,
}

impl Session {
    /// Open the repository containing `path` and load both views.
    pub fn open(
        path: impl AsRef<Path>,
        config: &SyncConfig,
        interaction: Arc<dyn Interaction>,
    ) -> Result<Self> {
        let repo = Arc::new(GitRepo::discover(path)?.with_remote(config.remote.clone()));
        info!(workdir = %repo.workdir().display(), remote = %repo.remote_name(), "opened repository");

        let gateway: Arc<dyn RepositoryGateway> = repo.clone();
        let scheduler = Arc::new(OperationScheduler::new()?);
        let changes = EventBus::new();

        let commands = CommandController::new(
            Arc::clone(&gateway),
            Arc::clone(&scheduler),
            Arc::clone(&interaction),
            changes.clone(),
        );
        let sync = RemoteSyncController::new(
            Arc::clone(&gateway),
            Arc::clone(&scheduler),
            interaction,
            changes.clone(),
        )
        .with_credentials(config.initial_credentials());

        let staged = Arc::new(FileStatusModel::new(View::Staged, Arc::clone(&gateway)));
        let unstaged = Arc::new(FileStatusModel::new(View::Unstaged, gateway));
        staged.attach(&changes);
        unstaged.attach(&changes);
        reload_after_rebase(&changes, &staged, &unstaged);

        staged.reload()?;
        unstaged.reload()?;

        Ok(Self {
            repo,
            scheduler,
            changes,
            commands,
            sync,
            staged,
            unstaged,
        })
    }

    pub fn repository(&self) -> &GitRepo {
        &self.repo
    }

    pub fn commands(&self) -> &CommandController {
        &self.commands
    }

    pub fn sync(&self) -> &RemoteSyncController {
        &self.sync
    }

    pub fn staged(&self) -> &Arc<FileStatusModel> {
        &self.staged
    }

    pub fn unstaged(&self) -> &Arc<FileStatusModel> {
        &self.unstaged
    }

    pub fn changes(&self) -> &EventBus<ChangeEvent> {
        &self.changes
    }

    pub fn progress(&self) -> &EventBus<PushPullEvent> {
        self.sync.progress()
    }

    pub fn scheduler(&self) -> &OperationScheduler {
        &self.scheduler
    }

    /// Wait for every queued command to finish.
    pub fn flush(&self) -> Result<()> {
        self.scheduler.flush()
    }
}

/// Rebase events only clear the views; refill them once the models have
/// seen the event.
fn reload_after_rebase(
    changes: &EventBus<ChangeEvent>,
    staged: &Arc<FileStatusModel>,
    unstaged: &Arc<FileStatusModel>,
) {
    let models: Vec<Weak<FileStatusModel>> = vec![Arc::downgrade(staged), Arc::downgrade(unstaged)];
    changes.subscribe(move |event: &ChangeEvent| {
        if !matches!(
            event.operation,
            GitOperation::AbortRebase | GitOperation::ContinueRebase
        ) {
            return;
        }
        for model in models.iter().filter_map(Weak::upgrade) {
            if let Err(e) = model.reload() {
                warn!(view = %model.view(), error = %e, "reload after rebase failed");
            }
        }
    });
}
