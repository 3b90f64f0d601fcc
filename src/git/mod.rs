//! Repository gateway: the primitive git operations the controllers build on.
//!
//! Each capability lives in its own trait, all implemented by [`GitRepo`]:
//! - [`StatusOps`]: staged / unstaged file listings
//! - [`CommitOps`]: staging, unstaging and committing
//! - [`WorktreeOps`]: restoring and rewriting working-copy files
//! - [`RemoteOps`]: push and pull with credentials
//! - [`BranchOps`]: local branch management
//! - [`MergeOps`]: leaving or continuing merges and rebases
//!
//! [`RepositoryGateway`] is the union of all of them and is what the
//! controllers receive. None of these operations synchronize with each
//! other; callers route mutations through the
//! [`OperationScheduler`](crate::scheduler::OperationScheduler).
//!
//! # Example
//!
//! ```rust,no_run
//! use stage_sync::git::{CommitOps, GitRepo, StatusOps};
//!
//! let repo = GitRepo::open("./my-repo")?;
//! let unstaged = repo.unstaged_files(None)?;
//! repo.stage(&unstaged)?;
//! repo.commit("update docs")?;
//! # Ok::<(), stage_sync::error::SyncError>(())
//! ```

mod auth;
mod branch;
mod commit;
mod merge;
mod remote;
mod status;
mod worktree;

pub use auth::UserCredentials;
pub use branch::BranchOps;
pub use commit::CommitOps;
pub use merge::MergeOps;
pub use remote::{PullResult, PullStatus, PushResult, PushStatus, RemoteOps};
pub use status::{ChangeType, FileStatus, RepoStatus, StatusOps};
pub use worktree::WorktreeOps;

use crate::error::{Result, SyncError};
use git2::Repository;
use std::path::{Path, PathBuf};

/// Name of the remote used when none is configured.
pub const DEFAULT_REMOTE: &str = "origin";

/// State of the repository with respect to an in-progress operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoState {
    Safe,
    Merging,
    /// Merging, all conflicts resolved in the index.
    MergingResolved,
    /// Rebase driven by the merge backend. "Mine" and "theirs" are swapped.
    RebasingMerge,
    Rebasing,
    RebasingInteractive,
    ApplyingMailbox,
    CherryPicking,
    Reverting,
    Bisecting,
}

/// Every capability the controllers need from a repository.
pub trait RepositoryGateway:
    StatusOps + CommitOps + WorktreeOps + RemoteOps + BranchOps + MergeOps + Send + Sync
{
    /// Current in-progress operation, if any.
    fn state(&self) -> Result<RepoState>;
}

/// Handle to a git working copy.
///
/// The handle only stores locations; every operation opens the repository
/// afresh, so the handle can be shared between threads.
#[derive(Debug, Clone)]
pub struct GitRepo {
    workdir: PathBuf,
    remote: String,
}

impl GitRepo {
    /// Open the repository whose working copy is at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let repo = Repository::open(path.as_ref())?;
        Self::from_repository(&repo)
    }

    /// Discover and open a repository from a path within it.
    pub fn discover(path: impl AsRef<Path>) -> Result<Self> {
        let repo = Repository::discover(path.as_ref())?;
        Self::from_repository(&repo)
    }

    fn from_repository(repo: &Repository) -> Result<Self> {
        let workdir = repo
            .workdir()
            .ok_or_else(|| SyncError::state("repository has no working directory"))?
            .to_path_buf();
        Ok(Self {
            workdir,
            remote: DEFAULT_REMOTE.to_string(),
        })
    }

    /// Use a remote other than `origin` for push and pull.
    pub fn with_remote(mut self, name: impl Into<String>) -> Self {
        self.remote = name.into();
        self
    }

    /// The repository's working directory path.
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Name of the remote used for push and pull.
    pub fn remote_name(&self) -> &str {
        &self.remote
    }

    pub(crate) fn repo(&self) -> Result<Repository> {
        Ok(Repository::open(&self.workdir)?)
    }
}

impl RepositoryGateway for GitRepo {
    fn state(&self) -> Result<RepoState> {
        let repo = self.repo()?;
        let state = match repo.state() {
            git2::RepositoryState::Clean => RepoState::Safe,
            git2::RepositoryState::Merge => {
                if repo.index()?.has_conflicts() {
                    RepoState::Merging
                } else {
                    RepoState::MergingResolved
                }
            }
            git2::RepositoryState::RebaseMerge => RepoState::RebasingMerge,
            git2::RepositoryState::Rebase | git2::RepositoryState::ApplyMailboxOrRebase => {
                RepoState::Rebasing
            }
            git2::RepositoryState::RebaseInteractive => RepoState::RebasingInteractive,
            git2::RepositoryState::ApplyMailbox => RepoState::ApplyingMailbox,
            git2::RepositoryState::CherryPick | git2::RepositoryState::CherryPickSequence => {
                RepoState::CherryPicking
            }
            git2::RepositoryState::Revert | git2::RepositoryState::RevertSequence => {
                RepoState::Reverting
            }
            git2::RepositoryState::Bisect => RepoState::Bisecting,
        };
        Ok(state)
    }
}
