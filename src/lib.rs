//! # Stage Sync
//!
//! Staging, conflict resolution and push/pull orchestration over a git
//! working copy, with live "staged" and "unstaged" views.
//!
//! This crate provides:
//! - A repository gateway over libgit2 (status, stage, unstage, commit,
//!   restore, push, pull, branches)
//! - A single-worker scheduler that serializes every repository mutation
//! - A command controller for stage / unstage / discard and resolving
//!   conflicts with "mine" or "theirs"
//! - A remote sync controller for push and pull with credential retry
//! - Observable, sorted file lists kept current by change events
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use stage_sync::prelude::*;
//!
//! struct Terminal;
//!
//! impl Interaction for Terminal {
//!     fn confirm(&self, _title: &str, _message: &str, _options: &[&str]) -> usize {
//!         0
//!     }
//!     fn prompt_credentials(&self, _host: &str, _message: &str) -> Option<UserCredentials> {
//!         None
//!     }
//!     fn show_warning(&self, message: &str) {
//!         eprintln!("warning: {}", message);
//!     }
//! }
//!
//! let session = Session::open(".", &SyncConfig::load_default()?, Arc::new(Terminal))?;
//!
//! session.progress().subscribe(|event: &PushPullEvent| {
//!     println!("{:?}: {}", event.status, event.message);
//! });
//!
//! let unstaged = session.unstaged().entries();
//! session.commands().do_command(&unstaged, FileCommand::Stage)?;
//! session.commands().commit("update docs")?;
//! session.sync().execute(SyncCommand::Push)?;
//! session.flush()?;
//! # Ok::<(), stage_sync::error::SyncError>(())
//! ```
//!
//! ## Resolving Conflicts
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use stage_sync::prelude::*;
//! # fn run(session: &Session) -> Result<()> {
//! let conflicts: Vec<FileStatus> = session
//!     .unstaged()
//!     .entries()
//!     .into_iter()
//!     .filter(|f| f.change_type == ChangeType::Conflict)
//!     .collect();
//!
//! // asks for confirmation first while a rebase is in progress
//! session.commands().resolve_using_theirs(&conflicts)?;
//! session.flush()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod git;
pub mod interaction;
pub mod model;
pub mod scheduler;
pub mod session;
pub mod sync;

#[cfg(test)]
pub(crate) mod test_support;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::config::SyncConfig;
    pub use crate::controller::{CommandController, ConflictResolution, FileCommand};
    pub use crate::error::{ErrorKind, Result, SyncError};
    pub use crate::events::{
        ActionStatus, ChangeEvent, EventBus, GitOperation, PushPullEvent, SubscriptionId,
    };
    pub use crate::git::{
        BranchOps, ChangeType, CommitOps, FileStatus, GitRepo, MergeOps, PullResult, PullStatus,
        PushResult, PushStatus, RemoteOps, RepoState, RepositoryGateway, StatusOps,
        UserCredentials, WorktreeOps,
    };
    pub use crate::interaction::Interaction;
    pub use crate::model::{FileStatusModel, View, ViewChanged};
    pub use crate::scheduler::OperationScheduler;
    pub use crate::session::Session;
    pub use crate::sync::{RemoteSyncController, SyncCommand};
}

pub use prelude::*;
