//! Observable staged / unstaged file lists.

use crate::controller::{CommandController, FileCommand};
use crate::error::Result;
use crate::events::{ChangeEvent, EventBus, GitOperation, SubscriptionId};
use crate::git::{ChangeType, FileStatus, RepositoryGateway};
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::{debug, warn};

/// Which side of the index a model shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum View {
    /// Entries in the index.
    Staged,
    /// Entries in the working copy that can be staged.
    Unstaged,
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            View::Staged => f.write_str("staged"),
            View::Unstaged => f.write_str("unstaged"),
        }
    }
}

/// Snapshot published after every change to a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewChanged {
    pub view: View,
    pub rows: Vec<FileStatus>,
}

/// Sorted, duplicate-free list of changed files for one [`View`].
///
/// Rows are ordered by change type rank, then path. The model is kept up
/// to date by [`ChangeEvent`]s and re-queries the gateway only for the
/// paths an event names, except for `MERGE_RESTART` which reloads fully.
pub struct FileStatusModel {
    view: View,
    gateway: Arc<dyn RepositoryGateway>,
    rows: Mutex<Vec<FileStatus>>,
    changes: EventBus<ViewChanged>,
}

impl FileStatusModel {
    pub fn new(view: View, gateway: Arc<dyn RepositoryGateway>) -> Self {
        Self {
            view,
            gateway,
            rows: Mutex::new(Vec::new()),
            changes: EventBus::new(),
        }
    }

    pub fn view(&self) -> View {
        self.view
    }

    /// Apply every event published on `bus` to this model.
    ///
    /// The subscription holds the model weakly; it stops applying events
    /// once the model is dropped.
    pub fn attach(self: &Arc<Self>, bus: &EventBus<ChangeEvent>) -> SubscriptionId {
        let model: Weak<Self> = Arc::downgrade(self);
        bus.subscribe(move |event: &ChangeEvent| {
            if let Some(model) = model.upgrade()
                && let Err(e) = model.apply_event(event)
            {
                warn!(view = %model.view, error = %e, "failed to update file list");
            }
        })
    }

    /// Observe the rows after every change.
    pub fn subscribe(
        &self,
        callback: impl Fn(&ViewChanged) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.changes.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.changes.unsubscribe(id)
    }

    /// Replace every row.
    pub fn replace_all(&self, entries: Vec<FileStatus>) {
        self.mutate(|rows| *rows = entries);
    }

    /// Re-query this view from the repository.
    pub fn reload(&self) -> Result<()> {
        let entries = self.query(None)?;
        self.replace_all(entries);
        Ok(())
    }

    /// Update the rows for a completed operation.
    pub fn apply_event(&self, event: &ChangeEvent) -> Result<()> {
        debug!(view = %self.view, operation = ?event.operation, "applying change event");
        let paths = event.paths();

        match (event.operation, self.view) {
            (GitOperation::Stage, View::Staged) => {
                let staged = self.query(Some(&paths))?;
                self.mutate(|rows| rows.extend(staged));
            }
            (GitOperation::Stage, View::Unstaged) | (GitOperation::Unstage, View::Staged) => {
                self.mutate(|rows| remove_entries(rows, &event.affected_files));
            }
            (GitOperation::Unstage, View::Unstaged) => {
                // the path may already be listed with its previous state
                let unstaged = self.query(Some(&paths))?;
                self.mutate(|rows| {
                    remove_entries(rows, &event.affected_files);
                    rows.extend(unstaged);
                });
            }
            (GitOperation::Commit, View::Staged) => self.mutate(Vec::clear),
            (GitOperation::Commit, View::Unstaged) => {}
            (GitOperation::Discard | GitOperation::AbortMerge, _) => {
                self.mutate(|rows| remove_entries(rows, &event.affected_files));
            }
            (GitOperation::MergeRestart, _) => self.reload()?,
            (GitOperation::AbortRebase | GitOperation::ContinueRebase, _) => {
                self.mutate(Vec::clear);
            }
        }
        Ok(())
    }

    /// Stage (unstaged view) or unstage (staged view) every row except
    /// conflicts.
    pub fn toggle_all(&self, controller: &CommandController) -> Result<()> {
        let entries: Vec<FileStatus> = self
            .lock()
            .iter()
            .filter(|f| f.change_type != ChangeType::Conflict)
            .cloned()
            .collect();
        if entries.is_empty() {
            return Ok(());
        }

        let command = match self.view {
            View::Staged => FileCommand::Unstage,
            View::Unstaged => FileCommand::Stage,
        };
        controller.do_command(&entries, command)
    }

    /// Row of the first entry whose path is exactly `path`.
    pub fn row_of(&self, path: &str) -> Option<usize> {
        self.lock().iter().position(|f| f.path == path)
    }

    /// Rows whose path contains `fragment`, e.g. everything under a folder.
    pub fn rows_containing(&self, fragment: &str) -> Vec<usize> {
        self.lock()
            .iter()
            .enumerate()
            .filter(|(_, f)| f.path.contains(fragment))
            .map(|(row, _)| row)
            .collect()
    }

    pub fn get(&self, row: usize) -> Option<FileStatus> {
        self.lock().get(row).cloned()
    }

    pub fn entries(&self) -> Vec<FileStatus> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn query(&self, paths: Option<&[String]>) -> Result<Vec<FileStatus>> {
        match self.view {
            View::Staged => self.gateway.staged_files(paths),
            View::Unstaged => self.gateway.unstaged_files(paths),
        }
    }

    fn mutate(&self, change: impl FnOnce(&mut Vec<FileStatus>)) {
        let snapshot = {
            let mut rows = self.lock();
            change(&mut rows);
            normalize(&mut rows);
            rows.clone()
        };
        self.changes.emit(&ViewChanged {
            view: self.view,
            rows: snapshot,
        });
    }

    fn lock(&self) -> MutexGuard<'_, Vec<FileStatus>> {
        self.rows.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn remove_entries(rows: &mut Vec<FileStatus>, affected: &[FileStatus]) {
    rows.retain(|row| !affected.contains(row));
}

/// Drop duplicate entries, then sort by change type rank and path.
fn normalize(rows: &mut Vec<FileStatus>) {
    let mut seen = HashSet::new();
    rows.retain(|row| seen.insert((row.change_type, row.path.clone())));
    rows.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
}
