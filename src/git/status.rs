//! Working copy status and the per-file change entries derived from it.

use crate::error::Result;
use crate::git::GitRepo;
use git2::StatusOptions;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// Kind of change a file carries.
///
/// The declaration order is the display rank used when sorting views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    Modify,
    Add,
    Delete,
    Rename,
    Copy,
    Conflict,
    Submodule,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            ChangeType::Modify => "M",
            ChangeType::Add => "A",
            ChangeType::Delete => "D",
            ChangeType::Rename => "R",
            ChangeType::Copy => "C",
            ChangeType::Conflict => "U",
            ChangeType::Submodule => "S",
        };
        f.write_str(symbol)
    }
}

/// A changed path in one of the views.
///
/// Two entries are the same entry when path and change type match; the
/// description is informational only.
#[derive(Debug, Clone, Serialize)]
pub struct FileStatus {
    pub path: String,
    pub change_type: ChangeType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FileStatus {
    pub fn new(change_type: ChangeType, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            change_type,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sort key: change type rank first, then path.
    pub fn sort_key(&self) -> (ChangeType, &str) {
        (self.change_type, self.path.as_str())
    }
}

impl PartialEq for FileStatus {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path && self.change_type == other.change_type
    }
}

impl Eq for FileStatus {}

impl std::hash::Hash for FileStatus {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.path.hash(state);
        self.change_type.hash(state);
    }
}

/// Raw path sets of a status scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoStatus {
    /// Staged modifications.
    pub changed: BTreeSet<String>,
    /// Staged additions.
    pub added: BTreeSet<String>,
    /// Staged deletions.
    pub removed: BTreeSet<String>,
    /// Unstaged modifications.
    pub modified: BTreeSet<String>,
    /// Unstaged deletions.
    pub missing: BTreeSet<String>,
    pub untracked: BTreeSet<String>,
    pub conflicting: BTreeSet<String>,
    /// Paths of registered submodules.
    pub submodules: BTreeSet<String>,
}

impl RepoStatus {
    /// Entries in the index that differ from HEAD.
    pub fn staged(&self) -> Vec<FileStatus> {
        let mut files = Vec::new();
        self.collect(&mut files, &self.changed, ChangeType::Modify);
        self.collect(&mut files, &self.added, ChangeType::Add);
        self.collect(&mut files, &self.removed, ChangeType::Delete);
        files
    }

    /// Entries in the working copy that differ from the index. A staged
    /// file edited again shows up in both views.
    pub fn unstaged(&self) -> Vec<FileStatus> {
        let mut files = Vec::new();
        self.collect(&mut files, &self.modified, ChangeType::Modify);
        self.collect(&mut files, &self.untracked, ChangeType::Add);
        self.collect(&mut files, &self.missing, ChangeType::Delete);
        for path in &self.conflicting {
            files.push(FileStatus::new(ChangeType::Conflict, path.clone()));
        }
        files
    }

    fn collect(&self, out: &mut Vec<FileStatus>, paths: &BTreeSet<String>, change: ChangeType) {
        for path in paths {
            // conflicted paths show up once, as conflicts
            if self.conflicting.contains(path) {
                continue;
            }
            let change_type = if self.submodules.contains(path) {
                ChangeType::Submodule
            } else {
                change
            };
            out.push(FileStatus::new(change_type, path.clone()));
        }
    }
}

/// Status queries for GitRepo.
pub trait StatusOps {
    /// Scan the working copy and index.
    fn status(&self) -> Result<RepoStatus>;

    /// Staged entries, optionally restricted to the given paths.
    fn staged_files(&self, paths: Option<&[String]>) -> Result<Vec<FileStatus>> {
        Ok(restrict(self.status()?.staged(), paths))
    }

    /// Unstaged entries, optionally restricted to the given paths.
    fn unstaged_files(&self, paths: Option<&[String]>) -> Result<Vec<FileStatus>> {
        Ok(restrict(self.status()?.unstaged(), paths))
    }
}

fn restrict(files: Vec<FileStatus>, paths: Option<&[String]>) -> Vec<FileStatus> {
    match paths {
        Some(paths) => files
            .into_iter()
            .filter(|f| paths.iter().any(|p| p == &f.path))
            .collect(),
        None => files,
    }
}

impl StatusOps for GitRepo {
    fn status(&self) -> Result<RepoStatus> {
        let repo = self.repo()?;

        let mut opts = StatusOptions::new();
        opts.include_untracked(true);
        opts.recurse_untracked_dirs(true);
        opts.include_ignored(false);
        opts.include_unmodified(false);
        opts.exclude_submodules(false);

        let mut result = RepoStatus::default();
        for submodule in repo.submodules()? {
            result
                .submodules
                .insert(submodule.path().to_string_lossy().replace('\\', "/"));
        }

        let statuses = repo.statuses(Some(&mut opts))?;
        for entry in statuses.iter() {
            let s = entry.status();
            let path = match entry.path() {
                Some(path) => path.to_string(),
                None => continue,
            };

            if s.is_conflicted() {
                result.conflicting.insert(path);
                continue;
            }
            if s.is_index_new() {
                result.added.insert(path.clone());
            }
            if s.is_index_modified() || s.is_index_typechange() {
                result.changed.insert(path.clone());
            }
            if s.is_index_deleted() {
                result.removed.insert(path.clone());
            }
            if s.is_wt_new() {
                result.untracked.insert(path.clone());
            }
            if s.is_wt_modified() || s.is_wt_typechange() {
                result.modified.insert(path.clone());
            }
            if s.is_wt_deleted() {
                result.missing.insert(path);
            }
        }

        Ok(result)
    }
}
