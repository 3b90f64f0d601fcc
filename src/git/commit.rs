//! Index operations: staging, unstaging and committing.

use crate::error::{Result, SyncError};
use crate::git::{ChangeType, FileStatus, GitRepo};
use git2::{Oid, Repository, RepositoryState, Signature};
use std::path::Path;

/// Index operations for GitRepo.
pub trait CommitOps {
    /// Put the working copy state of each file into the index.
    fn stage(&self, files: &[FileStatus]) -> Result<()>;

    /// Reset the index entries of `paths` to their HEAD state.
    fn unstage(&self, paths: &[String]) -> Result<()>;

    /// Commit the index, concluding a merge if one is in progress.
    fn commit(&self, message: &str) -> Result<Oid>;
}

impl CommitOps for GitRepo {
    fn stage(&self, files: &[FileStatus]) -> Result<()> {
        let repo = self.repo()?;
        let mut index = repo.index()?;

        for file in files {
            let path = Path::new(&file.path);
            match file.change_type {
                ChangeType::Submodule => {
                    // a gitlink, not content: record the submodule's checked out commit
                    let mut submodule = repo.find_submodule(&file.path)?;
                    // shares the repository's index, written below
                    submodule.add_to_index(false)?;
                }
                ChangeType::Delete => index.remove_path(path)?,
                _ if !self.workdir().join(path).exists() => index.remove_path(path)?,
                _ => index.add_path(path)?,
            }
        }

        index.write()?;
        Ok(())
    }

    fn unstage(&self, paths: &[String]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let repo = self.repo()?;

        match head_commit(&repo)? {
            Some(head) => {
                repo.reset_default(Some(head.as_object()), paths.iter().map(String::as_str))?
            }
            None => {
                // unborn branch: nothing to reset to, drop the entries
                let mut index = repo.index()?;
                for path in paths {
                    index.remove_path(Path::new(path))?;
                }
                index.write()?;
            }
        }
        Ok(())
    }

    fn commit(&self, message: &str) -> Result<Oid> {
        let mut repo = self.repo()?;
        let mut index = repo.index()?;
        if index.has_conflicts() {
            return Err(SyncError::state("cannot commit with unresolved conflicts"));
        }

        let merging = repo.state() == RepositoryState::Merge;
        let mut merge_heads = Vec::new();
        if merging {
            repo.mergehead_foreach(|oid| {
                merge_heads.push(*oid);
                true
            })?;
        }

        let tree_id = index.write_tree()?;
        let tree = repo.find_tree(tree_id)?;
        let signature = signature(&repo)?;

        let mut parents = Vec::new();
        if let Some(head) = head_commit(&repo)? {
            parents.push(head);
        }
        for oid in merge_heads {
            parents.push(repo.find_commit(oid)?);
        }
        let parent_refs: Vec<&git2::Commit<'_>> = parents.iter().collect();

        let oid = repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            message,
            &tree,
            &parent_refs,
        )?;

        if merging {
            repo.cleanup_state()?;
        }
        Ok(oid)
    }
}

/// HEAD's commit, or None on an unborn branch.
pub(crate) fn head_commit(repo: &Repository) -> Result<Option<git2::Commit<'_>>> {
    match repo.head() {
        Ok(head) => Ok(Some(head.peel_to_commit()?)),
        Err(e) if e.code() == git2::ErrorCode::UnbornBranch => Ok(None),
        Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub(crate) fn signature(repo: &Repository) -> Result<Signature<'static>> {
    repo.signature().or_else(|_| {
        // no user.name/user.email configured
        Signature::now("stage-sync", "stage-sync@localhost").map_err(SyncError::from)
    })
}
