//! Local branch operations.

use crate::error::{Result, SyncError};
use crate::git::GitRepo;
use crate::git::commit::head_commit;
use git2::BranchType;

/// Branch operations for GitRepo.
pub trait BranchOps {
    /// Names of all local branches, sorted.
    fn list_branches(&self) -> Result<Vec<String>>;

    /// Create a branch at HEAD without switching to it.
    fn create_branch(&self, name: &str) -> Result<()>;

    /// Delete a local branch. The checked out branch cannot be deleted.
    fn delete_branch(&self, name: &str) -> Result<()>;

    /// Name of the checked out branch, or None when HEAD is detached.
    fn current_branch(&self) -> Result<Option<String>>;
}

impl BranchOps for GitRepo {
    fn list_branches(&self) -> Result<Vec<String>> {
        let repo = self.repo()?;
        let mut names = Vec::new();

        for branch in repo.branches(Some(BranchType::Local))? {
            let (branch, _) = branch?;
            if let Some(name) = branch.name()? {
                names.push(name.to_string());
            }
        }

        names.sort();
        Ok(names)
    }

    fn create_branch(&self, name: &str) -> Result<()> {
        let repo = self.repo()?;
        if repo.find_branch(name, BranchType::Local).is_ok() {
            return Err(SyncError::Branch {
                message: format!("branch '{}' already exists", name),
            });
        }
        let commit = head_commit(&repo)?.ok_or_else(|| SyncError::Branch {
            message: format!("cannot create '{}': HEAD has no commit yet", name),
        })?;
        repo.branch(name, &commit, false)?;
        Ok(())
    }

    fn delete_branch(&self, name: &str) -> Result<()> {
        let repo = self.repo()?;
        let mut branch = repo
            .find_branch(name, BranchType::Local)
            .map_err(|_| SyncError::Branch {
                message: format!("branch '{}' not found", name),
            })?;

        if branch.is_head() {
            return Err(SyncError::Branch {
                message: format!("cannot delete the checked out branch '{}'", name),
            });
        }
        branch.delete()?;
        Ok(())
    }

    fn current_branch(&self) -> Result<Option<String>> {
        let repo = self.repo()?;
        let head = match repo.head() {
            Ok(head) => head,
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => {
                // unborn: HEAD still names the branch
                let head = repo.find_reference("HEAD")?;
                return Ok(head
                    .symbolic_target()
                    .and_then(|target| target.strip_prefix("refs/heads/"))
                    .map(String::from));
            }
            Err(e) => return Err(e.into()),
        };

        if head.is_branch() {
            Ok(head.shorthand().map(String::from))
        } else {
            Ok(None)
        }
    }
}
