//! Leaving or continuing an interrupted merge or rebase.

use crate::error::{Result, SyncError};
use crate::git::GitRepo;
use crate::git::commit::{head_commit, signature};
use git2::build::CheckoutBuilder;
use git2::{ErrorCode, ResetType};

/// Merge and rebase control for GitRepo.
pub trait MergeOps {
    /// Throw away the merge in progress and return to HEAD.
    fn abort_merge(&self) -> Result<()>;

    /// Abort the rebase in progress, restoring the original branch.
    fn abort_rebase(&self) -> Result<()>;

    /// Commit the current rebase step and replay the remaining ones.
    ///
    /// Returns `false` when a later step stopped on conflicts.
    fn continue_rebase(&self) -> Result<bool>;
}

impl MergeOps for GitRepo {
    fn abort_merge(&self) -> Result<()> {
        let repo = self.repo()?;
        let head = head_commit(&repo)?.ok_or_else(|| SyncError::state("HEAD has no commit"))?;

        let mut checkout = CheckoutBuilder::new();
        checkout.force();
        repo.reset(head.as_object(), ResetType::Hard, Some(&mut checkout))?;
        repo.cleanup_state()?;
        Ok(())
    }

    fn abort_rebase(&self) -> Result<()> {
        let repo = self.repo()?;
        let mut rebase = repo
            .open_rebase(None)
            .map_err(|_| SyncError::state("no rebase in progress"))?;
        rebase.abort()?;
        Ok(())
    }

    fn continue_rebase(&self) -> Result<bool> {
        let repo = self.repo()?;
        if repo.index()?.has_conflicts() {
            return Err(SyncError::state("resolve all conflicts before continuing"));
        }
        let mut rebase = repo
            .open_rebase(None)
            .map_err(|_| SyncError::state("no rebase in progress"))?;
        let sig = signature(&repo)?;

        commit_step(&mut rebase, &sig)?;
        while let Some(step) = rebase.next() {
            step?;
            if repo.index()?.has_conflicts() {
                return Ok(false);
            }
            commit_step(&mut rebase, &sig)?;
        }

        rebase.finish(Some(&sig))?;
        Ok(true)
    }
}

/// Commit the current step; a step whose changes are already upstream is skipped.
fn commit_step(rebase: &mut git2::Rebase<'_>, sig: &git2::Signature<'_>) -> Result<()> {
    match rebase.commit(None, sig, None) {
        Ok(_) => Ok(()),
        Err(e) if e.code() == ErrorCode::Applied => Ok(()),
        Err(e) => Err(e.into()),
    }
}
