//! Working copy content operations.

use crate::error::{Result, SyncError};
use crate::git::GitRepo;
use crate::git::commit::head_commit;
use git2::build::CheckoutBuilder;
use std::fs;
use std::path::Path;

/// Working copy operations for GitRepo.
pub trait WorktreeOps {
    /// Overwrite the working copy of `paths` with their HEAD content.
    /// Paths absent from HEAD are removed.
    fn restore_from_head(&self, paths: &[String]) -> Result<()>;

    /// Content of `path` in the HEAD commit.
    ///
    /// Fails with [`SyncError::BlobNotFound`] when HEAD has no such file.
    fn read_blob_at_head(&self, path: &str) -> Result<Vec<u8>>;

    /// Content of the incoming side of a conflicted `path`: the merged
    /// branch during a merge, the replayed commit during a rebase. Paths
    /// without a conflict entry read from HEAD.
    ///
    /// Fails with [`SyncError::BlobNotFound`] when the incoming side deleted
    /// the file.
    fn read_incoming_blob(&self, path: &str) -> Result<Vec<u8>>;

    /// Replace the working copy content of `path`.
    fn write_working_file(&self, path: &str, content: &[u8]) -> Result<()>;

    /// Delete `path` from the working copy. Missing files are not an error.
    fn remove_working_file(&self, path: &str) -> Result<()>;
}

impl WorktreeOps for GitRepo {
    fn restore_from_head(&self, paths: &[String]) -> Result<()> {
        // an empty pathspec would mean the whole tree
        if paths.is_empty() {
            return Ok(());
        }
        let repo = self.repo()?;

        if head_commit(&repo)?.is_none() {
            for path in paths {
                self.remove_working_file(path)?;
            }
            return Ok(());
        }

        let mut checkout = CheckoutBuilder::new();
        checkout.force().remove_untracked(true);
        for path in paths {
            checkout.path(path.as_str());
        }
        repo.checkout_head(Some(&mut checkout))?;
        Ok(())
    }

    fn read_blob_at_head(&self, path: &str) -> Result<Vec<u8>> {
        let repo = self.repo()?;
        let commit = head_commit(&repo)?.ok_or_else(|| SyncError::BlobNotFound(path.into()))?;
        let tree = commit.tree()?;

        let entry = match tree.get_path(Path::new(path)) {
            Ok(entry) => entry,
            Err(e) if e.code() == git2::ErrorCode::NotFound => {
                return Err(SyncError::BlobNotFound(path.into()));
            }
            Err(e) => return Err(e.into()),
        };

        let object = entry.to_object(&repo)?;
        let blob = object
            .as_blob()
            .ok_or_else(|| SyncError::BlobNotFound(path.into()))?;
        Ok(blob.content().to_vec())
    }

    fn read_incoming_blob(&self, path: &str) -> Result<Vec<u8>> {
        let repo = self.repo()?;
        let index = repo.index()?;
        if index.has_conflicts() {
            for conflict in index.conflicts()? {
                let conflict = conflict?;
                let sides = [&conflict.ancestor, &conflict.our, &conflict.their];
                let matches = sides
                    .iter()
                    .any(|side| side.as_ref().is_some_and(|e| e.path == path.as_bytes()));
                if !matches {
                    continue;
                }
                return match conflict.their {
                    Some(entry) => Ok(repo.find_blob(entry.id)?.content().to_vec()),
                    None => Err(SyncError::BlobNotFound(path.into())),
                };
            }
        }
        self.read_blob_at_head(path)
    }

    fn write_working_file(&self, path: &str, content: &[u8]) -> Result<()> {
        let target = self.workdir().join(path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(target, content)?;
        Ok(())
    }

    fn remove_working_file(&self, path: &str) -> Result<()> {
        match fs::remove_file(self.workdir().join(path)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
