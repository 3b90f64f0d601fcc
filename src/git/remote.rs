//! Push and pull against the configured remote.

use crate::error::{Result, SyncError};
use crate::git::auth::credential_callbacks;
use crate::git::commit::{head_commit, signature};
use crate::git::{GitRepo, UserCredentials};
use git2::build::CheckoutBuilder;
use git2::{
    AnnotatedCommit, ErrorCode, FetchOptions, MergeAnalysis, PushOptions, Remote,
    Repository, StatusOptions,
};
use std::cell::{Cell, RefCell};

/// Outcome of a push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushStatus {
    Ok,
    UpToDate,
    RejectedNonFastForward,
    /// Rejected by the remote; carries the remote's message.
    RejectedOtherReason(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushResult {
    pub status: PushStatus,
    pub message: Option<String>,
}

impl PushResult {
    fn new(status: PushStatus) -> Self {
        Self {
            status,
            message: None,
        }
    }
}

/// Outcome of a pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullStatus {
    Ok,
    UpToDate,
    /// Local edits would be overwritten; nothing was merged.
    UncommittedFiles,
    /// The merge stopped with conflicts, listed in the result.
    Conflicts,
    /// The index already had conflicts; nothing was fetched.
    RepositoryHasConflicts,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullResult {
    pub status: PullStatus,
    pub conflicting_files: Vec<String>,
    pub message: Option<String>,
}

impl PullResult {
    fn new(status: PullStatus) -> Self {
        Self {
            status,
            conflicting_files: Vec::new(),
            message: None,
        }
    }
}

/// Remote operations for GitRepo.
pub trait RemoteOps {
    /// Push the current branch.
    fn push(&self, creds: &UserCredentials) -> Result<PushResult>;

    /// Fetch and merge the current branch's upstream.
    fn pull(&self, creds: &UserCredentials) -> Result<PullResult>;

    /// Host name of the remote, used to key credentials.
    fn remote_host(&self) -> Result<String>;

    /// Create the remote, or point it at a new URL.
    fn set_remote_url(&self, url: &str) -> Result<()>;
}

impl RemoteOps for GitRepo {
    fn push(&self, creds: &UserCredentials) -> Result<PushResult> {
        let repo = self.repo()?;
        let branch = current_branch_name(&repo)?;
        let local = repo.refname_to_id(&format!("refs/heads/{}", branch))?;
        let mut remote = find_remote(&repo, self.remote_name())?;
        let refname = format!("refs/heads/{}", branch);

        // the remote already has `local` for every negotiated update
        let up_to_date = Cell::new(false);
        let rejection: RefCell<Option<String>> = RefCell::new(None);
        let mut callbacks = credential_callbacks(creds);
        callbacks.push_negotiation(|updates| {
            up_to_date.set(!updates.is_empty() && updates.iter().all(|u| u.src() == u.dst()));
            Ok(())
        });
        callbacks.push_update_reference(|_refname, status| {
            if let Some(message) = status {
                *rejection.borrow_mut() = Some(message.to_string());
            }
            Ok(())
        });
        let mut options = PushOptions::new();
        options.remote_callbacks(callbacks);

        let refspec = format!("{}:{}", refname, refname);
        match remote.push(&[refspec.as_str()], Some(&mut options)) {
            Ok(()) => {}
            Err(e) if e.code() == ErrorCode::NotFastForward => {
                return Ok(PushResult::new(PushStatus::RejectedNonFastForward));
            }
            Err(e) => return Err(e.into()),
        }
        drop(options);

        if let Some(message) = rejection.into_inner() {
            let status = if is_non_fast_forward(&message) {
                PushStatus::RejectedNonFastForward
            } else {
                PushStatus::RejectedOtherReason(message.clone())
            };
            return Ok(PushResult {
                status,
                message: Some(message),
            });
        }

        let tracking = format!("refs/remotes/{}/{}", self.remote_name(), branch);
        repo.reference(&tracking, local, true, "push: update remote-tracking ref")?;
        if up_to_date.get() {
            return Ok(PushResult::new(PushStatus::UpToDate));
        }
        Ok(PushResult::new(PushStatus::Ok))
    }

    fn pull(&self, creds: &UserCredentials) -> Result<PullResult> {
        let repo = self.repo()?;
        if repo.index()?.has_conflicts() {
            return Ok(PullResult::new(PullStatus::RepositoryHasConflicts));
        }

        let branch = current_branch_name(&repo)?;
        let mut remote = find_remote(&repo, self.remote_name())?;

        let mut fetch_options = FetchOptions::new();
        fetch_options.remote_callbacks(credential_callbacks(creds));
        remote.fetch(&[] as &[&str], Some(&mut fetch_options), None)?;

        let upstream = upstream_ref(&repo, self.remote_name(), &branch)?;
        let incoming = repo.reference_to_annotated_commit(&upstream)?;
        let (analysis, _) = repo.merge_analysis(&[&incoming])?;

        if analysis.contains(MergeAnalysis::ANALYSIS_UP_TO_DATE) {
            Ok(PullResult::new(PullStatus::UpToDate))
        } else if analysis.contains(MergeAnalysis::ANALYSIS_FASTFORWARD)
            || analysis.contains(MergeAnalysis::ANALYSIS_UNBORN)
        {
            fast_forward(&repo, &branch, &incoming)
        } else {
            merge(&repo, &incoming, self.remote_name(), &branch)
        }
    }

    fn remote_host(&self) -> Result<String> {
        let repo = self.repo()?;
        let remote = find_remote(&repo, self.remote_name())?;
        let url = remote.url().ok_or_else(|| {
            SyncError::remote_not_configured(format!(
                "remote '{}' has no URL",
                self.remote_name()
            ))
        })?;
        Ok(host_of(url))
    }

    fn set_remote_url(&self, url: &str) -> Result<()> {
        let repo = self.repo()?;
        if repo.find_remote(self.remote_name()).is_ok() {
            repo.remote_set_url(self.remote_name(), url)?;
        } else {
            repo.remote(self.remote_name(), url)?;
        }
        Ok(())
    }
}

fn current_branch_name(repo: &Repository) -> Result<String> {
    let head = repo.head()?;
    if !head.is_branch() {
        return Err(SyncError::state("HEAD is detached"));
    }
    head.shorthand()
        .map(String::from)
        .ok_or_else(|| SyncError::state("HEAD has no branch name"))
}

fn find_remote<'r>(repo: &'r Repository, name: &str) -> Result<Remote<'r>> {
    let remote = repo.find_remote(name).map_err(|_| {
        SyncError::remote_not_configured(format!("remote '{}' not found", name))
    })?;
    if remote.url().is_none() {
        return Err(SyncError::remote_not_configured(format!(
            "no URL configured for remote '{}'",
            name
        )));
    }
    Ok(remote)
}

fn upstream_ref<'r>(
    repo: &'r Repository,
    remote: &str,
    branch: &str,
) -> Result<git2::Reference<'r>> {
    if let Ok(local) = repo.find_branch(branch, git2::BranchType::Local)
        && let Ok(upstream) = local.upstream()
    {
        return Ok(upstream.into_reference());
    }
    let tracking = format!("refs/remotes/{}/{}", remote, branch);
    repo.find_reference(&tracking).map_err(|_| {
        SyncError::state(format!(
            "no upstream for branch '{}' on remote '{}'",
            branch, remote
        ))
    })
}

fn fast_forward(
    repo: &Repository,
    branch: &str,
    incoming: &AnnotatedCommit<'_>,
) -> Result<PullResult> {
    let target = repo.find_commit(incoming.id())?;

    // safe checkout: refuses to overwrite local edits
    let mut checkout = CheckoutBuilder::new();
    checkout.safe();
    match repo.checkout_tree(target.as_object(), Some(&mut checkout)) {
        Ok(()) => {}
        Err(e) if e.code() == ErrorCode::Conflict => {
            return Ok(PullResult::new(PullStatus::UncommittedFiles));
        }
        Err(e) => return Err(e.into()),
    }

    let refname = format!("refs/heads/{}", branch);
    let message = format!("pull: fast-forward to {}", incoming.id());
    match repo.find_reference(&refname) {
        Ok(mut reference) => {
            reference.set_target(incoming.id(), &message)?;
        }
        Err(_) => {
            repo.reference(&refname, incoming.id(), true, &message)?;
        }
    }
    repo.set_head(&refname)?;
    Ok(PullResult::new(PullStatus::Ok))
}

fn merge(
    repo: &Repository,
    incoming: &AnnotatedCommit<'_>,
    remote: &str,
    branch: &str,
) -> Result<PullResult> {
    if has_uncommitted_changes(repo)? {
        return Ok(PullResult::new(PullStatus::UncommittedFiles));
    }

    repo.merge(&[incoming], None, None)?;

    let mut index = repo.index()?;
    if index.has_conflicts() {
        let mut conflicting = Vec::new();
        for conflict in index.conflicts()? {
            let conflict = conflict?;
            let entry = conflict.our.or(conflict.their).or(conflict.ancestor);
            if let Some(entry) = entry {
                conflicting.push(String::from_utf8_lossy(&entry.path).to_string());
            }
        }
        conflicting.sort();
        conflicting.dedup();
        return Ok(PullResult {
            status: PullStatus::Conflicts,
            conflicting_files: conflicting,
            message: None,
        });
    }

    let tree = repo.find_tree(index.write_tree()?)?;
    let sig = signature(repo)?;
    let ours = head_commit(repo)?.ok_or_else(|| SyncError::state("HEAD has no commit"))?;
    let theirs = repo.find_commit(incoming.id())?;
    let message = format!("Merge branch '{}' of {}", branch, remote);
    repo.commit(Some("HEAD"), &sig, &sig, &message, &tree, &[&ours, &theirs])?;
    repo.cleanup_state()?;

    Ok(PullResult::new(PullStatus::Ok))
}

/// Staged or unstaged edits to tracked files; untracked files don't count.
fn has_uncommitted_changes(repo: &Repository) -> Result<bool> {
    let mut opts = StatusOptions::new();
    opts.include_untracked(false);
    opts.include_ignored(false);
    opts.exclude_submodules(true);
    Ok(!repo.statuses(Some(&mut opts))?.is_empty())
}

fn is_non_fast_forward(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("non-fast-forward")
        || lower.contains("fetch first")
        || lower.contains("not fast-forward")
}

/// Host part of a remote URL, accepting scp-like `user@host:path` forms.
fn host_of(url: &str) -> String {
    if let Ok(parsed) = url::Url::parse(url)
        && let Some(host) = parsed.host_str()
    {
        return host.to_string();
    }
    let without_user = url.rsplit_once('@').map_or(url, |(_, rest)| rest);
    match without_user.split_once(':') {
        Some((host, _)) if !host.contains('/') => host.to_string(),
        _ => url.to_string(),
    }
}
