//! User-facing capabilities the controllers call back into.
//!
//! Controllers never present dialogs themselves. A front end (the terminal
//! binary, a GUI, or a scripted fake in tests) implements [`Interaction`]
//! and is injected when a [`Session`](crate::session::Session) is opened.
//! Calls arrive on the scheduler's worker thread.

use crate::git::UserCredentials;

/// Confirmation, credential and notification callbacks.
pub trait Interaction: Send + Sync {
    /// Ask the user to pick one of `options`; returns the chosen index.
    fn confirm(&self, title: &str, message: &str, options: &[&str]) -> usize;

    /// Ask for credentials for `host`. `None` means the user cancelled.
    fn prompt_credentials(&self, host: &str, message: &str) -> Option<UserCredentials>;

    fn show_warning(&self, message: &str);

    fn show_error(&self, message: &str) {
        self.show_warning(message);
    }

    /// Hand the conflicting files of a pull to the conflict resolution UI.
    fn show_pull_conflicts(&self, files: &[String]) {
        self.show_warning(&format!(
            "Pull finished with conflicts in: {}",
            files.join(", ")
        ));
    }

    /// Ask for the URL of a remote to use. `None` means the user declined.
    fn configure_remote(&self) -> Option<String> {
        None
    }
}
