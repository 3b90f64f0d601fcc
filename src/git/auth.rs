//! Credentials for remote operations.

use git2::{Cred, CredentialType, ErrorClass, ErrorCode, RemoteCallbacks};
use std::fmt;

/// Username and secret (password or token) for a remote host.
///
/// Held in memory only.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct UserCredentials {
    pub username: String,
    pub secret: String,
}

impl UserCredentials {
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: secret.into(),
        }
    }

    /// Credentials with neither username nor secret.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.username.is_empty() && self.secret.is_empty()
    }
}

impl fmt::Debug for UserCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserCredentials")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Build remote callbacks that answer credential requests from `creds`.
///
/// libgit2 keeps asking while the server rejects what it got, so the
/// second request for the same operation fails with an authentication
/// error instead of looping.
pub(crate) fn credential_callbacks<'a>(creds: &UserCredentials) -> RemoteCallbacks<'a> {
    let creds = creds.clone();
    let mut attempts = 0u32;

    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(move |url, username_from_url, allowed_types| {
        attempts += 1;
        if attempts > 1 {
            return Err(rejected(url));
        }

        if allowed_types.contains(CredentialType::USER_PASS_PLAINTEXT) {
            if creds.is_empty() {
                // let the configured helper try before asking the user
                return git2::Config::open_default()
                    .and_then(|config| Cred::credential_helper(&config, url, username_from_url))
                    .map_err(|_| rejected(url));
            }
            Cred::userpass_plaintext(&creds.username, &creds.secret)
        } else if allowed_types.contains(CredentialType::SSH_KEY) {
            let user = username_from_url.unwrap_or(if creds.username.is_empty() {
                "git"
            } else {
                creds.username.as_str()
            });
            Cred::ssh_key_from_agent(user)
        } else if allowed_types.contains(CredentialType::USERNAME) {
            Cred::username(username_from_url.unwrap_or(creds.username.as_str()))
        } else {
            Cred::default()
        }
    });

    callbacks
}

fn rejected(url: &str) -> git2::Error {
    git2::Error::new(
        ErrorCode::Auth,
        ErrorClass::Callback,
        format!("not authorized: credentials rejected for {url}"),
    )
}
