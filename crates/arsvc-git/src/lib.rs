//! Git Materializer: shallow-clones a branch, installs an Ansible
//! collection from Git when required, resolves a short role name to a
//! fully-qualified collection name, and synthesizes a wrapper playbook.
//!
//! All operations are scoped to a caller-owned temporary directory and all
//! credentials flow through an ask-pass side channel — never through a
//! child process's argument vector.

mod askpass;
mod clone;
mod collection;
mod fqcn;
mod pathguard;
mod wrapper;

pub use askpass::AskPass;
pub use clone::shallow_clone;
pub use collection::{install_collection, PrimaryCollection};
pub use fqcn::resolve_fqcn;
pub use pathguard::ensure_contained;
pub use wrapper::wrapper_playbook;

#[derive(Debug, thiserror::Error)]
pub enum MaterializeError {
    #[error("clone_failed: {0}")]
    CloneFailed(String),
    #[error("clone_timeout: git clone did not complete within the configured timeout")]
    CloneTimeout,
    #[error("collection_install_failed: {0}")]
    CollectionInstallFailed(String),
    #[error("collection_install_timeout: ansible-galaxy did not complete within the configured timeout")]
    CollectionInstallTimeout,
    #[error("ambiguous_collection: more than one collection is installed; supply a fully-qualified collection name")]
    AmbiguousCollection,
    #[error("no_collection_installed: no collection metadata found under the collections directory")]
    NoCollectionInstalled,
    #[error("path_escapes_repo: requested path resolves outside the repository root")]
    PathEscapesRepo,
    #[error("credential_missing: {0}")]
    CredentialMissing(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Build the clone URL with only a provider-type-scoped username embedded
/// (`pat` for Azure, `oauth2` for GitLab). The credential itself never
/// appears in the URL.
pub fn credentialed_url(repo: &str, username: &str) -> Result<String, MaterializeError> {
    let mut url = url::Url::parse(repo)
        .map_err(|e| MaterializeError::CloneFailed(format!("invalid repo url: {e}")))?;
    url.set_username(username)
        .map_err(|_| MaterializeError::CloneFailed("repo url cannot carry a username".to_string()))?;
    Ok(url.to_string())
}

/// Replace every occurrence of `credential` in `text` with `***`. Applied
/// to every child-process error message before it is persisted or
/// surfaced, per the credential-scrubbing policy.
pub fn scrub(text: &str, credential: &str) -> String {
    if credential.is_empty() {
        return text.to_string();
    }
    text.replace(credential, "***")
}
