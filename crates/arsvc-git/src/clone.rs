use std::path::Path;
use std::time::Duration;

use arsvc_schemas::GitProvider;
use tokio::process::Command;

use crate::askpass::AskPass;
use crate::{credentialed_url, scrub, MaterializeError};

/// `git clone --depth 1 --branch <b> --single-branch <username-url> <dest>`
/// with the ask-pass side channel and a 120 s default timeout.
pub async fn shallow_clone(
    repo: &str,
    branch: &str,
    dest: &Path,
    provider: &GitProvider,
    credential: &str,
    timeout: Duration,
) -> Result<(), MaterializeError> {
    let url = credentialed_url(repo, provider.kind.url_username())?;
    let askpass = AskPass::new()?;

    let git_bin = which::which("git")
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|_| "git".to_string());

    let mut cmd = Command::new(git_bin);
    cmd.args([
        "clone",
        "--depth",
        "1",
        "--branch",
        branch,
        "--single-branch",
        &url,
    ])
    .arg(dest)
    .envs(askpass.env_vars(credential));

    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(result) => result?,
        Err(_) => return Err(MaterializeError::CloneTimeout),
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        return Err(MaterializeError::CloneFailed(scrub(&stderr, credential)));
    }

    Ok(())
}
