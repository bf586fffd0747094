use std::path::Path;
use std::time::Duration;

use arsvc_schemas::GitProvider;
use regex::Regex;
use tokio::process::Command;

use crate::askpass::AskPass;
use crate::{credentialed_url, scrub, MaterializeError};

/// The primary (first-installed) collection's namespace and name, parsed
/// from `ansible-galaxy`'s own stdout. Subsequent matches in the same
/// output are dependencies, not the primary collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryCollection {
    pub namespace: String,
    pub name: String,
}

/// `ansible-galaxy collection install git+<username-url>,<branch> -p <collections_dir>`
/// with the same ask-pass side channel and timeout policy as `shallow_clone`.
/// Returns `None` when the primary collection can't be parsed from stdout —
/// callers fall back to scanning installed `galaxy.yml` files in `resolve_fqcn`.
pub async fn install_collection(
    repo: &str,
    branch: &str,
    collections_dir: &Path,
    provider: &GitProvider,
    credential: &str,
    timeout: Duration,
) -> Result<Option<PrimaryCollection>, MaterializeError> {
    let url = credentialed_url(repo, provider.kind.url_username())?;
    let askpass = AskPass::new()?;

    tokio::fs::create_dir_all(collections_dir).await?;

    let galaxy_bin = which::which("ansible-galaxy")
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|_| "ansible-galaxy".to_string());

    let spec = format!("git+{url},{branch}");

    let mut cmd = Command::new(galaxy_bin);
    cmd.args(["collection", "install", &spec, "-p"])
        .arg(collections_dir)
        .envs(askpass.env_vars(credential));

    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(result) => result?,
        Err(_) => return Err(MaterializeError::CollectionInstallTimeout),
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        return Err(MaterializeError::CollectionInstallFailed(scrub(
            &stderr, credential,
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    Ok(parse_primary_collection(&stdout))
}

fn parse_primary_collection(stdout: &str) -> Option<PrimaryCollection> {
    let re = Regex::new(r"Installing '(\w+)\.(\w+):").ok()?;
    let caps = re.captures(stdout)?;
    Some(PrimaryCollection {
        namespace: caps.get(1)?.as_str().to_string(),
        name: caps.get(2)?.as_str().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_first_installing_line_as_primary() {
        let stdout = "Starting galaxy collection install process\n\
                       Installing 'mycompany.infra:1.2.0' to '/tmp/collections/ansible_collections/mycompany/infra'\n\
                       Installing 'community.general:7.0.0' to '/tmp/collections/ansible_collections/community/general'\n";
        let primary = parse_primary_collection(stdout).unwrap();
        assert_eq!(primary.namespace, "mycompany");
        assert_eq!(primary.name, "infra");
    }

    #[test]
    fn returns_none_when_unparseable() {
        assert!(parse_primary_collection("no installation lines here").is_none());
    }
}
