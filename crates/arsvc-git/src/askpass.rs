//! Ask-pass side channel: hands a credential to a child process through a
//! short script the child invokes, with the secret living only in the
//! child's environment — never in argv, where it would be visible to
//! other processes on the host (e.g. via `ps`).

use std::io::Write;

use tempfile::NamedTempFile;

use crate::MaterializeError;

pub const ENV_GIT_ASKPASS: &str = "GIT_ASKPASS";
pub const ENV_GIT_TERMINAL_PROMPT: &str = "GIT_TERMINAL_PROMPT";
pub const ENV_CREDENTIAL_CARRIER: &str = "ARSVC_GIT_CREDENTIAL";

/// An owner-only-executable script that prints the credential carried in
/// `ARSVC_GIT_CREDENTIAL`. Kept alive for the duration of the child
/// process; the backing temp file is deleted on drop.
pub struct AskPass {
    script: NamedTempFile,
}

impl AskPass {
    pub fn new() -> Result<Self, MaterializeError> {
        let mut script = NamedTempFile::new()?;
        writeln!(script, "#!/bin/sh")?;
        writeln!(script, "echo \"${ENV_CREDENTIAL_CARRIER}\"")?;
        script.flush()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = script.as_file().metadata()?.permissions();
            perms.set_mode(0o700);
            script.as_file().set_permissions(perms)?;
        }

        Ok(Self { script })
    }

    pub fn script_path(&self) -> &std::path::Path {
        self.script.path()
    }

    /// Environment variables to set on the child process: the ask-pass
    /// pointer, the non-interactive guard, and the credential carrier.
    pub fn env_vars(&self, credential: &str) -> Vec<(String, String)> {
        vec![
            (
                ENV_GIT_ASKPASS.to_string(),
                self.script_path().to_string_lossy().to_string(),
            ),
            (ENV_GIT_TERMINAL_PROMPT.to_string(), "0".to_string()),
            (ENV_CREDENTIAL_CARRIER.to_string(), credential.to_string()),
        ]
    }
}
