//! Request-side validation for the intake layer.
//!
//! Kept in this crate (rather than `arsvc-daemon`) so the same rules run
//! whether a submission is driven by Axum extraction or by a future
//! non-HTTP caller — a CLI sync-run, or a test harness.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Inventory, Options, SourceDescriptor, SourceTarget};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("path must not be empty")]
    EmptyPath,
    #[error("path must not be absolute")]
    AbsolutePath,
    #[error("path must not contain '..' segments")]
    PathTraversal,
    #[error("verbosity must be between 0 and 4")]
    VerbosityOutOfRange,
    #[error("sync mode does not support git sources; use async mode")]
    SyncUnsupportedGitSource,
    #[error("sync mode does not support git inventory; use async mode")]
    SyncUnsupportedGitInventory,
}

fn validate_relative_path(path: &str) -> Result<(), ValidationError> {
    if path.is_empty() {
        return Err(ValidationError::EmptyPath);
    }
    if path.starts_with('/') {
        return Err(ValidationError::AbsolutePath);
    }
    if path.split('/').any(|seg| seg == "..") {
        return Err(ValidationError::PathTraversal);
    }
    Ok(())
}

/// The full submission body for `POST /api/v1/jobs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSubmission {
    pub source: SourceDescriptor,
    #[serde(default)]
    pub extra_vars: BTreeMap<String, Value>,
    #[serde(default = "default_inventory")]
    pub inventory: Inventory,
    #[serde(default)]
    pub options: Option<Options>,
}

fn default_inventory() -> Inventory {
    Inventory::Literal("localhost,".to_string())
}

impl JobSubmission {
    /// Per-variant path constraints, verbosity range, and (when `sync` is
    /// true) rejection of git sources and git inventory.
    pub fn validate(&self, sync: bool) -> Result<(), ValidationError> {
        match &self.source {
            SourceDescriptor::Local {
                target: SourceTarget::Playbook,
                path,
                ..
            } => {
                validate_relative_path(path.as_deref().unwrap_or(""))?;
            }
            SourceDescriptor::Git {
                target: SourceTarget::Playbook,
                path,
                ..
            } => {
                validate_relative_path(path.as_deref().unwrap_or(""))?;
            }
            _ => {}
        }

        if let Inventory::Git(git_inv) = &self.inventory {
            validate_relative_path(&git_inv.path)?;
        }

        if let Some(options) = &self.options {
            if !options.verbosity_in_range() {
                return Err(ValidationError::VerbosityOutOfRange);
            }
        }

        if sync {
            if self.source.is_git() {
                return Err(ValidationError::SyncUnsupportedGitSource);
            }
            if self.inventory.is_git() {
                return Err(ValidationError::SyncUnsupportedGitInventory);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SourceTarget;

    fn local_playbook(path: &str) -> JobSubmission {
        JobSubmission {
            source: SourceDescriptor::Local {
                target: SourceTarget::Playbook,
                path: Some(path.to_string()),
                collection: None,
                role: None,
                role_vars: None,
            },
            extra_vars: BTreeMap::new(),
            inventory: default_inventory(),
            options: None,
        }
    }

    #[test]
    fn accepts_plain_relative_path() {
        assert!(local_playbook("hello.yml").validate(false).is_ok());
    }

    #[test]
    fn rejects_empty_path() {
        assert_eq!(
            local_playbook("").validate(false).unwrap_err(),
            ValidationError::EmptyPath
        );
    }

    #[test]
    fn rejects_absolute_path() {
        assert_eq!(
            local_playbook("/etc/passwd").validate(false).unwrap_err(),
            ValidationError::AbsolutePath
        );
    }

    #[test]
    fn rejects_dotdot_path() {
        assert_eq!(
            local_playbook("../escape.yml").validate(false).unwrap_err(),
            ValidationError::PathTraversal
        );
    }

    #[test]
    fn rejects_verbosity_above_four() {
        let mut sub = local_playbook("hello.yml");
        sub.options = Some(Options {
            verbosity: Some(5),
            ..Default::default()
        });
        assert_eq!(
            sub.validate(false).unwrap_err(),
            ValidationError::VerbosityOutOfRange
        );
    }

    #[test]
    fn sync_rejects_git_source() {
        let sub = JobSubmission {
            source: SourceDescriptor::Git {
                target: SourceTarget::Playbook,
                repo: "https://dev.azure.com/xxxit/p/_git/r".to_string(),
                branch: "main".to_string(),
                path: Some("a.yml".to_string()),
                role: None,
                role_vars: None,
            },
            extra_vars: BTreeMap::new(),
            inventory: default_inventory(),
            options: None,
        };
        assert_eq!(
            sub.validate(true).unwrap_err(),
            ValidationError::SyncUnsupportedGitSource
        );
        assert!(sub.validate(false).is_ok());
    }

    #[test]
    fn sync_rejects_git_inventory() {
        let mut sub = local_playbook("hello.yml");
        sub.inventory = Inventory::Git(crate::GitInventory {
            kind: crate::GitTag::Git,
            repo: "https://dev.azure.com/xxxit/p/_git/r".to_string(),
            branch: "main".to_string(),
            path: "inv.yml".to_string(),
        });
        assert_eq!(
            sub.validate(true).unwrap_err(),
            ValidationError::SyncUnsupportedGitInventory
        );
        assert!(sub.validate(false).is_ok());
    }
}
