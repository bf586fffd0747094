//! Source materialization: turns a job's `source_config` and `inventory`
//! into a concrete playbook path, working directory, and environment ready
//! for the Playbook Runner, covering all four source-type branches plus
//! the three inventory shapes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use arsvc_config::{policy, AppConfig};
use arsvc_git::{install_collection, resolve_fqcn, shallow_clone, wrapper_playbook};
use arsvc_runner::InventoryInput;
use arsvc_schemas::{Inventory, SourceDescriptor, SourceTarget};

use crate::process::WorkerError;

pub struct MaterializedSource {
    pub playbook: PathBuf,
    pub working_dir: PathBuf,
    pub envvars: BTreeMap<String, String>,
}

/// Dispatches on `source`, materializing whatever the source type needs
/// inside `job_dir`, and returns the playbook path and working directory
/// the runner should use.
pub async fn materialize_source(
    source: Option<&SourceDescriptor>,
    fallback_playbook: &str,
    config: &AppConfig,
    job_dir: &Path,
) -> Result<MaterializedSource, WorkerError> {
    match source {
        None => Ok(MaterializedSource {
            playbook: config.playbooks_dir.join(fallback_playbook),
            working_dir: config.playbooks_dir.clone(),
            envvars: BTreeMap::new(),
        }),

        Some(SourceDescriptor::Local {
            target: SourceTarget::Playbook,
            path,
            ..
        }) => {
            let rel = path.clone().unwrap_or_else(|| fallback_playbook.to_string());
            Ok(MaterializedSource {
                playbook: config.playbooks_dir.join(rel),
                working_dir: config.playbooks_dir.clone(),
                envvars: BTreeMap::new(),
            })
        }

        Some(SourceDescriptor::Local {
            target: SourceTarget::Role,
            collection,
            role,
            role_vars,
            ..
        }) => {
            let collection = collection.clone().unwrap_or_default();
            let role = role.clone().unwrap_or_default();
            let fqcn = format!("{collection}.{role}");
            let vars = role_vars.clone().unwrap_or_default();
            let yaml = wrapper_playbook(&fqcn, &vars)?;

            let wrapper_path = job_dir.join("wrapper.yml");
            tokio::fs::write(&wrapper_path, yaml).await?;

            let mut envvars = BTreeMap::new();
            envvars.insert(
                "ANSIBLE_COLLECTIONS_PATH".to_string(),
                config.collections_dir.to_string_lossy().to_string(),
            );

            Ok(MaterializedSource {
                playbook: wrapper_path,
                working_dir: job_dir.to_path_buf(),
                envvars,
            })
        }

        Some(SourceDescriptor::Git {
            target: SourceTarget::Playbook,
            repo,
            branch,
            path,
            ..
        }) => {
            let provider = config.providers.resolve(repo)?;
            let credential = policy::credential(provider)?;

            let clone_dir = job_dir.join("repo");
            shallow_clone(repo, branch, &clone_dir, provider, &credential, config.clone_timeout)
                .await?;

            let rel = path.clone().unwrap_or_else(|| fallback_playbook.to_string());
            let playbook = arsvc_git::ensure_contained(&clone_dir, &rel)?;

            Ok(MaterializedSource {
                playbook,
                working_dir: clone_dir,
                envvars: BTreeMap::new(),
            })
        }

        Some(SourceDescriptor::Git {
            target: SourceTarget::Role,
            repo,
            branch,
            role,
            role_vars,
            ..
        }) => {
            let provider = config.providers.resolve(repo)?;
            let credential = policy::credential(provider)?;

            let collections_dir = job_dir.join("collections");
            let primary = install_collection(
                repo,
                branch,
                &collections_dir,
                provider,
                &credential,
                config.clone_timeout,
            )
            .await?;

            let role = role.clone().unwrap_or_default();
            let fqcn = resolve_fqcn(&role, &collections_dir, primary.as_ref())?;
            let vars = role_vars.clone().unwrap_or_default();
            let yaml = wrapper_playbook(&fqcn, &vars)?;

            let wrapper_path = job_dir.join("wrapper.yml");
            tokio::fs::write(&wrapper_path, yaml).await?;

            let mut envvars = BTreeMap::new();
            envvars.insert(
                "ANSIBLE_COLLECTIONS_PATH".to_string(),
                collections_dir.to_string_lossy().to_string(),
            );

            Ok(MaterializedSource {
                playbook: wrapper_path,
                working_dir: job_dir.to_path_buf(),
                envvars,
            })
        }
    }
}

/// Materializes `inventory` into something the runner can point at: a
/// literal string is passed through unchanged; an inline mapping is
/// written to a YAML file in `job_dir`; a git inventory is cloned into
/// `job_dir` symmetrically to a git playbook source.
pub async fn materialize_inventory(
    inventory: &Inventory,
    config: &AppConfig,
    job_dir: &Path,
) -> Result<InventoryInput, WorkerError> {
    match inventory {
        Inventory::Literal(s) => Ok(InventoryInput::Literal(s.clone())),

        Inventory::Inline(inline) => {
            let yaml = serde_yaml::to_string(&inline.data)?;
            let inventory_path = job_dir.join("inventory.yml");
            tokio::fs::write(&inventory_path, yaml).await?;
            Ok(InventoryInput::Path(inventory_path))
        }

        Inventory::Git(git_inv) => {
            let provider = config.providers.resolve(&git_inv.repo)?;
            let credential = policy::credential(provider)?;

            let clone_dir = job_dir.join("inventory_repo");
            shallow_clone(
                &git_inv.repo,
                &git_inv.branch,
                &clone_dir,
                provider,
                &credential,
                config.clone_timeout,
            )
            .await?;

            let resolved = arsvc_git::ensure_contained(&clone_dir, &git_inv.path)?;
            Ok(InventoryInput::Path(resolved))
        }
    }
}
