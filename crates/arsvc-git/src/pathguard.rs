use std::path::{Path, PathBuf};

use crate::MaterializeError;

/// Resolves the join of `repo_dir` and `requested` symlink-aware and
/// asserts that the resolved real path remains a descendant of the
/// resolved `repo_dir`. Defends against both `..` segments and symlinks
/// planted inside the repo.
pub fn ensure_contained(repo_dir: &Path, requested: &str) -> Result<PathBuf, MaterializeError> {
    let candidate = repo_dir.join(requested);

    let repo_real = std::fs::canonicalize(repo_dir)?;
    let candidate_real = std::fs::canonicalize(&candidate).map_err(|_| MaterializeError::PathEscapesRepo)?;

    if candidate_real.starts_with(&repo_real) {
        Ok(candidate_real)
    } else {
        Err(MaterializeError::PathEscapesRepo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_path_inside_repo() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("playbook.yml"), "---\n").unwrap();
        let resolved = ensure_contained(dir.path(), "playbook.yml").unwrap();
        assert_eq!(resolved, std::fs::canonicalize(dir.path().join("playbook.yml")).unwrap());
    }

    #[test]
    fn rejects_dotdot_escape() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.yml"), "---\n").unwrap();

        let traversal = format!("../{}/secret.yml", outside.path().file_name().unwrap().to_str().unwrap());
        let err = ensure_contained(dir.path(), &traversal);
        assert!(err.is_err());
    }

    #[cfg(unix)]
    #[test]
    fn rejects_planted_symlink_escape() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();

        let link_path = dir.path().join("escape");
        std::os::unix::fs::symlink(outside.path(), &link_path).unwrap();

        let err = ensure_contained(dir.path(), "escape/evil.yml");
        assert!(err.is_err());
    }
}
