use std::path::Path;

use serde::Deserialize;

use crate::collection::PrimaryCollection;
use crate::MaterializeError;

#[derive(Debug, Deserialize)]
struct GalaxyMeta {
    namespace: String,
    name: String,
}

/// Resolve a short role name to its fully-qualified collection name
/// (`<namespace>.<collection>.<role>`).
///
/// - If `role` already contains at least two dots, it is returned verbatim
///   (already an FQCN).
/// - Else if `primary` is known (parsed from the install step), the FQCN is
///   built from it directly.
/// - Else the `collections_dir/ansible_collections/*/*/galaxy.yml` tree is
///   scanned: exactly one hit resolves unambiguously; more than one fails
///   with `ambiguous_collection`; none fails with `no_collection_installed`.
pub fn resolve_fqcn(
    role: &str,
    collections_dir: &Path,
    primary: Option<&PrimaryCollection>,
) -> Result<String, MaterializeError> {
    if role.matches('.').count() >= 2 {
        return Ok(role.to_string());
    }

    if let Some(primary) = primary {
        return Ok(format!("{}.{}.{}", primary.namespace, primary.name, role));
    }

    let found = scan_installed_collections(collections_dir)?;
    match found.len() {
        0 => Err(MaterializeError::NoCollectionInstalled),
        1 => {
            let meta = &found[0];
            Ok(format!("{}.{}.{}", meta.namespace, meta.name, role))
        }
        _ => Err(MaterializeError::AmbiguousCollection),
    }
}

fn scan_installed_collections(collections_dir: &Path) -> Result<Vec<GalaxyMeta>, MaterializeError> {
    let root = collections_dir.join("ansible_collections");
    let mut found = Vec::new();

    let namespaces = match std::fs::read_dir(&root) {
        Ok(entries) => entries,
        Err(_) => return Ok(found),
    };

    for namespace_entry in namespaces.flatten() {
        if !namespace_entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            continue;
        }
        let collections = match std::fs::read_dir(namespace_entry.path()) {
            Ok(entries) => entries,
            Err(_) => continue,
        };
        for collection_entry in collections.flatten() {
            let galaxy_yml = collection_entry.path().join("galaxy.yml");
            if !galaxy_yml.is_file() {
                continue;
            }
            let raw = std::fs::read_to_string(&galaxy_yml)?;
            if let Ok(meta) = serde_yaml::from_str::<GalaxyMeta>(&raw) {
                found.push(meta);
            }
        }
    }

    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_fqcn_role_returned_verbatim() {
        let got = resolve_fqcn("mycompany.infra.nginx", Path::new("/nonexistent"), None).unwrap();
        assert_eq!(got, "mycompany.infra.nginx");
    }

    #[test]
    fn primary_collection_drives_resolution() {
        let primary = PrimaryCollection {
            namespace: "mycompany".to_string(),
            name: "infra".to_string(),
        };
        let got = resolve_fqcn("nginx", Path::new("/nonexistent"), Some(&primary)).unwrap();
        assert_eq!(got, "mycompany.infra.nginx");
    }

    #[test]
    fn scans_galaxy_yml_when_no_primary_known() {
        let dir = tempfile::tempdir().unwrap();
        let coll_dir = dir.path().join("ansible_collections/mycompany/infra");
        std::fs::create_dir_all(&coll_dir).unwrap();
        std::fs::write(
            coll_dir.join("galaxy.yml"),
            "namespace: mycompany\nname: infra\nversion: 1.0.0\n",
        )
        .unwrap();

        let got = resolve_fqcn("nginx", dir.path(), None).unwrap();
        assert_eq!(got, "mycompany.infra.nginx");
    }

    #[test]
    fn ambiguous_when_multiple_collections_installed() {
        let dir = tempfile::tempdir().unwrap();
        for (ns, name) in [("mycompany", "infra"), ("other", "stuff")] {
            let coll_dir = dir.path().join(format!("ansible_collections/{ns}/{name}"));
            std::fs::create_dir_all(&coll_dir).unwrap();
            std::fs::write(
                coll_dir.join("galaxy.yml"),
                format!("namespace: {ns}\nname: {name}\nversion: 1.0.0\n"),
            )
            .unwrap();
        }

        let err = resolve_fqcn("nginx", dir.path(), None).unwrap_err();
        assert!(matches!(err, MaterializeError::AmbiguousCollection));
    }

    #[test]
    fn no_collection_installed_when_tree_empty() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_fqcn("nginx", dir.path(), None).unwrap_err();
        assert!(matches!(err, MaterializeError::NoCollectionInstalled));
    }
}
