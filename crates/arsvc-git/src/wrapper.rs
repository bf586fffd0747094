use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// A single-play document, serialized structurally (not via string
/// templating) so it round-trips cleanly through the external Ansible
/// tool, which will load it again as YAML.
#[derive(Debug, Serialize)]
struct Play {
    name: String,
    hosts: String,
    gather_facts: bool,
    roles: Vec<RoleEntry>,
}

#[derive(Debug, Serialize)]
struct RoleEntry {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    vars: Option<BTreeMap<String, Value>>,
}

/// Produces `[{name: "Run role <fqcn>", hosts: "all", gather_facts: true,
/// roles: [{role: <fqcn>, vars?: <role_vars>}]}]`. `vars` is omitted when
/// `role_vars` is empty.
pub fn wrapper_playbook(fqcn: &str, role_vars: &BTreeMap<String, Value>) -> anyhow::Result<String> {
    let play = Play {
        name: format!("Run role {fqcn}"),
        hosts: "all".to_string(),
        gather_facts: true,
        roles: vec![RoleEntry {
            role: fqcn.to_string(),
            vars: if role_vars.is_empty() {
                None
            } else {
                Some(role_vars.clone())
            },
        }],
    };

    Ok(serde_yaml::to_string(&vec![play])?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapper_omits_vars_when_empty() {
        let yaml = wrapper_playbook("mycompany.infra.nginx", &BTreeMap::new()).unwrap();
        assert!(yaml.contains("role: mycompany.infra.nginx"));
        assert!(!yaml.contains("vars:"));
    }

    #[test]
    fn wrapper_includes_vars_when_present() {
        let mut vars = BTreeMap::new();
        vars.insert("port".to_string(), Value::from(80));
        let yaml = wrapper_playbook("mycompany.infra.nginx", &vars).unwrap();
        assert!(yaml.contains("vars:"));
        assert!(yaml.contains("port: 80"));
    }

    #[test]
    fn wrapper_round_trips_as_a_single_play_list() {
        let yaml = wrapper_playbook("ns.coll.role", &BTreeMap::new()).unwrap();
        let parsed: Vec<serde_yaml::Value> = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(
            parsed[0]["hosts"].as_str().unwrap(),
            "all"
        );
    }
}
