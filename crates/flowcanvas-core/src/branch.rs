//! Branch extraction for splitting nodes.
//!
//! Branch cardinality and labels live in the node's free-form `config`
//! object. Several historical field names are accepted for the same data.

use crate::{NodeType, OUTPUT_PORT, PortId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One labelled outgoing path of a splitting node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    pub id: String,
    pub label: String,
    pub order: usize,
    #[serde(default)]
    pub is_default: bool,
}

impl Branch {
    fn new(id: impl Into<String>, label: impl Into<String>, order: usize) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            order,
            is_default: false,
        }
    }

    fn default_branch(id: impl Into<String>, label: impl Into<String>, order: usize) -> Self {
        Self {
            is_default: true,
            ..Self::new(id, label, order)
        }
    }

    /// Output port id carrying this branch.
    pub fn port_id(&self) -> PortId {
        PortId::new(format!("{OUTPUT_PORT}-{}", self.id))
    }
}

pub const UNMATCHED_BRANCH_ID: &str = "unmatch_default";
pub const UNMATCHED_BRANCH_LABEL: &str = "unmatched";

/// Upper bound on generated A/B groups; one per letter keeps ids unique.
pub const MAX_SPLIT_GROUPS: usize = 26;

const CROWD_NAME_KEYS: [&str; 4] = ["crowdName", "name", "audienceName", "label"];

/// Branches of a node of `node_type` configured with `config`.
///
/// Non-splitting node types never have branches.
pub fn branches_for(node_type: NodeType, config: &Value) -> Vec<Branch> {
    if !node_type.is_branching() {
        return Vec::new();
    }

    if let Some(stored) = stored_branches(config) {
        return stored;
    }

    match node_type {
        NodeType::CrowdSplit => crowd_split_branches(config),
        NodeType::EventSplit => event_split_branches(config),
        NodeType::AbTest => ab_test_branches(config),
        _ => Vec::new(),
    }
}

/// Output port ids of a node, paired with the branch each one carries.
pub fn output_port_ids(
    node_type: NodeType,
    branches: &[Branch],
) -> Vec<(PortId, Option<String>)> {
    if !node_type.has_output() {
        return Vec::new();
    }
    if node_type.is_branching() {
        return branches
            .iter()
            .map(|branch| (branch.port_id(), Some(branch.id.clone())))
            .collect();
    }
    vec![(PortId::new(OUTPUT_PORT), None)]
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn id_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn non_empty_array<'a>(value: &'a Value, key: &str) -> Option<&'a Vec<Value>> {
    value
        .get(key)
        .and_then(Value::as_array)
        .filter(|items| !items.is_empty())
}

fn is_truthy(value: &Value, key: &str) -> bool {
    match value.get(key) {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

/// Branches persisted on the node itself; used only when every entry has an id.
fn stored_branches(config: &Value) -> Option<Vec<Branch>> {
    let items = non_empty_array(config, "branches")?;
    let mut branches = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let id = id_field(item, "id")?;
        let label = str_field(item, "label")
            .or_else(|| str_field(item, "crowdName"))
            .map(str::to_string)
            .unwrap_or_else(|| format!("Branch {}", index + 1));
        let is_default = item
            .get("isDefault")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        branches.push(Branch {
            id,
            label,
            order: index + 1,
            is_default,
        });
    }
    Some(branches)
}

fn crowd_items(config: &Value) -> Option<&Vec<Value>> {
    non_empty_array(config, "crowdLayers")
        .or_else(|| non_empty_array(config, "audiences"))
        .or_else(|| {
            let nested = config.get("config")?;
            non_empty_array(nested, "crowdLayers").or_else(|| non_empty_array(nested, "audiences"))
        })
}

fn crowd_split_branches(config: &Value) -> Vec<Branch> {
    let Some(items) = crowd_items(config) else {
        if is_truthy(config, "isConfigured") {
            return vec![
                Branch::default_branch("default_branch_1", "Branch 1", 1),
                Branch::default_branch("default_branch_2", "Branch 2", 2),
            ];
        }
        return Vec::new();
    };

    let mut branches: Vec<Branch> = items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let label = CROWD_NAME_KEYS
                .iter()
                .find_map(|key| str_field(item, key))
                .map(str::to_string)
                .unwrap_or_else(|| format!("Crowd {}", index + 1));
            let id = id_field(item, "id").unwrap_or_else(|| format!("audience_{index}"));
            Branch::new(id, label, index + 1)
        })
        .collect();

    // Exactly one catch-all branch, configured or generated.
    let order = branches.len() + 1;
    let unmatched = match config.get("unmatchBranch").filter(|v| v.is_object()) {
        Some(unmatch) => Branch::default_branch(
            id_field(unmatch, "id").unwrap_or_else(|| UNMATCHED_BRANCH_ID.to_string()),
            str_field(unmatch, "name")
                .or_else(|| str_field(unmatch, "crowdName"))
                .unwrap_or(UNMATCHED_BRANCH_LABEL),
            order,
        ),
        None => Branch::default_branch(UNMATCHED_BRANCH_ID, UNMATCHED_BRANCH_LABEL, order),
    };
    branches.push(unmatched);
    branches
}

fn event_split_branches(config: &Value) -> Vec<Branch> {
    let configured = ["eventCondition", "yesLabel", "noLabel", "isConfigured"]
        .iter()
        .any(|key| is_truthy(config, key));
    if !configured {
        return Vec::new();
    }
    vec![
        Branch::new("event_yes", str_field(config, "yesLabel").unwrap_or("yes"), 1),
        Branch::new("event_no", str_field(config, "noLabel").unwrap_or("no"), 2),
    ]
}

fn ab_test_branches(config: &Value) -> Vec<Branch> {
    if let Some(versions) = non_empty_array(config, "versions") {
        return versions
            .iter()
            .enumerate()
            .map(|(index, version)| {
                let id = id_field(version, "id").unwrap_or_else(|| format!("version_{index}"));
                let label = str_field(version, "name")
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Version {}", index + 1));
                Branch::new(id, label, index + 1)
            })
            .collect();
    }

    if let Some(count) = config.get("splitCount").and_then(Value::as_u64) {
        let count = usize::try_from(count).map_or(MAX_SPLIT_GROUPS, |c| c.min(MAX_SPLIT_GROUPS));
        return (0..count)
            .map(|index| {
                let letter = char::from(b'A' + index as u8);
                Branch::new(
                    format!("group_{}", letter.to_ascii_lowercase()),
                    format!("Group {letter}"),
                    index + 1,
                )
            })
            .collect();
    }

    let configured = ["groupALabel", "groupBLabel", "groupARatio", "groupBRatio"]
        .iter()
        .any(|key| is_truthy(config, key));
    if configured {
        return vec![
            Branch::new("group_a", str_field(config, "groupALabel").unwrap_or("Group A"), 1),
            Branch::new("group_b", str_field(config, "groupBLabel").unwrap_or("Group B"), 2),
        ];
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_crowd_split_adds_generated_unmatched_branch() {
        let config = json!({
            "crowdLayers": [{"crowdName": "VIP"}, {"crowdName": "Normal"}]
        });
        let branches = branches_for(NodeType::CrowdSplit, &config);

        let labels: Vec<_> = branches.iter().map(|b| b.label.as_str()).collect();
        assert_eq!(labels, vec!["VIP", "Normal", "unmatched"]);
        assert!(branches[2].is_default);
        assert_eq!(branches[2].order, 3);
        assert_eq!(output_port_ids(NodeType::CrowdSplit, &branches).len(), 3);
    }

    #[test]
    fn test_crowd_split_uses_configured_unmatched_branch() {
        let config = json!({
            "audiences": [{"id": 7, "name": "Dormant"}],
            "unmatchBranch": {"id": "rest", "name": "Everyone else"}
        });
        let branches = branches_for(NodeType::CrowdSplit, &config);
        assert_eq!(branches.len(), 2);
        assert_eq!(branches[0].id, "7");
        assert_eq!(branches[1].id, "rest");
        assert_eq!(branches[1].label, "Everyone else");
    }

    #[test]
    fn test_crowd_split_reads_nested_config() {
        let config = json!({"config": {"crowdLayers": [{"label": "New"}]}});
        let branches = branches_for(NodeType::CrowdSplit, &config);
        assert_eq!(branches[0].label, "New");
        assert_eq!(branches[0].id, "audience_0");
    }

    #[test]
    fn test_unconfigured_split_has_no_branches() {
        assert!(branches_for(NodeType::CrowdSplit, &json!({})).is_empty());
        assert!(branches_for(NodeType::EventSplit, &Value::Null).is_empty());
        assert!(branches_for(NodeType::AbTest, &json!({})).is_empty());
        assert_eq!(
            branches_for(NodeType::CrowdSplit, &json!({"isConfigured": true})).len(),
            2
        );
    }

    #[test]
    fn test_event_split_yes_no() {
        let branches = branches_for(NodeType::EventSplit, &json!({"yesLabel": "Opened"}));
        assert_eq!(branches[0].label, "Opened");
        assert_eq!(branches[1].label, "no");
    }

    #[test]
    fn test_ab_test_split_count() {
        let branches = branches_for(NodeType::AbTest, &json!({"splitCount": 3}));
        let labels: Vec<_> = branches.iter().map(|b| b.label.as_str()).collect();
        assert_eq!(labels, vec!["Group A", "Group B", "Group C"]);
        assert_eq!(branches[2].port_id(), PortId::new("out-group_c"));
    }

    #[test]
    fn test_ab_test_split_count_is_bounded_and_unique() {
        let branches = branches_for(NodeType::AbTest, &json!({"splitCount": 4294967296u64}));
        assert_eq!(branches.len(), MAX_SPLIT_GROUPS);
        assert_eq!(branches[25].id, "group_z");

        let mut ports: Vec<PortId> = branches.iter().map(Branch::port_id).collect();
        ports.sort();
        ports.dedup();
        assert_eq!(ports.len(), MAX_SPLIT_GROUPS);
    }

    #[test]
    fn test_stored_branches_override_generation() {
        let config = json!({
            "branches": [{"id": "x", "label": "X"}, {"id": "y"}],
            "crowdLayers": [{"crowdName": "ignored"}]
        });
        let branches = branches_for(NodeType::CrowdSplit, &config);
        assert_eq!(branches.len(), 2);
        assert_eq!(branches[1].label, "Branch 2");
    }

    #[test]
    fn test_plain_nodes_have_single_output() {
        let ports = output_port_ids(NodeType::Sms, &[]);
        assert_eq!(ports, vec![(PortId::new(OUTPUT_PORT), None)]);
        assert!(output_port_ids(NodeType::End, &[]).is_empty());
        assert!(branches_for(NodeType::Sms, &json!({"splitCount": 3})).is_empty());
    }
}
