//! Canonical tree (de)serialization: `{"node_name": "<UPPERCASE_ID>", "children": [...]? }`.
//! `children` is present iff the node is an operator; constants and variables
//! carry no extra payload — their behavior lives entirely in the registry.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::nodes::TreeNode;
use super::registry::create_node;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedNode {
    pub node_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<SerializedNode>>,
}

#[must_use]
pub fn serialize_tree(node: &dyn TreeNode) -> SerializedNode {
    let children = node.children();
    SerializedNode {
        node_name: node.node_name().to_string(),
        children: if children.is_empty() {
            None
        } else {
            Some(children.iter().map(|c| serialize_tree(c.as_ref())).collect())
        },
    }
}

pub fn parse_tree(serialized: &SerializedNode) -> Result<Box<dyn TreeNode>> {
    let children = serialized
        .children
        .as_ref()
        .map(|kids| kids.iter().map(parse_tree).collect::<Result<Vec<_>>>())
        .transpose()?
        .unwrap_or_default();
    create_node(&serialized.node_name, None, children)
        .map_err(|e| anyhow!("failed to parse node '{}': {e}", serialized.node_name))
}

pub fn tree_to_json(node: &dyn TreeNode) -> Value {
    serde_json::to_value(serialize_tree(node)).expect("SerializedNode always serializes")
}

pub fn tree_from_json(value: &Value) -> Result<Box<dyn TreeNode>> {
    let serialized: SerializedNode = serde_json::from_value(value.clone())?;
    parse_tree(&serialized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_branch_tree() {
        let cond = super::create_node("CONST_0_5", None, vec![]).unwrap();
        let then_b = super::create_node("CONST_0_5", None, vec![]).unwrap();
        let else_b = super::create_node("CONST_NEG_1", None, vec![]).unwrap();
        let tree = super::create_node("IF_POS", None, vec![cond, then_b, else_b]).unwrap();

        let json = tree_to_json(tree.as_ref());
        assert_eq!(json["node_name"], "IF_POS");
        assert_eq!(json["children"].as_array().unwrap().len(), 3);

        let rebuilt = tree_from_json(&json).unwrap();
        assert_eq!(rebuilt.evaluate(&Value::Null), tree.evaluate(&Value::Null));
    }

    #[test]
    fn leaf_nodes_carry_no_children_key() {
        let node = super::create_node("CONST_0_5", None, vec![]).unwrap();
        let json = tree_to_json(node.as_ref());
        assert!(json.get("children").is_none());
    }

    #[test]
    fn unknown_node_name_fails_to_parse() {
        let bad = json!({"node_name": "NOPE_NOT_REGISTERED"});
        assert!(tree_from_json(&bad).is_err());
    }
}
