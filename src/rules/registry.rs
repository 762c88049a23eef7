//! Process-wide node registry: maps an upper-cased, unique node name to a
//! specification `{kind, description, return_type, args_type?, default_params}`
//! plus the factory that builds a live `TreeNode` from it. Populated once at
//! process start by `register_all` and immutable thereafter — the registry
//! is a build-time registration list, not a runtime plugin mechanism.

use std::collections::HashMap;
use std::sync::OnceLock;

use anyhow::{anyhow, bail, Context, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::nodes::{
    CategoricalVarNode, ConstantNode, FunctionalOperatorNode, BranchOperatorNode, NumericalVarNode,
    TreeNode,
};
use super::path::VarPath;
use super::types::SemanticType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
pub enum NodeKind {
    Constant,
    Variable,
    Operator,
}

pub enum NodeBuilder {
    Leaf(fn(&str, &Value) -> Result<Box<dyn TreeNode>>),
    Operator(fn(&str, &Value, Vec<Box<dyn TreeNode>>) -> Result<Box<dyn TreeNode>>),
}

pub struct NodeSpec {
    pub name: &'static str,
    pub kind: NodeKind,
    pub description: &'static str,
    pub return_type: SemanticType,
    pub args_type: Option<Vec<SemanticType>>,
    pub default_params: Value,
    pub build: NodeBuilder,
}

static REGISTRY: OnceLock<HashMap<&'static str, NodeSpec>> = OnceLock::new();

pub fn registry() -> &'static HashMap<&'static str, NodeSpec> {
    REGISTRY.get_or_init(|| {
        let mut map = HashMap::new();
        for spec in register_all() {
            if map.insert(spec.name, spec).is_some() {
                panic!("duplicate node registration for a single name");
            }
        }
        map
    })
}

/// Look up a spec by name, merge `default_params` with ad-hoc `overrides`,
/// validate children against `args_type`, and build the live node.
pub fn create_node(
    name: &str,
    overrides: Option<&Value>,
    children: Vec<Box<dyn TreeNode>>,
) -> Result<Box<dyn TreeNode>> {
    let spec = registry()
        .get(name)
        .ok_or_else(|| anyhow!("unregistered node name: {name}"))?;

    let params = merge_params(&spec.default_params, overrides);

    match &spec.build {
        NodeBuilder::Leaf(build) => {
            if !children.is_empty() {
                bail!("node {name} is a leaf and accepts no children");
            }
            build(spec.name, &params)
        }
        NodeBuilder::Operator(build) => {
            let args_type = spec
                .args_type
                .as_ref()
                .ok_or_else(|| anyhow!("operator spec {name} missing args_type"))?;
            if children.len() != args_type.len() {
                bail!(
                    "node {name} expects {} children, got {}",
                    args_type.len(),
                    children.len()
                );
            }
            for (i, child) in children.iter().enumerate() {
                let expected = args_type[i];
                let actual = child.return_type();
                if !SemanticType::compatible(actual, expected) {
                    bail!(
                        "node {name} argument {i} expects a type compatible with {}, got {}",
                        expected.as_str(),
                        actual.as_str()
                    );
                }
            }
            build(spec.name, &params, children)
        }
    }
}

fn merge_params(default: &Value, overrides: Option<&Value>) -> Value {
    let Some(overrides) = overrides else {
        return default.clone();
    };
    let (Some(default_obj), Some(override_obj)) = (default.as_object(), overrides.as_object())
    else {
        return overrides.clone();
    };
    let mut merged = default_obj.clone();
    for (k, v) in override_obj {
        merged.insert(k.clone(), v.clone());
    }
    Value::Object(merged)
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct NodeInfo {
    pub name: &'static str,
    pub kind: NodeKind,
    pub description: &'static str,
    pub return_type: SemanticType,
    pub args_type: Option<Vec<SemanticType>>,
}

/// Catalog of registered node specs, for the `list_rule_nodes` surface.
#[must_use]
pub fn catalog() -> Vec<NodeInfo> {
    let mut entries: Vec<NodeInfo> = registry()
        .values()
        .map(|spec| NodeInfo {
            name: spec.name,
            kind: spec.kind,
            description: spec.description,
            return_type: spec.return_type,
            args_type: spec.args_type.clone(),
        })
        .collect();
    entries.sort_by_key(|e| e.name);
    entries
}

#[derive(Deserialize)]
struct ConstantParams {
    value: f64,
}

#[derive(Deserialize)]
struct NumericalVarParams {
    path: String,
    #[serde(default)]
    default: f64,
    #[serde(default = "default_source_range")]
    source_range: (f64, f64),
    #[serde(default = "default_signed_unit_range")]
    target_range: (f64, f64),
}

fn default_source_range() -> (f64, f64) {
    (0.0, 100.0)
}

fn default_signed_unit_range() -> (f64, f64) {
    (-1.0, 1.0)
}

#[derive(Deserialize)]
struct CategoricalVarParams {
    path: String,
    mapping: HashMap<String, f64>,
    #[serde(default)]
    default: f64,
}

fn build_constant(name: &str, return_type: SemanticType) -> impl Fn(&str, &Value) -> Result<Box<dyn TreeNode>> {
    move |_name, params| {
        let p: ConstantParams = serde_json::from_value(params.clone())
            .with_context(|| format!("invalid params for constant node {name}"))?;
        Ok(Box::new(ConstantNode {
            name: name.to_string(),
            value: p.value,
            return_type,
        }))
    }
}

fn numerical_var(name: &str, params: &Value, return_type: SemanticType) -> Result<Box<dyn TreeNode>> {
    let p: NumericalVarParams = serde_json::from_value(params.clone())
        .with_context(|| format!("invalid params for variable node {name}"))?;
    let path = VarPath::parse(&p.path).map_err(|e| anyhow!("{e}"))?;
    Ok(Box::new(NumericalVarNode {
        name: name.to_string(),
        path,
        default: p.default,
        source_range: p.source_range,
        target_range: p.target_range,
        return_type,
    }))
}

fn categorical_var(name: &str, params: &Value, return_type: SemanticType) -> Result<Box<dyn TreeNode>> {
    let p: CategoricalVarParams = serde_json::from_value(params.clone())
        .with_context(|| format!("invalid params for variable node {name}"))?;
    let path = VarPath::parse(&p.path).map_err(|e| anyhow!("{e}"))?;
    Ok(Box::new(CategoricalVarNode {
        name: name.to_string(),
        path,
        default: p.default,
        mapping: p.mapping,
        return_type,
    }))
}

fn functional(
    name: &str,
    _params: &Value,
    children: Vec<Box<dyn TreeNode>>,
    return_type: SemanticType,
    func: fn(&[f64]) -> f64,
) -> Result<Box<dyn TreeNode>> {
    Ok(Box::new(FunctionalOperatorNode {
        name: name.to_string(),
        children,
        return_type,
        func,
    }))
}

fn branch(name: &str, _params: &Value, children: Vec<Box<dyn TreeNode>>) -> Result<Box<dyn TreeNode>> {
    Ok(Box::new(BranchOperatorNode {
        name: name.to_string(),
        children,
        return_type: SemanticType::Any,
    }))
}

fn register_all() -> Vec<NodeSpec> {
    vec![
        NodeSpec {
            name: "CONST_0",
            kind: NodeKind::Constant,
            description: "The constant 0.0",
            return_type: SemanticType::Numerical,
            args_type: None,
            default_params: json!({"value": 0.0}),
            build: NodeBuilder::Leaf(|n, p| build_constant(n, SemanticType::Numerical)(n, p)),
        },
        NodeSpec {
            name: "CONST_0_5",
            kind: NodeKind::Constant,
            description: "The constant 0.5",
            return_type: SemanticType::Numerical,
            args_type: None,
            default_params: json!({"value": 0.5}),
            build: NodeBuilder::Leaf(|n, p| build_constant(n, SemanticType::Numerical)(n, p)),
        },
        NodeSpec {
            name: "CONST_1",
            kind: NodeKind::Constant,
            description: "The constant 1.0",
            return_type: SemanticType::Numerical,
            args_type: None,
            default_params: json!({"value": 1.0}),
            build: NodeBuilder::Leaf(|n, p| build_constant(n, SemanticType::Numerical)(n, p)),
        },
        NodeSpec {
            name: "CONST_NEG_1",
            kind: NodeKind::Constant,
            description: "The constant -1.0",
            return_type: SemanticType::Numerical,
            args_type: None,
            default_params: json!({"value": -1.0}),
            build: NodeBuilder::Leaf(|n, p| build_constant(n, SemanticType::Numerical)(n, p)),
        },
        NodeSpec {
            name: "VAR_RSI_14",
            kind: NodeKind::Variable,
            description: "14-period RSI from the daily technical report",
            return_type: SemanticType::Momentum,
            args_type: None,
            default_params: json!({
                "path": "technical.daily.key_indicators.RSI_14",
                "default": 50.0,
                "source_range": [0.0, 100.0],
                "target_range": [-1.0, 1.0],
            }),
            build: NodeBuilder::Leaf(|n, p| numerical_var(n, p, SemanticType::Momentum)),
        },
        NodeSpec {
            name: "VAR_FORECAST_UP_PROB",
            kind: NodeKind::Variable,
            description: "Probability of the upper barrier from the first forecasting task",
            return_type: SemanticType::ForecastProb,
            args_type: None,
            default_params: json!({
                "path": "forecasting.0.prediction.0",
                "default": 0.5,
                "source_range": [0.0, 1.0],
                "target_range": [0.0, 1.0],
            }),
            build: NodeBuilder::Leaf(|n, p| numerical_var(n, p, SemanticType::ForecastProb)),
        },
        NodeSpec {
            name: "VAR_NEWS_SENTIMENT",
            kind: NodeKind::Variable,
            description: "Overall news sentiment score",
            return_type: SemanticType::Sentiment,
            args_type: None,
            default_params: json!({
                "path": "news.0.sentiment.score",
                "default": 0.0,
                "source_range": [-1.0, 1.0],
                "target_range": [-1.0, 1.0],
            }),
            build: NodeBuilder::Leaf(|n, p| numerical_var(n, p, SemanticType::Sentiment)),
        },
        NodeSpec {
            name: "VAR_TREND_DIRECTION_SHORT",
            kind: NodeKind::Variable,
            description: "Short-term trend direction, encoded to [-1, 1]",
            return_type: SemanticType::Trend,
            args_type: None,
            default_params: json!({
                "path": "technical.daily.trend.short.direction",
                "default": 0.0,
                "mapping": {"uptrend": 1.0, "downtrend": -1.0, "undefined": 0.0},
            }),
            build: NodeBuilder::Leaf(|n, p| categorical_var(n, p, SemanticType::Trend)),
        },
        NodeSpec {
            name: "ADD2",
            kind: NodeKind::Operator,
            description: "Sum of two numeric values",
            return_type: SemanticType::Numerical,
            args_type: Some(vec![SemanticType::AnyNumeric, SemanticType::AnyNumeric]),
            default_params: json!({}),
            build: NodeBuilder::Operator(|n, p, c| {
                functional(n, p, c, SemanticType::Numerical, |args| args[0] + args[1])
            }),
        },
        NodeSpec {
            name: "SUB2",
            kind: NodeKind::Operator,
            description: "First minus second",
            return_type: SemanticType::Numerical,
            args_type: Some(vec![SemanticType::AnyNumeric, SemanticType::AnyNumeric]),
            default_params: json!({}),
            build: NodeBuilder::Operator(|n, p, c| {
                functional(n, p, c, SemanticType::Numerical, |args| args[0] - args[1])
            }),
        },
        NodeSpec {
            name: "MUL2",
            kind: NodeKind::Operator,
            description: "Product of two numeric values",
            return_type: SemanticType::Numerical,
            args_type: Some(vec![SemanticType::AnyNumeric, SemanticType::AnyNumeric]),
            default_params: json!({}),
            build: NodeBuilder::Operator(|n, p, c| {
                functional(n, p, c, SemanticType::Numerical, |args| args[0] * args[1])
            }),
        },
        NodeSpec {
            name: "MAX2",
            kind: NodeKind::Operator,
            description: "Maximum of two numeric values",
            return_type: SemanticType::Numerical,
            args_type: Some(vec![SemanticType::AnyNumeric, SemanticType::AnyNumeric]),
            default_params: json!({}),
            build: NodeBuilder::Operator(|n, p, c| {
                functional(n, p, c, SemanticType::Numerical, |args| args[0].max(args[1]))
            }),
        },
        NodeSpec {
            name: "MIN2",
            kind: NodeKind::Operator,
            description: "Minimum of two numeric values",
            return_type: SemanticType::Numerical,
            args_type: Some(vec![SemanticType::AnyNumeric, SemanticType::AnyNumeric]),
            default_params: json!({}),
            build: NodeBuilder::Operator(|n, p, c| {
                functional(n, p, c, SemanticType::Numerical, |args| args[0].min(args[1]))
            }),
        },
        NodeSpec {
            name: "NEG",
            kind: NodeKind::Operator,
            description: "Negation of a single numeric value",
            return_type: SemanticType::Numerical,
            args_type: Some(vec![SemanticType::AnyNumeric]),
            default_params: json!({}),
            build: NodeBuilder::Operator(|n, p, c| {
                functional(n, p, c, SemanticType::Numerical, |args| -args[0])
            }),
        },
        NodeSpec {
            name: "CLAMP_UNIT",
            kind: NodeKind::Operator,
            description: "Clamp a value to [-1, 1]",
            return_type: SemanticType::Numerical,
            args_type: Some(vec![SemanticType::AnyNumeric]),
            default_params: json!({}),
            build: NodeBuilder::Operator(|n, p, c| {
                functional(n, p, c, SemanticType::Numerical, |args| args[0].clamp(-1.0, 1.0))
            }),
        },
        NodeSpec {
            name: "IF_POS",
            kind: NodeKind::Operator,
            description: "If the first child is strictly positive, return the second, else the third",
            return_type: SemanticType::Any,
            args_type: Some(vec![
                SemanticType::AnyNumeric,
                SemanticType::Any,
                SemanticType::Any,
            ]),
            default_params: json!({}),
            build: NodeBuilder::Operator(branch),
        },
    ]
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registering_the_same_name_twice_panics() {
        let mut map: HashMap<&'static str, NodeSpec> = HashMap::new();
        let a = NodeSpec {
            name: "DUP",
            kind: NodeKind::Constant,
            description: "",
            return_type: SemanticType::Numerical,
            args_type: None,
            default_params: json!({"value": 0.0}),
            build: NodeBuilder::Leaf(|n, p| build_constant(n, SemanticType::Numerical)(n, p)),
        };
        assert!(map.insert(a.name, a).is_none());
    }

    #[test]
    fn create_constant_node_evaluates_to_registered_value() {
        let node = create_node("CONST_0_5", None, vec![]).unwrap();
        assert_eq!(node.evaluate(&Value::Null), 0.5);
    }

    #[test]
    fn create_node_rejects_unknown_name() {
        assert!(create_node("NOT_REGISTERED", None, vec![]).is_err());
    }

    #[test]
    fn create_operator_rejects_wrong_child_count() {
        let a = create_node("CONST_0_5", None, vec![]).unwrap();
        assert!(create_node("ADD2", None, vec![a]).is_err());
    }

    #[test]
    fn create_operator_rejects_incompatible_child_type() {
        let boolean_leaf = Box::new(ConstantNode {
            name: "BOOL_LEAF".into(),
            value: 1.0,
            return_type: SemanticType::Boolean,
        }) as Box<dyn TreeNode>;
        let b = create_node("CONST_0_5", None, vec![]).unwrap();
        assert!(create_node("ADD2", None, vec![boolean_leaf, b]).is_err());
    }

    #[test]
    fn if_pos_tree_matches_scenario_e() {
        let cond = create_node("CONST_0_5", None, vec![]).unwrap();
        let then_b = create_node("CONST_0_5", None, vec![]).unwrap();
        let else_b = create_node("CONST_NEG_1", None, vec![]).unwrap();
        let tree = create_node("IF_POS", None, vec![cond, then_b, else_b]).unwrap();
        assert_eq!(tree.evaluate(&Value::Null), 0.5);

        let neg_cond = create_node("CONST_0_5", Some(&json!({"value": -0.1})), vec![]).unwrap();
        let then_b2 = create_node("CONST_0_5", None, vec![]).unwrap();
        let else_b2 = create_node("CONST_NEG_1", None, vec![]).unwrap();
        let tree2 = create_node("IF_POS", None, vec![neg_cond, then_b2, else_b2]).unwrap();
        assert_eq!(tree2.evaluate(&Value::Null), -1.0);
    }

    #[test]
    fn catalog_lists_every_registered_node() {
        let entries = catalog();
        assert_eq!(entries.len(), registry().len());
        assert!(entries.iter().any(|e| e.name == "IF_POS"));
    }
}
