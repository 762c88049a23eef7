//! Tree node kinds. Every node evaluates to a `float`; operators additionally
//! own their children, which structurally forbids cycles (a tree is a DAG of
//! owned `Box<dyn TreeNode>`s by construction).

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

use super::path::VarPath;
use super::types::SemanticType;

pub trait TreeNode: fmt::Debug + Send + Sync {
    /// The registry key this node was built from (upper-cased, unique).
    fn node_name(&self) -> &str;
    fn return_type(&self) -> SemanticType;
    fn evaluate(&self, report: &Value) -> f64;
    /// Owned children, empty for constants and variables.
    fn children(&self) -> &[Box<dyn TreeNode>] {
        &[]
    }
}

/// Linear interpolation from `source_range` to `target_range`, clamped at the
/// source endpoints before mapping.
pub fn normalize(value: f64, source_range: (f64, f64), target_range: (f64, f64)) -> f64 {
    let (s0, s1) = source_range;
    let (t0, t1) = target_range;
    if (s1 - s0).abs() < f64::EPSILON {
        return t0;
    }
    let clamped = value.clamp(s0.min(s1), s0.max(s1));
    let ratio = (clamped - s0) / (s1 - s0);
    t0 + ratio * (t1 - t0)
}

#[derive(Debug, Clone)]
pub struct ConstantNode {
    pub name: String,
    pub value: f64,
    pub return_type: SemanticType,
}

impl TreeNode for ConstantNode {
    fn node_name(&self) -> &str {
        &self.name
    }
    fn return_type(&self) -> SemanticType {
        self.return_type
    }
    fn evaluate(&self, _report: &Value) -> f64 {
        self.value
    }
}

#[derive(Debug, Clone)]
pub struct NumericalVarNode {
    pub name: String,
    pub path: VarPath,
    pub default: f64,
    pub source_range: (f64, f64),
    pub target_range: (f64, f64),
    pub return_type: SemanticType,
}

impl TreeNode for NumericalVarNode {
    fn node_name(&self) -> &str {
        &self.name
    }
    fn return_type(&self) -> SemanticType {
        self.return_type
    }
    fn evaluate(&self, report: &Value) -> f64 {
        let raw = self
            .path
            .resolve(report)
            .and_then(serde_json::Value::as_f64)
            .unwrap_or(self.default);
        normalize(raw, self.source_range, self.target_range)
    }
}

#[derive(Debug, Clone)]
pub struct CategoricalVarNode {
    pub name: String,
    pub path: VarPath,
    pub default: f64,
    pub mapping: HashMap<String, f64>,
    pub return_type: SemanticType,
}

impl TreeNode for CategoricalVarNode {
    fn node_name(&self) -> &str {
        &self.name
    }
    fn return_type(&self) -> SemanticType {
        self.return_type
    }
    fn evaluate(&self, report: &Value) -> f64 {
        let raw = self.path.resolve(report).and_then(serde_json::Value::as_str);
        raw.and_then(|s| self.mapping.get(s).copied())
            .unwrap_or(self.default)
    }
}

type OperatorFn = fn(&[f64]) -> f64;

pub struct FunctionalOperatorNode {
    pub name: String,
    pub children: Vec<Box<dyn TreeNode>>,
    pub return_type: SemanticType,
    pub func: OperatorFn,
}

impl fmt::Debug for FunctionalOperatorNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionalOperatorNode")
            .field("name", &self.name)
            .field("children", &self.children)
            .finish()
    }
}

impl TreeNode for FunctionalOperatorNode {
    fn node_name(&self) -> &str {
        &self.name
    }
    fn return_type(&self) -> SemanticType {
        self.return_type
    }
    fn evaluate(&self, report: &Value) -> f64 {
        let args: Vec<f64> = self.children.iter().map(|c| c.evaluate(report)).collect();
        (self.func)(&args)
    }
    fn children(&self) -> &[Box<dyn TreeNode>] {
        &self.children
    }
}

/// `if A then B else C`: evaluates `A`; if strictly positive, evaluates and
/// returns `B`, otherwise `C`. The untaken branch is never evaluated.
#[derive(Debug)]
pub struct BranchOperatorNode {
    pub name: String,
    pub children: Vec<Box<dyn TreeNode>>,
    pub return_type: SemanticType,
}

impl TreeNode for BranchOperatorNode {
    fn node_name(&self) -> &str {
        &self.name
    }
    fn return_type(&self) -> SemanticType {
        self.return_type
    }
    fn evaluate(&self, report: &Value) -> f64 {
        let condition = self.children[0].evaluate(report);
        if condition > 0.0 {
            self.children[1].evaluate(report)
        } else {
            self.children[2].evaluate(report)
        }
    }
    fn children(&self) -> &[Box<dyn TreeNode>] {
        &self.children
    }
}
