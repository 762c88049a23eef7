//! Dotted-path interpreter for resolving `VarNode` values out of an
//! `AnalysisReport` serialized as `serde_json::Value`.
//!
//! Grammar: a path is a sequence of `.`-separated segments. A segment that is
//! an (optionally negative) run of digits addresses a list index; any other
//! non-empty segment addresses an object field/map key. Parsing is a
//! registry-time concern (bad syntax is `BAD_VAR_PATH`, a developer error);
//! walking the tree at evaluation time never errors — a missing intermediate,
//! an out-of-range index, or a type mismatch all just yield "not found" so the
//! node's configured default applies.

use serde_json::Value;

use crate::errors::RuntimeError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(i64),
}

#[derive(Debug, Clone)]
pub struct VarPath {
    raw: String,
    segments: Vec<PathSegment>,
}

impl VarPath {
    pub fn parse(raw: &str) -> Result<Self, RuntimeError> {
        if raw.is_empty() {
            return Err(RuntimeError::BadVarPath(raw.to_string()));
        }
        let mut segments = Vec::new();
        for part in raw.split('.') {
            if part.is_empty() {
                return Err(RuntimeError::BadVarPath(raw.to_string()));
            }
            segments.push(parse_segment(part));
        }
        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Walk the path against `report`; returns `None` for any missing
    /// intermediate, out-of-bounds index, or structural mismatch.
    #[must_use]
    pub fn resolve<'a>(&self, report: &'a Value) -> Option<&'a Value> {
        let mut current = report;
        for segment in &self.segments {
            current = match segment {
                PathSegment::Key(key) => current.as_object()?.get(key)?,
                PathSegment::Index(idx) => {
                    let arr = current.as_array()?;
                    let len = arr.len() as i64;
                    let real_idx = if *idx < 0 { len + idx } else { *idx };
                    if real_idx < 0 || real_idx >= len {
                        return None;
                    }
                    &arr[real_idx as usize]
                }
            };
        }
        Some(current)
    }
}

fn parse_segment(part: &str) -> PathSegment {
    let is_digits = part.strip_prefix('-').unwrap_or(part);
    if !is_digits.is_empty() && is_digits.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(idx) = part.parse::<i64>() {
            return PathSegment::Index(idx);
        }
    }
    PathSegment::Key(part.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejects_empty_path() {
        assert!(VarPath::parse("").is_err());
    }

    #[test]
    fn rejects_consecutive_dots() {
        assert!(VarPath::parse("technical..daily").is_err());
        assert!(VarPath::parse(".technical").is_err());
        assert!(VarPath::parse("technical.").is_err());
    }

    #[test]
    fn resolves_object_field_chain() {
        let report = json!({"technical": {"daily": {"key_indicators": {"RSI_14": 55.2}}}});
        let path = VarPath::parse("technical.daily.key_indicators.RSI_14").unwrap();
        assert_eq!(path.resolve(&report), Some(&json!(55.2)));
    }

    #[test]
    fn resolves_negative_list_index() {
        let report = json!({"forecasting": [{"task_id": "a"}, {"task_id": "b"}]});
        let path = VarPath::parse("forecasting.-1.task_id").unwrap();
        assert_eq!(path.resolve(&report), Some(&json!("b")));
    }

    #[test]
    fn out_of_range_index_resolves_to_none() {
        let report = json!({"forecasting": [{"task_id": "a"}]});
        let path = VarPath::parse("forecasting.5.task_id").unwrap();
        assert_eq!(path.resolve(&report), None);
    }

    #[test]
    fn missing_intermediate_resolves_to_none_not_error() {
        let report = json!({"technical": null});
        let path = VarPath::parse("technical.daily.key_indicators.RSI_14").unwrap();
        assert_eq!(path.resolve(&report), None);
    }

    #[test]
    fn type_mismatch_resolves_to_none() {
        let report = json!({"technical": {"daily": 42}});
        let path = VarPath::parse("technical.daily.key_indicators").unwrap();
        assert_eq!(path.resolve(&report), None);
    }
}
