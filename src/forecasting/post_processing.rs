//! Ordered post-processor pipeline applied to a raw prediction vector before
//! it's wrapped into a `SingleTaskForecastReport`. Each processor enforces one
//! semantic constraint or unit transform; they compose by running in
//! sequence over a named `{target -> value}` row.

use std::collections::HashMap;

/// The targets an n-day distribution task predicts, in the fixed order every
/// processor below assumes.
pub const NDIST_TARGETS: [&str; 6] = ["mean", "std", "min", "max", "q25", "q75"];

pub trait PostProcessor: Send + Sync {
    fn apply(&self, row: &mut HashMap<String, f64>);
}

/// Clamps an n-day distribution prediction into a self-consistent shape:
/// `std >= 0`; if `min > max` both collapse to their mean; `mean`/`q25`/`q75`
/// clip into `[min, max]`; if `q25 > q75` both collapse to their mean.
pub struct NDayDistributionProcessor;

impl PostProcessor for NDayDistributionProcessor {
    fn apply(&self, row: &mut HashMap<String, f64>) {
        let get = |row: &HashMap<String, f64>, k: &str| row.get(k).copied().unwrap_or(0.0);

        if let Some(std) = row.get_mut("std") {
            *std = std.max(0.0);
        }

        let mut min = get(row, "min");
        let mut max = get(row, "max");
        if min > max {
            let mid = (min + max) / 2.0;
            min = mid;
            max = mid;
            row.insert("min".to_string(), min);
            row.insert("max".to_string(), max);
        }

        for target in ["mean", "q25", "q75"] {
            if let Some(value) = row.get_mut(target) {
                *value = value.clamp(min, max);
            }
        }

        let mut q25 = get(row, "q25");
        let mut q75 = get(row, "q75");
        if q25 > q75 {
            let mid = (q25 + q75) / 2.0;
            q25 = mid;
            q75 = mid;
            row.insert("q25".to_string(), q25);
            row.insert("q75".to_string(), q75);
        }
    }
}

/// Maps percentage-space forecasts to absolute price levels given a base
/// price. `std`-like targets are scale-only (`base * pct`); every other
/// target is `base * (1 + pct)`.
pub struct DenormalizationProcessor {
    pub base_price: f64,
    pub scale_only_targets: Vec<String>,
}

impl PostProcessor for DenormalizationProcessor {
    fn apply(&self, row: &mut HashMap<String, f64>) {
        for (target, value) in row.iter_mut() {
            if self.scale_only_targets.iter().any(|t| t == target) {
                *value *= self.base_price;
            } else {
                *value = self.base_price * (1.0 + *value);
            }
        }
    }
}

/// Rounds every target to `decimals` places.
pub struct RoundingProcessor {
    pub decimals: i32,
}

impl PostProcessor for RoundingProcessor {
    fn apply(&self, row: &mut HashMap<String, f64>) {
        let factor = 10f64.powi(self.decimals);
        for value in row.values_mut() {
            *value = (*value * factor).round() / factor;
        }
    }
}

/// Runs `row` through every processor in order.
pub fn run_pipeline(row: &mut HashMap<String, f64>, pipeline: &[Box<dyn PostProcessor>]) {
    for processor in pipeline {
        processor.apply(row);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(mean: f64, std: f64, min: f64, q25: f64, q75: f64, max: f64) -> HashMap<String, f64> {
        let mut m = HashMap::new();
        m.insert("mean".to_string(), mean);
        m.insert("std".to_string(), std);
        m.insert("min".to_string(), min);
        m.insert("q25".to_string(), q25);
        m.insert("q75".to_string(), q75);
        m.insert("max".to_string(), max);
        m
    }

    #[test]
    fn negative_std_is_clamped_to_zero() {
        let mut r = row(0.0, -1.0, -1.0, -0.5, 0.5, 1.0);
        NDayDistributionProcessor.apply(&mut r);
        assert_eq!(r["std"], 0.0);
    }

    #[test]
    fn inverted_min_max_collapses_to_mean() {
        let mut r = row(0.0, 0.1, 5.0, 0.0, 0.0, -5.0);
        NDayDistributionProcessor.apply(&mut r);
        assert_eq!(r["min"], 0.0);
        assert_eq!(r["max"], 0.0);
    }

    #[test]
    fn quartiles_clip_into_min_max_and_resolve_inversion() {
        let mut r = row(0.0, 0.1, -1.0, 2.0, -2.0, 1.0);
        NDayDistributionProcessor.apply(&mut r);
        assert!(r["min"] <= r["q25"]);
        assert!(r["q25"] <= r["q75"]);
        assert!(r["q75"] <= r["max"]);
    }

    #[test]
    fn denormalization_scales_std_and_shifts_everything_else() {
        let mut r = HashMap::new();
        r.insert("mean".to_string(), 0.02);
        r.insert("std".to_string(), 0.01);
        let processor = DenormalizationProcessor {
            base_price: 100.0,
            scale_only_targets: vec!["std".to_string()],
        };
        processor.apply(&mut r);
        assert!((r["mean"] - 102.0).abs() < 1e-9);
        assert!((r["std"] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn rounding_processor_rounds_to_requested_decimals() {
        let mut r = HashMap::new();
        r.insert("mean".to_string(), 1.23456);
        RoundingProcessor { decimals: 2 }.apply(&mut r);
        assert!((r["mean"] - 1.23).abs() < 1e-9);
    }

    #[test]
    fn full_pipeline_produces_internally_consistent_row() {
        let mut r = row(0.5, -0.2, 2.0, 0.9, 0.1, -1.0);
        let pipeline: Vec<Box<dyn PostProcessor>> = vec![Box::new(NDayDistributionProcessor)];
        run_pipeline(&mut r, &pipeline);
        assert!(r["std"] >= 0.0);
        assert!(r["min"] <= r["q25"] && r["q25"] <= r["q75"] && r["q75"] <= r["max"]);
        assert!(r["min"] <= r["mean"] && r["mean"] <= r["max"]);
    }
}
