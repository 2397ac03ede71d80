use std::collections::HashMap;

use aitoys_domain::model::CostBreakdown;
use serde::{Deserialize, Serialize};

/// Dollars per million tokens for a specific model, used by the metrics
/// recorder to compute `AiMetric.cost` without a round trip to the
/// provider's billing API.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_per_1m: f64,
    pub output_per_1m: f64,
}

impl ModelPricing {
    pub fn estimate_cost(&self, input_tokens: u32, output_tokens: u32) -> CostBreakdown {
        let input_cost = input_tokens as f64 * self.input_per_1m / 1_000_000.0;
        let output_cost = output_tokens as f64 * self.output_per_1m / 1_000_000.0;
        CostBreakdown {
            input_cost,
            output_cost,
            total_cost: input_cost + output_cost,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PricingTable {
    by_model: HashMap<String, ModelPricing>,
}

impl PricingTable {
    pub fn new(entries: HashMap<String, ModelPricing>) -> Self {
        Self { by_model: entries }
    }

    /// Zero-cost fallback when a model has no configured pricing entry;
    /// metrics still record token counts, the cost fields are just zero.
    pub fn estimate(&self, model: &str, input_tokens: u32, output_tokens: u32) -> CostBreakdown {
        self.by_model
            .get(model)
            .map(|p| p.estimate_cost(input_tokens, output_tokens))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_cost_scales_linearly_with_tokens() {
        let pricing = ModelPricing {
            input_per_1m: 5.0,
            output_per_1m: 15.0,
        };
        let cost = pricing.estimate_cost(1_000_000, 1_000_000);
        assert_eq!(cost.input_cost, 5.0);
        assert_eq!(cost.output_cost, 15.0);
        assert_eq!(cost.total_cost, 20.0);
    }

    #[test]
    fn unknown_model_falls_back_to_zero_cost() {
        let table = PricingTable::default();
        let cost = table.estimate("unknown-model", 1000, 500);
        assert_eq!(cost.total_cost, 0.0);
    }

    #[test]
    fn known_model_uses_its_pricing_entry() {
        let mut entries = HashMap::new();
        entries.insert(
            "gpt-4o".to_string(),
            ModelPricing {
                input_per_1m: 2.5,
                output_per_1m: 10.0,
            },
        );
        let table = PricingTable::new(entries);
        let cost = table.estimate("gpt-4o", 500_000, 200_000);
        assert!((cost.total_cost - (1.25 + 2.0)).abs() < 1e-9);
    }
}
