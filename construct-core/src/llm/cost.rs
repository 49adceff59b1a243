//! LLM cost calculation

use crate::llm::{ModelInfo, TokenUsage};
use std::collections::HashMap;

/// Cost per 1M tokens for different providers/models.
/// Prices are approximate and may vary by region/time.
pub struct LLMCostCalculator {
    /// Cost per 1M input tokens by provider/model
    input_costs: HashMap<String, f64>,
    /// Cost per 1M output tokens by provider/model
    output_costs: HashMap<String, f64>,
}

impl LLMCostCalculator {
    /// Create a new cost calculator with default pricing
    pub fn new() -> Self {
        let mut calculator = Self {
            input_costs: HashMap::new(),
            output_costs: HashMap::new(),
        };

        calculator.set_pricing("openai", "gpt-4o", 2.5, 10.0);
        calculator.set_pricing("openai", "gpt-4o-mini", 0.15, 0.6);
        calculator.set_pricing("openai", "gpt-4-turbo", 10.0, 30.0);

        calculator.set_pricing("gemini", "gemini-2.0-flash", 0.1, 0.4);
        calculator.set_pricing("gemini", "gemini-2.5-flash", 0.3, 2.5);
        calculator.set_pricing("gemini", "gemini-2.5-pro", 1.25, 10.0);
        calculator.set_pricing("gemini", "gemini-robotics-er-1.5-preview", 0.3, 2.5);

        calculator
    }

    /// Calculate cost in USD for token usage
    pub fn calculate_cost(&self, model_info: &ModelInfo, usage: &TokenUsage) -> f64 {
        let key = format!("{}:{}", model_info.provider, model_info.model_name);
        let wildcard = format!("{}:*", model_info.provider);

        let input_cost_per_million = self
            .input_costs
            .get(&key)
            .or_else(|| self.input_costs.get(&wildcard))
            .copied()
            .unwrap_or(1.0); // $1 per 1M tokens if unknown

        let output_cost_per_million = self
            .output_costs
            .get(&key)
            .or_else(|| self.output_costs.get(&wildcard))
            .copied()
            .unwrap_or(2.0);

        let input_cost = (usage.prompt_tokens as f64 / 1_000_000.0) * input_cost_per_million;
        let output_cost = (usage.completion_tokens as f64 / 1_000_000.0) * output_cost_per_million;

        input_cost + output_cost
    }

    /// Cost for an optional usage report; zero when the provider reported none
    pub fn cost_of(&self, model_info: &ModelInfo, usage: Option<&TokenUsage>) -> f64 {
        usage
            .map(|u| self.calculate_cost(model_info, u))
            .unwrap_or(0.0)
    }

    /// Add or update pricing for a model (`*` prices every model of a provider)
    pub fn set_pricing(
        &mut self,
        provider: &str,
        model: &str,
        input_cost_per_million: f64,
        output_cost_per_million: f64,
    ) {
        let key = format!("{}:{}", provider, model);
        self.input_costs.insert(key.clone(), input_cost_per_million);
        self.output_costs.insert(key, output_cost_per_million);
    }
}

impl Default for LLMCostCalculator {
    fn default() -> Self {
        Self::new()
    }
}
