//! Token-usage cost accounting.

const TOKENS_PER_UNIT: f64 = 1_000_000.0;

/// USD rates per one million tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceTable {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl Default for PriceTable {
    fn default() -> Self {
        Self {
            input_per_million: 0.10,
            output_per_million: 0.40,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostBreakdown {
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
}

/// Price `in_tokens`/`out_tokens` against `prices`.
///
/// Counts are not validated; any value is priced arithmetically.
pub fn cost(in_tokens: u64, out_tokens: u64, prices: &PriceTable) -> CostBreakdown {
    let input_cost = in_tokens as f64 / TOKENS_PER_UNIT * prices.input_per_million;
    let output_cost = out_tokens as f64 / TOKENS_PER_UNIT * prices.output_per_million;
    CostBreakdown {
        input_cost,
        output_cost,
        total_cost: input_cost + output_cost,
    }
}
