// src/core/token_budget.rs — Chosen-path token budget

use crate::provider::TokenUsage;

/// Approximate token count for text (chars / 4, rounded up).
pub fn estimate_tokens(text: &str) -> u32 {
    (text.chars().count() as f32 / 4.0).ceil() as u32
}

/// Usage for one exchange: the provider's figures when it reported any,
/// otherwise an estimate from the prompt and response text.
pub fn usage_or_estimate(reported: TokenUsage, prompt: &str, response: &str) -> TokenUsage {
    if reported.is_empty() {
        TokenUsage {
            input_tokens: estimate_tokens(prompt),
            output_tokens: estimate_tokens(response),
        }
    } else {
        reported
    }
}

/// Stop rule for the reasoning loop. A new step is refused once the
/// chosen path exceeds `limit - buffer`.
#[derive(Debug, Clone, Copy)]
pub struct TokenBudget {
    pub limit: u32,
    pub buffer: u32,
}

impl TokenBudget {
    pub fn new(limit: u32, buffer: u32) -> Self {
        Self { limit, buffer }
    }

    pub fn threshold(&self) -> u32 {
        self.limit.saturating_sub(self.buffer)
    }

    pub fn is_exceeded(&self, spent: u32) -> bool {
        spent > self.threshold()
    }

    pub fn remaining(&self, spent: u32) -> u32 {
        self.threshold().saturating_sub(spent)
    }
}
