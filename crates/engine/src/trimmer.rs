//! Context trimmer (SPEC_FULL.md §4.4).
//!
//! Token cost is approximated as `ceil(chars / 4)` — a model-agnostic
//! heuristic, not a real tokenizer. The budget constant below was chosen
//! against this approximation; do not swap in a model-specific tokenizer
//! without revisiting it.

use tf_domain::tool::Message;

pub const MAX_CONTEXT_TOKENS: u64 = 100_000;

/// `ceil(chars/4)`, minimum 1 for non-empty strings.
pub fn approx_token_cost(text: &str) -> u64 {
    let chars = text.chars().count() as u64;
    if chars == 0 {
        return 0;
    }
    chars.div_ceil(4).max(1)
}

fn message_cost(message: &Message) -> u64 {
    approx_token_cost(&message.content.extract_all_text())
}

/// Select the subsequence of `history` (newest-first walk, oldest-first
/// result) that fits the budget remaining after the system prompt's cost.
/// Messages are included whole; the walk stops at the first message that
/// does not fit.
pub fn trim(system_prompt: &str, history: &[Message]) -> Vec<Message> {
    let budget = MAX_CONTEXT_TOKENS.saturating_sub(approx_token_cost(system_prompt));

    let mut spent = 0u64;
    let mut kept_reversed: Vec<&Message> = Vec::new();
    for message in history.iter().rev() {
        let cost = message_cost(message);
        if spent + cost > budget {
            break;
        }
        spent += cost;
        kept_reversed.push(message);
    }

    kept_reversed.into_iter().rev().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg_of_chars(n: usize) -> Message {
        Message::user("x".repeat(n))
    }

    #[test]
    fn empty_history_yields_empty_regardless_of_budget() {
        assert!(trim("", &[]).is_empty());
        assert!(trim(&"s".repeat(1_000_000), &[]).is_empty());
    }

    #[test]
    fn boundary_scenario_from_spec() {
        // System prompt: 320_000 chars = 80_000 tokens. Budget = 20_000.
        let system_prompt = "s".repeat(320_000);
        // Three history messages of 10_000 tokens (40_000 chars) each, oldest first.
        let history = vec![msg_of_chars(40_000), msg_of_chars(40_000), msg_of_chars(40_000)];
        let kept = trim(&system_prompt, &history);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn trimming_is_monotonic_in_budget() {
        let history = vec![msg_of_chars(4_000), msg_of_chars(4_000), msg_of_chars(4_000)];
        let small_budget_prompt = "s".repeat((MAX_CONTEXT_TOKENS as usize - 1_500) * 4);
        let larger_budget_prompt = "s".repeat((MAX_CONTEXT_TOKENS as usize - 3_500) * 4);

        let kept_small = trim(&small_budget_prompt, &history);
        let kept_large = trim(&larger_budget_prompt, &history);

        assert!(kept_large.len() >= kept_small.len());
    }

    #[test]
    fn included_messages_retain_original_order() {
        let history = vec![Message::user("first"), Message::assistant("second"), Message::user("third")];
        let kept = trim("", &history);
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[0].content.extract_all_text(), "first");
        assert_eq!(kept[2].content.extract_all_text(), "third");
    }

    #[test]
    fn approx_cost_rounds_up() {
        assert_eq!(approx_token_cost(""), 0);
        assert_eq!(approx_token_cost("a"), 1);
        assert_eq!(approx_token_cost("abcd"), 1);
        assert_eq!(approx_token_cost("abcde"), 2);
    }
}
