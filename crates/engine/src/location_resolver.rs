//! Location Resolver (SPEC_FULL.md §4.5).
//!
//! Turns a free-text destination ("the cafe") into either an existing
//! [`tf_world::ClusterId`] or a canonical name for a brand new cluster.

use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use tf_domain::tool::ToolDefinition;
use tf_providers::{ChatRequest, LlmProvider, ToolChoice};
use tf_world::{ClusterId, LocationCluster};

const CONFIDENCE_THRESHOLD: f64 = 0.6;
const FALLBACK_MAX_WORDS: usize = 4;

pub enum LocationResolution {
    Existing(ClusterId),
    NewCluster(String),
}

#[derive(Debug, Deserialize)]
struct ResolveLocationArgs {
    #[serde(rename = "matchedClusterId", default)]
    matched_cluster_id: Option<String>,
    #[serde(rename = "canonicalName")]
    canonical_name: String,
    confidence: f64,
}

fn resolve_location_tool() -> ToolDefinition {
    ToolDefinition {
        name: "resolveLocation".into(),
        description: "Match a free-text destination to an existing location, or name a new one.".into(),
        parameters: json!({
            "type": "object",
            "properties": {
                "matchedClusterId": {
                    "type": ["string", "null"],
                    "description": "id of the existing cluster this destination refers to, or null if none match"
                },
                "canonicalName": {
                    "type": "string",
                    "description": "A short, title-cased canonical name for this location"
                },
                "confidence": {
                    "type": "number",
                    "description": "Confidence in the match, 0 to 1. Irrelevant when matchedClusterId is null."
                }
            },
            "required": ["canonicalName", "confidence"]
        }),
    }
}

fn resolver_prompt(destination: &str, clusters: &[LocationCluster]) -> String {
    let mut out = format!(
        "The player wants to go to \"{destination}\". Decide whether this refers to one of the \
         existing locations below, or whether it's a new place.\n\nExisting locations:\n"
    );
    if clusters.is_empty() {
        out.push_str("(none yet)\n");
    } else {
        for c in clusters {
            out.push_str(&format!("- {} (id: {})\n", c.canonical_name, c.id));
        }
    }
    out.push_str(
        "\nMatch semantically, not just lexically — for example \"the cafe\" matches \"Coffee Shop\". \
         Call resolveLocation with your decision.",
    );
    out
}

/// Resolve `destination` against the given clusters via the provider's
/// forced-tool-choice completion, falling back to a deterministic
/// canonicalizer on provider failure or malformed output.
pub async fn resolve_location(
    provider: &dyn LlmProvider,
    destination: &str,
    clusters: &[LocationCluster],
) -> LocationResolution {
    let req = ChatRequest {
        messages: vec![tf_domain::tool::Message::user(resolver_prompt(destination, clusters))],
        tools: vec![resolve_location_tool()],
        tool_choice: ToolChoice::Required,
        max_tokens: Some(4096),
        model: None,
    };

    let response = match provider.chat(&req).await {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, "location resolver provider call failed, falling back");
            return LocationResolution::NewCluster(fallback_canonicalize(destination));
        }
    };

    let Some(call) = response.tool_calls.iter().find(|c| c.tool_name == "resolveLocation") else {
        return LocationResolution::NewCluster(fallback_canonicalize(destination));
    };

    let args: ResolveLocationArgs = match serde_json::from_value(call.arguments.clone()) {
        Ok(a) => a,
        Err(e) => {
            tracing::warn!(error = %e, "resolveLocation arguments malformed, falling back");
            return LocationResolution::NewCluster(fallback_canonicalize(destination));
        }
    };

    if let Some(id_str) = args.matched_cluster_id {
        if args.confidence >= CONFIDENCE_THRESHOLD {
            if let Ok(id) = Uuid::parse_str(&id_str) {
                if clusters.iter().any(|c| c.id == id) {
                    return LocationResolution::Existing(id);
                }
            }
        }
    }

    LocationResolution::NewCluster(args.canonical_name)
}

/// Deterministic fallback: strip leading articles/prepositions, title-case
/// the remainder, and cap it at four words.
pub fn fallback_canonicalize(destination: &str) -> String {
    const LEADING_PHRASES: &[&str] = &[
        "to the", "to a", "to an", "towards the", "towards", "into the", "into", "at the", "at",
        "near the", "near", "to", "the", "a", "an",
    ];

    let mut remainder = destination.trim().to_lowercase();
    loop {
        let stripped = LEADING_PHRASES
            .iter()
            .find(|phrase| remainder.starts_with(*phrase) && remainder[phrase.len()..].starts_with(' '))
            .map(|phrase| remainder[phrase.len()..].trim_start().to_string());
        match stripped {
            Some(next) if next != remainder => remainder = next,
            _ => break,
        }
    }

    let words: Vec<String> = remainder
        .split_whitespace()
        .take(FALLBACK_MAX_WORDS)
        .map(title_case_word)
        .collect();

    if words.is_empty() {
        "Unknown Location".to_string()
    } else {
        words.join(" ")
    }
}

fn title_case_word(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_leading_article_and_title_cases() {
        assert_eq!(fallback_canonicalize("the market"), "Market");
    }

    #[test]
    fn strips_to_the_phrase() {
        assert_eq!(fallback_canonicalize("to the blacksmith's forge"), "Blacksmith's Forge");
    }

    #[test]
    fn truncates_to_four_words() {
        assert_eq!(fallback_canonicalize("the old abandoned stone watchtower ruins"), "Old Abandoned Stone Watchtower");
    }

    #[test]
    fn empty_destination_yields_placeholder() {
        assert_eq!(fallback_canonicalize("the"), "Unknown Location");
    }
}
