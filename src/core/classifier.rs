//! Stateless keyword router used to tag outgoing queries with a domain.

use crate::core::message::Domain;

/// Keyword tables checked in order; the first table with a hit wins.
const DOMAIN_KEYWORDS: &[(Domain, &[&str])] = &[
    (Domain::Code, &["code", "python", "function"]),
    (Domain::Finance, &["finance", "cost", "price"]),
    (Domain::Fitness, &["health", "gym", "run"]),
];

/// Confidence reported for keyword routing decisions.
pub const RULE_CONFIDENCE: f32 = 0.85;

/// Guess the domain of a query by case-insensitive keyword containment.
///
/// Matching is substring based, so "running" routes to fitness and
/// "functional" routes to code. Anything without a hit is `general`.
pub fn guess_domain(text: &str) -> Domain {
    let lower = text.to_lowercase();
    DOMAIN_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|keyword| lower.contains(keyword)))
        .map(|(domain, _)| *domain)
        .unwrap_or_default()
}
