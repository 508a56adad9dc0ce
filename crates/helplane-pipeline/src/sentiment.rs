// SPDX-FileCopyrightText: 2026 Helplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Heuristic sentiment scoring for inbound messages.
//!
//! Zero-cost lexicon rules: no LLM pre-call, no network, no latency. Scores
//! land in [0.0, 1.0] with 0.5 neutral; the escalation floor check compares
//! against the conversation's running blend of these per-message scores.

/// Strong negative markers, weighted heaviest.
const NEGATIVE_STRONG: &[&str] = &[
    "terrible", "horrible", "awful", "useless", "worst", "furious", "scam",
    "unacceptable", "disgusted", "outraged", "garbage", "ripoff", "rip-off",
];

/// Milder negative markers.
const NEGATIVE_MILD: &[&str] = &[
    "angry", "annoyed", "frustrated", "disappointed", "upset", "broken",
    "still waiting", "not working", "doesn't work", "does not work", "again",
    "never", "cancel",
];

/// Positive markers.
const POSITIVE: &[&str] = &[
    "thanks", "thank you", "great", "perfect", "awesome", "appreciate",
    "wonderful", "love", "solved", "works now",
];

/// Score a single message's sentiment in [0.0, 1.0].
pub fn score_message(text: &str) -> f64 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0.5;
    }

    let lower = trimmed.to_lowercase();
    let mut score: f64 = 0.5;

    for marker in NEGATIVE_STRONG {
        if lower.contains(marker) {
            score -= 0.15;
        }
    }
    for marker in NEGATIVE_MILD {
        if lower.contains(marker) {
            score -= 0.07;
        }
    }
    for marker in POSITIVE {
        if lower.contains(marker) {
            score += 0.1;
        }
    }

    // Shouting: a mostly upper-case message reads as anger.
    let letters: Vec<char> = trimmed.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() >= 12 {
        let upper = letters.iter().filter(|c| c.is_uppercase()).count();
        if upper * 2 > letters.len() {
            score -= 0.1;
        }
    }

    // Repeated exclamation marks lean negative.
    if trimmed.contains("!!") {
        score -= 0.05;
    }

    score.clamp(0.0, 1.0)
}

/// Blend a conversation's running sentiment with a new message score.
///
/// The message score dominates so a sharp turn in tone is visible quickly,
/// while history still damps one-off spikes.
pub fn blend(running: f64, message_score: f64) -> f64 {
    (running * 0.4 + message_score * 0.6).clamp(0.0, 1.0)
}
