//! # Interim Confidence Stabilizer
//!
//! Turns the noisy, oscillating sequence of partial translations for one
//! utterance into a **non-shrinking confident prefix** suitable for a
//! peripheral display.
//!
//! ## Two-level design
//!
//! **Per token** — a [`store::WordStore`] tracks every token the current
//! utterance has produced, with a stability counter that grows while the
//! token keeps reappearing at a consistent position and decays once it
//! disappears from the stream.
//!
//! **Per interim** — the selected [`Heuristic`] weighs the per-token store
//! confidence into an acceptance decision. The confident prefix is the
//! longest run of accepted tokens starting at position zero; an interior
//! gap never produces a disjoint subset.

mod heuristic;
mod store;

use std::collections::VecDeque;

pub use heuristic::Heuristic;

use heuristic::TextScores;
use store::WordStore;

/// Default per-token acceptance threshold.
pub const DEFAULT_ACCEPT_THRESHOLD: f64 = 0.4;

/// How many recent interim snapshots are kept for the text-level heuristics.
const TRANSCRIPT_HISTORY_DEPTH: usize = 20;

/// Stabilizes one direction of display for one user.
///
/// Feed every interim through [`ConfidenceStabilizer::stabilize`]; call
/// [`ConfidenceStabilizer::reset`] on a final event and on any language
/// change so the next utterance starts from a clean slate.
pub struct ConfidenceStabilizer {
    heuristic: Heuristic,
    threshold: f64,
    is_cjk: bool,
    store: WordStore,
    history: VecDeque<String>,
    last_prefix: String,
    last_prefix_tokens: usize,
}

impl ConfidenceStabilizer {
    pub fn new(heuristic: Heuristic, is_cjk: bool) -> Self {
        Self::with_threshold(heuristic, is_cjk, DEFAULT_ACCEPT_THRESHOLD)
    }

    pub fn with_threshold(heuristic: Heuristic, is_cjk: bool, threshold: f64) -> Self {
        Self {
            heuristic,
            threshold,
            is_cjk,
            store: WordStore::default(),
            history: VecDeque::new(),
            last_prefix: String::new(),
            last_prefix_tokens: 0,
        }
    }

    pub fn heuristic(&self) -> Heuristic {
        self.heuristic
    }

    /// Process one interim and return the confident prefix to display.
    ///
    /// The returned prefix never has fewer tokens than the previous call's:
    /// if the freshly computed prefix shrank, the remembered one is emitted
    /// unchanged. An empty interim returns an empty string and leaves all
    /// state untouched.
    pub fn stabilize(&mut self, text: &str, now_ms: u64) -> String {
        if text.is_empty() {
            return String::new();
        }
        if self.heuristic == Heuristic::None {
            return text.to_string();
        }

        let tokens = tokenize(text, self.is_cjk);
        let scores = TextScores::compute(text, self.history.back().map(String::as_str));

        let details = self.store.observe(&tokens, now_ms);
        let duration_score = self.store.duration_score();

        let mut accepted = 0;
        for (i, idx) in details.iter().enumerate() {
            let confidence = self.heuristic.token_confidence(
                &scores,
                duration_score,
                self.store.confidence(*idx),
                i,
                tokens.len(),
            );
            if confidence < self.threshold {
                break;
            }
            accepted += 1;
        }

        self.history.push_back(text.to_string());
        if self.history.len() > TRANSCRIPT_HISTORY_DEPTH {
            self.history.pop_front();
        }

        if accepted < self.last_prefix_tokens {
            return self.last_prefix.clone();
        }

        let prefix = join_tokens(&tokens[..accepted], self.is_cjk);
        self.last_prefix_tokens = accepted;
        self.last_prefix = prefix.clone();
        prefix
    }

    /// Forget the current utterance entirely.
    pub fn reset(&mut self) {
        self.store = WordStore::default();
        self.history.clear();
        self.last_prefix.clear();
        self.last_prefix_tokens = 0;
    }
}

// ── Tokenization ──────────────────────────────────────────────────────────────

/// CJK targets are character-tokenized; everything else splits on whitespace.
pub(crate) fn tokenize(text: &str, is_cjk: bool) -> Vec<String> {
    if is_cjk {
        text.chars()
            .filter(|c| !c.is_whitespace())
            .map(String::from)
            .collect()
    } else {
        text.split_whitespace().map(String::from).collect()
    }
}

fn join_tokens(tokens: &[String], is_cjk: bool) -> String {
    if is_cjk {
        tokens.concat()
    } else {
        tokens.join(" ")
    }
}

/// Matching form of a token: lowercased, punctuation stripped.
pub(crate) fn normalize(token: &str) -> String {
    token
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(stab: &mut ConfidenceStabilizer, interims: &[&str]) -> Vec<String> {
        interims
            .iter()
            .enumerate()
            .map(|(i, text)| stab.stabilize(text, (i as u64 + 1) * 300))
            .collect()
    }

    #[test]
    fn tokenize_splits_on_whitespace() {
        assert_eq!(tokenize("the quick  brown", false), ["the", "quick", "brown"]);
    }

    #[test]
    fn tokenize_cjk_splits_characters() {
        assert_eq!(tokenize("你好 世界", true), ["你", "好", "世", "界"]);
    }

    #[test]
    fn normalize_strips_case_and_punctuation() {
        assert_eq!(normalize("Hello,"), "hello");
        assert_eq!(normalize("don't"), "dont");
    }

    #[test]
    fn empty_interim_returns_empty() {
        let mut stab = ConfidenceStabilizer::new(Heuristic::WordStability, false);
        assert_eq!(stab.stabilize("", 0), "");
    }

    #[test]
    fn none_heuristic_passes_text_through() {
        let mut stab = ConfidenceStabilizer::new(Heuristic::None, false);
        assert_eq!(stab.stabilize("the quik brown", 0), "the quik brown");
    }

    #[test]
    fn word_stability_grows_a_prefix() {
        let mut stab = ConfidenceStabilizer::new(Heuristic::WordStability, false);
        let prefixes = feed(
            &mut stab,
            &[
                "the",
                "the quik",
                "the quick",
                "the quick brow",
                "the quick brown",
            ],
        );

        assert_eq!(prefixes[3], "the");
        assert_eq!(prefixes[4], "the quick");
    }

    #[test]
    fn prefix_never_shrinks_between_finals() {
        let mut stab = ConfidenceStabilizer::new(Heuristic::WordStability, false);
        let prefixes = feed(
            &mut stab,
            &[
                "the", "the cat", "the cat sat", "the cat sat", "completely different",
                "the cat sat on",
            ],
        );

        let mut last = 0;
        for p in &prefixes {
            let len = tokenize(p, false).len();
            assert!(len >= last, "prefix shrank: {prefixes:?}");
            last = len;
        }
    }

    #[test]
    fn reset_forgets_the_prefix_memory() {
        let mut stab = ConfidenceStabilizer::new(Heuristic::WordStability, false);
        feed(&mut stab, &["a b c", "a b c", "a b c", "a b c", "a b c"]);
        stab.reset();
        assert_eq!(stab.stabilize("x", 10_000), "");
    }

    #[test]
    fn cjk_prefix_joins_without_spaces() {
        let mut stab = ConfidenceStabilizer::new(Heuristic::WordStability, true);
        let prefixes = feed(&mut stab, &["你好", "你好", "你好", "你好", "你好世"]);
        assert_eq!(prefixes[4], "你好");
    }

    #[test]
    fn hybrid_accepts_a_stable_repeated_interim() {
        let mut stab = ConfidenceStabilizer::new(Heuristic::Hybrid, false);
        let prefixes = feed(
            &mut stab,
            &["hello world", "hello world", "hello world", "hello world", "hello world"],
        );
        assert!(
            prefixes.last().unwrap().starts_with("hello"),
            "stable text must eventually surface: {prefixes:?}"
        );
    }
}
