/// Confidence heuristic selected per user.
///
/// Every variant shares one contract: given the text-level scores of the
/// current interim and the word store's per-token confidence, produce the
/// per-token acceptance confidence in `[0, 1]`. `None` disables
/// stabilization entirely and the interim passes through untouched.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize,
)]
pub enum Heuristic {
    None,
    #[default]
    WordStability,
    PrefixRetention,
    EditDistance,
    WordDuration,
    TrailingWordDecay,
    Hybrid,
}

/// Text-level scores computed once per interim against the previous one.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TextScores {
    pub prefix_retention: f64,
    pub edit_distance: f64,
}

impl TextScores {
    pub(crate) fn compute(current: &str, previous: Option<&str>) -> Self {
        let previous = previous.unwrap_or("");
        Self {
            prefix_retention: prefix_retention(current, previous),
            edit_distance: edit_distance_score(current, previous),
        }
    }
}

impl Heuristic {
    /// Per-token confidence for the token at `position` of `count`.
    ///
    /// `store_confidence` is the WordStability value for this token; modes
    /// other than `WordStability` treat it as a read-only lookup.
    pub(crate) fn token_confidence(
        self,
        scores: &TextScores,
        duration_score: f64,
        store_confidence: f64,
        position: usize,
        count: usize,
    ) -> f64 {
        match self {
            Heuristic::None => 1.0,
            Heuristic::WordStability => store_confidence,
            Heuristic::PrefixRetention => scores.prefix_retention * store_confidence,
            Heuristic::EditDistance => scores.edit_distance * store_confidence,
            Heuristic::WordDuration => duration_score * store_confidence,
            Heuristic::TrailingWordDecay => {
                trailing_weight(position, count) * store_confidence
            }
            Heuristic::Hybrid => (0.4 * store_confidence
                + 0.3 * scores.prefix_retention
                + 0.2 * scores.edit_distance
                + 0.1 * trailing_weight(position, count))
            .clamp(0.0, 1.0),
        }
    }
}

/// Monotonically increasing weight across token positions.
fn trailing_weight(position: usize, count: usize) -> f64 {
    if count == 0 {
        return 0.0;
    }
    (position + 1) as f64 / count as f64
}

/// Longest common prefix with the previous interim, over current length.
fn prefix_retention(current: &str, previous: &str) -> f64 {
    let cur: Vec<char> = current.chars().collect();
    if cur.is_empty() {
        return 0.0;
    }
    let common = cur
        .iter()
        .zip(previous.chars())
        .take_while(|(a, b)| **a == *b)
        .count();
    common as f64 / cur.len() as f64
}

fn edit_distance_score(current: &str, previous: &str) -> f64 {
    let cur: Vec<char> = current.chars().collect();
    let prev: Vec<char> = previous.chars().collect();
    let max_len = cur.len().max(prev.len()).max(1);
    1.0 - levenshtein(&cur, &prev) as f64 / max_len as f64
}

/// Classic two-row Levenshtein over chars.
fn levenshtein(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut row = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitute = prev[j] + usize::from(ca != cb);
            row[j + 1] = substitute.min(prev[j + 1] + 1).min(row[j] + 1);
        }
        std::mem::swap(&mut prev, &mut row);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levenshtein_basics() {
        let chars = |s: &str| s.chars().collect::<Vec<_>>();
        assert_eq!(levenshtein(&chars("kitten"), &chars("sitting")), 3);
        assert_eq!(levenshtein(&chars(""), &chars("abc")), 3);
        assert_eq!(levenshtein(&chars("same"), &chars("same")), 0);
    }

    #[test]
    fn prefix_retention_is_share_of_current() {
        assert_eq!(prefix_retention("the cat", "the cap"), 6.0 / 7.0);
        assert_eq!(prefix_retention("abc", "xyz"), 0.0);
        assert_eq!(prefix_retention("abc", "abcdef"), 1.0);
    }

    #[test]
    fn edit_distance_score_of_identical_text_is_one() {
        assert_eq!(edit_distance_score("hello", "hello"), 1.0);
    }

    #[test]
    fn edit_distance_score_of_disjoint_text_is_zero() {
        assert_eq!(edit_distance_score("abc", "xyz"), 0.0);
    }

    #[test]
    fn trailing_weight_increases_monotonically() {
        let weights: Vec<f64> = (0..4).map(|i| trailing_weight(i, 4)).collect();
        assert!(weights.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(weights[3], 1.0);
    }

    #[test]
    fn hybrid_is_clamped() {
        let scores = TextScores {
            prefix_retention: 1.0,
            edit_distance: 1.0,
        };
        let c = Heuristic::Hybrid.token_confidence(&scores, 1.0, 1.0, 9, 10);
        assert!(c <= 1.0);
    }
}
