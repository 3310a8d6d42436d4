use super::normalize;

// ── Stability arithmetic ──────────────────────────────────────────────────────

/// Stability assigned to a token the first time it is seen.
const NEW_WORD_STABILITY: f64 = 0.6;
/// Stability gained each time a token reappears at a matching position.
const MATCH_STABILITY_GAIN: f64 = 0.25;
/// Stability at which a token's base confidence saturates at 1.0.
const STABILITY_SATURATION: f64 = 3.0;

/// Absence shorter than this does not decay a token.
const DECAY_GRACE_MS: u64 = 2_000;
/// Window over which an absent token decays toward the floor.
const DECAY_WINDOW_MS: u64 = 5_000;
/// Decay multiplier never drops below this per pass.
const DECAY_FLOOR: f64 = 0.1;
/// Tokens decayed below this stability are discarded.
const DISCARD_STABILITY: f64 = 0.5;

/// Two tokens only ever match when their form similarity reaches this.
const MIN_WORD_SIMILARITY: f64 = 0.8;
/// Position history ring kept per token.
const POSITION_HISTORY_DEPTH: usize = 5;

/// Weights of the combined match score.
const SIMILARITY_WEIGHT: f64 = 0.7;
const PROXIMITY_WEIGHT: f64 = 0.3;

#[derive(Debug, Clone)]
pub(crate) struct WordDetail {
    word: String,
    normalized: String,
    stable_count: f64,
    first_seen_ms: u64,
    last_seen_ms: u64,
    best_position: usize,
    position_history: Vec<usize>,
}

/// Per-utterance token tracker.
///
/// [`WordStore::observe`] is the only mutating entry point: it matches every
/// incoming token against the tracked details, grows stability on a match,
/// creates a fresh detail on a miss, and decays details the interim no
/// longer mentions.
#[derive(Debug, Default)]
pub(crate) struct WordStore {
    details: Vec<WordDetail>,
}

impl WordStore {
    /// Fold one interim's tokens into the store. Returns, per token, the
    /// index of the detail now describing it.
    pub(crate) fn observe(&mut self, tokens: &[String], now_ms: u64) -> Vec<usize> {
        let mut claimed = vec![false; self.details.len()];
        let mut indices = Vec::with_capacity(tokens.len());

        for (position, token) in tokens.iter().enumerate() {
            let normalized = normalize(token);

            let best = self
                .details
                .iter()
                .enumerate()
                .filter(|(i, _)| !claimed[*i])
                .filter_map(|(i, d)| {
                    let sim = word_similarity(&d.normalized, &normalized, &d.word, token);
                    if sim < MIN_WORD_SIMILARITY {
                        return None;
                    }
                    let score = SIMILARITY_WEIGHT * sim
                        + PROXIMITY_WEIGHT * position_proximity(d.best_position, position);
                    Some((i, score))
                })
                .max_by(|a, b| a.1.total_cmp(&b.1));

            let idx = match best {
                Some((i, _)) => {
                    claimed[i] = true;
                    let d = &mut self.details[i];
                    d.word = token.clone();
                    d.normalized = normalized;
                    d.stable_count += MATCH_STABILITY_GAIN;
                    d.last_seen_ms = now_ms;
                    d.best_position = position;
                    d.position_history.push(position);
                    if d.position_history.len() > POSITION_HISTORY_DEPTH {
                        d.position_history.remove(0);
                    }
                    i
                }
                None => {
                    self.details.push(WordDetail {
                        word: token.clone(),
                        normalized,
                        stable_count: NEW_WORD_STABILITY,
                        first_seen_ms: now_ms,
                        last_seen_ms: now_ms,
                        best_position: position,
                        position_history: vec![position],
                    });
                    claimed.push(true);
                    self.details.len() - 1
                }
            };
            indices.push(idx);
        }

        self.decay_absent(&claimed, now_ms, &mut indices);
        indices
    }

    /// Base confidence of the detail at `idx`: saturating stability scaled
    /// by how consistently the token has held its position.
    pub(crate) fn confidence(&self, idx: usize) -> f64 {
        let d = &self.details[idx];
        let base = (d.stable_count / STABILITY_SATURATION).min(1.0);
        base * position_consistency(&d.position_history)
    }

    /// Stability-weighted average on-screen lifetime, saturating at one
    /// second. Feeds the `WordDuration` heuristic.
    pub(crate) fn duration_score(&self) -> f64 {
        let total_weight: f64 = self.details.iter().map(|d| d.stable_count).sum();
        if total_weight <= 0.0 {
            return 0.0;
        }
        let weighted: f64 = self
            .details
            .iter()
            .map(|d| (d.last_seen_ms - d.first_seen_ms) as f64 * d.stable_count)
            .sum();
        (weighted / total_weight / 1_000.0).min(1.0)
    }

    /// Absent tokens decay instead of disappearing, so a transiently dropped
    /// word keeps its earned stability through short flicker.
    fn decay_absent(&mut self, claimed: &[bool], now_ms: u64, live_indices: &mut [usize]) {
        let mut removed_before = vec![0usize; self.details.len()];
        let mut removed = 0;

        for (i, d) in self.details.iter_mut().enumerate() {
            removed_before[i] = removed;
            if claimed[i] {
                continue;
            }
            let age = now_ms.saturating_sub(d.last_seen_ms);
            if age <= DECAY_GRACE_MS {
                continue;
            }
            let factor =
                (1.0 - (age - DECAY_GRACE_MS) as f64 / DECAY_WINDOW_MS as f64).max(DECAY_FLOOR);
            d.stable_count *= factor;
            if d.stable_count < DISCARD_STABILITY {
                removed += 1;
            }
        }

        if removed == 0 {
            return;
        }
        let mut keep = claimed.to_vec();
        for (i, d) in self.details.iter().enumerate() {
            if d.stable_count >= DISCARD_STABILITY {
                keep[i] = true;
            }
        }
        let mut i = 0;
        self.details.retain(|_| {
            let k = keep[i];
            i += 1;
            k
        });
        for idx in live_indices.iter_mut() {
            *idx -= removed_before[*idx];
        }
    }
}

// ── Matching primitives ───────────────────────────────────────────────────────

/// Shared-edge similarity: common prefix plus common suffix of the
/// normalized forms over the longer length. Punctuation-only tokens fall
/// back to literal comparison.
fn word_similarity(norm_a: &str, norm_b: &str, raw_a: &str, raw_b: &str) -> f64 {
    if norm_a.is_empty() || norm_b.is_empty() {
        return if raw_a.trim() == raw_b.trim() { 1.0 } else { 0.0 };
    }
    let a: Vec<char> = norm_a.chars().collect();
    let b: Vec<char> = norm_b.chars().collect();
    let max_len = a.len().max(b.len());

    let prefix = a.iter().zip(&b).take_while(|(x, y)| x == y).count();
    let suffix = a
        .iter()
        .rev()
        .zip(b.iter().rev())
        .take_while(|(x, y)| x == y)
        .count();

    (((prefix + suffix) as f64) / max_len as f64).min(1.0)
}

fn position_proximity(previous: usize, current: usize) -> f64 {
    let distance = previous.abs_diff(current) as f64;
    (1.0 - distance / 10.0).max(0.0)
}

fn position_consistency(history: &[usize]) -> f64 {
    (1.0 - std_dev(history) / 2.0).max(0.0)
}

fn std_dev(values: &[usize]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<usize>() as f64 / n;
    let variance = values
        .iter()
        .map(|&v| {
            let d = v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    variance.sqrt()
}
