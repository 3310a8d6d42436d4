//! # Conversation Log
//!
//! Ordered, bounded log of translation entries for one user. The log is
//! what distinguishes "the same utterance being refined" from "a new
//! utterance": successive interims update a single entry in place, and the
//! final for that utterance promotes it under the same id.

use std::collections::{HashMap, VecDeque};

/// Log capacity; the oldest entry is evicted first.
pub const MAX_ENTRIES: usize = 500;

/// One utterance as the viewers see it. `id` is stable across refinements
/// of the same utterance; `is_final` never reverts once set.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationEntry {
    pub id: String,
    /// Epoch milliseconds of the most recent update.
    pub timestamp: u64,
    pub original_text: String,
    pub translated_text: String,
    pub original_language: String,
    pub translated_language: String,
    pub is_final: bool,
    pub is_new_utterance: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LanguagePair {
    pub from: String,
    pub to: String,
}

/// Insertion-ordered, capacity-bounded entry store.
#[derive(Debug, Default)]
pub struct ConversationLog {
    entries: HashMap<String, ConversationEntry>,
    order: VecDeque<String>,
    current_interim_id: Option<String>,
    counter: u64,
    language_pair: LanguagePair,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one translation into the log.
    ///
    /// - interim while an interim entry is open → update it in place
    /// - final while an interim entry is open → promote it under the same id
    /// - otherwise → append a fresh entry
    ///
    /// Returns the entry as broadcast to viewers, or `None` when both texts
    /// are empty (nothing to log, no state advanced).
    pub fn add_translation(
        &mut self,
        original_text: &str,
        translated_text: &str,
        original_language: &str,
        translated_language: &str,
        is_final: bool,
        now_ms: u64,
    ) -> Option<ConversationEntry> {
        if original_text.is_empty() && translated_text.is_empty() {
            return None;
        }

        if let Some(id) = self.current_interim_id.clone() {
            if let Some(entry) = self.entries.get_mut(&id) {
                entry.original_text = original_text.to_string();
                entry.translated_text = translated_text.to_string();
                entry.original_language = original_language.to_string();
                entry.translated_language = translated_language.to_string();
                entry.timestamp = now_ms;
                if is_final {
                    entry.is_final = true;
                    entry.is_new_utterance = true;
                    self.current_interim_id = None;
                }
                return Some(entry.clone());
            }
            // Stale id (entry evicted): fall through and open a new one.
            self.current_interim_id = None;
        }

        self.counter += 1;
        let id = format!("entry-{}", self.counter);
        let entry = ConversationEntry {
            id: id.clone(),
            timestamp: now_ms,
            original_text: original_text.to_string(),
            translated_text: translated_text.to_string(),
            original_language: original_language.to_string(),
            translated_language: translated_language.to_string(),
            is_final,
            is_new_utterance: is_final,
        };
        self.entries.insert(id.clone(), entry.clone());
        self.order.push_back(id.clone());
        if !is_final {
            self.current_interim_id = Some(id);
        }

        if self.order.len() > MAX_ENTRIES {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
                if self.current_interim_id.as_deref() == Some(oldest.as_str()) {
                    self.current_interim_id = None;
                }
            }
        }

        Some(entry)
    }

    /// All entries in insertion order.
    pub fn entries(&self) -> Vec<ConversationEntry> {
        self.order
            .iter()
            .filter_map(|id| self.entries.get(id))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Drop every entry. The id counter is deliberately kept so ids stay
    /// unique for the lifetime of a viewer connection.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.current_interim_id = None;
    }

    pub fn set_language_pair(&mut self, from: &str, to: &str) {
        self.language_pair = LanguagePair {
            from: from.to_string(),
            to: to.to_string(),
        };
    }

    pub fn language_pair(&self) -> &LanguagePair {
        &self.language_pair
    }
}
