//! Upstream translation events and locale handling.

/// One incremental translation result from the upstream cloud service.
///
/// The upstream subscription is made for a `(source, target)` pair but may
/// deliver events in either direction of that pair; `target_locale` is what
/// routes an event to the glasses or to the log only.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationEvent {
    pub session_id: String,
    pub user_id: String,
    pub original_text: String,
    pub translated_text: String,
    pub source_locale: String,
    pub target_locale: String,
    pub did_translate: bool,
    pub is_final: bool,
    /// Epoch milliseconds at ingest.
    pub received_at: u64,
}

// ── Locale helpers ────────────────────────────────────────────────────────────

/// Locale routed in place of one we cannot interpret.
pub const DEFAULT_LOCALE: &str = "en-US";

/// Language subtag: everything before the first `-`.
pub fn language_code(locale: &str) -> &str {
    let trimmed = locale.trim();
    trimmed.split('-').next().unwrap_or(trimmed)
}

/// Two locales match when their language subtags do, case-insensitively.
/// `zh-CN` matches `zh-Hans`; `en-US` does not match `zh-CN`.
pub fn language_matches(a: &str, b: &str) -> bool {
    language_code(a).eq_ignore_ascii_case(language_code(b))
}

/// Character-tokenized scripts need per-character captioning and wrapping.
pub fn is_cjk(locale: &str) -> bool {
    matches!(
        language_code(locale).to_ascii_lowercase().as_str(),
        "zh" | "ja" | "ko" | "yue"
    )
}

/// Targets like `zh-CN-pinyin` are transliterated before display.
pub fn is_pinyin(locale: &str) -> bool {
    locale.to_ascii_lowercase().contains("pinyin")
}

/// Human-readable language name for the conversation log.
///
/// Unknown subtags route through [`DEFAULT_LOCALE`] per the error policy.
pub fn language_name(locale: &str) -> &'static str {
    match language_code(locale).to_ascii_lowercase().as_str() {
        "en" => "English",
        "es" => "Spanish",
        "fr" => "French",
        "de" => "German",
        "it" => "Italian",
        "pt" => "Portuguese",
        "nl" => "Dutch",
        "ru" => "Russian",
        "zh" => "Chinese",
        "yue" => "Cantonese",
        "ja" => "Japanese",
        "ko" => "Korean",
        "ar" => "Arabic",
        "hi" => "Hindi",
        "th" => "Thai",
        "vi" => "Vietnamese",
        "tr" => "Turkish",
        "pl" => "Polish",
        "sv" => "Swedish",
        "no" => "Norwegian",
        "da" => "Danish",
        "fi" => "Finnish",
        _ => {
            tracing::debug!(locale, "unknown_language_subtag");
            language_name(DEFAULT_LOCALE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_code_takes_primary_subtag() {
        assert_eq!(language_code("en-US"), "en");
        assert_eq!(language_code("zh-Hans-CN"), "zh");
        assert_eq!(language_code("fr"), "fr");
    }

    #[test]
    fn matching_ignores_region_and_case() {
        assert!(language_matches("zh-CN", "ZH-tw"));
        assert!(language_matches("en", "en-GB"));
        assert!(!language_matches("en-US", "zh-CN"));
    }

    #[test]
    fn cjk_detection() {
        assert!(is_cjk("zh-CN"));
        assert!(is_cjk("ja-JP"));
        assert!(!is_cjk("en-US"));
    }

    #[test]
    fn pinyin_targets_are_flagged() {
        assert!(is_pinyin("zh-CN-pinyin"));
        assert!(is_pinyin("Hanyu-Pinyin"));
        assert!(!is_pinyin("zh-CN"));
    }

    #[test]
    fn unknown_language_falls_back_to_default() {
        assert_eq!(language_name("xx-XX"), "English");
        assert_eq!(language_name("zh-CN"), "Chinese");
    }
}
