//! Device/language combinations the glasses cannot render.

use crate::event::{language_code, language_name};

/// Rule table mapping `(device model prefix, language subtag)` to
/// unsupported. Matched on session open and on settings changes; a match
/// shows a fixed warning caption and skips the upstream subscription.
#[derive(Debug, Clone, Default)]
pub struct UnsupportedCombos {
    rules: Vec<(String, String)>,
}

impl UnsupportedCombos {
    pub fn new(rules: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            rules: rules.into_iter().collect(),
        }
    }

    /// Built-in table: monochrome Latin-font devices cannot render
    /// character-based or RTL scripts.
    pub fn builtin() -> Self {
        let devices = ["Vuzix Z100", "Mentra Mach1"];
        let languages = ["zh", "yue", "ja", "ko", "ar", "hi", "th"];
        Self::new(devices.iter().flat_map(|d| {
            languages
                .iter()
                .map(move |l| (d.to_string(), l.to_string()))
        }))
    }

    /// Warning caption to display when the combination is unsupported.
    pub fn check(&self, device_model: Option<&str>, target_locale: &str) -> Option<String> {
        let device = device_model?;
        let target = language_code(target_locale);
        self.rules
            .iter()
            .find(|(model, language)| {
                device.starts_with(model.as_str()) && target.eq_ignore_ascii_case(language)
            })
            .map(|(model, _)| {
                format!(
                    "{} translation is not supported on {}.",
                    language_name(target_locale),
                    model
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_rejects_cjk_on_latin_only_devices() {
        let table = UnsupportedCombos::builtin();
        let warning = table.check(Some("Vuzix Z100 Smart Glasses"), "zh-CN");
        assert_eq!(
            warning.as_deref(),
            Some("Chinese translation is not supported on Vuzix Z100.")
        );
    }

    #[test]
    fn supported_combinations_pass() {
        let table = UnsupportedCombos::builtin();
        assert!(table.check(Some("Vuzix Z100"), "fr-FR").is_none());
        assert!(table.check(Some("Even Realities G1"), "zh-CN").is_none());
    }

    #[test]
    fn unknown_device_passes() {
        let table = UnsupportedCombos::builtin();
        assert!(table.check(None, "zh-CN").is_none());
    }
}
