//! Per-user display and translation settings.

use std::path::Path;

use polyglass_caption::{Heuristic, LineWidth};

/// What the glasses show: every event, or only true translations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    #[default]
    Everything,
    Translations,
}

fn default_source_language() -> String {
    "en-US".to_string()
}

fn default_target_language() -> String {
    "es-ES".to_string()
}

fn default_number_of_lines() -> u8 {
    3
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserSettings {
    pub source_language: String,
    pub target_language: String,
    pub line_width: LineWidth,
    /// Visible caption lines, clamped to `1..=5`.
    pub number_of_lines: u8,
    pub display_mode: DisplayMode,
    pub confidence_heuristic: Heuristic,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            source_language: default_source_language(),
            target_language: default_target_language(),
            line_width: LineWidth::default(),
            number_of_lines: default_number_of_lines(),
            display_mode: DisplayMode::default(),
            confidence_heuristic: Heuristic::default(),
        }
    }
}

impl UserSettings {
    /// Clamp out-of-range values into their documented domains.
    pub fn normalized(mut self) -> Self {
        self.number_of_lines = self.number_of_lines.clamp(1, 5);
        self
    }

    /// Load the default-settings descriptor from disk.
    ///
    /// A missing or malformed descriptor falls back to built-in defaults
    /// with a single warning; it never fails startup.
    pub fn load_descriptor(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<UserSettings>(&content) {
                Ok(settings) => settings.normalized(),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "settings_descriptor_invalid");
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "settings_descriptor_unreadable");
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_fields_are_optional() {
        let settings: UserSettings =
            serde_json::from_str(r#"{"targetLanguage": "fr-FR", "numberOfLines": 4}"#).unwrap();
        assert_eq!(settings.target_language, "fr-FR");
        assert_eq!(settings.number_of_lines, 4);
        assert_eq!(settings.source_language, "en-US");
        assert_eq!(settings.display_mode, DisplayMode::Everything);
    }

    #[test]
    fn number_of_lines_is_clamped() {
        let settings = UserSettings {
            number_of_lines: 9,
            ..Default::default()
        }
        .normalized();
        assert_eq!(settings.number_of_lines, 5);

        let settings = UserSettings {
            number_of_lines: 0,
            ..Default::default()
        }
        .normalized();
        assert_eq!(settings.number_of_lines, 1);
    }

    #[test]
    fn display_mode_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&DisplayMode::Translations).unwrap(),
            r#""translations""#
        );
    }

    #[test]
    fn missing_descriptor_falls_back_to_defaults() {
        let settings = UserSettings::load_descriptor(Path::new("/nonexistent/settings.json"));
        assert_eq!(settings, UserSettings::default());
    }
}
