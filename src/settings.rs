use std::path::PathBuf;

use crate::admin::auth::default_cache_path;
use crate::localization::Language;
use crate::session::StringSource;

/// Runtime settings, read from the environment and then overridden by
/// command-line flags.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Dataverse organization URL holding the environment variables.
    pub org_url: Option<String>,
    /// Pre-acquired bearer token; skips the device-code sign-in.
    pub token: Option<String>,
    pub lcid: Option<u32>,
    pub language_tag: Option<String>,
    /// Configuration name of a JSON string table to use instead of the
    /// compiled-in strings.
    pub strings_variable: Option<String>,
    pub cache_lookups: bool,
    pub cache_file: PathBuf,
    pub assume_yes: bool,
}

impl Settings {
    /// Read `FLOWBUTTON_*` variables, falling back to `LANG` for the language.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| get(key).filter(|v| !v.trim().is_empty());
        Settings {
            org_url: non_empty("FLOWBUTTON_ORG_URL"),
            token: non_empty("FLOWBUTTON_TOKEN"),
            lcid: non_empty("FLOWBUTTON_LCID").and_then(|v| v.trim().parse().ok()),
            language_tag: non_empty("FLOWBUTTON_LANG").or_else(|| non_empty("LANG")),
            strings_variable: non_empty("FLOWBUTTON_STRINGS"),
            cache_lookups: non_empty("FLOWBUTTON_CACHE_LOOKUPS")
                .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            cache_file: non_empty("FLOWBUTTON_CACHE_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(default_cache_path),
            assume_yes: false,
        }
    }

    pub fn language(&self) -> Language {
        Language::detect(self.lcid, self.language_tag.as_deref())
    }

    pub fn string_source(&self) -> StringSource {
        match &self.strings_variable {
            Some(name) => StringSource::Remote(name.clone()),
            None => StringSource::Builtin(self.language()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> Settings {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn lcid_beats_lang() {
        let s = settings(&[("FLOWBUTTON_LCID", "1031"), ("LANG", "da_DK.UTF-8")]);
        assert_eq!(s.language(), Language::De);
        let s = settings(&[("LANG", "da_DK.UTF-8")]);
        assert_eq!(s.language(), Language::Da);
    }

    #[test]
    fn strings_variable_selects_remote_table() {
        let s = settings(&[("FLOWBUTTON_STRINGS", "new_ButtonStrings")]);
        assert!(matches!(s.string_source(), StringSource::Remote(n) if n == "new_ButtonStrings"));
        let s = settings(&[]);
        assert!(matches!(s.string_source(), StringSource::Builtin(Language::En)));
    }

    #[test]
    fn blank_values_are_ignored() {
        let s = settings(&[("FLOWBUTTON_ORG_URL", "  "), ("FLOWBUTTON_CACHE_FILE", "/tmp/c.json")]);
        assert_eq!(s.org_url, None);
        assert_eq!(s.cache_file, PathBuf::from("/tmp/c.json"));
        assert!(!s.cache_lookups);
    }
}
