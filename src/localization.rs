//! User-facing strings.
//!
//! Two sources exist: compiled-in tables for English, Danish and German
//! ([`StaticStrings`]), and a JSON table fetched from the configuration store
//! at runtime ([`StringTable`]) that falls back to the compiled-in English
//! table whenever it cannot be fetched or parsed.

use std::collections::HashMap;

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageKey {
    ConfirmTitle,
    ConfirmText,
    Yes,
    Cancel,
    NoSelection,
    Processing,
    SuccessDefault,
    FailedCount,
    SummaryTitle,
    ConfigErrorTitle,
    ConfigErrorText,
    NotSupportedList,
    FlowCompleted,
    FlowStarted,
    TechnicalError,
    RefreshWarning,
}

impl MessageKey {
    pub const ALL: [MessageKey; 16] = [
        MessageKey::ConfirmTitle,
        MessageKey::ConfirmText,
        MessageKey::Yes,
        MessageKey::Cancel,
        MessageKey::NoSelection,
        MessageKey::Processing,
        MessageKey::SuccessDefault,
        MessageKey::FailedCount,
        MessageKey::SummaryTitle,
        MessageKey::ConfigErrorTitle,
        MessageKey::ConfigErrorText,
        MessageKey::NotSupportedList,
        MessageKey::FlowCompleted,
        MessageKey::FlowStarted,
        MessageKey::TechnicalError,
        MessageKey::RefreshWarning,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Language {
    #[default]
    En,
    Da,
    De,
}

impl Language {
    pub fn code(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Da => "da",
            Language::De => "de",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        let prefix: String = code.chars().take(2).collect::<String>().to_ascii_lowercase();
        match prefix.as_str() {
            "en" => Some(Language::En),
            "da" => Some(Language::Da),
            "de" => Some(Language::De),
            _ => None,
        }
    }

    /// Pick a language from the host's locale id, then from a browser-style
    /// language tag (`da-DK`, `de_DE.UTF-8`), then English.
    pub fn detect(lcid: Option<u32>, fallback_tag: Option<&str>) -> Self {
        lcid.and_then(Self::from_lcid)
            .or_else(|| fallback_tag.and_then(Self::from_code))
            .unwrap_or_default()
    }

    pub fn from_lcid(lcid: u32) -> Option<Self> {
        match lcid {
            1033 | 2057 => Some(Language::En),
            1030 => Some(Language::Da),
            1031 | 3079 | 2055 => Some(Language::De),
            _ => None,
        }
    }
}

/// Replace `{0}`, `{1}`, ... with the supplied values. Placeholders without a
/// value are left as they are.
pub fn format_message(template: &str, args: &[&str]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        let arg = tail.find('}').and_then(|close| {
            let index: usize = tail[1..close].parse().ok()?;
            args.get(index).map(|arg| (*arg, close))
        });
        match arg {
            Some((arg, close)) => {
                out.push_str(arg);
                rest = &tail[close + 1..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Lookup of message templates by key.
pub trait Strings: Send + Sync {
    fn get(&self, key: MessageKey) -> String;

    fn format(&self, key: MessageKey, args: &[&str]) -> String {
        format_message(&self.get(key), args)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StaticStrings {
    pub language: Language,
}

impl StaticStrings {
    pub fn new(language: Language) -> Self {
        Self { language }
    }
}

impl Strings for StaticStrings {
    fn get(&self, key: MessageKey) -> String {
        builtin(self.language, key).to_string()
    }
}

fn builtin(language: Language, key: MessageKey) -> &'static str {
    use MessageKey::*;
    match language {
        Language::En => match key {
            ConfirmTitle => "Confirm",
            ConfirmText => "Do you want to run the flow for {0} record(s)?",
            Yes => "Yes",
            Cancel => "Cancel",
            NoSelection => "No records selected.",
            Processing => "Processing {0} record(s)...",
            SuccessDefault => "{0} record(s) processed successfully",
            FailedCount => "{0} record(s) failed",
            SummaryTitle => "Result",
            ConfigErrorTitle => "Configuration error",
            ConfigErrorText => "Could not read the flow URL: {0}",
            NotSupportedList => "This action is not supported from a list. Open a single record.",
            FlowCompleted => "The flow completed.",
            FlowStarted => "The flow has been started.",
            TechnicalError => "A technical error occurred: {0}",
            RefreshWarning => "Could not refresh {0}: {1}",
        },
        Language::Da => match key {
            ConfirmTitle => "Bekræft",
            ConfirmText => "Vil du køre flowet for {0} post(er)?",
            Yes => "Ja",
            Cancel => "Annuller",
            NoSelection => "Ingen poster valgt.",
            Processing => "Behandler {0} post(er)...",
            SuccessDefault => "{0} post(er) behandlet",
            FailedCount => "{0} post(er) fejlede",
            SummaryTitle => "Resultat",
            ConfigErrorTitle => "Konfigurationsfejl",
            ConfigErrorText => "Kunne ikke læse flow-URL: {0}",
            NotSupportedList => "Handlingen understøttes ikke fra en liste. Åbn en enkelt post.",
            FlowCompleted => "Flowet er gennemført.",
            FlowStarted => "Flowet er startet.",
            TechnicalError => "Der opstod en teknisk fejl: {0}",
            RefreshWarning => "Kunne ikke opdatere {0}: {1}",
        },
        Language::De => match key {
            ConfirmTitle => "Bestätigen",
            ConfirmText => "Möchten Sie den Flow für {0} Datensätze ausführen?",
            Yes => "Ja",
            Cancel => "Abbrechen",
            NoSelection => "Keine Datensätze ausgewählt.",
            Processing => "{0} Datensätze werden verarbeitet...",
            SuccessDefault => "{0} Datensätze erfolgreich verarbeitet",
            FailedCount => "{0} Datensätze fehlgeschlagen",
            SummaryTitle => "Ergebnis",
            ConfigErrorTitle => "Konfigurationsfehler",
            ConfigErrorText => "Die Flow-URL konnte nicht gelesen werden: {0}",
            NotSupportedList => "Diese Aktion wird in einer Liste nicht unterstützt. Öffnen Sie einen einzelnen Datensatz.",
            FlowCompleted => "Der Flow wurde abgeschlossen.",
            FlowStarted => "Der Flow wurde gestartet.",
            TechnicalError => "Ein technischer Fehler ist aufgetreten: {0}",
            RefreshWarning => "{0} konnte nicht aktualisiert werden: {1}",
        },
    }
}

/// A string table read from a JSON object of `key -> template`.
#[derive(Debug, Clone, Default)]
pub struct StringTable {
    entries: HashMap<MessageKey, String>,
}

impl StringTable {
    /// Parse a fetched table. Unknown keys are ignored.
    pub fn parse(json: &str) -> crate::Result<Self> {
        let raw: HashMap<String, String> = serde_json::from_str(json)?;
        let entries = raw
            .into_iter()
            .filter_map(|(k, v)| {
                serde_json::from_value::<MessageKey>(serde_json::Value::String(k))
                    .ok()
                    .map(|key| (key, v))
            })
            .collect();
        Ok(Self { entries })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Strings for StringTable {
    fn get(&self, key: MessageKey) -> String {
        self.entries
            .get(&key)
            .cloned()
            .unwrap_or_else(|| builtin(Language::En, key).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_positional_value_stays_literal() {
        assert_eq!(format_message("{0} of {1}", &["3"]), "3 of {1}");
        assert_eq!(format_message("{0} and {0}", &["x"]), "x and x");
        assert_eq!(format_message("no placeholders", &["x"]), "no placeholders");
    }

    #[test]
    fn placeholders_inside_values_are_not_expanded() {
        assert_eq!(
            format_message("Could not refresh {0}: {1}", &["Grid{1}", "boom"]),
            "Could not refresh Grid{1}: boom"
        );
        assert_eq!(format_message("{x} {} {{0}} {0}", &["a"]), "{x} {} {a} a");
        assert_eq!(format_message("trailing {", &["a"]), "trailing {");
    }

    #[test]
    fn lcid_wins_over_browser_tag() {
        assert_eq!(Language::detect(Some(1030), Some("de-DE")), Language::Da);
        assert_eq!(Language::detect(None, Some("de_DE.UTF-8")), Language::De);
        assert_eq!(Language::detect(Some(1044), Some("fr-FR")), Language::En);
        assert_eq!(Language::detect(None, None), Language::En);
    }

    #[test]
    fn every_key_has_text_in_every_language() {
        for lang in [Language::En, Language::Da, Language::De] {
            for key in MessageKey::ALL {
                assert!(!builtin(lang, key).is_empty(), "{lang:?} {key:?}");
            }
        }
    }

    #[test]
    fn fetched_table_overrides_and_falls_back_per_key() {
        let table = StringTable::parse(r#"{"successDefault":"{0} ok","bogus":"x"}"#).unwrap();
        assert_eq!(table.format(MessageKey::SuccessDefault, &["2"]), "2 ok");
        assert_eq!(table.get(MessageKey::Yes), "Yes");
    }

    #[test]
    fn unparseable_table_uses_builtin() {
        assert!(StringTable::parse("not json").is_err());
        let table = StringTable::default();
        assert!(table.is_empty());
        assert_eq!(
            table.format(MessageKey::FailedCount, &["1"]),
            "1 record(s) failed"
        );
        assert_eq!(table.get(MessageKey::SummaryTitle), "Result");
    }
}
