//! Local override configuration.
//!
//! The override file groups keys into sections. Section and key names are
//! case-insensitive, so both are stored lowercased.

use std::collections::BTreeMap;

/// Parse a boolean override value.
///
/// Accepts `true/false`, `yes/no`, `on/off` and `1/0` in any case.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

/// Immutable section/key/value store loaded from the override file.
///
/// An empty store means every domain runs with its defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverrideConfig {
    sections: BTreeMap<String, BTreeMap<String, String>>,
}

impl OverrideConfig {
    /// Empty configuration.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from `(section, key, value)` triples. Later duplicates win.
    pub fn from_entries<I, A, B, C>(entries: I) -> Self
    where
        I: IntoIterator<Item = (A, B, C)>,
        A: AsRef<str>,
        B: AsRef<str>,
        C: Into<String>,
    {
        let mut sections: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        for (section, key, value) in entries {
            sections
                .entry(section.as_ref().to_ascii_lowercase())
                .or_default()
                .insert(key.as_ref().to_ascii_lowercase(), value.into());
        }
        Self { sections }
    }

    /// Whether no values are set.
    pub fn is_empty(&self) -> bool {
        self.sections.values().all(BTreeMap::is_empty)
    }

    /// Raw value for `section.key`.
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(&section.to_ascii_lowercase())?
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Boolean value for `section.key`; unparseable values read as unset.
    pub fn get_bool(&self, section: &str, key: &str) -> Option<bool> {
        self.get(section, key).and_then(parse_bool)
    }

    /// Numeric value for `section.key`; unparseable values read as unset.
    pub fn get_u16(&self, section: &str, key: &str) -> Option<u16> {
        self.get(section, key).and_then(|v| v.trim().parse().ok())
    }
}
