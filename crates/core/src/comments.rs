// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! A Vorbis comment list, shared between the encode/reencode stages and the
//! metadata ingest side channel (spec.md §3 `ProcessChain`, §6 metadata).

/// An ordered list of Vorbis comment tags (`KEY=value` pairs, case-insensitive keys).
#[derive(Debug, Clone, Default)]
pub struct Comments {
    entries: Vec<(String, String)>,
}

impl Comments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a tag. Vorbis comments allow repeated keys; we never dedupe them here.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push((key.into(), value.into()));
    }

    /// Replaces every value for `key` with a single new value, or appends it if absent.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.entries.retain(|(k, _)| !k.eq_ignore_ascii_case(key));
        self.entries.push((key.to_string(), value.into()));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Applies the instance-local metadata overrides from spec.md §3 on top of
    /// whatever global metadata is already present. Instance values always win.
    pub fn apply_overrides(&mut self, overrides: &crate::instance::MetadataOverrides) {
        if let Some(name) = &overrides.name {
            self.set("TITLE", name.clone());
        }
        if let Some(genre) = &overrides.genre {
            self.set("GENRE", genre.clone());
        }
        if let Some(description) = &overrides.description {
            self.set("DESCRIPTION", description.clone());
        }
        if let Some(url) = &overrides.url {
            self.set("URL", url.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_replaces_existing_key_case_insensitively() {
        let mut c = Comments::new();
        c.add("title", "Old");
        c.set("TITLE", "New");
        assert_eq!(c.iter().collect::<Vec<_>>(), vec![("TITLE", "New")]);
    }

    #[test]
    fn overrides_only_touch_fields_that_are_set() {
        let mut c = Comments::new();
        c.set("GENRE", "Ambient");
        let overrides = crate::instance::MetadataOverrides {
            name: Some("Live Set".to_string()),
            genre: None,
            description: None,
            url: None,
        };
        c.apply_overrides(&overrides);
        assert_eq!(c.len(), 2);
        assert!(c.iter().any(|(k, v)| k == "TITLE" && v == "Live Set"));
        assert!(c.iter().any(|(k, v)| k == "GENRE" && v == "Ambient"));
    }
}
