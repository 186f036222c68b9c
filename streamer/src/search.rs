use std::collections::{HashMap, HashSet};

use shared::SearchEntry;

/// Lowercased searchable text per report id.
#[derive(Debug, Clone, Default)]
pub struct SearchIndex {
    texts: HashMap<String, String>,
}

impl SearchIndex {
    pub fn insert(&mut self, id: impl Into<String>, text: &str) {
        self.texts.insert(id.into(), text.to_lowercase());
    }

    pub fn extend(&mut self, entries: impl IntoIterator<Item = SearchEntry>) {
        for entry in entries {
            self.insert(entry.id, &entry.text);
        }
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    pub fn clear(&mut self) {
        self.texts.clear();
    }

    /// Ids whose text contains `query`, case-insensitively. A blank query
    /// clears the filter and yields `None`.
    pub fn matching(&self, query: &str) -> Option<HashSet<String>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }
        Some(
            self.texts
                .iter()
                .filter(|(_, text)| text.contains(&needle))
                .map(|(id, _)| id.clone())
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_case_insensitive_substrings() {
        let mut index = SearchIndex::default();
        index.insert("a", "Flooded road near Shinagawa");
        index.insert("b", "power outage");

        assert_eq!(index.matching("  FLOOD "), Some(HashSet::from(["a".to_string()])));
        assert_eq!(index.matching("zzz"), Some(HashSet::new()));
        assert_eq!(index.matching("   "), None);
    }

    #[test]
    fn later_text_replaces_earlier() {
        let mut index = SearchIndex::default();
        index.insert("a", "old");
        index.insert("a", "new");
        assert_eq!(index.len(), 1);
        assert!(index.matching("old").unwrap().is_empty());
    }
}
