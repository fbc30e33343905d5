//! Character label vocabulary.

use crate::error::{DatasetError, Result};
use std::collections::HashMap;
use std::path::Path;

/// Character-to-index mapping built from an ordered alphabet.
#[derive(Clone, Debug)]
pub struct LabelVocabulary {
    labels: Vec<char>,
    index: HashMap<char, u32>,
}

impl LabelVocabulary {
    /// Build from characters in index order.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::DuplicateLabel`] if a character repeats.
    pub fn new<I: IntoIterator<Item = char>>(alphabet: I) -> Result<Self> {
        let labels: Vec<char> = alphabet.into_iter().collect();
        let mut index = HashMap::with_capacity(labels.len());

        for (i, &c) in labels.iter().enumerate() {
            if index.insert(c, i as u32).is_some() {
                return Err(DatasetError::DuplicateLabel(c).into());
            }
        }

        Ok(Self { labels, index })
    }

    /// Load a labels file: a JSON array of single-character strings.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| DatasetError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let entries: Vec<String> =
            serde_json::from_str(&text).map_err(|source| DatasetError::Json {
                path: path.to_path_buf(),
                source,
            })?;

        let chars = entries
            .into_iter()
            .map(|entry| {
                let mut chars = entry.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(c),
                    _ => Err(DatasetError::InvalidLabel(entry)),
                }
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Self::new(chars)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn get(&self, c: char) -> Option<u32> {
        self.index.get(&c).copied()
    }

    pub fn label(&self, id: u32) -> Option<char> {
        self.labels.get(id as usize).copied()
    }

    /// Map text to label ids. Newlines and unmapped characters are dropped.
    pub fn encode(&self, text: &str) -> Vec<u32> {
        text.chars()
            .filter(|&c| c != '\n')
            .filter_map(|c| self.get(c))
            .collect()
    }

    /// Map label ids back to text, skipping unknown ids.
    pub fn decode(&self, ids: &[u32]) -> String {
        ids.iter().filter_map(|&id| self.label(id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_in_order_and_keeps_index_zero() {
        let vocab = LabelVocabulary::new("ab".chars()).unwrap();

        assert_eq!(vocab.encode("ab\na"), vec![0, 1, 0]);
    }

    #[test]
    fn drops_unmapped_characters() {
        let vocab = LabelVocabulary::new("_AB ".chars()).unwrap();

        assert_eq!(vocab.encode("A?B\r\nBA!"), vec![1, 2, 2, 1]);
        assert_eq!(vocab.decode(&[1, 3, 2, 99]), "A B");
    }

    #[test]
    fn rejects_duplicate_labels() {
        let result = LabelVocabulary::new("abca".chars());

        assert!(matches!(
            result,
            Err(crate::error::Error::Dataset(DatasetError::DuplicateLabel('a')))
        ));
    }

    #[test]
    fn loads_labels_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.json");
        std::fs::write(&path, r#"["_", "'", "A", "B", " "]"#).unwrap();

        let vocab = LabelVocabulary::from_json_file(&path).unwrap();

        assert_eq!(vocab.len(), 5);
        assert_eq!(vocab.get('\''), Some(1));
        assert_eq!(vocab.get(' '), Some(4));
    }

    #[test]
    fn rejects_multi_character_labels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.json");
        std::fs::write(&path, r#"["a", "bc"]"#).unwrap();

        let result = LabelVocabulary::from_json_file(&path);

        assert!(matches!(
            result,
            Err(crate::error::Error::Dataset(DatasetError::InvalidLabel(_)))
        ));
    }
}
