//! Manifest of `audio_path,transcript_path` pairs.

use crate::error::{DatasetError, Result};
use std::path::{Path, PathBuf};

/// One manifest line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManifestEntry {
    pub audio_path: PathBuf,
    pub transcript_path: PathBuf,
}

/// Ordered manifest; the position of an entry is its sample index.
#[derive(Clone, Debug, Default)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn new(entries: Vec<ManifestEntry>) -> Self {
        Self { entries }
    }

    /// Read a manifest file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| DatasetError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let manifest = Self::parse(&text)?;
        tracing::debug!(path = ?path.display(), entries = manifest.len(), "manifest loaded");

        Ok(manifest)
    }

    /// Parse manifest text.
    ///
    /// Each line is stripped of surrounding whitespace before splitting on
    /// commas; the fields themselves are kept verbatim. Blank lines are
    /// skipped and fields after the second are ignored.
    pub fn parse(text: &str) -> Result<Self> {
        let entries = text
            .lines()
            .map(str::trim)
            .enumerate()
            .filter(|(_, line)| !line.is_empty())
            .map(|(i, line)| {
                let mut fields = line.split(',');
                match (fields.next(), fields.next()) {
                    (Some(audio), Some(transcript)) if !audio.is_empty() => Ok(ManifestEntry {
                        audio_path: PathBuf::from(audio),
                        transcript_path: PathBuf::from(transcript),
                    }),
                    _ => Err(DatasetError::Manifest {
                        line: i + 1,
                        content: line.to_string(),
                    }),
                }
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry at `index`, or [`DatasetError::IndexOutOfRange`].
    pub fn get(&self, index: usize) -> Result<&ManifestEntry> {
        self.entries.get(index).ok_or_else(|| {
            DatasetError::IndexOutOfRange {
                index,
                len: self.entries.len(),
            }
            .into()
        })
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pairs_in_order() {
        let manifest = Manifest::parse("/data/a.wav,/data/a.txt\n\n  b.wav,b.txt,extra \r\n").unwrap();

        assert_eq!(manifest.len(), 2);
        assert_eq!(
            manifest.get(1).unwrap(),
            &ManifestEntry {
                audio_path: PathBuf::from("b.wav"),
                transcript_path: PathBuf::from("b.txt"),
            }
        );
    }

    #[test]
    fn inner_field_whitespace_is_kept() {
        let manifest = Manifest::parse("clips/take 1 .wav, notes/take 1.txt\n").unwrap();

        let entry = manifest.get(0).unwrap();
        assert_eq!(entry.audio_path, PathBuf::from("clips/take 1 .wav"));
        assert_eq!(entry.transcript_path, PathBuf::from(" notes/take 1.txt"));
    }

    #[test]
    fn reports_malformed_line_number() {
        let result = Manifest::parse("a.wav,a.txt\nb.wav\n");

        assert!(matches!(
            result,
            Err(crate::error::Error::Dataset(DatasetError::Manifest { line: 2, .. }))
        ));
    }

    #[test]
    fn out_of_range_index() {
        let manifest = Manifest::parse("a.wav,a.txt").unwrap();

        assert!(matches!(
            manifest.get(1),
            Err(crate::error::Error::Dataset(DatasetError::IndexOutOfRange {
                index: 1,
                len: 1
            }))
        ));
    }
}
