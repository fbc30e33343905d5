//! Sample provider: manifest entries to (spectrogram, labels) pairs.

use crate::audio::probe_duration;
use crate::collate::BatchLayout;
use crate::config::AudioConfig;
use crate::error::{DatasetError, Result};
use crate::manifest::{Manifest, ManifestEntry};
use crate::preprocessor::SpectrogramParser;
use crate::types::{Sample, SampleMeta};
use crate::vocab::LabelVocabulary;
use ndarray::{Array2, ArrayView1};
use rand::Rng;
use std::path::{Path, PathBuf};

/// Directory holding precomputed logits, sibling of the audio directory.
pub const LOGITS_DIR: &str = "logits";

/// Logits file extension.
pub const LOGITS_EXTENSION: &str = "json";

/// Spectrogram dataset over a manifest.
///
/// The dataset is read-only after construction and can be shared between
/// loader workers; randomness for augmentation is supplied per call.
pub struct SpectrogramDataset {
    manifest: Manifest,
    vocab: LabelVocabulary,
    parser: SpectrogramParser,
    layout: BatchLayout,
}

impl SpectrogramDataset {
    pub fn new(
        manifest: Manifest,
        vocab: LabelVocabulary,
        parser: SpectrogramParser,
        layout: BatchLayout,
    ) -> Self {
        Self {
            manifest,
            vocab,
            parser,
            layout,
        }
    }

    /// Build from a manifest file and audio configuration.
    pub fn from_manifest_file(
        path: impl AsRef<Path>,
        vocab: LabelVocabulary,
        config: &AudioConfig,
        layout: BatchLayout,
    ) -> Result<Self> {
        let manifest = Manifest::from_file(path)?;
        let parser = SpectrogramParser::new(config)?;

        Ok(Self::new(manifest, vocab, parser, layout))
    }

    /// Number of manifest entries.
    pub fn size(&self) -> usize {
        self.manifest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manifest.is_empty()
    }

    pub fn layout(&self) -> BatchLayout {
        self.layout
    }

    pub fn vocab(&self) -> &LabelVocabulary {
        &self.vocab
    }

    pub fn parser(&self) -> &SpectrogramParser {
        &self.parser
    }

    pub fn entry(&self, index: usize) -> Result<&ManifestEntry> {
        self.manifest.get(index)
    }

    /// Load the sample at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::IndexOutOfRange`] for indices past the
    /// manifest, or the underlying audio/transcript/logits error.
    pub fn get<R: Rng + ?Sized>(&self, index: usize, rng: &mut R) -> Result<Sample> {
        let entry = self.manifest.get(index)?;

        let features = self.parser.parse_audio(&entry.audio_path, rng)?;
        let labels = self.parse_transcript(&entry.transcript_path)?;

        let mut sample = Sample::new(index, features, labels);

        if self.layout.paths {
            sample.audio_path = Some(entry.audio_path.clone());
        }
        if self.layout.logits {
            sample.logits = Some(load_logits(&logits_path(&entry.audio_path))?);
        }

        tracing::trace!(index, frames = sample.frames(), "sample loaded");

        Ok(sample)
    }

    /// File-level provenance for `index`, independent of [`Self::get`].
    pub fn get_meta(&self, index: usize) -> Result<SampleMeta> {
        let entry = self.manifest.get(index)?;

        let duration_secs = probe_duration(&entry.audio_path)?;
        let size_bytes = std::fs::metadata(&entry.audio_path)
            .map_err(|source| DatasetError::Read {
                path: entry.audio_path.clone(),
                source,
            })?
            .len();

        Ok(SampleMeta {
            audio_path: entry.audio_path.clone(),
            transcript_path: entry.transcript_path.clone(),
            duration_secs,
            size_kb: size_bytes as f64 / 1000.0,
        })
    }

    /// Read a transcript and map it to label ids.
    pub fn parse_transcript(&self, path: &Path) -> Result<Vec<u32>> {
        let text = std::fs::read_to_string(path).map_err(|source| DatasetError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(self.vocab.encode(&text))
    }
}

/// Location of the precomputed logits for an audio file.
///
/// `<root>/<dir>/<stem>.<ext>` maps to `<root>/logits/<stem>.json`.
pub fn logits_path(audio_path: &Path) -> PathBuf {
    let root = audio_path
        .parent()
        .and_then(Path::parent)
        .unwrap_or(Path::new(""));
    let stem = audio_path.file_stem().unwrap_or_default();

    root.join(LOGITS_DIR)
        .join(stem)
        .with_extension(LOGITS_EXTENSION)
}

/// Read a `(frames, classes)` logits matrix stored as JSON rows.
pub fn load_logits(path: &Path) -> Result<Array2<f32>> {
    let text = std::fs::read_to_string(path).map_err(|source| DatasetError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let rows: Vec<Vec<f32>> = serde_json::from_str(&text).map_err(|source| DatasetError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    let classes = rows.first().map_or(0, Vec::len);
    if let Some((row, got)) = rows
        .iter()
        .map(Vec::len)
        .enumerate()
        .find(|&(_, len)| len != classes)
    {
        return Err(DatasetError::RaggedLogits {
            path: path.to_path_buf(),
            row,
            expected: classes,
            got,
        }
        .into());
    }

    let mut logits = Array2::zeros((rows.len(), classes));
    for (mut out, row) in logits.rows_mut().into_iter().zip(&rows) {
        out.assign(&ArrayView1::from(row.as_slice()));
    }

    Ok(logits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::write_wav_pcm16;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn fixture(dir: &Path, layout: BatchLayout) -> SpectrogramDataset {
        let wav = dir.join("wav");
        let txt = dir.join("txt");
        std::fs::create_dir_all(&wav).unwrap();
        std::fs::create_dir_all(&txt).unwrap();

        write_wav_pcm16(wav.join("a.wav"), &vec![0.25; 2000], 16000).unwrap();
        std::fs::write(txt.join("a.txt"), "ab\na").unwrap();

        let manifest = Manifest::new(vec![ManifestEntry {
            audio_path: wav.join("a.wav"),
            transcript_path: txt.join("a.txt"),
        }]);
        let vocab = LabelVocabulary::new("ab".chars()).unwrap();
        let parser = SpectrogramParser::new(&AudioConfig::default()).unwrap();

        SpectrogramDataset::new(manifest, vocab, parser, layout)
    }

    #[test]
    fn parses_transcript_labels() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = fixture(dir.path(), BatchLayout::PLAIN);

        let sample = dataset.get(0, &mut StdRng::seed_from_u64(0)).unwrap();

        assert_eq!(sample.index, 0);
        assert_eq!(sample.labels, vec![0, 1, 0]);
        assert_eq!(sample.freq_bins(), 161);
        assert!(sample.audio_path.is_none());
        assert!(sample.logits.is_none());
    }

    #[test]
    fn meta_matches_manifest_entry() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = fixture(dir.path(), BatchLayout::PLAIN);

        dataset.get(0, &mut StdRng::seed_from_u64(0)).unwrap();
        let meta = dataset.get_meta(0).unwrap();
        let entry = dataset.entry(0).unwrap();

        assert_eq!(meta.audio_path, entry.audio_path);
        assert_eq!(meta.transcript_path, entry.transcript_path);
        assert!((meta.duration_secs - 0.125).abs() < 1e-9);
        // 2000 16-bit samples plus header
        assert!(meta.size_kb > 4.0 && meta.size_kb < 4.2);
    }

    #[test]
    fn out_of_range_index() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = fixture(dir.path(), BatchLayout::PLAIN);

        let result = dataset.get(1, &mut StdRng::seed_from_u64(0));

        assert!(matches!(
            result,
            Err(crate::error::Error::Dataset(DatasetError::IndexOutOfRange { index: 1, len: 1 }))
        ));
        assert!(dataset.get_meta(3).is_err());
    }

    #[test]
    fn loads_logits_and_path() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = fixture(dir.path(), BatchLayout::WITH_LOGITS);
        std::fs::create_dir(dir.path().join("logits")).unwrap();
        std::fs::write(
            dir.path().join("logits/a.json"),
            "[[0.1, 0.9], [0.4, 0.6], [0.7, 0.3]]",
        )
        .unwrap();

        let sample = dataset.get(0, &mut StdRng::seed_from_u64(0)).unwrap();

        assert_eq!(sample.audio_path, Some(dir.path().join("wav/a.wav")));
        let logits = sample.logits.unwrap();
        assert_eq!(logits.shape(), &[3, 2]);
        assert_eq!(logits[[2, 0]], 0.7);
    }

    #[test]
    fn logits_live_beside_audio_directory() {
        assert_eq!(
            logits_path(Path::new("/data/train/wav/utt1.wav")),
            PathBuf::from("/data/train/logits/utt1.json")
        );
        assert_eq!(
            logits_path(Path::new("utt1.wav")),
            PathBuf::from("logits/utt1.json")
        );
    }

    #[test]
    fn rejects_ragged_logits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "[[1.0, 2.0], [3.0]]").unwrap();

        let result = load_logits(&path);

        assert!(matches!(
            result,
            Err(crate::error::Error::Dataset(DatasetError::RaggedLogits { row: 1, .. }))
        ));
    }
}
