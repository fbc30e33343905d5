//! Per-batch file provenance, handed to a consumer over a bounded queue.

use crate::collate::{Batch, collate};
use crate::dataset::SpectrogramDataset;
use crate::error::{BatchError, MetaError, Result};
use crate::types::Sample;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// How long [`MetaReceiver::pop_meta_buffer`] waits for a record.
pub const DEFAULT_POP_TIMEOUT: Duration = Duration::from_millis(50);

/// Default number of records buffered before the oldest is evicted.
pub const DEFAULT_META_CAPACITY: usize = 64;

/// Provenance of one sample in a batch.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ItemMeta {
    pub audio_path: PathBuf,
    pub transcript_path: PathBuf,
    pub duration_secs: f64,
    pub size_kb: f64,
    /// Unpadded spectrogram frames
    pub frames: usize,
}

/// Batch-level aggregate of [`ItemMeta`].
///
/// Paths are the first item's; numeric fields are sums over the batch.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BatchMeta {
    pub audio_path: PathBuf,
    pub transcript_path: PathBuf,
    pub duration_secs: f64,
    pub size_kb: f64,
    pub frames: usize,
    pub items: usize,
}

impl BatchMeta {
    /// Aggregate item metadata. Returns `None` for an empty slice.
    pub fn aggregate(items: &[ItemMeta]) -> Option<Self> {
        let first = items.first()?;

        Some(Self {
            audio_path: first.audio_path.clone(),
            transcript_path: first.transcript_path.clone(),
            duration_secs: items.iter().map(|m| m.duration_secs).sum(),
            size_kb: items.iter().map(|m| m.size_kb).sum(),
            frames: items.iter().map(|m| m.frames).sum(),
            items: items.len(),
        })
    }
}

/// Metadata for one collated batch.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MetaRecord {
    /// 1-based batch counter of the producing pipeline
    pub iteration: u64,
    pub items: Vec<ItemMeta>,
    pub batch: BatchMeta,
}

/// Producer half: records metadata for each collated batch.
pub struct MetaPipeline {
    tx: Sender<MetaRecord>,
    // Used only to evict the oldest record when the buffer is full
    evict: Receiver<MetaRecord>,
    iteration: AtomicU64,
}

/// Consumer half of the metadata buffer.
#[derive(Clone)]
pub struct MetaReceiver {
    rx: Receiver<MetaRecord>,
}

impl MetaPipeline {
    /// Create a pipeline buffering at most `capacity` records.
    pub fn new(capacity: usize) -> (Self, MetaReceiver) {
        let (tx, rx) = channel::bounded(capacity.max(1));

        let pipeline = Self {
            tx,
            evict: rx.clone(),
            iteration: AtomicU64::new(0),
        };

        (pipeline, MetaReceiver { rx })
    }

    /// Number of batches recorded so far.
    pub fn iteration(&self) -> u64 {
        self.iteration.load(Ordering::Relaxed)
    }

    /// Collate `samples` with the dataset's layout and record the batch.
    pub fn collate(&self, samples: &[Sample], dataset: &SpectrogramDataset) -> Result<Batch> {
        let batch = collate(samples, dataset.layout())?;
        self.record(&batch, dataset)?;
        Ok(batch)
    }

    /// Look up provenance for every index in `batch` and push one record.
    pub fn record(&self, batch: &Batch, dataset: &SpectrogramDataset) -> Result<MetaRecord> {
        let items = batch
            .indices
            .iter()
            .zip(&batch.frame_lengths)
            .map(|(&index, &frames)| {
                let meta = dataset.get_meta(index)?;
                Ok(ItemMeta {
                    audio_path: meta.audio_path,
                    transcript_path: meta.transcript_path,
                    duration_secs: meta.duration_secs,
                    size_kb: meta.size_kb,
                    frames,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let batch_meta = BatchMeta::aggregate(&items).ok_or(BatchError::Empty)?;
        let iteration = self.iteration.fetch_add(1, Ordering::Relaxed) + 1;

        let record = MetaRecord {
            iteration,
            items,
            batch: batch_meta,
        };
        self.push(record.clone());

        Ok(record)
    }

    fn push(&self, mut record: MetaRecord) {
        loop {
            match self.tx.try_send(record) {
                Ok(()) => return,
                Err(TrySendError::Full(rejected)) => {
                    if let Ok(dropped) = self.evict.try_recv() {
                        tracing::warn!(
                            iteration = dropped.iteration,
                            "metadata buffer full, dropped oldest record"
                        );
                    }
                    record = rejected;
                }
                // Unreachable while `evict` is alive
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }
}

impl MetaReceiver {
    /// Pop the oldest record, waiting up to [`DEFAULT_POP_TIMEOUT`].
    pub fn pop_meta_buffer(&self) -> Result<MetaRecord> {
        self.pop_timeout(DEFAULT_POP_TIMEOUT)
    }

    /// Pop the oldest record, waiting up to `timeout`.
    ///
    /// # Errors
    ///
    /// [`MetaError::Underflow`] if nothing arrives in time,
    /// [`MetaError::Disconnected`] once the producer is gone and the buffer
    /// is drained.
    pub fn pop_timeout(&self, timeout: Duration) -> Result<MetaRecord> {
        let record = self.rx.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => MetaError::Underflow { waited: timeout },
            RecvTimeoutError::Disconnected => MetaError::Disconnected,
        })?;

        Ok(record)
    }

    /// Records currently buffered.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::write_wav_pcm16;
    use crate::collate::BatchLayout;
    use crate::config::AudioConfig;
    use crate::error::Error;
    use crate::manifest::{Manifest, ManifestEntry};
    use crate::preprocessor::SpectrogramParser;
    use crate::vocab::LabelVocabulary;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::path::Path;

    fn dataset(dir: &Path, lengths: &[usize]) -> SpectrogramDataset {
        let entries = lengths
            .iter()
            .enumerate()
            .map(|(i, &len)| {
                let audio_path = dir.join(format!("{i}.wav"));
                let transcript_path = dir.join(format!("{i}.txt"));
                write_wav_pcm16(&audio_path, &vec![0.1; len], 16000).unwrap();
                std::fs::write(&transcript_path, "ab").unwrap();
                ManifestEntry {
                    audio_path,
                    transcript_path,
                }
            })
            .collect();

        SpectrogramDataset::new(
            Manifest::new(entries),
            LabelVocabulary::new("ab".chars()).unwrap(),
            SpectrogramParser::new(&AudioConfig::default()).unwrap(),
            BatchLayout::PLAIN,
        )
    }

    fn samples(dataset: &SpectrogramDataset, indices: &[usize]) -> Vec<Sample> {
        let mut rng = StdRng::seed_from_u64(0);
        indices
            .iter()
            .map(|&i| dataset.get(i, &mut rng).unwrap())
            .collect()
    }

    #[test]
    fn records_follow_batch_indices() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = dataset(dir.path(), &[1600, 3200, 800]);
        let (pipeline, receiver) = MetaPipeline::new(4);

        let batch = pipeline
            .collate(&samples(&dataset, &[2, 0]), &dataset)
            .unwrap();
        let record = receiver.pop_meta_buffer().unwrap();

        assert_eq!(batch.indices, vec![2, 0]);
        assert_eq!(record.iteration, 1);
        assert_eq!(record.items.len(), 2);
        assert_eq!(record.items[0].audio_path, dir.path().join("2.wav"));
        assert_eq!(record.items[1].audio_path, dir.path().join("0.wav"));
        assert_eq!(record.items[0].frames, batch.frame_lengths[0]);

        assert_eq!(record.batch.audio_path, dir.path().join("2.wav"));
        assert_eq!(record.batch.items, 2);
        assert!((record.batch.duration_secs - 0.15).abs() < 1e-9);
        assert_eq!(
            record.batch.frames,
            batch.frame_lengths.iter().sum::<usize>()
        );
    }

    #[test]
    fn fifo_order_and_iteration_counter() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = dataset(dir.path(), &[1600, 800]);
        let (pipeline, receiver) = MetaPipeline::new(4);

        pipeline.collate(&samples(&dataset, &[0]), &dataset).unwrap();
        pipeline.collate(&samples(&dataset, &[1]), &dataset).unwrap();

        let first = receiver.pop_meta_buffer().unwrap();
        let second = receiver.pop_meta_buffer().unwrap();

        assert_eq!(first.iteration, 1);
        assert_eq!(first.items[0].audio_path, dir.path().join("0.wav"));
        assert_eq!(second.iteration, 2);
        assert_eq!(second.items[0].audio_path, dir.path().join("1.wav"));
        assert_eq!(pipeline.iteration(), 2);
    }

    #[test]
    fn empty_buffer_underflows() {
        let (_pipeline, receiver) = MetaPipeline::new(1);

        let result = receiver.pop_timeout(Duration::from_millis(5));

        assert!(matches!(
            result,
            Err(Error::Meta(MetaError::Underflow { .. }))
        ));
    }

    #[test]
    fn dropped_producer_disconnects() {
        let (pipeline, receiver) = MetaPipeline::new(1);
        drop(pipeline);

        assert!(matches!(
            receiver.pop_meta_buffer(),
            Err(Error::Meta(MetaError::Disconnected))
        ));
    }

    #[test]
    fn full_buffer_evicts_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = dataset(dir.path(), &[800]);
        let (pipeline, receiver) = MetaPipeline::new(2);

        for _ in 0..3 {
            pipeline.collate(&samples(&dataset, &[0]), &dataset).unwrap();
        }

        assert_eq!(receiver.len(), 2);
        assert_eq!(receiver.pop_meta_buffer().unwrap().iteration, 2);
        assert_eq!(receiver.pop_meta_buffer().unwrap().iteration, 3);
    }

    #[test]
    fn aggregate_of_nothing_is_none() {
        assert!(BatchMeta::aggregate(&[]).is_none());
    }
}
