//! Batched, multi-threaded data loader.
//!
//! Architecture:
//! Sampler -> Job Channel -> Worker Threads -> Result Channel -> Reorder -> Consumer
//!
//! - The sampler splits (optionally shuffled) indices into batch jobs
//! - Each worker loads and collates one whole batch with its own seeded RNG
//! - The consumer receives batches in sampler order and records metadata

use crate::collate::{Batch, collate};
use crate::config::LoaderConfig;
use crate::dataset::SpectrogramDataset;
use crate::error::{LoaderError, Result};
use crate::meta::{MetaPipeline, MetaReceiver};

use crossbeam::channel::{Receiver, SendTimeoutError, Sender, bounded, unbounded};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::any::Any;
use std::collections::{BTreeMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const SEND_RETRY: Duration = Duration::from_millis(100);

/// One batch of work: its position in the epoch and the manifest indices.
type Job = (usize, Vec<usize>);

/// Iterates a [`SpectrogramDataset`] in batches.
pub struct AudioDataLoader {
    dataset: Arc<SpectrogramDataset>,
    config: LoaderConfig,
    epoch: u64,
    meta: Option<MetaPipeline>,
}

impl AudioDataLoader {
    pub fn new(dataset: Arc<SpectrogramDataset>, config: LoaderConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            dataset,
            config,
            epoch: 0,
            meta: None,
        })
    }

    /// Attach a metadata pipeline; every yielded batch is recorded.
    pub fn with_metadata(mut self, capacity: usize) -> (Self, MetaReceiver) {
        let (pipeline, receiver) = MetaPipeline::new(capacity);
        self.meta = Some(pipeline);
        (self, receiver)
    }

    pub fn dataset(&self) -> &Arc<SpectrogramDataset> {
        &self.dataset
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Epoch the next call to [`Self::iter`] will run.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn set_epoch(&mut self, epoch: u64) {
        self.epoch = epoch;
    }

    /// Batches per epoch.
    pub fn len(&self) -> usize {
        let size = self.dataset.size();
        let batch_size = self.config.batch_size;

        if self.config.drop_last {
            size / batch_size
        } else {
            size.div_ceil(batch_size)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sampler output for `epoch`: manifest indices grouped into batches.
    pub fn batch_indices(&self, epoch: u64) -> Vec<Vec<usize>> {
        let mut indices: Vec<usize> = (0..self.dataset.size()).collect();

        if self.config.shuffle {
            indices.shuffle(&mut StdRng::seed_from_u64(epoch_seed(
                self.config.seed,
                epoch,
            )));
        }

        indices
            .chunks(self.config.batch_size)
            .filter(|chunk| !self.config.drop_last || chunk.len() == self.config.batch_size)
            .map(<[usize]>::to_vec)
            .collect()
    }

    /// Start the next epoch.
    pub fn iter(&mut self) -> Batches<'_> {
        let epoch = self.epoch;
        self.epoch += 1;

        let jobs: VecDeque<Job> = self.batch_indices(epoch).into_iter().enumerate().collect();

        tracing::info!(
            epoch,
            batches = jobs.len(),
            workers = self.config.num_workers,
            "starting epoch"
        );

        let source = if self.config.num_workers == 0 {
            Source::Inline(jobs)
        } else {
            Source::Workers(WorkerPool::spawn(
                Arc::clone(&self.dataset),
                jobs,
                self.config.num_workers,
                self.config.seed,
                epoch,
                Arc::new(AtomicBool::new(false)),
            ))
        };

        Batches {
            dataset: Arc::clone(&self.dataset),
            meta: self.meta.as_ref(),
            seed: self.config.seed,
            epoch,
            source,
        }
    }
}

impl<'a> IntoIterator for &'a mut AudioDataLoader {
    type Item = Result<Batch>;
    type IntoIter = Batches<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// One epoch of batches, in sampler order.
///
/// Dropping the iterator early stops and joins the workers.
pub struct Batches<'a> {
    dataset: Arc<SpectrogramDataset>,
    meta: Option<&'a MetaPipeline>,
    seed: u64,
    epoch: u64,
    source: Source,
}

enum Source {
    Inline(VecDeque<Job>),
    Workers(WorkerPool),
}

impl Iterator for Batches<'_> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        let batch = match &mut self.source {
            Source::Inline(jobs) => {
                let (number, indices) = jobs.pop_front()?;
                build_batch(&self.dataset, &indices, batch_seed(self.seed, self.epoch, number))
            }
            Source::Workers(pool) => pool.next_in_order()?,
        };

        let result = batch.and_then(|batch| {
            if let Some(meta) = self.meta {
                meta.record(&batch, &self.dataset)?;
            }
            Ok(batch)
        });

        if let Ok(batch) = &result {
            tracing::debug!(
                epoch = self.epoch,
                size = batch.len(),
                max_time = batch.max_time(),
                "batch ready"
            );
        }

        Some(result)
    }
}

/// Load and collate the samples at `indices`.
fn build_batch(dataset: &SpectrogramDataset, indices: &[usize], seed: u64) -> Result<Batch> {
    let mut rng = StdRng::seed_from_u64(seed);

    let samples = indices
        .iter()
        .map(|&index| dataset.get(index, &mut rng))
        .collect::<Result<Vec<_>>>()?;

    collate(&samples, dataset.layout())
}

/// Sampler seed for one epoch; distinct `(seed, epoch)` pairs do not alias.
fn epoch_seed(seed: u64, epoch: u64) -> u64 {
    splitmix64(seed ^ splitmix64(epoch))
}

/// Per-batch RNG seed, independent of which worker builds the batch.
fn batch_seed(seed: u64, epoch: u64, batch: usize) -> u64 {
    splitmix64(seed ^ splitmix64(epoch ^ splitmix64(batch as u64)))
}

fn splitmix64(x: u64) -> u64 {
    let mut z = x.wrapping_add(0x9E3779B97F4A7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

// --- Worker pool ---

/// Worker threads fed through a sliding window of jobs.
///
/// At most `2 * num_workers` batches are dispatched but not yet yielded, so
/// the reorder buffer stays bounded while a slow batch holds up the epoch.
struct WorkerPool {
    jobs: Option<Sender<Job>>,
    backlog: VecDeque<Job>,
    results: Receiver<(usize, Result<Batch>)>,
    pending: BTreeMap<usize, Result<Batch>>,
    next: usize,
    total: usize,
    shutdown: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    fn spawn(
        dataset: Arc<SpectrogramDataset>,
        backlog: VecDeque<Job>,
        num_workers: usize,
        seed: u64,
        epoch: u64,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        let total = backlog.len();
        let window = num_workers * 2;

        let (job_tx, job_rx) = unbounded();
        let (result_tx, results) = bounded(window);

        let handles = (0..num_workers)
            .map(|_| {
                let dataset = Arc::clone(&dataset);
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                let shutdown = Arc::clone(&shutdown);

                thread::spawn(move || {
                    worker_main(dataset, job_rx, result_tx, shutdown, seed, epoch);
                })
            })
            .collect();

        let mut pool = Self {
            jobs: Some(job_tx),
            backlog,
            results,
            pending: BTreeMap::new(),
            next: 0,
            total,
            shutdown,
            handles,
        };

        for _ in 0..window {
            pool.dispatch();
        }

        pool
    }

    /// Hand the next queued job to the workers. Once the backlog is empty the
    /// job channel is closed so idle workers exit.
    fn dispatch(&mut self) {
        match self.backlog.pop_front() {
            Some(job) => {
                if let Some(jobs) = &self.jobs {
                    // A send only fails when every worker is gone, which the
                    // result channel reports on the next receive
                    let _ = jobs.send(job);
                }
            }
            None => self.jobs = None,
        }
    }

    fn next_in_order(&mut self) -> Option<Result<Batch>> {
        if self.next >= self.total {
            return None;
        }

        while !self.pending.contains_key(&self.next) {
            match self.results.recv() {
                Ok((number, batch)) => {
                    self.pending.insert(number, batch);
                }
                Err(_) => {
                    let batch = self.next;
                    self.next = self.total;
                    return Some(Err(LoaderError::WorkersExited { batch }.into()));
                }
            }
        }

        let batch = self.pending.remove(&self.next);
        self.next += 1;
        self.dispatch();
        batch
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.jobs = None;

        for handle in self.handles.drain(..) {
            if let Err(payload) = handle.join() {
                tracing::error!(
                    message = %panic_message(payload.as_ref()),
                    "loader worker panicked"
                );
            }
        }
    }
}

fn worker_main(
    dataset: Arc<SpectrogramDataset>,
    jobs: Receiver<Job>,
    results: Sender<(usize, Result<Batch>)>,
    shutdown: Arc<AtomicBool>,
    seed: u64,
    epoch: u64,
) {
    while let Ok((number, indices)) = jobs.recv() {
        if shutdown.load(Ordering::Relaxed) {
            return;
        }

        let batch = panic::catch_unwind(AssertUnwindSafe(|| {
            build_batch(&dataset, &indices, batch_seed(seed, epoch, number))
        }))
        .unwrap_or_else(|payload| {
            Err(LoaderError::WorkerPanicked {
                batch: number,
                message: panic_message(payload.as_ref()),
            }
            .into())
        });

        if !send_result(&results, &shutdown, (number, batch)) {
            return;
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Send with retry on timeout, checking shutdown between attempts.
fn send_result(
    results: &Sender<(usize, Result<Batch>)>,
    shutdown: &AtomicBool,
    mut item: (usize, Result<Batch>),
) -> bool {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            return false;
        }
        match results.send_timeout(item, SEND_RETRY) {
            Ok(()) => return true,
            Err(SendTimeoutError::Timeout(returned)) => item = returned,
            Err(SendTimeoutError::Disconnected(_)) => return false,
        }
    }
}
