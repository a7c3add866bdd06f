//! Bounded worker pool for replaying a sealed corpus.
//!
//! The calling thread reads documents in order and feeds them through a
//! bounded channel to scoped workers, one task per document. Each finished
//! task sends exactly one completion; the caller blocks until it has counted
//! one per fed document before returning.

use std::thread;

use crossbeam_channel::{bounded, unbounded};
use tracing::debug;

use crate::config::RiConfig;
use crate::corpus::{CompressedCorpus, CompressedDocument};
use crate::error::{Result, RiError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReplayPool {
    workers: usize,
    queue_capacity: usize,
}

impl ReplayPool {
    pub fn new(workers: usize, queue_capacity: usize) -> Self {
        ReplayPool {
            workers: workers.max(1),
            queue_capacity: queue_capacity.max(1),
        }
    }

    pub fn from_config(config: &RiConfig) -> Self {
        Self::new(config.workers, config.queue_capacity)
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `task(index, document)` for every document of `corpus`.
    ///
    /// Returns the number of documents replayed. Failures do not stop the
    /// other tasks; once every task has reported, the first error seen is
    /// returned. A corpus read error stops feeding and is returned after the
    /// tasks already queued have finished.
    pub fn replay<F>(&self, corpus: &CompressedCorpus, task: F) -> Result<usize>
    where
        F: Fn(usize, &CompressedDocument) -> Result<()> + Sync,
    {
        let documents = corpus.documents()?;
        let (job_tx, job_rx) = bounded::<(usize, CompressedDocument)>(self.queue_capacity);
        let (done_tx, done_rx) = unbounded::<Result<()>>();
        let task = &task;

        thread::scope(|scope| -> Result<usize> {
            let mut handles = Vec::with_capacity(self.workers);
            for worker in 0..self.workers {
                let jobs = job_rx.clone();
                let done = done_tx.clone();
                let handle = thread::Builder::new()
                    .name(format!("semvec-replay-{}", worker))
                    .spawn_scoped(scope, move || {
                        for (index, document) in jobs.iter() {
                            if done.send(task(index, &document)).is_err() {
                                break;
                            }
                        }
                    })?;
                handles.push(handle);
            }
            // The channel ends are owned by this closure, so an early return
            // drops them before the scope joins and idle workers exit.
            drop(job_rx);
            drop(done_tx);

            let mut fed = 0;
            let mut read_error = None;
            for (index, document) in documents.enumerate() {
                match document {
                    Ok(document) => {
                        if job_tx.send((index, document)).is_err() {
                            break;
                        }
                        fed += 1;
                    }
                    Err(e) => {
                        read_error = Some(e);
                        break;
                    }
                }
            }
            drop(job_tx);

            // Completion barrier
            let mut completed = 0;
            let mut first_error = None;
            while completed < fed {
                match done_rx.recv() {
                    Ok(outcome) => {
                        completed += 1;
                        if let Err(e) = outcome {
                            first_error.get_or_insert(e);
                        }
                    }
                    Err(_) => break,
                }
            }

            let panicked = handles
                .into_iter()
                .map(|h| h.join())
                .filter(|joined| joined.is_err())
                .count();
            if completed < fed || panicked > 0 {
                return Err(RiError::WorkerDisconnected {
                    expected: fed,
                    completed,
                });
            }
            if let Some(e) = read_error.or(first_error) {
                return Err(e);
            }
            debug!(documents = fed, workers = self.workers, "replay complete");
            Ok(fed)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    use super::*;
    use crate::corpus::CorpusWriter;

    fn corpus(documents: usize) -> CompressedCorpus {
        let writer = CorpusWriter::create(None).unwrap();
        for i in 0..documents {
            writer.append(&CompressedDocument::from_ids(vec![i as i32])).unwrap();
        }
        writer.seal().unwrap()
    }

    #[test]
    fn test_every_document_runs_once() {
        let corpus = corpus(100);
        let seen = Mutex::new(Vec::new());
        let pool = ReplayPool::new(4, 8);
        let count = pool
            .replay(&corpus, |index, doc| {
                assert_eq!(doc.ids(), &[index as i32]);
                seen.lock().push(index);
                Ok(())
            })
            .unwrap();
        assert_eq!(count, 100);
        let mut seen = seen.into_inner();
        seen.sort_unstable();
        assert_eq!(seen, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_empty_corpus() {
        let corpus = corpus(0);
        let count = ReplayPool::new(2, 2).replay(&corpus, |_, _| Ok(())).unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_task_error_is_returned_after_barrier() {
        let corpus = corpus(20);
        let ran = AtomicUsize::new(0);
        let err = ReplayPool::new(3, 4)
            .replay(&corpus, |index, _| {
                ran.fetch_add(1, Ordering::SeqCst);
                if index == 5 {
                    Err(RiError::UnknownTermId { id: 5 })
                } else {
                    Ok(())
                }
            })
            .unwrap_err();
        assert!(matches!(err, RiError::UnknownTermId { id: 5 }));
        assert_eq!(ran.load(Ordering::SeqCst), 20);
    }

    #[test]
    fn test_panicking_worker_is_reported() {
        let corpus = corpus(10);
        let err = ReplayPool::new(1, 2)
            .replay(&corpus, |index, _| {
                if index == 3 {
                    panic!("worker failure");
                }
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, RiError::WorkerDisconnected { .. }));
    }
}
