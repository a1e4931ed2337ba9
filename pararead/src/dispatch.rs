//! Run a unit of work once per chunk key, serially or across worker threads.

use crate::chunk_keys::ChunkKey;
use crate::reads::{open_validated, ReaderOptions, ReadsFile, ReadsFileOpener};
use crate::temp_store::TempFileStore;
use anyhow::Result;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use log::{debug, error, info};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};

/// What a unit of work gets to see of its chunk.
pub struct ChunkContext<'a, R> {
    reads: &'a mut R,
    output: PathBuf,
}

impl<'a, R: ReadsFile> ChunkContext<'a, R> {
    /// The reads handle owned by the current worker. It is never shared with
    /// another worker; only reads through it are expected.
    pub fn reads(&mut self) -> &mut R {
        self.reads
    }

    /// Where this chunk must write its output.
    pub fn output(&self) -> &Path {
        &self.output
    }
}

/// The computation performed for every chunk.
///
/// An implementation writes its result to [`ChunkContext::output`] and returns
/// the key it processed. An error or a panic marks the chunk as failed; the
/// run carries on with the other chunks.
pub trait WorkUnit<R: ReadsFile>: Sync {
    /// Process one chunk.
    fn process(&self, key: &str, ctx: &mut ChunkContext<'_, R>) -> Result<ChunkKey>;
}

impl<R, F> WorkUnit<R> for F
where
    R: ReadsFile,
    F: Fn(&str, &mut ChunkContext<'_, R>) -> Result<ChunkKey> + Sync,
{
    fn process(&self, key: &str, ctx: &mut ChunkContext<'_, R>) -> Result<ChunkKey> {
        self(key, ctx)
    }
}

enum Failure {
    Error(anyhow::Error),
    Panic(String),
}

type Outcome = std::result::Result<ChunkKey, Failure>;

fn attempt<R: ReadsFile, W: WorkUnit<R>>(
    work: &W,
    key: &str,
    reads: &mut R,
    store: &TempFileStore,
) -> Outcome {
    let mut ctx = ChunkContext {
        reads,
        output: store.path_for(key),
    };
    match catch_unwind(AssertUnwindSafe(|| work.process(key, &mut ctx))) {
        Ok(Ok(done)) => Ok(done),
        Ok(Err(e)) => Err(Failure::Error(e)),
        Err(p) => Err(Failure::Panic(decipher_panic(p))),
    }
}

/// Collects the keys whose work succeeded, logging the others.
struct Tally {
    good: Vec<ChunkKey>,
    failed: usize,
}

impl Tally {
    fn new(capacity: usize) -> Self {
        Tally {
            good: Vec::with_capacity(capacity),
            failed: 0,
        }
    }

    fn record(&mut self, key: ChunkKey, outcome: Outcome) {
        match outcome {
            Ok(done) => {
                debug!("chunk {key} done");
                self.good.push(done);
            }
            Err(Failure::Error(e)) => {
                error!("chunk {key} failed: {e:#}");
                self.failed += 1;
            }
            Err(Failure::Panic(msg)) => {
                error!("chunk {key} panicked: {msg}");
                self.failed += 1;
            }
        }
    }
}

/// Dispatches a [`WorkUnit`] over chunk keys.
///
/// With one worker the keys are processed in order on the calling thread and
/// the result keeps that order. With more, each worker thread opens its own
/// reads handle on its first key, keeps it for its lifetime and drops it on
/// exit; the result is in completion order. Failed keys are dropped from the
/// result, never retried, and never abort the run.
pub struct WorkDispatcher<'a, O: ReadsFileOpener> {
    opener: &'a O,
    options: ReaderOptions,
    allow_unaligned: bool,
    store: &'a TempFileStore,
    num_workers: usize,
}

impl<'a, O: ReadsFileOpener> WorkDispatcher<'a, O> {
    /// A dispatcher whose workers open reads with `opener` and write into `store`.
    pub fn new(
        opener: &'a O,
        options: ReaderOptions,
        allow_unaligned: bool,
        store: &'a TempFileStore,
        num_workers: usize,
    ) -> Self {
        WorkDispatcher {
            opener,
            options,
            allow_unaligned,
            store,
            num_workers: num_workers.max(1),
        }
    }

    /// Run `work` on every key and return the keys that succeeded.
    ///
    /// `local` is the caller's already registered handle, used for serial
    /// execution; when absent a handle is opened for the run.
    pub fn run<W: WorkUnit<O::Reads>>(
        &self,
        work: &W,
        keys: Vec<ChunkKey>,
        local: Option<&mut O::Reads>,
    ) -> Vec<ChunkKey> {
        let n_keys = keys.len();
        let n_workers = self.num_workers.min(n_keys.max(1));
        info!("dispatching {n_keys} chunk(s) across {n_workers} worker(s)");

        let tally = if n_workers == 1 {
            self.run_serial(work, keys, local)
        } else {
            self.run_parallel(work, keys, n_workers)
        };

        info!("{} of {n_keys} chunk(s) succeeded", tally.good.len());
        if tally.failed > 0 {
            error!("{} chunk(s) failed", tally.failed);
        }
        tally.good
    }

    fn run_serial<W: WorkUnit<O::Reads>>(
        &self,
        work: &W,
        keys: Vec<ChunkKey>,
        local: Option<&mut O::Reads>,
    ) -> Tally {
        let mut tally = Tally::new(keys.len());
        let mut opened;
        let reads = match local {
            Some(reads) => reads,
            None => match open_validated(self.opener, &self.options, self.allow_unaligned) {
                Ok(reads) => {
                    opened = reads;
                    &mut opened
                }
                Err(e) => {
                    let msg = format!("{e:#}");
                    for key in keys {
                        tally.record(key, Err(Failure::Error(anyhow::anyhow!(msg.clone()))));
                    }
                    return tally;
                }
            },
        };
        for key in keys {
            let outcome = attempt(work, &key, reads, self.store);
            tally.record(key, outcome);
        }
        tally
    }

    fn run_parallel<W: WorkUnit<O::Reads>>(
        &self,
        work: &W,
        keys: Vec<ChunkKey>,
        n_workers: usize,
    ) -> Tally {
        let mut tally = Tally::new(keys.len());

        // Scoped threads are joined before the scope ends, so workers may
        // borrow the opener, the store and the work unit.
        let r = crossbeam_utils::thread::scope(|s| {
            // allow a little bit of read-ahead
            let (job_send, job_recv) = bounded::<ChunkKey>(2);
            let (done_send, done_recv) = unbounded();

            for _ in 0..n_workers {
                let job_recv = job_recv.clone();
                let done_send = done_send.clone();
                s.spawn(move |_| self.worker(work, job_recv, done_send));
            }
            drop(job_recv);
            drop(done_send);

            for key in keys {
                // every worker has hung up; nothing left to run the rest
                if let Err(unsent) = job_send.send(key) {
                    tally.record(
                        unsent.0,
                        Err(Failure::Error(anyhow::anyhow!("no worker left to run this chunk"))),
                    );
                    break;
                }
            }
            // Close the job channel - this will cause the workers to exit
            drop(job_send);

            for (key, outcome) in done_recv.iter() {
                tally.record(key, outcome);
            }
        });

        if let Err(e) = r {
            error!("worker thread panicked: {}", decipher_panic(e));
        }
        tally
    }

    // Pulls keys until the job channel is disconnected. The reads handle is
    // opened on the first key, reopened after a panic, and dropped on return.
    fn worker<W: WorkUnit<O::Reads>>(
        &self,
        work: &W,
        jobs: Receiver<ChunkKey>,
        done: Sender<(ChunkKey, Outcome)>,
    ) {
        let mut reads: Option<O::Reads> = None;
        for key in jobs.iter() {
            if reads.is_none() {
                match open_validated(self.opener, &self.options, self.allow_unaligned) {
                    Ok(handle) => reads = Some(handle),
                    Err(e) => {
                        let _ = done.send((key, Err(Failure::Error(e))));
                        continue;
                    }
                }
            }
            let Some(handle) = reads.as_mut() else {
                continue;
            };
            let outcome = attempt(work, &key, handle, self.store);
            if matches!(outcome, Err(Failure::Panic(_))) {
                reads = None;
            }
            if done.send((key, outcome)).is_err() {
                break;
            }
        }
    }
}

fn decipher_panic(p: Box<dyn Any + 'static + Send>) -> String {
    if let Some(&s) = p.downcast_ref::<&'static str>() {
        s.to_string()
    } else if let Ok(s) = p.downcast::<String>() {
        *s
    } else {
        "thread panicked with unrecognized type".to_string()
    }
}
