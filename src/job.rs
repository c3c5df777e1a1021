use crate::types::WorkerIndex;

/// A single unit of DSP work attached to one node of the processing graph.
///
/// Jobs are moved into the graph at build time and invoked exactly once per
/// tick, after every predecessor's job has completed. The executor guarantees
/// exclusive access for the duration of `run`, so a job may freely mutate its
/// internal state (filter memory, oscillator phase, scratch buffers).
///
/// Real-time constraints: `run` is called on the audio callback thread or on
/// a helper worker and must not allocate, block, or panic. A job that can
/// fail must record the failure out-of-band and still return normally, so
/// that successor accounting stays consistent.
pub trait Job: Send + Sync {
    /// Run the job on the worker with the given index.
    ///
    /// `worker` identifies the executing thread (master is `0`) and is the
    /// natural key into per-worker scratch storage.
    fn run(&mut self, worker: WorkerIndex);
}

impl<F: FnMut(WorkerIndex) + Send + Sync> Job for F {
    fn run(&mut self, worker: WorkerIndex) {
        self(worker);
    }
}
