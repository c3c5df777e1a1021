use crate::{
    graph::DspGraph,
    interpreter::QueueInterpreter,
    job::Job,
    types::{SyncUnsafeCell, WorkerIndex},
};
use crossbeam_utils::sync::{Parker, Unparker};
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};
use std::thread::JoinHandle;
use tracing::debug;

/// Reference implementation of the thread-pool collaborator.
///
/// Owns a [`QueueInterpreter`] and a set of pre-spawned helper threads, each
/// parked between ticks. [`run_tick`](DspThreadPool::run_tick) wakes only as
/// many helpers as the installed graph can keep busy, runs the master half
/// on the calling thread (the audio callback), and collects each helper's
/// completion signal before returning.
///
/// Engines with their own thread management (CPU affinity, real-time
/// priorities) can drive the interpreter directly instead; this pool covers
/// the common case and the test suite.
#[must_use]
pub struct DspThreadPool<J: Job + 'static> {
    shared: Arc<PoolShared<J>>,
    helper_wakers: Vec<Unparker>,
    helpers: Vec<JoinHandle<()>>,
    master_parker: Parker,
}

struct PoolShared<J> {
    /// Borrowed mutably only while every helper thread is parked.
    interpreter: SyncUnsafeCell<QueueInterpreter<J>>,
    /// Helpers woken for the current tick that have not yet signalled
    /// completion.
    pending_helpers: AtomicUsize,
    master_waker: Unparker,
    shutdown: AtomicBool,
}

impl<J: Job + 'static> DspThreadPool<J> {
    /// Takes ownership of the interpreter and spawns `thread_count - 1`
    /// helper threads, parked until the first tick.
    ///
    /// # Panics
    /// When the OS refuses to spawn a helper thread.
    pub fn new(interpreter: QueueInterpreter<J>) -> Self {
        let helper_count = usize::from(interpreter.thread_count()) - 1;
        let master_parker = Parker::new();
        let shared = Arc::new(PoolShared {
            interpreter: SyncUnsafeCell::new(interpreter),
            pending_helpers: AtomicUsize::new(0),
            master_waker: master_parker.unparker().clone(),
            shutdown: AtomicBool::new(false),
        });

        let mut helper_wakers = Vec::with_capacity(helper_count);
        let mut helpers = Vec::with_capacity(helper_count);
        for helper in 0..helper_count {
            let worker = (helper + 1) as WorkerIndex;
            let parker = Parker::new();
            helper_wakers.push(parker.unparker().clone());
            let shared = Arc::clone(&shared);
            let handle = std::thread::Builder::new()
                .name(format!("dsp-helper-{worker}"))
                .spawn(move || helper_loop(&shared, &parker, worker))
                .expect("DspThreadPool::new: [1]");
            helpers.push(handle);
        }

        Self {
            shared,
            helper_wakers,
            helpers,
            master_parker,
        }
    }

    /// Runs one tick on the calling thread plus the helpers the installed
    /// graph warrants.
    ///
    /// Returns `false` (without waking anyone) when no graph is installed or
    /// the graph is empty; the caller should fill its output with silence.
    pub fn run_tick(&mut self) -> bool {
        // SAFETY: helpers only touch the interpreter between their park()
        // and their pending_helpers decrement, and this method does not
        // return until every woken helper has decremented; with `&mut self`
        // there is no aliasing mutable access.
        let interpreter = unsafe { &*self.shared.interpreter.get() };
        if !interpreter.init_tick() {
            return false;
        }

        let used = usize::from(interpreter.used_helper_threads());
        self.shared.pending_helpers.store(used, Ordering::Release);
        for waker in &self.helper_wakers[..used] {
            waker.unpark();
        }

        interpreter.tick_master();

        // Helpers may still be in their loop epilogue after the master saw
        // the node count reach zero; collect them before allowing the next
        // lifecycle operation. A stale park token from a previous tick only
        // causes one extra trip around this loop.
        while self.shared.pending_helpers.load(Ordering::Acquire) != 0 {
            self.master_parker.park();
        }
        true
    }

    /// Installs a graph between ticks, returning the previous one.
    /// See [`QueueInterpreter::install_queue`].
    pub fn install_queue(&mut self, graph: Box<DspGraph<J>>) -> Option<Box<DspGraph<J>>> {
        debug!(nodes = graph.total_node_count(), "installing dsp graph");
        // SAFETY: as in `run_tick`, every helper is parked (or past its last
        // interpreter access for the previous tick), and `&mut self` makes
        // this the only live borrow.
        let interpreter = unsafe { &mut *self.shared.interpreter.get() };
        interpreter.install_queue(graph)
    }

    /// Detaches the installed graph between ticks, returning it.
    /// See [`QueueInterpreter::release_queue`].
    pub fn release_queue(&mut self) -> Option<Box<DspGraph<J>>> {
        // SAFETY: see `install_queue`.
        let interpreter = unsafe { &mut *self.shared.interpreter.get() };
        interpreter.release_queue()
    }

    /// Number of helper threads woken per tick for the installed graph.
    #[must_use]
    pub fn used_helper_threads(&self) -> u8 {
        // SAFETY: shared read; the interpreter is only mutated through
        // `&mut self` methods.
        let interpreter = unsafe { &*self.shared.interpreter.get() };
        interpreter.used_helper_threads()
    }
}

impl<J: Job + 'static> Drop for DspThreadPool<J> {
    fn drop(&mut self) {
        debug!("stopping dsp thread pool");
        self.shared.shutdown.store(true, Ordering::Release);
        for waker in &self.helper_wakers {
            waker.unpark();
        }
        for handle in self.helpers.drain(..) {
            let _ = handle.join();
        }
    }
}

fn helper_loop<J: Job>(shared: &PoolShared<J>, parker: &Parker, worker: WorkerIndex) {
    debug!(worker, "dsp helper thread started");
    loop {
        parker.park();
        if shared.shutdown.load(Ordering::Acquire) {
            break;
        }
        // SAFETY: the pool unparks helpers only after `init_tick`, and
        // mutates the interpreter only while every helper is parked; for the
        // duration of the tick this shared borrow cannot alias a mutable
        // one.
        let interpreter = unsafe { &*shared.interpreter.get() };
        interpreter.tick(worker);

        shared.pending_helpers.fetch_sub(1, Ordering::AcqRel);
        shared.master_waker.unpark();
    }
    debug!(worker, "dsp helper thread stopped");
}
