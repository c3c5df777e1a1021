#[cfg(not(feature = "loom"))]
mod imp {
    use crate::types::NodeIndex;
    use crossbeam_queue::ArrayQueue;

    /// Bounded multi-producer multi-consumer queue of ready nodes.
    ///
    /// Backed by a fixed-capacity lock-free ring buffer. The interpreter
    /// sizes it to the installed graph's node count, which is the worst-case
    /// simultaneous readiness, so a push can never find the queue full on a
    /// validated graph.
    #[derive(Debug)]
    pub(crate) struct ReadyFifo(ArrayQueue<NodeIndex>);

    impl ReadyFifo {
        pub(crate) fn with_capacity(capacity: usize) -> Self {
            Self(ArrayQueue::new(capacity.max(1)))
        }

        pub(crate) fn push(&self, node: NodeIndex) {
            self.0.push(node).expect("ReadyFifo::push: [1]");
        }

        pub(crate) fn pop(&self) -> Option<NodeIndex> {
            self.0.pop()
        }

        pub(crate) fn is_empty(&self) -> bool {
            self.0.is_empty()
        }
    }
}

#[cfg(feature = "loom")]
mod imp {
    use crate::types::NodeIndex;
    use loom::sync::Mutex;
    use std::collections::VecDeque;

    /// Loom stand-in for the lock-free ready queue.
    ///
    /// Loom cannot explore the internals of a foreign lock-free structure,
    /// and dequeue order is not part of the scheduler's contract (the DAG's
    /// precedence is the only ordering guarantee), so a mutex-guarded deque
    /// models the queue faithfully for the protocol under test.
    #[derive(Debug)]
    pub(crate) struct ReadyFifo(Mutex<VecDeque<NodeIndex>>);

    impl ReadyFifo {
        pub(crate) fn with_capacity(capacity: usize) -> Self {
            Self(Mutex::new(VecDeque::with_capacity(capacity.max(1))))
        }

        pub(crate) fn push(&self, node: NodeIndex) {
            self.0.lock().expect("ReadyFifo::push: [1]").push_back(node);
        }

        pub(crate) fn pop(&self) -> Option<NodeIndex> {
            self.0.lock().expect("ReadyFifo::pop: [1]").pop_front()
        }

        pub(crate) fn is_empty(&self) -> bool {
            self.0.lock().expect("ReadyFifo::is_empty: [1]").is_empty()
        }
    }
}

pub(crate) use imp::ReadyFifo;
