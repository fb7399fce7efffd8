//! Discrete-event kernel
//!
//! Simulated processes are plain futures running on a single-threaded
//! [`LocalPool`]. A process that needs simulated time to pass awaits a
//! [`Hold`], which parks its waker in a timer heap keyed by wakeup time.
//! [`Kernel::run`] drives every ready process until the pool stalls, then
//! advances the clock to the earliest pending wakeup and repeats.

use futures::executor::{LocalPool, LocalSpawner};
use futures::task::LocalSpawnExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use uuid::Uuid;

use super::clock::SimTime;
use super::error::SimulationError;

/// Unique identifier for a simulated process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProcessId(pub Uuid);

impl ProcessId {
    /// Create a new random ProcessId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ProcessId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parked waker
struct Wakeup {
    at: SimTime,
    seq: u64,
    waker: Waker,
}

impl PartialEq for Wakeup {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for Wakeup {}

impl PartialOrd for Wakeup {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Wakeup {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (earliest wakeup first, FIFO on ties)
        (other.at, other.seq).cmp(&(self.at, self.seq))
    }
}

struct TimerQueue {
    now: SimTime,
    next_seq: u64,
    pending: BinaryHeap<Wakeup>,
}

impl TimerQueue {
    fn new() -> Self {
        Self {
            now: SimTime::ZERO,
            next_seq: 0,
            pending: BinaryHeap::new(),
        }
    }

    fn schedule(&mut self, at: SimTime, waker: Waker) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.push(Wakeup { at, seq, waker });
    }

    /// Move the clock to the next wakeup and hand out every waker due by then.
    ///
    /// Returns `None` when nothing is pending or the next wakeup lies beyond `stop`.
    fn advance(&mut self, stop: Option<SimTime>) -> Option<Vec<Waker>> {
        let next = self.pending.peek()?.at;
        if let Some(stop) = stop {
            if next > stop {
                self.now = self.now.max(stop);
                return None;
            }
        }
        self.now = self.now.max(next);

        let mut due = Vec::new();
        while self.pending.peek().is_some_and(|wakeup| wakeup.at <= self.now) {
            if let Some(wakeup) = self.pending.pop() {
                due.push(wakeup.waker);
            }
        }
        Some(due)
    }
}

/// Cloneable access to the kernel from inside simulated processes
#[derive(Clone)]
pub struct KernelHandle {
    timers: Arc<Mutex<TimerQueue>>,
    spawner: LocalSpawner,
}

impl KernelHandle {
    /// Current simulated time
    pub fn now(&self) -> SimTime {
        self.timers.lock().now
    }

    /// Future completing once `delay` simulated seconds have passed
    pub fn hold(&self, delay: f64) -> Hold {
        let until = self.now().after(delay);
        Hold {
            timers: Arc::clone(&self.timers),
            until,
            registered: false,
        }
    }

    /// Spawn a simulated process body
    pub fn spawn<F>(&self, process: &str, body: F) -> Result<(), SimulationError>
    where
        F: Future<Output = ()> + 'static,
    {
        self.spawner
            .spawn_local(body)
            .map_err(|err| SimulationError::Spawn {
                process: process.to_string(),
                detail: err.to_string(),
            })
    }

    /// Number of parked wakeups
    pub fn pending_wakeups(&self) -> usize {
        self.timers.lock().pending.len()
    }
}

impl fmt::Debug for KernelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelHandle")
            .field("now", &self.now())
            .field("pending_wakeups", &self.pending_wakeups())
            .finish()
    }
}

/// Future returned by [`KernelHandle::hold`], resolving to the wakeup time
pub struct Hold {
    timers: Arc<Mutex<TimerQueue>>,
    until: SimTime,
    registered: bool,
}

impl Future for Hold {
    type Output = SimTime;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<SimTime> {
        let this = self.get_mut();
        let mut timers = this.timers.lock();
        if timers.now >= this.until {
            return Poll::Ready(timers.now);
        }
        if !this.registered {
            timers.schedule(this.until, cx.waker().clone());
            this.registered = true;
        }
        Poll::Pending
    }
}

/// Single-threaded discrete-event kernel
pub struct Kernel {
    pool: LocalPool,
    handle: KernelHandle,
}

impl Kernel {
    /// Create a kernel with the clock at zero
    pub fn new() -> Self {
        let pool = LocalPool::new();
        let handle = KernelHandle {
            timers: Arc::new(Mutex::new(TimerQueue::new())),
            spawner: pool.spawner(),
        };
        Self { pool, handle }
    }

    /// Handle for spawning processes and reading the clock
    pub fn handle(&self) -> KernelHandle {
        self.handle.clone()
    }

    /// Current simulated time
    pub fn now(&self) -> SimTime {
        self.handle.now()
    }

    /// Run until no process can make progress or the next wakeup lies beyond `stop`.
    ///
    /// Returns the simulated time at which the run ended.
    pub fn run(&mut self, stop: Option<SimTime>) -> SimTime {
        loop {
            self.pool.run_until_stalled();
            let due = self.handle.timers.lock().advance(stop);
            match due {
                Some(wakers) => {
                    tracing::trace!("Advanced clock to {} ({} wakeups)", self.now(), wakers.len());
                    for waker in wakers {
                        waker.wake();
                    }
                }
                None => break,
            }
        }
        self.now()
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}

/// Identity and clock access of one simulated thread of control
#[derive(Clone)]
pub struct SimProcess {
    id: ProcessId,
    name: Arc<str>,
    kernel: KernelHandle,
}

impl SimProcess {
    /// Create a process attached to `kernel`
    pub fn new(name: impl Into<String>, kernel: KernelHandle) -> Self {
        Self {
            id: ProcessId::new(),
            name: Arc::from(name.into()),
            kernel,
        }
    }

    /// A new process on the same kernel, named below this one
    pub fn child(&self, label: &str) -> Self {
        Self::new(format!("{}/{}", self.name, label), self.kernel.clone())
    }

    /// Process id
    pub fn id(&self) -> ProcessId {
        self.id
    }

    /// Process name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Kernel the process runs on
    pub fn kernel(&self) -> &KernelHandle {
        &self.kernel
    }

    /// Current simulated time
    pub fn now(&self) -> SimTime {
        self.kernel.now()
    }

    /// Let `delay` simulated seconds pass
    pub fn hold(&self, delay: f64) -> Hold {
        self.kernel.hold(delay)
    }
}

impl fmt::Debug for SimProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimProcess")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_processes_wake_in_time_order() {
        let mut kernel = Kernel::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        for (name, delay) in [("slow", 3.0), ("fast", 1.0), ("mid", 2.0)] {
            let process = SimProcess::new(name, kernel.handle());
            let log = Rc::clone(&log);
            kernel
                .handle()
                .spawn(name, async move {
                    let woke = process.hold(delay).await;
                    log.borrow_mut().push((process.name().to_string(), woke.as_secs()));
                })
                .unwrap();
        }

        let end = kernel.run(None);
        assert_eq!(end, SimTime::new(3.0));
        assert_eq!(
            *log.borrow(),
            vec![
                ("fast".to_string(), 1.0),
                ("mid".to_string(), 2.0),
                ("slow".to_string(), 3.0)
            ]
        );
    }

    #[test]
    fn test_zero_hold_completes_immediately() {
        let mut kernel = Kernel::new();
        let process = SimProcess::new("p", kernel.handle());
        let done = Rc::new(RefCell::new(false));
        let flag = Rc::clone(&done);
        kernel
            .handle()
            .spawn("p", async move {
                process.hold(0.0).await;
                process.hold(-5.0).await;
                *flag.borrow_mut() = true;
            })
            .unwrap();
        assert_eq!(kernel.run(None), SimTime::ZERO);
        assert!(*done.borrow());
    }

    #[test]
    fn test_stop_time_halts_run() {
        let mut kernel = Kernel::new();
        let process = SimProcess::new("p", kernel.handle());
        let finished = Rc::new(RefCell::new(false));
        let flag = Rc::clone(&finished);
        kernel
            .handle()
            .spawn("p", async move {
                process.hold(10.0).await;
                *flag.borrow_mut() = true;
            })
            .unwrap();

        assert_eq!(kernel.run(Some(SimTime::new(4.0))), SimTime::new(4.0));
        assert!(!*finished.borrow());
        assert_eq!(kernel.handle().pending_wakeups(), 1);
    }

    #[test]
    fn test_child_process_names() {
        let kernel = Kernel::new();
        let parent = SimProcess::new("request-0", kernel.handle());
        let child = parent.child("fork-1");
        assert_eq!(child.name(), "request-0/fork-1");
        assert_ne!(child.id(), parent.id());
    }
}
