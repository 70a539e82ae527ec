use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Depth was below the limit; request runs immediately.
    FastPath,
    /// Depth was at the limit but a slot opened before `max_wait`
    /// elapsed.
    SlowPath { waited: Duration },
    /// `max_wait` elapsed before a slot opened.
    TimedOut,
}

/// A bounded FIFO admission gate, meant to run one instance per route per
/// monoio worker thread (a `RouteManager<RequestQueue>` per worker would
/// hold them, mirroring the proxy's per-route pipeline cache). Because
/// monoio is thread-per-core and connections are never migrated between
/// workers, "depth N" is necessarily sharded N-ways across cores rather
/// than being one process-wide counter — a request on worker 0 only ever
/// contends with other requests already admitted on worker 0.
///
/// Not yet wired into `ProxyWorker`/`handle_connection` — no route
/// currently opts into queue admission, so this is tested in isolation.
pub struct RequestQueue {
    depth_limit: usize,
    in_flight: AtomicUsize,
    waiters: Rc<RefCell<Vec<Rc<RefCell<bool>>>>>,
}

pub struct QueuePermit<'a> {
    queue: &'a RequestQueue,
}

impl Drop for QueuePermit<'_> {
    fn drop(&mut self) {
        self.queue.in_flight.fetch_sub(1, Ordering::AcqRel);
        self.queue.wake_one();
    }
}

impl RequestQueue {
    pub fn new(depth_limit: usize) -> Self {
        Self {
            depth_limit,
            in_flight: AtomicUsize::new(0),
            waiters: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn depth_limit(&self) -> usize {
        self.depth_limit
    }

    pub fn current_depth(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    fn wake_one(&self) {
        let mut waiters = self.waiters.borrow_mut();
        if let Some(flag) = waiters.first() {
            *flag.borrow_mut() = true;
            waiters.remove(0);
        }
    }

    fn try_admit(&self) -> bool {
        loop {
            let current = self.in_flight.load(Ordering::Acquire);
            if current >= self.depth_limit {
                return false;
            }
            if self
                .in_flight
                .compare_exchange(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return true;
            }
        }
    }

    /// Admit a request, waiting up to `max_wait` on the FIFO queue if
    /// the depth limit is currently saturated. Returns a permit that
    /// releases the slot on drop (covers both completion and
    /// cancellation — a dropped future releases its permit the same as
    /// a completed one, so a cancelled request never leaks a slot).
    pub async fn admit(&self, max_wait: Duration) -> (Admission, Option<QueuePermit<'_>>) {
        if self.try_admit() {
            return (Admission::FastPath, Some(QueuePermit { queue: self }));
        }

        let start = monoio::time::Instant::now();
        let flag = Rc::new(RefCell::new(false));
        self.waiters.borrow_mut().push(flag.clone());

        let wait_result = monoio::time::timeout(max_wait, async {
            loop {
                if *flag.borrow() && self.try_admit() {
                    return;
                }
                monoio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await;

        match wait_result {
            Ok(()) => (Admission::SlowPath { waited: start.elapsed() }, Some(QueuePermit { queue: self })),
            Err(_) => {
                self.waiters.borrow_mut().retain(|f| !Rc::ptr_eq(f, &flag));
                (Admission::TimedOut, None)
            }
        }
    }
}
