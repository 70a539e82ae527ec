use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

/// A single-threaded, `tokio::sync::Notify`-shaped wakeup primitive.
/// `tokio::sync::Notify` requires a tokio runtime to drive its internal
/// atomics efficiently and pulls in a dependency the monoio hot path
/// does not otherwise need; this reimplements just the
/// `notify_all`/`notified().await` shape used by the aggregate
/// dispatcher, entirely thread-local (`Rc<RefCell<_>>`, no atomics).
#[derive(Default)]
pub struct LocalNotify {
    inner: RefCell<Inner>,
}

#[derive(Default)]
struct Inner {
    fired: bool,
    wakers: Vec<Waker>,
}

impl LocalNotify {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wake every waiter currently registered, and mark the notify as
    /// already-fired so any `notified()` call made after this point
    /// resolves immediately (single-shot latch semantics, matching how
    /// the aggregate dispatcher uses one `LocalNotify` per request).
    pub fn notify_all(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.fired = true;
        for w in inner.wakers.drain(..) {
            w.wake();
        }
    }

    pub fn notified(&self) -> Notified<'_> {
        Notified { notify: self }
    }
}

pub struct Notified<'a> {
    notify: &'a LocalNotify,
}

impl Future for Notified<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let mut inner = self.notify.inner.borrow_mut();
        if inner.fired {
            return Poll::Ready(());
        }
        inner.wakers.push(cx.waker().clone());
        Poll::Pending
    }
}

/// Shareable handle, since every spawned backend task needs its own
/// clone of the `Rc` pointing at the same latch.
pub type SharedNotify = Rc<LocalNotify>;

#[cfg(test)]
mod tests {
    use super::*;

    #[monoio::test]
    async fn notify_after_wait_resolves() {
        let notify = Rc::new(LocalNotify::new());
        let n2 = notify.clone();
        monoio::spawn(async move {
            monoio::time::sleep(std::time::Duration::from_millis(5)).await;
            n2.notify_all();
        });
        notify.notified().await;
    }

    #[monoio::test]
    async fn notify_before_wait_still_resolves_immediately() {
        let notify = LocalNotify::new();
        notify.notify_all();
        notify.notified().await;
    }
}
