use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

/// A boxed, `!Send` future — everything in the gateway's data plane runs
/// thread-per-core on a single monoio reactor, so there is no need (and no
/// ability) to move these across threads.
pub type LocalFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// The terminal or next-in-chain handler a middleware wraps.
///
/// Suspension-capable modules (the request queue, the CONNECT tunnel) need
/// a real continuation rather than a phase callback, since they must
/// `.await` around the rest of the chain (e.g. to hold a semaphore permit
/// while the inner handler runs). `Next` erases that continuation behind a
/// boxed closure returning a boxed future.
pub type Next<Req, Resp> = Rc<dyn Fn(Req) -> LocalFuture<'static, Resp>>;

/// A middleware wraps a handler with a handler: given what comes next, it
/// returns a new handler. Implementations decide whether to call `next` at
/// all (a middleware that short-circuits writes a response and simply does
/// not invoke it).
pub trait Middleware<Req: 'static, Resp: 'static> {
    fn wrap(&self, next: Next<Req, Resp>) -> Next<Req, Resp>;
}

impl<Req, Resp, F> Middleware<Req, Resp> for F
where
    Req: 'static,
    Resp: 'static,
    F: Fn(Next<Req, Resp>) -> Next<Req, Resp>,
{
    fn wrap(&self, next: Next<Req, Resp>) -> Next<Req, Resp> {
        self(next)
    }
}

/// An ordered composition of middlewares terminated by a final handler.
///
/// Composition applies middlewares in reverse index order, so index 0 is
/// the outermost observer: it sees the request first and the response
/// last. There is no runtime branching besides what middlewares
/// themselves perform, and no back-edge — responses flow only through the
/// inverted call stack built by `build`.
pub struct Chain<Req: 'static, Resp: 'static> {
    middlewares: Vec<Rc<dyn Middleware<Req, Resp>>>,
}

impl<Req: 'static, Resp: 'static> Chain<Req, Resp> {
    /// Construct a chain from a list of middlewares, outermost first.
    pub fn new(middlewares: Vec<Rc<dyn Middleware<Req, Resp>>>) -> Self {
        Self { middlewares }
    }

    pub fn empty() -> Self {
        Self { middlewares: Vec::new() }
    }

    /// Return a *new* chain with `m` appended as the innermost middleware
    /// (closest to the terminal handler). Immutable composition: `self` is
    /// untouched.
    pub fn append(&self, m: Rc<dyn Middleware<Req, Resp>>) -> Self {
        let mut middlewares = self.middlewares.clone();
        middlewares.push(m);
        Self { middlewares }
    }

    /// Return a *new* chain with `m` prepended as the outermost middleware.
    pub fn prepend(&self, m: Rc<dyn Middleware<Req, Resp>>) -> Self {
        let mut middlewares = vec![m];
        middlewares.extend(self.middlewares.iter().cloned());
        Self { middlewares }
    }

    /// Return a *new* chain with `other`'s middlewares appended after this
    /// chain's.
    pub fn extend(&self, other: &Chain<Req, Resp>) -> Self {
        let mut middlewares = self.middlewares.clone();
        middlewares.extend(other.middlewares.iter().cloned());
        Self { middlewares }
    }

    /// Conditionally include a middleware at build time only — the chain
    /// itself never branches at request time.
    pub fn use_if(&self, cond: bool, m: Rc<dyn Middleware<Req, Resp>>) -> Self {
        if cond {
            self.append(m)
        } else {
            Self { middlewares: self.middlewares.clone() }
        }
    }

    /// Compose the chain around `terminal`, applying middlewares in
    /// reverse index order so that index 0 ends up outermost.
    pub fn build(&self, terminal: Next<Req, Resp>) -> Next<Req, Resp> {
        let mut handler = terminal;
        for m in self.middlewares.iter().rev() {
            handler = m.wrap(handler);
        }
        handler
    }
}

impl<Req: 'static, Resp: 'static> Clone for Chain<Req, Resp> {
    fn clone(&self) -> Self {
        Self { middlewares: self.middlewares.clone() }
    }
}
