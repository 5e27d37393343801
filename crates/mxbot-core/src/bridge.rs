//! The synchronous-to-asynchronous bridge.
//!
//! The host runtime is blocking and multi-threaded; the protocol client lives
//! on a single-threaded cooperative event loop. [`Bridge`] connects the two:
//!
//! ```text
//! host thread ──submit(unit)──▶ unbounded mpsc ──▶ executor task ─┐
//!      ▲                                                           │ runs units
//!      └───────────── oneshot completion ◀─────────────────────────┘ one at a time
//! ```
//!
//! - [`Bridge::run`] turns the calling thread into the event loop: it builds a
//!   current-thread tokio runtime, starts the executor task, and drives the
//!   given main future (the long-poll loop) until it returns.
//! - [`Bridge::run_staged`] does the same after a startup future. Units
//!   submitted during startup stay queued and only run once startup succeeds,
//!   so they never observe a half-initialized client.
//! - [`Bridge::submit`] schedules a unit and blocks the calling thread until
//!   the unit's result is available. Units never interleave with each other,
//!   but they do interleave with inbound handling at await points.
//! - Submitting from the event loop thread itself fails with
//!   [`BridgeError::Reentrant`] instead of deadlocking.
//!
//! # Example
//!
//! ```rust,ignore
//! let bridge = Bridge::new();
//! let handle = bridge.clone();
//!
//! std::thread::spawn(move || {
//!     let rooms = handle.submit(|ctx| async move {
//!         Ok(ctx.client.joined_rooms().await?)
//!     });
//! });
//!
//! bridge.run(ctx, async { long_poll().await })?;
//! ```

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::client::BoxedClient;
use crate::error::{BridgeError, CoreError, CoreResult};
use crate::resolver::DirectMessageResolver;

/// What a unit gets to work with on the event loop.
#[derive(Clone)]
pub struct LoopContext {
    pub client: BoxedClient,
    pub resolver: Arc<DirectMessageResolver>,
}

impl LoopContext {
    pub fn new(client: BoxedClient, resolver: Arc<DirectMessageResolver>) -> Self {
        Self { client, resolver }
    }
}

type Unit = Box<dyn FnOnce(LoopContext) -> BoxFuture<'static, ()> + Send>;

#[derive(Default)]
struct BridgeInner {
    /// Present only while the loop runs.
    units: RwLock<Option<mpsc::UnboundedSender<Unit>>>,
    loop_thread: RwLock<Option<ThreadId>>,
}

/// Handle to the event loop. Cheap to clone; every clone targets the same loop.
#[derive(Clone, Default)]
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

impl Bridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.inner.units.read().is_some()
    }

    /// Whether the caller is on the event loop thread.
    pub fn on_loop_thread(&self) -> bool {
        *self.inner.loop_thread.read() == Some(thread::current().id())
    }

    // =========================================================================
    // Submission
    // =========================================================================

    fn enqueue<T, F, Fut>(&self, f: F) -> CoreResult<oneshot::Receiver<CoreResult<T>>>
    where
        F: FnOnce(LoopContext) -> Fut + Send + 'static,
        Fut: Future<Output = CoreResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let unit: Unit = Box::new(move |ctx| {
            async move {
                let result = AssertUnwindSafe(async move { f(ctx).await })
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| Err(BridgeError::Panicked.into()));
                // The caller may have given up waiting.
                let _ = tx.send(result);
            }
            .boxed()
        });

        let units = self.inner.units.read();
        let sender = units.as_ref().ok_or(BridgeError::Closed)?;
        sender.send(unit).map_err(|_| BridgeError::Closed)?;
        trace!("Unit submitted to event loop");
        Ok(rx)
    }

    /// Runs `f` on the event loop and blocks until it completes.
    ///
    /// Must be called from a thread that is not driving an async runtime,
    /// such as a host thread or a `spawn_blocking` worker.
    pub fn submit<T, F, Fut>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(LoopContext) -> Fut + Send + 'static,
        Fut: Future<Output = CoreResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        if self.on_loop_thread() {
            return Err(BridgeError::Reentrant.into());
        }
        let rx = self.enqueue(f)?;
        rx.blocking_recv().map_err(|_| BridgeError::Closed)?
    }

    /// Runs `f` on the event loop and awaits its completion from another runtime.
    pub async fn submit_async<T, F, Fut>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(LoopContext) -> Fut + Send + 'static,
        Fut: Future<Output = CoreResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        if self.on_loop_thread() {
            return Err(BridgeError::Reentrant.into());
        }
        let rx = self.enqueue(f)?;
        rx.await.map_err(|_| BridgeError::Closed)?
    }

    // =========================================================================
    // Event loop
    // =========================================================================

    /// Runs the event loop on the calling thread until `main` completes.
    ///
    /// Units still queued when `main` returns are executed before the loop
    /// shuts down; submissions after that point fail with [`BridgeError::Closed`].
    pub fn run<Fut>(&self, ctx: LoopContext, main: Fut) -> CoreResult<()>
    where
        Fut: Future<Output = CoreResult<()>>,
    {
        self.run_staged(ctx, async { Ok(()) }, |()| main)
    }

    /// Runs `startup`, then `main` with its output, on the calling thread.
    ///
    /// The loop accepts submissions from the start, but the executor only
    /// begins draining them after `startup` succeeds. When `startup` fails,
    /// queued units are dropped and their callers see [`BridgeError::Closed`].
    pub fn run_staged<S, T, M, Fut>(&self, ctx: LoopContext, startup: S, main: M) -> CoreResult<()>
    where
        S: Future<Output = CoreResult<T>>,
        M: FnOnce(T) -> Fut,
        Fut: Future<Output = CoreResult<()>>,
    {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .thread_name("mxbot-worker")
            .build()
            .map_err(|e| CoreError::Runtime(e.to_string()))?;

        let (tx, mut rx) = mpsc::unbounded_channel::<Unit>();
        {
            let mut units = self.inner.units.write();
            if units.is_some() {
                return Err(BridgeError::AlreadyRunning.into());
            }
            *units = Some(tx);
        }
        *self.inner.loop_thread.write() = Some(thread::current().id());
        info!("Event loop started");

        let result = runtime.block_on(async {
            let started = match startup.await {
                Ok(started) => started,
                Err(e) => {
                    self.inner.units.write().take();
                    let dropped = std::iter::from_fn(|| rx.try_recv().ok()).count();
                    if dropped > 0 {
                        debug!(dropped, "Dropped units queued during failed startup");
                    }
                    return Err(e);
                }
            };

            let executor = tokio::spawn(async move {
                while let Some(unit) = rx.recv().await {
                    unit(ctx.clone()).await;
                }
            });

            let result = main(started).await;

            // Closing the sender lets the executor drain and finish.
            self.inner.units.write().take();
            if let Err(e) = executor.await {
                debug!(error = %e, "Unit executor ended abnormally");
            }
            result
        });

        self.inner.units.write().take();
        self.inner.loop_thread.write().take();
        info!("Event loop stopped");
        result
    }
}

/// Stops a running long-poll loop from any thread.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle {
    token: CancellationToken,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests shutdown. Idempotent.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once shutdown was requested.
    pub async fn wait(&self) {
        self.token.cancelled().await;
    }
}
