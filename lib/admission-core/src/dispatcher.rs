//! Batched datagram receive and bounded concurrent dispatch.
use std::{any::Any, backtrace::Backtrace, io, panic::AssertUnwindSafe, sync::Arc};

use admission_metrics::static_metrics;
use admission_proto::check_checksum;
use async_trait::async_trait;
use futures::FutureExt as _;
use serde::Deserialize;
use snafu::Snafu;
use tokio::{
    select,
    sync::{OwnedSemaphorePermit, Semaphore},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use crate::{message::Message, panics::take_panic_backtrace, pooling::ObjectPool, spawn_traced};

const fn default_batch_size() -> usize {
    128
}

const fn default_max_in_flight() -> usize {
    256
}

/// Dispatcher configuration.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct DispatcherConfiguration {
    /// Number of messages to receive per batch.
    ///
    /// Defaults to 128.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum number of handler invocations running at once.
    ///
    /// Messages received while this many handlers are running are dropped. Clamped to at least one and at most
    /// [`Semaphore::MAX_PERMITS`].
    ///
    /// Defaults to 256.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

impl Default for DispatcherConfiguration {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_in_flight: default_max_in_flight(),
        }
    }
}

/// Processes a single received message.
///
/// The message has already had its checksum verified and removed. Handlers only ever borrow the message, which is
/// returned to its pool once `handle` completes.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Handles the message.
    async fn handle(&self, message: &mut Message);
}

/// Fills messages with received datagrams.
#[async_trait]
pub trait BatchReceiver: Send {
    /// Receives up to `messages.len()` datagrams, returning how many messages were filled.
    ///
    /// Filled messages must be the first `n` in `messages`, each with its length and remote address set. Waits until at
    /// least one datagram is available.
    ///
    /// # Cancel safety
    ///
    /// Implementations must be cancel-safe: if the returned future is dropped before completing, no datagram may have
    /// been consumed.
    async fn receive_batch(&mut self, messages: &mut [Message]) -> io::Result<usize>;
}

/// Observes the dispatch loop.
///
/// Hooks are called from the dispatch loop itself, one at a time, and should return quickly.
pub trait DispatcherObserver: Send {
    /// Called after each batch receive with the number of messages received.
    fn on_read(&mut self, _received: usize) {}

    /// Called for each message dropped because the maximum number of in-flight handlers was reached.
    fn on_drop(&mut self, _message: &Message) {}
}

struct NoopObserver;

impl DispatcherObserver for NoopObserver {}

/// Dispatcher error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum DispatcherError {
    /// Receiving a batch of datagrams failed.
    #[snafu(display("failed to receive batch: {}", source))]
    Receive {
        /// Underlying I/O error.
        source: io::Error,
    },
}

static_metrics! {
    name => DispatcherMetrics,
    prefix => dispatcher,
    metrics => [
        counter(messages_read),
        counter(messages_dispatched),
        counter(messages_dropped),
        counter(checksum_failures),
        counter(handler_panics),
        gauge(handlers_in_flight),
    ],
}

/// Receives datagrams in batches and runs a handler for each one, concurrently.
///
/// The number of concurrently running handlers is bounded. Messages that arrive while the bound is reached are dropped
/// rather than queued, so a slow handler sheds load instead of building up latency. Each handler runs on its own task;
/// a panicking handler is logged and does not affect the dispatcher or other handlers. Install
/// [`set_panic_hook`][crate::panics::set_panic_hook] to have those logs carry the backtrace of the panicking frame.
///
/// Running a dispatcher consumes it. [`run`][Self::run] returns `Ok` once stopped through cancellation, and an error if
/// the receiver failed.
pub struct Dispatcher<R, H, P> {
    receiver: R,
    handler: Arc<H>,
    pool: P,
    batch_size: usize,
    max_in_flight: usize,
    observer: Box<dyn DispatcherObserver>,
    metrics: DispatcherMetrics,
}

impl<R, H, P> Dispatcher<R, H, P>
where
    R: BatchReceiver,
    H: Handler,
    P: ObjectPool<Item = Message>,
{
    /// Creates a new `Dispatcher` with the default configuration.
    pub fn new(receiver: R, handler: H, pool: P) -> Self {
        Self {
            receiver,
            handler: Arc::new(handler),
            pool,
            batch_size: default_batch_size(),
            max_in_flight: default_max_in_flight(),
            observer: Box::new(NoopObserver),
            metrics: DispatcherMetrics::new(),
        }
    }

    /// Creates a new `Dispatcher` from the given configuration.
    pub fn from_configuration(config: &DispatcherConfiguration, receiver: R, handler: H, pool: P) -> Self {
        Self::new(receiver, handler, pool)
            .with_batch_size(config.batch_size)
            .with_max_in_flight(config.max_in_flight)
    }

    /// Sets the number of messages to receive per batch.
    ///
    /// A batch size of zero is treated as one.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Sets the maximum number of handler invocations running at once.
    ///
    /// A value of zero is treated as one, and values above [`Semaphore::MAX_PERMITS`] are capped to it.
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.clamp(1, Semaphore::MAX_PERMITS);
        self
    }

    /// Sets the observer of the dispatch loop.
    pub fn with_observer<O>(mut self, observer: O) -> Self
    where
        O: DispatcherObserver + 'static,
    {
        self.observer = Box::new(observer);
        self
    }

    /// Runs the dispatch loop until `shutdown` is cancelled or receiving fails.
    ///
    /// Cancellation also interrupts a pending receive. Handlers that are already running are not waited on.
    ///
    /// # Errors
    ///
    /// If the receiver returns an error, it is returned and the loop stops.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<(), DispatcherError> {
        let tokens = Arc::new(Semaphore::new(self.max_in_flight));
        let mut slots = (0..self.batch_size).map(|_| self.pool.acquire()).collect::<Vec<_>>();

        debug!(
            batch_size = self.batch_size,
            max_in_flight = self.max_in_flight,
            "Dispatcher started."
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let received = select! {
                biased;

                _ = shutdown.cancelled() => break,
                result = self.receiver.receive_batch(&mut slots) => match result {
                    Ok(received) => received.min(slots.len()),
                    Err(e) => {
                        error!(error = %e, "Failed to receive batch. Stopping dispatcher.");
                        return Err(DispatcherError::Receive { source: e });
                    }
                },
            };

            self.observer.on_read(received);
            self.metrics.messages_read().increment(received as u64);

            for slot in &mut slots[..received] {
                match Arc::clone(&tokens).try_acquire_owned() {
                    Ok(permit) => {
                        let message = std::mem::replace(slot, self.pool.acquire());
                        let guard = InFlightGuard::new(permit, self.metrics.clone());
                        spawn_traced(handle_message(Arc::clone(&self.handler), message, guard));
                    }
                    Err(_) => {
                        // The message stays in its slot and is overwritten by the next receive.
                        self.observer.on_drop(slot);
                        self.metrics.messages_dropped().increment(1);
                    }
                }
            }
        }

        debug!("Dispatcher stopped.");
        Ok(())
    }
}

/// Holds a dispatch token for the lifetime of a handler invocation.
struct InFlightGuard {
    _permit: OwnedSemaphorePermit,
    metrics: DispatcherMetrics,
}

impl InFlightGuard {
    fn new(permit: OwnedSemaphorePermit, metrics: DispatcherMetrics) -> Self {
        metrics.messages_dispatched().increment(1);
        metrics.handlers_in_flight().increment(1.0);

        Self {
            _permit: permit,
            metrics,
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.metrics.handlers_in_flight().decrement(1.0);
    }
}

async fn handle_message<H: Handler>(handler: Arc<H>, mut message: Message, guard: InFlightGuard) {
    process_message(handler.as_ref(), &mut message, &guard.metrics).await;

    // The token is released before the message goes back to its pool.
    drop(guard);
}

async fn process_message<H: Handler>(handler: &H, message: &mut Message, metrics: &DispatcherMetrics) {
    let payload_len = match check_checksum(message.data()) {
        Ok(payload) => payload.len(),
        Err(e) => {
            metrics.checksum_failures().increment(1);
            trace!(remote_addr = ?message.remote_addr(), error = %e, "Dropping message with invalid checksum.");
            return;
        }
    };
    message.truncate(payload_len);

    if let Err(panic) = AssertUnwindSafe(handler.handle(message)).catch_unwind().await {
        metrics.handler_panics().increment(1);
        match take_panic_backtrace() {
            Some(backtrace) => error!(
                remote_addr = ?message.remote_addr(),
                panic = panic_message(&*panic),
                backtrace = %backtrace,
                "Handler panicked while processing message."
            ),
            None => error!(
                remote_addr = ?message.remote_addr(),
                panic = panic_message(&*panic),
                catch_site_backtrace = %Backtrace::force_capture(),
                "Handler panicked while processing message."
            ),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}
