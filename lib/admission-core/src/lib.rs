//! Core primitives for receiving and sending admission packets.
use std::future::Future;

use tokio::task::JoinHandle;
use tracing::Instrument as _;

pub mod dispatcher;
pub mod message;
pub mod packetizer;
pub mod panics;
pub mod pooling;

#[doc(hidden)]
pub mod reexport {
    pub use paste::paste;
}

/// Spawns a new asynchronous task, returning a [`JoinHandle`] for it.
///
/// This function is a thin wrapper over [`tokio::spawn`] that attaches the spawned future to the current `tracing`
/// span.
pub fn spawn_traced<F, R>(f: F) -> JoinHandle<R>
where
    F: Future<Output = R> + Send + 'static,
    R: Send + 'static,
{
    tokio::spawn(f.in_current_span())
}
