//! Object pooling.
use std::sync::Arc;

use admission_metrics::static_metrics;

mod bounded;
pub use self::bounded::BoundedObjectPool;

pub mod helpers;

/// An item that can be cleared.
pub trait Clearable {
    /// Clears the item.
    fn clear(&mut self) {}
}

/// An item that is poolable.
///
/// This meta-trait is used to mark a type as being poolable, where the type itself wraps a piece of data
/// (`Self::Data`), and the data itself is the actual value which gets pooled and reused.
///
/// The wrapping type is what callers hold on to. When it is dropped, the data is handed back to the pool through the
/// reclaim strategy, so pooled data cannot be leaked by forgetting to return it, whether the holder finishes normally,
/// returns early, or unwinds.
pub trait Poolable {
    /// The inner data value that is stored in the object pool.
    type Data: Clearable + Send + 'static;

    /// Creates a new `Self` from the object pool strategy and data value.
    fn from_data(strategy: Arc<dyn ReclaimStrategy<Self> + Send + Sync>, data: Self::Data) -> Self;
}

/// Object pool reclamation strategy.
///
/// This trait is used to define the strategy for reclaiming items to an object pool.
pub trait ReclaimStrategy<T>
where
    T: Poolable,
{
    /// Returns an item to the object pool.
    fn reclaim(&self, data: T::Data);
}

/// An object pool.
pub trait ObjectPool: Send + Sync {
    /// The pooled value.
    type Item: Send + Unpin;

    /// Acquires an item from the object pool.
    ///
    /// Acquisition never waits: implementations hand out a new item when no idle item is available.
    fn acquire(&self) -> Self::Item;
}

static_metrics! {
    name => PoolMetrics,
    prefix => object_pool,
    labels => [pool_name: String],
    metrics => [
        counter(acquired),
        counter(released),
        counter(created),
        counter(discarded),
        gauge(in_use),
    ],
}
