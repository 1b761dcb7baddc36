use std::sync::Arc;

use crossbeam_queue::ArrayQueue;

use super::{Clearable as _, ObjectPool, PoolMetrics, Poolable, ReclaimStrategy};

/// An object pool that retains a bounded number of idle items.
///
/// Acquiring never waits: an idle item is handed out when one is available, and a new item is built otherwise.
/// Returned items are cleared and kept for reuse until `capacity` items are idle, after which further returns are
/// dropped. Idle items are retained indefinitely.
pub struct BoundedObjectPool<T: Poolable> {
    strategy: Arc<BoundedStrategy<T>>,
}

impl<T> BoundedObjectPool<T>
where
    T: Poolable + 'static,
    T::Data: Default,
{
    /// Creates a new `BoundedObjectPool` that retains up to `capacity` idle items.
    pub fn new<S>(pool_name: S, capacity: usize) -> Self
    where
        S: Into<String>,
    {
        Self::with_builder(pool_name, capacity, T::Data::default)
    }
}

impl<T> BoundedObjectPool<T>
where
    T: Poolable + 'static,
{
    /// Creates a new `BoundedObjectPool` that retains up to `capacity` idle items, with the given item builder.
    ///
    /// `builder` is called to construct each item. At least one idle item is always retained.
    pub fn with_builder<S, B>(pool_name: S, capacity: usize, builder: B) -> Self
    where
        S: Into<String>,
        B: Fn() -> T::Data + Send + Sync + 'static,
    {
        Self {
            strategy: Arc::new(BoundedStrategy {
                items: ArrayQueue::new(capacity.max(1)),
                builder: Box::new(builder),
                metrics: PoolMetrics::new(pool_name.into()),
            }),
        }
    }

    /// Returns the number of idle items currently held by the pool.
    pub fn available(&self) -> usize {
        self.strategy.items.len()
    }

    /// Returns the maximum number of idle items the pool retains.
    pub fn capacity(&self) -> usize {
        self.strategy.items.capacity()
    }
}

impl<T: Poolable> Clone for BoundedObjectPool<T> {
    fn clone(&self) -> Self {
        Self {
            strategy: Arc::clone(&self.strategy),
        }
    }
}

impl<T> ObjectPool for BoundedObjectPool<T>
where
    T: Poolable + Send + Unpin + 'static,
{
    type Item = T;

    fn acquire(&self) -> Self::Item {
        let data = self.strategy.acquire();
        let strategy_ref = Arc::clone(&self.strategy);
        T::from_data(strategy_ref, data)
    }
}

struct BoundedStrategy<T: Poolable> {
    items: ArrayQueue<T::Data>,
    builder: Box<dyn Fn() -> T::Data + Send + Sync>,
    metrics: PoolMetrics,
}

impl<T: Poolable> BoundedStrategy<T> {
    fn acquire(&self) -> T::Data {
        self.metrics.acquired().increment(1);
        self.metrics.in_use().increment(1.0);

        match self.items.pop() {
            Some(data) => data,
            None => {
                self.metrics.created().increment(1);
                (self.builder)()
            }
        }
    }
}

impl<T: Poolable> ReclaimStrategy<T> for BoundedStrategy<T> {
    fn reclaim(&self, mut data: T::Data) {
        data.clear();

        self.metrics.released().increment(1);
        self.metrics.in_use().decrement(1.0);

        if self.items.push(data).is_err() {
            self.metrics.discarded().increment(1);
        }
    }
}
