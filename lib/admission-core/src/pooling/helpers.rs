//! Helpers for creating and working with poolable objects.
use std::{marker::PhantomData, sync::Arc};

use super::{Poolable, ReclaimStrategy};

/// Creates a struct that can be stored in an object pool, based on an existing struct definition.
///
/// In order to store a value in an object pool, the item must implement the [`Poolable`] trait. This trait, and overall
/// design of [`ObjectPool`][super::ObjectPool], dictates that a pooled data type actually holds an inner value, which
/// is the value that is actually pooled, while the outer struct is simply a wrapper around the data that ensures it is
/// returned to the object pool when no longer in use.
///
/// Implementors are required to define their data struct, including an implementation of
/// [`Clearable`][super::Clearable], and then use `pooled_newtype!` to wrap it. The generated wrapper exposes the data
/// through `inner` and `inner_mut`.
///
/// ## Usage
///
/// ```rust
/// use admission_core::{pooled_newtype, pooling::Clearable};
///
/// pub struct PreallocatedByteBuffer {
///     data: Vec<u8>,
/// }
///
/// impl Clearable for PreallocatedByteBuffer {
///    fn clear(&mut self) {
///       self.data.clear();
///    }
/// }
///
/// pooled_newtype! {
///    outer => ByteBuffer,
///    inner => PreallocatedByteBuffer,
/// }
///
/// impl ByteBuffer {
///     pub fn len(&self) -> usize {
///         self.inner().data.len()
///     }
///
///     pub fn write_buf(&mut self, buf: &[u8]) {
///         self.inner_mut().data.extend_from_slice(buf);
///     }
/// }
/// ```
#[macro_export]
macro_rules! pooled_newtype {
    (outer => $name:ident, inner => $inner_ty:ty $(,)?) => {
        $crate::reexport::paste! {
            #[doc = "Poolable version of `" $inner_ty "`."]
            pub struct $name {
                strategy_ref: ::std::sync::Arc<dyn $crate::pooling::ReclaimStrategy<$name> + Send + Sync>,
                data: ::std::mem::ManuallyDrop<$inner_ty>,
            }
        }

        impl $name {
            /// Gets a reference to the inner data.
            #[allow(dead_code)]
            pub fn inner(&self) -> &$inner_ty {
                &self.data
            }

            /// Gets a mutable reference to the inner data.
            #[allow(dead_code)]
            pub fn inner_mut(&mut self) -> &mut $inner_ty {
                &mut self.data
            }
        }

        impl $crate::pooling::Poolable for $name {
            type Data = $inner_ty;

            fn from_data(
                strategy_ref: ::std::sync::Arc<dyn $crate::pooling::ReclaimStrategy<Self> + Send + Sync>,
                data: Self::Data,
            ) -> Self {
                Self {
                    strategy_ref,
                    data: ::std::mem::ManuallyDrop::new(data),
                }
            }
        }

        impl Drop for $name {
            fn drop(&mut self) {
                // SAFETY: We never use `self.data` again since we're already dropping `self`.
                let data = unsafe { ::std::mem::ManuallyDrop::take(&mut self.data) };
                self.strategy_ref.reclaim(data);
            }
        }
    };
}

pub use pooled_newtype;

/// An object pool strategy that performs no pooling.
struct NoopStrategy<T> {
    _t: PhantomData<fn() -> T>,
}

impl<T> NoopStrategy<T> {
    const fn new() -> Self {
        Self { _t: PhantomData }
    }
}

impl<T> ReclaimStrategy<T> for NoopStrategy<T>
where
    T: Poolable,
{
    fn reclaim(&self, _: T::Data) {}
}

/// Wraps `data` in its poolable type without attaching it to any object pool.
///
/// The data is simply dropped when the returned value is dropped. This is mostly useful for handing pooled types to
/// code under test.
pub fn unpooled<T>(data: T::Data) -> T
where
    T: Poolable + 'static,
{
    T::from_data(Arc::new(NoopStrategy::<T>::new()), data)
}
