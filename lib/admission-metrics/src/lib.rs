//! Helpers for declaring internal telemetry.
mod macros;

/// A type that can be rendered as a metric label value.
///
/// Blanket-implemented for anything that implements `Display`, so `static_metrics!` can accept label values of any
/// printable type and only render them once, when the metrics are registered.
pub trait Stringable {
    /// Renders the value as a shared string.
    fn to_shared_string(&self) -> ::metrics::SharedString;
}

impl<T> Stringable for T
where
    T: std::fmt::Display,
{
    fn to_shared_string(&self) -> ::metrics::SharedString {
        std::string::ToString::to_string(&self).into()
    }
}
