#[doc(hidden)]
#[macro_export]
macro_rules! metric_handle_type {
    (counter) => {
        ::metrics::Counter
    };
    (gauge) => {
        ::metrics::Gauge
    };
    (histogram) => {
        ::metrics::Histogram
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! register_static_metric {
    (counter, $metric_name:expr, $labels:expr) => {
        ::metrics::counter!($metric_name, $labels)
    };
    (gauge, $metric_name:expr, $labels:expr) => {
        ::metrics::gauge!($metric_name, $labels)
    };
    (histogram, $metric_name:expr, $labels:expr) => {
        ::metrics::histogram!($metric_name, $labels)
    };
    ($($other:tt)*) => {
        compile_error!("metric type must be `counter`, `gauge`, or `histogram`");
    };
}

/// Declares a container struct holding a fixed set of metric handles.
///
/// Each metric is registered once, when the container is created, under the name `<prefix>_<metric>`. A fixed set of
/// labels can be declared as typed constructor parameters; their values are rendered to strings only at registration
/// time. Accessors named after each metric return the underlying handle.
///
/// The generated struct is `Clone`, so the same handles can be shared with spawned tasks.
///
/// ## Example
///
/// ```rust
/// # use admission_metrics::static_metrics;
/// static_metrics!(
///    name => ListenerMetrics,
///    prefix => listener,
///    labels => [listen_addr: String],
///    metrics => [
///        counter(packets_received),
///        gauge(handlers_in_flight),
///    ],
/// );
///
/// let metrics = ListenerMetrics::new("0.0.0.0:6969".to_string());
/// metrics.packets_received().increment(1);
/// metrics.handlers_in_flight().set(3.0);
/// ```
#[macro_export]
macro_rules! static_metrics {
    (name => $name:ident, prefix => $prefix:ident, metrics => [$($metric_type:ident($metric_name:ident)),+ $(,)?] $(,)?) => {
        $crate::static_metrics!(name => $name, prefix => $prefix, labels => [], metrics => [$($metric_type($metric_name)),+]);
    };
    (name => $name:ident, prefix => $prefix:ident, labels => [$($label_key:ident: $label_ty:ty),*], metrics => [$($metric_type:ident($metric_name:ident)),+ $(,)?] $(,)?) => {
        #[derive(Clone)]
        pub(crate) struct $name {
            $(
                $metric_name: $crate::metric_handle_type!($metric_type),
            )*
        }

        #[allow(dead_code)]
        impl $name {
            pub fn new($($label_key: $label_ty,)*) -> Self {
                #[allow(unused_imports)]
                use $crate::Stringable as _;

                let labels: ::std::vec::Vec<::metrics::Label> = vec![
                    $(
                        ::metrics::Label::new(stringify!($label_key), $label_key.to_shared_string()),
                    )*
                ];

                Self {
                $(
                    $metric_name: $crate::register_static_metric!($metric_type, concat!(stringify!($prefix), "_", stringify!($metric_name)), labels.iter()),
                )*
                }
            }

            $(
                pub fn $metric_name(&self) -> &$crate::metric_handle_type!($metric_type) {
                    &self.$metric_name
                }
            )*
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(stringify!($name))
            }
        }
    };
}
