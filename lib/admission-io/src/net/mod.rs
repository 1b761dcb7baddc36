//! Network primitives.
mod listener;
pub use self::listener::{bind_udp, ListenerError};

mod sink;
pub use self::sink::UdpSink;

mod udp;
pub use self::udp::UdpBatchReceiver;
