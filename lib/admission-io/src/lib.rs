//! UDP transport for admission packets.
pub mod net;

mod receiver;
pub use self::receiver::ReceiverConfiguration;

mod send;
pub use self::send::{send_metrics, SendError, SendOptions};
