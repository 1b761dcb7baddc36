use std::{
    collections::BTreeMap,
    io,
    net::{SocketAddr, ToSocketAddrs as _},
};

use admission_core::packetizer::{MetricsSource, Packetizer, PacketizerError, PacketizerSummary};
use admission_proto::FloatEncoding;
use serde::Deserialize;
use snafu::{OptionExt as _, ResultExt as _, Snafu};
use tracing::debug;

use crate::net::UdpSink;

fn default_address() -> String {
    "127.0.0.1:6969".to_string()
}

/// Options for [`send_metrics`].
#[derive(Clone, Debug, Deserialize)]
pub struct SendOptions {
    /// Application name carried in every packet.
    pub application: String,

    /// Instance ID carried in every packet.
    #[serde(default)]
    pub instance_id: String,

    /// Address to send packets to, as `host:port`.
    ///
    /// Defaults to `127.0.0.1:6969`.
    #[serde(default = "default_address")]
    pub address: String,

    /// Packet size budget, in bytes. Zero selects the default of 1024.
    #[serde(default)]
    pub packet_size: usize,

    /// Float width of the values in each packet.
    ///
    /// Defaults to `float16`.
    #[serde(default)]
    pub float_encoding: FloatEncoding,

    /// Headers carried in every packet.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl SendOptions {
    /// Creates a new `SendOptions` for the given application with all other options at their defaults.
    pub fn new<A: Into<String>>(application: A) -> Self {
        Self {
            application: application.into(),
            instance_id: String::new(),
            address: default_address(),
            packet_size: 0,
            float_encoding: FloatEncoding::default(),
            headers: BTreeMap::new(),
        }
    }

    /// Builds a [`Packetizer`] from these options.
    pub fn packetizer(&self) -> Packetizer {
        self.headers.iter().fold(
            Packetizer::new(self.application.clone(), self.instance_id.clone().into_bytes())
                .with_packet_size(self.packet_size)
                .with_float_encoding(self.float_encoding),
            |packetizer, (key, value)| packetizer.with_header(key.clone(), value.clone()),
        )
    }
}

/// Send error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum SendError {
    /// The target address could not be resolved.
    #[snafu(display("failed to resolve target address '{}': {}", address, source))]
    Resolve {
        /// Configured address.
        address: String,

        /// Source of the error.
        source: io::Error,
    },

    /// The target address resolved to nothing.
    #[snafu(display("target address '{}' resolved to no addresses", address))]
    NoAddresses {
        /// Configured address.
        address: String,
    },

    /// The sending socket could not be set up.
    #[snafu(display("failed to connect to {}: {}", address, source))]
    Connect {
        /// Resolved address.
        address: SocketAddr,

        /// Source of the error.
        source: io::Error,
    },

    /// Packets could not be built.
    #[snafu(display("{}", source))]
    Packetize {
        /// Source of the error.
        source: PacketizerError,
    },
}

/// Sends every sample from `source` to the configured address.
///
/// Resolves the address, connects a UDP socket to the first resolved address, and runs a [`Packetizer`] over it.
/// Individual datagram send failures are counted in the returned summary rather than failing the call.
///
/// This blocks the calling thread while sending.
///
/// ## Errors
///
/// If the address cannot be resolved, the socket cannot be connected, or the packet preamble is invalid, an error is
/// returned.
pub fn send_metrics<M>(options: &SendOptions, source: &M) -> Result<PacketizerSummary, SendError>
where
    M: MetricsSource + ?Sized,
{
    let address = options
        .address
        .to_socket_addrs()
        .context(Resolve {
            address: options.address.clone(),
        })?
        .next()
        .context(NoAddresses {
            address: options.address.clone(),
        })?;

    let mut sink = UdpSink::connect(address).context(Connect { address })?;
    let summary = options.packetizer().send(&mut sink, source).context(Packetize)?;
    debug!(
        target_addr = %address,
        packets_sent = summary.packets_sent,
        samples_written = summary.samples_written,
        "Sent metrics."
    );

    Ok(summary)
}
