//! Packing metric samples into size-bounded packets.
use std::io;

use admission_metrics::static_metrics;
use admission_proto::{add_checksum, EncodeError, FloatEncoding, Writer, CHECKSUM_LEN};
use snafu::Snafu;
use tracing::{debug, warn};

/// Default packet size budget, in bytes, including the checksum trailer.
pub const DEFAULT_PACKET_SIZE: usize = 1024;

/// A destination for encoded packets.
pub trait PacketSink {
    /// Sends a single packet.
    fn send(&mut self, packet: &[u8]) -> io::Result<()>;
}

impl<S: PacketSink + ?Sized> PacketSink for &mut S {
    fn send(&mut self, packet: &[u8]) -> io::Result<()> {
        (**self).send(packet)
    }
}

/// A source of metric samples.
pub trait MetricsSource {
    /// Calls `f` once for every sample.
    fn for_each(&self, f: &mut dyn FnMut(&str, f64));
}

impl<M: MetricsSource + ?Sized> MetricsSource for &M {
    fn for_each(&self, f: &mut dyn FnMut(&str, f64)) {
        (**self).for_each(f)
    }
}

impl<S: AsRef<str>> MetricsSource for [(S, f64)] {
    fn for_each(&self, f: &mut dyn FnMut(&str, f64)) {
        for (name, value) in self {
            f(name.as_ref(), *value);
        }
    }
}

impl<S: AsRef<str>> MetricsSource for Vec<(S, f64)> {
    fn for_each(&self, f: &mut dyn FnMut(&str, f64)) {
        self.as_slice().for_each(f)
    }
}

/// A [`MetricsSource`] backed by a closure. See [`from_fn`].
pub struct FromFn<F>(F);

/// Creates a [`MetricsSource`] from a closure that emits samples to the callback it is given.
pub fn from_fn<F>(f: F) -> FromFn<F>
where
    F: Fn(&mut dyn FnMut(&str, f64)),
{
    FromFn(f)
}

impl<F> MetricsSource for FromFn<F>
where
    F: Fn(&mut dyn FnMut(&str, f64)),
{
    fn for_each(&self, f: &mut dyn FnMut(&str, f64)) {
        (self.0)(f)
    }
}

/// Packetizer error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum PacketizerError {
    /// The packet preamble could not be written.
    ///
    /// This indicates an invalid application, instance ID, or header set, and would fail for every packet.
    #[snafu(display("failed to start packet: {}", source))]
    Preamble {
        /// Underlying encode error.
        source: EncodeError,
    },

    /// A sample could not be appended for a reason that would repeat for every later sample.
    #[snafu(display("failed to append sample: {}", source))]
    Append {
        /// Underlying encode error.
        source: EncodeError,
    },
}

/// Outcome of a [`Packetizer::send`] run.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PacketizerSummary {
    /// Packets handed to the sink successfully.
    pub packets_sent: usize,

    /// Packets the sink failed to send.
    pub send_failures: usize,

    /// Samples written into a packet.
    pub samples_written: usize,

    /// Samples skipped because they could not be encoded.
    pub samples_skipped: usize,
}

static_metrics! {
    name => PacketizerMetrics,
    prefix => packetizer,
    labels => [application: String],
    metrics => [
        counter(packets_sent),
        counter(send_failures),
        counter(samples_written),
        counter(samples_skipped),
    ],
}

/// Greedily packs metric samples into packets no larger than a byte budget.
///
/// Samples are appended to the current packet until the next one would push it past the budget, at which point the
/// packet is checksummed and sent and a new one is started. A sample that does not fit within the budget even on its
/// own is sent in a packet by itself. Samples that cannot be encoded, such as values not representable at the
/// configured float width, are skipped.
pub struct Packetizer {
    application: String,
    instance_id: Vec<u8>,
    headers: Vec<(Vec<u8>, Vec<u8>)>,
    packet_size: usize,
    float_encoding: FloatEncoding,
    metrics: PacketizerMetrics,
}

impl Packetizer {
    /// Creates a new `Packetizer` for the given application and instance.
    ///
    /// Defaults to a packet size of 1024 bytes and 16-bit floats.
    pub fn new<A, I>(application: A, instance_id: I) -> Self
    where
        A: Into<String>,
        I: Into<Vec<u8>>,
    {
        let application = application.into();
        let metrics = PacketizerMetrics::new(application.clone());

        Self {
            application,
            instance_id: instance_id.into(),
            headers: Vec::new(),
            packet_size: DEFAULT_PACKET_SIZE,
            float_encoding: FloatEncoding::default(),
            metrics,
        }
    }

    /// Sets the packet size budget, in bytes, including the checksum trailer.
    ///
    /// A size of zero selects the default of 1024 bytes.
    pub fn with_packet_size(mut self, packet_size: usize) -> Self {
        self.packet_size = if packet_size == 0 {
            DEFAULT_PACKET_SIZE
        } else {
            packet_size
        };
        self
    }

    /// Sets the float encoding of sample values.
    pub fn with_float_encoding(mut self, float_encoding: FloatEncoding) -> Self {
        self.float_encoding = float_encoding;
        self
    }

    /// Adds a header written at the start of every packet.
    pub fn with_header<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<Vec<u8>>,
        V: Into<Vec<u8>>,
    {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Returns the packet size budget.
    pub fn packet_size(&self) -> usize {
        self.packet_size
    }

    /// Packs every sample from `source` into packets and sends them to `sink`.
    ///
    /// Send failures are logged and counted, and do not stop the remaining samples from being sent.
    ///
    /// # Errors
    ///
    /// If the packet preamble cannot be written, or a sample fails to encode for a reason other than its own name or
    /// value, an error variant will be returned. Samples still buffered at the time of the failure are not sent.
    pub fn send<S, M>(&self, sink: &mut S, source: &M) -> Result<PacketizerSummary, PacketizerError>
    where
        S: PacketSink + ?Sized,
        M: MetricsSource + ?Sized,
    {
        let mut state = PacketState {
            packetizer: self,
            sink,
            writer: Writer::new(self.float_encoding),
            buf: Vec::with_capacity(self.packet_size),
            entries: 0,
            summary: PacketizerSummary::default(),
            error: None,
        };

        source.for_each(&mut |name, value| state.push(name, value));

        if let Some(e) = state.error.take() {
            return Err(e);
        }

        state.flush();
        Ok(state.summary)
    }
}

struct PacketState<'a, S: ?Sized> {
    packetizer: &'a Packetizer,
    sink: &'a mut S,
    writer: Writer,
    buf: Vec<u8>,
    entries: usize,
    summary: PacketizerSummary,
    error: Option<PacketizerError>,
}

impl<S: PacketSink + ?Sized> PacketState<'_, S> {
    fn push(&mut self, name: &str, value: f64) {
        if self.error.is_some() {
            return;
        }

        if self.buf.is_empty() && !self.begin() {
            return;
        }

        let before = self.buf.len();
        if !self.append(name, value) {
            return;
        }
        if self.buf.len() + CHECKSUM_LEN <= self.packetizer.packet_size {
            return;
        }

        if self.entries > 1 {
            // Send everything up to the sample that overflowed, then retry it once in a fresh packet.
            self.buf.truncate(before);
            self.entries -= 1;
            self.summary.samples_written -= 1;
            self.flush();

            if !self.begin() {
                return;
            }
            if !self.append(name, value) {
                return;
            }
            if self.buf.len() + CHECKSUM_LEN <= self.packetizer.packet_size {
                return;
            }
        }

        // The sample does not fit within the budget on its own, so it goes out alone.
        self.flush();
    }

    /// Starts a new packet, returning `false` and recording the error if the preamble could not be written.
    fn begin(&mut self) -> bool {
        self.buf.clear();
        self.entries = 0;

        match self.write_preamble() {
            Ok(()) => true,
            Err(e) => {
                self.buf.clear();
                self.error = Some(PacketizerError::Preamble { source: e });
                false
            }
        }
    }

    fn write_preamble(&mut self) -> Result<(), EncodeError> {
        let packetizer = self.packetizer;
        self.writer.begin(
            &mut self.buf,
            &packetizer.application,
            &packetizer.instance_id,
            packetizer.headers.len(),
        )?;
        for (key, value) in &packetizer.headers {
            self.writer.append_header(&mut self.buf, key, value)?;
        }
        Ok(())
    }

    /// Appends a sample to the current packet, returning `false` if it was skipped or encoding has failed for good.
    fn append(&mut self, name: &str, value: f64) -> bool {
        match self.writer.append(&mut self.buf, name, value) {
            Ok(()) => {
                self.entries += 1;
                self.summary.samples_written += 1;
                true
            }
            Err(e) if !e.is_per_sample() => {
                self.error = Some(PacketizerError::Append { source: e });
                false
            }
            Err(e) => {
                debug!(metric = name, value, error = %e, "Skipping metric that cannot be encoded.");
                self.summary.samples_skipped += 1;
                self.packetizer.metrics.samples_skipped().increment(1);
                false
            }
        }
    }

    /// Checksums and sends the current packet, if it holds any samples, and starts over with an empty buffer.
    fn flush(&mut self) {
        if self.entries > 0 {
            add_checksum(&mut self.buf);

            let metrics = &self.packetizer.metrics;
            match self.sink.send(&self.buf) {
                Ok(()) => {
                    self.summary.packets_sent += 1;
                    metrics.packets_sent().increment(1);
                    metrics.samples_written().increment(self.entries as u64);
                }
                Err(e) => {
                    self.summary.send_failures += 1;
                    metrics.send_failures().increment(1);
                    warn!(error = %e, packet_len = self.buf.len(), "Failed to send packet.");
                }
            }
        }

        self.buf.clear();
        self.entries = 0;
    }
}
