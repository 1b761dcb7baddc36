use admission_core::{dispatcher::Handler, message::Message};
use admission_metrics::static_metrics;
use admission_proto::DecodeError;
use async_trait::async_trait;
use tracing::{debug, trace};

static_metrics! {
    name => HandlerMetrics,
    prefix => handler,
    metrics => [
        counter(packets_decoded),
        counter(samples_decoded),
        counter(decode_errors),
    ],
}

/// Decodes every packet in full, counting samples and logging them at trace level.
pub struct DecodingHandler {
    metrics: HandlerMetrics,
}

impl DecodingHandler {
    pub fn new() -> Self {
        Self {
            metrics: HandlerMetrics::new(),
        }
    }
}

#[async_trait]
impl Handler for DecodingHandler {
    async fn handle(&self, message: &mut Message) {
        let remote_addr = message.remote_addr();
        match decode(message) {
            Ok(samples) => {
                self.metrics.packets_decoded().increment(1);
                self.metrics.samples_decoded().increment(samples as u64);
            }
            Err(e) => {
                self.metrics.decode_errors().increment(1);
                debug!(error = %e, ?remote_addr, "Failed to decode packet.");
            }
        }
    }
}

fn decode(message: &mut Message) -> Result<usize, DecodeError> {
    let (data, mut reader) = message.reader();
    let (mut rest, preamble) = reader.begin(data)?;
    let application = String::from_utf8_lossy(preamble.application);

    while reader.headers_remaining() > 0 {
        let (next, key, value) = reader.next_header(rest)?;
        trace!(
            %application,
            key = %String::from_utf8_lossy(key),
            value = %String::from_utf8_lossy(value),
            "Decoded header."
        );
        rest = next;
    }

    let mut samples = 0;
    while !rest.is_empty() {
        let (next, key, value) = reader.next(rest)?;
        trace!(%application, key = %String::from_utf8_lossy(key), value, "Decoded sample.");
        samples += 1;
        rest = next;
    }

    Ok(samples)
}

#[cfg(test)]
mod tests {
    use admission_core::{
        message::MessageBuffer,
        pooling::helpers::unpooled,
    };
    use admission_proto::{FloatEncoding, Writer};
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    use super::*;

    fn message(payload: &[u8]) -> Message {
        let mut message = unpooled::<Message>(MessageBuffer::new());
        message.receive_buffer()[..payload.len()].copy_from_slice(payload);
        message.set_received(payload.len(), None);
        message
    }

    fn counter_value(snapshot: &[(String, u64)], name: &str) -> u64 {
        snapshot
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| *value)
            .unwrap_or(0)
    }

    fn counters(recorder: &DebuggingRecorder) -> Vec<(String, u64)> {
        recorder
            .snapshotter()
            .snapshot()
            .into_vec()
            .into_iter()
            .filter_map(|(key, _, _, value)| match value {
                DebugValue::Counter(value) => Some((key.key().name().to_string(), value)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn decode_counts_samples_after_headers() {
        let mut buf = Vec::new();
        let mut writer = Writer::new(FloatEncoding::Float64);
        writer.begin(&mut buf, "app", b"i", 1).unwrap();
        writer.append_header(&mut buf, b"region", b"us").unwrap();
        writer.append(&mut buf, "a", 1.0).unwrap();
        writer.append(&mut buf, "ab", 2.0).unwrap();

        assert_eq!(decode(&mut message(&buf)), Ok(2));
    }

    #[test]
    fn decode_reports_truncation() {
        let mut buf = Vec::new();
        let mut writer = Writer::new(FloatEncoding::Float32);
        writer.begin(&mut buf, "app", b"i", 0).unwrap();
        writer.append(&mut buf, "a", 1.0).unwrap();
        buf.pop();

        assert!(matches!(
            decode(&mut message(&buf)),
            Err(DecodeError::BufferTooSmall { .. })
        ));
    }

    #[tokio::test]
    async fn handler_counts_outcomes() {
        let recorder = DebuggingRecorder::new();
        let handler = metrics::with_local_recorder(&recorder, DecodingHandler::new);

        let mut buf = Vec::new();
        let mut writer = Writer::new(FloatEncoding::Float16);
        writer.begin(&mut buf, "app", b"i", 0).unwrap();
        writer.append(&mut buf, "a", 1.0).unwrap();

        handler.handle(&mut message(&buf)).await;
        handler.handle(&mut message(&[0xff])).await;

        let snapshot = counters(&recorder);
        assert_eq!(counter_value(&snapshot, "handler_packets_decoded"), 1);
        assert_eq!(counter_value(&snapshot, "handler_samples_decoded"), 1);
        assert_eq!(counter_value(&snapshot, "handler_decode_errors"), 1);
    }
}
