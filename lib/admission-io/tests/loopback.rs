use std::{net::UdpSocket as StdUdpSocket, time::Duration};

use admission_core::{
    dispatcher::{BatchReceiver as _, Dispatcher, Handler},
    message::{Message, MessageBuffer},
    pooling::helpers::unpooled,
};
use admission_io::{net::bind_udp, net::UdpBatchReceiver, send_metrics, ReceiverConfiguration, SendOptions};
use admission_proto::{add_checksum, FloatEncoding};
use async_trait::async_trait;
use tokio::{sync::mpsc, time::timeout};
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(5);

fn loopback_receiver() -> UdpBatchReceiver {
    UdpBatchReceiver::new(bind_udp("127.0.0.1:0".parse().unwrap(), None).unwrap())
}

#[tokio::test]
async fn batch_receive_fills_messages_in_order() {
    let mut receiver = loopback_receiver();
    let target = receiver.local_addr().unwrap();

    let sender = StdUdpSocket::bind("127.0.0.1:0").unwrap();
    for payload in [&b"one"[..], b"two", b"three"] {
        sender.send_to(payload, target).unwrap();
    }

    let mut messages = (0..8)
        .map(|_| unpooled::<Message>(MessageBuffer::with_sizes(64, 16)))
        .collect::<Vec<_>>();

    let mut received = Vec::new();
    while received.len() < 3 {
        let n = timeout(WAIT, receiver.receive_batch(&mut messages))
            .await
            .expect("timed out waiting for datagrams")
            .unwrap();
        assert!(n > 0);
        for message in &mut messages[..n] {
            assert_eq!(message.remote_addr(), Some(sender.local_addr().unwrap()));
            received.push(message.data().to_vec());
            message.set_received(0, None);
        }
    }

    assert_eq!(received, [&b"one"[..], b"two", b"three"]);
}

#[tokio::test]
async fn oversized_datagram_is_truncated_to_buffer() {
    let mut receiver = loopback_receiver();
    let target = receiver.local_addr().unwrap();

    let sender = StdUdpSocket::bind("127.0.0.1:0").unwrap();
    sender.send_to(&[7; 100], target).unwrap();

    let mut messages = vec![unpooled::<Message>(MessageBuffer::with_sizes(32, 16))];
    let n = timeout(WAIT, receiver.receive_batch(&mut messages))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(n, 1);
    assert_eq!(messages[0].data(), &[7; 32][..]);
}

struct DecodingHandler {
    samples: mpsc::UnboundedSender<(String, String, f64)>,
}

#[async_trait]
impl Handler for DecodingHandler {
    async fn handle(&self, message: &mut Message) {
        let (data, mut reader) = message.reader();
        let (mut rest, preamble) = reader.begin(data).unwrap();
        let application = String::from_utf8_lossy(preamble.application).into_owned();
        while !rest.is_empty() {
            let (next, key, value) = reader.next(rest).unwrap();
            let _ = self
                .samples
                .send((application.clone(), String::from_utf8_lossy(key).into_owned(), value));
            rest = next;
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sent_metrics_are_dispatched() {
    let config = ReceiverConfiguration {
        listen_address: "127.0.0.1:0".parse().unwrap(),
        ..Default::default()
    };
    let receiver = config.build_receiver().unwrap();
    let target = receiver.local_addr().unwrap();
    let pool = config.build_pool();

    let (samples_tx, mut samples_rx) = mpsc::unbounded_channel();
    let handler = DecodingHandler { samples: samples_tx };
    let cancel = CancellationToken::new();
    let dispatcher = Dispatcher::from_configuration(&config.dispatcher, receiver, handler, pool);
    let task = tokio::spawn(dispatcher.run(cancel.clone()));

    // Corrupted packets never reach the handler.
    let mut corrupt = b"garbage".to_vec();
    add_checksum(&mut corrupt);
    corrupt[0] ^= 0xff;
    StdUdpSocket::bind("127.0.0.1:0").unwrap().send_to(&corrupt, target).unwrap();

    let options = SendOptions {
        address: target.to_string(),
        instance_id: "i-1".to_string(),
        packet_size: 64,
        float_encoding: FloatEncoding::Float32,
        ..SendOptions::new("loopback")
    };
    let samples = (0..20).map(|i| (format!("metric.{:02}", i), i as f64)).collect::<Vec<_>>();
    let summary = tokio::task::spawn_blocking(move || send_metrics(&options, &samples))
        .await
        .unwrap()
        .unwrap();
    assert!(summary.packets_sent > 1);
    assert_eq!(summary.samples_written, 20);

    let mut decoded = Vec::new();
    while decoded.len() < 20 {
        let sample = timeout(WAIT, samples_rx.recv())
            .await
            .expect("timed out waiting for samples")
            .unwrap();
        decoded.push(sample);
    }
    decoded.sort_by(|a, b| a.1.cmp(&b.1));

    for (i, (application, key, value)) in decoded.into_iter().enumerate() {
        assert_eq!(application, "loopback");
        assert_eq!(key, format!("metric.{:02}", i));
        assert_eq!(value, i as f64);
    }

    cancel.cancel();
    timeout(WAIT, task).await.unwrap().unwrap().unwrap();
}
