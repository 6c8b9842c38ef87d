//! Integration tests for the serial → slot → broker relay path.

use std::sync::Arc;
use std::time::{Duration, Instant};

use cellrelay::adapters::uart::UartLink;
use cellrelay::app::events::QoS;
use cellrelay::error::BrokerError;
use cellrelay::framing::{FrameReader, ReaderMode};
use cellrelay::relay::{self, RelayDispatcher, RelayPipeline};
use cellrelay::serial::{SerialLink, SerialTxQueue};

use crate::mock_ports::{BrokerCall, MockBroker};

const TOPIC: &str = "gateway/telemetry";

fn frame(body: &[u8]) -> Vec<u8> {
    let mut f = b"\r\n{".to_vec();
    f.extend_from_slice(body);
    f.extend_from_slice(b"}\r\n");
    f
}

fn body(n: usize, fill: u8) -> Vec<u8> {
    vec![fill; n]
}

#[test]
fn dispatcher_publishes_pending_payload_at_qos1() {
    let broker = Arc::new(MockBroker::new());
    let pipeline = Arc::new(RelayPipeline::new());
    let dispatcher = RelayDispatcher::new(broker.clone(), pipeline.clone(), TOPIC);

    assert!(pipeline.offer(b"temp=21.5"));
    assert_eq!(dispatcher.dispatch_pending(), Some(Ok(1)));

    assert_eq!(
        broker.calls(),
        vec![BrokerCall::Publish {
            topic: TOPIC.into(),
            qos: QoS::AtLeastOnce,
            payload: b"temp=21.5".to_vec(),
        }]
    );
    assert!(!pipeline.slot().is_occupied());
    assert_eq!(pipeline.stats().snapshot().published, 1);
}

#[test]
fn dispatcher_spurious_wake_does_nothing() {
    let broker = Arc::new(MockBroker::new());
    let pipeline = Arc::new(RelayPipeline::new());
    let dispatcher = RelayDispatcher::new(broker.clone(), pipeline, TOPIC);

    assert_eq!(dispatcher.dispatch_pending(), None);
    assert!(broker.calls().is_empty());
}

#[test]
fn failed_publish_is_counted_and_discarded() {
    let broker = Arc::new(MockBroker::new());
    broker.fail_publish(Some(BrokerError::NotConnected));
    let pipeline = Arc::new(RelayPipeline::new());
    let dispatcher = RelayDispatcher::new(broker.clone(), pipeline.clone(), TOPIC);

    pipeline.offer(b"lost");
    assert_eq!(
        dispatcher.dispatch_pending(),
        Some(Err(BrokerError::NotConnected))
    );
    // No retry: the slot is free for the next frame.
    assert!(!pipeline.slot().is_occupied());
    assert_eq!(dispatcher.dispatch_pending(), None);
    assert_eq!(broker.count(|c| matches!(c, BrokerCall::Publish { .. })), 1);

    let s = pipeline.stats().snapshot();
    assert_eq!((s.published, s.failed), (0, 1));
}

#[test]
fn serial_frames_reach_the_broker_in_order() {
    let (uart, probe) = UartLink::simulated();
    let broker = Arc::new(MockBroker::new());
    let pipeline = Arc::new(RelayPipeline::new());
    let mut link = SerialLink::new(
        uart,
        FrameReader::new("READY"),
        pipeline.clone(),
        Arc::new(SerialTxQueue::new()),
    );
    let dispatcher = RelayDispatcher::new(broker.clone(), pipeline.clone(), TOPIC);

    // Frames before the ready phrase are ignored.
    probe.send(&frame(&body(100, b'x')));
    link.service().unwrap();
    assert!(!pipeline.slot().is_occupied());

    probe.send(b"co-proc: READY ok\r\n");
    assert!(link.service().unwrap().handshake_complete);
    assert_eq!(link.reader().mode(), ReaderMode::Streaming);

    for fill in [b'a', b'b', b'c'] {
        probe.send(&frame(&body(110, fill)));
        assert_eq!(link.service().unwrap().accepted, 1);
        dispatcher.dispatch_pending().unwrap().unwrap();
    }

    let published: Vec<u8> = broker.published().iter().map(|(_, p)| p[0]).collect();
    assert_eq!(published, b"abc");
}

#[test]
fn split_frame_is_reassembled() {
    let (uart, probe) = UartLink::simulated();
    let pipeline = Arc::new(RelayPipeline::new());
    let mut link = SerialLink::new(
        uart,
        FrameReader::streaming(),
        pipeline.clone(),
        Arc::new(SerialTxQueue::new()),
    );

    let f = frame(&body(104, b'z'));
    let (head, tail) = f.split_at(57);
    probe.send(head);
    assert_eq!(link.service().unwrap().accepted, 0);
    probe.send(tail);
    assert_eq!(link.service().unwrap().accepted, 1);
    assert_eq!(pipeline.slot().take().unwrap().as_slice(), &body(104, b'z')[..]);
}

#[test]
fn relay_thread_publishes_offered_frames() {
    let broker = Arc::new(MockBroker::new());
    let pipeline = Arc::new(RelayPipeline::new());
    let dispatcher = RelayDispatcher::new(broker.clone(), pipeline.clone(), TOPIC);

    relay::dispatcher::spawn(dispatcher).unwrap();
    assert!(pipeline.offer(b"from-serial"));

    let deadline = Instant::now() + Duration::from_secs(5);
    while broker.published().is_empty() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(broker.published(), vec![(TOPIC.to_owned(), b"from-serial".to_vec())]);
}
