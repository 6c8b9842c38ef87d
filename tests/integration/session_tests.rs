//! Integration tests for the cloud session loop.

use cellrelay::app::events::{QoS, QueuedEvent, Readiness};
use cellrelay::error::BrokerError;
use cellrelay::session::{CloudSession, INBOUND_CAPACITY, SessionError};

use crate::mock_ports::{BrokerCall, MockBroker, MockDelay};

const PUB: &str = "gateway/telemetry";

fn inbound(id: u32, qos: QoS, payload: &[u8]) -> QueuedEvent {
    QueuedEvent::publish("gateway/control", id, qos, payload)
}

#[test]
fn idle_iteration_tolerates_would_block() {
    let broker = MockBroker::new();
    broker.script_polls([Ok(Readiness::IDLE)]);
    let mut session = CloudSession::new(&broker, PUB, 10);

    assert_eq!(session.step(), Ok(()));
    assert_eq!(broker.calls(), vec![BrokerCall::Poll, BrokerCall::Live]);
}

#[test]
fn qos1_publish_is_acked_then_echoed() {
    let broker = MockBroker::new();
    broker.script_polls([Ok(Readiness::READABLE)]);
    broker.push_inbound(vec![inbound(42, QoS::AtLeastOnce, b"hello")]);
    let mut session = CloudSession::new(&broker, PUB, 10);

    session.step().unwrap();

    assert_eq!(
        broker.calls(),
        vec![
            BrokerCall::Poll,
            BrokerCall::Live,
            BrokerCall::Ack(42),
            BrokerCall::Publish {
                topic: PUB.into(),
                qos: QoS::AtLeastOnce,
                payload: b"hello".to_vec(),
            },
        ]
    );
    let stats = session.stats();
    assert_eq!((stats.inbound, stats.echoed), (1, 1));
}

#[test]
fn qos0_publish_is_echoed_without_ack() {
    let broker = MockBroker::new();
    broker.script_polls([Ok(Readiness::READABLE)]);
    broker.push_inbound(vec![inbound(7, QoS::AtMostOnce, b"x")]);
    let mut session = CloudSession::new(&broker, PUB, 10);

    session.step().unwrap();

    assert_eq!(broker.count(|c| matches!(c, BrokerCall::Ack(_))), 0);
    assert_eq!(broker.published(), vec![(PUB.to_owned(), b"x".to_vec())]);
}

#[test]
fn max_size_payload_is_echoed() {
    let broker = MockBroker::new();
    broker.script_polls([Ok(Readiness::READABLE)]);
    let payload = vec![b'p'; INBOUND_CAPACITY];
    broker.push_inbound(vec![inbound(1, QoS::AtLeastOnce, &payload)]);
    let mut session = CloudSession::new(&broker, PUB, 10);

    session.step().unwrap();
    assert_eq!(broker.published()[0].1.len(), INBOUND_CAPACITY);
}

#[test]
fn oversized_payload_ends_session() {
    let broker = MockBroker::new();
    broker.script_polls([Ok(Readiness::READABLE)]);
    let payload = vec![b'p'; INBOUND_CAPACITY + 1];
    broker.push_inbound(vec![inbound(1, QoS::AtLeastOnce, &payload)]);
    let mut session = CloudSession::new(&broker, PUB, 10);

    assert_eq!(
        session.step(),
        Err(SessionError::PayloadTooLarge {
            len: INBOUND_CAPACITY + 1
        })
    );
    assert!(broker.published().is_empty());
}

#[test]
fn first_failure_stops_the_batch() {
    let broker = MockBroker::new();
    broker.script_polls([Ok(Readiness::READABLE)]);
    broker.push_inbound(vec![
        QueuedEvent::Disconnect { code: 3 },
        inbound(2, QoS::AtLeastOnce, b"late"),
    ]);
    let mut session = CloudSession::new(&broker, PUB, 10);

    assert_eq!(session.step(), Err(SessionError::Disconnected { code: 3 }));
    assert!(broker.published().is_empty());
}

#[test]
fn puback_and_suback_are_counted_not_fatal() {
    let broker = MockBroker::new();
    broker.script_polls([Ok(Readiness::READABLE)]);
    broker.push_inbound(vec![
        QueuedEvent::SubAck {
            message_id: 1,
            granted: Some(QoS::AtLeastOnce),
        },
        QueuedEvent::PubAck { message_id: 2 },
        QueuedEvent::PubAck { message_id: 3 },
    ]);
    let mut session = CloudSession::new(&broker, PUB, 10);

    session.step().unwrap();
    assert_eq!(session.stats().pub_acks, 2);
}

#[test]
fn ack_failure_ends_session_before_echo() {
    let broker = MockBroker::new();
    broker.script_polls([Ok(Readiness::READABLE)]);
    broker.push_inbound(vec![inbound(5, QoS::AtLeastOnce, b"a")]);
    broker.fail_ack(Some(BrokerError::Transport(104)));
    let mut session = CloudSession::new(&broker, PUB, 10);

    assert_eq!(
        session.step(),
        Err(SessionError::Ack(BrokerError::Transport(104)))
    );
    assert!(broker.published().is_empty());
}

#[test]
fn echo_failure_ends_session() {
    let broker = MockBroker::new();
    broker.script_polls([Ok(Readiness::READABLE)]);
    broker.push_inbound(vec![inbound(5, QoS::AtLeastOnce, b"a")]);
    broker.fail_publish(Some(BrokerError::NotConnected));
    let mut session = CloudSession::new(&broker, PUB, 10);

    assert_eq!(
        session.step(),
        Err(SessionError::Echo(BrokerError::NotConnected))
    );
}

#[test]
fn keepalive_failure_ends_session() {
    let broker = MockBroker::new();
    broker.script_polls([Ok(Readiness::IDLE)]);
    broker.set_live(Err(BrokerError::Transport(9)));
    let mut session = CloudSession::new(&broker, PUB, 10);

    assert_eq!(
        session.step(),
        Err(SessionError::Keepalive(BrokerError::Transport(9)))
    );
}

#[test]
fn error_flags_end_session() {
    let broker = MockBroker::new();
    broker.script_polls([Ok(Readiness {
        readable: false,
        error: true,
        invalid: false,
    })]);
    let mut session = CloudSession::new(&broker, PUB, 10);

    assert_eq!(
        session.step(),
        Err(SessionError::TransportFault {
            error: true,
            invalid: false
        })
    );
}

#[test]
fn readable_input_is_processed_before_fault() {
    let broker = MockBroker::new();
    broker.script_polls([Ok(Readiness {
        readable: true,
        error: false,
        invalid: true,
    })]);
    broker.push_inbound(vec![inbound(9, QoS::AtLeastOnce, b"last")]);
    let mut session = CloudSession::new(&broker, PUB, 10);

    assert!(matches!(
        session.step(),
        Err(SessionError::TransportFault { invalid: true, .. })
    ));
    assert_eq!(broker.published().len(), 1);
}

#[test]
fn iteration_cap_ends_run() {
    let broker = MockBroker::new();
    broker.script_polls([Ok(Readiness::IDLE); 3]);
    let mut session = CloudSession::new(&broker, PUB, 3);
    let mut delay = MockDelay::default();

    let end = session.run(&mut delay, 1);

    assert_eq!(end, SessionError::IterationCap);
    assert_eq!(session.stats().iterations, 3);
    assert_eq!(broker.count(|c| *c == BrokerCall::Poll), 3);
    // One tick before every step, including the one that hit the cap.
    assert_eq!(delay.sleeps_ms, vec![1; 4]);
}

#[test]
fn poll_error_ends_run() {
    let broker = MockBroker::new();
    let mut session = CloudSession::new(&broker, PUB, 100);
    let mut delay = MockDelay::default();

    assert_eq!(
        session.run(&mut delay, 0),
        SessionError::Poll(BrokerError::Transport(-1))
    );
    assert!(delay.sleeps_ms.is_empty());
}
