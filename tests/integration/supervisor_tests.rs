//! Integration tests for the connectivity supervisor.
//!
//! Drives full reconnect cycles against scripted mocks and checks the
//! retry budgets, trust provisioning and restart escalation.

use std::sync::Arc;

use cellrelay::app::events::Readiness;
use cellrelay::config::RelayConfig;
use cellrelay::error::{BrokerError, TrustError};
use cellrelay::relay::RelayPipeline;
use cellrelay::session::SessionError;
use cellrelay::supervisor::{ConnectionState, FatalReason, Supervisor};

use crate::mock_ports::{BrokerCall, MockBroker, MockDelay, MockRadio, MockRestart, MockTrust};

type TestSupervisor = Supervisor<MockRadio, MockBroker, MockTrust, MockRestart, MockDelay>;

fn plain_config() -> RelayConfig {
    RelayConfig {
        use_tls: false,
        link_max_attempts: 3,
        broker_max_attempts: 2,
        client_id: "GW-TEST01".try_into().unwrap(),
        ..Default::default()
    }
}

fn supervisor(config: RelayConfig, radio: MockRadio, trust: MockTrust) -> TestSupervisor {
    Supervisor::new(
        config,
        radio,
        Arc::new(MockBroker::new()),
        trust,
        MockRestart::default(),
        MockDelay::default(),
    )
}

#[test]
fn starts_disconnected() {
    let sup = supervisor(plain_config(), MockRadio::new(), MockTrust::default());
    assert_eq!(sup.state(), ConnectionState::Disconnected);
    assert!(!sup.healthy_once());
    assert_eq!(ConnectionState::BrokerConnecting.to_string(), "BROKER_CONNECTING");
}

#[test]
fn settle_waits_startup_delay() {
    let mut sup = supervisor(plain_config(), MockRadio::new(), MockTrust::default());
    sup.settle();
    assert_eq!(sup.delay().sleeps_ms, vec![6_000]);
}

#[test]
fn radio_exhaustion_restarts_exactly_once() {
    let mut sup = supervisor(plain_config(), MockRadio::failing(3), MockTrust::default());

    let reason = sup.run_cycle();

    assert_eq!(reason, FatalReason::LinkExhausted { attempts: 3 });
    assert_eq!(sup.radio().bring_ups.get(), 3);
    assert_eq!(sup.restart_port().reasons, vec!["radio down after 3 attempts"]);
    // Sleeps between attempts only, none after the last one.
    assert_eq!(sup.delay().sleeps_ms, vec![5_000, 5_000]);
    assert!(sup.broker().calls().is_empty());
    assert_eq!(sup.state(), ConnectionState::Disconnected);
}

#[test]
fn radio_recovers_within_budget() {
    let mut sup = supervisor(plain_config(), MockRadio::failing(2), MockTrust::default());
    sup.bring_up().unwrap();
    assert_eq!(sup.state(), ConnectionState::Connected);
    assert_eq!(sup.radio().bring_ups.get(), 3);
    assert!(sup.restart_port().reasons.is_empty());
}

#[test]
fn broker_exhaustion_restarts_exactly_once() {
    let mut sup = supervisor(plain_config(), MockRadio::new(), MockTrust::default());
    sup.broker()
        .script_connect([Err(BrokerError::Refused(5)), Err(BrokerError::Timeout)]);

    let reason = sup.run_cycle();

    assert_eq!(reason, FatalReason::BrokerExhausted { attempts: 2 });
    assert_eq!(
        sup.broker().count(|c| matches!(c, BrokerCall::Connect { .. })),
        2
    );
    assert_eq!(sup.restart_port().reasons, vec!["broker unreachable after 2 attempts"]);
    assert!(!sup.healthy_once());
}

#[test]
fn connect_uses_configured_client_id() {
    let mut sup = supervisor(plain_config(), MockRadio::new(), MockTrust::default());
    sup.bring_up().unwrap();
    assert_eq!(
        sup.broker().calls()[0],
        BrokerCall::Connect {
            client_id: "GW-TEST01".into()
        }
    );
}

#[test]
fn trust_failure_counts_as_handshake_attempt() {
    let config = RelayConfig {
        use_tls: true,
        ..plain_config()
    };
    let trust = MockTrust {
        script: [Err(TrustError::MaterialMissing)].into(),
        ..Default::default()
    };
    let mut sup = supervisor(config, MockRadio::new(), trust);

    sup.bring_up().unwrap();

    assert_eq!(sup.trust().calls, 2);
    assert_eq!(
        sup.broker().count(|c| matches!(c, BrokerCall::Connect { .. })),
        1
    );
    assert_eq!(sup.delay().sleeps_ms, vec![5_000]);
}

#[test]
fn trust_failures_can_exhaust_broker_budget() {
    let config = RelayConfig {
        use_tls: true,
        ..plain_config()
    };
    let trust = MockTrust {
        script: [Err(TrustError::MaterialMissing), Err(TrustError::Install(-1))].into(),
        ..Default::default()
    };
    let mut sup = supervisor(config, MockRadio::new(), trust);

    assert_eq!(sup.run_cycle(), FatalReason::BrokerExhausted { attempts: 2 });
    assert!(sup.broker().calls().is_empty());
}

#[test]
fn trust_provisioned_once_per_cycle() {
    let config = RelayConfig {
        use_tls: true,
        broker_max_attempts: 5,
        ..plain_config()
    };
    let mut sup = supervisor(config, MockRadio::new(), MockTrust::default());
    sup.broker()
        .script_connect([Err(BrokerError::Timeout), Err(BrokerError::Timeout)]);

    sup.bring_up().unwrap();

    assert_eq!(sup.trust().calls, 1);
    assert_eq!(
        sup.broker().count(|c| matches!(c, BrokerCall::Connect { .. })),
        3
    );
}

#[test]
fn plain_tcp_skips_trust() {
    let mut sup = supervisor(plain_config(), MockRadio::new(), MockTrust::default());
    sup.bring_up().unwrap();
    assert_eq!(sup.trust().calls, 0);
}

#[test]
fn session_end_disconnects_and_restarts() {
    let mut sup = supervisor(plain_config(), MockRadio::new(), MockTrust::default());
    sup.broker().script_polls([Ok(Readiness::IDLE)]);

    let reason = sup.run_cycle();

    assert_eq!(
        reason,
        FatalReason::Session(SessionError::Poll(BrokerError::Transport(-1)))
    );
    assert!(sup.healthy_once());
    assert_eq!(sup.last_session().iterations, 2);
    let calls = sup.broker().calls();
    assert_eq!(
        calls[1],
        BrokerCall::Subscribe {
            topic: "gateway/control".into()
        }
    );
    assert_eq!(calls.last(), Some(&BrokerCall::Disconnect));
    assert_eq!(sup.restart_port().reasons.len(), 1);
    assert!(sup.restart_port().reasons[0].starts_with("session: poll failed"));
}

#[test]
fn subscribe_failure_ends_session() {
    let mut sup = supervisor(plain_config(), MockRadio::new(), MockTrust::default());
    sup.broker().fail_subscribe(Some(BrokerError::NotConnected));

    let reason = sup.run_cycle();

    assert_eq!(
        reason,
        FatalReason::Session(SessionError::Subscribe(BrokerError::NotConnected))
    );
    assert_eq!(sup.broker().count(|c| *c == BrokerCall::Poll), 0);
    assert_eq!(sup.restart_port().reasons.len(), 1);
}

#[test]
fn retries_unbounded_after_first_connection() {
    let mut sup = supervisor(plain_config(), MockRadio::new(), MockTrust::default());

    // Cycle 1 connects, then the session dies on the first poll.
    sup.run_cycle();
    assert!(sup.healthy_once());

    // Cycle 2: far more radio failures than the first-boot limit.
    sup.radio().push_failures(12);
    sup.bring_up().unwrap();

    assert_eq!(sup.cycles(), 2);
    assert_eq!(sup.radio().bring_ups.get(), 1 + 13);
    assert_eq!(sup.restart_port().reasons.len(), 1);
    assert_eq!(sup.state(), ConnectionState::Connected);
}

#[test]
fn first_boot_budget_resets_between_cycles() {
    let mut sup = supervisor(plain_config(), MockRadio::failing(3), MockTrust::default());
    sup.run_cycle();

    // Two failures in the next cycle stay within a fresh budget of three.
    sup.radio().push_failures(2);
    sup.bring_up().unwrap();
    assert_eq!(sup.restart_port().reasons.len(), 1);
}

#[test]
fn fault_reports_relay_stats() {
    let pipeline = Arc::new(RelayPipeline::new());
    pipeline.offer(b"frame");
    let mut sup = supervisor(plain_config(), MockRadio::new(), MockTrust::default())
        .with_pipeline(pipeline.clone());

    sup.run_cycle();

    assert_eq!(sup.state(), ConnectionState::Disconnected);
    assert_eq!(pipeline.stats().snapshot().offered, 1);
}
