//! End-to-end cycle over the simulation adapters.
//!
//! Uses the real modem, MQTT, trust-store and restart adapters with their
//! host backends; only the delay is mocked.

use std::sync::Arc;

use cellrelay::adapters::cert_store::{CA_CERT_KEY, CERT_NAMESPACE, CaTrustStore};
use cellrelay::adapters::modem::CellularLink;
use cellrelay::adapters::mqtt::MqttBroker;
use cellrelay::adapters::nvs::NvsAdapter;
use cellrelay::adapters::restart::SystemRestart;
use cellrelay::app::events::{QoS, QueuedEvent};
use cellrelay::app::ports::{BrokerClient, StoragePort};
use cellrelay::config::RelayConfig;
use cellrelay::error::LinkError;
use cellrelay::session::SessionError;
use cellrelay::supervisor::{ConnectionState, FatalReason, Supervisor};

use crate::mock_ports::MockDelay;

fn config() -> RelayConfig {
    RelayConfig {
        use_tls: true,
        keepalive_secs: 1,
        session_iteration_cap: 2,
        client_id: "GW-EFCAFE".try_into().unwrap(),
        ..Default::default()
    }
}

fn trust() -> CaTrustStore {
    let mut nvs = NvsAdapter::new().unwrap();
    nvs.write(CERT_NAMESPACE, CA_CERT_KEY, b"-----BEGIN CERTIFICATE-----\n")
        .unwrap();
    CaTrustStore::load(&nvs)
}

#[test]
fn full_cycle_echoes_and_records_restart() {
    let broker = Arc::new(MqttBroker::new());
    broker.refuse_next(1);
    let radio = CellularLink::default().with_script([Err(LinkError::Timeout)]);
    let restart = SystemRestart::new(NvsAdapter::new().unwrap(), false);

    let mut sup = Supervisor::new(config(), radio, broker.clone(), trust(), restart, MockDelay::default());

    sup.bring_up().unwrap();
    assert_eq!(sup.state(), ConnectionState::Connected);
    assert_eq!(sup.radio().attempts(), 2);
    assert_eq!(sup.trust().installs(), 1);

    // A control message queued before the session starts is echoed.
    broker.inject(QueuedEvent::publish("gateway/control", 77, QoS::AtLeastOnce, b"cmd"));
    let end = sup.run_session();
    assert_eq!(end, SessionError::IterationCap);
    assert_eq!(sup.last_session().echoed, 1);
    assert!(
        broker
            .published()
            .contains(&("gateway/telemetry".to_owned(), b"cmd".to_vec()))
    );

    let reason = sup.fault(end);
    assert_eq!(reason, FatalReason::Session(SessionError::IterationCap));
    assert!(!broker.is_connected());

    sup.escalate(reason);
    let records = sup.restart_port().records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].reason.as_str(), "session: iteration cap reached");
    assert_eq!(sup.state(), ConnectionState::Disconnected);
}

#[test]
fn missing_ca_chain_exhausts_broker_budget() {
    let broker = Arc::new(MqttBroker::new());
    let config = RelayConfig {
        broker_max_attempts: 2,
        ..config()
    };
    let restart = SystemRestart::new(NvsAdapter::new().unwrap(), false);
    let mut sup = Supervisor::new(
        config,
        CellularLink::default(),
        broker.clone(),
        CaTrustStore::empty(),
        restart,
        MockDelay::default(),
    );

    assert_eq!(sup.run_cycle(), FatalReason::BrokerExhausted { attempts: 2 });
    assert!(!broker.is_connected());
    assert_eq!(sup.restart_port().requests(), 1);
    // The relay path sees the broker as down.
    assert!(broker.publish("gateway/telemetry", QoS::AtLeastOnce, b"x").is_err());
}
