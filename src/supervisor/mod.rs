//! Connectivity supervisor.
//!
//! Owns the connection state machine and every connectivity port:
//!
//! ```text
//!  Disconnected ──▶ LinkConnecting ──▶ LinkUp ──▶ BrokerConnecting ──▶ Connected
//!                     │  ▲ retry          │          │  ▲ retry            │
//!                     │  └────────────────┘          │  └──────────────────┘ session ends
//!                     ▼ budget spent                 ▼ budget spent        ▼
//!                   Faulted ◀────────────────────────┴───────────────── Faulted
//!                     │
//!                     └──▶ RestartPort::restart (exactly once per fault)
//! ```
//!
//! The first bring-up after boot is bounded by the configured attempt
//! limits.  Once the device has been `Connected`, later cycles retry the
//! radio and the broker without an upper bound.

pub mod retry;

use core::fmt::{self, Write as _};
use core::time::Duration;
use std::sync::Arc;

use embedded_hal::delay::DelayNs;
use log::{error, info, warn};

use crate::app::events::QoS;
use crate::app::ports::{BrokerClient, RadioLink, RestartPort, TrustStore};
use crate::config::RelayConfig;
use crate::error::{BrokerError, TrustError};
use crate::relay::RelayPipeline;
use crate::session::{CloudSession, SessionError, SessionStats};

pub use retry::{RetryBudget, RetryDecision};

/// Connection lifecycle.  Mutated only by the [`Supervisor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    LinkConnecting,
    LinkUp,
    BrokerConnecting,
    Connected,
    Faulted,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "DISCONNECTED",
            Self::LinkConnecting => "LINK_CONNECTING",
            Self::LinkUp => "LINK_UP",
            Self::BrokerConnecting => "BROKER_CONNECTING",
            Self::Connected => "CONNECTED",
            Self::Faulted => "FAULTED",
        };
        f.write_str(name)
    }
}

/// Why a reconnect cycle ended in a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalReason {
    LinkExhausted { attempts: u32 },
    BrokerExhausted { attempts: u32 },
    Session(SessionError),
}

impl fmt::Display for FatalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LinkExhausted { attempts } => write!(f, "radio down after {attempts} attempts"),
            Self::BrokerExhausted { attempts } => {
                write!(f, "broker unreachable after {attempts} attempts")
            }
            Self::Session(e) => write!(f, "session: {e}"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum HandshakeError {
    Trust(TrustError),
    Broker(BrokerError),
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trust(e) => write!(f, "trust provisioning: {e}"),
            Self::Broker(e) => write!(f, "{e}"),
        }
    }
}

/// Sequences radio bring-up, broker handshake, session and restart.
pub struct Supervisor<R, B, T, X, D> {
    config: RelayConfig,
    radio: R,
    broker: Arc<B>,
    trust: T,
    restart: X,
    delay: D,
    pipeline: Option<Arc<RelayPipeline>>,
    state: ConnectionState,
    link_budget: RetryBudget,
    broker_budget: RetryBudget,
    healthy_once: bool,
    cycles: u32,
    last_session: SessionStats,
}

impl<R, B, T, X, D> Supervisor<R, B, T, X, D>
where
    R: RadioLink,
    B: BrokerClient,
    T: TrustStore,
    X: RestartPort,
    D: DelayNs,
{
    pub fn new(config: RelayConfig, radio: R, broker: Arc<B>, trust: T, restart: X, delay: D) -> Self {
        let link_budget = RetryBudget::bounded(
            u32::from(config.link_max_attempts),
            config.link_retry_delay(),
        );
        let broker_budget = RetryBudget::bounded(
            u32::from(config.broker_max_attempts),
            config.reconnect_delay(),
        );
        Self {
            config,
            radio,
            broker,
            trust,
            restart,
            delay,
            pipeline: None,
            state: ConnectionState::Disconnected,
            link_budget,
            broker_budget,
            healthy_once: false,
            cycles: 0,
            last_session: SessionStats::default(),
        }
    }

    /// Report relay counters whenever a session ends.
    pub fn with_pipeline(mut self, pipeline: Arc<RelayPipeline>) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    // ── Accessors ─────────────────────────────────────────────

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    /// Whether the device has reached `Connected` since boot.
    pub fn healthy_once(&self) -> bool {
        self.healthy_once
    }

    pub fn last_session(&self) -> SessionStats {
        self.last_session
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn broker(&self) -> &Arc<B> {
        &self.broker
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn trust(&self) -> &T {
        &self.trust
    }

    pub fn restart_port(&self) -> &X {
        &self.restart
    }

    pub fn delay(&self) -> &D {
        &self.delay
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Let the modem settle after power-on.
    pub fn settle(&mut self) {
        let secs = self.config.startup_delay_secs;
        if secs > 0 {
            info!("Supervisor: waiting {}s for modem to settle", secs);
            self.sleep(Duration::from_secs(u64::from(secs)));
        }
    }

    /// Run reconnect cycles forever.
    pub fn run_forever(&mut self) -> ! {
        loop {
            let reason = self.run_cycle();
            warn!("Supervisor: cycle {} ended ({}), retrying", self.cycles, reason);
        }
    }

    /// One full cycle: bring-up, session, fault, restart.
    ///
    /// Only returns when the restart port returns (reboot disabled).
    pub fn run_cycle(&mut self) -> FatalReason {
        let reason = match self.bring_up() {
            Err(reason) => reason,
            Ok(()) => {
                let end = self.run_session();
                self.fault(end)
            }
        };
        self.escalate(reason);
        reason
    }

    /// Drive the state machine from `Disconnected` to `Connected`.
    pub fn bring_up(&mut self) -> Result<(), FatalReason> {
        self.cycles = self.cycles.wrapping_add(1);
        self.configure_budgets();
        info!(
            "Supervisor: cycle {} ({} retries)",
            self.cycles,
            if self.link_budget.is_bounded() { "bounded" } else { "unbounded" }
        );

        // ── Radio ─────────────────────────────────────────────
        loop {
            self.transition(ConnectionState::LinkConnecting);
            match self.radio.bring_up() {
                Ok(()) if self.radio.is_attached() => break,
                Ok(()) => warn!("Supervisor: bring-up returned but radio not attached"),
                Err(e) => warn!("Supervisor: radio bring-up failed: {}", e),
            }
            match self.link_budget.record_failure() {
                RetryDecision::RetryAfter(d) => self.sleep(d),
                RetryDecision::Exhausted { attempts } => {
                    self.transition(ConnectionState::Faulted);
                    return Err(FatalReason::LinkExhausted { attempts });
                }
            }
        }
        self.transition(ConnectionState::LinkUp);

        // ── Broker ────────────────────────────────────────────
        self.broker_budget.reset();
        let mut trust_ready = !self.config.use_tls;
        loop {
            self.transition(ConnectionState::BrokerConnecting);
            match self.handshake(&mut trust_ready) {
                Ok(()) => break,
                Err(e) => warn!(
                    "Supervisor: broker handshake attempt {} failed: {}",
                    self.broker_budget.attempts() + 1,
                    e
                ),
            }
            match self.broker_budget.record_failure() {
                RetryDecision::RetryAfter(d) => self.sleep(d),
                RetryDecision::Exhausted { attempts } => {
                    self.transition(ConnectionState::Faulted);
                    return Err(FatalReason::BrokerExhausted { attempts });
                }
            }
        }

        self.healthy_once = true;
        self.transition(ConnectionState::Connected);
        Ok(())
    }

    /// Subscribe and run the session loop until it ends.
    pub fn run_session(&mut self) -> SessionError {
        let sub_topic = &self.config.sub_topic;
        match self.broker.subscribe(sub_topic, QoS::AtLeastOnce) {
            Ok(id) => info!("Supervisor: subscribing to '{}' (msg #{})", sub_topic, id),
            Err(e) => {
                warn!("Supervisor: subscribe to '{}' failed: {}", sub_topic, e);
                return SessionError::Subscribe(e);
            }
        }

        let mut session = CloudSession::new(
            &*self.broker,
            &self.config.pub_topic,
            self.config.session_iteration_cap,
        );
        let end = session.run(&mut self.delay, self.config.session_tick_ms);
        self.last_session = session.stats();
        end
    }

    /// `Connected → Faulted`: orderly disconnect after a session ended.
    pub fn fault(&mut self, end: SessionError) -> FatalReason {
        self.transition(ConnectionState::Faulted);
        info!("Supervisor: disconnecting from broker");
        if let Err(e) = self.broker.disconnect() {
            warn!("Supervisor: disconnect failed: {}", e);
        }

        let s = self.last_session;
        info!(
            "Supervisor: session stats: {} iterations, {} inbound, {} echoed, {} PUBACKs",
            s.iterations, s.inbound, s.echoed, s.pub_acks
        );
        if let Some(p) = &self.pipeline {
            let r = p.stats().snapshot();
            info!(
                "Supervisor: relay stats: {} offered, {} dropped, {} published, {} failed",
                r.offered, r.dropped, r.published, r.failed
            );
        }
        FatalReason::Session(end)
    }

    /// Invoke the restart port exactly once.
    pub fn escalate(&mut self, reason: FatalReason) {
        error!("Supervisor: {}, restarting", reason);
        let mut msg = heapless::String::<64>::new();
        let _ = write!(msg, "{reason}");
        self.restart.restart(&msg);

        // Reboot disabled: start over from scratch.
        warn!("Supervisor: restart suppressed, starting a new cycle");
        self.transition(ConnectionState::Disconnected);
    }

    // ── Internals ─────────────────────────────────────────────

    fn handshake(&mut self, trust_ready: &mut bool) -> Result<(), HandshakeError> {
        if !*trust_ready {
            self.trust.provision().map_err(HandshakeError::Trust)?;
            *trust_ready = true;
        }
        let params = self.config.connect_params();
        self.broker.connect(&params).map_err(HandshakeError::Broker)
    }

    fn configure_budgets(&mut self) {
        if self.healthy_once {
            self.link_budget = RetryBudget::unbounded(self.config.link_retry_delay());
            self.broker_budget = RetryBudget::unbounded(self.config.reconnect_delay());
        } else {
            self.link_budget.reset();
            self.broker_budget.reset();
        }
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state != next {
            info!("Supervisor: {} -> {}", self.state, next);
            self.state = next;
        }
    }

    fn sleep(&mut self, d: Duration) {
        self.delay.delay_ms(u32::try_from(d.as_millis()).unwrap_or(u32::MAX));
    }
}
