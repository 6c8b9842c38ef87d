//! Relay task: publishes pending serial frames to the broker.
//!
//! Runs in a dedicated thread using `edge-executor`, woken by the
//! pipeline's signal whenever the receive context stores a payload.  All
//! network I/O for outbound telemetry happens here, never on the receive
//! path.  Publish failures are counted and the payload is discarded; the
//! next frame is the retry.

use std::sync::Arc;

use log::{debug, info, warn};

use super::RelayPipeline;
use crate::app::events::{MessageId, QoS};
use crate::app::ports::BrokerClient;
use crate::config::TopicString;
use crate::error::BrokerError;

/// Drains the pending slot into the broker.
pub struct RelayDispatcher<B> {
    broker: Arc<B>,
    pipeline: Arc<RelayPipeline>,
    topic: TopicString,
}

impl<B: BrokerClient> RelayDispatcher<B> {
    pub fn new(broker: Arc<B>, pipeline: Arc<RelayPipeline>, topic: &str) -> Self {
        let mut t = TopicString::new();
        let _ = t.push_str(topic);
        Self {
            broker,
            pipeline,
            topic: t,
        }
    }

    /// Publish the pending payload, if there is one.
    ///
    /// Returns `None` when the slot was empty (spurious wake).
    pub fn dispatch_pending(&self) -> Option<Result<MessageId, BrokerError>> {
        let payload = self.pipeline.slot().take()?;
        let result = self
            .broker
            .publish(&self.topic, QoS::AtLeastOnce, &payload);

        match &result {
            Ok(id) => {
                info!("Relay: published {}B to '{}' (msg #{})", payload.len(), self.topic, id);
            }
            Err(e) => {
                warn!("Relay: publish of {}B failed: {}", payload.len(), e);
            }
        }
        self.pipeline.stats().record_publish(result.is_ok());
        Some(result)
    }

    /// Wait for offers forever, publishing each one.
    pub async fn run(&self) {
        loop {
            self.pipeline.wait().await;
            if self.dispatch_pending().is_none() {
                debug!("Relay: woke with empty slot");
            }
        }
    }
}

fn run_relay_loop<B: BrokerClient>(dispatcher: RelayDispatcher<B>) {
    let executor: edge_executor::LocalExecutor<'_, 4> = edge_executor::LocalExecutor::new();

    executor.spawn(async move { dispatcher.run().await }).detach();

    info!("Relay task started");
    futures_lite::future::block_on(executor.run(core::future::pending::<()>()));
}

/// Spawn the relay task in a dedicated thread pinned to Core 0 (PRO_CPU),
/// next to the network stack.
pub fn spawn<B>(dispatcher: RelayDispatcher<B>) -> std::io::Result<std::thread::JoinHandle<()>>
where
    B: BrokerClient + Send + Sync + 'static,
{
    crate::drivers::task_pin::spawn_on_core(
        crate::drivers::task_pin::Core::Pro,
        10,
        8,
        "relay\0",
        move || run_relay_loop(dispatcher),
    )
}
