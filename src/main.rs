//! cellrelay firmware main entry point.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        Adapters (outer ring)                      │
//! │  UartLink      CellularLink   MqttBroker   CaTrustStore           │
//! │  (SerialRx/Tx) (RadioLink)    (Broker)     (TrustStore)           │
//! │  NvsAdapter    SystemRestart                                      │
//! │  (Config+NVS)  (RestartPort)                                      │
//! │                                                                   │
//! │  ───────────────── Port Trait Boundary ─────────────────          │
//! │                                                                   │
//! │  serial thread (APP) : SerialLink ─▶ FrameReader ─▶ RelayPipeline │
//! │  relay thread  (PRO) : RelayDispatcher ─▶ publish                 │
//! │  main thread         : Supervisor ─▶ CloudSession                 │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::sync::Arc;

use anyhow::Result;
use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::gpio::AnyIOPin;
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_hal::uart::{UartDriver, config::Config as UartConfig};
use esp_idf_hal::units::Hertz;
use log::{info, warn};

use cellrelay::adapters::cert_store::CaTrustStore;
use cellrelay::adapters::device_id;
use cellrelay::adapters::modem::CellularLink;
use cellrelay::adapters::mqtt::MqttBroker;
use cellrelay::adapters::nvs::NvsAdapter;
use cellrelay::adapters::restart::SystemRestart;
use cellrelay::adapters::uart::{BAUD_RATE, UartLink};
use cellrelay::app::ports::ConfigPort;
use cellrelay::config::RelayConfig;
use cellrelay::diagnostics;
use cellrelay::drivers::task_pin::{Core, spawn_on_core};
use cellrelay::framing::FrameReader;
use cellrelay::relay::{self, RelayDispatcher, RelayPipeline};
use cellrelay::serial::{SerialLink, SerialTxQueue};
use cellrelay::supervisor::Supervisor;

/// Serial thread poll period.
const SERIAL_POLL_MS: u32 = 5;

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  cellrelay v{}                       ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Config from NVS (or defaults) ──────────────────────
    let nvs = NvsAdapter::new().map_err(cellrelay::error::Error::from)?;
    let mut config = match nvs.load() {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("NVS config load failed ({}), using defaults", e);
            RelayConfig::default()
        }
    };
    if let Err(e) = config.validate() {
        warn!("Stored config invalid ({}), using defaults", e);
        config = RelayConfig::default();
    }
    let id = device_id::device_id(&device_id::read_mac());
    config.ensure_client_id(&id);
    info!("Client id: {}", config.client_id);

    // ── 3. Previous restarts ──────────────────────────────────
    diagnostics::report_previous_restarts(&nvs);
    let trust = CaTrustStore::load(&nvs);

    // ── 4. Relay pipeline + worker threads ────────────────────
    let pipeline = Arc::new(RelayPipeline::new());
    let broker = Arc::new(MqttBroker::new());

    let dispatcher = RelayDispatcher::new(broker.clone(), pipeline.clone(), &config.pub_topic);
    relay::dispatcher::spawn(dispatcher)?;

    let peripherals = Peripherals::take()?;
    let uart = UartDriver::new(
        peripherals.uart1,
        peripherals.pins.gpio17,
        peripherals.pins.gpio18,
        Option::<AnyIOPin>::None,
        Option::<AnyIOPin>::None,
        &UartConfig::default().baudrate(Hertz(BAUD_RATE)),
    )?;
    let reader = FrameReader::new(&config.ready_phrase);
    // No producer yet; kept for serial acknowledgements.
    let tx_queue = Arc::new(SerialTxQueue::new());
    let mut serial = SerialLink::new(UartLink::new(uart), reader, pipeline.clone(), tx_queue);
    spawn_on_core(Core::App, 12, 6, "serial\0", move || {
        serial.run(&mut FreeRtos, SERIAL_POLL_MS)
    })?;

    // ── 5. Supervisor ─────────────────────────────────────────
    let restart = SystemRestart::new(nvs, config.reboot_on_fault);
    let mut supervisor = Supervisor::new(
        config,
        CellularLink::default(),
        broker,
        trust,
        restart,
        FreeRtos,
    )
    .with_pipeline(pipeline);

    supervisor.settle();
    supervisor.run_forever()
}
