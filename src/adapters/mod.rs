//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter      | Implements        | Connects to                   |
//! |--------------|-------------------|-------------------------------|
//! | `cert_store` | TrustStore        | mbedTLS global CA store       |
//! | `modem`      | RadioLink         | esp_modem PPP netif           |
//! | `mqtt`       | BrokerClient      | ESP-MQTT client               |
//! | `nvs`        | ConfigPort        | NVS / in-memory store         |
//! |              | StoragePort       |                               |
//! | `restart`    | RestartPort       | esp_restart + restart log     |
//! | `uart`       | SerialRx/SerialTx | Co-processor UART             |
//! | `device_id`  |                   | eFuse MAC                     |
//! | `time`       |                   | ESP32 system timer            |

pub mod cert_store;
pub mod device_id;
pub mod modem;
pub mod mqtt;
pub mod nvs;
pub mod restart;
pub mod time;
pub mod uart;
