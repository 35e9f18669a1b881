//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements         | Connects to                    |
//! |-------------|--------------------|--------------------------------|
//! | `board`     | BoardPort          | ESP32-C3 GPIO, ADC, sleep, RTC |
//! | `device_id` | (helper)           | eFuse MAC                      |
//! | `log_sink`  | EventSink          | Serial log output              |
//! | `mesh`      | TransportPort      | ESP-BLE-MESH node              |
//! | `nvs`       | ConfigPort         | NVS / in-memory store          |
//! | `rtc_store` | RetainedStatsPort  | RTC slow memory                |

pub mod board;
pub mod device_id;
pub mod log_sink;
pub mod mesh;
pub mod nvs;
pub mod rtc_store;
