//! Adapters: concrete implementations of the port traits.
//!
//! | Adapter    | Implements         | Connects to                     |
//! |------------|--------------------|---------------------------------|
//! | `log_sink` | EventSink          | Serial log output               |
//! | `nvs`      | PersistenceStore   | ESP-IDF NVS / in-memory image   |
//! | `platform` | Platform           | esp_netif, event loop, threads  |
//! | `time`     | (uptime source)    | ESP32 high-resolution timer     |

pub mod log_sink;
pub mod nvs;
pub mod platform;
pub mod time;
