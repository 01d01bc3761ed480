//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements   | Connects to                     |
//! |-------------|--------------|---------------------------------|
//! | `firmware`  | FirmwarePort | OTA app partition / image file  |
//! | `http`      | BackendPort  | HTTPS device API (ESP-IDF only) |
//! | `log_sink`  | EventSink    | Serial log output               |
//! | `storage`   | StoragePort  | VFS data partition / temp dir   |
//! | `time`      | ClockPort    | ESP32 system timer              |
//! | `wifi`      | WifiDriver   | ESP-IDF WiFi STA                |
//!
//! `board_id` is a helper, not an adapter: it labels the board from the
//! factory MAC.

pub mod board_id;
pub mod firmware;
pub mod http;
pub mod log_sink;
pub mod storage;
pub mod time;
pub mod wifi;
