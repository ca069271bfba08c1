pub mod api;
pub mod buttons;
pub mod color;
pub mod config;
pub mod console;
pub mod deck;
pub mod display;
pub mod error;
pub mod mode;
pub mod provisioning;
pub mod render;
pub mod settings;
pub mod storage;
pub mod system_info;
pub mod touch;

pub use api::{ApiRequest, ApiResponse, Method};
pub use buttons::{Button, ButtonGrid};
pub use color::Rgb565;
pub use config::DeckConfig;
pub use deck::{Deck, PowerRequest};
pub use display::{Display, Font};
pub use mode::{DeckAction, Mode};
pub use provisioning::{Clock, Credentials, NetworkStatus, WifiLink};
pub use settings::{Layout, SettingsPatch, SettingsView};
pub use storage::{KvStore, MemoryStore};
pub use touch::{RawTouch, TouchPanel};
