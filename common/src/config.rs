use serde::{Deserialize, Serialize};

use crate::touch::TouchCalibration;

pub const DEFAULT_SCREENSAVER_TIMEOUT_MS: u64 = 900_000;
pub const DEFAULT_INFO_TIMEOUT_MS: u64 = 120_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeckConfig {
    pub toggle_debounce_ms: u64,
    pub info_update_interval_ms: u64,
    pub join_attempts: u32,
    pub join_retry_delay_ms: u64,
    pub access_point_ssid: String,
    pub access_point_address: String,
    pub hostname: String,
    pub display_width: i32,
    pub display_height: i32,
    pub touch: TouchCalibration,
    pub deep_sleep_supported: bool,
    pub max_label_chars: usize,
    pub startup_splash_ms: u64,
    pub api_url_screen_ms: u64,
}

impl Default for DeckConfig {
    fn default() -> Self {
        Self {
            toggle_debounce_ms: 300,
            info_update_interval_ms: 1_000,
            join_attempts: 40,
            join_retry_delay_ms: 500,
            access_point_ssid: "CheapDeck-Setup".to_string(),
            access_point_address: "192.168.4.1".to_string(),
            hostname: "ESP32-CheapDeck".to_string(),
            display_width: 320,
            display_height: 240,
            touch: TouchCalibration::default(),
            deep_sleep_supported: true,
            max_label_chars: 32,
            startup_splash_ms: 2_000,
            api_url_screen_ms: 3_000,
        }
    }
}

impl DeckConfig {
    pub fn sanitize(&mut self) {
        self.display_width = self.display_width.max(64);
        self.display_height = self.display_height.max(64);
        self.join_attempts = self.join_attempts.max(1);
        self.max_label_chars = self.max_label_chars.clamp(1, 64);
        if self.access_point_ssid.trim().is_empty() {
            self.access_point_ssid = Self::default().access_point_ssid;
        }
    }
}
